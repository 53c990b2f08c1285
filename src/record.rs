//! CSV line tokenizing shared by every loader.

/// Splits a raw CSV line into trimmed tokens.
///
/// Surrounding double quotes are stripped and empty cells are dropped,
/// so a row with a blank column is reported as short rather than
/// carrying a phantom value.
pub fn tokenize(line: &str) -> Vec<String> {
    line.split(',')
        .map(|t| t.trim().trim_matches('"').trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Splits a raw CSV line into trimmed, unquoted tokens while keeping
/// interior empty cells, so positional layouts stay aligned. Trailing
/// empty cells are dropped.
pub fn split_columns(line: &str) -> Vec<String> {
    let mut tokens: Vec<String> = line
        .split(',')
        .map(|t| t.trim().trim_matches('"').trim().to_string())
        .collect();
    while tokens.last().is_some_and(String::is_empty) {
        tokens.pop();
    }
    tokens
}

/// Strips all whitespace from a meter name and truncates it at the
/// first `(`, so `NPM 1 (solar)` and `NPM1` refer to the same meter.
pub fn normalize_meter_name(raw: &str) -> String {
    let stripped: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    match stripped.find('(') {
        Some(idx) => stripped[..idx].to_string(),
        None => stripped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_strips_quotes_and_whitespace() {
        let tokens = tokenize("\"1/07/2023 0:30\", 1.5 ,2.25");
        assert_eq!(tokens, vec!["1/07/2023 0:30", "1.5", "2.25"]);
    }

    #[test]
    fn tokenize_drops_empty_cells() {
        let tokens = tokenize("a,,b,");
        assert_eq!(tokens, vec!["a", "b"]);
    }

    #[test]
    fn split_columns_keeps_interior_empties() {
        let tokens = split_columns("2023,,,31,100.0,,");
        assert_eq!(tokens, vec!["2023", "", "", "31", "100.0"]);
    }

    #[test]
    fn meter_names_are_normalized() {
        assert_eq!(normalize_meter_name("NPM 1 (solar)"), "NPM1");
        assert_eq!(normalize_meter_name("  Main Meter "), "MainMeter");
        assert_eq!(normalize_meter_name("NPM2"), "NPM2");
    }
}
