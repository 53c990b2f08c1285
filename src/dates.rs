//! Timestamp parsing for interval data files.
//!
//! Input files come from a mix of retailer portals and hand-edited
//! spreadsheets, so the timestamp column shows up in several shapes:
//! numeric or abbreviated-name months, two- or four-digit years, `-` or
//! `/` separators, with or without a trailing `H:mm` time. Patterns are
//! tried in a fixed order and the first match wins.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

/// Date layouts accepted by [`parse_timestamp`], tried in order. A
/// ` %H:%M` suffix is optional on every one of them.
const DATE_PATTERNS: [&str; 8] = [
    "%d-%m-%y", "%d-%m-%Y", "%d-%b-%y", "%d-%b-%Y",
    "%d/%m/%y", "%d/%m/%Y", "%d/%b/%y", "%d/%b/%Y",
];

/// A timestamp token that matched none of the accepted layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateError {
    /// Human-readable name of the file the token came from.
    pub source: String,
    /// 1-based data line number within that file.
    pub line: usize,
}

impl fmt::Display for DateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown date format in {}. Line number: {}",
            self.source, self.line
        )
    }
}

impl std::error::Error for DateError {}

/// Parses a timestamp token against the accepted layouts.
///
/// Tokens without a time component resolve to midnight. Month names are
/// matched case-insensitively.
///
/// # Errors
///
/// Returns a [`DateError`] carrying `source` and `line` when no layout
/// matches.
pub fn parse_timestamp(token: &str, source: &str, line: usize) -> Result<NaiveDateTime, DateError> {
    let token = token.trim();
    for pattern in DATE_PATTERNS {
        let with_time = format!("{pattern} %H:%M");
        if let Ok(ts) = NaiveDateTime::parse_from_str(token, &with_time) {
            return Ok(ts);
        }
        if let Ok(date) = NaiveDate::parse_from_str(token, pattern) {
            return Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default());
        }
    }
    Err(DateError {
        source: source.to_string(),
        line,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn numeric_month_with_time() {
        let ts = parse_timestamp("1/07/2023 0:30", "Energy Usage", 1).unwrap();
        assert_eq!((ts.day(), ts.month(), ts.year()), (1, 7, 2023));
        assert_eq!((ts.hour(), ts.minute()), (0, 30));
    }

    #[test]
    fn named_month_two_digit_year() {
        let ts = parse_timestamp("15-Jul-23", "Energy Usage", 1).unwrap();
        assert_eq!((ts.day(), ts.month(), ts.year()), (15, 7, 2023));
    }

    #[test]
    fn named_month_is_case_insensitive() {
        let upper = parse_timestamp("1-JAN-2024 14:00", "AEMO Spot Price", 1).unwrap();
        let lower = parse_timestamp("1-jan-2024 14:00", "AEMO Spot Price", 1).unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn date_only_defaults_to_midnight() {
        let ts = parse_timestamp("28/02/2023", "Generated Energy", 3).unwrap();
        assert_eq!((ts.hour(), ts.minute()), (0, 0));
    }

    #[test]
    fn unknown_format_reports_source_and_line() {
        let err = parse_timestamp("2023-07-01T00:30", "Energy Usage", 17).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown date format in Energy Usage. Line number: 17"
        );
    }

    #[test]
    fn representative_layouts_all_resolve_to_the_same_day() {
        for token in ["1-01-23", "1-01-2023 0:30", "1-Jan-23", "01/01/2023 14:00"] {
            let ts = parse_timestamp(token, "Energy Usage", 1)
                .unwrap_or_else(|e| panic!("{token}: {e}"));
            assert_eq!((ts.year(), ts.month(), ts.day()), (2023, 1, 1), "{token}");
        }
    }

    #[test]
    fn iso_year_first_layout_is_rejected() {
        let err = parse_timestamp("2023-01-01", "Energy Usage", 4).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown date format in Energy Usage. Line number: 4"
        );
    }

    #[test]
    fn single_digit_day_and_hour() {
        let ts = parse_timestamp("3/7/23 9:00", "Feed-in Price", 2).unwrap();
        assert_eq!((ts.day(), ts.hour()), (3, 9));
    }
}
