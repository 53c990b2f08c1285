//! Business-as-usual baseline bills and the savings against them.
//!
//! The baseline file is a fixed-layout spreadsheet export: two banner
//! lines, a meter-name line with four leading filler cells, then four
//! quarters of three month rows plus a quarter row, and a final annual
//! row. Parse problems are collected and reported together.

use std::fmt;
use std::io::BufRead;

use crate::record::{normalize_meter_name, split_columns};
use crate::summary::{MeterStatus, MeterSummary};

#[derive(Debug, Clone)]
pub enum BaselineError {
    /// The file ended before the meter-name line.
    Empty { file: String },
    /// The meter-name line carried no meter columns.
    NoMeters { file: String },
    /// The file ended before the layout was complete.
    MissingLines { file: String },
    /// Everything wrong with the rows, reported in one pass.
    Invalid { file: String, issues: Vec<String> },
    Io(String),
}

impl fmt::Display for BaselineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaselineError::Empty { file } => {
                write!(f, "Business as Usual file {file} is empty")
            }
            BaselineError::NoMeters { file } => {
                write!(f, "No meter names in Business as Usual file {file}")
            }
            BaselineError::MissingLines { file } => {
                write!(f, "Missing lines in Business as Usual bill {file}")
            }
            BaselineError::Invalid { file, issues } => {
                writeln!(f, "Problems with Business As Usual file {file}")?;
                for issue in issues {
                    writeln!(f, "  {issue}")?;
                }
                Ok(())
            }
            BaselineError::Io(e) => write!(f, "unable to read Business as Usual file: {e}"),
        }
    }
}

impl std::error::Error for BaselineError {}

/// A loaded business-as-usual bill.
#[derive(Debug, Clone)]
pub struct BaselineBill {
    pub year: i32,
    pub meters: Vec<MeterSummary>,
    pub days_in_month: [u32; 12],
}

/// Columns before the first meter column in every row.
const FILLER_COLUMNS: usize = 4;

impl BaselineBill {
    /// Parses a baseline bill, collecting every row problem before
    /// failing.
    ///
    /// # Errors
    ///
    /// Structural problems (truncated file, no meter columns) fail
    /// immediately; malformed values are gathered into
    /// [`BaselineError::Invalid`].
    pub fn from_reader(reader: impl BufRead, file: &str) -> Result<Self, BaselineError> {
        let mut lines = reader.lines();
        let mut line_no = 0usize;
        let mut next_line = |line_no: &mut usize| -> Result<Option<Vec<String>>, BaselineError> {
            match lines.next() {
                Some(Ok(line)) => {
                    *line_no += 1;
                    Ok(Some(split_columns(&line)))
                }
                Some(Err(e)) => Err(BaselineError::Io(e.to_string())),
                None => Ok(None),
            }
        };

        // Two banner lines carry nothing useful.
        next_line(&mut line_no)?;
        next_line(&mut line_no)?;
        let Some(header) = next_line(&mut line_no)? else {
            return Err(BaselineError::Empty {
                file: file.to_string(),
            });
        };
        if header.len() <= FILLER_COLUMNS {
            return Err(BaselineError::NoMeters {
                file: file.to_string(),
            });
        }
        let expected_tokens = header.len();
        let mut meters: Vec<MeterSummary> = header[FILLER_COLUMNS..]
            .iter()
            .map(|name| {
                let mut summary = MeterSummary::new(normalize_meter_name(name), 0);
                summary.status = MeterStatus::Loaded;
                summary
            })
            .collect();

        let mut issues: Vec<String> = Vec::new();
        let mut year = 0;
        let mut days_in_month = [0u32; 12];

        let mut row = |line_no: &mut usize| -> Result<Vec<String>, BaselineError> {
            next_line(line_no)?.ok_or_else(|| BaselineError::MissingLines {
                file: file.to_string(),
            })
        };

        for quarter in 0..4 {
            for month_of_quarter in 0..3 {
                let month = quarter * 3 + month_of_quarter;
                let tokens = row(&mut line_no)?;
                if line_no == 4 {
                    match tokens.first().and_then(|t| t.parse().ok()) {
                        Some(y) => year = y,
                        None => issues
                            .push(format!("Invalid value for a year on line {line_no} column 1")),
                    }
                }
                if tokens.len() > expected_tokens {
                    issues.push(format!(
                        "Badly formatted meter costs, line {line_no}. Suspected comma in a meter cost"
                    ));
                }
                match tokens.get(3).and_then(|t| t.parse().ok()) {
                    Some(days) => days_in_month[month] = days,
                    None => issues.push(format!(
                        "Line {line_no} column 4 is not a number - must be days in month"
                    )),
                }
                for (idx, meter) in meters.iter_mut().enumerate() {
                    match tokens.get(FILLER_COLUMNS + idx).and_then(|t| t.parse().ok()) {
                        Some(value) => meter.monthly[month] = value,
                        None => issues.push(format!(
                            "Line {} column {} is not a number",
                            line_no,
                            FILLER_COLUMNS + idx + 1
                        )),
                    }
                }
            }

            // The quarter subtotal row follows its three months.
            let tokens = row(&mut line_no)?;
            if tokens.len() > expected_tokens {
                issues.push(format!(
                    "Badly formatted meter costs, line {line_no}. Suspected comma in a meter cost"
                ));
            }
            for (idx, meter) in meters.iter_mut().enumerate() {
                match tokens.get(FILLER_COLUMNS + idx).and_then(|t| t.parse().ok()) {
                    Some(value) => meter.quarterly[quarter] = value,
                    None => issues.push(format!(
                        "Line {} column {} is not a number",
                        line_no,
                        FILLER_COLUMNS + idx + 1
                    )),
                }
            }
        }

        // And the annual row closes the layout.
        let tokens = row(&mut line_no)?;
        if tokens.len() > expected_tokens {
            issues.push(format!(
                "Badly formatted meter costs, line {line_no}. Suspected comma in a meter cost"
            ));
        }
        for (idx, meter) in meters.iter_mut().enumerate() {
            match tokens.get(FILLER_COLUMNS + idx).and_then(|t| t.parse().ok()) {
                Some(value) => meter.yearly = value,
                None => issues.push(format!(
                    "Line {} column {} is not a number",
                    line_no,
                    FILLER_COLUMNS + idx + 1
                )),
            }
        }

        if !issues.is_empty() {
            return Err(BaselineError::Invalid {
                file: file.to_string(),
                issues,
            });
        }
        for meter in &mut meters {
            meter.year = year;
        }
        Ok(BaselineBill {
            year,
            meters,
            days_in_month,
        })
    }

    fn meter(&self, name: &str) -> Option<&MeterSummary> {
        self.meters.iter().find(|m| m.name == name)
    }

    /// Baseline yearly cost for a meter, used to order distribution
    /// meters by how much they spend.
    pub fn yearly_cost(&self, name: &str) -> Option<f64> {
        self.meter(name).map(|m| m.yearly)
    }

    /// Savings per cost meter: baseline minus calculated, in the cost
    /// meters' order. A cost meter missing from the bill saves against
    /// a zero baseline.
    pub fn savings(&self, costs: &[MeterSummary]) -> Vec<MeterSummary> {
        costs
            .iter()
            .map(|cost| {
                let baseline = self.meter(&cost.name);
                let mut saving = MeterSummary::new(
                    cost.name.clone(),
                    baseline.map_or(0, |b| b.year),
                );
                for month in 0..12 {
                    saving.monthly[month] =
                        baseline.map_or(0.0, |b| b.monthly[month]) - cost.monthly[month];
                }
                for quarter in 0..4 {
                    saving.quarterly[quarter] =
                        baseline.map_or(0.0, |b| b.quarterly[quarter]) - cost.quarterly[quarter];
                }
                saving.yearly = baseline.map_or(0.0, |b| b.yearly) - cost.yearly;
                saving.status = MeterStatus::Loaded;
                saving
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn bill_text() -> String {
        let mut s = String::from("Business as Usual Bill\n,,,,\n,,,Days,NPM1,NPM2\n");
        let months = [
            ("2023", 31),
            ("February", 28),
            ("March", 31),
            ("April", 30),
            ("May", 31),
            ("June", 30),
            ("July", 31),
            ("August", 31),
            ("September", 30),
            ("October", 31),
            ("November", 30),
            ("December", 31),
        ];
        for (idx, (label, days)) in months.iter().enumerate() {
            s.push_str(&format!("{label},,,{days},100.0,50.0\n"));
            if idx % 3 == 2 {
                s.push_str(&format!("Q{},,,,300.0,150.0\n", idx / 3 + 1));
            }
        }
        s.push_str("Year,,,,1200.0,600.0\n");
        s
    }

    #[test]
    fn loads_year_months_quarters_and_annual() {
        let bill = BaselineBill::from_reader(Cursor::new(bill_text()), "bau.csv").unwrap();
        assert_eq!(bill.year, 2023);
        assert_eq!(bill.meters.len(), 2);
        assert_eq!(bill.meters[0].name, "NPM1");
        assert_eq!(bill.meters[0].monthly[0], 100.0);
        assert_eq!(bill.meters[0].quarterly[3], 300.0);
        assert_eq!(bill.meters[1].yearly, 600.0);
        assert_eq!(bill.days_in_month[1], 28);
    }

    #[test]
    fn truncated_bill_is_fatal() {
        let text = "banner\n,,,,\n,,,Days,NPM1\n2023,,,31,100.0\n";
        let err = BaselineBill::from_reader(Cursor::new(text), "bau.csv").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing lines in Business as Usual bill bau.csv"
        );
    }

    #[test]
    fn bad_values_are_collected_together() {
        let text = bill_text()
            .replacen("100.0", "abc", 1)
            .replacen("2023", "n/a", 1);
        let err = BaselineBill::from_reader(Cursor::new(text), "bau.csv").unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("Problems with Business As Usual file bau.csv"));
        assert!(rendered.contains("Invalid value for a year on line 4 column 1"));
        assert!(rendered.contains("Line 4 column 5 is not a number"));
    }

    #[test]
    fn missing_meter_names_are_fatal() {
        let text = "banner\n,,,,\nonly,three,filler,cells\n";
        let err = BaselineBill::from_reader(Cursor::new(text), "bau.csv").unwrap_err();
        assert_eq!(
            err.to_string(),
            "No meter names in Business as Usual file bau.csv"
        );
    }

    #[test]
    fn savings_subtract_costs_and_zero_fill_unknown_meters() {
        let bill = BaselineBill::from_reader(Cursor::new(bill_text()), "bau.csv").unwrap();
        let mut cost = MeterSummary::new("NPM1", 2023);
        for month in 0..12 {
            cost.set_month(month, 40.0);
        }
        let mut unknown = MeterSummary::new("NPM9", 2023);
        unknown.set_month(0, 10.0);
        let savings = bill.savings(&[cost, unknown]);

        assert_eq!(savings[0].monthly[0], 60.0);
        assert_eq!(savings[0].quarterly[0], 300.0 - 120.0);
        assert_eq!(savings[0].yearly, 1200.0 - 480.0);
        // No baseline for NPM9, so its saving is pure negative cost.
        assert_eq!(savings[1].monthly[0], -10.0);
        assert_eq!(savings[1].yearly, -10.0);
    }
}
