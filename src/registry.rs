//! Meter discovery from the usage and generated file headers.
//!
//! The canonical meter order is the usage header order, with meters
//! that only appear in the generated file appended after it. Column
//! positions in the generated file are remembered so interval rows can
//! be read by meter rather than by position.

use std::fmt;
use std::io::BufRead;

use chrono::Datelike;

use crate::dates::{parse_timestamp, DateError};
use crate::record::{normalize_meter_name, tokenize};

/// Canonical meter list and file geometry for one run.
#[derive(Debug, Clone)]
pub struct MeterRegistry {
    /// All meters, usage-file order first.
    pub meters: Vec<String>,
    /// How many of `meters` have a column in the usage file.
    pub usage_columns: usize,
    /// For each canonical meter, its token index in generated rows.
    pub generated_columns: Vec<Option<usize>>,
    /// Meter columns in the generated file, for row width checks.
    pub generated_width: usize,
    /// Year taken from the first data row.
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Neither a usage nor a generated file was supplied.
    NoSources,
    /// The named file had no header row.
    Empty { label: String },
    /// The named file had a header but no data rows.
    NoData { label: String },
    Date(DateError),
    /// The usage and generated files start in different years.
    YearMismatch,
    Io(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NoSources => {
                write!(f, "No Energy Usage file and no Generated Energy file present")
            }
            RegistryError::Empty { label } => write!(f, "{label} file is empty"),
            RegistryError::NoData { label } => write!(f, "{label} file contains no valid data"),
            RegistryError::Date(e) => e.fmt(f),
            RegistryError::YearMismatch => write!(
                f,
                "Energy Usage file and Generated Energy file are for different years"
            ),
            RegistryError::Io(e) => write!(f, "unable to read input file: {e}"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<DateError> for RegistryError {
    fn from(e: DateError) -> Self {
        RegistryError::Date(e)
    }
}

/// Reads the header and first data row of `reader`, returning meter
/// names and the year of the first timestamp.
fn scan_header(
    mut reader: impl BufRead,
    label: &str,
) -> Result<(Vec<String>, i32), RegistryError> {
    let mut read_line = |buf: &mut String| -> Result<usize, RegistryError> {
        reader
            .read_line(buf)
            .map_err(|e| RegistryError::Io(e.to_string()))
    };
    let mut header = String::new();
    if read_line(&mut header)? == 0 {
        return Err(RegistryError::Empty {
            label: label.to_string(),
        });
    }
    let names: Vec<String> = tokenize(&header)
        .into_iter()
        .skip(1)
        .map(|t| normalize_meter_name(&t))
        .collect();

    let mut first = String::new();
    if read_line(&mut first)? == 0 {
        return Err(RegistryError::NoData {
            label: label.to_string(),
        });
    }
    let tokens = tokenize(&first);
    let Some(date_token) = tokens.first() else {
        return Err(RegistryError::NoData {
            label: label.to_string(),
        });
    };
    let year = parse_timestamp(date_token, label, 1)?.date().year();
    Ok((names, year))
}

impl MeterRegistry {
    /// Builds the registry from whichever of the two headers exist.
    ///
    /// # Errors
    ///
    /// Fails when neither file is given, when a given file is empty or
    /// has no data row, or when the two files start in different years.
    pub fn scan<U: BufRead, G: BufRead>(
        usage: Option<U>,
        generated: Option<G>,
    ) -> Result<Self, RegistryError> {
        if usage.is_none() && generated.is_none() {
            return Err(RegistryError::NoSources);
        }

        let mut meters: Vec<String> = Vec::new();
        let mut usage_columns = 0;
        let mut usage_year = None;
        if let Some(reader) = usage {
            let (names, year) = scan_header(reader, "Energy Usage")?;
            usage_columns = names.len();
            meters = names;
            usage_year = Some(year);
        }

        let mut generated_columns: Vec<Option<usize>> = vec![None; meters.len()];
        let mut generated_width = 0;
        let mut year = usage_year;
        if let Some(reader) = generated {
            let (names, generated_year) = scan_header(reader, "Generated Energy")?;
            generated_width = names.len();
            for (column, name) in names.into_iter().enumerate() {
                let canonical = match meters.iter().position(|m| *m == name) {
                    Some(idx) => idx,
                    None => {
                        meters.push(name);
                        generated_columns.push(None);
                        meters.len() - 1
                    }
                };
                // Token index within a data row, past the timestamp.
                generated_columns[canonical] = Some(column + 1);
            }
            match year {
                Some(y) if y != generated_year => return Err(RegistryError::YearMismatch),
                Some(_) => {}
                None => year = Some(generated_year),
            }
        }

        // One of the two branches above has set the year by now.
        let year = year.ok_or(RegistryError::NoSources)?;
        Ok(MeterRegistry {
            meters,
            usage_columns,
            generated_columns,
            generated_width,
            year,
        })
    }
}
