//! Lock-step reading of the interval data files.
//!
//! The usage and spot price files form one pair, the generated and
//! feed-in files another. Each pair advances together one row per
//! half-hour interval; timestamps across every active file must match
//! exactly. Timestamps name the end of their interval, so thirty
//! minutes are subtracted before a reading is filed against a month.

use std::fmt;
use std::io::BufRead;

use chrono::{Duration, NaiveDateTime};

use crate::billing::CostBook;
use crate::dates::{parse_timestamp, DateError};
use crate::pei::PeiBook;
use crate::record::split_columns;
use crate::registry::MeterRegistry;
use crate::tariff::TariffConfig;

/// A labelled line-by-line reader over one input file.
pub struct Stream<R> {
    pub label: String,
    reader: R,
}

impl<R: BufRead> Stream<R> {
    pub fn new(label: impl Into<String>, reader: R) -> Self {
        Stream {
            label: label.into(),
            reader,
        }
    }

    fn next_line(&mut self) -> Result<Option<String>, SyncError> {
        let mut buf = String::new();
        let n = self
            .reader
            .read_line(&mut buf)
            .map_err(|e| SyncError::Io(e.to_string()))?;
        if n == 0 {
            return Ok(None);
        }
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A supplied file had no header row.
    Empty { label: String },
    /// A data row had fewer columns than the header promised.
    MissingData { label: String, line: usize },
    /// A data row had more columns than the header promised.
    ExtraData { label: String, line: usize },
    /// A value column held something that does not parse as a number.
    NonNumeric { label: String, line: usize, column: usize },
    Date(DateError),
    /// Active files disagreed on the timestamp of a row.
    TimestampMismatch { line: usize },
    Io(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Empty { label } => write!(f, "{label} file is empty"),
            SyncError::MissingData { label, line } => {
                write!(f, "Missing Data on line {line} of {label}")
            }
            SyncError::ExtraData { label, line } => {
                write!(f, "Extra Data on line {line} of {label}")
            }
            SyncError::NonNumeric { label, line, column } => {
                write!(f, "Non-numerical data on line {line} column {column} of {label}")
            }
            SyncError::Date(e) => e.fmt(f),
            SyncError::TimestampMismatch { line } => write!(
                f,
                "Missing data in Usage, Generated, Feed-in or Spot Price file at line {line}"
            ),
            SyncError::Io(e) => write!(f, "unable to read input file: {e}"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<DateError> for SyncError {
    fn from(e: DateError) -> Self {
        SyncError::Date(e)
    }
}

/// What the run loop noticed beyond hard errors.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Labels of files that ran out of rows before the others did.
    /// Non-fatal; the run stops at the shortest file.
    pub short_streams: Vec<String>,
}

/// One validated interval row: its timestamp and value columns.
struct Row {
    ts: NaiveDateTime,
    values: Vec<f64>,
}

fn parse_row(line: &str, expected: usize, label: &str, line_no: usize) -> Result<Row, SyncError> {
    let tokens = split_columns(line);
    if tokens.len() < expected {
        return Err(SyncError::MissingData {
            label: label.to_string(),
            line: line_no,
        });
    }
    if tokens.len() > expected {
        return Err(SyncError::ExtraData {
            label: label.to_string(),
            line: line_no,
        });
    }
    let ts = parse_timestamp(&tokens[0], label, line_no)?;
    let mut values = Vec::with_capacity(expected - 1);
    for (idx, token) in tokens[1..].iter().enumerate() {
        let value: f64 = token.parse().map_err(|_| SyncError::NonNumeric {
            label: label.to_string(),
            line: line_no,
            column: idx + 2,
        })?;
        values.push(value);
    }
    Ok(Row { ts, values })
}

/// Spreads a pool of generated energy across meters in priority order.
///
/// Each distribution meter's usage is drawn down until the pool is
/// exhausted; any pool left after every meter is satisfied is credited
/// to the first distribution meter as generation.
pub fn redistribute(raw_usage: &[f64], mut pool: f64, order: &[usize]) -> (Vec<f64>, Vec<f64>) {
    let mut usage = raw_usage.to_vec();
    let mut generated = vec![0.0; raw_usage.len()];
    for &idx in order {
        let deduction = pool.min(raw_usage[idx]);
        usage[idx] = raw_usage[idx] - deduction;
        pool -= deduction;
        if pool <= 0.0 {
            break;
        }
    }
    if pool > 0.0 {
        if let Some(&first) = order.first() {
            generated[first] += pool;
        }
    }
    (usage, generated)
}

/// Runs the whole interval loop, feeding every aligned row into the
/// cost book and, when usage data is present, the PEI book.
///
/// `distribution` holds canonical meter indexes in priority order and
/// is empty when generation is not being distributed.
///
/// # Errors
///
/// Fails on the first malformed row, unparseable timestamp or
/// timestamp disagreement between the active files.
pub fn process<R: BufRead>(
    mut usage_price: Option<(Stream<R>, Stream<R>)>,
    mut generated_feed_in: Option<(Stream<R>, Stream<R>)>,
    tariff: &TariffConfig,
    registry: &MeterRegistry,
    distribution: &[usize],
    cost: &mut CostBook,
    mut pei: Option<&mut PeiBook>,
) -> Result<SyncOutcome, SyncError> {
    // Discard the header row of every active file.
    if let Some((usage, price)) = usage_price.as_mut() {
        for stream in [usage, price] {
            if stream.next_line()?.is_none() {
                return Err(SyncError::Empty {
                    label: stream.label.clone(),
                });
            }
        }
    }
    if let Some((generated, feed_in)) = generated_feed_in.as_mut() {
        for stream in [generated, feed_in] {
            if stream.next_line()?.is_none() {
                return Err(SyncError::Empty {
                    label: stream.label.clone(),
                });
            }
        }
    }

    let has_usage = usage_price.is_some();
    let has_generated = generated_feed_in.is_some();
    let distribute = !distribution.is_empty() && has_usage && has_generated;
    let meter_count = registry.meters.len();
    let mut outcome = SyncOutcome::default();
    // Physical file line, counting the header.
    let mut line_no = 1usize;

    loop {
        let mut lines: [Option<String>; 4] = [None, None, None, None];
        let mut labels: [Option<&str>; 4] = [None, None, None, None];
        if let Some((usage, price)) = usage_price.as_mut() {
            lines[0] = usage.next_line()?;
            lines[1] = price.next_line()?;
        }
        if let Some((generated, feed_in)) = generated_feed_in.as_mut() {
            lines[2] = generated.next_line()?;
            lines[3] = feed_in.next_line()?;
        }
        if let Some((usage, price)) = usage_price.as_ref() {
            labels[0] = Some(&usage.label);
            labels[1] = Some(&price.label);
        }
        if let Some((generated, feed_in)) = generated_feed_in.as_ref() {
            labels[2] = Some(&generated.label);
            labels[3] = Some(&feed_in.label);
        }

        let exhausted = lines
            .iter()
            .zip(&labels)
            .any(|(line, label)| label.is_some() && line.is_none());
        if exhausted {
            let any_left = lines
                .iter()
                .zip(&labels)
                .any(|(line, label)| label.is_some() && line.is_some());
            if any_left {
                for (line, label) in lines.iter().zip(&labels) {
                    if let Some(label) = label {
                        if line.is_none() {
                            outcome.short_streams.push((*label).to_string());
                        }
                    }
                }
            }
            break;
        }
        line_no += 1;

        let [usage_line, price_line, generated_line, feed_in_line] = lines;
        let mut usage_row = None;
        let mut price_row = None;
        let mut generated_row = None;
        let mut feed_in_row = None;
        if let (Some(line), Some(label)) = (&usage_line, labels[0]) {
            usage_row = Some(parse_row(line, registry.usage_columns + 1, label, line_no)?);
        }
        if let (Some(line), Some(label)) = (&price_line, labels[1]) {
            price_row = Some(parse_row(line, 2, label, line_no)?);
        }
        if let (Some(line), Some(label)) = (&generated_line, labels[2]) {
            generated_row = Some(parse_row(line, registry.generated_width + 1, label, line_no)?);
        }
        if let (Some(line), Some(label)) = (&feed_in_line, labels[3]) {
            feed_in_row = Some(parse_row(line, 2, label, line_no)?);
        }

        let active: Vec<&Row> = [&usage_row, &price_row, &generated_row, &feed_in_row]
            .into_iter()
            .flatten()
            .collect();
        // At least one pair is active, so there is always a first row.
        let Some(first) = active.first() else { break };
        if active.iter().any(|row| row.ts != first.ts) {
            return Err(SyncError::TimestampMismatch { line: line_no });
        }
        let ts = first.ts - Duration::minutes(30);

        let spot = price_row.as_ref().and_then(|r| r.values.first().copied()).unwrap_or(0.0);
        let feed_in = feed_in_row
            .as_ref()
            .and_then(|r| r.values.first().copied())
            .unwrap_or(0.0);

        if distribute {
            // Both pairs are present here, so both rows exist.
            let mut raw_usage = vec![0.0; meter_count];
            if let Some(row) = &usage_row {
                for (idx, value) in row.values.iter().enumerate() {
                    raw_usage[idx] = *value;
                    cost.total_demand += value;
                }
            }
            let pool = generated_row
                .as_ref()
                .map(|r| r.values.iter().sum::<f64>() / 2.0)
                .unwrap_or(0.0);
            cost.total_generated += pool;
            let (adjusted_usage, adjusted_generated) = redistribute(&raw_usage, pool, distribution);
            for meter in 0..meter_count {
                cost.add_unit(
                    &tariff.grid,
                    meter,
                    ts,
                    adjusted_usage[meter],
                    spot,
                    adjusted_generated[meter],
                    feed_in,
                );
                // The PEI book only covers usage meters.
                if meter < registry.usage_columns {
                    if let Some(pei) = pei.as_deref_mut() {
                        pei.add_unit(tariff, meter, ts, adjusted_usage[meter], spot, adjusted_generated[meter]);
                    }
                }
            }
        } else {
            for meter in 0..meter_count {
                let usage = match &usage_row {
                    Some(row) if meter < row.values.len() => {
                        cost.total_demand += row.values[meter];
                        row.values[meter]
                    }
                    _ => 0.0,
                };
                let generated = match (&generated_row, registry.generated_columns[meter]) {
                    (Some(row), Some(token_idx)) => {
                        // Token index counts the timestamp; values do not.
                        let value = row.values[token_idx - 1] / 2.0;
                        cost.total_generated += value;
                        value
                    }
                    _ => 0.0,
                };
                cost.add_unit(&tariff.grid, meter, ts, usage, spot, generated, feed_in);
                if has_usage && meter < registry.usage_columns {
                    if let Some(pei) = pei.as_deref_mut() {
                        pei.add_unit(tariff, meter, ts, usage, spot, generated);
                    }
                }
            }
        }
    }

    Ok(outcome)
}
