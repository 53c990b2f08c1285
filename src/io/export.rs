//! CSV and JSON export for calculation results.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::billing::days_in_month;
use crate::engine::RunOutput;
use crate::lifecycle::LifecycleReport;
use crate::summary::{MeterSummary, MONTH_NAMES};

/// Columns that precede the meter columns in every summary table.
const SUMMARY_HEADER: [&str; 4] = ["Year", "Quarter", "Month", "Days"];

/// Writes one summary table (cost, PEI or savings) as CSV.
///
/// The layout is three month rows and a quarter subtotal row per
/// quarter, then a yearly row: 17 data rows after the banner and
/// header. A cost summary written this way is accepted back as a
/// baseline bill in a later run.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_summary_csv(
    banner: &str,
    year: i32,
    summaries: &[MeterSummary],
    writer: impl Write,
) -> io::Result<()> {
    let mut writer = writer;
    writeln!(writer, "{banner}")?;
    writeln!(writer)?;
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(writer);

    wtr.write_record(
        SUMMARY_HEADER
            .iter()
            .map(|s| s.to_string())
            .chain(summaries.iter().map(|s| s.name.clone())),
    )?;

    for quarter in 0..4 {
        for month_of_quarter in 0..3 {
            let month = quarter * 3 + month_of_quarter;
            let days = days_in_month(month, year) as u32;
            // The year sits on the first data row so a saved summary
            // reloads cleanly as a baseline bill.
            let year_cell = if month == 0 {
                year.to_string()
            } else {
                String::new()
            };
            wtr.write_record(
                [
                    year_cell,
                    String::new(),
                    MONTH_NAMES[month].to_string(),
                    days.to_string(),
                ]
                .into_iter()
                .chain(summaries.iter().map(|s| format!("{:.2}", s.monthly[month]))),
            )?;
        }
        wtr.write_record(
            [
                String::new(),
                format!("Q{}", quarter + 1),
                String::new(),
                String::new(),
            ]
            .into_iter()
            .chain(
                summaries
                    .iter()
                    .map(|s| format!("{:.2}", s.quarterly[quarter])),
            ),
        )?;
    }
    wtr.write_record(
        [year.to_string(), String::new(), String::new(), String::new()]
            .into_iter()
            .chain(summaries.iter().map(|s| format!("{:.2}", s.yearly))),
    )?;

    wtr.flush()?;
    Ok(())
}

/// Exports a summary table to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_summary_csv(
    banner: &str,
    year: i32,
    summaries: &[MeterSummary],
    path: &Path,
) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_summary_csv(banner, year, summaries, buf)
}

/// Writes the lifecycle analysis as CSV: the economic outcomes first,
/// then one row per component.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_lifecycle_csv(report: &LifecycleReport, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(writer);

    wtr.write_record(["Outcome", "Value"])?;
    wtr.write_record([
        "Number of components".to_string(),
        report.components.len().to_string(),
    ])?;
    wtr.write_record([
        "Period of analysis (years)".to_string(),
        format!("{}", report.lifetime),
    ])?;
    wtr.write_record([
        "Cost of Investment ($)".to_string(),
        format!("{:.2}", -report.cost_of_investment),
    ])?;
    wtr.write_record([
        "Total Revenue (future value of all revenue and savings) ($)".to_string(),
        format!("{:.2}", report.npv_revenue),
    ])?;
    wtr.write_record([
        "Net Present Value (NPV) ($)".to_string(),
        format!("{:.2}", report.npv),
    ])?;
    wtr.write_record([
        "Annual Worth (AW) ($/year)".to_string(),
        format!("{:.2}", report.annual_worth),
    ])?;
    wtr.write_record([
        "Total life cycle energy generated (kWh)".to_string(),
        format!("{:.2}", report.sum_alcc_energy_generated),
    ])?;
    wtr.write_record([
        "Annual energy generated (kWh/year)".to_string(),
        format!("{:.2}", report.annual_energy_generated),
    ])?;
    wtr.write_record([
        "Annual energy exported to the grid (kWh/year)".to_string(),
        format!("{:.2}", report.annual_energy_exported),
    ])?;
    wtr.write_record([
        "Payback period (Years)".to_string(),
        report
            .payback_years
            .map_or_else(|| "n/a".to_string(), |p| format!("{p:.2}")),
    ])?;
    wtr.write_record([
        "Levelized Cost of Energy (LCOE) ($/kWh)".to_string(),
        report
            .lcoe
            .map_or_else(|| "n/a".to_string(), |l| format!("{l:.2}")),
    ])?;

    // An empty record comes out as a blank separator line.
    wtr.write_record(std::iter::empty::<&str>())?;
    wtr.write_record([
        "Cost Code",
        "Component",
        "Units",
        "Capital ($)",
        "Installation ($)",
        "Fixed O&M ($)",
        "Replacement ($)",
        "Future ($)",
        "NPV ($)",
        "ATLCC ($/year)",
        "Replacement years",
    ])?;
    for component in &report.components {
        let atlcc = component.atlcc_capital
            + component.atlcc_installation
            + component.atlcc_fixed_om
            + component.atlcc_replacement
            + component.atlcc_future;
        let years = component
            .replacement_years
            .iter()
            .map(|y| y.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        wtr.write_record([
            component.cost_code.clone(),
            component.name.clone(),
            format!("{}", component.qty),
            format!("{:.2}", component.total_capital_cost),
            format!("{:.2}", component.total_installation_cost),
            format!("{:.2}", component.total_fixed_om_cost),
            format!("{:.2}", component.total_replacement_cost),
            format!("{:.2}", component.total_future_cost),
            format!("{:.2}", component.total_npv),
            format!("{atlcc:.2}"),
            years,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Exports the lifecycle analysis to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_lifecycle_csv(report: &LifecycleReport, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_lifecycle_csv(report, buf)
}

#[derive(Serialize)]
struct RunReport<'a> {
    year: i32,
    cost: &'a [MeterSummary],
    #[serde(skip_serializing_if = "Option::is_none")]
    pei: Option<&'a [MeterSummary]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    savings: Option<&'a [MeterSummary]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lifecycle: Option<&'a LifecycleReport>,
    warnings: &'a [String],
}

/// Writes the whole run as pretty-printed JSON.
///
/// # Errors
///
/// Returns an `io::Error` if serialization or writing fails.
pub fn write_json_report(output: &RunOutput, writer: impl Write) -> io::Result<()> {
    let report = RunReport {
        year: output.year,
        cost: &output.cost_summaries,
        pei: output.pei_summaries.as_deref(),
        savings: output.savings_summaries.as_deref(),
        lifecycle: output.lifecycle.as_ref(),
        warnings: &output.warnings,
    };
    serde_json::to_writer_pretty(writer, &report).map_err(io::Error::other)
}

/// Exports the JSON run report to a file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_json_report(output: &RunOutput, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_json_report(output, buf)
}
