//! cerei entry point. CLI wiring and run reporting.

use std::path::PathBuf;
use std::process;

use cerei::engine::{self, RunConfig, RunOutput};
use cerei::io::export::{
    export_json_report, export_lifecycle_csv, export_summary_csv,
};
use cerei::summary::MeterSummary;

/// Parsed CLI arguments.
struct CliArgs {
    run: RunConfig,
    cost_out: Option<PathBuf>,
    pei_out: Option<PathBuf>,
    savings_out: Option<PathBuf>,
    lifecycle_out: Option<PathBuf>,
    json_out: Option<PathBuf>,
}

fn print_help() {
    eprintln!("cerei — electricity cost, efficiency, savings and investment calculator");
    eprintln!();
    eprintln!("Usage: cerei --tariff <path> [OPTIONS]");
    eprintln!();
    eprintln!("Input files:");
    eprintln!("  --tariff <path>         Tariff parameters file (required)");
    eprintln!("  --usage <path>          Half-hourly energy usage (needs --price)");
    eprintln!("  --price <path>          AEMO spot prices (needs --usage)");
    eprintln!("  --generated <path>      Half-hourly generated energy (needs --feed-in)");
    eprintln!("  --feed-in <path>        Feed-in tariffs (needs --generated)");
    eprintln!("  --baseline <path>       Business-as-usual bill for savings");
    eprintln!("  --lifecycle <path>      Lifecycle cost parameters");
    eprintln!();
    eprintln!("Output files:");
    eprintln!("  --cost-out <path>       Write the cost summary CSV");
    eprintln!("  --pei-out <path>        Write the PEI summary CSV");
    eprintln!("  --savings-out <path>    Write the savings summary CSV");
    eprintln!("  --lifecycle-out <path>  Write the lifecycle analysis CSV");
    eprintln!("  --json-out <path>       Write the whole run as JSON");
    eprintln!();
    eprintln!("  --help                  Show this help message");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        run: RunConfig::default(),
        cost_out: None,
        pei_out: None,
        savings_out: None,
        lifecycle_out: None,
        json_out: None,
    };
    let mut tariff: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--tariff" | "--usage" | "--price" | "--generated" | "--feed-in"
            | "--baseline" | "--lifecycle" | "--cost-out" | "--pei-out"
            | "--savings-out" | "--lifecycle-out" | "--json-out" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: {flag} requires a path argument");
                    process::exit(1);
                }
                let path = PathBuf::from(&args[i]);
                match flag {
                    "--tariff" => tariff = Some(path),
                    "--usage" => cli.run.usage = Some(path),
                    "--price" => cli.run.price = Some(path),
                    "--generated" => cli.run.generated = Some(path),
                    "--feed-in" => cli.run.feed_in = Some(path),
                    "--baseline" => cli.run.baseline = Some(path),
                    "--lifecycle" => cli.run.lifecycle = Some(path),
                    "--cost-out" => cli.cost_out = Some(path),
                    "--pei-out" => cli.pei_out = Some(path),
                    "--savings-out" => cli.savings_out = Some(path),
                    "--lifecycle-out" => cli.lifecycle_out = Some(path),
                    "--json-out" => cli.json_out = Some(path),
                    _ => unreachable!(),
                }
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    match tariff {
        Some(path) => cli.run.tariff = path,
        None => {
            eprintln!("error: --tariff is required");
            print_help();
            process::exit(1);
        }
    }
    cli
}

/// Prints one summary table to stdout as aligned columns.
fn print_summaries(title: &str, summaries: &[MeterSummary]) {
    println!("{title}");
    for summary in summaries {
        println!("  {:<20} yearly {:>14.2}", summary.name, summary.yearly);
    }
    println!();
}

fn main() {
    let cli = parse_args();

    let output: RunOutput = match engine::run(&cli.run) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    for warning in &output.warnings {
        eprintln!("warning: {warning}");
    }

    println!("Calculations complete for {}", output.year);
    println!();
    print_summaries("Energy Bill ($, positive is cost)", &output.cost_summaries);
    if let Some(pei) = &output.pei_summaries {
        print_summaries("Price Efficiency Index (>1 is costlier than the pool)", pei);
    }
    if let Some(savings) = &output.savings_summaries {
        print_summaries("Potential Saving ($, positive is saving)", savings);
    }
    if let Some(report) = &output.lifecycle {
        println!("Life-cycle Cost Assessment: {}", report.investment_name);
        println!("  Cost of investment     {:>14.2}", -report.cost_of_investment);
        println!("  Net present value      {:>14.2}", report.npv);
        println!("  Annual worth           {:>14.2}", report.annual_worth);
        match report.payback_years {
            Some(payback) => println!("  Payback period (years) {payback:>14.2}"),
            None => println!("  Payback period (years)            n/a"),
        }
        match report.lcoe {
            Some(lcoe) => println!("  LCOE ($/kWh)           {lcoe:>14.2}"),
            None => println!("  LCOE ($/kWh)                      n/a"),
        }
        println!();
    }

    let mut failed = false;
    if let Some(path) = &cli.cost_out {
        let banner = format!("Cost Summary for {}", output.year);
        if let Err(e) = export_summary_csv(&banner, output.year, &output.cost_summaries, path) {
            eprintln!("error: cannot write {}: {e}", path.display());
            failed = true;
        }
    }
    if let Some(path) = &cli.pei_out {
        match &output.pei_summaries {
            Some(pei) => {
                let banner = format!("PEI Summary for {}", output.year);
                if let Err(e) = export_summary_csv(&banner, output.year, pei, path) {
                    eprintln!("error: cannot write {}: {e}", path.display());
                    failed = true;
                }
            }
            None => eprintln!("warning: no PEI results to write (no usage and price files)"),
        }
    }
    if let Some(path) = &cli.savings_out {
        match &output.savings_summaries {
            Some(savings) => {
                let banner = format!("Savings Summary for {}", output.year);
                if let Err(e) = export_summary_csv(&banner, output.year, savings, path) {
                    eprintln!("error: cannot write {}: {e}", path.display());
                    failed = true;
                }
            }
            None => eprintln!("warning: no savings to write (no baseline file)"),
        }
    }
    if let Some(path) = &cli.lifecycle_out {
        match &output.lifecycle {
            Some(report) => {
                if let Err(e) = export_lifecycle_csv(report, path) {
                    eprintln!("error: cannot write {}: {e}", path.display());
                    failed = true;
                }
            }
            None => eprintln!("warning: no lifecycle analysis to write (no lifecycle file)"),
        }
    }
    if let Some(path) = &cli.json_out {
        if let Err(e) = export_json_report(&output, path) {
            eprintln!("error: cannot write {}: {e}", path.display());
            failed = true;
        }
    }

    if failed {
        process::exit(1);
    }
}
