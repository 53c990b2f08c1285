//! Generation distributed across usage meters with all four interval
//! files present.

mod common;

use cerei::engine::{self, RunConfig};

fn four_file_config(dir: &std::path::PathBuf, distributed: bool) -> RunConfig {
    RunConfig {
        tariff: common::write_file(dir, "tariff.csv", &common::flat_tariff_text(distributed)),
        usage: Some(common::write_file(dir, "usage.csv", common::usage_text())),
        price: Some(common::write_file(dir, "price.csv", common::price_text())),
        generated: Some(common::write_file(dir, "generated.csv", common::generated_text())),
        feed_in: Some(common::write_file(dir, "feed_in.csv", common::feed_in_text())),
        ..RunConfig::default()
    }
}

#[test]
fn pooled_generation_offsets_the_first_meter_first() {
    let dir = common::scratch_dir("dist-pooled");
    let output = engine::run(&four_file_config(&dir, true)).expect("run should succeed");
    common::cleanup(&dir);

    // Pool per interval is kW halved: 4.0 then 2.0, all drawn down by
    // NPM1 whose usage is 10 then 20. NPM2 is untouched.
    // NPM1: pool charge 0.1*6 + 0.2*18 = 4.2, off-peak 24*10/100 = 2.4,
    // GST on 6.6.
    assert!((output.cost_summaries[0].yearly - 7.26).abs() < 1e-9);
    assert!((output.cost_summaries[1].yearly - 2.75).abs() < 1e-9);
    assert!((output.cost_summaries[2].yearly - 10.01).abs() < 1e-9);

    assert!((output.cost.total_generated - 6.0).abs() < 1e-9);
    assert!((output.cost.total_demand - 40.0).abs() < 1e-9);
}

#[test]
fn without_distribution_generation_credits_its_own_meter() {
    let dir = common::scratch_dir("dist-mapped");
    let output = engine::run(&four_file_config(&dir, false)).expect("run should succeed");
    common::cleanup(&dir);

    // NPM1 sees no generation and bills as usage-only: 8.8 inc GST.
    assert!((output.cost_summaries[0].yearly - 8.8).abs() < 1e-9);
    // NPM2 nets 5-4=1 then 5-2=3 against the grid:
    // pool 0.1*1 + 0.2*3 = 0.7, off-peak 4*10/100 = 0.4, GST on 1.1.
    assert!((output.cost_summaries[1].yearly - 1.21).abs() < 1e-9);
}

#[test]
fn generation_only_run_bills_exports() {
    let dir = common::scratch_dir("dist-genonly");
    let config = RunConfig {
        tariff: common::write_file(&dir, "tariff.csv", &common::flat_tariff_text(false)),
        generated: Some(common::write_file(&dir, "generated.csv", common::generated_text())),
        feed_in: Some(common::write_file(&dir, "feed_in.csv", common::feed_in_text())),
        ..RunConfig::default()
    };
    let output = engine::run(&config).expect("run should succeed");
    common::cleanup(&dir);

    // No usage stream, so no PEI.
    assert!(output.pei_summaries.is_none());
    // NPM2 exports 4 then 2 kWh at 0.05: feed-in -0.3, no GST on a
    // credit.
    assert_eq!(output.cost_summaries[0].name, "NPM2");
    assert!((output.cost_summaries[0].yearly - -0.3).abs() < 1e-9);
    assert!((output.cost.energy_exported() - -6.0).abs() < 1e-9);
}
