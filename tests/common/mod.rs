//! Shared fixture builders for integration tests.

use std::fs;
use std::path::PathBuf;

pub const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Creates a scratch directory for one test and returns its path.
/// Call [`cleanup`] at the end of the test.
pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cerei-test-{tag}"));
    fs::create_dir_all(&dir).expect("scratch dir should be creatable");
    dir
}

pub fn cleanup(dir: &PathBuf) {
    fs::remove_dir_all(dir).ok();
}

/// Writes `content` under the scratch directory and returns the path.
pub fn write_file(dir: &PathBuf, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("fixture file should be writable");
    path
}

/// A tariff where every charge except the off-peak network rate is
/// zero, for two meters NPM1 and NPM2. The off-peak rate of 10 makes
/// the network charge usage*10/100 per month.
pub fn flat_tariff_text(distributed: bool) -> String {
    let mut text = String::from("tariff,Test Tariff\n");
    if distributed {
        text.push_str("generation,distributed\n");
    }
    text.push_str("general\n");
    text.push_str("Month,Rates\n");
    for month in MONTHS {
        text.push_str(&format!("{month},0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,10\n"));
    }
    for meter in ["NPM 1", "NPM 2"] {
        text.push_str(&format!("meter,{meter}\n"));
        text.push_str("Month,Parameters\n");
        for month in MONTHS {
            text.push_str(&format!("{month},0,0,0,0\n"));
        }
    }
    text
}

/// Two January intervals for meters NPM1 and NPM2.
pub fn usage_text() -> &'static str {
    "Date,NPM 1,NPM 2\n\
     1/01/2023 0:30,10.0,5.0\n\
     1/01/2023 1:00,20.0,5.0\n"
}

/// A full year for NPM1: the first day of every month carries 48
/// half-hour intervals of 1 kWh each, priced flat at 0.1. Every month
/// bills the same amount, so rollups are exact multiples.
pub fn year_long_usage_and_price() -> (String, String) {
    let mut usage = String::from("Date,NPM 1\n");
    let mut price = String::from("Date,Price\n");
    for month in 1..=12 {
        for interval in 1..=48u32 {
            let minutes = interval * 30;
            // The midnight reading closes the day, so its label sits
            // on the next calendar day.
            let (day, hour) = if minutes == 24 * 60 { (2, 0) } else { (1, minutes / 60) };
            let stamp = format!("{day}/{month:02}/2023 {hour}:{:02}", minutes % 60);
            usage.push_str(&format!("{stamp},1.0\n"));
            price.push_str(&format!("{stamp},0.1\n"));
        }
    }
    (usage, price)
}

pub fn price_text() -> &'static str {
    "Date,Price\n\
     1/01/2023 0:30,0.1\n\
     1/01/2023 1:00,0.2\n"
}

/// Generation recorded against NPM2 in kW; halved on read.
pub fn generated_text() -> &'static str {
    "Date,NPM 2\n\
     1/01/2023 0:30,8.0\n\
     1/01/2023 1:00,4.0\n"
}

pub fn feed_in_text() -> &'static str {
    "Date,Tariff\n\
     1/01/2023 0:30,0.05\n\
     1/01/2023 1:00,0.05\n"
}

/// A baseline bill for 2023 billing NPM1 at 10 per month and NPM2 at
/// 90 per month.
pub fn baseline_text() -> String {
    let mut text = String::from("Cost Summary for 2023 using tariff Test Tariff\n\n");
    text.push_str("Year,Quarter,Month,Days,NPM 1,NPM 2\n");
    let days = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    for quarter in 0..4 {
        for month_of_quarter in 0..3 {
            let month = quarter * 3 + month_of_quarter;
            let year = if month == 0 { "2023" } else { "" };
            text.push_str(&format!(
                "{year},,{},{},10.00,90.00\n",
                MONTHS[month], days[month]
            ));
        }
        text.push_str(&format!(",Q{},,,30.00,270.00\n", quarter + 1));
    }
    text.push_str("2023,,,,120.00,1080.00\n");
    text
}

pub fn lifecycle_text() -> &'static str {
    "Investment Name,Rooftop Solar\n\
     Lifetime,10\n\
     Discount Rate,5\n\
     Inflation Rate,2\n\
     Degradation Rate,1\n\
     Component,Panels\n\
     Number of Units,10\n\
     Capital Cost,400\n\
     Installation Cost,50\n\
     ,\n\
     Component,Inverter\n\
     Number of Units,1\n\
     Capital Cost,1500\n\
     Replacement Cost,1200,5\n\
     ,\n"
}
