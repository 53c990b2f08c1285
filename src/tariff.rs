//! Tariff file loading.
//!
//! The tariff file is a loosely structured CSV: each row starts with a
//! tag (`tariff`, `peak`, `shoulder`, `offpeak`, `generation`,
//! `general`, `meter`) and unrecognized tags are skipped. `general` and
//! `meter` rows open blocks of one header row plus twelve month rows.
//! Problems are collected and reported together rather than aborting on
//! the first one.

use std::fmt;
use std::io::BufRead;

use crate::record::{normalize_meter_name, tokenize};

/// Rate classification of one half-hour slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatePeriod {
    Peak,
    Shoulder,
    Offpeak,
}

/// Week-long grid of half-hour rate periods, Monday first.
///
/// Every slot starts off-peak and `peak`/`shoulder` rows overwrite
/// ranges of it, last write winning.
#[derive(Debug, Clone)]
pub struct RateGrid {
    slots: [[RatePeriod; 48]; 7],
}

impl Default for RateGrid {
    fn default() -> Self {
        RateGrid {
            slots: [[RatePeriod::Offpeak; 48]; 7],
        }
    }
}

impl RateGrid {
    /// Rate period for `day` (0 = Monday) and half-hour `slot` (0..48).
    pub fn period(&self, day: usize, slot: usize) -> RatePeriod {
        self.slots[day % 7][slot % 48]
    }

    fn fill(&mut self, day: usize, start: usize, end: usize, wrap: bool, period: RatePeriod) {
        for slot in start..end {
            self.slots[day][slot] = period;
        }
        if wrap {
            self.slots[(day + 1) % 7][0] = period;
        }
    }
}

/// One month of per-tariff rates from the `general` block.
#[derive(Debug, Clone, Default)]
pub struct MonthlyRates {
    pub month: String,
    pub service_admin_rate: f64,
    pub standing_rate: f64,
    pub demand_capacity_rate: f64,
    pub demand_critical_peak_rate: f64,
    pub veet_rate: f64,
    pub veet_loss_ratio: f64,
    pub sres_rate: f64,
    pub sres_loss_ratio: f64,
    pub lret_rate: f64,
    pub lret_loss_ratio: f64,
    pub aemo_pool_rert_rate: f64,
    pub aemo_pool_rert_loss_ratio: f64,
    pub ancillary_services_rate: f64,
    pub ancillary_services_loss_ratio: f64,
    pub meter_rate: f64,
    pub ct_compliance_testing_rate: f64,
    pub peak_rate: f64,
    pub shoulder_rate: f64,
    pub offpeak_rate: f64,
}

fn numeric_field(tokens: &[String], idx: usize, label: &str, month: &str, issues: &mut Vec<String>) -> f64 {
    match tokens.get(idx).and_then(|t| t.parse().ok()) {
        Some(v) => v,
        None => {
            issues.push(format!("{label} for {month} is not a number"));
            0.0
        }
    }
}

impl MonthlyRates {
    fn from_row(tokens: &[String]) -> (Self, Vec<String>) {
        let mut issues = Vec::new();
        let month = tokens.first().cloned().unwrap_or_default();
        let f = |idx, label, issues: &mut Vec<String>| numeric_field(tokens, idx, label, &month, issues);
        let rates = MonthlyRates {
            service_admin_rate: f(1, "Service Admin Rate", &mut issues),
            standing_rate: f(2, "Standing Rate", &mut issues),
            demand_capacity_rate: f(3, "Demand Capacity Rate", &mut issues),
            demand_critical_peak_rate: f(4, "Demand Critical Peak Rate", &mut issues),
            veet_rate: f(5, "VEET Rate", &mut issues),
            veet_loss_ratio: f(6, "VEET Loss Ratio", &mut issues),
            sres_rate: f(7, "SRES Rate", &mut issues),
            sres_loss_ratio: f(8, "SRES Loss Ratio", &mut issues),
            lret_rate: f(9, "LRET Rate", &mut issues),
            lret_loss_ratio: f(10, "LRET Loss Ratio", &mut issues),
            aemo_pool_rert_rate: f(11, "AEMO Pool RERT Rate", &mut issues),
            aemo_pool_rert_loss_ratio: f(12, "AEMO Pool RERT Loss Ratio", &mut issues),
            ancillary_services_rate: f(13, "Ancillary Services Rate", &mut issues),
            ancillary_services_loss_ratio: f(14, "Ancillary Services Loss Ratio", &mut issues),
            meter_rate: f(15, "Meter Rate", &mut issues),
            ct_compliance_testing_rate: f(16, "CT Compliance Testing Rate", &mut issues),
            peak_rate: f(17, "Peak Rate", &mut issues),
            shoulder_rate: f(18, "Shoulder Rate", &mut issues),
            offpeak_rate: f(19, "Offpeak Rate", &mut issues),
            month,
        };
        (rates, issues)
    }
}

/// One month of per-meter parameters from a `meter` block.
#[derive(Debug, Clone, Default)]
pub struct MeterMonth {
    pub month: String,
    pub spot_price_loss_ratio: f64,
    pub feed_in_loss_ratio: f64,
    pub demand_capacity_usage: f64,
    pub demand_critical_peak_usage: f64,
}

impl MeterMonth {
    fn from_row(tokens: &[String]) -> (Self, Vec<String>) {
        let mut issues = Vec::new();
        let month = tokens.first().cloned().unwrap_or_default();
        let f = |idx, label, issues: &mut Vec<String>| numeric_field(tokens, idx, label, &month, issues);
        let params = MeterMonth {
            spot_price_loss_ratio: f(1, "Spot Price Loss Ratio", &mut issues),
            feed_in_loss_ratio: f(2, "Feed-in Loss Ratio", &mut issues),
            demand_capacity_usage: f(3, "Demand Capacity Usage", &mut issues),
            demand_critical_peak_usage: f(4, "Demand Critical Peak Usage", &mut issues),
            month,
        };
        (params, issues)
    }
}

/// Per-meter parameter block, twelve month rows in calendar order.
#[derive(Debug, Clone)]
pub struct MeterRates {
    pub name: String,
    pub monthly: Vec<MeterMonth>,
}

/// Generated-energy distribution settings from the `generation` row.
#[derive(Debug, Clone, Default)]
pub struct GenerationConfig {
    /// Meters generation is distributed across, in priority order.
    /// Empty means every meter.
    pub meters: Vec<String>,
    /// Whether the meter list was spelled out in the tariff file.
    pub explicit: bool,
}

/// One problem found while loading the tariff file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TariffIssue {
    /// Which row or block the problem was found in.
    pub section: String,
    pub message: String,
}

impl fmt::Display for TariffIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.section, self.message)
    }
}

/// All problems found in one pass over the tariff file.
#[derive(Debug, Clone)]
pub struct TariffError {
    pub issues: Vec<TariffIssue>,
}

impl fmt::Display for TariffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "invalid tariff file:")?;
        for issue in &self.issues {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TariffError {}

/// Fully loaded tariff file.
#[derive(Debug, Clone)]
pub struct TariffConfig {
    pub name: Option<String>,
    pub grid: RateGrid,
    /// Twelve months of general rates, January first.
    pub monthly: Vec<MonthlyRates>,
    pub meters: Vec<MeterRates>,
    /// Present when the tariff distributes generated energy.
    pub generation: Option<GenerationConfig>,
}

impl TariffConfig {
    /// Loads a tariff file, collecting every problem before failing.
    ///
    /// # Errors
    ///
    /// Returns a [`TariffError`] listing every malformed rate, missing
    /// month row and unreadable line found.
    pub fn from_reader(reader: impl BufRead) -> Result<Self, TariffError> {
        let mut config = TariffConfig {
            name: None,
            grid: RateGrid::default(),
            monthly: Vec::new(),
            meters: Vec::new(),
            generation: None,
        };
        let mut issues: Vec<TariffIssue> = Vec::new();
        let mut saw_general = false;
        let mut lines = reader.lines();

        while let Some(line) = lines.next() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    issues.push(TariffIssue {
                        section: "tariff file".to_string(),
                        message: format!("unreadable line: {e}"),
                    });
                    break;
                }
            };
            let tokens = tokenize(&line);
            let Some(tag) = tokens.first() else { continue };
            let key: String = tag
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_lowercase();
            match key.as_str() {
                "tariff" => config.name = tokens.get(1).cloned(),
                "peak" => {
                    apply_rate_rules(&mut config.grid, &tokens[1..], RatePeriod::Peak, "peak rates", &mut issues);
                }
                "shoulder" => {
                    apply_rate_rules(&mut config.grid, &tokens[1..], RatePeriod::Shoulder, "shoulder rates", &mut issues);
                }
                // The grid starts off-peak, so offpeak rows carry no ranges.
                "offpeak" => {}
                "generation" => {
                    if tokens.get(1).is_some_and(|t| t.eq_ignore_ascii_case("distributed")) {
                        let meters: Vec<String> =
                            tokens[2..].iter().map(|t| normalize_meter_name(t)).collect();
                        config.generation = Some(GenerationConfig {
                            explicit: !meters.is_empty(),
                            meters,
                        });
                    }
                }
                "general" => {
                    saw_general = true;
                    config.monthly = read_month_block(
                        &mut lines,
                        "general parameters",
                        MonthlyRates::from_row,
                        &mut issues,
                    );
                }
                "meter" => match tokens.get(1) {
                    Some(raw) => {
                        let name = normalize_meter_name(raw);
                        let section = format!("meter {name}");
                        let monthly =
                            read_month_block(&mut lines, &section, MeterMonth::from_row, &mut issues);
                        config.meters.push(MeterRates { name, monthly });
                    }
                    None => issues.push(TariffIssue {
                        section: "meter block".to_string(),
                        message: "missing a meter name".to_string(),
                    }),
                },
                _ => {}
            }
        }

        if !saw_general {
            issues.push(TariffIssue {
                section: "general parameters".to_string(),
                message: "block not found".to_string(),
            });
        }
        if issues.is_empty() {
            Ok(config)
        } else {
            Err(TariffError { issues })
        }
    }

    /// Meter parameter block matching `name`, if the tariff carries one.
    pub fn meter_rates(&self, name: &str) -> Option<&MeterRates> {
        self.meters.iter().find(|m| m.name == name)
    }
}

/// Reads a block header plus twelve month rows through `parse_row`.
fn read_month_block<T>(
    lines: &mut impl Iterator<Item = std::io::Result<String>>,
    section: &str,
    parse_row: impl Fn(&[String]) -> (T, Vec<String>),
    issues: &mut Vec<TariffIssue>,
) -> Vec<T> {
    let mut rows = Vec::with_capacity(12);
    if lines.next().is_none() {
        issues.push(TariffIssue {
            section: section.to_string(),
            message: "Not all months present".to_string(),
        });
        return rows;
    }
    for _ in 0..12 {
        let Some(Ok(line)) = lines.next() else {
            issues.push(TariffIssue {
                section: section.to_string(),
                message: "Not all months present".to_string(),
            });
            return rows;
        };
        let (row, row_issues) = parse_row(&tokenize(&line));
        issues.extend(row_issues.into_iter().map(|message| TariffIssue {
            section: section.to_string(),
            message,
        }));
        rows.push(row);
    }
    rows
}

const DAY_NAMES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

fn day_index(token: &str) -> Option<usize> {
    let prefix: String = token.trim().chars().take(3).collect::<String>().to_lowercase();
    DAY_NAMES.iter().position(|d| *d == prefix)
}

fn slot_of(token: &str) -> Option<i64> {
    let hour: i64 = token.split(':').next()?.trim().parse().ok()?;
    Some(hour * 2)
}

/// Applies `days start end` tokens from a `peak` or `shoulder` row to
/// the grid. End times are exclusive; an end of 24:00 wraps the first
/// slot of the following day.
fn apply_rate_rules(
    grid: &mut RateGrid,
    rules: &[String],
    period: RatePeriod,
    section: &str,
    issues: &mut Vec<TariffIssue>,
) {
    let mut issue = |message: String| {
        issues.push(TariffIssue {
            section: section.to_string(),
            message,
        });
    };
    for rule in rules {
        let parts: Vec<&str> = rule.split_whitespace().collect();
        let [days, start_token, end_token] = parts[..] else {
            issue(format!("expected 'days start end' in '{rule}'"));
            continue;
        };
        let Some(start) = slot_of(start_token) else {
            issue(format!("Start time is not valid in '{rule}'"));
            continue;
        };
        if !(0..=47).contains(&start) {
            issue(format!("Start time is not valid in '{rule}'"));
            continue;
        }
        let Some(mut end) = slot_of(end_token) else {
            issue(format!("End time is not valid in '{rule}'"));
            continue;
        };
        if end < 0 {
            issue(format!("End time is not valid in '{rule}'"));
            continue;
        }
        if end < 2 {
            issue(format!("End time must not be less than 01:00 in '{rule}'"));
            continue;
        }
        let mut wrap = false;
        if end > 47 {
            wrap = true;
            end = 47;
        }
        if end < start {
            issue(format!("End time must not be before start time in '{rule}'"));
            continue;
        }
        let mut spans = Vec::new();
        let mut valid = true;
        for range in days.split(';') {
            let mut bounds = range.split('-');
            let first = bounds.next().and_then(day_index);
            let last = match bounds.next() {
                Some(d) => day_index(d),
                None => first,
            };
            match (first, last) {
                (Some(first), Some(last)) if first <= last => spans.push((first, last)),
                (Some(_), Some(_)) => {
                    issue(format!("Day range is reversed in '{rule}'"));
                    valid = false;
                }
                _ => {
                    issue(format!("Invalid day in '{rule}'"));
                    valid = false;
                }
            }
        }
        if !valid {
            continue;
        }
        for (first, last) in spans {
            for day in first..=last {
                grid.fill(day, start as usize, end as usize, wrap, period);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn general_block() -> String {
        let mut s = String::from("general\nMonth,Rates\n");
        for month in [
            "Jul", "Aug", "Sep", "Oct", "Nov", "Dec", "Jan", "Feb", "Mar", "Apr", "May", "Jun",
        ] {
            s.push_str(&format!(
                "{month},0.5,0.3,10,12,0.1,0.05,0.1,0.05,0.1,0.05,0.1,0.05,0.1,0.05,0.2,0.1,30,25,20\n"
            ));
        }
        s
    }

    #[test]
    fn loads_name_grid_and_general_block() {
        let mut file = String::from("tariff,Large Business TOU\n");
        file.push_str("peak,mon-fri 7:00 23:00\n");
        file.push_str("offpeak,\n");
        file.push_str(&general_block());
        let config = TariffConfig::from_reader(Cursor::new(file)).unwrap();

        assert_eq!(config.name.as_deref(), Some("Large Business TOU"));
        assert_eq!(config.monthly.len(), 12);
        assert_eq!(config.monthly[0].month, "Jul");
        assert_eq!(config.monthly[0].peak_rate, 30.0);
        // Monday 7:00 is peak, 6:30 still off-peak, Saturday untouched.
        assert_eq!(config.grid.period(0, 14), RatePeriod::Peak);
        assert_eq!(config.grid.period(0, 13), RatePeriod::Offpeak);
        assert_eq!(config.grid.period(5, 14), RatePeriod::Offpeak);
        // End times are exclusive.
        assert_eq!(config.grid.period(0, 45), RatePeriod::Peak);
        assert_eq!(config.grid.period(0, 46), RatePeriod::Offpeak);
    }

    #[test]
    fn end_of_day_wraps_into_next_morning() {
        let mut file = general_block();
        file.push_str("shoulder,sun 20:00 24:00\n");
        let config = TariffConfig::from_reader(Cursor::new(file)).unwrap();
        assert_eq!(config.grid.period(6, 40), RatePeriod::Shoulder);
        assert_eq!(config.grid.period(6, 46), RatePeriod::Shoulder);
        // The wrap writes the first slot of Monday.
        assert_eq!(config.grid.period(0, 0), RatePeriod::Shoulder);
    }

    #[test]
    fn day_lists_and_ranges_combine() {
        let mut file = general_block();
        file.push_str("peak,mon;wed-thu 9:00 17:00\n");
        let config = TariffConfig::from_reader(Cursor::new(file)).unwrap();
        assert_eq!(config.grid.period(0, 20), RatePeriod::Peak);
        assert_eq!(config.grid.period(1, 20), RatePeriod::Offpeak);
        assert_eq!(config.grid.period(2, 20), RatePeriod::Peak);
        assert_eq!(config.grid.period(3, 20), RatePeriod::Peak);
    }

    #[test]
    fn bad_rows_are_collected_together() {
        let mut file = String::from("peak,mon-fri 7:00 0:30,fry 7:00 23:00\n");
        file.push_str("general\nMonth,Rates\nJul,oops\n");
        let err = TariffConfig::from_reader(Cursor::new(file)).unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("End time must not be less than 01:00"));
        assert!(rendered.contains("Invalid day"));
        assert!(rendered.contains("Service Admin Rate for Jul is not a number"));
        assert!(rendered.contains("Not all months present"));
    }

    #[test]
    fn missing_general_block_is_an_error() {
        let err = TariffConfig::from_reader(Cursor::new("tariff,X\n")).unwrap_err();
        assert!(err.to_string().contains("general parameters: block not found"));
    }

    #[test]
    fn meter_blocks_and_generation_row() {
        let mut file = general_block();
        file.push_str("generation,distributed,NPM 2 (solar),NPM1\n");
        file.push_str("meter,NPM 1\nMonth,Parameters\n");
        for month in [
            "Jul", "Aug", "Sep", "Oct", "Nov", "Dec", "Jan", "Feb", "Mar", "Apr", "May", "Jun",
        ] {
            file.push_str(&format!("{month},0.1,0.05,40,50\n"));
        }
        let config = TariffConfig::from_reader(Cursor::new(file)).unwrap();

        let meter = config.meter_rates("NPM1").unwrap();
        assert_eq!(meter.monthly.len(), 12);
        assert_eq!(meter.monthly[0].demand_capacity_usage, 40.0);
        let generation = config.generation.unwrap();
        assert!(generation.explicit);
        assert_eq!(generation.meters, vec!["NPM2", "NPM1"]);
    }

    #[test]
    fn last_grid_write_wins() {
        let mut file = general_block();
        file.push_str("peak,mon 7:00 23:00\n");
        file.push_str("shoulder,mon 7:00 23:00\n");
        let config = TariffConfig::from_reader(Cursor::new(file)).unwrap();
        assert_eq!(config.grid.period(0, 20), RatePeriod::Shoulder);
    }
}
