//! Cost calculation per meter per month.
//!
//! Interval data accumulates into [`MonthlyCost`] cells as it streams
//! through, and [`CostBook::finalize`] turns the accumulated usage into
//! the full set of charges afterwards. Load-side tariffs are in cents
//! per kWh, spot and feed-in prices in dollars.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::summary::MeterSummary;
use crate::tariff::{MonthlyRates, RateGrid, RatePeriod, TariffConfig};

pub(crate) fn days_in_year(year: i32) -> f64 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366.0
    } else {
        365.0
    }
}

pub(crate) fn days_in_month(month: usize, year: i32) -> f64 {
    match month {
        1 if days_in_year(year) == 366.0 => 29.0,
        1 => 28.0,
        0 | 2 | 4 | 6 | 7 | 9 | 11 => 31.0,
        _ => 30.0,
    }
}

/// Half-hour slot (0..48) of a timestamp.
pub(crate) fn slot_of(ts: NaiveDateTime) -> usize {
    (2 * ts.hour() + ts.minute() / 30) as usize
}

/// Day-of-week index with Monday first, matching [`RateGrid`].
pub(crate) fn weekday_of(ts: NaiveDateTime) -> usize {
    ts.weekday().num_days_from_monday() as usize
}

/// A meter in the data files with no parameter block in the tariff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingMeterRates {
    pub meter: String,
}

impl fmt::Display for MissingMeterRates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Missing meter parameters in tariff file for meter {}", self.meter)
    }
}

impl std::error::Error for MissingMeterRates {}

/// Charge accumulator and results for one meter and one month.
#[derive(Debug, Clone)]
pub struct MonthlyCost {
    pub meter: String,
    pub month: usize,
    pub year: i32,
    pub days_in_month: f64,
    pub days_in_year: f64,

    // Meter parameters for this month.
    pub spot_price_loss_ratio: f64,
    pub feed_in_loss_ratio: f64,
    pub demand_capacity_usage: f64,
    pub demand_critical_peak_usage: f64,

    // Accumulated while streaming interval rows.
    pub monthly_generated: f64,
    pub monthly_nett_grid_used: f64,
    /// Net energy exported, accumulated as a negative number.
    pub monthly_nett_exported: f64,
    pub pool_pass_through_charge: f64,
    pub feed_in_charge: f64,
    pub peak_usage: f64,
    pub shoulder_usage: f64,
    pub offpeak_usage: f64,

    // Filled in by finalize.
    pub service_admin_charge: f64,
    pub standing_charge: f64,
    pub peak_energy_charge: f64,
    pub shoulder_energy_charge: f64,
    pub offpeak_energy_charge: f64,
    pub demand_capacity_charge: f64,
    pub demand_critical_peak_charge: f64,
    pub veet_charge: f64,
    pub sres_charge: f64,
    pub lret_charge: f64,
    pub aemo_pool_rert_charge: f64,
    pub ancillary_services_charge: f64,
    pub meter_charge: f64,
    pub ct_compliance_testing_levy: f64,
    pub energy_charge: f64,
    pub network_charge: f64,
    pub market_charge: f64,
    pub other_charge: f64,
    pub total_charge_ex_gst: f64,
    pub gst: f64,
    pub total_charge_inc_gst: f64,
}

impl MonthlyCost {
    fn new(meter: &str, month: usize, year: i32) -> Self {
        MonthlyCost {
            meter: meter.to_string(),
            month,
            year,
            days_in_month: days_in_month(month, year),
            days_in_year: days_in_year(year),
            spot_price_loss_ratio: 0.0,
            feed_in_loss_ratio: 0.0,
            demand_capacity_usage: 0.0,
            demand_critical_peak_usage: 0.0,
            monthly_generated: 0.0,
            monthly_nett_grid_used: 0.0,
            monthly_nett_exported: 0.0,
            pool_pass_through_charge: 0.0,
            feed_in_charge: 0.0,
            peak_usage: 0.0,
            shoulder_usage: 0.0,
            offpeak_usage: 0.0,
            service_admin_charge: 0.0,
            standing_charge: 0.0,
            peak_energy_charge: 0.0,
            shoulder_energy_charge: 0.0,
            offpeak_energy_charge: 0.0,
            demand_capacity_charge: 0.0,
            demand_critical_peak_charge: 0.0,
            veet_charge: 0.0,
            sres_charge: 0.0,
            lret_charge: 0.0,
            aemo_pool_rert_charge: 0.0,
            ancillary_services_charge: 0.0,
            meter_charge: 0.0,
            ct_compliance_testing_levy: 0.0,
            energy_charge: 0.0,
            network_charge: 0.0,
            market_charge: 0.0,
            other_charge: 0.0,
            total_charge_ex_gst: 0.0,
            gst: 0.0,
            total_charge_inc_gst: 0.0,
        }
    }

    /// Folds one half-hour reading into the month.
    ///
    /// `generated` is the energy credited to this meter for the
    /// interval, already halved from the generated file's kW figure.
    fn add_unit(&mut self, grid: &RateGrid, ts: NaiveDateTime, usage: f64, spot: f64, generated: f64, feed_in: f64) {
        let nett = usage - generated;
        self.monthly_generated += generated;

        let mut grid_used = 0.0;
        if nett > 0.0 {
            grid_used = nett;
            self.monthly_nett_grid_used += nett;
        } else {
            self.monthly_nett_exported += nett;
        }

        let spot_inc_loss = spot + spot * self.spot_price_loss_ratio;
        let feed_in_inc_loss = feed_in + feed_in * self.feed_in_loss_ratio;
        if nett > 0.0 {
            self.pool_pass_through_charge += spot_inc_loss * nett;
        } else {
            self.feed_in_charge += feed_in_inc_loss * nett;
        }

        match grid.period(weekday_of(ts), slot_of(ts)) {
            RatePeriod::Peak => self.peak_usage += grid_used,
            RatePeriod::Shoulder => self.shoulder_usage += grid_used,
            RatePeriod::Offpeak => self.offpeak_usage += grid_used,
        }
    }

    /// Turns the accumulated usage into the month's charges.
    fn finalize(&mut self, rates: &MonthlyRates) {
        let inc_loss = |rate: f64, loss: f64| rate + rate * loss;
        let veet_rate = inc_loss(rates.veet_rate, rates.veet_loss_ratio);
        let sres_rate = inc_loss(rates.sres_rate, rates.sres_loss_ratio);
        let lret_rate = inc_loss(rates.lret_rate, rates.lret_loss_ratio);
        let aemo_rate = inc_loss(rates.aemo_pool_rert_rate, rates.aemo_pool_rert_loss_ratio);
        let ancillary_rate = inc_loss(rates.ancillary_services_rate, rates.ancillary_services_loss_ratio);

        self.service_admin_charge = rates.service_admin_rate * self.days_in_month;

        self.standing_charge = rates.standing_rate / self.days_in_year * self.days_in_month;
        self.peak_energy_charge = self.peak_usage * rates.peak_rate / 100.0;
        self.shoulder_energy_charge = self.shoulder_usage * rates.shoulder_rate / 100.0;
        self.offpeak_energy_charge = self.offpeak_usage * rates.offpeak_rate / 100.0;
        self.demand_capacity_charge = self.demand_capacity_usage * rates.demand_capacity_rate;
        self.demand_critical_peak_charge =
            self.demand_critical_peak_usage * rates.demand_critical_peak_rate;

        self.veet_charge = self.monthly_nett_grid_used * veet_rate / 100.0;
        self.sres_charge = self.monthly_nett_grid_used * sres_rate / 100.0;
        self.lret_charge = self.monthly_nett_grid_used * lret_rate / 100.0;
        self.aemo_pool_rert_charge = self.monthly_nett_grid_used * aemo_rate / 100.0;
        self.ancillary_services_charge = self.monthly_nett_grid_used * ancillary_rate / 100.0;

        self.meter_charge = rates.meter_rate / self.days_in_year * self.days_in_month;
        self.ct_compliance_testing_levy =
            rates.ct_compliance_testing_rate / self.days_in_year * self.days_in_month;

        self.energy_charge =
            self.pool_pass_through_charge + self.feed_in_charge + self.service_admin_charge;
        self.network_charge = self.standing_charge
            + self.peak_energy_charge
            + self.shoulder_energy_charge
            + self.offpeak_energy_charge
            + self.demand_capacity_charge
            + self.demand_critical_peak_charge;
        self.market_charge = self.veet_charge
            + self.sres_charge
            + self.lret_charge
            + self.aemo_pool_rert_charge
            + self.ancillary_services_charge;
        self.other_charge = self.meter_charge + self.ct_compliance_testing_levy;

        self.total_charge_ex_gst =
            self.energy_charge + self.network_charge + self.market_charge + self.other_charge;
        // No GST credit on a net-negative bill.
        self.gst = if self.total_charge_ex_gst > 0.0 {
            self.total_charge_ex_gst * 0.1
        } else {
            0.0
        };
        self.total_charge_inc_gst = self.total_charge_ex_gst + self.gst;
    }
}

/// All cost cells for one run, meter-major.
#[derive(Debug, Clone)]
pub struct CostBook {
    pub meters: Vec<String>,
    pub year: i32,
    cells: Vec<Vec<MonthlyCost>>,
    /// Generated energy pooled over the year.
    pub total_generated: f64,
    /// Demand over the year before generation deductions.
    pub total_demand: f64,
}

impl CostBook {
    pub fn new(meters: &[String], year: i32) -> Self {
        let cells = meters
            .iter()
            .map(|meter| (0..12).map(|month| MonthlyCost::new(meter, month, year)).collect())
            .collect();
        CostBook {
            meters: meters.to_vec(),
            year,
            cells,
            total_generated: 0.0,
            total_demand: 0.0,
        }
    }

    /// Copies each meter's monthly loss ratios and demand usages out of
    /// the tariff.
    ///
    /// # Errors
    ///
    /// Fails when a meter in the data files has no parameter block in
    /// the tariff file.
    pub fn apply_meter_rates(&mut self, tariff: &TariffConfig) -> Result<(), MissingMeterRates> {
        for (idx, meter) in self.meters.iter().enumerate() {
            let rates = tariff.meter_rates(meter).ok_or_else(|| MissingMeterRates {
                meter: meter.clone(),
            })?;
            for (month, params) in rates.monthly.iter().enumerate() {
                let cell = &mut self.cells[idx][month];
                cell.spot_price_loss_ratio = params.spot_price_loss_ratio;
                cell.feed_in_loss_ratio = params.feed_in_loss_ratio;
                cell.demand_capacity_usage = params.demand_capacity_usage;
                cell.demand_critical_peak_usage = params.demand_critical_peak_usage;
            }
        }
        Ok(())
    }

    /// Folds one meter's reading for one interval into its month cell.
    pub fn add_unit(
        &mut self,
        grid: &RateGrid,
        meter: usize,
        ts: NaiveDateTime,
        usage: f64,
        spot: f64,
        generated: f64,
        feed_in: f64,
    ) {
        let month = ts.month0() as usize;
        self.cells[meter][month].add_unit(grid, ts, usage, spot, generated, feed_in);
    }

    /// Calculates every cell's charges from the accumulated usage.
    pub fn finalize(&mut self, tariff: &TariffConfig) {
        for months in &mut self.cells {
            for cell in months {
                cell.finalize(&tariff.monthly[cell.month]);
            }
        }
    }

    pub fn month(&self, meter: usize, month: usize) -> &MonthlyCost {
        &self.cells[meter][month]
    }

    /// Total-cost summaries for the real meters, in canonical order.
    pub fn summaries(&self) -> Vec<MeterSummary> {
        self.cells
            .iter()
            .enumerate()
            .map(|(idx, months)| {
                let mut summary = MeterSummary::new(self.meters[idx].clone(), self.year);
                for cell in months {
                    summary.set_month(cell.month, cell.total_charge_inc_gst);
                }
                summary
            })
            .collect()
    }

    /// Net energy exported over the year, as a negative number.
    pub fn energy_exported(&self) -> f64 {
        self.cells
            .iter()
            .flat_map(|months| months.iter())
            .map(|cell| cell.monthly_nett_exported)
            .sum()
    }

    /// Net energy drawn from the grid over the year.
    pub fn grid_used(&self) -> f64 {
        self.cells
            .iter()
            .flat_map(|months| months.iter())
            .map(|cell| cell.monthly_nett_grid_used)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tariff::{MeterMonth, MeterRates, RateGrid};

    fn flat_rates(month: usize) -> MonthlyRates {
        MonthlyRates {
            month: format!("M{month}"),
            service_admin_rate: 0.5,
            standing_rate: 365.0,
            offpeak_rate: 20.0,
            meter_rate: 73.0,
            ..MonthlyRates::default()
        }
    }

    fn tariff_with_meter(name: &str) -> TariffConfig {
        TariffConfig {
            name: None,
            grid: RateGrid::default(),
            monthly: (0..12).map(flat_rates).collect(),
            meters: vec![MeterRates {
                name: name.to_string(),
                monthly: (0..12).map(|_| MeterMonth::default()).collect(),
            }],
            generation: None,
        }
    }

    fn ts(month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, month, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn month_lengths_follow_the_calendar() {
        assert_eq!(days_in_month(1, 2023), 28.0);
        assert_eq!(days_in_month(1, 2024), 29.0);
        assert_eq!(days_in_month(0, 2023), 31.0);
        assert_eq!(days_in_month(3, 2023), 30.0);
    }

    #[test]
    fn slot_and_weekday_indexes() {
        // 2023-01-02 is a Monday.
        assert_eq!(weekday_of(ts(1, 2, 0, 0)), 0);
        assert_eq!(slot_of(ts(1, 2, 0, 0)), 0);
        assert_eq!(slot_of(ts(1, 2, 0, 30)), 1);
        assert_eq!(slot_of(ts(1, 2, 23, 30)), 47);
    }

    #[test]
    fn flat_offpeak_january_charges() {
        let tariff = tariff_with_meter("NPM1");
        let mut book = CostBook::new(&["NPM1".to_string()], 2023);
        book.apply_meter_rates(&tariff).unwrap();
        // 10 kWh net grid use at $0.10 spot.
        book.add_unit(&tariff.grid, 0, ts(1, 2, 0, 30), 10.0, 0.1, 0.0, 0.0);
        book.finalize(&tariff);

        let cell = book.month(0, 0);
        assert!((cell.pool_pass_through_charge - 1.0).abs() < 1e-9);
        assert!((cell.service_admin_charge - 15.5).abs() < 1e-9);
        assert!((cell.standing_charge - 31.0).abs() < 1e-9);
        assert!((cell.offpeak_energy_charge - 2.0).abs() < 1e-9);
        assert!((cell.meter_charge - 6.2).abs() < 1e-9);
        let ex_gst = 1.0 + 15.5 + 31.0 + 2.0 + 6.2;
        assert!((cell.total_charge_ex_gst - ex_gst).abs() < 1e-9);
        assert!((cell.gst - ex_gst * 0.1).abs() < 1e-9);
        assert!((cell.total_charge_inc_gst - ex_gst * 1.1).abs() < 1e-9);
    }

    #[test]
    fn export_goes_to_feed_in_and_earns_no_gst() {
        let mut tariff = tariff_with_meter("NPM1");
        // Strip the fixed charges so the month is net negative.
        tariff.monthly = (0..12).map(|_| MonthlyRates::default()).collect();
        let mut book = CostBook::new(&["NPM1".to_string()], 2023);
        book.apply_meter_rates(&tariff).unwrap();
        book.add_unit(&tariff.grid, 0, ts(1, 2, 12, 0), 1.0, 0.1, 5.0, 0.08);
        book.finalize(&tariff);

        let cell = book.month(0, 0);
        assert!((cell.monthly_nett_exported - -4.0).abs() < 1e-9);
        assert!((cell.feed_in_charge - -0.32).abs() < 1e-9);
        assert_eq!(cell.monthly_nett_grid_used, 0.0);
        assert_eq!(cell.gst, 0.0);
        assert!(cell.total_charge_inc_gst < 0.0);
    }

    #[test]
    fn loss_ratios_scale_the_spot_price() {
        let mut tariff = tariff_with_meter("NPM1");
        tariff.meters[0].monthly[0].spot_price_loss_ratio = 0.1;
        let mut book = CostBook::new(&["NPM1".to_string()], 2023);
        book.apply_meter_rates(&tariff).unwrap();
        book.add_unit(&tariff.grid, 0, ts(1, 2, 0, 30), 10.0, 0.1, 0.0, 0.0);
        // 10 kWh at 0.1 * 1.1 loss-adjusted spot.
        assert!((book.month(0, 0).pool_pass_through_charge - 1.1).abs() < 1e-9);
    }

    #[test]
    fn missing_meter_parameters_are_an_error() {
        let tariff = tariff_with_meter("NPM1");
        let mut book = CostBook::new(&["NPM1".to_string(), "NPM2".to_string()], 2023);
        let err = book.apply_meter_rates(&tariff).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing meter parameters in tariff file for meter NPM2"
        );
    }

    #[test]
    fn summaries_carry_totals_into_months_and_quarters() {
        let tariff = tariff_with_meter("NPM1");
        let mut book = CostBook::new(&["NPM1".to_string()], 2023);
        book.apply_meter_rates(&tariff).unwrap();
        book.add_unit(&tariff.grid, 0, ts(2, 1, 10, 0), 10.0, 0.1, 0.0, 0.0);
        book.finalize(&tariff);
        let summaries = book.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].monthly[1], book.month(0, 1).total_charge_inc_gst);
        // Every month carries its fixed charges into the year total.
        let fixed: f64 = (0..12).map(|m| book.month(0, m).total_charge_inc_gst).sum();
        assert!((summaries[0].yearly - fixed).abs() < 1e-9);
    }
}
