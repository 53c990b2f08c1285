//! Price Efficiency Index calculation.
//!
//! The PEI compares what a meter actually paid against what it would
//! have paid spreading the same usage evenly over every interval. A
//! value above 1 means consumption leaned into the expensive intervals.
//! Every per-interval rate is halved to a 30-minute figure, and net
//! usage is clamped at zero so exports do not reward the index.

use chrono::NaiveDateTime;

use crate::billing::{days_in_month, slot_of, weekday_of, MissingMeterRates};
use crate::summary::{MeterStatus, MeterSummary};
use crate::tariff::{MonthlyRates, RateGrid, RatePeriod, TariffConfig};

/// PEI over one set of accumulators. `-1` marks a span with no charge
/// or no usage, rendered as not-available downstream.
pub fn calculate_pei(charge: f64, charge_usage: f64, usage: f64, measurements: u32) -> f64 {
    if charge == 0.0 || usage == 0.0 {
        -1.0
    } else {
        charge_usage * f64::from(measurements) / (charge * usage)
    }
}

/// PEI accumulators for one meter and one month.
#[derive(Debug, Clone)]
pub struct MonthlyPei {
    pub meter: String,
    pub month: usize,
    pub year: i32,
    pub days_in_month: f64,
    pub spot_price_loss_ratio: f64,

    /// Usage before any generation offset.
    pub monthly_usage: f64,
    pub monthly_generated: f64,
    pub monthly_nett: f64,
    pub peak_usage: f64,
    pub shoulder_usage: f64,
    pub offpeak_usage: f64,
    /// Sum of each interval's 30-minute charge.
    pub sum_total_charge: f64,
    /// Sum of each interval's charge multiplied by its net usage.
    pub sum_charge_usage: f64,
    pub measurements: u32,
}

impl MonthlyPei {
    fn new(meter: &str, month: usize, year: i32) -> Self {
        MonthlyPei {
            meter: meter.to_string(),
            month,
            year,
            days_in_month: days_in_month(month, year),
            spot_price_loss_ratio: 0.0,
            monthly_usage: 0.0,
            monthly_generated: 0.0,
            monthly_nett: 0.0,
            peak_usage: 0.0,
            shoulder_usage: 0.0,
            offpeak_usage: 0.0,
            sum_total_charge: 0.0,
            sum_charge_usage: 0.0,
            measurements: 0,
        }
    }

    fn add_unit(
        &mut self,
        grid: &RateGrid,
        rates: &MonthlyRates,
        ts: NaiveDateTime,
        usage: f64,
        spot: f64,
        generated: f64,
    ) {
        let mut nett = usage - generated;
        if nett < 0.0 {
            nett = 0.0;
        }
        self.monthly_usage += usage;
        self.monthly_generated += generated;
        self.monthly_nett += nett;

        let half_inc_loss = |rate: f64, loss: f64| (rate + rate * loss) / 2.0;
        let spot_inc_loss = spot + spot * self.spot_price_loss_ratio / 2.0;
        let mut total_charge = half_inc_loss(rates.veet_rate, rates.veet_loss_ratio)
            + half_inc_loss(rates.sres_rate, rates.sres_loss_ratio)
            + half_inc_loss(rates.lret_rate, rates.lret_loss_ratio)
            + half_inc_loss(rates.aemo_pool_rert_rate, rates.aemo_pool_rert_loss_ratio)
            + half_inc_loss(rates.ancillary_services_rate, rates.ancillary_services_loss_ratio)
            + spot_inc_loss;

        match grid.period(weekday_of(ts), slot_of(ts)) {
            RatePeriod::Peak => {
                self.peak_usage += nett;
                total_charge += rates.peak_rate / 2.0;
            }
            RatePeriod::Shoulder => {
                self.shoulder_usage += nett;
                total_charge += rates.shoulder_rate / 2.0;
            }
            RatePeriod::Offpeak => {
                self.offpeak_usage += nett;
                total_charge += rates.offpeak_rate / 2.0;
            }
        }

        self.sum_total_charge += total_charge;
        self.sum_charge_usage += total_charge * nett;
        self.measurements += 1;
    }

    pub fn pei(&self) -> f64 {
        calculate_pei(
            self.sum_total_charge,
            self.sum_charge_usage,
            self.monthly_usage,
            self.measurements,
        )
    }
}

/// All PEI cells for one run, meter-major.
#[derive(Debug, Clone)]
pub struct PeiBook {
    pub meters: Vec<String>,
    pub year: i32,
    cells: Vec<Vec<MonthlyPei>>,
}

impl PeiBook {
    pub fn new(meters: &[String], year: i32) -> Self {
        let cells = meters
            .iter()
            .map(|meter| (0..12).map(|month| MonthlyPei::new(meter, month, year)).collect())
            .collect();
        PeiBook {
            meters: meters.to_vec(),
            year,
            cells,
        }
    }

    /// Copies each meter's monthly spot price loss ratio out of the
    /// tariff.
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
                self.cells[idx][month].spot_price_loss_ratio = params.spot_price_loss_ratio;
            }
        }
        Ok(())
    }

    /// Folds one meter's reading for one interval into its month cell.
    pub fn add_unit(
        &mut self,
        tariff: &TariffConfig,
        meter: usize,
        ts: NaiveDateTime,
        usage: f64,
        spot: f64,
        generated: f64,
    ) {
        let month = chrono::Datelike::month0(&ts) as usize;
        let rates = &tariff.monthly[month];
        self.cells[meter][month].add_unit(&tariff.grid, rates, ts, usage, spot, generated);
    }

    pub fn month(&self, meter: usize, month: usize) -> &MonthlyPei {
        &self.cells[meter][month]
    }

    /// Monthly, quarterly and yearly PEIs per meter plus a pooled
    /// `Grand Total`, each span recomputed from summed accumulators
    /// rather than averaged.
    pub fn summaries(&self) -> Vec<MeterSummary> {
        let mut summaries: Vec<MeterSummary> = self
            .cells
            .iter()
            .enumerate()
            .map(|(idx, months)| self.meter_summary(idx, months))
            .collect();

        if !summaries.is_empty() {
            let mut total = MeterSummary::new("Grand Total", self.year);
            for quarter in 0..4 {
                let mut q = SpanAccumulator::default();
                for offset in 0..3 {
                    let month = quarter * 3 + offset;
                    let mut m = SpanAccumulator::default();
                    for months in &self.cells {
                        m.add(&months[month]);
                    }
                    total.monthly[month] = m.pei();
                    q = q.merged(&m);
                }
                total.quarterly[quarter] = q.pei();
            }
            let mut y = SpanAccumulator::default();
            for months in &self.cells {
                for cell in months {
                    y.add(cell);
                }
            }
            total.yearly = y.pei();
            total.status = MeterStatus::Loaded;
            for summary in &mut summaries {
                summary.status = MeterStatus::IncludedInSubtotal;
            }
            summaries.push(total);
        }
        summaries
    }

    fn meter_summary(&self, idx: usize, months: &[MonthlyPei]) -> MeterSummary {
        let mut summary = MeterSummary::new(self.meters[idx].clone(), self.year);
        for quarter in 0..4 {
            let mut q = SpanAccumulator::default();
            for offset in 0..3 {
                let month = quarter * 3 + offset;
                summary.monthly[month] = months[month].pei();
                q.add(&months[month]);
            }
            summary.quarterly[quarter] = q.pei();
        }
        let mut y = SpanAccumulator::default();
        for cell in months {
            y.add(cell);
        }
        summary.yearly = y.pei();
        summary.status = MeterStatus::Loaded;
        summary
    }
}

/// Accumulator sums for a quarter, a year or a pool of meters.
#[derive(Debug, Default, Clone, Copy)]
struct SpanAccumulator {
    charge: f64,
    charge_usage: f64,
    usage: f64,
    measurements: u32,
}

impl SpanAccumulator {
    fn add(&mut self, cell: &MonthlyPei) {
        self.charge += cell.sum_total_charge;
        self.charge_usage += cell.sum_charge_usage;
        self.usage += cell.monthly_usage;
        self.measurements += cell.measurements;
    }

    fn merged(&self, other: &SpanAccumulator) -> SpanAccumulator {
        SpanAccumulator {
            charge: self.charge + other.charge,
            charge_usage: self.charge_usage + other.charge_usage,
            usage: self.usage + other.usage,
            measurements: self.measurements + other.measurements,
        }
    }

    fn pei(&self) -> f64 {
        calculate_pei(self.charge, self.charge_usage, self.usage, self.measurements)
    }
}
