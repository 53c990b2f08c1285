//! Per-meter monthly, quarterly and yearly result tables.

use serde::Serialize;

/// Calendar month names, used for table rows and exports.
pub const MONTH_NAMES: [&str; 12] = [
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

/// Processing state of a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterStatus {
    /// Created but holding no data yet.
    Created,
    /// Holds data, not yet part of any subtotal.
    Loaded,
    /// Counted into at least one subtotal.
    IncludedInSubtotal,
}

/// Monthly, quarterly and yearly values for one meter.
///
/// The same shape carries costs, price efficiency indexes and savings;
/// what the numbers mean is up to the producing module.
#[derive(Debug, Clone, Serialize)]
pub struct MeterSummary {
    pub name: String,
    pub year: i32,
    pub status: MeterStatus,
    pub monthly: [f64; 12],
    pub quarterly: [f64; 4],
    pub yearly: f64,
}

impl MeterSummary {
    pub fn new(name: impl Into<String>, year: i32) -> Self {
        MeterSummary {
            name: name.into(),
            year,
            status: MeterStatus::Created,
            monthly: [0.0; 12],
            quarterly: [0.0; 4],
            yearly: 0.0,
        }
    }

    /// Records the value for `month` (0 = January) and rolls it into
    /// the quarter and year totals.
    pub fn set_month(&mut self, month: usize, value: f64) {
        self.monthly[month] = value;
        self.quarterly[month / 3] += value;
        self.yearly += value;
        self.status = MeterStatus::Loaded;
    }

    /// Sums `summaries` element-wise into a `Grand Total` row, marking
    /// each input as included. Returns `None` when there is nothing to
    /// total.
    pub fn grand_total(summaries: &mut [MeterSummary]) -> Option<MeterSummary> {
        let first = summaries.first()?;
        let mut total = MeterSummary::new("Grand Total", first.year);
        for summary in summaries.iter_mut() {
            for month in 0..12 {
                total.monthly[month] += summary.monthly[month];
            }
            for quarter in 0..4 {
                total.quarterly[quarter] += summary.quarterly[quarter];
            }
            total.yearly += summary.yearly;
            summary.status = MeterStatus::IncludedInSubtotal;
        }
        total.status = MeterStatus::Loaded;
        Some(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_month_rolls_up_quarters_and_year() {
        let mut summary = MeterSummary::new("NPM1", 2023);
        summary.set_month(0, 10.0);
        summary.set_month(2, 5.0);
        summary.set_month(11, 2.5);
        assert_eq!(summary.quarterly, [15.0, 0.0, 0.0, 2.5]);
        assert_eq!(summary.yearly, 17.5);
        assert_eq!(summary.status, MeterStatus::Loaded);
    }

    #[test]
    fn set_month_overwrites_the_month_but_accumulates_the_quarter() {
        let mut summary = MeterSummary::new("NPM1", 2023);
        summary.set_month(4, 3.0);
        summary.set_month(4, 7.0);
        assert_eq!(summary.monthly[4], 7.0);
        assert_eq!(summary.quarterly[1], 10.0);
    }

    #[test]
    fn grand_total_sums_and_marks_inputs() {
        let mut summaries = vec![MeterSummary::new("A", 2023), MeterSummary::new("B", 2023)];
        summaries[0].set_month(0, 1.0);
        summaries[1].set_month(0, 2.0);
        let total = MeterSummary::grand_total(&mut summaries).unwrap();
        assert_eq!(total.name, "Grand Total");
        assert_eq!(total.monthly[0], 3.0);
        assert_eq!(total.yearly, 3.0);
        assert!(summaries
            .iter()
            .all(|s| s.status == MeterStatus::IncludedInSubtotal));
    }

    #[test]
    fn grand_total_of_nothing_is_none() {
        assert!(MeterSummary::grand_total(&mut []).is_none());
    }
}
