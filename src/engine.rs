//! End-to-end calculation pipeline.
//!
//! Loads the tariff, scans the interval files for meters and the year,
//! runs the interval loop into the cost and PEI books, then layers the
//! optional baseline savings and lifecycle analysis on top.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use crate::billing::{CostBook, MissingMeterRates};
use crate::lifecycle::{EnergyAggregates, LifecycleAnalysis, LifecycleError, LifecycleReport};
use crate::pei::PeiBook;
use crate::registry::{MeterRegistry, RegistryError};
use crate::savings::{BaselineBill, BaselineError};
use crate::summary::MeterSummary;
use crate::sync::{self, Stream, SyncError};
use crate::tariff::{TariffConfig, TariffError};

pub const USAGE_LABEL: &str = "Energy Usage";
pub const PRICE_LABEL: &str = "AEMO Spot Price";
pub const GENERATED_LABEL: &str = "Generated Energy";
pub const FEED_IN_LABEL: &str = "Feed-in Tariff";

/// Input files for one run. Only the tariff is mandatory; usage and
/// price come as a pair, as do generated and feed-in.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub tariff: PathBuf,
    pub usage: Option<PathBuf>,
    pub price: Option<PathBuf>,
    pub generated: Option<PathBuf>,
    pub feed_in: Option<PathBuf>,
    pub baseline: Option<PathBuf>,
    pub lifecycle: Option<PathBuf>,
}

/// Everything a run produces.
#[derive(Debug)]
pub struct RunOutput {
    pub year: i32,
    pub cost: CostBook,
    /// Per-meter bill totals with the grand total appended.
    pub cost_summaries: Vec<MeterSummary>,
    /// Present when usage data was processed.
    pub pei_summaries: Option<Vec<MeterSummary>>,
    pub baseline: Option<BaselineBill>,
    /// Baseline minus calculated cost, grand total appended.
    pub savings_summaries: Option<Vec<MeterSummary>>,
    pub lifecycle: Option<LifecycleReport>,
    /// Non-fatal observations, one message each.
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub enum CalcError {
    Tariff(TariffError),
    Registry(RegistryError),
    Sync(SyncError),
    Baseline(BaselineError),
    Lifecycle(LifecycleError),
    MissingMeterRates(MissingMeterRates),
    /// One file of a pair was given without its partner.
    UnpairedFile { have: &'static str, need: &'static str },
    /// The tariff names a distribution meter absent from the data.
    UnknownDistributionMeter,
    Io { path: String, source: io::Error },
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalcError::Tariff(e) => e.fmt(f),
            CalcError::Registry(e) => e.fmt(f),
            CalcError::Sync(e) => e.fmt(f),
            CalcError::Baseline(e) => e.fmt(f),
            CalcError::Lifecycle(e) => e.fmt(f),
            CalcError::MissingMeterRates(e) => e.fmt(f),
            CalcError::UnpairedFile { have, need } => {
                write!(f, "{have} file must be accompanied by a {need} file")
            }
            CalcError::UnknownDistributionMeter => {
                write!(f, "Not all named energy distribution meters exist")
            }
            CalcError::Io { path, source } => write!(f, "cannot open {path}: {source}"),
        }
    }
}

impl std::error::Error for CalcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CalcError::Tariff(e) => Some(e),
            CalcError::Registry(e) => Some(e),
            CalcError::Sync(e) => Some(e),
            CalcError::Baseline(e) => Some(e),
            CalcError::Lifecycle(e) => Some(e),
            CalcError::MissingMeterRates(e) => Some(e),
            CalcError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<TariffError> for CalcError {
    fn from(e: TariffError) -> Self {
        CalcError::Tariff(e)
    }
}

impl From<RegistryError> for CalcError {
    fn from(e: RegistryError) -> Self {
        CalcError::Registry(e)
    }
}

impl From<SyncError> for CalcError {
    fn from(e: SyncError) -> Self {
        CalcError::Sync(e)
    }
}

impl From<BaselineError> for CalcError {
    fn from(e: BaselineError) -> Self {
        CalcError::Baseline(e)
    }
}

impl From<LifecycleError> for CalcError {
    fn from(e: LifecycleError) -> Self {
        CalcError::Lifecycle(e)
    }
}

impl From<MissingMeterRates> for CalcError {
    fn from(e: MissingMeterRates) -> Self {
        CalcError::MissingMeterRates(e)
    }
}

fn open(path: &Path) -> Result<BufReader<File>, CalcError> {
    let file = File::open(path).map_err(|source| CalcError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(BufReader::new(file))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn pair<'a>(
    first: &'a Option<PathBuf>,
    second: &'a Option<PathBuf>,
    first_label: &'static str,
    second_label: &'static str,
) -> Result<Option<(&'a Path, &'a Path)>, CalcError> {
    match (first, second) {
        (Some(a), Some(b)) => Ok(Some((a, b))),
        (Some(_), None) => Err(CalcError::UnpairedFile {
            have: first_label,
            need: second_label,
        }),
        (None, Some(_)) => Err(CalcError::UnpairedFile {
            have: second_label,
            need: first_label,
        }),
        (None, None) => Ok(None),
    }
}

/// Decides which meters receive pooled generation, and in what order.
///
/// An explicit list from the tariff is validated against the known
/// meters and used as-is. Without one, every usage meter participates;
/// a baseline bill then ranks them from most to least costly so the
/// pool offsets the dearest usage first.
fn distribution_order(
    tariff: &TariffConfig,
    registry: &MeterRegistry,
    baseline: Option<&BaselineBill>,
) -> Result<Vec<usize>, CalcError> {
    let Some(generation) = &tariff.generation else {
        return Ok(Vec::new());
    };

    let mut names: Vec<String> = if generation.explicit {
        for name in &generation.meters {
            if !registry.meters.contains(name) {
                return Err(CalcError::UnknownDistributionMeter);
            }
        }
        generation.meters.clone()
    } else {
        registry.meters[..registry.usage_columns].to_vec()
    };

    if let (Some(bill), false) = (baseline, generation.explicit) {
        let mut ranked: Vec<(String, f64)> = names
            .iter()
            .filter_map(|name| bill.yearly_cost(name).map(|cost| (name.clone(), cost)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let mut ordered: Vec<String> = ranked.into_iter().map(|(name, _)| name).collect();
        for name in &names {
            if !ordered.contains(name) {
                ordered.push(name.clone());
            }
        }
        names = ordered;
    }

    Ok(names
        .iter()
        .filter_map(|name| registry.meters.iter().position(|meter| meter == name))
        .collect())
}

/// Runs the whole calculation over the configured files.
///
/// # Errors
///
/// Any file that cannot be opened, parsed or reconciled aborts the
/// whole run with the first error met; there are no partial results.
pub fn run(config: &RunConfig) -> Result<RunOutput, CalcError> {
    let tariff = TariffConfig::from_reader(open(&config.tariff)?)?;

    let usage_pair = pair(&config.usage, &config.price, USAGE_LABEL, PRICE_LABEL)?;
    let generated_pair = pair(
        &config.generated,
        &config.feed_in,
        GENERATED_LABEL,
        FEED_IN_LABEL,
    )?;

    let registry = MeterRegistry::scan(
        usage_pair.map(|(usage, _)| open(usage)).transpose()?,
        generated_pair.map(|(generated, _)| open(generated)).transpose()?,
    )?;

    let baseline = match &config.baseline {
        Some(path) => Some(BaselineBill::from_reader(open(path)?, &file_name(path))?),
        None => None,
    };

    // Generation is only redistributed when both pairs are present.
    let distribution = if usage_pair.is_some() && generated_pair.is_some() {
        distribution_order(&tariff, &registry, baseline.as_ref())?
    } else {
        Vec::new()
    };

    let mut cost = CostBook::new(&registry.meters, registry.year);
    cost.apply_meter_rates(&tariff)?;
    let mut pei = if usage_pair.is_some() {
        let mut book = PeiBook::new(&registry.meters[..registry.usage_columns], registry.year);
        book.apply_meter_rates(&tariff)?;
        Some(book)
    } else {
        None
    };

    let usage_streams = match usage_pair {
        Some((usage, price)) => Some((
            Stream::new(USAGE_LABEL, open(usage)?),
            Stream::new(PRICE_LABEL, open(price)?),
        )),
        None => None,
    };
    let generated_streams = match generated_pair {
        Some((generated, feed_in)) => Some((
            Stream::new(GENERATED_LABEL, open(generated)?),
            Stream::new(FEED_IN_LABEL, open(feed_in)?),
        )),
        None => None,
    };

    let outcome = sync::process(
        usage_streams,
        generated_streams,
        &tariff,
        &registry,
        &distribution,
        &mut cost,
        pei.as_mut(),
    )?;
    cost.finalize(&tariff);

    let mut warnings = Vec::new();
    if !outcome.short_streams.is_empty() {
        warnings.push(format!(
            "{} ended before the other files; calculations stop at the shortest file",
            outcome.short_streams.join(", ")
        ));
    }

    let mut cost_summaries = cost.summaries();
    if let Some(total) = MeterSummary::grand_total(&mut cost_summaries) {
        cost_summaries.push(total);
    }
    let pei_summaries = pei.as_ref().map(PeiBook::summaries);

    let savings_summaries = baseline.as_ref().map(|bill| {
        let per_meter = cost.summaries();
        let mut savings = bill.savings(&per_meter);
        if let Some(total) = MeterSummary::grand_total(&mut savings) {
            savings.push(total);
        }
        savings
    });

    let lifecycle = match &config.lifecycle {
        Some(path) => {
            let analysis = LifecycleAnalysis::from_reader(open(path)?)?;
            let savings_monthly = savings_summaries
                .as_ref()
                .and_then(|summaries| summaries.last())
                .map(|total| total.monthly);
            let energy = EnergyAggregates {
                exported: cost.energy_exported(),
                generated: cost.total_generated,
                grid_used: cost.grid_used(),
            };
            Some(analysis.calculate(savings_monthly.as_ref(), Some(&energy)))
        }
        None => None,
    };

    Ok(RunOutput {
        year: registry.year,
        cost,
        cost_summaries,
        pei_summaries,
        baseline,
        savings_summaries,
        lifecycle,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MeterRegistry;
    use crate::savings::BaselineBill;
    use crate::tariff::{GenerationConfig, TariffConfig};
    use std::io::Cursor;

    fn registry_two_meters() -> MeterRegistry {
        let usage = Cursor::new("Date,NPM1,NPM2\n1/01/2023 0:30,1.0,2.0\n");
        MeterRegistry::scan(Some(usage), None::<Cursor<&str>>).unwrap()
    }

    fn tariff_with_generation(meters: Vec<String>, explicit: bool) -> TariffConfig {
        TariffConfig {
            name: None,
            grid: Default::default(),
            monthly: Vec::new(),
            meters: Vec::new(),
            generation: Some(GenerationConfig { meters, explicit }),
        }
    }

    #[test]
    fn one_file_of_a_pair_is_rejected() {
        let err = pair(
            &Some(PathBuf::from("usage.csv")),
            &None,
            USAGE_LABEL,
            PRICE_LABEL,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Energy Usage file must be accompanied by a AEMO Spot Price file"
        );
    }

    #[test]
    fn explicit_distribution_list_must_name_real_meters() {
        let registry = registry_two_meters();
        let tariff = tariff_with_generation(vec!["NPM9".to_string()], true);
        let err = distribution_order(&tariff, &registry, None).unwrap_err();
        assert!(matches!(err, CalcError::UnknownDistributionMeter));
    }

    #[test]
    fn implicit_distribution_covers_all_usage_meters() {
        let registry = registry_two_meters();
        let tariff = tariff_with_generation(Vec::new(), false);
        let order = distribution_order(&tariff, &registry, None).unwrap();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn baseline_ranks_implicit_distribution_by_cost() {
        let registry = registry_two_meters();
        let tariff = tariff_with_generation(Vec::new(), false);
        let text = "Bill,for,2023\nsecond banner\n\
            Year,Quarter,Month,Days,NPM1,NPM2\n\
            2023,Q1,January,31,10.0,90.0\n\
            2023,Q1,February,28,10.0,90.0\n\
            2023,Q1,March,31,10.0,90.0\n\
            2023,Q1,Quarterly,90,30.0,270.0\n\
            2023,Q2,April,30,10.0,90.0\n\
            2023,Q2,May,31,10.0,90.0\n\
            2023,Q2,June,30,10.0,90.0\n\
            2023,Q2,Quarterly,91,30.0,270.0\n\
            2023,Q3,July,31,10.0,90.0\n\
            2023,Q3,August,31,10.0,90.0\n\
            2023,Q3,September,30,10.0,90.0\n\
            2023,Q3,Quarterly,92,30.0,270.0\n\
            2023,Q4,October,31,10.0,90.0\n\
            2023,Q4,November,30,10.0,90.0\n\
            2023,Q4,December,31,10.0,90.0\n\
            2023,Q4,Quarterly,92,30.0,270.0\n\
            2023,Year,Yearly,365,120.0,1080.0\n";
        let bill = BaselineBill::from_reader(Cursor::new(text), "bau.csv").unwrap();
        let order = distribution_order(&tariff, &registry, Some(&bill)).unwrap();
        // NPM2 is the dearer meter so it heads the queue.
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn explicit_list_keeps_its_stated_order() {
        let registry = registry_two_meters();
        let tariff =
            tariff_with_generation(vec!["NPM2".to_string(), "NPM1".to_string()], true);
        let order = distribution_order(&tariff, &registry, None).unwrap();
        assert_eq!(order, vec![1, 0]);
    }
}
