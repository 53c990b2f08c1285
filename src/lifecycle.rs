//! Lifecycle cost analysis of a proposed investment.
//!
//! The parameters file is keyword-driven: project-wide lines
//! (`investment name`, `lifetime`, `discount rate`, `inflation rate`,
//! `degradation rate`) plus one `component` block per piece of
//! equipment, each block running until a line with an empty first cell.
//! All rates are percentages. The analysis discounts every cost stream
//! to net present value and annualises it over the project lifetime.

use std::fmt;
use std::io::BufRead;

use serde::Serialize;

use crate::record::split_columns;

/// One piece of equipment in the proposal, as loaded.
#[derive(Debug, Clone, Default)]
pub struct LifecycleComponent {
    pub name: String,
    pub cost_code: Option<String>,
    pub qty: f64,
    pub capital_cost: f64,
    pub installation_cost: f64,
    pub fixed_om_cost: f64,
    pub replacement_cost: f64,
    /// Years between replacements.
    pub replacement_frequency: u32,
    pub future_cost: f64,
    /// Years between future cost payments.
    pub future_frequency: u32,
    /// Overrides the project discount rate when present.
    pub discount_rate: Option<f64>,
    /// Overrides the project inflation rate when present.
    pub inflation_rate: Option<f64>,
}

impl LifecycleComponent {
    fn has_costs(&self) -> bool {
        self.capital_cost != 0.0
            || self.installation_cost != 0.0
            || self.fixed_om_cost != 0.0
            || self.replacement_cost != 0.0
            || self.future_cost != 0.0
    }
}

/// All problems found in one pass over the parameters file.
#[derive(Debug, Clone)]
pub struct LifecycleError {
    pub issues: Vec<String>,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Problems with Lifecycle Cost Parameters file")?;
        for issue in &self.issues {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for LifecycleError {}

/// The loaded proposal: project-wide parameters plus components.
#[derive(Debug, Clone)]
pub struct LifecycleAnalysis {
    pub investment_name: String,
    pub lifetime: f64,
    /// Percentages.
    pub discount_rate: f64,
    pub inflation_rate: f64,
    pub degradation_rate: f64,
    pub components: Vec<LifecycleComponent>,
}

fn numeric(
    tokens: &[String],
    label: &str,
    line: usize,
    issues: &mut Vec<String>,
) -> Option<f64> {
    match tokens.get(1).and_then(|t| t.parse().ok()) {
        Some(v) => Some(v),
        None => {
            issues.push(format!(
                "{label} must be a number. Line {line} in Lifecycle Cost Parameters file"
            ));
            None
        }
    }
}

impl LifecycleAnalysis {
    /// Parses a lifecycle parameters file, collecting every problem
    /// before failing.
    ///
    /// # Errors
    ///
    /// Returns a [`LifecycleError`] listing malformed values and any
    /// missing mandatory parameters.
    pub fn from_reader(reader: impl BufRead) -> Result<Self, LifecycleError> {
        let mut issues: Vec<String> = Vec::new();
        let mut investment_name: Option<String> = None;
        let mut lifetime: Option<f64> = None;
        let mut discount_rate: Option<f64> = None;
        let mut inflation_rate: Option<f64> = None;
        let mut degradation_rate = 0.0;
        let mut components: Vec<LifecycleComponent> = Vec::new();

        let mut lines = reader.lines();
        let mut line_no = 0usize;
        loop {
            let Some(line) = lines.next() else { break };
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    issues.push(format!("unreadable line: {e}"));
                    break;
                }
            };
            line_no += 1;
            let tokens = split_columns(&line);
            let Some(key) = tokens.first() else { continue };
            match key.to_lowercase().as_str() {
                "investment name" => match tokens.get(1) {
                    Some(name) => investment_name = Some(name.clone()),
                    None => issues
                        .push("Lifecycle Cost Parameters file is missing Investment Name".to_string()),
                },
                "lifetime" => {
                    match numeric(&tokens, "Lifetime", line_no, &mut issues) {
                        Some(v) if v >= 1.0 => lifetime = Some(v),
                        Some(_) => issues.push(format!(
                            "Lifetime must be at least 1. Line {line_no} in Lifecycle Cost Parameters file"
                        )),
                        None => {}
                    }
                }
                "discount rate" => {
                    discount_rate = numeric(&tokens, "Discount Rate", line_no, &mut issues)
                        .or(discount_rate);
                }
                "inflation rate" => {
                    inflation_rate = numeric(&tokens, "Inflation Rate", line_no, &mut issues)
                        .or(inflation_rate);
                }
                "degradation rate" => {
                    if let Some(v) = numeric(&tokens, "Degradation Rate", line_no, &mut issues) {
                        degradation_rate = v;
                    }
                }
                "component" => {
                    let name = match tokens.get(1) {
                        Some(name) => name.clone(),
                        None => {
                            issues.push(format!(
                                "Component is missing a name. Line {line_no} in Lifecycle Cost Parameters file"
                            ));
                            String::new()
                        }
                    };
                    components.push(read_component(name, &mut lines, &mut line_no, &mut issues));
                }
                _ => {}
            }
        }

        if investment_name.is_none() {
            issues.push("Lifecycle Cost Parameter file missing Investment Name".to_string());
        }
        if lifetime.is_none() {
            issues.push("Lifecycle Cost Parameter file missing project lifetime".to_string());
        }
        if discount_rate.is_none() {
            issues.push("Lifecycle Cost Parameter file missing Discount Rate".to_string());
        }
        if inflation_rate.is_none() {
            issues.push("Lifecycle Cost Parameter file missing Inflation Rate".to_string());
        }
        if components.is_empty() {
            issues.push("Lifecycle Cost Parameter file missing components".to_string());
        }
        for component in &components {
            if component.name.is_empty() {
                issues.push("At least one Lifecycle Cost Parameter component missing a name".to_string());
            } else if !component.has_costs() {
                issues.push(format!(
                    "Lifecycle Cost Parameter component \"{}\" has no costs",
                    component.name
                ));
            }
        }

        if !issues.is_empty() {
            return Err(LifecycleError { issues });
        }
        // The mandatory checks above guarantee these are present.
        Ok(LifecycleAnalysis {
            investment_name: investment_name.unwrap_or_default(),
            lifetime: lifetime.unwrap_or(1.0),
            discount_rate: discount_rate.unwrap_or_default(),
            inflation_rate: inflation_rate.unwrap_or_default(),
            degradation_rate,
            components,
        })
    }

    /// Runs the full financial analysis.
    ///
    /// `savings_monthly` is the grand-total monthly saving against the
    /// baseline bill, when one was calculated; `energy` carries the
    /// year's energy aggregates, when interval data was processed.
    pub fn calculate(
        &self,
        savings_monthly: Option<&[f64; 12]>,
        energy: Option<&EnergyAggregates>,
    ) -> LifecycleReport {
        let exported = energy.map_or(0.0, |e| e.exported.abs());
        let generated = energy.map_or(0.0, |e| e.generated.abs());
        let grid_used = energy.map_or(0.0, |e| e.grid_used.abs());

        let d = self.discount_rate / 100.0;
        let mut sum_alcc_generated = 0.0;
        let mut n = 1u32;
        while f64::from(n) <= self.lifetime {
            sum_alcc_generated += generated
                * (1.0 - self.degradation_rate / 100.0).powi(n as i32)
                / (1.0 + d).powi(n as i32);
            n += 1;
        }

        let j = j_factor(self.discount_rate, self.inflation_rate);

        let mut next_cost_code = 1u32;
        let mut components = Vec::with_capacity(self.components.len());
        let mut totals = AtlccTotals::default();
        let mut cost_of_investment = 0.0;
        let mut npv_cost = 0.0;
        for component in &self.components {
            let cost_code = match &component.cost_code {
                Some(code) => code.clone(),
                None => {
                    let code = next_cost_code.to_string();
                    next_cost_code += 1;
                    code
                }
            };
            let analysis = analyze_component(
                component,
                cost_code,
                self.lifetime,
                self.discount_rate,
                self.inflation_rate,
            );
            totals.capital += analysis.atlcc_capital;
            totals.installation += analysis.atlcc_installation;
            totals.fixed_om += analysis.atlcc_fixed_om;
            totals.replacement += analysis.atlcc_replacement;
            totals.future += analysis.atlcc_future;
            cost_of_investment += analysis.total_capital_cost + analysis.total_installation_cost;
            npv_cost += analysis.total_npv;
            components.push(analysis);
        }
        let total_atlcc = totals.capital + totals.installation + totals.fixed_om + totals.replacement + totals.future;

        let monthly_j = j / 12.0;
        let monthly_inflation = self.inflation_rate / 12.0;
        let mut annual_total_savings = 0.0;
        let mut npv_revenue = 0.0;
        if let Some(monthly) = savings_monthly {
            for (k, saving) in monthly.iter().enumerate() {
                annual_total_savings += saving
                    * (1.0 + monthly_inflation / 100.0).powi(k as i32)
                    / (1.0 + monthly_j / 100.0).powi(k as i32);
            }
            let mut n = 1u32;
            while f64::from(n) <= self.lifetime {
                npv_revenue += annual_total_savings * (1.0 + j / 100.0).powf(self.lifetime);
                n += 1;
            }
        }

        let payback_years = if annual_total_savings != 0.0 {
            Some(cost_of_investment / annual_total_savings)
        } else {
            None
        };
        let lcoe = if generated == 0.0 {
            None
        } else {
            Some(npv_cost.abs() / sum_alcc_generated)
        };

        LifecycleReport {
            investment_name: self.investment_name.clone(),
            lifetime: self.lifetime,
            discount_rate: self.discount_rate,
            inflation_rate: self.inflation_rate,
            degradation_rate: self.degradation_rate,
            j,
            components,
            total_atlcc_capital: totals.capital,
            total_atlcc_installation: totals.installation,
            total_atlcc_fixed_om: totals.fixed_om,
            total_atlcc_replacement: totals.replacement,
            total_atlcc_future: totals.future,
            total_atlcc,
            cost_of_investment,
            npv_cost,
            annual_total_savings,
            npv_revenue,
            npv: npv_cost + npv_revenue,
            annual_worth: total_atlcc + annual_total_savings,
            payback_years,
            lcoe,
            sum_alcc_energy_generated: sum_alcc_generated,
            annual_energy_generated: generated,
            annual_energy_exported: exported,
            annual_grid_used: grid_used,
        }
    }
}

/// Reads one component block until a line with an empty first cell.
fn read_component(
    name: String,
    lines: &mut impl Iterator<Item = std::io::Result<String>>,
    line_no: &mut usize,
    issues: &mut Vec<String>,
) -> LifecycleComponent {
    let mut component = LifecycleComponent {
        name,
        ..LifecycleComponent::default()
    };
    loop {
        let Some(Ok(line)) = lines.next() else { break };
        *line_no += 1;
        let tokens = split_columns(&line);
        let Some(key) = tokens.first() else { break };
        if key.is_empty() {
            break;
        }
        let key = key.to_lowercase();
        if tokens.len() < 2 {
            issues.push(format!(
                "Missing value for {} for component \"{}\" at line {}",
                tokens[0], component.name, line_no
            ));
            continue;
        }
        match key.as_str() {
            "cost code" => component.cost_code = Some(tokens[1].clone()),
            "number of units" => {
                if let Some(v) = numeric(&tokens, "Number of Units", *line_no, issues) {
                    component.qty = v;
                }
            }
            "capital cost" => {
                if let Some(v) = numeric(&tokens, "Capital Cost", *line_no, issues) {
                    component.capital_cost = v;
                }
            }
            "installation cost" => {
                if let Some(v) = numeric(&tokens, "Installation Cost", *line_no, issues) {
                    component.installation_cost = v;
                }
            }
            "fixed o&m cost" => {
                if let Some(v) = numeric(&tokens, "Fixed O&M Cost", *line_no, issues) {
                    component.fixed_om_cost = v;
                }
            }
            "replacement cost" => {
                if let Some(v) = numeric(&tokens, "Replacement Cost", *line_no, issues) {
                    component.replacement_cost = v;
                }
                match tokens.get(2).and_then(|t| t.parse().ok()) {
                    Some(freq) => component.replacement_frequency = freq,
                    None => issues.push(format!(
                        "Need replacement frequency (in years) for component \"{}\" at line {}",
                        component.name, line_no
                    )),
                }
            }
            "future cost" => {
                if let Some(v) = numeric(&tokens, "Future Cost", *line_no, issues) {
                    component.future_cost = v;
                }
                match tokens.get(2).and_then(|t| t.parse().ok()) {
                    Some(freq) => component.future_frequency = freq,
                    None => issues.push(format!(
                        "Need future cost frequency (in years) for component \"{}\" at line {}",
                        component.name, line_no
                    )),
                }
            }
            "discount rate" => {
                component.discount_rate = numeric(&tokens, "Discount Rate", *line_no, issues);
            }
            "inflation rate" => {
                component.inflation_rate = numeric(&tokens, "Inflation Rate", *line_no, issues);
            }
            _ => {}
        }
    }
    component
}

/// Combined discount-and-inflation factor, as a percentage.
fn j_factor(discount_rate: f64, inflation_rate: f64) -> f64 {
    let d = discount_rate / 100.0;
    let i = inflation_rate / 100.0;
    (d + i + d * i) * 100.0
}

/// Annualisation factor spreading a present value over `lifetime`
/// years at rate `j`.
///
/// A `j` of 0 (discount and inflation both zero) makes the expression
/// 0/0; the factor, and every annualised cost built from it, is then
/// NaN rather than the `1/lifetime` limit.
fn atlcc_factor(j: f64, lifetime: f64) -> f64 {
    let r = j / 100.0;
    (r * (1.0 + r).powf(lifetime)) / ((1.0 + r).powf(lifetime) - 1.0)
}

/// Energy aggregates from the billing run, all in kWh.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyAggregates {
    /// Net energy exported over the year (sign ignored).
    pub exported: f64,
    /// Generated energy pooled over the year.
    pub generated: f64,
    /// Net energy drawn from the grid over the year.
    pub grid_used: f64,
}

#[derive(Debug, Default)]
struct AtlccTotals {
    capital: f64,
    installation: f64,
    fixed_om: f64,
    replacement: f64,
    future: f64,
}

/// Derived financial measures for one component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentAnalysis {
    pub cost_code: String,
    pub name: String,
    pub qty: f64,
    pub discount_rate: f64,
    pub inflation_rate: f64,
    pub j: f64,
    pub annual_ndr: f64,
    pub total_capital_cost: f64,
    pub total_installation_cost: f64,
    pub total_fixed_om_cost: f64,
    pub total_replacement_cost: f64,
    pub total_future_cost: f64,
    /// Years in which replacements fall due.
    pub replacement_years: Vec<u32>,
    /// Years in which future costs fall due.
    pub future_years: Vec<u32>,
    pub npv_capital: f64,
    pub npv_installation: f64,
    pub npv_fixed_om: f64,
    pub npv_replacement: f64,
    pub npv_future: f64,
    pub total_npv: f64,
    pub atlcc_capital: f64,
    pub atlcc_installation: f64,
    pub atlcc_fixed_om: f64,
    pub atlcc_replacement: f64,
    pub atlcc_future: f64,
}

fn analyze_component(
    component: &LifecycleComponent,
    cost_code: String,
    lifetime: f64,
    project_discount: f64,
    project_inflation: f64,
) -> ComponentAnalysis {
    let discount_rate = component.discount_rate.unwrap_or(project_discount);
    let inflation_rate = component.inflation_rate.unwrap_or(project_inflation);
    let i = inflation_rate / 100.0;
    let d = discount_rate / 100.0;
    let j = j_factor(discount_rate, inflation_rate);
    let jr = j / 100.0;

    let total_capital_cost = component.capital_cost * component.qty;
    let total_installation_cost = component.installation_cost * component.qty;
    let total_fixed_om_cost = component.fixed_om_cost * component.qty;
    let total_replacement_cost = component.replacement_cost * component.qty;
    let total_future_cost = component.future_cost * component.qty;

    let npv_capital = -total_capital_cost;
    let npv_installation = -total_installation_cost;
    let annual_ndr = ((1.0 + d) / (1.0 + i) - 1.0) * 100.0;

    let mut npv_fixed_om = 0.0;
    if total_fixed_om_cost > 0.0 {
        let mut n = 1u32;
        while f64::from(n) <= lifetime {
            npv_fixed_om -= total_fixed_om_cost * (1.0 + i).powi(n as i32) / (1.0 + jr).powi(n as i32);
            n += 1;
        }
    }

    // Recurring costs fall due every `frequency` years, with none in
    // the final year.
    let recurring = |total: f64, frequency: u32| -> (f64, Vec<u32>) {
        let mut npv = 0.0;
        let mut years = Vec::new();
        if total > 0.0 && frequency > 0 {
            let mut n = frequency;
            while f64::from(n) < lifetime {
                npv -= total * (1.0 + i).powi(n as i32) / (1.0 + jr).powi(n as i32);
                years.push(n);
                n += frequency;
            }
        }
        (npv, years)
    };
    let (npv_replacement, replacement_years) =
        recurring(total_replacement_cost, component.replacement_frequency);
    let (npv_future, future_years) = recurring(total_future_cost, component.future_frequency);

    let total_npv = npv_capital + npv_installation + npv_fixed_om + npv_replacement + npv_future;
    let factor = atlcc_factor(j, lifetime);

    ComponentAnalysis {
        cost_code,
        name: component.name.clone(),
        qty: component.qty,
        discount_rate,
        inflation_rate,
        j,
        annual_ndr,
        total_capital_cost,
        total_installation_cost,
        total_fixed_om_cost,
        total_replacement_cost,
        total_future_cost,
        replacement_years,
        future_years,
        npv_capital,
        npv_installation,
        npv_fixed_om,
        npv_replacement,
        npv_future,
        total_npv,
        atlcc_capital: npv_capital * factor,
        atlcc_installation: npv_installation * factor,
        atlcc_fixed_om: npv_fixed_om * factor,
        atlcc_replacement: npv_replacement * factor,
        atlcc_future: npv_future * factor,
    }
}

/// The full analysis, ready for display and export.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleReport {
    pub investment_name: String,
    pub lifetime: f64,
    pub discount_rate: f64,
    pub inflation_rate: f64,
    pub degradation_rate: f64,
    pub j: f64,
    pub components: Vec<ComponentAnalysis>,
    pub total_atlcc_capital: f64,
    pub total_atlcc_installation: f64,
    pub total_atlcc_fixed_om: f64,
    pub total_atlcc_replacement: f64,
    pub total_atlcc_future: f64,
    pub total_atlcc: f64,
    /// Sum of all capital and installation outlays, undiscounted.
    pub cost_of_investment: f64,
    pub npv_cost: f64,
    pub annual_total_savings: f64,
    pub npv_revenue: f64,
    pub npv: f64,
    pub annual_worth: f64,
    /// `None` when there are no savings to pay the investment back.
    pub payback_years: Option<f64>,
    /// Levelised cost of energy; `None` when nothing was generated.
    pub lcoe: Option<f64>,
    pub sum_alcc_energy_generated: f64,
    pub annual_energy_generated: f64,
    pub annual_energy_exported: f64,
    pub annual_grid_used: f64,
}
