use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use super::aggregator::{effective_discount_rate, PositionBasis, PositionResolver};
use crate::config::EngineAssumptions;
use crate::error::ValuationError;
use crate::scenarios::sampling::sample_exits;
use crate::scenarios::ExitScenario;
use crate::time_value::present_value;
use crate::types::{ComputationMetadata, ComputationOutput, Money, Rate};
use crate::ValuationResult;

fn default_num_simulations() -> u32 {
    10_000
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnSimulationInput {
    pub scenarios: Vec<ExitScenario>,
    pub position: PositionBasis,
    #[serde(default)]
    pub investment_amount: Option<Money>,
    pub discount_rate: Rate,
    #[serde(default = "default_num_simulations")]
    pub num_simulations: u32,
    /// Required so every run can be reproduced.
    pub seed: u64,
    #[serde(default)]
    pub assumptions: EngineAssumptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedDistribution {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnSimulationOutput {
    pub simulation_count: u32,
    pub seed: u64,
    pub investment_amount: Money,
    pub proceeds: SimulatedDistribution,
    pub present_value: SimulatedDistribution,
    pub mean_multiple: f64,
    pub loss_probability: f64,
    pub success_probability: f64,
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Linear-interpolated percentile of a sorted, non-empty slice.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

fn describe(values: &mut [f64]) -> SimulatedDistribution {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    SimulatedDistribution {
        mean,
        std_dev: variance.sqrt(),
        min: values[0],
        max: values[values.len() - 1],
        p5: percentile_sorted(values, 5.0),
        p25: percentile_sorted(values, 25.0),
        p50: percentile_sorted(values, 50.0),
        p75: percentile_sorted(values, 75.0),
        p95: percentile_sorted(values, 95.0),
    }
}

fn to_f64(d: Decimal) -> ValuationResult<f64> {
    d.to_f64().ok_or_else(|| ValuationError::InvalidInput {
        field: "proceeds".into(),
        reason: format!("{d} is not representable as f64"),
    })
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Monte-Carlo distribution of a position's proceeds across sampled exits.
///
/// Exits are drawn with [`sample_exits`]; each draw runs through the same
/// proceeds resolution as the aggregator, so a cap-table position gets a
/// full waterfall per path. Allocation stays in `Decimal`; only the summary
/// statistics are `f64`.
pub fn simulate_returns(
    input: &ReturnSimulationInput,
) -> ValuationResult<ComputationOutput<ReturnSimulationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let a = &input.assumptions;
    a.validate()?;

    if input.num_simulations < 100 {
        return Err(ValuationError::InvalidInput {
            field: "num_simulations".into(),
            reason: "At least 100 simulations are required".into(),
        });
    }

    let rate = effective_discount_rate(input.discount_rate, &mut warnings);
    let resolver = PositionResolver::new(&input.position, input.investment_amount, a, &mut warnings)?;
    let investment = resolver.investment();
    let samples = sample_exits(&input.scenarios, input.num_simulations, input.seed)?;

    let mut proceeds: Vec<f64> = Vec::with_capacity(samples.len());
    let mut pvs: Vec<f64> = Vec::with_capacity(samples.len());
    let mut multiples_total = 0.0;
    let mut losses = 0u32;
    let mut successes = 0u32;

    for sample in &samples {
        let scenario = &input.scenarios[sample.scenario_index];
        let resolved =
            resolver.proceeds(sample.exit_value, scenario.scenario_type, scenario.path_rounds())?;
        let multiple = resolved.proceeds / investment;
        if multiple < a.loss_multiple {
            losses += 1;
        }
        if multiple >= a.success_multiple {
            successes += 1;
        }
        multiples_total += to_f64(multiple)?;
        let pv = present_value(resolved.proceeds, rate, sample.time_to_exit_years)?;
        proceeds.push(to_f64(resolved.proceeds)?);
        pvs.push(to_f64(pv)?);
    }

    let n = samples.len() as f64;
    let output = ReturnSimulationOutput {
        simulation_count: input.num_simulations,
        seed: input.seed,
        investment_amount: investment,
        proceeds: describe(&mut proceeds),
        present_value: describe(&mut pvs),
        mean_multiple: multiples_total / n,
        loss_probability: losses as f64 / n,
        success_probability: successes as f64 / n,
    };
    debug!(
        simulations = input.num_simulations,
        seed = input.seed,
        mean_proceeds = output.proceeds.mean,
        "simulated position returns"
    );

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(ComputationOutput {
        result: output,
        methodology: "Monte Carlo Exit Simulation (triangular exit values, seeded)".to_string(),
        assumptions: serde_json::json!({
            "num_simulations": input.num_simulations,
            "seed": input.seed,
            "discount_rate": rate.to_string(),
        }),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed,
            precision: "ieee754_f64".to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cap_table::Rights;
    use crate::scenarios::ExitType;
    use rust_decimal_macros::dec;

    fn scenario(t: ExitType, min: Money, max: Money, p: Rate) -> ExitScenario {
        ExitScenario {
            scenario_type: t,
            funding_path: "seed,A".into(),
            value_band: "mid".into(),
            min_exit_value: min,
            max_exit_value: max,
            exit_value: (min + max) / dec!(2),
            probability: p,
            time_to_exit_years: dec!(3),
            label: t.to_string(),
        }
    }

    fn input(seed: u64) -> ReturnSimulationInput {
        ReturnSimulationInput {
            scenarios: vec![
                scenario(ExitType::Liquidation, dec!(0), dec!(2_000_000), dec!(0.4)),
                scenario(ExitType::IpoMid, dec!(100_000_000), dec!(200_000_000), dec!(0.6)),
            ],
            position: PositionBasis::Ownership {
                ownership_pct: dec!(0.10),
                terms: Rights::default(),
                entry_post_money: None,
            },
            investment_amount: Some(dec!(1_000_000)),
            discount_rate: dec!(0.25),
            num_simulations: 2_000,
            seed,
            assumptions: EngineAssumptions::default(),
        }
    }

    #[test]
    fn test_reproducible_with_seed() {
        let a = simulate_returns(&input(42)).unwrap().result;
        let b = simulate_returns(&input(42)).unwrap().result;
        assert_eq!(a.proceeds, b.proceeds);
        assert_eq!(a.present_value, b.present_value);
    }

    #[test]
    fn test_statistics_are_ordered() {
        let out = simulate_returns(&input(7)).unwrap().result;
        let p = &out.proceeds;
        assert!(p.min <= p.p5 && p.p5 <= p.p25 && p.p25 <= p.p50);
        assert!(p.p50 <= p.p75 && p.p75 <= p.p95 && p.p95 <= p.max);
        // discounting never raises value
        assert!(out.present_value.mean <= out.proceeds.mean);
        // liquidation draws pay at most the 1M preference
        assert!(p.min <= 1_000_000.0);
        // IPO draws pay 10-20M
        assert!(p.max >= 10_000_000.0 && p.max <= 20_000_000.0);
    }

    #[test]
    fn test_loss_probability_tracks_liquidation_weight() {
        let out = simulate_returns(&input(3)).unwrap().result;
        // liquidation draws below 1M exit lose money; roughly half of the 40%
        assert!(out.loss_probability > 0.1 && out.loss_probability < 0.4);
        assert!((out.success_probability - 0.6).abs() < 0.05);
    }

    #[test]
    fn test_too_few_simulations() {
        let mut i = input(1);
        i.num_simulations = 10;
        assert!(simulate_returns(&i).is_err());
    }

    #[test]
    fn test_percentile_sorted_interpolates() {
        let v = [0.0, 10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile_sorted(&v, 50.0), 20.0);
        assert_eq!(percentile_sorted(&v, 25.0), 10.0);
        assert!((percentile_sorted(&v, 5.0) - 2.0).abs() < 1e-9);
    }
}
