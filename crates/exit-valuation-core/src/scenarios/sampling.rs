use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::distribution::Triangular;

use super::generator::ExitScenario;
use crate::error::ValuationError;
use crate::types::{Money, Years};
use crate::ValuationResult;

/// One simulated exit drawn from a scenario set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitSample {
    pub scenario_index: usize,
    pub exit_value: Money,
    pub time_to_exit_years: Years,
}

/// Draw `num_samples` exits: a scenario by cumulative probability, then a
/// value from a triangular distribution over its range peaked at the
/// midpoint. The same seed always yields the same samples.
pub fn sample_exits(
    scenarios: &[ExitScenario],
    num_samples: u32,
    seed: u64,
) -> ValuationResult<Vec<ExitSample>> {
    if scenarios.is_empty() {
        return Err(ValuationError::InsufficientData(
            "No scenarios to sample from".into(),
        ));
    }
    if num_samples == 0 {
        return Err(ValuationError::InvalidInput {
            field: "num_samples".into(),
            reason: "At least one sample is required".into(),
        });
    }
    if scenarios.iter().any(|s| s.probability < Decimal::ZERO) {
        return Err(ValuationError::InvalidInput {
            field: "scenarios.probability".into(),
            reason: "Scenario probabilities cannot be negative".into(),
        });
    }
    let total: Decimal = scenarios.iter().map(|s| s.probability).sum();
    if total <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "scenarios.probability".into(),
            reason: "Scenario probabilities sum to zero".into(),
        });
    }

    let mut cumulative: Vec<f64> = Vec::with_capacity(scenarios.len());
    let mut running = Decimal::ZERO;
    for s in scenarios {
        running += s.probability / total;
        cumulative.push(running.to_f64().unwrap_or(1.0));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let last = scenarios.len() - 1;
    let mut samples = Vec::with_capacity(num_samples as usize);
    for _ in 0..num_samples {
        let u: f64 = rng.gen();
        let idx = cumulative.iter().position(|&c| u < c).unwrap_or(last);
        let scenario = &scenarios[idx];
        samples.push(ExitSample {
            scenario_index: idx,
            exit_value: draw_exit_value(&mut rng, scenario)?,
            time_to_exit_years: scenario.time_to_exit_years,
        });
    }
    Ok(samples)
}

fn draw_exit_value(rng: &mut StdRng, scenario: &ExitScenario) -> ValuationResult<Money> {
    let to_f64 = |d: Decimal, field: &str| {
        d.to_f64().ok_or_else(|| ValuationError::InvalidInput {
            field: field.into(),
            reason: format!("{d} is not representable as f64"),
        })
    };
    let min = to_f64(scenario.min_exit_value, "min_exit_value")?;
    let max = to_f64(scenario.max_exit_value, "max_exit_value")?;
    if max <= min {
        return Ok(scenario.exit_value);
    }
    let mode = to_f64(scenario.exit_value, "exit_value")?.clamp(min, max);
    let dist = Triangular::new(min, max, mode).map_err(|e| ValuationError::InvalidInput {
        field: "scenario range".into(),
        reason: format!("Invalid Triangular parameters: {e}"),
    })?;
    let v: f64 = rng.sample(dist);
    Decimal::from_f64(v)
        .map(|d| d.round_dp(2))
        .ok_or_else(|| ValuationError::InvalidInput {
            field: "exit_value".into(),
            reason: format!("Sampled value {v} is not representable"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::templates::ExitType;
    use rust_decimal_macros::dec;

    fn scenario(t: ExitType, min: Money, max: Money, p: Decimal) -> ExitScenario {
        ExitScenario {
            scenario_type: t,
            funding_path: "seed,A".into(),
            value_band: "mid".into(),
            min_exit_value: min,
            max_exit_value: max,
            exit_value: (min + max) / dec!(2),
            probability: p,
            time_to_exit_years: dec!(4),
            label: t.to_string(),
        }
    }

    fn two_scenarios() -> Vec<ExitScenario> {
        vec![
            scenario(ExitType::Liquidation, dec!(0), dec!(1_000_000), dec!(0.3)),
            scenario(ExitType::StrategicAcquisition, dec!(50_000_000), dec!(100_000_000), dec!(0.7)),
        ]
    }

    #[test]
    fn test_same_seed_same_samples() {
        let a = sample_exits(&two_scenarios(), 500, 42).unwrap();
        let b = sample_exits(&two_scenarios(), 500, 42).unwrap();
        assert_eq!(a, b);
        let c = sample_exits(&two_scenarios(), 500, 43).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_values_stay_in_range() {
        let scenarios = two_scenarios();
        for s in sample_exits(&scenarios, 1_000, 7).unwrap() {
            let sc = &scenarios[s.scenario_index];
            assert!(s.exit_value >= sc.min_exit_value && s.exit_value <= sc.max_exit_value);
        }
    }

    #[test]
    fn test_selection_follows_probability() {
        let samples = sample_exits(&two_scenarios(), 10_000, 11).unwrap();
        let second = samples.iter().filter(|s| s.scenario_index == 1).count();
        // expect ~7,000
        assert!((6_500..7_500).contains(&second), "{second}");
    }

    #[test]
    fn test_degenerate_range_returns_midpoint() {
        let s = vec![scenario(ExitType::IpoMid, dec!(5), dec!(5), dec!(1))];
        let out = sample_exits(&s, 3, 1).unwrap();
        assert!(out.iter().all(|x| x.exit_value == dec!(5)));
    }

    #[test]
    fn test_rejects_empty_and_zero_samples() {
        assert!(sample_exits(&[], 10, 1).is_err());
        assert!(sample_exits(&two_scenarios(), 0, 1).is_err());
    }
}
