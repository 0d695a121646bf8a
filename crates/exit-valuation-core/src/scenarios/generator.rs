use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use super::templates::{round_count, stage_base_valuation, template_matrix, ExitType};
use crate::cap_table::CompanyStage;
use crate::config::EngineAssumptions;
use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Rate, Years};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// Company facts that tilt the baseline probabilities. Missing facts leave
/// the baseline untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyFactors {
    /// Year-on-year revenue growth (1.0 = 100%).
    pub growth_rate: Option<Rate>,
    pub runway_months: Option<Decimal>,
    pub trailing_revenue: Option<Money>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioGeneratorInput {
    /// Rounds completed so far, comma-separated ("seed,A").
    #[serde(default)]
    pub funding_path: String,
    pub current_valuation: Money,
    pub company_stage: CompanyStage,
    #[serde(default)]
    pub factors: CompanyFactors,
    #[serde(default)]
    pub assumptions: EngineAssumptions,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// One probability-weighted exit outcome for a specific company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitScenario {
    pub scenario_type: ExitType,
    /// Rounds completed before this exit, comma-separated.
    pub funding_path: String,
    pub value_band: String,
    pub min_exit_value: Money,
    pub max_exit_value: Money,
    /// Midpoint of the range.
    pub exit_value: Money,
    pub probability: Rate,
    pub time_to_exit_years: Years,
    pub label: String,
}

impl ExitScenario {
    pub fn path_rounds(&self) -> u32 {
        round_count(&self.funding_path)
    }
}

/// Probability multiplier applied to a family of exit types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityAdjustment {
    pub reason: String,
    pub applies_to: String,
    pub multiplier: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSet {
    /// Sorted by probability, highest first.
    pub scenarios: Vec<ExitScenario>,
    pub company_rounds: u32,
    pub scale_factor: Decimal,
    pub templates_considered: usize,
    pub templates_kept: usize,
    pub adjustments: Vec<ProbabilityAdjustment>,
    pub probability_total: Rate,
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

fn adjustments_for(
    factors: &CompanyFactors,
    a: &EngineAssumptions,
) -> Vec<(ProbabilityAdjustment, fn(&ExitType) -> bool)> {
    let mut out: Vec<(ProbabilityAdjustment, fn(&ExitType) -> bool)> = Vec::new();
    if let Some(g) = factors.growth_rate {
        if g > a.high_growth_threshold {
            out.push((
                ProbabilityAdjustment {
                    reason: format!("growth {g} above {}", a.high_growth_threshold),
                    applies_to: "ipo".into(),
                    multiplier: a.ipo_growth_multiplier,
                },
                ExitType::is_ipo,
            ));
        }
    }
    if let Some(r) = factors.runway_months {
        if r < a.low_runway_months {
            out.push((
                ProbabilityAdjustment {
                    reason: format!("runway {r} months below {}", a.low_runway_months),
                    applies_to: "liquidation".into(),
                    multiplier: a.liquidation_runway_multiplier,
                },
                |t: &ExitType| *t == ExitType::Liquidation,
            ));
        }
    }
    if let Some(rev) = factors.trailing_revenue {
        if rev > a.revenue_threshold {
            out.push((
                ProbabilityAdjustment {
                    reason: format!("trailing revenue {rev} above {}", a.revenue_threshold),
                    applies_to: "acquisition".into(),
                    multiplier: a.acquisition_revenue_multiplier,
                },
                ExitType::is_acquisition,
            ));
        }
    }
    out
}

/// Build the scenario set for one company without the output envelope.
pub fn generate_scenarios_core(
    input: &ScenarioGeneratorInput,
) -> ValuationResult<(ScenarioSet, Vec<String>)> {
    let mut warnings: Vec<String> = Vec::new();
    let a = &input.assumptions;
    a.validate()?;

    if input.current_valuation <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "current_valuation".into(),
            reason: "Current valuation must be positive".into(),
        });
    }
    if let Some(r) = input.factors.runway_months {
        if r < Decimal::ZERO {
            return Err(ValuationError::InvalidInput {
                field: "factors.runway_months".into(),
                reason: "Runway cannot be negative".into(),
            });
        }
    }
    if let Some(rev) = input.factors.trailing_revenue {
        if rev < Decimal::ZERO {
            return Err(ValuationError::InvalidInput {
                field: "factors.trailing_revenue".into(),
                reason: "Trailing revenue cannot be negative".into(),
            });
        }
    }

    let stage_base = stage_base_valuation(input.company_stage);
    if stage_base <= Decimal::ZERO {
        return Err(ValuationError::DivisionByZero {
            context: format!("stage base valuation for {}", input.company_stage),
        });
    }
    let scale = input.current_valuation / stage_base;
    let company_rounds = round_count(&input.funding_path);
    let adjustments = adjustments_for(&input.factors, a);

    // --- Scale, filter, adjust ---
    let templates = template_matrix();
    let considered = templates.len();
    let mut scenarios: Vec<ExitScenario> = Vec::new();
    for t in templates {
        if t.path_rounds.abs_diff(company_rounds) > a.max_round_distance {
            continue;
        }
        let min_exit_value = t.min_value * scale;
        let max_exit_value = t.max_value * scale;
        let extra_rounds = t.path_rounds.saturating_sub(company_rounds);
        let mut probability = t.probability;
        for (adj, applies) in &adjustments {
            if applies(&t.exit_type) {
                probability *= adj.multiplier;
            }
        }
        let path_label = if t.funding_path.is_empty() {
            "no priced rounds".to_string()
        } else {
            t.funding_path.to_string()
        };
        scenarios.push(ExitScenario {
            scenario_type: t.exit_type,
            funding_path: t.funding_path.to_string(),
            value_band: t.band.to_string(),
            min_exit_value,
            max_exit_value,
            exit_value: (min_exit_value + max_exit_value) / Decimal::TWO,
            probability,
            time_to_exit_years: t.base_years
                + Decimal::from(extra_rounds) * a.years_per_additional_round,
            label: format!("{} ({} band) after {}", t.exit_type, t.band, path_label),
        });
    }

    if scenarios.is_empty() {
        return Err(ValuationError::InsufficientData(format!(
            "No scenario template within {} rounds of a {}-round funding path",
            a.max_round_distance, company_rounds
        )));
    }

    // --- Renormalise ---
    let total: Rate = scenarios.iter().map(|s| s.probability).sum();
    if total <= Decimal::ZERO {
        return Err(ValuationError::InsufficientData(
            "Every scenario probability was adjusted to zero".into(),
        ));
    }
    for s in &mut scenarios {
        s.probability /= total;
    }
    if !adjustments.is_empty() {
        let note = format!(
            "{} probability adjustment(s) applied; probabilities renormalised",
            adjustments.len()
        );
        warn!(target: "exit_valuation::scenarios", "{note}");
        warnings.push(note);
    }

    // stable: equal probabilities keep table order
    scenarios.sort_by(|x, y| y.probability.cmp(&x.probability));
    let probability_total: Rate = scenarios.iter().map(|s| s.probability).sum();

    debug!(
        kept = scenarios.len(),
        considered,
        company_rounds,
        scale = %scale,
        "generated exit scenarios"
    );

    let set = ScenarioSet {
        templates_kept: scenarios.len(),
        scenarios,
        company_rounds,
        scale_factor: scale,
        templates_considered: considered,
        adjustments: adjustments.into_iter().map(|(adj, _)| adj).collect(),
        probability_total,
    };
    Ok((set, warnings))
}

/// Generate the probability-weighted exit scenario matrix for a company.
///
/// Templates are scaled from the reference company at the same stage to
/// this company's valuation, restricted to funding paths near the company's
/// own, tilted by growth, runway and revenue, then renormalised to sum to 1.
pub fn generate_exit_scenarios(
    input: &ScenarioGeneratorInput,
) -> ValuationResult<ComputationOutput<ScenarioSet>> {
    let start = Instant::now();
    let (set, warnings) = generate_scenarios_core(input)?;
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Exit Scenario Matrix (stage-scaled templates, company-adjusted probabilities)",
        &serde_json::json!({
            "funding_path": input.funding_path,
            "current_valuation": input.current_valuation.to_string(),
            "company_stage": input.company_stage.to_string(),
            "max_round_distance": input.assumptions.max_round_distance,
        }),
        warnings,
        elapsed,
        set,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn series_a_company() -> ScenarioGeneratorInput {
        ScenarioGeneratorInput {
            funding_path: "seed,A".into(),
            current_valuation: dec!(80_000_000),
            company_stage: CompanyStage::SeriesA,
            factors: CompanyFactors::default(),
            assumptions: EngineAssumptions::default(),
        }
    }

    fn prob_of(set: &ScenarioSet, f: impl Fn(&ExitScenario) -> bool) -> Decimal {
        set.scenarios
            .iter()
            .filter(|s| f(s))
            .map(|s| s.probability)
            .sum()
    }

    #[test]
    fn test_probabilities_normalised() {
        let (set, _) = generate_scenarios_core(&series_a_company()).unwrap();
        assert!((set.probability_total - Decimal::ONE).abs() < dec!(0.000000001));
        assert!(set.scenarios.iter().all(|s| s.probability > Decimal::ZERO));
    }

    #[test]
    fn test_filter_by_round_distance() {
        // 2 rounds completed: paths with 0..=4 rounds survive (5 of 7)
        let (set, _) = generate_scenarios_core(&series_a_company()).unwrap();
        assert_eq!(set.templates_considered, 189);
        assert_eq!(set.templates_kept, 5 * 9 * 3);
        assert!(set.scenarios.iter().all(|s| s.path_rounds() <= 4));
    }

    #[test]
    fn test_scaling_to_company_valuation() {
        // 80M against a 40M Series A base: 2x scale
        let (set, _) = generate_scenarios_core(&series_a_company()).unwrap();
        assert_eq!(set.scale_factor, dec!(2));
        let low_strategic = set
            .scenarios
            .iter()
            .find(|s| {
                s.scenario_type == ExitType::StrategicAcquisition
                    && s.funding_path == "seed,A"
                    && s.value_band == "low"
            })
            .unwrap();
        // 40M * 1x * 2 = 80M; 40M * 1.75x * 2 = 140M
        assert_eq!(low_strategic.min_exit_value, dec!(80_000_000));
        assert_eq!(low_strategic.max_exit_value, dec!(140_000_000));
        assert_eq!(low_strategic.exit_value, dec!(110_000_000));
    }

    #[test]
    fn test_time_to_exit_grows_with_extra_rounds() {
        let (set, _) = generate_scenarios_core(&series_a_company()).unwrap();
        let find = |path: &str| {
            set.scenarios
                .iter()
                .find(|s| s.scenario_type == ExitType::IpoMid && s.funding_path == path)
                .unwrap()
                .time_to_exit_years
        };
        assert_eq!(find("seed,A"), dec!(7));
        assert_eq!(find("seed,A,B,C"), dec!(10));
        // fewer rounds than the company never shortens the horizon
        assert_eq!(find("seed"), dec!(7));
    }

    #[test]
    fn test_high_growth_boosts_ipo() {
        let base = generate_scenarios_core(&series_a_company()).unwrap().0;
        let mut input = series_a_company();
        input.factors.growth_rate = Some(dec!(2.0));
        let (boosted, warnings) = generate_scenarios_core(&input).unwrap();
        let ipo = |s: &ExitScenario| s.scenario_type.is_ipo();
        assert!(prob_of(&boosted, ipo) > prob_of(&base, ipo));
        assert_eq!(boosted.adjustments.len(), 1);
        assert!(!warnings.is_empty());
        assert!((boosted.probability_total - Decimal::ONE).abs() < dec!(0.000000001));
    }

    #[test]
    fn test_short_runway_boosts_liquidation() {
        let base = generate_scenarios_core(&series_a_company()).unwrap().0;
        let mut input = series_a_company();
        input.factors.runway_months = Some(dec!(6));
        let (adjusted, _) = generate_scenarios_core(&input).unwrap();
        let liq = |s: &ExitScenario| s.scenario_type == ExitType::Liquidation;
        assert!(prob_of(&adjusted, liq) > prob_of(&base, liq));
    }

    #[test]
    fn test_revenue_boosts_acquisitions() {
        let base = generate_scenarios_core(&series_a_company()).unwrap().0;
        let mut input = series_a_company();
        input.factors.trailing_revenue = Some(dec!(25_000_000));
        let (adjusted, _) = generate_scenarios_core(&input).unwrap();
        let acq = |s: &ExitScenario| s.scenario_type.is_acquisition();
        assert!(prob_of(&adjusted, acq) > prob_of(&base, acq));
    }

    #[test]
    fn test_deterministic() {
        let a = generate_scenarios_core(&series_a_company()).unwrap().0;
        let b = generate_scenarios_core(&series_a_company()).unwrap().0;
        assert_eq!(a.scenarios, b.scenarios);
    }

    #[test]
    fn test_sorted_by_probability() {
        let (set, _) = generate_scenarios_core(&series_a_company()).unwrap();
        assert!(set
            .scenarios
            .windows(2)
            .all(|w| w[0].probability >= w[1].probability));
    }

    #[test]
    fn test_invalid_valuation() {
        let mut input = series_a_company();
        input.current_valuation = Decimal::ZERO;
        assert!(generate_exit_scenarios(&input).is_err());
    }

    #[test]
    fn test_far_path_has_no_templates() {
        let mut input = series_a_company();
        input.funding_path = "seed,A,B,C,D,E,F,G,H".into();
        let err = generate_scenarios_core(&input).unwrap_err();
        assert!(matches!(err, ValuationError::InsufficientData(_)));
    }
}
