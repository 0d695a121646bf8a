use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::cap_table::{AntiDilutionMethod, CapTable, Rights};
use crate::config::EngineAssumptions;
use crate::dilution::adjust;
use crate::dilution::round::{simulate_round_core, RoundInput, RoundTerms};
use crate::error::ValuationError;
use crate::scenarios::{ExitScenario, ExitType};
use crate::time_value::{implied_annual_return, present_value};
use crate::types::{with_metadata, ComputationOutput, Money, Multiple, Rate, Shares, Years};
use crate::waterfall::{waterfall_for_exit, ExitTerms};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// A round expected before some of the scenarios' exits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FutureRound {
    pub investment_amount: Money,
    pub pre_money_valuation: Money,
    #[serde(default)]
    pub option_pool_increase: Shares,
    pub terms: RoundTerms,
    /// Rounds the company has completed today. Scenarios whose funding path
    /// has more rounds than this exit on the post-round table.
    pub current_round_count: u32,
}

/// How the investor's proceeds are resolved for each exit value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PositionBasis {
    /// Full waterfall over a cap table, reading one holder's row.
    CapTable {
        cap_table: CapTable,
        investor: String,
        #[serde(default)]
        exit_terms: ExitTerms,
        #[serde(default)]
        future_round: Option<FutureRound>,
    },
    /// Ownership percentage plus preference terms, without a cap table.
    Ownership {
        ownership_pct: Rate,
        #[serde(default)]
        terms: Rights,
        /// Post-money at entry; exits below it are down rounds.
        #[serde(default)]
        entry_post_money: Option<Money>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationInput {
    pub scenarios: Vec<ExitScenario>,
    pub position: PositionBasis,
    /// Capital invested. Defaults to the investor's paid-in capital on the
    /// cap table; required in ownership mode.
    #[serde(default)]
    pub investment_amount: Option<Money>,
    pub discount_rate: Rate,
    /// Discount for lack of marketability, in [0, 1].
    #[serde(default)]
    pub dlom: Rate,
    #[serde(default)]
    pub assumptions: EngineAssumptions,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReturn {
    pub label: String,
    pub scenario_type: ExitType,
    pub funding_path: String,
    pub probability: Rate,
    pub exit_value: Money,
    pub time_to_exit_years: Years,
    pub proceeds: Money,
    pub multiple: Multiple,
    pub present_value: Money,
    pub implied_irr: Option<Rate>,
    pub used_pro_forma: bool,
    pub anti_dilution_applied: bool,
}

/// Probability-weighted percentiles of nominal proceeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProceedsPercentiles {
    pub p10: Money,
    pub p25: Money,
    pub median: Money,
    pub p75: Money,
    pub p90: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedValuation {
    pub investment_amount: Money,
    /// Probability-weighted nominal proceeds.
    pub expected_proceeds: Money,
    pub expected_multiple: Multiple,
    /// Probability-weighted present value (pre-DLOM).
    pub expected_value: Money,
    /// `expected_value * (1 - dlom)`.
    pub fair_value: Money,
    pub dlom: Rate,
    pub discount_rate: Rate,
    pub percentiles: ProceedsPercentiles,
    pub success_probability: Rate,
    pub loss_probability: Rate,
    pub mega_exit_probability: Rate,
    pub scenario_results: Vec<ScenarioReturn>,
    pub scenarios: Vec<ExitScenario>,
}

// ---------------------------------------------------------------------------
// Proceeds resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedProceeds {
    pub proceeds: Money,
    pub used_pro_forma: bool,
    pub anti_dilution_applied: bool,
}

/// Resolves the investor's proceeds for an exit. Built once per run so the
/// future round is simulated a single time.
#[derive(Debug, Clone)]
pub struct PositionResolver<'a> {
    basis: &'a PositionBasis,
    assumptions: &'a EngineAssumptions,
    investment: Money,
    pro_forma: Option<(CapTable, u32)>,
}

impl<'a> PositionResolver<'a> {
    pub fn new(
        basis: &'a PositionBasis,
        investment_amount: Option<Money>,
        assumptions: &'a EngineAssumptions,
        warnings: &mut Vec<String>,
    ) -> ValuationResult<Self> {
        let mut pro_forma = None;
        let investment = match basis {
            PositionBasis::CapTable {
                cap_table,
                investor,
                future_round,
                ..
            } => {
                if cap_table.is_empty() {
                    return Err(ValuationError::InsufficientData(
                        "Cap table has no entries".into(),
                    ));
                }
                if !cap_table.contains_holder(investor) {
                    return Err(ValuationError::InsufficientData(format!(
                        "Investor '{investor}' not found in cap table"
                    )));
                }
                if let Some(round) = future_round {
                    let (result, round_warnings) = simulate_round_core(&RoundInput {
                        cap_table: cap_table.clone(),
                        investment_amount: round.investment_amount,
                        pre_money_valuation: round.pre_money_valuation,
                        option_pool_increase: round.option_pool_increase,
                        terms: round.terms.clone(),
                        assumptions: assumptions.clone(),
                    })?;
                    warnings.extend(round_warnings.into_iter().map(|w| format!("Future round: {w}")));
                    pro_forma = Some((result.pro_forma, round.current_round_count));
                }
                investment_amount.unwrap_or_else(|| cap_table.invested_by(investor))
            }
            PositionBasis::Ownership {
                ownership_pct,
                terms,
                ..
            } => {
                if *ownership_pct <= Decimal::ZERO || *ownership_pct > Decimal::ONE {
                    return Err(ValuationError::InvalidInput {
                        field: "position.ownership_pct".into(),
                        reason: "Ownership must be in (0, 1]".into(),
                    });
                }
                if terms.is_malformed() {
                    warnings.push("Malformed terms; using 1x non-participating".into());
                }
                investment_amount.ok_or_else(|| ValuationError::InvalidInput {
                    field: "investment_amount".into(),
                    reason: "Investment amount is required in ownership mode".into(),
                })?
            }
        };

        if investment <= Decimal::ZERO {
            return Err(ValuationError::InvalidInput {
                field: "investment_amount".into(),
                reason: "Investment amount must be positive".into(),
            });
        }

        Ok(Self {
            basis,
            assumptions,
            investment,
            pro_forma,
        })
    }

    pub fn investment(&self) -> Money {
        self.investment
    }

    pub fn proceeds(
        &self,
        exit_value: Money,
        exit_type: ExitType,
        path_rounds: u32,
    ) -> ValuationResult<ResolvedProceeds> {
        match self.basis {
            PositionBasis::CapTable {
                cap_table,
                investor,
                exit_terms,
                ..
            } => {
                let (table, used_pro_forma) = match &self.pro_forma {
                    Some((pf, current)) if path_rounds > *current => (pf, true),
                    _ => (cap_table, false),
                };
                let mut terms = *exit_terms;
                if !exit_type.is_down_round() {
                    // price protection only fires on down-round exits
                    terms.ratchet_price = None;
                } else if terms.ratchet_price.is_none() && exit_value > Decimal::ZERO {
                    let fd = table.fully_diluted_shares(self.assumptions.option_exercise_fraction);
                    if fd > Decimal::ZERO {
                        terms.ratchet_price = Some(exit_value / fd);
                    }
                }
                let anti_dilution_applied = terms.ratchet_price.is_some_and(|price| {
                    table.entries.iter().any(|e| {
                        e.share_class.has_preference()
                            && e.price_per_share > price
                            && e.rights.sanitized().anti_dilution != AntiDilutionMethod::None
                    })
                });
                let (out, _) = waterfall_for_exit(table, exit_value, &terms, self.assumptions)?;
                let proceeds = out
                    .for_holder(investor)
                    .map(|d| d.total)
                    .unwrap_or(Decimal::ZERO);
                Ok(ResolvedProceeds {
                    proceeds,
                    used_pro_forma,
                    anti_dilution_applied,
                })
            }
            PositionBasis::Ownership {
                ownership_pct,
                terms,
                entry_post_money,
            } => {
                let down_round = exit_type.is_down_round();
                let (proceeds, anti_dilution_applied) = ownership_proceeds(
                    exit_value,
                    *ownership_pct,
                    self.investment,
                    &terms.sanitized(),
                    down_round,
                    *entry_post_money,
                )?;
                Ok(ResolvedProceeds {
                    proceeds,
                    used_pro_forma: false,
                    anti_dilution_applied,
                })
            }
        }
    }
}

/// Proceeds from an ownership stake with preference terms, no cap table.
///
/// Non-participating takes the better of preference and pro-rata share.
/// Participating takes its preference plus its share of the remainder,
/// capped at `cap * investment` but never below the as-converted share.
/// On down-round exit types below the entry post-money, price protection
/// lifts the effective ownership. Returns the proceeds and whether
/// protection applied.
pub fn ownership_proceeds(
    exit_value: Money,
    ownership_pct: Rate,
    investment: Money,
    terms: &Rights,
    down_round: bool,
    entry_post_money: Option<Money>,
) -> ValuationResult<(Money, bool)> {
    if exit_value <= Decimal::ZERO {
        return Ok((Decimal::ZERO, false));
    }

    let mut ownership = ownership_pct;
    let mut protected = false;
    if let Some(entry) = entry_post_money {
        if down_round
            && terms.anti_dilution != AntiDilutionMethod::None
            && entry > Decimal::ZERO
            && exit_value < entry
            && ownership < Decimal::ONE
        {
            // the stake as `ownership` units priced at 1, against the rest
            // of the company as the broad base
            let adj = adjust(
                Decimal::ONE,
                exit_value / entry,
                ownership,
                Some(Decimal::ONE - ownership),
                terms.anti_dilution,
            )?;
            if adj.triggered {
                ownership = (ownership + adj.additional_shares)
                    / (Decimal::ONE + adj.additional_shares);
                protected = true;
            }
        }
    }

    let preference = (investment * terms.liquidation_preference_multiple).min(exit_value);
    let as_converted = ownership * exit_value;
    let proceeds = if terms.participating {
        let participating = preference + ownership * (exit_value - preference);
        match terms.effective_cap() {
            Some(cap) => participating.min(cap * investment).max(as_converted),
            None => participating,
        }
    } else {
        preference.max(as_converted)
    };
    Ok((proceeds.min(exit_value), protected))
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Lower weighted percentile: the first value whose cumulative weight
/// reaches `p`. `sorted` is ordered by value; weights sum to 1.
pub(crate) fn weighted_percentile(sorted: &[(Money, Rate)], p: Rate) -> Money {
    let mut cumulative = Decimal::ZERO;
    for (value, weight) in sorted {
        cumulative += *weight;
        if cumulative >= p {
            return *value;
        }
    }
    sorted.last().map(|(v, _)| *v).unwrap_or(Decimal::ZERO)
}

fn percentiles(mut pairs: Vec<(Money, Rate)>) -> ProceedsPercentiles {
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    ProceedsPercentiles {
        p10: weighted_percentile(&pairs, dec!(0.10)),
        p25: weighted_percentile(&pairs, dec!(0.25)),
        median: weighted_percentile(&pairs, dec!(0.50)),
        p75: weighted_percentile(&pairs, dec!(0.75)),
        p90: weighted_percentile(&pairs, dec!(0.90)),
    }
}

/// Negative discount rates are clamped to zero with a warning.
pub(crate) fn effective_discount_rate(rate: Rate, warnings: &mut Vec<String>) -> Rate {
    if rate < Decimal::ZERO {
        let note = format!("Negative discount rate {rate} clamped to zero");
        warn!(target: "exit_valuation::returns", "{note}");
        warnings.push(note);
        Decimal::ZERO
    } else {
        rate
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Un-enveloped aggregation.
pub fn aggregate_returns_core(
    input: &AggregationInput,
) -> ValuationResult<(AggregatedValuation, Vec<String>)> {
    let mut warnings: Vec<String> = Vec::new();
    let a = &input.assumptions;
    a.validate()?;

    if input.scenarios.is_empty() {
        return Err(ValuationError::InsufficientData(
            "No scenarios to aggregate".into(),
        ));
    }
    if input.dlom < Decimal::ZERO || input.dlom > Decimal::ONE {
        return Err(ValuationError::InvalidInput {
            field: "dlom".into(),
            reason: "DLOM must be between 0 and 1".into(),
        });
    }
    for (i, s) in input.scenarios.iter().enumerate() {
        if s.probability < Decimal::ZERO {
            return Err(ValuationError::InvalidInput {
                field: format!("scenarios[{i}].probability"),
                reason: "Probability cannot be negative".into(),
            });
        }
        if s.exit_value < Decimal::ZERO {
            return Err(ValuationError::InvalidInput {
                field: format!("scenarios[{i}].exit_value"),
                reason: "Exit value cannot be negative".into(),
            });
        }
    }
    let probability_total: Rate = input.scenarios.iter().map(|s| s.probability).sum();
    if probability_total <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "scenarios.probability".into(),
            reason: "Scenario probabilities sum to zero".into(),
        });
    }
    if (probability_total - Decimal::ONE).abs() > dec!(0.000001) {
        warnings.push(format!(
            "Scenario probabilities sum to {probability_total}; weights normalised"
        ));
    }

    let rate = effective_discount_rate(input.discount_rate, &mut warnings);
    let resolver = PositionResolver::new(
        &input.position,
        input.investment_amount,
        a,
        &mut warnings,
    )?;
    let investment = resolver.investment();

    let mut results: Vec<ScenarioReturn> = Vec::with_capacity(input.scenarios.len());
    let mut expected_proceeds = Decimal::ZERO;
    let mut expected_value = Decimal::ZERO;
    let mut success = Decimal::ZERO;
    let mut loss = Decimal::ZERO;
    let mut mega = Decimal::ZERO;
    let mut weighted: Vec<(Money, Rate)> = Vec::with_capacity(input.scenarios.len());

    for s in &input.scenarios {
        let weight = s.probability / probability_total;
        let resolved = resolver.proceeds(s.exit_value, s.scenario_type, s.path_rounds())?;
        let proceeds = resolved.proceeds;
        let multiple = proceeds / investment;
        let pv = present_value(proceeds, rate, s.time_to_exit_years)?;

        expected_proceeds += weight * proceeds;
        expected_value += weight * pv;
        if multiple >= a.success_multiple {
            success += weight;
        }
        if multiple < a.loss_multiple {
            loss += weight;
        }
        if multiple >= a.mega_exit_multiple {
            mega += weight;
        }
        weighted.push((proceeds, weight));

        results.push(ScenarioReturn {
            label: s.label.clone(),
            scenario_type: s.scenario_type,
            funding_path: s.funding_path.clone(),
            probability: s.probability,
            exit_value: s.exit_value,
            time_to_exit_years: s.time_to_exit_years,
            proceeds,
            multiple,
            present_value: pv,
            implied_irr: implied_annual_return(multiple, s.time_to_exit_years),
            used_pro_forma: resolved.used_pro_forma,
            anti_dilution_applied: resolved.anti_dilution_applied,
        });
    }

    let fair_value = expected_value * (Decimal::ONE - input.dlom);
    debug!(
        scenarios = results.len(),
        expected_proceeds = %expected_proceeds,
        expected_value = %expected_value,
        fair_value = %fair_value,
        "aggregated scenario returns"
    );

    let valuation = AggregatedValuation {
        investment_amount: investment,
        expected_proceeds,
        expected_multiple: expected_proceeds / investment,
        expected_value,
        fair_value,
        dlom: input.dlom,
        discount_rate: rate,
        percentiles: percentiles(weighted),
        success_probability: success,
        loss_probability: loss,
        mega_exit_probability: mega,
        scenario_results: results,
        scenarios: input.scenarios.clone(),
    };
    Ok((valuation, warnings))
}

/// Probability-weighted valuation of a position across exit scenarios.
///
/// Each scenario's proceeds come from the full waterfall (cap-table mode) or
/// the ownership shortcut, are discounted at `discount_rate` over the time
/// to exit, weighted by probability and reduced by the DLOM. Percentiles
/// and outcome buckets use nominal proceeds.
pub fn aggregate_returns(
    input: &AggregationInput,
) -> ValuationResult<ComputationOutput<AggregatedValuation>> {
    let start = Instant::now();
    let (valuation, warnings) = aggregate_returns_core(input)?;
    let mode = match &input.position {
        PositionBasis::CapTable { .. } => "cap_table",
        PositionBasis::Ownership { .. } => "ownership",
    };
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Probability-Weighted Exit Valuation (PV of scenario proceeds, DLOM-adjusted)",
        &serde_json::json!({
            "mode": mode,
            "num_scenarios": input.scenarios.len(),
            "discount_rate": input.discount_rate.to_string(),
            "dlom": input.dlom.to_string(),
            "success_multiple": input.assumptions.success_multiple.to_string(),
            "loss_multiple": input.assumptions.loss_multiple.to_string(),
            "mega_exit_multiple": input.assumptions.mega_exit_multiple.to_string(),
        }),
        warnings,
        elapsed,
        valuation,
    ))
}
