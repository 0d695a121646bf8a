use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::warn;

use super::aggregator::AggregatedValuation;
use crate::config::EngineAssumptions;
use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Multiple, Rate};
use crate::ValuationResult;

/// One weighted proceeds outcome for the position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionOutcome {
    pub probability: Rate,
    pub proceeds: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundImpactInput {
    pub fund_size: Money,
    pub investment_amount: Money,
    pub expected_proceeds: Money,
    /// Scenario outcomes, used for the chance the position returns the fund.
    #[serde(default)]
    pub outcomes: Vec<PositionOutcome>,
    #[serde(default)]
    pub assumptions: EngineAssumptions,
}

impl FundImpactInput {
    /// Fund impact of an aggregated valuation, reusing its scenario results.
    pub fn from_valuation(
        fund_size: Money,
        valuation: &AggregatedValuation,
        assumptions: EngineAssumptions,
    ) -> Self {
        Self {
            fund_size,
            investment_amount: valuation.investment_amount,
            expected_proceeds: valuation.expected_proceeds,
            outcomes: valuation
                .scenario_results
                .iter()
                .map(|r| PositionOutcome {
                    probability: r.probability,
                    proceeds: r.proceeds,
                })
                .collect(),
            assumptions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundImpactOutput {
    /// Investment as a fraction of fund size.
    pub position_size_pct: Rate,
    pub expected_multiple: Multiple,
    /// Expected proceeds over fund size.
    pub contribution_to_fund_multiple: Multiple,
    pub value_created: Money,
    /// Probability mass of outcomes whose proceeds alone return the fund.
    pub probability_returns_fund: Rate,
    /// Largest investment inside the concentration limit.
    pub recommended_max_investment: Money,
    pub exceeds_concentration_limit: bool,
}

/// Map one position's expected return onto fund-level metrics.
pub fn calculate_fund_impact(
    input: &FundImpactInput,
) -> ValuationResult<ComputationOutput<FundImpactOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let a = &input.assumptions;
    a.validate()?;

    if input.fund_size <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "fund_size".into(),
            reason: "Fund size must be positive".into(),
        });
    }
    if input.investment_amount <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "investment_amount".into(),
            reason: "Investment amount must be positive".into(),
        });
    }
    if input.expected_proceeds < Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "expected_proceeds".into(),
            reason: "Expected proceeds cannot be negative".into(),
        });
    }
    if input.outcomes.iter().any(|o| o.probability < Decimal::ZERO) {
        return Err(ValuationError::InvalidInput {
            field: "outcomes.probability".into(),
            reason: "Outcome probabilities cannot be negative".into(),
        });
    }

    let position_size_pct = input.investment_amount / input.fund_size;
    let exceeds = position_size_pct > a.concentration_limit;
    if exceeds {
        let note = format!(
            "Position is {position_size_pct} of the fund, above the {} concentration limit",
            a.concentration_limit
        );
        warn!(target: "exit_valuation::returns", "{note}");
        warnings.push(note);
    }

    let total_weight: Rate = input.outcomes.iter().map(|o| o.probability).sum();
    let probability_returns_fund = if total_weight > Decimal::ZERO {
        input
            .outcomes
            .iter()
            .filter(|o| o.proceeds >= input.fund_size)
            .map(|o| o.probability)
            .sum::<Rate>()
            / total_weight
    } else {
        warnings.push("No outcomes supplied; probability of returning the fund is zero".into());
        Decimal::ZERO
    };

    let output = FundImpactOutput {
        position_size_pct,
        expected_multiple: input.expected_proceeds / input.investment_amount,
        contribution_to_fund_multiple: input.expected_proceeds / input.fund_size,
        value_created: input.expected_proceeds - input.investment_amount,
        probability_returns_fund,
        recommended_max_investment: a.concentration_limit * input.fund_size,
        exceeds_concentration_limit: exceeds,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Fund Impact (position sizing and contribution to fund multiple)",
        &serde_json::json!({
            "fund_size": input.fund_size.to_string(),
            "concentration_limit": a.concentration_limit.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input() -> FundImpactInput {
        FundImpactInput {
            fund_size: dec!(100_000_000),
            investment_amount: dec!(5_000_000),
            expected_proceeds: dec!(20_000_000),
            outcomes: vec![
                PositionOutcome {
                    probability: dec!(0.9),
                    proceeds: dec!(5_000_000),
                },
                PositionOutcome {
                    probability: dec!(0.1),
                    proceeds: dec!(150_000_000),
                },
            ],
            assumptions: EngineAssumptions::default(),
        }
    }

    #[test]
    fn test_fund_metrics() {
        let out = calculate_fund_impact(&input()).unwrap();
        let r = &out.result;
        assert_eq!(r.position_size_pct, dec!(0.05));
        assert_eq!(r.expected_multiple, dec!(4));
        // 20M / 100M
        assert_eq!(r.contribution_to_fund_multiple, dec!(0.2));
        assert_eq!(r.value_created, dec!(15_000_000));
        assert_eq!(r.probability_returns_fund, dec!(0.1));
        assert_eq!(r.recommended_max_investment, dec!(10_000_000));
        assert!(!r.exceeds_concentration_limit);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_concentration_warning() {
        let mut i = input();
        i.investment_amount = dec!(15_000_000);
        let out = calculate_fund_impact(&i).unwrap();
        assert!(out.result.exceeds_concentration_limit);
        assert!(out.warnings.iter().any(|w| w.contains("concentration")));
    }

    #[test]
    fn test_zero_fund_size_rejected() {
        let mut i = input();
        i.fund_size = Decimal::ZERO;
        match calculate_fund_impact(&i).unwrap_err() {
            ValuationError::InvalidInput { field, .. } => assert_eq!(field, "fund_size"),
            other => panic!("Expected InvalidInput for fund_size, got: {other:?}"),
        }
    }

    #[test]
    fn test_no_outcomes() {
        let mut i = input();
        i.outcomes.clear();
        let out = calculate_fund_impact(&i).unwrap();
        assert_eq!(out.result.probability_returns_fund, Decimal::ZERO);
        assert_eq!(out.warnings.len(), 1);
    }
}
