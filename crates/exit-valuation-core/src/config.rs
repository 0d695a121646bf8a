use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::{Money, Multiple, Rate, Years};
use crate::ValuationResult;

/// Modelling assumptions shared by every engine component.
///
/// All defaults live in the single `Default` impl below; input structs embed
/// this with `#[serde(default)]`, so a partially specified assumptions block
/// falls back field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineAssumptions {
    /// Fraction of unexercised options/warrants counted as outstanding.
    /// Applied identically in ownership, dilution and waterfall maths.
    pub option_exercise_fraction: Rate,
    /// Maximum |sum of distributions - distributable| accepted, in currency units.
    pub rounding_tolerance: Money,
    /// Multiple at or above which a scenario counts as a success.
    pub success_multiple: Multiple,
    /// Multiple below which a scenario counts as a loss.
    pub loss_multiple: Multiple,
    /// Multiple at or above which a scenario counts as a mega exit.
    pub mega_exit_multiple: Multiple,
    /// Year-on-year growth above which IPO outcomes are boosted.
    pub high_growth_threshold: Rate,
    pub ipo_growth_multiplier: Decimal,
    /// Months of runway below which liquidation is boosted.
    pub low_runway_months: Decimal,
    pub liquidation_runway_multiplier: Decimal,
    /// Trailing revenue above which acquisition outcomes are boosted.
    pub revenue_threshold: Money,
    pub acquisition_revenue_multiplier: Decimal,
    /// Templates whose round count differs from the company's by more than
    /// this are dropped.
    pub max_round_distance: u32,
    /// Extra time to exit for each round a template path is ahead of the company.
    pub years_per_additional_round: Years,
    /// Largest single position as a fraction of fund size before warning.
    pub concentration_limit: Rate,
}

impl Default for EngineAssumptions {
    fn default() -> Self {
        Self {
            option_exercise_fraction: dec!(0.75),
            rounding_tolerance: dec!(0.01),
            success_multiple: dec!(3),
            loss_multiple: dec!(1),
            mega_exit_multiple: dec!(10),
            high_growth_threshold: dec!(1.0),
            ipo_growth_multiplier: dec!(1.5),
            low_runway_months: dec!(12),
            liquidation_runway_multiplier: dec!(2.0),
            revenue_threshold: dec!(10_000_000),
            acquisition_revenue_multiplier: dec!(1.3),
            max_round_distance: 2,
            years_per_additional_round: dec!(1.5),
            concentration_limit: dec!(0.10),
        }
    }
}

impl EngineAssumptions {
    /// Reject assumption sets that would make the engine's arithmetic meaningless.
    pub fn validate(&self) -> ValuationResult<()> {
        if self.option_exercise_fraction < Decimal::ZERO
            || self.option_exercise_fraction > Decimal::ONE
        {
            return Err(ValuationError::InvalidInput {
                field: "assumptions.option_exercise_fraction".into(),
                reason: "Option exercise fraction must be between 0 and 1".into(),
            });
        }
        if self.rounding_tolerance <= Decimal::ZERO {
            return Err(ValuationError::InvalidInput {
                field: "assumptions.rounding_tolerance".into(),
                reason: "Rounding tolerance must be positive".into(),
            });
        }
        if self.loss_multiple > self.success_multiple
            || self.success_multiple > self.mega_exit_multiple
        {
            return Err(ValuationError::InvalidInput {
                field: "assumptions.success_multiple".into(),
                reason: "Expected loss_multiple <= success_multiple <= mega_exit_multiple".into(),
            });
        }
        for (field, value) in [
            ("ipo_growth_multiplier", self.ipo_growth_multiplier),
            (
                "liquidation_runway_multiplier",
                self.liquidation_runway_multiplier,
            ),
            (
                "acquisition_revenue_multiplier",
                self.acquisition_revenue_multiplier,
            ),
        ] {
            if value < Decimal::ZERO {
                return Err(ValuationError::InvalidInput {
                    field: format!("assumptions.{field}"),
                    reason: "Probability multipliers cannot be negative".into(),
                });
            }
        }
        if self.concentration_limit <= Decimal::ZERO || self.concentration_limit > Decimal::ONE {
            return Err(ValuationError::InvalidInput {
                field: "assumptions.concentration_limit".into(),
                reason: "Concentration limit must be in (0, 1]".into(),
            });
        }
        Ok(())
    }
}
