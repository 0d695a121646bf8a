use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::cap_table::AntiDilutionMethod;
use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Shares};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for a standalone anti-dilution calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiDilutionInput {
    /// Price the protected holder originally paid per share.
    pub original_price: Money,
    /// Price of the new (down) round.
    pub new_price: Money,
    /// Protected shares. Also the weight of the new issue in the
    /// weighted-average formula.
    pub shares_affected: Shares,
    /// Broad-based share count. Required for weighted average.
    #[serde(default)]
    pub total_shares_outstanding: Option<Shares>,
    #[serde(default)]
    pub method: AntiDilutionMethod,
}

/// Result of applying price protection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiDilutionAdjustment {
    pub method: AntiDilutionMethod,
    pub adjusted_price: Money,
    pub additional_shares: Shares,
    /// False when the round was not a down round or no protection applies.
    pub triggered: bool,
}

impl AntiDilutionAdjustment {
    fn unchanged(method: AntiDilutionMethod, original_price: Money) -> Self {
        Self {
            method,
            adjusted_price: original_price,
            additional_shares: Decimal::ZERO,
            triggered: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

/// Adjust a protected position for a new issue price.
///
/// A round priced at or above the original price never adjusts anything,
/// whatever the method.
pub fn adjust(
    original_price: Money,
    new_price: Money,
    shares_affected: Shares,
    total_shares_outstanding: Option<Shares>,
    method: AntiDilutionMethod,
) -> ValuationResult<AntiDilutionAdjustment> {
    if original_price <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "original_price".into(),
            reason: "Original price must be positive".into(),
        });
    }
    if new_price <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "new_price".into(),
            reason: "New price must be positive".into(),
        });
    }
    if shares_affected < Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "shares_affected".into(),
            reason: "Shares affected cannot be negative".into(),
        });
    }

    if new_price >= original_price || method == AntiDilutionMethod::None {
        return Ok(AntiDilutionAdjustment::unchanged(method, original_price));
    }

    let adjusted_price = match method {
        AntiDilutionMethod::None => original_price,
        AntiDilutionMethod::FullRatchet => new_price,
        AntiDilutionMethod::WeightedAverage => {
            let outstanding = match total_shares_outstanding {
                Some(t) if t >= Decimal::ZERO => t,
                Some(_) => {
                    return Err(ValuationError::InvalidInput {
                        field: "total_shares_outstanding".into(),
                        reason: "Shares outstanding cannot be negative".into(),
                    })
                }
                None => {
                    return Err(ValuationError::InvalidInput {
                        field: "total_shares_outstanding".into(),
                        reason: "Weighted-average adjustment needs the shares outstanding".into(),
                    })
                }
            };
            let denominator = outstanding + shares_affected;
            if denominator.is_zero() {
                return Err(ValuationError::DivisionByZero {
                    context: "weighted-average share base is zero".into(),
                });
            }
            (original_price * outstanding + new_price * shares_affected) / denominator
        }
    };

    // Same holding at the lower conversion price buys more shares.
    let additional_shares = shares_affected * (original_price / adjusted_price - Decimal::ONE);

    Ok(AntiDilutionAdjustment {
        method,
        adjusted_price,
        additional_shares,
        triggered: true,
    })
}

/// [`adjust`] with the method given by name, as it arrives from callers
/// holding loosely-typed terms.
pub fn adjust_named(
    original_price: Money,
    new_price: Money,
    shares_affected: Shares,
    total_shares_outstanding: Option<Shares>,
    method: &str,
) -> ValuationResult<AntiDilutionAdjustment> {
    let method: AntiDilutionMethod = method.parse()?;
    adjust(
        original_price,
        new_price,
        shares_affected,
        total_shares_outstanding,
        method,
    )
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Price protection for one position against a new round price.
pub fn calculate_anti_dilution(
    input: &AntiDilutionInput,
) -> ValuationResult<ComputationOutput<AntiDilutionAdjustment>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let result = adjust(
        input.original_price,
        input.new_price,
        input.shares_affected,
        input.total_shares_outstanding,
        input.method,
    )?;

    if input.new_price >= input.original_price {
        warnings.push(format!(
            "New price {} is not below original price {}; no adjustment",
            input.new_price, input.original_price
        ));
    } else if input.method == AntiDilutionMethod::None {
        warnings.push("Down round but position carries no anti-dilution protection".into());
    }

    let methodology = match input.method {
        AntiDilutionMethod::None => "No Anti-Dilution Protection",
        AntiDilutionMethod::FullRatchet => "Full Ratchet Anti-Dilution",
        AntiDilutionMethod::WeightedAverage => "Broad-Based Weighted Average Anti-Dilution",
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        methodology,
        &serde_json::json!({
            "original_price": input.original_price.to_string(),
            "new_price": input.new_price.to_string(),
            "shares_affected": input.shares_affected.to_string(),
            "total_shares_outstanding": input.total_shares_outstanding.map(|t| t.to_string()),
        }),
        warnings,
        elapsed,
        result,
    ))
}
