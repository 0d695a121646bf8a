use serde::{Deserialize, Serialize};

use super::engine::{DistributionResult, WaterfallOutput};
use crate::types::Money;

/// Response shape of the distribution endpoint. `verification` exposes the
/// sum invariant, checked with the engine's own rounding tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionResponse {
    pub distributions: Vec<DistributionResult>,
    pub total_distributed: Money,
    pub distributable: Money,
    pub exit_value: Money,
    pub tolerance: Money,
    pub verification: bool,
}

impl DistributionResponse {
    pub fn from_output(output: &WaterfallOutput, tolerance: Money) -> Self {
        let total_distributed = output.total_distributed();
        Self {
            distributions: output.distributions.clone(),
            total_distributed,
            distributable: output.distributable,
            exit_value: output.exit_value,
            tolerance,
            verification: (total_distributed - output.distributable).abs() <= tolerance,
        }
    }

    /// Unallocated (or over-allocated) amount against the distributable pool.
    pub fn discrepancy(&self) -> Money {
        self.total_distributed - self.distributable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cap_table::{CapTable, CompanyStage, ShareClass, ShareholdingEntry};
    use crate::waterfall::engine::{run_waterfall, WaterfallInput};
    use rust_decimal_macros::dec;

    #[test]
    fn test_response_verifies_sum() {
        let table = CapTable::new(
            CompanyStage::SeriesA,
            vec![
                ShareholdingEntry::new("Founder", ShareClass::Common, dec!(7_000_000), dec!(0.01)),
                ShareholdingEntry::new("SeriesA", ShareClass::SeriesA, dec!(2_000_000), dec!(1)),
            ],
        );
        let input = WaterfallInput::new(dec!(20_000_000), table);
        let (out, _) = run_waterfall(&input).unwrap();
        let resp = DistributionResponse::from_output(&out, input.assumptions.rounding_tolerance);
        assert!(resp.verification);
        assert_eq!(resp.distributions.len(), 2);
        assert!(resp.discrepancy().abs() < dec!(0.01));
    }

    #[test]
    fn test_response_flags_mismatch() {
        let table = CapTable::new(
            CompanyStage::Seed,
            vec![ShareholdingEntry::new(
                "Founder",
                ShareClass::Common,
                dec!(1_000),
                dec!(0.01),
            )],
        );
        let (mut out, _) = run_waterfall(&WaterfallInput::new(dec!(1_000), table)).unwrap();
        out.distributions[0].total -= dec!(5);
        let resp = DistributionResponse::from_output(&out, dec!(0.01));
        assert!(!resp.verification);
        assert_eq!(resp.discrepancy(), dec!(-5));
    }
}
