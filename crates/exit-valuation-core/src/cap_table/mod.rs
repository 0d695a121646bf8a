pub mod entry;
pub mod vesting;

pub use entry::{AntiDilutionMethod, Rights, ShareClass, ShareholdingEntry};
pub use vesting::{vested_shares, VestingSchedule};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Instant;

use crate::config::EngineAssumptions;
use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Rate, Shares};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Company stage
// ---------------------------------------------------------------------------

/// Company maturity tag used to select benchmark ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStage {
    PreSeed,
    Seed,
    SeriesA,
    SeriesB,
    SeriesC,
    Growth,
    LateStage,
}

impl CompanyStage {
    pub const ALL: [CompanyStage; 7] = [
        CompanyStage::PreSeed,
        CompanyStage::Seed,
        CompanyStage::SeriesA,
        CompanyStage::SeriesB,
        CompanyStage::SeriesC,
        CompanyStage::Growth,
        CompanyStage::LateStage,
    ];

    /// Stage reached after one more priced round.
    pub fn next(&self) -> CompanyStage {
        match self {
            CompanyStage::PreSeed => CompanyStage::Seed,
            CompanyStage::Seed => CompanyStage::SeriesA,
            CompanyStage::SeriesA => CompanyStage::SeriesB,
            CompanyStage::SeriesB => CompanyStage::SeriesC,
            CompanyStage::SeriesC => CompanyStage::Growth,
            CompanyStage::Growth | CompanyStage::LateStage => CompanyStage::LateStage,
        }
    }

    /// Stage implied by the number of rounds completed ("seed" = 1).
    pub fn from_round_count(rounds: usize) -> CompanyStage {
        match rounds {
            0 => CompanyStage::PreSeed,
            1 => CompanyStage::Seed,
            2 => CompanyStage::SeriesA,
            3 => CompanyStage::SeriesB,
            4 => CompanyStage::SeriesC,
            5 => CompanyStage::Growth,
            _ => CompanyStage::LateStage,
        }
    }
}

impl fmt::Display for CompanyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompanyStage::PreSeed => "Pre-Seed",
            CompanyStage::Seed => "Seed",
            CompanyStage::SeriesA => "Series A",
            CompanyStage::SeriesB => "Series B",
            CompanyStage::SeriesC => "Series C",
            CompanyStage::Growth => "Growth",
            CompanyStage::LateStage => "Late Stage",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Cap table
// ---------------------------------------------------------------------------

/// Ordered shareholding entries for one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub entries: Vec<ShareholdingEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized_shares: Option<Shares>,
    pub stage: CompanyStage,
}

impl CapTable {
    pub fn new(stage: CompanyStage, entries: Vec<ShareholdingEntry>) -> Self {
        Self {
            company_name: None,
            entries,
            authorized_shares: None,
            stage,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject entries that break the data-model invariants.
    pub fn validate(&self) -> ValuationResult<()> {
        for (i, e) in self.entries.iter().enumerate() {
            if e.shares < Decimal::ZERO {
                return Err(ValuationError::InvalidInput {
                    field: format!("entries[{i}].shares"),
                    reason: format!("Share count for {} cannot be negative", e.shareholder),
                });
            }
            if e.price_per_share < Decimal::ZERO {
                return Err(ValuationError::InvalidInput {
                    field: format!("entries[{i}].price_per_share"),
                    reason: format!("Price per share for {} cannot be negative", e.shareholder),
                });
            }
        }
        Ok(())
    }

    /// Distinct shareholders in first-appearance order.
    pub fn holders(&self) -> Vec<&str> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut out = Vec::new();
        for e in &self.entries {
            if seen.insert(e.shareholder.as_str()) {
                out.push(e.shareholder.as_str());
            }
        }
        out
    }

    pub fn entries_for<'a>(
        &'a self,
        shareholder: &'a str,
    ) -> impl Iterator<Item = &'a ShareholdingEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.shareholder == shareholder)
    }

    pub fn contains_holder(&self, shareholder: &str) -> bool {
        self.entries.iter().any(|e| e.shareholder == shareholder)
    }

    /// Shares issued across every class, options at face.
    pub fn total_issued_shares(&self) -> Shares {
        self.entries.iter().map(|e| e.shares).sum()
    }

    /// Fully-diluted share count with options at the exercise fraction.
    pub fn fully_diluted_shares(&self, exercise_fraction: Rate) -> Shares {
        self.entries
            .iter()
            .map(|e| e.fully_diluted_weight(e.shares, exercise_fraction))
            .sum()
    }

    /// Capital invested by one shareholder across all classes.
    pub fn invested_by(&self, shareholder: &str) -> Decimal {
        self.entries_for(shareholder)
            .map(|e| e.invested_amount())
            .sum()
    }

    /// Shares vested across the whole table as of a date.
    pub fn vested_shares(&self, as_of: NaiveDate) -> Shares {
        self.entries.iter().map(|e| e.vested_shares(as_of)).sum()
    }

    /// Most senior priced series on the table, if any.
    pub fn latest_series(&self) -> Option<ShareClass> {
        self.entries
            .iter()
            .map(|e| e.share_class)
            .filter(|c| c.has_preference())
            .max_by_key(|c| c.seniority_rank())
    }

    /// Per-holder ownership as of an optional date.
    pub fn ownership_snapshot(
        &self,
        as_of: Option<NaiveDate>,
        exercise_fraction: Rate,
    ) -> Vec<OwnershipLine> {
        let issued = self.total_issued_shares();
        let fully_diluted = self.fully_diluted_shares(exercise_fraction);

        let mut by_holder: BTreeMap<&str, OwnershipLine> = BTreeMap::new();
        for e in &self.entries {
            let line = by_holder
                .entry(e.shareholder.as_str())
                .or_insert_with(|| OwnershipLine {
                    shareholder: e.shareholder.clone(),
                    share_classes: Vec::new(),
                    shares: Decimal::ZERO,
                    vested_shares: Decimal::ZERO,
                    fully_diluted_shares: Decimal::ZERO,
                    basic_pct: Decimal::ZERO,
                    fully_diluted_pct: Decimal::ZERO,
                });
            if !line.share_classes.contains(&e.share_class) {
                line.share_classes.push(e.share_class);
            }
            line.shares += e.shares;
            line.vested_shares += match as_of {
                Some(date) => e.vested_shares(date),
                None => e.shares,
            };
            line.fully_diluted_shares += e.fully_diluted_weight(e.shares, exercise_fraction);
        }

        self.holders()
            .into_iter()
            .filter_map(|h| by_holder.remove(h))
            .map(|mut line| {
                if !issued.is_zero() {
                    line.basic_pct = line.shares / issued;
                }
                if !fully_diluted.is_zero() {
                    line.fully_diluted_pct = line.fully_diluted_shares / fully_diluted;
                }
                line
            })
            .collect()
    }
}

/// One holder's row in an ownership snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipLine {
    pub shareholder: String,
    pub share_classes: Vec<ShareClass>,
    pub shares: Shares,
    pub vested_shares: Shares,
    pub fully_diluted_shares: Shares,
    pub basic_pct: Decimal,
    pub fully_diluted_pct: Decimal,
}

// ---------------------------------------------------------------------------
// Ownership snapshot operation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipInput {
    pub cap_table: CapTable,
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
    #[serde(default)]
    pub assumptions: EngineAssumptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipOutput {
    pub holders: Vec<OwnershipLine>,
    pub total_issued_shares: Shares,
    pub fully_diluted_shares: Shares,
    pub vested_shares: Option<Shares>,
    pub unissued_authorized_shares: Option<Shares>,
}

/// Ownership snapshot of a cap table, basic and fully diluted.
pub fn snapshot_ownership(
    input: &OwnershipInput,
) -> ValuationResult<ComputationOutput<OwnershipOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    input.assumptions.validate()?;
    if input.cap_table.is_empty() {
        return Err(ValuationError::InsufficientData(
            "Cap table has no entries".into(),
        ));
    }
    input.cap_table.validate()?;

    let fraction = input.assumptions.option_exercise_fraction;
    let issued = input.cap_table.total_issued_shares();
    let unissued = input.cap_table.authorized_shares.map(|a| a - issued);
    if let Some(u) = unissued {
        if u < Decimal::ZERO {
            warnings.push(format!(
                "Issued shares exceed authorized shares by {}",
                u.abs()
            ));
        }
    }

    let output = OwnershipOutput {
        holders: input.cap_table.ownership_snapshot(input.as_of, fraction),
        total_issued_shares: issued,
        fully_diluted_shares: input.cap_table.fully_diluted_shares(fraction),
        vested_shares: input.as_of.map(|d| input.cap_table.vested_shares(d)),
        unissued_authorized_shares: unissued,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Cap Table Ownership Snapshot (options at assumed exercise fraction)",
        &serde_json::json!({
            "stage": input.cap_table.stage.to_string(),
            "num_entries": input.cap_table.entries.len(),
            "option_exercise_fraction": fraction.to_string(),
            "as_of": input.as_of.map(|d| d.to_string()),
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

    fn table() -> CapTable {
        CapTable::new(
            CompanyStage::SeriesA,
            vec![
                ShareholdingEntry::new("Founder", ShareClass::Common, dec!(7_000_000), dec!(0.01)),
                ShareholdingEntry::new("Pool", ShareClass::Options, dec!(1_000_000), dec!(0.25)),
                ShareholdingEntry::new("Fund I", ShareClass::SeriesA, dec!(2_000_000), dec!(1.00)),
                ShareholdingEntry::new("Founder", ShareClass::SeriesA, dec!(100_000), dec!(1.00)),
            ],
        )
    }

    #[test]
    fn test_holders_first_appearance_order() {
        assert_eq!(table().holders(), vec!["Founder", "Pool", "Fund I"]);
    }

    #[test]
    fn test_fully_diluted_uses_exercise_fraction() {
        // 7M + 0.75 * 1M + 2M + 0.1M
        assert_eq!(table().fully_diluted_shares(dec!(0.75)), dec!(9_850_000));
        assert_eq!(table().total_issued_shares(), dec!(10_100_000));
    }

    #[test]
    fn test_snapshot_groups_by_holder() {
        let snap = table().ownership_snapshot(None, dec!(0.75));
        assert_eq!(snap.len(), 3);
        let founder = &snap[0];
        assert_eq!(founder.shareholder, "Founder");
        assert_eq!(founder.shares, dec!(7_100_000));
        assert_eq!(
            founder.share_classes,
            vec![ShareClass::Common, ShareClass::SeriesA]
        );
        let total: Decimal = snap.iter().map(|l| l.fully_diluted_pct).sum();
        assert!((total - Decimal::ONE).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_invested_and_latest_series() {
        let t = table();
        assert_eq!(t.invested_by("Fund I"), dec!(2_000_000));
        assert_eq!(t.latest_series(), Some(ShareClass::SeriesA));
    }

    #[test]
    fn test_negative_shares_rejected() {
        let mut t = table();
        t.entries[0].shares = dec!(-1);
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_snapshot_operation_errors_on_empty() {
        let input = OwnershipInput {
            cap_table: CapTable::new(CompanyStage::Seed, vec![]),
            as_of: None,
            assumptions: EngineAssumptions::default(),
        };
        assert!(matches!(
            snapshot_ownership(&input),
            Err(ValuationError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_snapshot_operation_flags_over_issuance() {
        let mut t = table();
        t.authorized_shares = Some(dec!(10_000_000));
        let out = snapshot_ownership(&OwnershipInput {
            cap_table: t,
            as_of: None,
            assumptions: EngineAssumptions::default(),
        })
        .unwrap();
        assert_eq!(out.result.unissued_authorized_shares, Some(dec!(-100_000)));
        assert!(out.warnings.iter().any(|w| w.contains("exceed authorized")));
    }
}
