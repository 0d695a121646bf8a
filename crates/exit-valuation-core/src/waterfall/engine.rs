use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::cap_table::{AntiDilutionMethod, CapTable, ShareClass};
use crate::config::EngineAssumptions;
use crate::dilution::adjust;
use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Multiple, Rate, Shares};
use crate::ValuationResult;

/// Holder name of the aggregate row.
pub const TOTAL_ROW: &str = "TOTAL";

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// One exit event to allocate across a cap table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallInput {
    pub exit_value: Money,
    pub cap_table: CapTable,
    /// Fraction of the exit value held back in escrow, in [0, 1).
    #[serde(default)]
    pub escrow_fraction: Rate,
    /// Exit date. Unvested shares are excluded unless their schedule
    /// accelerates on a change of control.
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
    /// Down-round price that protected preferred converts at.
    #[serde(default)]
    pub ratchet_price: Option<Money>,
    #[serde(default)]
    pub assumptions: EngineAssumptions,
}

impl WaterfallInput {
    pub fn new(exit_value: Money, cap_table: CapTable) -> Self {
        Self {
            exit_value,
            cap_table,
            escrow_fraction: Decimal::ZERO,
            as_of: None,
            ratchet_price: None,
            assumptions: EngineAssumptions::default(),
        }
    }

    pub fn terms(&self) -> ExitTerms {
        ExitTerms {
            escrow_fraction: self.escrow_fraction,
            as_of: self.as_of,
            ratchet_price: self.ratchet_price,
        }
    }
}

/// Exit-event terms that are independent of the exit value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitTerms {
    #[serde(default)]
    pub escrow_fraction: Rate,
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
    #[serde(default)]
    pub ratchet_price: Option<Money>,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Proceeds received by one holder, split by source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionResult {
    pub shareholder: String,
    pub share_classes: Vec<ShareClass>,
    /// Liquidation preference paid.
    pub preference_amount: Money,
    /// Residual received by participating preferred on top of its preference.
    pub participation_amount: Money,
    /// Residual received as common or as-converted common.
    pub common_amount: Money,
    pub total: Money,
    pub invested: Money,
    pub return_multiple: Option<Multiple>,
    pub pct_of_distributable: Rate,
}

impl DistributionResult {
    fn empty(shareholder: &str) -> Self {
        Self {
            shareholder: shareholder.to_string(),
            share_classes: Vec::new(),
            preference_amount: Decimal::ZERO,
            participation_amount: Decimal::ZERO,
            common_amount: Decimal::ZERO,
            total: Decimal::ZERO,
            invested: Decimal::ZERO,
            return_multiple: None,
            pct_of_distributable: Decimal::ZERO,
        }
    }

    fn finish(&mut self, distributable: Money) {
        self.total = self.preference_amount + self.participation_amount + self.common_amount;
        self.return_multiple = if self.invested > Decimal::ZERO {
            Some(self.total / self.invested)
        } else {
            None
        };
        if distributable > Decimal::ZERO {
            self.pct_of_distributable = self.total / distributable;
        }
    }
}

/// How one preferred class was treated in the exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecision {
    pub share_class: ShareClass,
    pub seniority_rank: u8,
    pub participating: bool,
    pub preference_claim: Money,
    pub preference_paid: Money,
    pub as_converted_shares: Shares,
    /// Non-participating holders' take if they keep the preference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preference_value: Option<Money>,
    /// Non-participating holders' take if they convert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_converted_value: Option<Money>,
    pub converted: bool,
    pub total_received: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallOutput {
    pub exit_value: Money,
    pub escrow_holdback: Money,
    pub distributable: Money,
    /// One row per holder, in cap-table order.
    pub distributions: Vec<DistributionResult>,
    /// The `TOTAL` row.
    pub total: DistributionResult,
    pub class_decisions: Vec<ClassDecision>,
}

impl WaterfallOutput {
    pub fn for_holder(&self, shareholder: &str) -> Option<&DistributionResult> {
        self.distributions
            .iter()
            .find(|d| d.shareholder == shareholder)
    }

    pub fn total_distributed(&self) -> Money {
        self.distributions.iter().map(|d| d.total).sum()
    }

    pub fn converted_classes(&self) -> Vec<ShareClass> {
        self.class_decisions
            .iter()
            .filter(|c| c.converted)
            .map(|c| c.share_class)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Everything one holder owns in one class, as it stands on exit.
#[derive(Debug, Clone)]
struct Position {
    shareholder: String,
    class: ShareClass,
    has_preference: bool,
    participating: bool,
    /// As-converted weight in the residual (options at the exercise
    /// fraction, ratchet shares included).
    weight: Shares,
    invested: Money,
    claim: Money,
    cap_multiple: Option<Multiple>,
}

impl Position {
    fn cap_total(&self) -> Option<Money> {
        self.cap_multiple.map(|m| m * self.invested)
    }

    fn takes_preference(&self, converting: &BTreeSet<ShareClass>) -> bool {
        self.has_preference && (self.participating || !converting.contains(&self.class))
    }

    fn in_residual(&self, converting: &BTreeSet<ShareClass>) -> bool {
        self.weight > Decimal::ZERO
            && (!self.has_preference || self.participating || converting.contains(&self.class))
    }
}

fn build_positions(
    cap_table: &CapTable,
    terms: &ExitTerms,
    exercise_fraction: Rate,
    warnings: &mut Vec<String>,
) -> ValuationResult<Vec<Position>> {
    let fd_total = cap_table.fully_diluted_shares(exercise_fraction);
    let mut positions: Vec<Position> = Vec::new();
    let mut index: BTreeMap<(&str, ShareClass), usize> = BTreeMap::new();
    let mut excluded = Decimal::ZERO;

    for e in &cap_table.entries {
        if e.rights.is_malformed() {
            warnings.push(format!(
                "Malformed rights on {} {}; using 1x non-participating",
                e.shareholder, e.share_class
            ));
        }
        let rights = e.rights.sanitized();
        let has_preference = e.share_class.has_preference();
        let shares = e.shares_on_exit(terms.as_of);
        excluded += e.shares - shares;

        let mut weight = e.fully_diluted_weight(shares, exercise_fraction);
        if let Some(price) = terms.ratchet_price {
            if has_preference
                && rights.anti_dilution != AntiDilutionMethod::None
                && e.price_per_share > price
                && shares > Decimal::ZERO
            {
                let adj = adjust(
                    e.price_per_share,
                    price,
                    shares,
                    Some(fd_total),
                    rights.anti_dilution,
                )?;
                weight += adj.additional_shares;
            }
        }

        let invested = shares * e.price_per_share;
        let claim = if has_preference {
            invested * rights.liquidation_preference_multiple
        } else {
            Decimal::ZERO
        };

        match index.get(&(e.shareholder.as_str(), e.share_class)) {
            Some(&i) => {
                let p = &mut positions[i];
                p.weight += weight;
                p.invested += invested;
                p.claim += claim;
            }
            None => {
                index.insert((e.shareholder.as_str(), e.share_class), positions.len());
                let participating = has_preference && rights.participating;
                positions.push(Position {
                    shareholder: e.shareholder.clone(),
                    class: e.share_class,
                    has_preference,
                    participating,
                    weight,
                    invested,
                    claim,
                    cap_multiple: if participating {
                        rights.effective_cap()
                    } else {
                        None
                    },
                });
            }
        }
    }

    if excluded > Decimal::ZERO {
        warnings.push(format!(
            "{} unvested shares excluded from the exit",
            excluded.round_dp(2)
        ));
    }
    Ok(positions)
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Allocation {
    preference: Vec<Money>,
    residual: Vec<Money>,
    /// Residual nobody was eligible for, spread over every holder.
    unabsorbed: Money,
}

impl Allocation {
    fn received(&self, i: usize) -> Money {
        self.preference[i] + self.residual[i]
    }
}

/// Preference stack then residual, for a fixed set of converting classes.
fn allocate(
    positions: &[Position],
    distributable: Money,
    converting: &BTreeSet<ShareClass>,
) -> ValuationResult<Allocation> {
    let n = positions.len();
    let mut alloc = Allocation {
        preference: vec![Decimal::ZERO; n],
        residual: vec![Decimal::ZERO; n],
        unabsorbed: Decimal::ZERO,
    };
    let mut remaining = distributable;

    // --- Preference stack, most senior rank first ---
    let mut ranks: Vec<u8> = positions
        .iter()
        .filter(|p| p.takes_preference(converting))
        .map(|p| p.class.seniority_rank())
        .collect();
    ranks.sort_unstable_by(|a, b| b.cmp(a));
    ranks.dedup();

    for rank in ranks {
        if remaining <= Decimal::ZERO {
            break;
        }
        let members: Vec<usize> = (0..n)
            .filter(|&i| {
                positions[i].takes_preference(converting)
                    && positions[i].class.seniority_rank() == rank
            })
            .collect();
        let level_claim: Money = members.iter().map(|&i| positions[i].claim).sum();
        if level_claim <= Decimal::ZERO {
            continue;
        }
        let paid = level_claim.min(remaining);
        for &i in &members {
            // pro-rata within the rank when the pool runs dry mid-stack
            let amount = if paid == level_claim {
                positions[i].claim
            } else {
                paid * positions[i].claim / level_claim
            };
            alloc.preference[i] = amount;
            remaining -= amount;
        }
    }

    // --- Residual, with participation caps ---
    let mut pool = remaining.max(Decimal::ZERO);
    let mut active: Vec<usize> = (0..n)
        .filter(|&i| positions[i].in_residual(converting))
        .collect();

    while pool > Decimal::ZERO && !active.is_empty() {
        let total_weight: Shares = active.iter().map(|&i| positions[i].weight).sum();
        if total_weight <= Decimal::ZERO {
            break;
        }

        let mut clamped: Vec<(usize, Money)> = Vec::new();
        for &i in &active {
            if let Some(cap) = positions[i].cap_total() {
                let headroom = (cap - alloc.received(i)).max(Decimal::ZERO);
                if pool * positions[i].weight / total_weight > headroom {
                    clamped.push((i, headroom));
                }
            }
        }

        if clamped.is_empty() {
            for &i in &active {
                alloc.residual[i] += pool * positions[i].weight / total_weight;
            }
            pool = Decimal::ZERO;
        } else {
            for &(i, headroom) in &clamped {
                alloc.residual[i] += headroom;
                pool -= headroom;
            }
            active.retain(|i| !clamped.iter().any(|(c, _)| c == i));
        }
    }

    if pool > Decimal::ZERO {
        let total_weight: Shares = positions.iter().map(|p| p.weight).sum();
        if total_weight <= Decimal::ZERO {
            return Err(ValuationError::InvalidInput {
                field: "cap_table.entries".into(),
                reason: "No shares outstanding on exit to receive residual proceeds".into(),
            });
        }
        for (i, p) in positions.iter().enumerate() {
            alloc.residual[i] += pool * p.weight / total_weight;
        }
        alloc.unabsorbed = pool;
    }

    Ok(alloc)
}

/// Take of the non-participating holders of one class under an allocation.
fn class_take(positions: &[Position], alloc: &Allocation, class: ShareClass) -> Money {
    positions
        .iter()
        .enumerate()
        .filter(|(_, p)| p.class == class && !p.participating)
        .map(|(i, _)| alloc.received(i))
        .sum()
}

struct ConversionTrace {
    preference_value: Money,
    as_converted_value: Money,
}

/// Decide, class by class, whether non-participating preferred converts.
///
/// Classes are visited cheapest preference per share first; each decision
/// holds every other class's choice fixed.
fn decide_conversions(
    positions: &[Position],
    distributable: Money,
) -> ValuationResult<(BTreeSet<ShareClass>, BTreeMap<ShareClass, ConversionTrace>)> {
    let mut per_class: BTreeMap<ShareClass, (Money, Shares)> = BTreeMap::new();
    for p in positions
        .iter()
        .filter(|p| p.has_preference && !p.participating)
    {
        let entry = per_class.entry(p.class).or_default();
        entry.0 += p.claim;
        entry.1 += p.weight;
    }

    let mut candidates: Vec<(ShareClass, Money)> = per_class
        .into_iter()
        .filter(|(_, (_, weight))| *weight > Decimal::ZERO)
        .map(|(class, (claim, weight))| (class, claim / weight))
        .collect();
    candidates.sort_by(|a, b| {
        a.1.cmp(&b.1)
            .then(a.0.seniority_rank().cmp(&b.0.seniority_rank()))
    });

    let mut converting: BTreeSet<ShareClass> = BTreeSet::new();
    let mut trace: BTreeMap<ShareClass, ConversionTrace> = BTreeMap::new();
    for (class, _) in candidates {
        let keep = allocate(positions, distributable, &converting)?;
        let mut with_class = converting.clone();
        with_class.insert(class);
        let convert = allocate(positions, distributable, &with_class)?;

        let preference_value = class_take(positions, &keep, class);
        let as_converted_value = class_take(positions, &convert, class);
        if as_converted_value > preference_value {
            converting = with_class;
        }
        trace.insert(
            class,
            ConversionTrace {
                preference_value,
                as_converted_value,
            },
        );
    }
    Ok((converting, trace))
}

// ---------------------------------------------------------------------------
// Waterfall
// ---------------------------------------------------------------------------

fn validate(
    cap_table: &CapTable,
    exit_value: Money,
    terms: &ExitTerms,
    assumptions: &EngineAssumptions,
) -> ValuationResult<()> {
    assumptions.validate()?;
    if exit_value < Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "exit_value".into(),
            reason: "Exit value cannot be negative".into(),
        });
    }
    if cap_table.is_empty() {
        return Err(ValuationError::InsufficientData(
            "Cap table has no entries".into(),
        ));
    }
    cap_table.validate()?;
    if terms.escrow_fraction < Decimal::ZERO || terms.escrow_fraction >= Decimal::ONE {
        return Err(ValuationError::InvalidInput {
            field: "escrow_fraction".into(),
            reason: "Escrow fraction must be in [0, 1)".into(),
        });
    }
    if let Some(price) = terms.ratchet_price {
        if price <= Decimal::ZERO {
            return Err(ValuationError::InvalidInput {
                field: "ratchet_price".into(),
                reason: "Ratchet price must be positive".into(),
            });
        }
    }
    Ok(())
}

/// Allocate one exit value across a cap table.
///
/// Used directly when the same table is run against many exit values.
pub fn waterfall_for_exit(
    cap_table: &CapTable,
    exit_value: Money,
    terms: &ExitTerms,
    assumptions: &EngineAssumptions,
) -> ValuationResult<(WaterfallOutput, Vec<String>)> {
    validate(cap_table, exit_value, terms, assumptions)?;
    let mut warnings: Vec<String> = Vec::new();

    let escrow_holdback = exit_value * terms.escrow_fraction;
    let distributable = exit_value - escrow_holdback;

    let positions = build_positions(
        cap_table,
        terms,
        assumptions.option_exercise_fraction,
        &mut warnings,
    )?;
    let (converting, trace) = decide_conversions(&positions, distributable)?;
    let alloc = allocate(&positions, distributable, &converting)?;

    if alloc.unabsorbed > Decimal::ZERO {
        warnings.push(format!(
            "Residual of {} had no eligible participant (caps reached or no common); \
             spread pro-rata across all holders",
            alloc.unabsorbed.round_dp(2)
        ));
    }

    // --- Per-holder rows, keyed by holder ---
    let mut by_holder: BTreeMap<&str, DistributionResult> = BTreeMap::new();
    for (i, p) in positions.iter().enumerate() {
        let row = by_holder
            .entry(p.shareholder.as_str())
            .or_insert_with(|| DistributionResult::empty(&p.shareholder));
        if !row.share_classes.contains(&p.class) {
            row.share_classes.push(p.class);
        }
        row.invested += p.invested;
        row.preference_amount += alloc.preference[i];
        if p.participating {
            row.participation_amount += alloc.residual[i];
        } else {
            row.common_amount += alloc.residual[i];
        }
    }

    let mut distributions: Vec<DistributionResult> = Vec::new();
    for holder in cap_table.holders() {
        if let Some(mut row) = by_holder.remove(holder) {
            row.finish(distributable);
            distributions.push(row);
        }
    }

    let mut total = DistributionResult::empty(TOTAL_ROW);
    for d in &distributions {
        total.preference_amount += d.preference_amount;
        total.participation_amount += d.participation_amount;
        total.common_amount += d.common_amount;
        total.invested += d.invested;
    }
    total.finish(distributable);

    // --- Class trace ---
    let mut classes: Vec<ShareClass> = positions
        .iter()
        .filter(|p| p.has_preference)
        .map(|p| p.class)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    classes.sort_by(|a, b| b.seniority_rank().cmp(&a.seniority_rank()));
    let class_decisions: Vec<ClassDecision> = classes
        .into_iter()
        .map(|class| {
            let members = || {
                positions
                    .iter()
                    .enumerate()
                    .filter(move |(_, p)| p.class == class)
            };
            let t = trace.get(&class);
            ClassDecision {
                share_class: class,
                seniority_rank: class.seniority_rank(),
                participating: members().any(|(_, p)| p.participating),
                preference_claim: members().map(|(_, p)| p.claim).sum(),
                preference_paid: members().map(|(i, _)| alloc.preference[i]).sum(),
                as_converted_shares: members().map(|(_, p)| p.weight).sum(),
                preference_value: t.map(|t| t.preference_value),
                as_converted_value: t.map(|t| t.as_converted_value),
                converted: converting.contains(&class),
                total_received: members().map(|(i, _)| alloc.received(i)).sum(),
            }
        })
        .collect();

    // --- Sum invariant ---
    let distributed = total.total;
    if (distributed - distributable).abs() > assumptions.rounding_tolerance {
        let claims = class_decisions
            .iter()
            .map(|c| format!("{}={}", c.share_class, c.preference_claim))
            .collect::<Vec<_>>()
            .join(", ");
        let context = format!(
            "exit_value={exit_value}, escrow_fraction={}, claims=[{claims}]",
            terms.escrow_fraction
        );
        error!(
            exit_value = %exit_value,
            distributable = %distributable,
            distributed = %distributed,
            claims = %claims,
            "distribution sum does not match distributable proceeds"
        );
        return Err(ValuationError::InvariantViolation {
            check: "sum of distributions equals distributable proceeds".into(),
            expected: distributable,
            actual: distributed,
            context,
        });
    }

    for w in &warnings {
        warn!(target: "exit_valuation::waterfall", "{w}");
    }
    debug!(
        exit_value = %exit_value,
        distributable = %distributable,
        holders = distributions.len(),
        converted = ?converting,
        "waterfall allocated"
    );

    Ok((
        WaterfallOutput {
            exit_value,
            escrow_holdback,
            distributable,
            distributions,
            total,
            class_decisions,
        },
        warnings,
    ))
}

/// Un-enveloped waterfall for an input struct.
pub fn run_waterfall(input: &WaterfallInput) -> ValuationResult<(WaterfallOutput, Vec<String>)> {
    waterfall_for_exit(
        &input.cap_table,
        input.exit_value,
        &input.terms(),
        &input.assumptions,
    )
}

/// Distribute exit proceeds across a cap table.
///
/// Escrow is held back first. Preference claims are paid by seniority rank,
/// later series first and pro-rata within a rank. Each non-participating
/// preferred class then takes the better of its preference and conversion
/// to common. The residual goes pro-rata by as-converted shares to common,
/// converted and participating holders, with participation caps clamped and
/// the excess redistributed. The distributions must sum to the distributable
/// amount within the rounding tolerance.
pub fn distribute_proceeds(
    input: &WaterfallInput,
) -> ValuationResult<ComputationOutput<WaterfallOutput>> {
    let start = Instant::now();
    let (output, warnings) = run_waterfall(input)?;
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Liquidation Preference Waterfall (seniority stack, conversion choice, capped participation)",
        &serde_json::json!({
            "exit_value": input.exit_value.to_string(),
            "escrow_fraction": input.escrow_fraction.to_string(),
            "as_of": input.as_of.map(|d| d.to_string()),
            "ratchet_price": input.ratchet_price.map(|p| p.to_string()),
            "option_exercise_fraction": input.assumptions.option_exercise_fraction.to_string(),
            "rounding_tolerance": input.assumptions.rounding_tolerance.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cap_table::{CompanyStage, Rights, ShareholdingEntry, VestingSchedule};
    use rust_decimal_macros::dec;

    fn founder_and_a() -> CapTable {
        CapTable::new(
            CompanyStage::SeriesA,
            vec![
                ShareholdingEntry::new("Founder", ShareClass::Common, dec!(7_000_000), dec!(0.01)),
                ShareholdingEntry::new("SeriesA", ShareClass::SeriesA, dec!(2_000_000), dec!(1.00)),
            ],
        )
    }

    fn run(exit: Money, table: CapTable) -> WaterfallOutput {
        run_waterfall(&WaterfallInput::new(exit, table)).unwrap().0
    }

    fn total_of(out: &WaterfallOutput, holder: &str) -> Money {
        out.for_holder(holder).unwrap().total
    }

    #[test]
    fn test_small_exit_preferred_takes_preference() {
        let out = run(dec!(5_000_000), founder_and_a());
        let a = out.for_holder("SeriesA").unwrap();
        assert_eq!(a.preference_amount, dec!(2_000_000));
        assert_eq!(a.common_amount, Decimal::ZERO);
        assert_eq!(total_of(&out, "Founder"), dec!(3_000_000));
        assert_eq!(out.total.total, dec!(5_000_000));
        assert_eq!(out.total.shareholder, TOTAL_ROW);
        assert!(!out.class_decisions[0].converted);
    }

    #[test]
    fn test_large_exit_preferred_converts() {
        let out = run(dec!(20_000_000), founder_and_a());
        let a = out.for_holder("SeriesA").unwrap();
        // 2/9 * 20M = 4,444,444.44
        assert_eq!(a.preference_amount, Decimal::ZERO);
        assert_eq!(a.total.round_dp(2), dec!(4_444_444.44));
        assert_eq!(total_of(&out, "Founder").round_dp(2), dec!(15_555_555.56));
        assert!((out.total.total - dec!(20_000_000)).abs() < dec!(0.01));
        let decision = &out.class_decisions[0];
        assert!(decision.converted);
        assert_eq!(decision.preference_value, Some(dec!(2_000_000)));
    }

    #[test]
    fn test_preference_exhausts_pool_most_senior_first() {
        let mut table = founder_and_a();
        table.entries.push(ShareholdingEntry::new(
            "SeriesB",
            ShareClass::SeriesB,
            dec!(1_000_000),
            dec!(3.00),
        ));
        // B claims 3M and is senior; A gets the 1M left; common gets nothing
        let out = run(dec!(4_000_000), table);
        assert_eq!(out.for_holder("SeriesB").unwrap().preference_amount, dec!(3_000_000));
        assert_eq!(out.for_holder("SeriesA").unwrap().preference_amount, dec!(1_000_000));
        assert_eq!(total_of(&out, "Founder"), Decimal::ZERO);
        assert_eq!(out.class_decisions[0].share_class, ShareClass::SeriesB);
    }

    #[test]
    fn test_pro_rata_within_rank() {
        let table = CapTable::new(
            CompanyStage::SeriesA,
            vec![
                ShareholdingEntry::new("Founder", ShareClass::Common, dec!(5_000_000), dec!(0.01)),
                ShareholdingEntry::new("Lead", ShareClass::SeriesA, dec!(3_000_000), dec!(1)),
                ShareholdingEntry::new("Follow", ShareClass::SeriesA, dec!(1_000_000), dec!(1)),
            ],
        );
        // claims 3M + 1M against a 2M pool: 1.5M / 0.5M
        let out = run(dec!(2_000_000), table);
        assert_eq!(out.for_holder("Lead").unwrap().preference_amount, dec!(1_500_000));
        assert_eq!(out.for_holder("Follow").unwrap().preference_amount, dec!(500_000));
    }

    #[test]
    fn test_participating_double_dips() {
        let mut table = founder_and_a();
        table.entries[1].rights = Rights {
            participating: true,
            ..Rights::default()
        };
        // 2M preference + 2/9 of the remaining 7M
        let out = run(dec!(9_000_000), table);
        let a = out.for_holder("SeriesA").unwrap();
        assert_eq!(a.preference_amount, dec!(2_000_000));
        assert!((a.participation_amount - dec!(1_555_555.555555)).abs() < dec!(0.01));
        assert!((a.total + total_of(&out, "Founder") - dec!(9_000_000)).abs() < dec!(0.01));
    }

    #[test]
    fn test_participation_cap_redistributes_excess() {
        let mut table = founder_and_a();
        table.entries[1].rights = Rights {
            participating: true,
            participation_cap: Some(dec!(2)),
            ..Rights::default()
        };
        // uncapped would be 2M + 2/9 * 98M; the cap holds A to 2x of 2M
        let out = run(dec!(100_000_000), table);
        let a = out.for_holder("SeriesA").unwrap();
        assert_eq!(a.total, dec!(4_000_000));
        assert_eq!(a.participation_amount, dec!(2_000_000));
        assert_eq!(total_of(&out, "Founder"), dec!(96_000_000));
    }

    #[test]
    fn test_escrow_holdback() {
        let input = WaterfallInput {
            escrow_fraction: dec!(0.10),
            ..WaterfallInput::new(dec!(10_000_000), founder_and_a())
        };
        let (out, _) = run_waterfall(&input).unwrap();
        assert_eq!(out.escrow_holdback, dec!(1_000_000));
        assert_eq!(out.distributable, dec!(9_000_000));
        assert!((out.total_distributed() - dec!(9_000_000)).abs() < dec!(0.01));
    }

    #[test]
    fn test_options_count_at_exercise_fraction() {
        let table = CapTable::new(
            CompanyStage::Seed,
            vec![
                ShareholdingEntry::new("Founder", ShareClass::Common, dec!(3_000_000), dec!(0.01)),
                ShareholdingEntry::new("Pool", ShareClass::Options, dec!(1_000_000), dec!(0.10)),
            ],
        );
        // weights 3M and 0.75M
        let out = run(dec!(3_750_000), table);
        assert_eq!(total_of(&out, "Founder"), dec!(3_000_000));
        assert_eq!(total_of(&out, "Pool"), dec!(750_000));
    }

    #[test]
    fn test_holder_rows_merge_classes_in_table_order() {
        let mut table = founder_and_a();
        table.entries.push(ShareholdingEntry::new(
            "Founder",
            ShareClass::SeriesA,
            dec!(100_000),
            dec!(1),
        ));
        let out = run(dec!(5_000_000), table);
        assert_eq!(out.distributions.len(), 2);
        assert_eq!(out.distributions[0].shareholder, "Founder");
        assert_eq!(
            out.distributions[0].share_classes,
            vec![ShareClass::Common, ShareClass::SeriesA]
        );
    }

    #[test]
    fn test_unvested_shares_excluded_on_exit() {
        let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        let mut table = founder_and_a();
        table.entries[0] = table.entries[0].clone().with_vesting(VestingSchedule {
            total_shares: dec!(7_000_000),
            cliff_months: 12,
            vesting_months: 48,
            start_date: start,
            accelerate_on_change_of_control: false,
        });
        let input = WaterfallInput {
            as_of: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..WaterfallInput::new(dec!(20_000_000), table.clone())
        };
        let (out, warnings) = run_waterfall(&input).unwrap();
        // half vested: 3.5M founder vs 2M A as-converted
        let a = total_of(&out, "SeriesA");
        assert!((a - dec!(20_000_000) * dec!(2) / dec!(5.5)).abs() < dec!(0.01));
        assert!(warnings.iter().any(|w| w.contains("unvested")));

        table.entries[0]
            .vesting
            .as_mut()
            .unwrap()
            .accelerate_on_change_of_control = true;
        let accelerated = WaterfallInput {
            as_of: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..WaterfallInput::new(dec!(20_000_000), table)
        };
        let (out, _) = run_waterfall(&accelerated).unwrap();
        assert_eq!(total_of(&out, "SeriesA").round_dp(2), dec!(4_444_444.44));
    }

    #[test]
    fn test_ratchet_increases_as_converted_share_only() {
        let mut table = founder_and_a();
        table.entries[1].rights = Rights {
            anti_dilution: AntiDilutionMethod::FullRatchet,
            ..Rights::default()
        };
        let input = WaterfallInput {
            ratchet_price: Some(dec!(0.50)),
            ..WaterfallInput::new(dec!(22_000_000), table)
        };
        let (out, _) = run_waterfall(&input).unwrap();
        // 2M shares at 0.50 convert into 4M: 4/11 of 22M = 8M
        assert!((total_of(&out, "SeriesA") - dec!(8_000_000)).abs() < dec!(0.01));
        assert_eq!(out.class_decisions[0].preference_claim, dec!(2_000_000));
    }

    #[test]
    fn test_malformed_rights_default_with_warning() {
        let mut table = founder_and_a();
        table.entries[1].rights.liquidation_preference_multiple = dec!(-2);
        let (out, warnings) = run_waterfall(&WaterfallInput::new(dec!(5_000_000), table)).unwrap();
        assert_eq!(out.for_holder("SeriesA").unwrap().preference_amount, dec!(2_000_000));
        assert!(warnings.iter().any(|w| w.contains("Malformed")));
    }

    #[test]
    fn test_only_non_participating_preferred_gets_everything() {
        let table = CapTable::new(
            CompanyStage::SeriesA,
            vec![ShareholdingEntry::new(
                "Fund",
                ShareClass::SeriesA,
                dec!(1_000_000),
                dec!(1),
            )],
        );
        let out = run(dec!(3_000_000), table);
        assert_eq!(total_of(&out, "Fund"), dec!(3_000_000));
    }

    #[test]
    fn test_zero_exit() {
        let out = run(Decimal::ZERO, founder_and_a());
        assert!(out.distributions.iter().all(|d| d.total.is_zero()));
    }

    #[test]
    fn test_negative_exit_rejected() {
        let err = run_waterfall(&WaterfallInput::new(dec!(-1), founder_and_a())).unwrap_err();
        match err {
            ValuationError::InvalidInput { field, .. } => assert_eq!(field, "exit_value"),
            other => panic!("Expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_cap_table_rejected() {
        let table = CapTable::new(CompanyStage::Seed, vec![]);
        let err = run_waterfall(&WaterfallInput::new(dec!(1), table)).unwrap_err();
        assert!(matches!(err, ValuationError::InsufficientData(_)));
    }

    #[test]
    fn test_escrow_out_of_range_rejected() {
        let input = WaterfallInput {
            escrow_fraction: Decimal::ONE,
            ..WaterfallInput::new(dec!(1_000), founder_and_a())
        };
        assert!(run_waterfall(&input).is_err());
    }

    #[test]
    fn test_envelope() {
        let out = distribute_proceeds(&WaterfallInput::new(dec!(5_000_000), founder_and_a())).unwrap();
        assert!(out.methodology.contains("Waterfall"));
        assert_eq!(out.result.distributions.len(), 2);
    }
}
