use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, warn};

use super::anti_dilution::adjust;
use crate::cap_table::{
    AntiDilutionMethod, CapTable, CompanyStage, Rights, ShareClass, ShareholdingEntry,
};
use crate::config::EngineAssumptions;
use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Rate, Shares};
use crate::ValuationResult;

/// Holder name used for option pool top-ups in pro-forma tables.
pub const OPTION_POOL_HOLDER: &str = "Option Pool (Unallocated)";

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Typical dilution of pre-round holders for a round at a given stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DilutionBenchmark {
    pub stage: CompanyStage,
    pub low: Rate,
    pub high: Rate,
}

pub const STAGE_DILUTION_BENCHMARKS: [DilutionBenchmark; 7] = [
    DilutionBenchmark {
        stage: CompanyStage::PreSeed,
        low: dec!(0.10),
        high: dec!(0.20),
    },
    DilutionBenchmark {
        stage: CompanyStage::Seed,
        low: dec!(0.15),
        high: dec!(0.25),
    },
    DilutionBenchmark {
        stage: CompanyStage::SeriesA,
        low: dec!(0.18),
        high: dec!(0.25),
    },
    DilutionBenchmark {
        stage: CompanyStage::SeriesB,
        low: dec!(0.15),
        high: dec!(0.22),
    },
    DilutionBenchmark {
        stage: CompanyStage::SeriesC,
        low: dec!(0.10),
        high: dec!(0.20),
    },
    DilutionBenchmark {
        stage: CompanyStage::Growth,
        low: dec!(0.08),
        high: dec!(0.15),
    },
    DilutionBenchmark {
        stage: CompanyStage::LateStage,
        low: dec!(0.05),
        high: dec!(0.12),
    },
];

pub fn benchmark_for(stage: CompanyStage) -> DilutionBenchmark {
    STAGE_DILUTION_BENCHMARKS
        .iter()
        .copied()
        .find(|b| b.stage == stage)
        .unwrap_or(DilutionBenchmark {
            stage,
            low: Decimal::ZERO,
            high: Decimal::ONE,
        })
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Terms of the security issued in the new round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundTerms {
    pub investor: String,
    /// Defaults to the series after the most senior one on the table.
    #[serde(default)]
    pub share_class: Option<ShareClass>,
    #[serde(default)]
    pub rights: Rights,
    #[serde(default)]
    pub investment_date: Option<NaiveDate>,
    /// Stage the round brings the company to. Defaults to the next stage.
    #[serde(default)]
    pub round_stage: Option<CompanyStage>,
}

impl RoundTerms {
    pub fn new(investor: impl Into<String>) -> Self {
        Self {
            investor: investor.into(),
            share_class: None,
            rights: Rights::default(),
            investment_date: None,
            round_stage: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundInput {
    pub cap_table: CapTable,
    pub investment_amount: Money,
    pub pre_money_valuation: Money,
    /// New option pool shares created ahead of the round.
    #[serde(default)]
    pub option_pool_increase: Shares,
    pub terms: RoundTerms,
    #[serde(default)]
    pub assumptions: EngineAssumptions,
}

/// One holder's ownership before and after the round (fully diluted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderDilution {
    pub shareholder: String,
    pub fully_diluted_before: Shares,
    pub fully_diluted_after: Shares,
    pub old_pct: Rate,
    pub new_pct: Rate,
    /// Relative loss of ownership: (old - new) / old.
    pub dilution_pct: Rate,
}

/// Extra shares granted to a protected preferred position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiDilutionIssue {
    pub shareholder: String,
    pub share_class: ShareClass,
    pub method: AntiDilutionMethod,
    pub original_price: Money,
    pub adjusted_price: Money,
    pub additional_shares: Shares,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkCheck {
    pub stage: CompanyStage,
    pub low: Rate,
    pub high: Rate,
    pub within_range: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResult {
    pub share_class: ShareClass,
    pub price_per_share: Money,
    pub post_money_valuation: Money,
    pub pre_round_fully_diluted: Shares,
    pub pool_shares_added: Shares,
    pub new_shares_issued: Shares,
    pub anti_dilution_shares: Shares,
    pub post_round_fully_diluted: Shares,
    pub investor_ownership_pct: Rate,
    /// Dilution of the pre-round holders as a group: 1 - before / after.
    pub dilution_pct: Rate,
    pub holders: Vec<HolderDilution>,
    pub anti_dilution: Vec<AntiDilutionIssue>,
    pub benchmark: BenchmarkCheck,
    pub pro_forma: CapTable,
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

/// Model one priced round against a cap table, returning the result and
/// any informational warnings.
pub fn simulate_round_core(input: &RoundInput) -> ValuationResult<(RoundResult, Vec<String>)> {
    let mut warnings: Vec<String> = Vec::new();
    let table = &input.cap_table;

    // --- Validation ---
    input.assumptions.validate()?;
    if table.is_empty() {
        return Err(ValuationError::InsufficientData(
            "Cap table has no entries".into(),
        ));
    }
    table.validate()?;
    if input.pre_money_valuation <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "pre_money_valuation".into(),
            reason: "Pre-money valuation must be positive".into(),
        });
    }
    if input.investment_amount <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "investment_amount".into(),
            reason: "Investment amount must be positive".into(),
        });
    }
    if input.option_pool_increase < Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "option_pool_increase".into(),
            reason: "Option pool increase cannot be negative".into(),
        });
    }
    if input.terms.investor.trim().is_empty() {
        return Err(ValuationError::InvalidInput {
            field: "terms.investor".into(),
            reason: "Investor name is required".into(),
        });
    }

    let share_class = match input.terms.share_class {
        Some(c) => c,
        None => match table.latest_series() {
            None => ShareClass::SeriesA,
            Some(latest) => latest.next_series().ok_or_else(|| ValuationError::InvalidInput {
                field: "terms.share_class".into(),
                reason: format!("No series follows {latest}; set share_class explicitly"),
            })?,
        },
    };
    let round_stage = input.terms.round_stage.unwrap_or_else(|| table.stage.next());

    // --- Price ---
    let fraction = input.assumptions.option_exercise_fraction;
    let fd_before = table.fully_diluted_shares(fraction);
    if fd_before <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "cap_table.entries".into(),
            reason: "Cap table has no outstanding shares to price the round against".into(),
        });
    }
    // Pool shares are options and count at the exercise fraction.
    let pool_weight = input.option_pool_increase * fraction;
    let priced_base = fd_before + pool_weight;
    let price_per_share = input.pre_money_valuation / priced_base;
    let new_shares = input.investment_amount / price_per_share;

    // --- Anti-dilution on protected preferred ---
    let mut issues: Vec<AntiDilutionIssue> = Vec::new();
    for e in &table.entries {
        let rights = e.rights.sanitized();
        if !e.share_class.has_preference()
            || rights.anti_dilution == AntiDilutionMethod::None
            || e.price_per_share <= price_per_share
            || e.shares.is_zero()
        {
            continue;
        }
        let adj = adjust(
            e.price_per_share,
            price_per_share,
            e.shares,
            Some(fd_before),
            rights.anti_dilution,
        )?;
        if adj.triggered && adj.additional_shares > Decimal::ZERO {
            issues.push(AntiDilutionIssue {
                shareholder: e.shareholder.clone(),
                share_class: e.share_class,
                method: adj.method,
                original_price: e.price_per_share,
                adjusted_price: adj.adjusted_price,
                additional_shares: adj.additional_shares,
            });
        }
    }
    let anti_dilution_shares: Shares = issues.iter().map(|i| i.additional_shares).sum();
    if !issues.is_empty() {
        warnings.push(format!(
            "Down round: {} protected position(s) receive {} additional shares",
            issues.len(),
            anti_dilution_shares.round_dp(2)
        ));
    }

    let fd_after = priced_base + new_shares + anti_dilution_shares;

    // --- Per-holder ownership ---
    let mut extra_by_holder: BTreeMap<&str, Shares> = BTreeMap::new();
    for i in &issues {
        *extra_by_holder.entry(i.shareholder.as_str()).or_default() += i.additional_shares;
    }

    let mut holders: Vec<HolderDilution> = Vec::new();
    for line in table.ownership_snapshot(None, fraction) {
        let mut after = line.fully_diluted_shares
            + extra_by_holder
                .get(line.shareholder.as_str())
                .copied()
                .unwrap_or_default();
        if line.shareholder == OPTION_POOL_HOLDER {
            after += pool_weight;
        }
        let before = line.fully_diluted_shares;
        holders.push(holder_row(line.shareholder, before, after, fd_before, fd_after));
    }
    if pool_weight > Decimal::ZERO && !table.contains_holder(OPTION_POOL_HOLDER) {
        holders.push(holder_row(
            OPTION_POOL_HOLDER.to_string(),
            Decimal::ZERO,
            pool_weight,
            fd_before,
            fd_after,
        ));
    }
    match holders
        .iter_mut()
        .find(|h| h.shareholder == input.terms.investor)
    {
        Some(existing) => {
            existing.fully_diluted_after += new_shares;
            existing.new_pct = existing.fully_diluted_after / fd_after;
            existing.dilution_pct = relative_dilution(existing.old_pct, existing.new_pct);
        }
        None => holders.push(holder_row(
            input.terms.investor.clone(),
            Decimal::ZERO,
            new_shares,
            fd_before,
            fd_after,
        )),
    }

    let investor_ownership_pct = new_shares / fd_after;
    let dilution_pct = Decimal::ONE - fd_before / fd_after;

    let bench = benchmark_for(round_stage);
    let within_range = dilution_pct >= bench.low && dilution_pct <= bench.high;
    if !within_range {
        warnings.push(format!(
            "Round dilution {:.1}% is outside the {} benchmark range {:.0}%-{:.0}%",
            dilution_pct * dec!(100),
            round_stage,
            bench.low * dec!(100),
            bench.high * dec!(100)
        ));
    }

    // --- Pro-forma cap table ---
    let mut entries = table.entries.clone();
    for i in &issues {
        let rights = table
            .entries
            .iter()
            .find(|e| e.shareholder == i.shareholder && e.share_class == i.share_class)
            .map(|e| e.rights.clone())
            .unwrap_or_default();
        let mut entry = ShareholdingEntry::new(
            i.shareholder.clone(),
            i.share_class,
            i.additional_shares,
            Decimal::ZERO,
        )
        .with_rights(rights);
        entry.investment_date = input.terms.investment_date;
        entry
            .metadata
            .insert("anti_dilution_adjustment".into(), serde_json::json!(true));
        entries.push(entry);
    }
    if input.option_pool_increase > Decimal::ZERO {
        let mut pool = ShareholdingEntry::new(
            OPTION_POOL_HOLDER,
            ShareClass::Options,
            input.option_pool_increase,
            price_per_share,
        );
        pool.investment_date = input.terms.investment_date;
        entries.push(pool);
    }
    let mut investor = ShareholdingEntry::new(
        input.terms.investor.clone(),
        share_class,
        new_shares,
        price_per_share,
    )
    .with_rights(input.terms.rights.clone());
    investor.investment_date = input.terms.investment_date;
    entries.push(investor);

    let pro_forma = CapTable {
        company_name: table.company_name.clone(),
        entries,
        authorized_shares: table.authorized_shares,
        stage: round_stage,
    };
    if let Some(authorized) = pro_forma.authorized_shares {
        if pro_forma.total_issued_shares() > authorized {
            warnings.push("Pro-forma issued shares exceed authorized shares".into());
        }
    }

    for w in &warnings {
        warn!(target: "exit_valuation::dilution", "{w}");
    }
    debug!(
        price_per_share = %price_per_share,
        new_shares = %new_shares,
        dilution_pct = %dilution_pct,
        anti_dilution_positions = issues.len(),
        "simulated round"
    );

    let result = RoundResult {
        share_class,
        price_per_share,
        post_money_valuation: input.pre_money_valuation + input.investment_amount,
        pre_round_fully_diluted: fd_before,
        pool_shares_added: input.option_pool_increase,
        new_shares_issued: new_shares,
        anti_dilution_shares,
        post_round_fully_diluted: fd_after,
        investor_ownership_pct,
        dilution_pct,
        holders,
        anti_dilution: issues,
        benchmark: BenchmarkCheck {
            stage: round_stage,
            low: bench.low,
            high: bench.high,
            within_range,
        },
        pro_forma,
    };
    Ok((result, warnings))
}

fn holder_row(
    shareholder: String,
    before: Shares,
    after: Shares,
    fd_before: Shares,
    fd_after: Shares,
) -> HolderDilution {
    let old_pct = before / fd_before;
    let new_pct = after / fd_after;
    HolderDilution {
        shareholder,
        fully_diluted_before: before,
        fully_diluted_after: after,
        old_pct,
        new_pct,
        dilution_pct: relative_dilution(old_pct, new_pct),
    }
}

fn relative_dilution(old_pct: Rate, new_pct: Rate) -> Rate {
    if old_pct.is_zero() {
        Decimal::ZERO
    } else {
        (old_pct - new_pct) / old_pct
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Model a priced round: price per share, new shares, per-holder dilution,
/// benchmark comparison and the pro-forma cap table.
///
/// The round is priced on the fully-diluted count (options at the assumed
/// exercise fraction) plus any pool top-up, so the top-up dilutes pre-round
/// holders and not the incoming investor.
pub fn simulate_round(input: &RoundInput) -> ValuationResult<ComputationOutput<RoundResult>> {
    let start = Instant::now();
    let (result, warnings) = simulate_round_core(input)?;
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Priced Round with Pre-Money Option Pool Top-Up",
        &serde_json::json!({
            "investment_amount": input.investment_amount.to_string(),
            "pre_money_valuation": input.pre_money_valuation.to_string(),
            "option_pool_increase": input.option_pool_increase.to_string(),
            "option_exercise_fraction": input.assumptions.option_exercise_fraction.to_string(),
            "investor": input.terms.investor,
        }),
        warnings,
        elapsed,
        result,
    ))
}
