use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::types::{with_metadata, ComputationOutput, Shares};
use crate::ValuationResult;

/// Time-based vesting for a grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VestingSchedule {
    pub total_shares: Shares,
    pub cliff_months: u32,
    pub vesting_months: u32,
    pub start_date: NaiveDate,
    /// Single-trigger acceleration: everything vests on a change of control.
    #[serde(default)]
    pub accelerate_on_change_of_control: bool,
}

impl VestingSchedule {
    /// Vested share count as of `as_of`. See [`vested_shares`].
    pub fn vested_as_of(&self, as_of: NaiveDate) -> Shares {
        vested_shares(self, as_of)
    }

    /// Shares counted in a change-of-control event on `as_of`.
    pub fn vested_on_exit(&self, as_of: NaiveDate) -> Shares {
        if self.accelerate_on_change_of_control {
            self.total_shares.max(Decimal::ZERO)
        } else {
            vested_shares(self, as_of)
        }
    }

    pub fn cliff_date(&self) -> Option<NaiveDate> {
        add_months(self.start_date, self.effective_cliff())
    }

    pub fn full_vest_date(&self) -> Option<NaiveDate> {
        add_months(self.start_date, self.vesting_months)
    }

    fn effective_cliff(&self) -> u32 {
        self.cliff_months.min(self.vesting_months)
    }
}

/// Vested shares under linear monthly vesting with a cliff.
///
/// Months are counted on the calendar (start + N months) and the partial
/// month is pro-rated by days, so vesting is continuous between anniversaries
/// and exact on them. Malformed schedules are clamped: a cliff longer than
/// the vesting period is treated as the vesting period, a zero-length period
/// vests everything at the start date, and negative totals vest nothing.
pub fn vested_shares(schedule: &VestingSchedule, as_of: NaiveDate) -> Shares {
    let total = schedule.total_shares.max(Decimal::ZERO);
    if as_of < schedule.start_date {
        return Decimal::ZERO;
    }
    if schedule.vesting_months == 0 {
        return total;
    }

    match schedule.cliff_date() {
        Some(cliff) if as_of < cliff => return Decimal::ZERO,
        Some(_) => {}
        // Cliff beyond the representable calendar: nothing has vested yet.
        None => return Decimal::ZERO,
    }
    if let Some(full) = schedule.full_vest_date() {
        if as_of >= full {
            return total;
        }
    }

    let elapsed = elapsed_months(schedule.start_date, as_of);
    let months = Decimal::from(schedule.vesting_months);
    // cliff tranche (total * cliff / months) plus total / months per month
    // elapsed beyond the cliff, which reduces to total * elapsed / months
    (total * elapsed / months).min(total)
}

/// Fractional calendar months between two dates (zero if `to <= from`).
pub fn elapsed_months(from: NaiveDate, to: NaiveDate) -> Decimal {
    if to <= from {
        return Decimal::ZERO;
    }

    let raw = (to.year() - from.year()) * 12 + (to.month() as i32 - from.month() as i32);
    let mut whole = raw.max(0) as u32;
    while whole > 0 {
        match add_months(from, whole) {
            Some(anchor) if anchor <= to => break,
            _ => whole -= 1,
        }
    }

    let anchor = add_months(from, whole).unwrap_or(from);
    let next = match add_months(from, whole + 1) {
        Some(d) => d,
        None => return Decimal::from(whole),
    };
    let span = (next - anchor).num_days();
    let into = (to - anchor).num_days();
    if span <= 0 {
        return Decimal::from(whole);
    }
    Decimal::from(whole) + Decimal::from(into) / Decimal::from(span)
}

fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

// ---------------------------------------------------------------------------
// Vesting report
// ---------------------------------------------------------------------------

/// Input for a standalone vesting calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VestingInput {
    pub schedule: VestingSchedule,
    pub as_of: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VestingOutput {
    pub vested_shares: Shares,
    pub unvested_shares: Shares,
    pub vested_pct: Decimal,
    pub elapsed_months: Decimal,
    pub cliff_reached: bool,
    pub cliff_date: Option<NaiveDate>,
    pub full_vest_date: Option<NaiveDate>,
    /// Shares that would count in a change-of-control exit today.
    pub vested_on_exit: Shares,
}

/// Report vesting progress for one schedule as of a date.
pub fn calculate_vesting(input: &VestingInput) -> ValuationResult<ComputationOutput<VestingOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let s = &input.schedule;

    if s.total_shares < Decimal::ZERO {
        warnings.push("Negative total_shares clamped to zero".into());
    }
    if s.cliff_months > s.vesting_months {
        warnings.push(format!(
            "cliff_months ({}) exceeds vesting_months ({}); cliff clamped to vesting period",
            s.cliff_months, s.vesting_months
        ));
    }
    if input.as_of < s.start_date {
        warnings.push("as_of precedes the vesting start date".into());
    }

    let total = s.total_shares.max(Decimal::ZERO);
    let vested = vested_shares(s, input.as_of);
    let cliff_date = s.cliff_date();
    let output = VestingOutput {
        vested_shares: vested,
        unvested_shares: total - vested,
        vested_pct: if total.is_zero() {
            Decimal::ZERO
        } else {
            vested / total
        },
        elapsed_months: elapsed_months(s.start_date, input.as_of),
        cliff_reached: cliff_date.map(|d| input.as_of >= d).unwrap_or(false),
        cliff_date,
        full_vest_date: s.full_vest_date(),
        vested_on_exit: s.vested_on_exit(input.as_of),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Linear Vesting with Cliff (calendar months, day-prorated)",
        &serde_json::json!({
            "total_shares": s.total_shares.to_string(),
            "cliff_months": s.cliff_months,
            "vesting_months": s.vesting_months,
            "start_date": s.start_date.to_string(),
            "as_of": input.as_of.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}
