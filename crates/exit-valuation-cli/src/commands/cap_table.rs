use clap::Args;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use exit_valuation_core::cap_table::vesting::{calculate_vesting, VestingInput};
use exit_valuation_core::cap_table::{snapshot_ownership, OwnershipInput};

use super::RunContext;
use crate::input;

/// Arguments for a vesting calculation
#[derive(Args)]
pub struct VestingArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Shares in the grant
    #[arg(long)]
    pub total_shares: Option<Decimal>,

    /// Cliff length in months
    #[arg(long, default_value_t = 12)]
    pub cliff_months: u32,

    /// Total vesting period in months
    #[arg(long, default_value_t = 48)]
    pub vesting_months: u32,

    /// Vesting start date (YYYY-MM-DD)
    #[arg(long)]
    pub start_date: Option<String>,

    /// Date to measure vesting at (YYYY-MM-DD)
    #[arg(long)]
    pub as_of: Option<String>,

    /// Everything vests on a change of control
    #[arg(long)]
    pub accelerate: bool,
}

pub fn run_vesting(args: VestingArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let payload = match input::read_payload(args.input.as_deref())? {
        Some(v) => v,
        None => {
            let total = args
                .total_shares
                .ok_or("--total-shares is required (or provide --input)")?;
            let start = args
                .start_date
                .ok_or("--start-date is required (or provide --input)")?;
            let as_of = args.as_of.ok_or("--as-of is required (or provide --input)")?;
            json!({
                "schedule": {
                    "total_shares": total.to_string(),
                    "cliff_months": args.cliff_months,
                    "vesting_months": args.vesting_months,
                    "start_date": start,
                    "accelerate_on_change_of_control": args.accelerate,
                },
                "as_of": as_of,
            })
        }
    };
    let vesting_input: VestingInput = serde_json::from_value(payload)?;
    let result = calculate_vesting(&vesting_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for an ownership snapshot
#[derive(Args)]
pub struct OwnershipArgs {
    /// Path to JSON input file (cap table, optional as_of)
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_ownership(args: OwnershipArgs, ctx: &RunContext) -> Result<Value, Box<dyn std::error::Error>> {
    let payload = input::read_payload(args.input.as_deref())?
        .ok_or("--input <file.json> or stdin required for an ownership snapshot")?;
    let ownership_input: OwnershipInput = input::decode(payload, ctx.assumptions.as_ref())?;
    let result = snapshot_ownership(&ownership_input)?;
    Ok(serde_json::to_value(result)?)
}
