use clap::Args;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use exit_valuation_core::dilution::{self, AntiDilutionInput, RoundInput};

use super::RunContext;
use crate::input;

/// Arguments for an anti-dilution adjustment
#[derive(Args)]
pub struct AntiDilutionArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Price originally paid per protected share
    #[arg(long)]
    pub original_price: Option<Decimal>,

    /// Price per share of the new round
    #[arg(long)]
    pub new_price: Option<Decimal>,

    /// Number of protected shares
    #[arg(long)]
    pub shares: Option<Decimal>,

    /// Broad-based shares outstanding (weighted average only)
    #[arg(long)]
    pub outstanding: Option<Decimal>,

    /// none, full_ratchet or weighted_average
    #[arg(long, default_value = "weighted_average")]
    pub method: String,
}

pub fn run_anti_dilution(args: AntiDilutionArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let payload = match input::read_payload(args.input.as_deref())? {
        Some(v) => v,
        None => {
            let original = args
                .original_price
                .ok_or("--original-price is required (or provide --input)")?;
            let new = args
                .new_price
                .ok_or("--new-price is required (or provide --input)")?;
            let shares = args.shares.ok_or("--shares is required (or provide --input)")?;
            json!({
                "original_price": original.to_string(),
                "new_price": new.to_string(),
                "shares_affected": shares.to_string(),
                "total_shares_outstanding": args.outstanding.map(|d| d.to_string()),
                "method": args.method,
            })
        }
    };
    let adjustment_input: AntiDilutionInput = serde_json::from_value(payload)?;
    let result = dilution::calculate_anti_dilution(&adjustment_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for a financing round simulation
#[derive(Args)]
pub struct RoundArgs {
    /// Path to JSON input file (cap table, amount, pre-money, terms)
    #[arg(long)]
    pub input: Option<String>,

    /// Investment amount, overriding the one in the input
    #[arg(long)]
    pub investment: Option<Decimal>,

    /// Pre-money valuation, overriding the one in the input
    #[arg(long)]
    pub pre_money: Option<Decimal>,

    /// Omit the pro-forma cap table from the output
    #[arg(long)]
    pub summary: bool,
}

pub fn run_round(args: RoundArgs, ctx: &RunContext) -> Result<Value, Box<dyn std::error::Error>> {
    let payload = input::read_payload(args.input.as_deref())?
        .ok_or("--input <file.json> or stdin required for a round simulation")?;
    let mut round_input: RoundInput = input::decode(payload, ctx.assumptions.as_ref())?;
    if let Some(amount) = args.investment {
        round_input.investment_amount = amount;
    }
    if let Some(pre) = args.pre_money {
        round_input.pre_money_valuation = pre;
    }

    let result = dilution::simulate_round(&round_input)?;
    let mut value = serde_json::to_value(result)?;
    if args.summary {
        if let Some(Value::Object(r)) = value.get_mut("result") {
            r.remove("pro_forma");
        }
    }
    Ok(value)
}
