use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use exit_valuation_core::waterfall::{self, DistributionResponse, WaterfallInput};

use super::RunContext;
use crate::input;

/// Arguments for the liquidation waterfall
#[derive(Args)]
pub struct WaterfallArgs {
    /// Path to JSON input file (exit value, cap table, terms)
    #[arg(long)]
    pub input: Option<String>,

    /// Exit value, overriding the one in the input
    #[arg(long)]
    pub exit_value: Option<Decimal>,

    /// Escrow holdback fraction, overriding the one in the input
    #[arg(long)]
    pub escrow: Option<Decimal>,

    /// Down-round price for anti-dilution protected classes
    #[arg(long)]
    pub ratchet_price: Option<Decimal>,

    /// Print the verification response instead of the full breakdown
    #[arg(long)]
    pub verify: bool,
}

pub fn run_waterfall(args: WaterfallArgs, ctx: &RunContext) -> Result<Value, Box<dyn std::error::Error>> {
    let payload = input::read_payload(args.input.as_deref())?
        .ok_or("--input <file.json> or stdin required for the waterfall")?;
    let mut waterfall_input: WaterfallInput = input::decode(payload, ctx.assumptions.as_ref())?;

    if let Some(exit) = args.exit_value {
        waterfall_input.exit_value = exit;
    }
    if let Some(escrow) = args.escrow {
        waterfall_input.escrow_fraction = escrow;
    }
    if args.ratchet_price.is_some() {
        waterfall_input.ratchet_price = args.ratchet_price;
    }

    let result = waterfall::distribute_proceeds(&waterfall_input)?;
    if args.verify {
        let response = DistributionResponse::from_output(
            &result.result,
            waterfall_input.assumptions.rounding_tolerance,
        );
        return Ok(serde_json::to_value(response)?);
    }
    Ok(serde_json::to_value(result)?)
}
