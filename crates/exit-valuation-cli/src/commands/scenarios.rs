use clap::Args;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use exit_valuation_core::scenarios::{self, ScenarioGeneratorInput};

use super::RunContext;
use crate::input;

/// Arguments for exit scenario generation
#[derive(Args)]
pub struct ScenarioArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Rounds completed so far, comma-separated (e.g. "seed,A")
    #[arg(long, default_value = "")]
    pub funding_path: String,

    /// Current company valuation
    #[arg(long)]
    pub valuation: Option<Decimal>,

    /// Company stage (pre_seed, seed, series_a, series_b, series_c, growth, late_stage)
    #[arg(long)]
    pub stage: Option<String>,

    /// Year-on-year revenue growth (1.0 = 100%)
    #[arg(long)]
    pub growth: Option<Decimal>,

    /// Months of cash runway
    #[arg(long)]
    pub runway_months: Option<Decimal>,

    /// Trailing twelve-month revenue
    #[arg(long)]
    pub revenue: Option<Decimal>,
}

pub fn run_scenarios(args: ScenarioArgs, ctx: &RunContext) -> Result<Value, Box<dyn std::error::Error>> {
    let payload = match input::read_payload(args.input.as_deref())? {
        Some(v) => v,
        None => {
            let valuation = args
                .valuation
                .ok_or("--valuation is required (or provide --input)")?;
            let stage = args
                .stage
                .ok_or("--stage is required (or provide --input)")?;
            json!({
                "funding_path": args.funding_path,
                "current_valuation": valuation.to_string(),
                "company_stage": stage,
                "factors": {
                    "growth_rate": args.growth.map(|d| d.to_string()),
                    "runway_months": args.runway_months.map(|d| d.to_string()),
                    "trailing_revenue": args.revenue.map(|d| d.to_string()),
                },
            })
        }
    };
    let generator_input: ScenarioGeneratorInput = input::decode(payload, ctx.assumptions.as_ref())?;
    let result = scenarios::generate_exit_scenarios(&generator_input)?;
    Ok(serde_json::to_value(result)?)
}
