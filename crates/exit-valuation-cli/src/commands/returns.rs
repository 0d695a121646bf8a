use clap::Args;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use exit_valuation_core::returns::{
    self, AggregationInput, FundImpactInput, ReturnSimulationInput,
};

use super::RunContext;
use crate::input;

/// Arguments for probability-weighted return aggregation
#[derive(Args)]
pub struct AggregateArgs {
    /// Path to JSON input file (scenarios, position, rates)
    #[arg(long)]
    pub input: Option<String>,

    /// Discount rate, overriding the one in the input
    #[arg(long, allow_hyphen_values = true)]
    pub discount_rate: Option<Decimal>,

    /// Discount for lack of marketability, overriding the one in the input
    #[arg(long)]
    pub dlom: Option<Decimal>,

    /// Also report fund impact for a fund of this size
    #[arg(long)]
    pub fund_size: Option<Decimal>,
}

pub fn run_aggregate(args: AggregateArgs, ctx: &RunContext) -> Result<Value, Box<dyn std::error::Error>> {
    let payload = input::read_payload(args.input.as_deref())?
        .ok_or("--input <file.json> or stdin required for aggregation")?;
    let mut aggregation_input: AggregationInput = input::decode(payload, ctx.assumptions.as_ref())?;
    if let Some(rate) = args.discount_rate {
        aggregation_input.discount_rate = rate;
    }
    if let Some(dlom) = args.dlom {
        aggregation_input.dlom = dlom;
    }

    let valuation = returns::aggregate_returns(&aggregation_input)?;
    match args.fund_size {
        None => Ok(serde_json::to_value(valuation)?),
        Some(fund_size) => {
            let impact = returns::calculate_fund_impact(&FundImpactInput::from_valuation(
                fund_size,
                &valuation.result,
                aggregation_input.assumptions.clone(),
            ))?;
            Ok(json!({
                "valuation": serde_json::to_value(valuation)?,
                "fund_impact": serde_json::to_value(impact)?,
            }))
        }
    }
}

/// Arguments for a standalone fund impact calculation
#[derive(Args)]
pub struct FundImpactArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    #[arg(long)]
    pub fund_size: Option<Decimal>,

    #[arg(long)]
    pub investment: Option<Decimal>,

    /// Probability-weighted proceeds expected from the position
    #[arg(long)]
    pub expected_proceeds: Option<Decimal>,
}

pub fn run_fund_impact(args: FundImpactArgs, ctx: &RunContext) -> Result<Value, Box<dyn std::error::Error>> {
    let payload = match input::read_payload(args.input.as_deref())? {
        Some(v) => v,
        None => {
            let fund_size = args
                .fund_size
                .ok_or("--fund-size is required (or provide --input)")?;
            let investment = args
                .investment
                .ok_or("--investment is required (or provide --input)")?;
            let proceeds = args
                .expected_proceeds
                .ok_or("--expected-proceeds is required (or provide --input)")?;
            json!({
                "fund_size": fund_size.to_string(),
                "investment_amount": investment.to_string(),
                "expected_proceeds": proceeds.to_string(),
            })
        }
    };
    let impact_input: FundImpactInput = input::decode(payload, ctx.assumptions.as_ref())?;
    let result = returns::calculate_fund_impact(&impact_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for a Monte Carlo simulation of position returns
#[derive(Args)]
pub struct MonteCarloArgs {
    /// Path to JSON input file (scenarios, position, seed)
    #[arg(long)]
    pub input: Option<String>,

    /// Random seed, overriding the one in the input
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of simulated exits, overriding the one in the input
    #[arg(long)]
    pub simulations: Option<u32>,
}

pub fn run_monte_carlo(args: MonteCarloArgs, ctx: &RunContext) -> Result<Value, Box<dyn std::error::Error>> {
    let payload = input::read_payload(args.input.as_deref())?
        .ok_or("--input <file.json> or stdin required for simulation")?;
    let mut simulation_input: ReturnSimulationInput = input::decode(payload, ctx.assumptions.as_ref())?;
    if let Some(seed) = args.seed {
        simulation_input.seed = seed;
    }
    if let Some(n) = args.simulations {
        simulation_input.num_simulations = n;
    }
    let result = returns::simulate_returns(&simulation_input)?;
    Ok(serde_json::to_value(result)?)
}
