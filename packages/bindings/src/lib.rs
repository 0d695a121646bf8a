use napi::{Result as NapiResult, Status};
use napi_derive::napi;
use serde::de::DeserializeOwned;
use serde::Serialize;

use exit_valuation_core::{ValuationError, ValuationResult};

/// Client errors keep their message; invariant and internal failures are
/// reported opaquely.
fn to_napi_error(e: ValuationError) -> napi::Error {
    let status = if e.is_client_error() {
        Status::InvalidArg
    } else {
        Status::GenericFailure
    };
    napi::Error::new(status, e.public_message())
}

fn parse_error(e: serde_json::Error) -> napi::Error {
    napi::Error::new(Status::InvalidArg, format!("Invalid input JSON: {e}"))
}

/// JSON in, engine call, JSON out.
fn call<I, O>(input_json: &str, op: impl FnOnce(&I) -> ValuationResult<O>) -> NapiResult<String>
where
    I: DeserializeOwned,
    O: Serialize,
{
    let input: I = serde_json::from_str(input_json).map_err(parse_error)?;
    let output = op(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(|e| napi::Error::from_reason(e.to_string()))
}

// ---------------------------------------------------------------------------
// Cap table
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_vesting(input_json: String) -> NapiResult<String> {
    call(&input_json, exit_valuation_core::cap_table::vesting::calculate_vesting)
}

#[napi]
pub fn ownership_snapshot(input_json: String) -> NapiResult<String> {
    call(&input_json, exit_valuation_core::cap_table::snapshot_ownership)
}

// ---------------------------------------------------------------------------
// Dilution
// ---------------------------------------------------------------------------

#[napi]
pub fn anti_dilution(input_json: String) -> NapiResult<String> {
    call(&input_json, exit_valuation_core::dilution::calculate_anti_dilution)
}

#[napi]
pub fn simulate_round(input_json: String) -> NapiResult<String> {
    call(&input_json, exit_valuation_core::dilution::simulate_round)
}

// ---------------------------------------------------------------------------
// Waterfall
// ---------------------------------------------------------------------------

/// Full waterfall breakdown in the output envelope.
#[napi]
pub fn distribute_proceeds(input_json: String) -> NapiResult<String> {
    call(&input_json, exit_valuation_core::waterfall::distribute_proceeds)
}

/// Distribution endpoint shape: rows, total and the sum verification flag.
#[napi]
pub fn distribution_response(input_json: String) -> NapiResult<String> {
    use exit_valuation_core::waterfall::{run_waterfall, DistributionResponse, WaterfallInput};

    call(&input_json, |input: &WaterfallInput| {
        let (output, _) = run_waterfall(input)?;
        Ok(DistributionResponse::from_output(
            &output,
            input.assumptions.rounding_tolerance,
        ))
    })
}

// ---------------------------------------------------------------------------
// Scenarios and returns
// ---------------------------------------------------------------------------

#[napi]
pub fn generate_exit_scenarios(input_json: String) -> NapiResult<String> {
    call(&input_json, exit_valuation_core::scenarios::generate_exit_scenarios)
}

#[napi]
pub fn aggregate_returns(input_json: String) -> NapiResult<String> {
    call(&input_json, exit_valuation_core::returns::aggregate_returns)
}

#[napi]
pub fn fund_impact(input_json: String) -> NapiResult<String> {
    call(&input_json, exit_valuation_core::returns::calculate_fund_impact)
}

#[napi]
pub fn simulate_returns(input_json: String) -> NapiResult<String> {
    call(&input_json, exit_valuation_core::returns::simulate_returns)
}
