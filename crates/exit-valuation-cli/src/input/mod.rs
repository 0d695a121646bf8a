pub mod config;
pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;
use serde_json::Value;

use exit_valuation_core::EngineAssumptions;

/// Read the JSON payload from `--input` or, failing that, piped stdin.
pub fn read_payload(path: Option<&str>) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    match path {
        Some(p) => Ok(Some(file::read_json_value(p)?)),
        None => stdin::read_stdin(),
    }
}

/// Deserialise a payload, replacing its `assumptions` block when a
/// `--config` file was given.
pub fn decode<T: DeserializeOwned>(
    mut value: Value,
    assumptions: Option<&EngineAssumptions>,
) -> Result<T, Box<dyn std::error::Error>> {
    if let (Some(a), Value::Object(map)) = (assumptions, &mut value) {
        map.insert("assumptions".into(), serde_json::to_value(a)?);
    }
    Ok(serde_json::from_value(value)?)
}
