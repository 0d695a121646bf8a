use std::fs;
use std::path::Path;

use exit_valuation_core::EngineAssumptions;

/// Load engine assumptions from a `.json`, `.yaml` or `.yml` file. Missing
/// fields keep their defaults.
pub fn load_assumptions(path: &str) -> Result<EngineAssumptions, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config '{}': {}", path, e))?;
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let assumptions: EngineAssumptions = match extension.as_deref() {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config '{}': {}", path, e))?,
        Some("json") => serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse config '{}': {}", path, e))?,
        _ => return Err(format!("Unsupported config format '{}' (use .json, .yaml or .yml)", path).into()),
    };
    assumptions.validate()?;
    Ok(assumptions)
}
