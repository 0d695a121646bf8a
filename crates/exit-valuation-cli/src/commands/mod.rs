pub mod cap_table;
pub mod dilution;
pub mod returns;
pub mod scenarios;
pub mod waterfall;

use exit_valuation_core::EngineAssumptions;

/// Settings shared by every subcommand.
#[derive(Debug, Default)]
pub struct RunContext {
    /// Assumptions from `--config`, replacing any embedded in the input.
    pub assumptions: Option<EngineAssumptions>,
}
