pub mod cap_table;
pub mod config;
pub mod dilution;
pub mod error;
pub mod time_value;
pub mod types;

#[cfg(feature = "waterfall")]
pub mod waterfall;

#[cfg(feature = "scenarios")]
pub mod scenarios;

#[cfg(feature = "returns")]
pub mod returns;

pub use config::EngineAssumptions;
pub use error::ValuationError;
pub use types::*;

/// Standard result type for all exit-valuation operations
pub type ValuationResult<T> = Result<T, ValuationError>;
