pub mod aggregator;
pub mod fund_impact;
#[cfg(feature = "monte_carlo")]
pub mod simulation;

pub use aggregator::{
    aggregate_returns, aggregate_returns_core, ownership_proceeds, AggregatedValuation,
    AggregationInput, FutureRound, PositionBasis, ScenarioReturn,
};
pub use fund_impact::{calculate_fund_impact, FundImpactInput, FundImpactOutput, PositionOutcome};
#[cfg(feature = "monte_carlo")]
pub use simulation::{simulate_returns, ReturnSimulationInput, ReturnSimulationOutput};
