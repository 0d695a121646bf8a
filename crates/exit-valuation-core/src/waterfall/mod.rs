pub mod engine;
pub mod report;

pub use engine::{
    distribute_proceeds, run_waterfall, waterfall_for_exit, ClassDecision, DistributionResult,
    ExitTerms, WaterfallInput, WaterfallOutput, TOTAL_ROW,
};
pub use report::DistributionResponse;
