pub mod generator;
#[cfg(feature = "monte_carlo")]
pub mod sampling;
pub mod templates;

pub use generator::{
    generate_exit_scenarios, generate_scenarios_core, CompanyFactors, ExitScenario,
    ScenarioGeneratorInput, ScenarioSet,
};
pub use templates::ExitType;
