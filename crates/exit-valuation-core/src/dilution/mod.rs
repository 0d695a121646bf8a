pub mod anti_dilution;
pub mod round;

pub use anti_dilution::{
    adjust, adjust_named, calculate_anti_dilution, AntiDilutionAdjustment, AntiDilutionInput,
};
pub use round::{simulate_round, simulate_round_core, RoundInput, RoundResult, RoundTerms};
