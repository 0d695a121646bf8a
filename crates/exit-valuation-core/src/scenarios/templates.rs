//! Literal tables behind the scenario matrix. The generator only scales,
//! filters and reweights what is defined here.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cap_table::CompanyStage;
use crate::types::{Money, Multiple, Rate, Years};

// ---------------------------------------------------------------------------
// Exit types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitType {
    Liquidation,
    Acquihire,
    StrategicAcquisition,
    PeBuyout,
    RollUp,
    IpoMicro,
    IpoMid,
    IpoLarge,
    IpoMega,
}

impl ExitType {
    pub const ALL: [ExitType; 9] = [
        ExitType::Liquidation,
        ExitType::Acquihire,
        ExitType::StrategicAcquisition,
        ExitType::PeBuyout,
        ExitType::RollUp,
        ExitType::IpoMicro,
        ExitType::IpoMid,
        ExitType::IpoLarge,
        ExitType::IpoMega,
    ];

    pub fn is_ipo(&self) -> bool {
        matches!(
            self,
            ExitType::IpoMicro | ExitType::IpoMid | ExitType::IpoLarge | ExitType::IpoMega
        )
    }

    /// Sale to a strategic or financial buyer.
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            ExitType::StrategicAcquisition | ExitType::PeBuyout | ExitType::RollUp
        )
    }

    /// Outcomes where price protection is assumed to bite.
    pub fn is_down_round(&self) -> bool {
        matches!(self, ExitType::Liquidation | ExitType::Acquihire)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExitType::Liquidation => "Liquidation",
            ExitType::Acquihire => "Acquihire",
            ExitType::StrategicAcquisition => "Strategic Acquisition",
            ExitType::PeBuyout => "PE Buyout",
            ExitType::RollUp => "Roll-Up",
            ExitType::IpoMicro => "Micro-Cap IPO",
            ExitType::IpoMid => "Mid-Cap IPO",
            ExitType::IpoLarge => "Large-Cap IPO",
            ExitType::IpoMega => "Mega-Cap IPO",
        }
    }
}

impl fmt::Display for ExitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Exit value range (as multiples of the path's base valuation), baseline
/// probability and years to exit for one exit type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitProfile {
    pub exit_type: ExitType,
    pub min_multiple: Multiple,
    pub max_multiple: Multiple,
    pub base_probability: Rate,
    pub base_years: Years,
}

pub const EXIT_PROFILES: [ExitProfile; 9] = [
    ExitProfile {
        exit_type: ExitType::Liquidation,
        min_multiple: dec!(0),
        max_multiple: dec!(0.3),
        base_probability: dec!(0.20),
        base_years: dec!(2),
    },
    ExitProfile {
        exit_type: ExitType::Acquihire,
        min_multiple: dec!(0.2),
        max_multiple: dec!(0.8),
        base_probability: dec!(0.15),
        base_years: dec!(2.5),
    },
    ExitProfile {
        exit_type: ExitType::StrategicAcquisition,
        min_multiple: dec!(1),
        max_multiple: dec!(4),
        base_probability: dec!(0.22),
        base_years: dec!(4),
    },
    ExitProfile {
        exit_type: ExitType::PeBuyout,
        min_multiple: dec!(1.5),
        max_multiple: dec!(3.5),
        base_probability: dec!(0.10),
        base_years: dec!(5),
    },
    ExitProfile {
        exit_type: ExitType::RollUp,
        min_multiple: dec!(0.8),
        max_multiple: dec!(2),
        base_probability: dec!(0.08),
        base_years: dec!(4),
    },
    ExitProfile {
        exit_type: ExitType::IpoMicro,
        min_multiple: dec!(2),
        max_multiple: dec!(5),
        base_probability: dec!(0.10),
        base_years: dec!(6),
    },
    ExitProfile {
        exit_type: ExitType::IpoMid,
        min_multiple: dec!(5),
        max_multiple: dec!(12),
        base_probability: dec!(0.08),
        base_years: dec!(7),
    },
    ExitProfile {
        exit_type: ExitType::IpoLarge,
        min_multiple: dec!(12),
        max_multiple: dec!(30),
        base_probability: dec!(0.05),
        base_years: dec!(8),
    },
    ExitProfile {
        exit_type: ExitType::IpoMega,
        min_multiple: dec!(30),
        max_multiple: dec!(100),
        base_probability: dec!(0.02),
        base_years: dec!(9),
    },
];

// ---------------------------------------------------------------------------
// Funding paths and stage bases
// ---------------------------------------------------------------------------

/// Rounds completed before an exit, and the stage they leave the company at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingPath {
    pub tag: &'static str,
    pub terminal_stage: CompanyStage,
}

impl FundingPath {
    pub fn round_count(&self) -> u32 {
        round_count(self.tag)
    }
}

pub const FUNDING_PATHS: [FundingPath; 7] = [
    FundingPath {
        tag: "",
        terminal_stage: CompanyStage::PreSeed,
    },
    FundingPath {
        tag: "seed",
        terminal_stage: CompanyStage::Seed,
    },
    FundingPath {
        tag: "seed,A",
        terminal_stage: CompanyStage::SeriesA,
    },
    FundingPath {
        tag: "seed,A,B",
        terminal_stage: CompanyStage::SeriesB,
    },
    FundingPath {
        tag: "seed,A,B,C",
        terminal_stage: CompanyStage::SeriesC,
    },
    FundingPath {
        tag: "seed,A,B,C,D",
        terminal_stage: CompanyStage::Growth,
    },
    FundingPath {
        tag: "seed,A,B,C,D,E",
        terminal_stage: CompanyStage::LateStage,
    },
];

/// Reference company valuation at each stage.
pub const STAGE_BASE_VALUATIONS: [(CompanyStage, Money); 7] = [
    (CompanyStage::PreSeed, dec!(5_000_000)),
    (CompanyStage::Seed, dec!(10_000_000)),
    (CompanyStage::SeriesA, dec!(40_000_000)),
    (CompanyStage::SeriesB, dec!(120_000_000)),
    (CompanyStage::SeriesC, dec!(300_000_000)),
    (CompanyStage::Growth, dec!(750_000_000)),
    (CompanyStage::LateStage, dec!(2_000_000_000)),
];

pub fn stage_base_valuation(stage: CompanyStage) -> Money {
    STAGE_BASE_VALUATIONS
        .iter()
        .find(|(s, _)| *s == stage)
        .map(|(_, v)| *v)
        .unwrap_or(Decimal::ZERO)
}

/// Number of rounds in a comma-separated funding path ("seed,A,B" = 3).
pub fn round_count(path: &str) -> u32 {
    path.split(',').filter(|t| !t.trim().is_empty()).count() as u32
}

// ---------------------------------------------------------------------------
// Value bands
// ---------------------------------------------------------------------------

/// Slice of an exit type's value range, as fractions of the range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueBand {
    pub name: &'static str,
    pub lower: Rate,
    pub upper: Rate,
    pub weight: Rate,
}

pub const VALUE_BANDS: [ValueBand; 3] = [
    ValueBand {
        name: "low",
        lower: dec!(0),
        upper: dec!(0.25),
        weight: dec!(0.25),
    },
    ValueBand {
        name: "mid",
        lower: dec!(0.25),
        upper: dec!(0.75),
        weight: dec!(0.50),
    },
    ValueBand {
        name: "high",
        lower: dec!(0.75),
        upper: dec!(1),
        weight: dec!(0.25),
    },
];

// ---------------------------------------------------------------------------
// Matrix
// ---------------------------------------------------------------------------

/// One cell of the exit-type x funding-path x value-band matrix, in the
/// absolute values of the reference company.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioTemplate {
    pub exit_type: ExitType,
    pub funding_path: &'static str,
    pub path_rounds: u32,
    pub band: &'static str,
    pub min_value: Money,
    pub max_value: Money,
    pub probability: Rate,
    pub base_years: Years,
}

/// Every template, in table order.
pub fn template_matrix() -> Vec<ScenarioTemplate> {
    let mut out = Vec::with_capacity(EXIT_PROFILES.len() * FUNDING_PATHS.len() * VALUE_BANDS.len());
    for path in &FUNDING_PATHS {
        let base = stage_base_valuation(path.terminal_stage);
        for profile in &EXIT_PROFILES {
            let span = profile.max_multiple - profile.min_multiple;
            for band in &VALUE_BANDS {
                out.push(ScenarioTemplate {
                    exit_type: profile.exit_type,
                    funding_path: path.tag,
                    path_rounds: path.round_count(),
                    band: band.name,
                    min_value: base * (profile.min_multiple + span * band.lower),
                    max_value: base * (profile.min_multiple + span * band.upper),
                    probability: profile.base_probability * band.weight,
                    base_years: profile.base_years,
                });
            }
        }
    }
    out
}
