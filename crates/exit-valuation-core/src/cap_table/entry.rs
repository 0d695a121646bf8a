use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::vesting::VestingSchedule;
use crate::error::ValuationError;
use crate::types::{Money, Multiple, Rate, Shares};

// ---------------------------------------------------------------------------
// Share classes
// ---------------------------------------------------------------------------

/// Class of security held by an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareClass {
    Common,
    Options,
    Warrants,
    Safe,
    ConvertibleNote,
    SeriesA,
    SeriesB,
    SeriesC,
    SeriesD,
    SeriesE,
    SeriesF,
}

impl ShareClass {
    /// Classes that carry a liquidation preference claim.
    pub fn has_preference(&self) -> bool {
        !matches!(
            self,
            ShareClass::Common | ShareClass::Options | ShareClass::Warrants
        )
    }

    /// Options and warrants are counted at the assumed exercise fraction.
    pub fn is_option_like(&self) -> bool {
        matches!(self, ShareClass::Options | ShareClass::Warrants)
    }

    /// Seniority in the preference stack. Higher is paid first; later series
    /// are senior, SAFEs and notes sit above common only.
    pub fn seniority_rank(&self) -> u8 {
        match self {
            ShareClass::Common | ShareClass::Options | ShareClass::Warrants => 0,
            ShareClass::Safe | ShareClass::ConvertibleNote => 1,
            ShareClass::SeriesA => 2,
            ShareClass::SeriesB => 3,
            ShareClass::SeriesC => 4,
            ShareClass::SeriesD => 5,
            ShareClass::SeriesE => 6,
            ShareClass::SeriesF => 7,
        }
    }

    /// The priced series that follows this one, if any.
    pub fn next_series(&self) -> Option<ShareClass> {
        match self {
            ShareClass::Common
            | ShareClass::Options
            | ShareClass::Warrants
            | ShareClass::Safe
            | ShareClass::ConvertibleNote => Some(ShareClass::SeriesA),
            ShareClass::SeriesA => Some(ShareClass::SeriesB),
            ShareClass::SeriesB => Some(ShareClass::SeriesC),
            ShareClass::SeriesC => Some(ShareClass::SeriesD),
            ShareClass::SeriesD => Some(ShareClass::SeriesE),
            ShareClass::SeriesE => Some(ShareClass::SeriesF),
            ShareClass::SeriesF => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ShareClass::Common => "Common",
            ShareClass::Options => "Options",
            ShareClass::Warrants => "Warrants",
            ShareClass::Safe => "SAFE",
            ShareClass::ConvertibleNote => "Convertible Note",
            ShareClass::SeriesA => "Series A Preferred",
            ShareClass::SeriesB => "Series B Preferred",
            ShareClass::SeriesC => "Series C Preferred",
            ShareClass::SeriesD => "Series D Preferred",
            ShareClass::SeriesE => "Series E Preferred",
            ShareClass::SeriesF => "Series F Preferred",
        }
    }
}

impl fmt::Display for ShareClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Anti-dilution
// ---------------------------------------------------------------------------

/// Price protection attached to a preferred position.
///
/// Deserialises through [`FromStr`], so an unknown method string is reported
/// as [`ValuationError::InvalidMethod`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum AntiDilutionMethod {
    #[default]
    None,
    FullRatchet,
    WeightedAverage,
}

impl FromStr for AntiDilutionMethod {
    type Err = ValuationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(AntiDilutionMethod::None),
            "full_ratchet" => Ok(AntiDilutionMethod::FullRatchet),
            "weighted_average" | "broad_based_weighted_average" => {
                Ok(AntiDilutionMethod::WeightedAverage)
            }
            _ => Err(ValuationError::InvalidMethod { method: s.into() }),
        }
    }
}

impl TryFrom<String> for AntiDilutionMethod {
    type Error = ValuationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// Rights
// ---------------------------------------------------------------------------

/// Rights attached to a shareholding. Every field has a documented default:
/// 1x non-participating preference, no anti-dilution, no pro-rata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rights {
    pub voting: bool,
    pub liquidation_preference_multiple: Multiple,
    pub participating: bool,
    /// Total-return cap as a multiple of investment. Ignored unless participating.
    pub participation_cap: Option<Multiple>,
    pub pro_rata: bool,
    pub anti_dilution: AntiDilutionMethod,
    pub board_seats: u32,
    pub information_rights: bool,
    pub registration_rights: bool,
}

impl Default for Rights {
    fn default() -> Self {
        Self {
            voting: true,
            liquidation_preference_multiple: Decimal::ONE,
            participating: false,
            participation_cap: None,
            pro_rata: false,
            anti_dilution: AntiDilutionMethod::None,
            board_seats: 0,
            information_rights: false,
            registration_rights: false,
        }
    }
}

impl Rights {
    /// Participation cap that actually applies (none for non-participating).
    pub fn effective_cap(&self) -> Option<Multiple> {
        if self.participating {
            self.participation_cap
        } else {
            None
        }
    }

    /// True when the economic terms cannot be used as given.
    pub fn is_malformed(&self) -> bool {
        self.liquidation_preference_multiple < Decimal::ZERO
            || self
                .participation_cap
                .map(|c| self.participating && c < Decimal::ZERO)
                .unwrap_or(false)
    }

    /// Economic terms used for allocation. Malformed terms fall back to
    /// 1x non-participating with no anti-dilution rather than failing.
    pub fn sanitized(&self) -> Rights {
        if self.is_malformed() {
            Rights {
                voting: self.voting,
                pro_rata: self.pro_rata,
                board_seats: self.board_seats,
                information_rights: self.information_rights,
                registration_rights: self.registration_rights,
                ..Rights::default()
            }
        } else {
            self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One shareholder's position in one share class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareholdingEntry {
    pub shareholder: String,
    pub share_class: ShareClass,
    pub shares: Shares,
    /// Original issue price (strike for options).
    pub price_per_share: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investment_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vesting: Option<VestingSchedule>,
    #[serde(default)]
    pub rights: Rights,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ShareholdingEntry {
    pub fn new(
        shareholder: impl Into<String>,
        share_class: ShareClass,
        shares: Shares,
        price_per_share: Money,
    ) -> Self {
        Self {
            shareholder: shareholder.into(),
            share_class,
            shares,
            price_per_share,
            investment_date: None,
            vesting: None,
            rights: Rights::default(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_rights(mut self, rights: Rights) -> Self {
        self.rights = rights;
        self
    }

    pub fn with_vesting(mut self, vesting: VestingSchedule) -> Self {
        self.vesting = Some(vesting);
        self
    }

    /// Capital paid in for this position.
    pub fn invested_amount(&self) -> Money {
        self.shares * self.price_per_share
    }

    /// Shares that count in an exit on `as_of`. Without a date, or without
    /// a schedule, every share counts.
    pub fn shares_on_exit(&self, as_of: Option<NaiveDate>) -> Shares {
        match (&self.vesting, as_of) {
            (Some(schedule), Some(date)) => {
                let vested_fraction = if schedule.total_shares > Decimal::ZERO {
                    (schedule.vested_on_exit(date) / schedule.total_shares).min(Decimal::ONE)
                } else {
                    Decimal::ONE
                };
                self.shares * vested_fraction
            }
            _ => self.shares,
        }
    }

    /// Shares vested as of a date, ignoring change-of-control acceleration.
    pub fn vested_shares(&self, as_of: NaiveDate) -> Shares {
        match &self.vesting {
            Some(schedule) if schedule.total_shares > Decimal::ZERO => {
                self.shares * (schedule.vested_as_of(as_of) / schedule.total_shares).min(Decimal::ONE)
            }
            _ => self.shares,
        }
    }

    /// Fully-diluted weight: options and warrants at the exercise fraction.
    pub fn fully_diluted_weight(&self, shares: Shares, exercise_fraction: Rate) -> Shares {
        if self.share_class.is_option_like() {
            shares * exercise_fraction
        } else {
            shares
        }
    }
}
