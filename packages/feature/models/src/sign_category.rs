//! Street sign category codes.
//!
//! The city sign inventory tags each sign with a short category code
//! (`PPEAK`, `PTIML`, ...). Several codes collapse into one
//! human-readable category.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Human-readable grouping of sign category codes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SignCategory {
    /// Pay stations, peak-hour and paid-parking signs
    PaidParking,
    /// Time-limited and truck-load-limited parking
    TimeLimitedParking,
    /// Restricted, business and general parking zones
    ParkingZone,
    /// Generic parking sign
    GeneralParkingSign,
    /// General business parking
    GeneralBusinessParking,
}

impl SignCategory {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::PaidParking,
            Self::TimeLimitedParking,
            Self::ParkingZone,
            Self::GeneralParkingSign,
            Self::GeneralBusinessParking,
        ]
    }

    /// Sign inventory codes belonging to this category.
    #[must_use]
    pub const fn codes(self) -> &'static [&'static str] {
        match self {
            Self::PaidParking => &["PR", "PPP", "PPL", "PPEAK"],
            Self::TimeLimitedParking => &["PTIML", "PTRKL"],
            Self::ParkingZone => &["PZONE", "PRZ", "PBZ"],
            Self::GeneralParkingSign => &["PS"],
            Self::GeneralBusinessParking => &["GBP"],
        }
    }

    /// Display text shown to users.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::PaidParking => "Paid Parking",
            Self::TimeLimitedParking => "Time Limited Parking",
            Self::ParkingZone => "Parking Zone",
            Self::GeneralParkingSign => "General Parking Sign",
            Self::GeneralBusinessParking => "General Business Parking",
        }
    }

    /// Looks up the category for a sign inventory code.
    ///
    /// Matching ignores case and surrounding whitespace.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::all()
            .iter()
            .copied()
            .find(|cat| cat.codes().iter().any(|c| c.eq_ignore_ascii_case(code)))
    }
}
