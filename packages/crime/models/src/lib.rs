#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crime category taxonomy types and severity definitions.
//!
//! This crate defines the canonical crime categories and the three-level
//! location-description keys shared across the crime-grid system. Every
//! source-specific raw string normalizes into these types; the severity
//! weight attached to each category is what the aggregation pipeline sums
//! per block.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Severity weight for a crime category, from 1 (minor) to 4 (critical).
///
/// A single static per-category scheme is used everywhere. The weight feeds
/// the per-block severity rate: `sum(weights) / population`.
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
pub enum CrimeSeverity {
    /// Level 1: minor or non-criminal offenses
    Low = 1,
    /// Level 2: moderate offenses (theft, burglary)
    Moderate = 2,
    /// Level 3: serious offenses (robbery, assault)
    High = 3,
    /// Level 4: most severe offenses (homicide, trafficking)
    Critical = 4,
}

impl CrimeSeverity {
    /// Returns the numeric value of this severity level.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Returns the severity as the weight summed by aggregation.
    #[must_use]
    pub const fn weight(self) -> f64 {
        self as u8 as f64
    }
}

/// Canonical crime categories.
///
/// One variant per category in the canonical taxonomy; raw source strings
/// map many-to-one onto these via [`crime_grid_normalize`]'s tables.
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
pub enum CrimeCategory {
    Arson,
    Assault,
    Battery,
    Burglary,
    ConcealedCarryLicenseViolation,
    CriminalSexualAssault,
    CriminalDamage,
    CriminalTrespass,
    DeceptivePractice,
    DomesticViolence,
    Gambling,
    Homicide,
    HumanTrafficking,
    InterferenceWithPublicOfficer,
    Intimidation,
    Kidnapping,
    LiquorLawViolation,
    MotorVehicleTheft,
    Narcotics,
    NonCriminal,
    Obscenity,
    OffenseInvolvingChildren,
    OtherNarcoticViolation,
    OtherOffense,
    Prostitution,
    PublicIndecency,
    PublicPeaceViolation,
    Ritualism,
    Robbery,
    SexOffense,
    Stalking,
    Theft,
    WeaponsViolation,
}

impl CrimeCategory {
    /// Returns the static severity weight for this category.
    #[must_use]
    pub const fn severity(self) -> CrimeSeverity {
        match self {
            Self::Homicide | Self::HumanTrafficking | Self::CriminalSexualAssault => {
                CrimeSeverity::Critical
            }

            Self::Arson
            | Self::Assault
            | Self::Battery
            | Self::DomesticViolence
            | Self::Intimidation
            | Self::Kidnapping
            | Self::Narcotics
            | Self::Ritualism
            | Self::Robbery
            | Self::SexOffense => CrimeSeverity::High,

            Self::Burglary
            | Self::DeceptivePractice
            | Self::MotorVehicleTheft
            | Self::OffenseInvolvingChildren
            | Self::OtherNarcoticViolation
            | Self::Prostitution
            | Self::Stalking
            | Self::Theft => CrimeSeverity::Moderate,

            Self::ConcealedCarryLicenseViolation
            | Self::CriminalDamage
            | Self::CriminalTrespass
            | Self::Gambling
            | Self::InterferenceWithPublicOfficer
            | Self::LiquorLawViolation
            | Self::NonCriminal
            | Self::Obscenity
            | Self::OtherOffense
            | Self::PublicIndecency
            | Self::PublicPeaceViolation
            | Self::WeaponsViolation => CrimeSeverity::Low,
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Arson,
            Self::Assault,
            Self::Battery,
            Self::Burglary,
            Self::ConcealedCarryLicenseViolation,
            Self::CriminalSexualAssault,
            Self::CriminalDamage,
            Self::CriminalTrespass,
            Self::DeceptivePractice,
            Self::DomesticViolence,
            Self::Gambling,
            Self::Homicide,
            Self::HumanTrafficking,
            Self::InterferenceWithPublicOfficer,
            Self::Intimidation,
            Self::Kidnapping,
            Self::LiquorLawViolation,
            Self::MotorVehicleTheft,
            Self::Narcotics,
            Self::NonCriminal,
            Self::Obscenity,
            Self::OffenseInvolvingChildren,
            Self::OtherNarcoticViolation,
            Self::OtherOffense,
            Self::Prostitution,
            Self::PublicIndecency,
            Self::PublicPeaceViolation,
            Self::Ritualism,
            Self::Robbery,
            Self::SexOffense,
            Self::Stalking,
            Self::Theft,
            Self::WeaponsViolation,
        ]
    }
}

/// One level of the three-level location-description key.
///
/// The same value set is shared across all three levels since several
/// values (e.g. `OTHER`, `COMMERCIAL`) appear at more than one depth.
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
pub enum LocationKey {
    Indoor,
    Outdoor,
    Residential,
    Commercial,
    Public,
    Private,
    Apartment,
    House,
    HotelMotel,
    Store,
    Restaurant,
    Industrial,
    Office,
    Road,
    Street,
    Park,
    Transit,
    Religious,
    Noncommercial,
    Other,
}

/// A three-level location-description key (e.g. `INDOOR/RESIDENTIAL/APARTMENT`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct LocationKind {
    /// Broadest setting (indoor/outdoor).
    pub key1: LocationKey,
    /// Mid-level context (residential, commercial, public, private).
    pub key2: LocationKey,
    /// Specific venue.
    pub key3: LocationKey,
}

impl LocationKind {
    /// Fallback kind for unknown or missing location descriptions.
    pub const OTHER: Self = Self {
        key1: LocationKey::Other,
        key2: LocationKey::Other,
        key3: LocationKey::Other,
    };

    #[must_use]
    pub const fn new(key1: LocationKey, key2: LocationKey, key3: LocationKey) -> Self {
        Self { key1, key2, key3 }
    }
}

impl std::fmt::Display for LocationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.key1, self.key2, self.key3)
    }
}

impl std::str::FromStr for LocationKind {
    type Err = strum::ParseError;

    /// Parses a `KEY1/KEY2/KEY3` path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '/');
        let key1 = parts.next().unwrap_or_default().trim().parse()?;
        let key2 = parts.next().unwrap_or_default().trim().parse()?;
        let key3 = parts.next().unwrap_or_default().trim().parse()?;
        Ok(Self { key1, key2, key3 })
    }
}
