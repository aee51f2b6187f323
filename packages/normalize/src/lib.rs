#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raw crime and location text normalization.
//!
//! Source records carry free-text crime and premise descriptions that
//! differ per city. This crate maps them onto the canonical taxonomy via
//! exact-match lookup tables. The tables live in a versioned TOML document
//! (the built-in copy is embedded at compile time) so the vocabulary can
//! grow without code changes.
//!
//! Normalization is total: unknown, empty, or missing input falls back to
//! `OTHER_OFFENSE` / `OTHER/OTHER/OTHER` rather than failing ingestion.

use std::collections::BTreeMap;

use crime_grid_crime_models::{CrimeCategory, LocationKind};
use serde::Deserialize;

/// The taxonomy TOML shipped with this crate.
const BUILTIN_TABLES: &str = include_str!("../taxonomy.toml");

/// Errors raised while loading taxonomy tables.
///
/// Lookup itself never errors; only table construction can.
#[derive(Debug, thiserror::Error)]
pub enum TaxonomyError {
    /// The TOML document failed to parse.
    #[error("Failed to parse taxonomy TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A `[crime]` table key is not a canonical category label.
    #[error("Unknown crime category label: {label}")]
    UnknownCategory {
        /// The offending table key.
        label: String,
    },

    /// A `[location]` table key is not a valid `KEY1/KEY2/KEY3` path.
    #[error("Invalid location key path: {path}")]
    InvalidLocationPath {
        /// The offending table key.
        path: String,
    },
}

/// On-disk shape of the taxonomy document.
#[derive(Debug, Deserialize)]
struct RawTables {
    version: u32,
    /// Canonical category label -> raw source strings.
    crime: BTreeMap<String, Vec<String>>,
    /// `KEY1/KEY2/KEY3` path -> raw source strings.
    location: BTreeMap<String, Vec<String>>,
}

/// Inverted lookup tables mapping raw source strings to canonical types.
///
/// Constructed once at startup and shared by reference; lookups are pure
/// and safe to call from any number of concurrent readers.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    version: u32,
    crime: BTreeMap<String, CrimeCategory>,
    location: BTreeMap<String, LocationKind>,
}

impl Taxonomy {
    /// Loads the taxonomy tables embedded in this crate.
    ///
    /// # Panics
    ///
    /// Panics if the embedded document is malformed; a unit test guards
    /// against that ever shipping.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_toml_str(BUILTIN_TABLES).expect("embedded taxonomy tables must parse")
    }

    /// Parses taxonomy tables from a TOML document.
    ///
    /// Raw strings appearing under more than one category resolve to the
    /// last one in table order (deterministic since the tables are sorted
    /// maps); a warning is logged per duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError`] if the document does not parse or names
    /// an unknown category or location key.
    pub fn from_toml_str(document: &str) -> Result<Self, TaxonomyError> {
        let raw: RawTables = toml::from_str(document)?;

        let mut crime = BTreeMap::new();
        for (label, raw_strings) in &raw.crime {
            let category: CrimeCategory =
                label
                    .parse()
                    .map_err(|_| TaxonomyError::UnknownCategory {
                        label: label.clone(),
                    })?;
            for s in raw_strings {
                if let Some(previous) = crime.insert(s.clone(), category) {
                    log::warn!("Raw crime string {s:?} mapped to both {previous} and {category}");
                }
            }
        }

        let mut location = BTreeMap::new();
        for (path, raw_strings) in &raw.location {
            let kind: LocationKind =
                path.parse()
                    .map_err(|_| TaxonomyError::InvalidLocationPath { path: path.clone() })?;
            for s in raw_strings {
                if let Some(previous) = location.insert(s.clone(), kind) {
                    log::warn!("Raw location string {s:?} mapped to both {previous} and {kind}");
                }
            }
        }

        Ok(Self {
            version: raw.version,
            crime,
            location,
        })
    }

    /// Returns the version stamp of the loaded tables.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// The distinct location kinds the tables map onto, sorted.
    ///
    /// Always includes [`LocationKind::OTHER`], the lookup fallback.
    #[must_use]
    pub fn location_kinds(&self) -> Vec<LocationKind> {
        let mut kinds: std::collections::BTreeSet<LocationKind> =
            self.location.values().copied().collect();
        kinds.insert(LocationKind::OTHER);
        kinds.into_iter().collect()
    }

    /// Maps a raw crime description to its canonical category.
    ///
    /// The primary type is tried first, then the free-text description;
    /// unmatched input falls back to [`CrimeCategory::OtherOffense`].
    #[must_use]
    pub fn normalize_crime(&self, primary_type: &str, description: &str) -> CrimeCategory {
        self.crime
            .get(primary_type.trim())
            .or_else(|| self.crime.get(description.trim()))
            .copied()
            .unwrap_or(CrimeCategory::OtherOffense)
    }

    /// Maps a raw premise/location description to its three-level key.
    ///
    /// Unmatched input falls back to [`LocationKind::OTHER`].
    #[must_use]
    pub fn normalize_location(&self, raw: &str) -> LocationKind {
        self.location
            .get(raw.trim())
            .copied()
            .unwrap_or(LocationKind::OTHER)
    }
}

#[cfg(test)]
mod tests {
    use crime_grid_crime_models::{CrimeSeverity, LocationKey};

    use super::*;

    #[test]
    fn builtin_tables_parse() {
        let taxonomy = Taxonomy::builtin();
        assert_eq!(taxonomy.version(), 1);
        assert!(!taxonomy.crime.is_empty());
        assert!(!taxonomy.location.is_empty());
    }

    #[test]
    fn maps_chicago_primary_types() {
        let taxonomy = Taxonomy::builtin();
        assert_eq!(
            taxonomy.normalize_crime("THEFT", ""),
            CrimeCategory::Theft
        );
        assert_eq!(
            taxonomy.normalize_crime("HOMICIDE", ""),
            CrimeCategory::Homicide
        );
        assert_eq!(
            taxonomy.normalize_crime("CRIM SEXUAL ASSAULT", ""),
            CrimeCategory::CriminalSexualAssault
        );
        assert_eq!(
            taxonomy.normalize_crime("MOTOR VEHICLE THEFT", ""),
            CrimeCategory::MotorVehicleTheft
        );
    }

    #[test]
    fn maps_la_crime_code_descriptions() {
        let taxonomy = Taxonomy::builtin();
        assert_eq!(
            taxonomy.normalize_crime("BATTERY - SIMPLE ASSAULT", ""),
            CrimeCategory::Battery
        );
        assert_eq!(
            taxonomy.normalize_crime("VEHICLE - STOLEN", ""),
            CrimeCategory::MotorVehicleTheft
        );
        assert_eq!(
            taxonomy.normalize_crime("SHOPLIFTING - PETTY THEFT ($950 & UNDER)", ""),
            CrimeCategory::Theft
        );
    }

    #[test]
    fn falls_back_to_description_then_default() {
        let taxonomy = Taxonomy::builtin();
        assert_eq!(
            taxonomy.normalize_crime("NOT A REAL PRIMARY TYPE", "ATTEMPTED ROBBERY"),
            CrimeCategory::Robbery
        );
        assert_eq!(
            taxonomy.normalize_crime("NOT A REAL PRIMARY TYPE", "NOT A REAL DESCRIPTION"),
            CrimeCategory::OtherOffense
        );
        assert_eq!(taxonomy.normalize_crime("", ""), CrimeCategory::OtherOffense);
    }

    #[test]
    fn normalized_categories_carry_severity() {
        let taxonomy = Taxonomy::builtin();
        let category = taxonomy.normalize_crime("HOMICIDE", "");
        assert_eq!(category.severity(), CrimeSeverity::Critical);
        let fallback = taxonomy.normalize_crime("??", "");
        assert_eq!(fallback.severity(), CrimeSeverity::Low);
    }

    #[test]
    fn maps_location_descriptions() {
        let taxonomy = Taxonomy::builtin();
        assert_eq!(
            taxonomy.normalize_location("APARTMENT"),
            LocationKind::new(
                LocationKey::Indoor,
                LocationKey::Residential,
                LocationKey::Apartment
            )
        );
        assert_eq!(
            taxonomy.normalize_location("SIDEWALK"),
            LocationKind::new(
                LocationKey::Outdoor,
                LocationKey::Public,
                LocationKey::Street
            )
        );
        assert_eq!(
            taxonomy.normalize_location("CTA \"L\" TRAIN"),
            LocationKind::new(
                LocationKey::Outdoor,
                LocationKey::Public,
                LocationKey::Transit
            )
        );
    }

    #[test]
    fn location_lookup_is_total() {
        let taxonomy = Taxonomy::builtin();
        assert_eq!(taxonomy.normalize_location(""), LocationKind::OTHER);
        assert_eq!(
            taxonomy.normalize_location("SOME UNSEEN PREMISE"),
            LocationKind::OTHER
        );
    }

    #[test]
    fn location_kinds_are_sorted_and_include_the_fallback() {
        let taxonomy = Taxonomy::builtin();
        let kinds = taxonomy.location_kinds();
        assert!(kinds.contains(&LocationKind::OTHER));
        let mut sorted = kinds.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(kinds, sorted);
    }

    #[test]
    fn rejects_unknown_category_labels() {
        let doc = r#"
version = 1
[crime]
NOT_A_CATEGORY = ["X"]
[location]
"#;
        assert!(matches!(
            Taxonomy::from_toml_str(doc),
            Err(TaxonomyError::UnknownCategory { .. })
        ));
    }

    #[test]
    fn rejects_bad_location_paths() {
        let doc = r#"
version = 1
[crime]
[location]
"INDOOR/NOPE/OTHER" = ["X"]
"#;
        assert!(matches!(
            Taxonomy::from_toml_str(doc),
            Err(TaxonomyError::InvalidLocationPath { .. })
        ));
    }
}
