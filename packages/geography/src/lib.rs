#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! City, block, and zip geometry records.
//!
//! Blocks are the unit of spatial aggregation: small polygons (census
//! tracts) with a population count. Geometries cross the bulk-load boundary
//! as WKT `MULTIPOLYGON` strings; city onboarding data arrives as GeoJSON
//! feature collections. Both encodings parse into [`geo::MultiPolygon`].

pub mod geometry;
pub mod prepare;

use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};

/// Database identifier for a city.
pub type CityId = i64;

/// Database identifier for a block.
pub type BlockId = i64;

/// A city whose incidents and blocks are tracked.
#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub id: CityId,
    pub name: String,
    pub state: String,
    pub country: String,
    /// Representative point for the city.
    pub location: Point<f64>,
}

/// A geographic block: the polygon unit incidents aggregate into.
///
/// Block polygons within one city are assumed mutually non-overlapping;
/// nothing here enforces that.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub city_id: CityId,
    /// Possibly multi-part boundary, holes honored.
    pub boundary: MultiPolygon<f64>,
    /// Resident population; must be positive to participate in severity
    /// rates.
    pub population: u32,
    /// Encoded feature tensor from the last scheduled run, if any.
    pub prediction: Option<Vec<u8>>,
    /// `(month, year)` the stored tensor was computed, if any.
    pub stamped: Option<(u32, i32)>,
}

/// A zipcode boundary. Informational only; never consumed by the tensor
/// pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ZipGeometry {
    pub id: i64,
    pub city_id: CityId,
    pub zipcode: String,
    pub boundary: MultiPolygon<f64>,
}

/// Bulk-load row for the `block` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRow {
    pub id: BlockId,
    pub cityid: CityId,
    /// WKT `MULTIPOLYGON` text.
    pub shape: String,
    pub population: i64,
}

/// Bulk-load row for the `zipcodegeom` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipRow {
    pub cityid: CityId,
    pub zipcode: String,
    /// WKT `MULTIPOLYGON` text.
    pub shape: String,
}

/// Errors raised while parsing or converting geometries.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    /// WKT text failed to parse or convert.
    #[error("Invalid WKT geometry: {message}")]
    Wkt {
        /// Parser diagnostic.
        message: String,
    },

    /// GeoJSON failed to parse.
    #[error("Invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The geometry parsed but is not a (multi)polygon or point as
    /// required.
    #[error("Unsupported geometry type: expected {expected}")]
    UnsupportedGeometry {
        /// What the caller required.
        expected: &'static str,
    },

    /// A GeoJSON feature is missing a required property.
    #[error("Feature missing property {key:?}")]
    MissingProperty {
        /// The property key looked up.
        key: String,
    },
}
