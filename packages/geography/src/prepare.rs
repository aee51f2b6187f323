//! City onboarding: census tract and zipcode boundary preparation.
//!
//! Tract boundary files ship one feature per census block, each carrying
//! the tract it belongs to. Populations arrive in a separate CSV keyed by
//! the block-level geoid, so each emitted block row carries the population
//! of its whole tract.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use geojson::GeoJson;
use serde_json::Value;

use crate::geometry::{geojson_geometry_to_multipolygon, multipolygon_to_wkt};
use crate::{BlockId, BlockRow, CityId, GeometryError, ZipRow};

/// Feature property naming the census tract a boundary belongs to.
pub const TRACT_CODE_PROPERTY: &str = "tractce10";

/// Feature property carrying the block-level geoid populations are keyed by.
pub const UNIT_GEOID_PROPERTY: &str = "geoid10";

/// Feature property naming a zipcode tabulation area.
pub const ZCTA_PROPERTY: &str = "ZCTA5CE10";

/// Errors raised while preparing block and zipcode bulk-load rows.
#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    /// A boundary geometry failed to parse or convert.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// The population CSV failed to parse.
    #[error("Failed to read population CSV: {0}")]
    Csv(#[from] csv::Error),

    /// The population CSV header is missing an expected column.
    #[error("Population CSV missing column {name:?}")]
    MissingColumn {
        /// The column looked for.
        name: String,
    },

    /// A population cell did not parse as an integer.
    #[error("Invalid population count {value:?}")]
    BadPopulation {
        /// The offending cell text.
        value: String,
    },
}

/// Reads per-unit population counts from a CSV file.
///
/// `id_column` names the column holding the geographic unit identifier and
/// `population_column` its resident count. Chicago publishes these as
/// `CENSUS BLOCK FULL` / `TOTAL POPULATION`; Los Angeles as `OBJECTID` /
/// `POP`.
///
/// # Errors
///
/// Returns [`PrepareError`] if the CSV does not parse, a named column is
/// absent, or a count is not an integer.
pub fn read_population_counts<R: Read>(
    reader: R,
    id_column: &str,
    population_column: &str,
) -> Result<BTreeMap<String, i64>, PrepareError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let id_index = column_index(&headers, id_column)?;
    let population_index = column_index(&headers, population_column)?;

    let mut counts = BTreeMap::new();
    for record in csv_reader.records() {
        let record = record?;
        let id = record.get(id_index).unwrap_or("").trim().to_string();
        let cell = record.get(population_index).unwrap_or("").trim();
        let count: i64 = cell.parse().map_err(|_| PrepareError::BadPopulation {
            value: cell.to_string(),
        })?;
        counts.insert(id, count);
    }

    Ok(counts)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, PrepareError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| PrepareError::MissingColumn {
            name: name.to_string(),
        })
}

/// Builds block bulk-load rows from a tract boundary feature collection.
///
/// Each feature becomes one block. Populations are summed per tract code
/// across all units in that tract, and every block in the tract carries the
/// tract total. Units absent from `populations` contribute zero and are
/// logged. Ids are assigned sequentially from `first_id` in feature order.
///
/// # Errors
///
/// Returns [`PrepareError`] if the GeoJSON does not parse, a feature lacks
/// a geometry or its tract property, or a geometry is not polygonal.
pub fn blocks_from_tracts(
    tracts_geojson: &str,
    populations: &BTreeMap<String, i64>,
    city_id: CityId,
    first_id: BlockId,
) -> Result<Vec<BlockRow>, PrepareError> {
    let geojson: GeoJson = tracts_geojson.parse().map_err(GeometryError::GeoJson)?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(GeometryError::UnsupportedGeometry {
            expected: "FeatureCollection",
        }
        .into());
    };

    let mut tract_totals: BTreeMap<String, i64> = BTreeMap::new();
    for feature in &collection.features {
        let tract = string_property(feature, TRACT_CODE_PROPERTY)?;
        let unit = string_property(feature, UNIT_GEOID_PROPERTY)?;
        let count = populations.get(&unit).copied().unwrap_or_else(|| {
            log::warn!("No population count for unit {unit} in tract {tract}");
            0
        });
        *tract_totals.entry(tract).or_insert(0) += count;
    }

    let mut rows = Vec::with_capacity(collection.features.len());
    let mut next_id = first_id;
    for feature in &collection.features {
        let tract = string_property(feature, TRACT_CODE_PROPERTY)?;
        let geometry = feature
            .geometry
            .as_ref()
            .ok_or(GeometryError::UnsupportedGeometry {
                expected: "Polygon or MultiPolygon",
            })?;
        let boundary = geojson_geometry_to_multipolygon(geometry)?;
        rows.push(BlockRow {
            id: next_id,
            cityid: city_id,
            shape: multipolygon_to_wkt(&boundary),
            population: tract_totals.get(&tract).copied().unwrap_or(0),
        });
        next_id += 1;
    }

    Ok(rows)
}

/// Builds zipcode bulk-load rows from a ZCTA feature collection.
///
/// Only zipcodes in `allowlist` are kept; everything else in the national
/// file is skipped.
///
/// # Errors
///
/// Returns [`PrepareError`] if the GeoJSON does not parse, a kept feature
/// lacks its zipcode property, or a geometry is not polygonal.
pub fn zip_rows(
    zips_geojson: &str,
    allowlist: &BTreeSet<String>,
    city_id: CityId,
) -> Result<Vec<ZipRow>, PrepareError> {
    let geojson: GeoJson = zips_geojson.parse().map_err(GeometryError::GeoJson)?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(GeometryError::UnsupportedGeometry {
            expected: "FeatureCollection",
        }
        .into());
    };

    let mut rows = Vec::new();
    for feature in &collection.features {
        let Ok(zipcode) = string_property(feature, ZCTA_PROPERTY) else {
            continue;
        };
        if !allowlist.contains(&zipcode) {
            continue;
        }
        let geometry = feature
            .geometry
            .as_ref()
            .ok_or(GeometryError::UnsupportedGeometry {
                expected: "Polygon or MultiPolygon",
            })?;
        let boundary = geojson_geometry_to_multipolygon(geometry)?;
        rows.push(ZipRow {
            cityid: city_id,
            zipcode,
            shape: multipolygon_to_wkt(&boundary),
        });
    }

    Ok(rows)
}

/// Reads a feature property as text, accepting string or numeric JSON.
fn string_property(feature: &geojson::Feature, key: &str) -> Result<String, GeometryError> {
    let value = feature
        .properties
        .as_ref()
        .and_then(|properties| properties.get(key))
        .ok_or_else(|| GeometryError::MissingProperty {
            key: key.to_string(),
        })?;
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(GeometryError::MissingProperty {
            key: key.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POPULATIONS_CSV: &str = "\
CENSUS BLOCK FULL,TOTAL POPULATION
170310001001000,120
170310001001001,80
170310002002000,40
";

    fn tract_feature(tract: &str, unit: &str, x: f64) -> String {
        format!(
            r#"{{"type":"Feature","properties":{{"tractce10":"{tract}","geoid10":"{unit}"}},
                "geometry":{{"type":"Polygon","coordinates":[[[{x},0],[{y},0],[{y},1],[{x},1],[{x},0]]]}}}}"#,
            y = x + 1.0,
        )
    }

    fn feature_collection(features: &[String]) -> String {
        format!(
            r#"{{"type":"FeatureCollection","features":[{}]}}"#,
            features.join(",")
        )
    }

    #[test]
    fn reads_population_counts() {
        let counts =
            read_population_counts(POPULATIONS_CSV.as_bytes(), "CENSUS BLOCK FULL", "TOTAL POPULATION")
                .unwrap();
        assert_eq!(counts.get("170310001001000"), Some(&120));
        assert_eq!(counts.len(), 3);
    }

    #[test]
    fn missing_column_is_an_error() {
        let result = read_population_counts(POPULATIONS_CSV.as_bytes(), "NOPE", "TOTAL POPULATION");
        assert!(matches!(result, Err(PrepareError::MissingColumn { .. })));
    }

    #[test]
    fn blocks_carry_summed_tract_population() {
        let features = feature_collection(&[
            tract_feature("000100", "170310001001000", 0.0),
            tract_feature("000100", "170310001001001", 2.0),
            tract_feature("000200", "170310002002000", 4.0),
        ]);
        let populations =
            read_population_counts(POPULATIONS_CSV.as_bytes(), "CENSUS BLOCK FULL", "TOTAL POPULATION")
                .unwrap();
        let rows = blocks_from_tracts(&features, &populations, 1, 10).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].id, 10);
        assert_eq!(rows[2].id, 12);
        // Both blocks of tract 000100 carry the tract total.
        assert_eq!(rows[0].population, 200);
        assert_eq!(rows[1].population, 200);
        assert_eq!(rows[2].population, 40);
        assert!(rows[0].shape.starts_with("MULTIPOLYGON"));
    }

    #[test]
    fn units_without_counts_contribute_zero() {
        let features = feature_collection(&[tract_feature("000900", "999999999999999", 0.0)]);
        let rows = blocks_from_tracts(&features, &BTreeMap::new(), 1, 1).unwrap();
        assert_eq!(rows[0].population, 0);
    }

    #[test]
    fn zip_rows_respect_allowlist() {
        let features = feature_collection(&[
            r#"{"type":"Feature","properties":{"ZCTA5CE10":"60601"},
                "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}}"#
                .to_string(),
            r#"{"type":"Feature","properties":{"ZCTA5CE10":"99999"},
                "geometry":{"type":"Polygon","coordinates":[[[2,0],[3,0],[3,1],[2,1],[2,0]]]}}"#
                .to_string(),
        ]);
        let allowlist: BTreeSet<String> = ["60601".to_string()].into();
        let rows = zip_rows(&features, &allowlist, 1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].zipcode, "60601");
        assert_eq!(rows[0].cityid, 1);
    }

    #[test]
    fn non_collection_geojson_is_an_error() {
        let result = blocks_from_tracts(
            r#"{"type":"Point","coordinates":[1,2]}"#,
            &BTreeMap::new(),
            1,
            1,
        );
        assert!(matches!(
            result,
            Err(PrepareError::Geometry(
                GeometryError::UnsupportedGeometry { .. }
            ))
        ));
    }
}
