//! WKT and GeoJSON parsing into `geo` types.
//!
//! Single-`Polygon` inputs are promoted to one-element [`MultiPolygon`]s so
//! downstream code handles exactly one shape.

use geo::{MultiPolygon, Point};
use wkt::{ToWkt, TryFromWkt};

use crate::GeometryError;

/// Parses a geometry string into a [`MultiPolygon`], sniffing the encoding.
///
/// GeoJSON starts with `{`; anything else is treated as WKT.
///
/// # Errors
///
/// Returns [`GeometryError`] if the text does not parse or is not a
/// polygonal geometry.
pub fn parse_multipolygon(text: &str) -> Result<MultiPolygon<f64>, GeometryError> {
    if text.trim_start().starts_with('{') {
        multipolygon_from_geojson(text)
    } else {
        multipolygon_from_wkt(text)
    }
}

/// Parses WKT `MULTIPOLYGON` or `POLYGON` text.
///
/// # Errors
///
/// Returns [`GeometryError::Wkt`] on malformed text and
/// [`GeometryError::UnsupportedGeometry`] for non-polygonal geometries.
pub fn multipolygon_from_wkt(text: &str) -> Result<MultiPolygon<f64>, GeometryError> {
    let geometry: geo::Geometry<f64> =
        geo::Geometry::try_from_wkt_str(text).map_err(|e| GeometryError::Wkt {
            message: e.to_string(),
        })?;
    into_multipolygon(geometry)
}

/// Parses a GeoJSON geometry object into a [`MultiPolygon`].
///
/// # Errors
///
/// Returns [`GeometryError`] on malformed GeoJSON or non-polygonal
/// geometries.
pub fn multipolygon_from_geojson(text: &str) -> Result<MultiPolygon<f64>, GeometryError> {
    let geojson: geojson::GeoJson = text.parse()?;
    let geojson::GeoJson::Geometry(geometry) = geojson else {
        return Err(GeometryError::UnsupportedGeometry {
            expected: "Polygon or MultiPolygon",
        });
    };
    geojson_geometry_to_multipolygon(&geometry)
}

/// Converts an already-parsed GeoJSON geometry into a [`MultiPolygon`].
///
/// # Errors
///
/// Returns [`GeometryError`] if the geometry is not polygonal.
pub fn geojson_geometry_to_multipolygon(
    geometry: &geojson::Geometry,
) -> Result<MultiPolygon<f64>, GeometryError> {
    let geo_geometry: geo::Geometry<f64> = geometry.clone().try_into()?;
    into_multipolygon(geo_geometry)
}

fn into_multipolygon(geometry: geo::Geometry<f64>) -> Result<MultiPolygon<f64>, GeometryError> {
    match geometry {
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        geo::Geometry::Polygon(p) => Ok(MultiPolygon(vec![p])),
        _ => Err(GeometryError::UnsupportedGeometry {
            expected: "Polygon or MultiPolygon",
        }),
    }
}

/// Serializes a [`MultiPolygon`] as WKT text for bulk-load rows.
#[must_use]
pub fn multipolygon_to_wkt(multipolygon: &MultiPolygon<f64>) -> String {
    multipolygon.wkt_string()
}

/// Parses WKT `POINT` text into a [`Point`].
///
/// # Errors
///
/// Returns [`GeometryError::Wkt`] on malformed text.
pub fn point_from_wkt(text: &str) -> Result<Point<f64>, GeometryError> {
    Point::try_from_wkt_str(text).map_err(|e| GeometryError::Wkt {
        message: e.to_string(),
    })
}

/// Serializes a point as `POINT(x y)` for bulk-load rows.
#[must_use]
pub fn point_to_wkt(point: &Point<f64>) -> String {
    point.wkt_string()
}
