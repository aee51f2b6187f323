#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Filtered flat exports of normalized incident data.
//!
//! Consumers downstream of the pipeline get incidents as a flat CSV with
//! the city joined in and the point split into latitude/longitude columns.
//! Every filter dimension is optional; an empty filter exports a city's
//! whole history.

use std::io::Write;

use chrono::NaiveDate;
use crime_grid_crime_models::{CrimeCategory, LocationKind};
use crime_grid_geography::{City, CityId};
use crime_grid_ingest::Incident;
use serde::Serialize;

/// Errors raised while writing an export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The CSV writer failed.
    #[error("Failed to write export CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Filter dimensions for an incident export.
///
/// Date and hour bounds are inclusive on both ends. `None` list filters
/// match everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentFilter {
    pub city_id: CityId,
    /// Earliest date kept, inclusive.
    pub start_date: Option<NaiveDate>,
    /// Latest date kept, inclusive.
    pub end_date: Option<NaiveDate>,
    /// Earliest hour kept, `0..=23`.
    pub start_hour: u32,
    /// Latest hour kept, `0..=23`, inclusive.
    pub end_hour: u32,
    /// Days of week kept (`0..=6`, Monday `0`).
    pub dows: Option<Vec<u32>>,
    pub categories: Option<Vec<CrimeCategory>>,
    pub location_kinds: Option<Vec<LocationKind>>,
}

impl IncidentFilter {
    /// A filter matching every incident of one city.
    #[must_use]
    pub const fn for_city(city_id: CityId) -> Self {
        Self {
            city_id,
            start_date: None,
            end_date: None,
            start_hour: 0,
            end_hour: 23,
            dows: None,
            categories: None,
            location_kinds: None,
        }
    }

    /// Whether an incident passes every filter dimension.
    #[must_use]
    pub fn matches(&self, incident: &Incident) -> bool {
        if incident.city_id != self.city_id {
            return false;
        }
        let date = incident.datetime.date();
        if self.start_date.is_some_and(|start| date < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| date > end) {
            return false;
        }
        if incident.hour < self.start_hour || incident.hour > self.end_hour {
            return false;
        }
        if self
            .dows
            .as_ref()
            .is_some_and(|dows| !dows.contains(&incident.dow()))
        {
            return false;
        }
        if self
            .categories
            .as_ref()
            .is_some_and(|categories| !categories.contains(&incident.category))
        {
            return false;
        }
        if self
            .location_kinds
            .as_ref()
            .is_some_and(|kinds| !kinds.contains(&incident.location_kind))
        {
            return false;
        }
        true
    }
}

/// One line of the flat export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub city: String,
    pub state: String,
    pub country: String,
    /// `YYYY-MM-DD HH:MM:SS`.
    pub datetime: String,
    pub latitude: f64,
    pub longitude: f64,
    pub category: String,
    pub location_key1: String,
    pub location_key2: String,
    pub location_key3: String,
}

/// Applies `filter` and flattens the survivors into export rows.
#[must_use]
pub fn export_rows(incidents: &[Incident], city: &City, filter: &IncidentFilter) -> Vec<ExportRow> {
    let rows: Vec<ExportRow> = incidents
        .iter()
        .filter(|incident| filter.matches(incident))
        .map(|incident| ExportRow {
            city: city.name.clone(),
            state: city.state.clone(),
            country: city.country.clone(),
            datetime: incident.datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            latitude: incident.point.y(),
            longitude: incident.point.x(),
            category: incident.category.to_string(),
            location_key1: incident.location_kind.key1.to_string(),
            location_key2: incident.location_kind.key2.to_string(),
            location_key3: incident.location_kind.key3.to_string(),
        })
        .collect();
    log::info!(
        "Export kept {} of {} incidents for {}",
        rows.len(),
        incidents.len(),
        city.name,
    );
    rows
}

/// Column order of the flat export, matching [`ExportRow`]'s fields.
const EXPORT_HEADER: [&str; 10] = [
    "city",
    "state",
    "country",
    "datetime",
    "latitude",
    "longitude",
    "category",
    "location_key1",
    "location_key2",
    "location_key3",
];

/// Writes export rows as CSV with a header line.
///
/// The header is written even when `rows` is empty, so a filter matching
/// nothing still produces a parseable export.
///
/// # Errors
///
/// Returns [`ExportError`] if serialization or the underlying writer fails.
pub fn write_csv<W: Write>(writer: W, rows: &[ExportRow]) -> Result<(), ExportError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer.write_record(EXPORT_HEADER)?;
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;
    use crime_grid_crime_models::LocationKey;
    use geo::Point;

    use super::*;

    fn city() -> City {
        City {
            id: 1,
            name: "CHICAGO".to_string(),
            state: "ILLINOIS".to_string(),
            country: "UNITED STATES OF AMERICA".to_string(),
            location: Point::new(-87.6298, 41.8781),
        }
    }

    fn incident(
        city_id: CityId,
        category: CrimeCategory,
        datetime: &str,
        hour: u32,
    ) -> Incident {
        Incident {
            category,
            location_kind: LocationKind::new(
                LocationKey::Outdoor,
                LocationKey::Public,
                LocationKey::Street,
            ),
            city_id,
            block_id: 5,
            point: Point::new(-87.63, 41.88),
            datetime: NaiveDateTime::parse_from_str(datetime, "%Y-%m-%d %H:%M:%S").unwrap(),
            hour,
        }
    }

    #[test]
    fn city_filter_is_always_applied() {
        let incidents = vec![
            incident(1, CrimeCategory::Theft, "2023-06-15 14:30:00", 14),
            incident(2, CrimeCategory::Theft, "2023-06-15 14:30:00", 14),
        ];
        let rows = export_rows(&incidents, &city(), &IncidentFilter::for_city(1));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].city, "CHICAGO");
    }

    #[test]
    fn date_bounds_are_inclusive() {
        let incidents = vec![
            incident(1, CrimeCategory::Theft, "2023-01-01 08:00:00", 8),
            incident(1, CrimeCategory::Theft, "2023-06-15 08:00:00", 8),
            incident(1, CrimeCategory::Theft, "2023-12-31 08:00:00", 8),
            incident(1, CrimeCategory::Theft, "2024-01-01 08:00:00", 8),
        ];
        let mut filter = IncidentFilter::for_city(1);
        filter.start_date = NaiveDate::from_ymd_opt(2023, 1, 1);
        filter.end_date = NaiveDate::from_ymd_opt(2023, 12, 31);
        let rows = export_rows(&incidents, &city(), &filter);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn hour_bounds_are_inclusive() {
        let incidents = vec![
            incident(1, CrimeCategory::Theft, "2023-06-15 07:00:00", 7),
            incident(1, CrimeCategory::Theft, "2023-06-15 08:00:00", 8),
            incident(1, CrimeCategory::Theft, "2023-06-15 17:00:00", 17),
            incident(1, CrimeCategory::Theft, "2023-06-15 18:00:00", 18),
        ];
        let mut filter = IncidentFilter::for_city(1);
        filter.start_hour = 8;
        filter.end_hour = 17;
        let rows = export_rows(&incidents, &city(), &filter);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn list_filters_match_membership() {
        let incidents = vec![
            incident(1, CrimeCategory::Theft, "2023-06-15 14:00:00", 14),
            incident(1, CrimeCategory::Homicide, "2023-06-15 14:00:00", 14),
            // 2023-06-17 is a Saturday.
            incident(1, CrimeCategory::Theft, "2023-06-17 14:00:00", 14),
        ];

        let mut filter = IncidentFilter::for_city(1);
        filter.categories = Some(vec![CrimeCategory::Theft]);
        assert_eq!(export_rows(&incidents, &city(), &filter).len(), 2);

        let mut filter = IncidentFilter::for_city(1);
        filter.dows = Some(vec![5, 6]);
        assert_eq!(export_rows(&incidents, &city(), &filter).len(), 1);

        let mut filter = IncidentFilter::for_city(1);
        filter.location_kinds = Some(vec![LocationKind::OTHER]);
        assert!(export_rows(&incidents, &city(), &filter).is_empty());
    }

    #[test]
    fn rows_flatten_the_point_and_keys() {
        let incidents = vec![incident(1, CrimeCategory::Theft, "2023-06-15 14:30:00", 14)];
        let rows = export_rows(&incidents, &city(), &IncidentFilter::for_city(1));
        let row = &rows[0];
        assert!((row.latitude - 41.88).abs() < f64::EPSILON);
        assert!((row.longitude - -87.63).abs() < f64::EPSILON);
        assert_eq!(row.category, "THEFT");
        assert_eq!(row.location_key1, "OUTDOOR");
        assert_eq!(row.location_key3, "STREET");
        assert_eq!(row.datetime, "2023-06-15 14:30:00");
    }

    #[test]
    fn csv_output_has_a_header_and_one_line_per_row() {
        let incidents = vec![
            incident(1, CrimeCategory::Theft, "2023-06-15 14:30:00", 14),
            incident(1, CrimeCategory::Homicide, "2023-06-15 15:30:00", 15),
        ];
        let rows = export_rows(&incidents, &city(), &IncidentFilter::for_city(1));
        let mut buffer = Vec::new();
        write_csv(&mut buffer, &rows).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("city,state,country,datetime,latitude,longitude,category"));
        assert!(lines[1].contains("THEFT"));
    }

    #[test]
    fn empty_exports_still_write_the_header() {
        let mut buffer = Vec::new();
        write_csv(&mut buffer, &[]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text.trim_end(),
            "city,state,country,datetime,latitude,longitude,category,\
             location_key1,location_key2,location_key3"
        );
    }
}
