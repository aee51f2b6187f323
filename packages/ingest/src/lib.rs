#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident enrichment pipeline.
//!
//! Reads a city's raw incident CSV, normalizes crime and location text,
//! resolves each point to its containing block, and derives the time
//! fields aggregation buckets on. Rows that cannot be enriched (missing
//! coordinates, unparseable timestamps, no containing block) are dropped
//! and counted per reason rather than failing the run.
//!
//! Cities publish wildly different column layouts; a [`SourceSpec`]
//! describes one city's layout so a single reader handles all of them.

use std::collections::BTreeMap;
use std::io::Read;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use crime_grid_crime_models::{CrimeCategory, LocationKind};
use crime_grid_geography::{BlockId, CityId};
use crime_grid_normalize::Taxonomy;
use crime_grid_spatial::BlockIndex;
use geo::Point;
use serde::{Deserialize, Serialize};

/// Errors raised while reading a source CSV.
///
/// Per-row data problems are not errors; they become [`DropStats`] counts.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The CSV itself failed to parse.
    #[error("Failed to read source CSV: {0}")]
    Csv(#[from] csv::Error),

    /// The CSV header is missing a column the source spec names.
    #[error("Source CSV missing column {name:?}")]
    MissingColumn {
        /// The column looked for.
        name: String,
    },
}

/// Where a record's coordinates live in the source CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointColumns {
    /// Separate longitude and latitude columns.
    Split {
        longitude: String,
        latitude: String,
    },
    /// One `(lat, lng)` pair column.
    LatLngPair {
        column: String,
    },
}

/// Column layout and formats of one city's incident CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: String,
    /// Column holding the coarse crime type.
    pub primary_type_column: String,
    /// Optional column with a finer free-text description, tried when the
    /// primary type has no table entry.
    pub description_column: Option<String>,
    /// Column holding the premise/location description.
    pub location_column: String,
    pub point: PointColumns,
    pub datetime_column: String,
    /// `chrono` format string. Date-only formats are accepted; the time
    /// defaults to midnight.
    pub datetime_format: String,
    /// Optional military-time (`HHMM`) column overriding the timestamp's
    /// hour, for sources whose timestamp carries no time of day.
    pub hour_column: Option<String>,
}

impl SourceSpec {
    /// The Chicago data portal layout.
    #[must_use]
    pub fn chicago() -> Self {
        Self {
            name: "chicago".to_string(),
            primary_type_column: "Primary Type".to_string(),
            description_column: Some("Description".to_string()),
            location_column: "Location Description".to_string(),
            point: PointColumns::Split {
                longitude: "Longitude".to_string(),
                latitude: "Latitude".to_string(),
            },
            datetime_column: "Date".to_string(),
            datetime_format: "%m/%d/%Y %I:%M:%S %p".to_string(),
            hour_column: None,
        }
    }

    /// The Los Angeles open data layout.
    ///
    /// The `Location ` column name really does carry a trailing space, and
    /// `Date Occurred` has no time of day; `Time Occurred` holds military
    /// time.
    #[must_use]
    pub fn los_angeles() -> Self {
        Self {
            name: "los_angeles".to_string(),
            primary_type_column: "Crime Code Description".to_string(),
            description_column: None,
            location_column: "Premise Description".to_string(),
            point: PointColumns::LatLngPair {
                column: "Location ".to_string(),
            },
            datetime_column: "Date Occurred".to_string(),
            datetime_format: "%m/%d/%Y".to_string(),
            hour_column: Some("Time Occurred".to_string()),
        }
    }
}

/// Per-reason counts of rows dropped during enrichment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropStats {
    /// Rows read from the source.
    pub read: usize,
    /// Rows kept.
    pub kept: usize,
    /// Missing or unparseable coordinates.
    pub missing_coordinates: usize,
    /// Unparseable timestamp or out-of-range hour.
    pub bad_timestamp: usize,
    /// No block polygon contains the point.
    pub unresolved_block: usize,
}

impl DropStats {
    /// Logs the counts at `info`, drops at `warn` when any occurred.
    pub fn log(&self, source: &str) {
        log::info!("{source}: kept {} of {} rows", self.kept, self.read);
        let dropped = self.read - self.kept;
        if dropped > 0 {
            log::warn!(
                "{source}: dropped {dropped} rows ({} missing coordinates, {} bad timestamps, {} outside all blocks)",
                self.missing_coordinates,
                self.bad_timestamp,
                self.unresolved_block,
            );
        }
    }
}

/// One fully enriched incident.
#[derive(Debug, Clone, PartialEq)]
pub struct Incident {
    pub category: CrimeCategory,
    pub location_kind: LocationKind,
    pub city_id: CityId,
    pub block_id: BlockId,
    pub point: Point<f64>,
    pub datetime: NaiveDateTime,
    /// `0..=23`. Normally the timestamp's hour; sources with a separate
    /// time column override it.
    pub hour: u32,
}

impl Incident {
    /// Day of week, `0..=6` with Monday as `0`.
    #[must_use]
    pub fn dow(&self) -> u32 {
        self.datetime.weekday().num_days_from_monday()
    }

    /// Month, `1..=12`.
    #[must_use]
    pub fn month(&self) -> u32 {
        self.datetime.month()
    }

    /// Calendar year.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.datetime.year()
    }
}

struct ColumnIndices {
    primary_type: usize,
    description: Option<usize>,
    location: usize,
    point: PointIndices,
    datetime: usize,
    hour: Option<usize>,
}

enum PointIndices {
    Split { longitude: usize, latitude: usize },
    LatLngPair { column: usize },
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, IngestError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| IngestError::MissingColumn {
            name: name.to_string(),
        })
}

impl ColumnIndices {
    fn resolve(headers: &csv::StringRecord, spec: &SourceSpec) -> Result<Self, IngestError> {
        let point = match &spec.point {
            PointColumns::Split {
                longitude,
                latitude,
            } => PointIndices::Split {
                longitude: column_index(headers, longitude)?,
                latitude: column_index(headers, latitude)?,
            },
            PointColumns::LatLngPair { column } => PointIndices::LatLngPair {
                column: column_index(headers, column)?,
            },
        };
        let description = spec
            .description_column
            .as_deref()
            .map(|name| column_index(headers, name))
            .transpose()?;
        let hour = spec
            .hour_column
            .as_deref()
            .map(|name| column_index(headers, name))
            .transpose()?;
        Ok(Self {
            primary_type: column_index(headers, &spec.primary_type_column)?,
            description,
            location: column_index(headers, &spec.location_column)?,
            point,
            datetime: column_index(headers, &spec.datetime_column)?,
            hour,
        })
    }
}

/// Reads a source CSV and enriches every parseable row.
///
/// Rows are normalized against `taxonomy`, resolved against `index`, and
/// stamped with `city_id`. Returns the kept incidents and the per-reason
/// drop counts; callers should log the stats.
///
/// # Errors
///
/// Returns [`IngestError`] if the CSV is malformed or a column named by
/// `spec` is absent. Row-level data problems never error.
pub fn read_incidents<R: Read>(
    reader: R,
    spec: &SourceSpec,
    taxonomy: &Taxonomy,
    index: &BlockIndex,
    city_id: CityId,
) -> Result<(Vec<Incident>, DropStats), IngestError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let columns = ColumnIndices::resolve(&headers, spec)?;

    let mut incidents = Vec::new();
    let mut stats = DropStats::default();

    for record in csv_reader.records() {
        let record = record?;
        stats.read += 1;

        let Some(point) = parse_point(&record, &columns.point) else {
            stats.missing_coordinates += 1;
            continue;
        };

        let datetime_text = record.get(columns.datetime).unwrap_or("").trim();
        let Some(datetime) = parse_datetime(datetime_text, &spec.datetime_format) else {
            stats.bad_timestamp += 1;
            continue;
        };
        let hour = match columns.hour {
            Some(column) => {
                let Some(hour) = parse_military_hour(record.get(column).unwrap_or("")) else {
                    stats.bad_timestamp += 1;
                    continue;
                };
                hour
            }
            None => datetime.hour(),
        };

        let Some(block_id) = index.resolve(point.x(), point.y()) else {
            stats.unresolved_block += 1;
            continue;
        };

        let primary_type = record.get(columns.primary_type).unwrap_or("");
        let description = columns
            .description
            .and_then(|column| record.get(column))
            .unwrap_or("");
        let location_text = record.get(columns.location).unwrap_or("");

        incidents.push(Incident {
            category: taxonomy.normalize_crime(primary_type, description),
            location_kind: taxonomy.normalize_location(location_text),
            city_id,
            block_id,
            point,
            datetime,
            hour,
        });
        stats.kept += 1;
    }

    Ok((incidents, stats))
}

fn parse_point(record: &csv::StringRecord, columns: &PointIndices) -> Option<Point<f64>> {
    match columns {
        PointIndices::Split {
            longitude,
            latitude,
        } => {
            let lng: f64 = record.get(*longitude)?.trim().parse().ok()?;
            let lat: f64 = record.get(*latitude)?.trim().parse().ok()?;
            Some(Point::new(lng, lat))
        }
        PointIndices::LatLngPair { column } => {
            let text = record.get(*column)?.trim();
            let inner = text.strip_prefix('(')?.strip_suffix(')')?;
            let (lat, lng) = inner.split_once(',')?;
            let lat: f64 = lat.trim().parse().ok()?;
            let lng: f64 = lng.trim().parse().ok()?;
            Some(Point::new(lng, lat))
        }
    }
}

fn parse_datetime(text: &str, format: &str) -> Option<NaiveDateTime> {
    if text.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(text, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, format)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Parses military time (`HHMM`, possibly without leading zeros) into an
/// hour.
fn parse_military_hour(text: &str) -> Option<u32> {
    let value: u32 = text.trim().parse().ok()?;
    let hour = value / 100;
    let minute = value % 100;
    (hour <= 23 && minute <= 59).then_some(hour)
}

/// Stable catalog ids for categories and location kinds.
///
/// Bulk-load incident rows reference crime types and location kinds by id.
/// Ids are assigned deterministically (1-based, sorted order) so the
/// catalog tables and the incident rows produced in the same run agree.
#[derive(Debug, Clone)]
pub struct Catalog {
    location_ids: BTreeMap<LocationKind, i64>,
}

impl Catalog {
    /// Builds the catalog for a taxonomy's vocabulary.
    #[must_use]
    pub fn new(taxonomy: &Taxonomy) -> Self {
        let location_ids = taxonomy
            .location_kinds()
            .into_iter()
            .zip(1_i64..)
            .collect();
        Self { location_ids }
    }

    /// Id of a crime category.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn crime_id(category: CrimeCategory) -> i64 {
        CrimeCategory::all()
            .iter()
            .position(|c| *c == category)
            .map_or(0, |i| i as i64 + 1)
    }

    /// Id of a location kind. Unknown kinds get the `OTHER` fallback's id.
    #[must_use]
    pub fn location_id(&self, kind: LocationKind) -> i64 {
        self.location_ids
            .get(&kind)
            .or_else(|| self.location_ids.get(&LocationKind::OTHER))
            .copied()
            .unwrap_or(0)
    }

    /// Bulk-load rows for the `crimetype` table.
    #[must_use]
    pub fn crime_rows() -> Vec<CrimeTypeRow> {
        CrimeCategory::all()
            .iter()
            .map(|category| CrimeTypeRow {
                category: category.to_string(),
                severity: category.severity().value(),
            })
            .collect()
    }

    /// Bulk-load rows for the `locdesctype` table.
    #[must_use]
    pub fn location_rows(&self) -> Vec<LocationTypeRow> {
        self.location_ids
            .keys()
            .map(|kind| LocationTypeRow {
                key1: kind.key1.to_string(),
                key2: kind.key2.to_string(),
                key3: kind.key3.to_string(),
            })
            .collect()
    }
}

/// Bulk-load row for the `crimetype` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrimeTypeRow {
    pub category: String,
    pub severity: u8,
}

/// Bulk-load row for the `locdesctype` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationTypeRow {
    pub key1: String,
    pub key2: String,
    pub key3: String,
}

/// Bulk-load row for the `incident` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRow {
    pub crimetypeid: i64,
    pub locdescid: i64,
    pub cityid: CityId,
    pub blockid: BlockId,
    /// WKT `POINT(lng lat)`.
    pub location: String,
    /// `YYYY-MM-DD HH:MM:SS`.
    pub datetime: String,
    pub hour: u32,
    pub dow: u32,
    pub month: u32,
    pub year: i32,
}

impl IncidentRow {
    /// Flattens an enriched incident into its bulk-load row.
    #[must_use]
    pub fn new(incident: &Incident, catalog: &Catalog) -> Self {
        Self {
            crimetypeid: Catalog::crime_id(incident.category),
            locdescid: catalog.location_id(incident.location_kind),
            cityid: incident.city_id,
            blockid: incident.block_id,
            location: crime_grid_geography::geometry::point_to_wkt(&incident.point),
            datetime: incident.datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            hour: incident.hour,
            dow: incident.dow(),
            month: incident.month(),
            year: incident.year(),
        }
    }
}
