#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch CLI for the crime grid pipeline.
//!
//! Every subcommand reads CSV/GeoJSON files and writes CSV bulk-load
//! files; nothing here talks to a database. Outputs are written to a
//! temporary file and renamed into place, so a failed run never leaves a
//! partial file behind.

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, Subcommand};
use crime_grid_aggregate::{IncidentFact, TimeWindow, aggregate, build_tensors};
use crime_grid_crime_models::{CrimeCategory, LocationKind};
use crime_grid_export::{IncidentFilter, export_rows};
use crime_grid_geography::prepare::{blocks_from_tracts, read_population_counts, zip_rows};
use crime_grid_geography::{Block, BlockId, BlockRow, City, CityId, geometry};
use crime_grid_ingest::{Catalog, IncidentRow, SourceSpec, read_incidents};
use crime_grid_normalize::Taxonomy;
use crime_grid_spatial::BlockIndex;
use geo::Point;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "crime_grid", about = "Crime incident grid pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich a raw city CSV into incident bulk-load rows
    Ingest {
        /// Source layout: "chicago" or "los_angeles"
        source: String,
        /// Raw incident CSV from the city's data portal
        #[arg(long)]
        input: PathBuf,
        /// Block bulk rows CSV (id,cityid,shape,population)
        #[arg(long)]
        blocks: PathBuf,
        /// Output incident bulk rows CSV
        #[arg(long)]
        output: PathBuf,
        /// City id stamped on every row
        #[arg(long, default_value = "1")]
        city_id: CityId,
        /// Also write crimetype/locdesctype catalog CSVs next to the output
        #[arg(long)]
        catalogs: bool,
    },
    /// Aggregate incident rows into per-block feature tensors
    Tensors {
        /// Enriched incident bulk rows CSV (from `ingest`)
        #[arg(long)]
        incidents: PathBuf,
        /// Block bulk rows CSV (id,cityid,shape,population)
        #[arg(long)]
        blocks: PathBuf,
        /// Output CSV of (id, prediction hex, month, year) rows
        #[arg(long)]
        output: PathBuf,
        /// Lookback window length in whole months
        #[arg(long, default_value = "24")]
        months: usize,
        /// Reference date (YYYY-MM-DD); the window ends just before its
        /// month. Defaults to today.
        #[arg(long)]
        reference: Option<NaiveDate>,
    },
    /// Export a filtered flat CSV of normalized incidents
    Export {
        /// Source layout: "chicago" or "los_angeles"
        source: String,
        /// Raw incident CSV from the city's data portal
        #[arg(long)]
        input: PathBuf,
        /// Block bulk rows CSV (id,cityid,shape,population)
        #[arg(long)]
        blocks: PathBuf,
        /// Output flat CSV
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value = "1")]
        city_id: CityId,
        /// Earliest date kept, inclusive (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<NaiveDate>,
        /// Latest date kept, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<NaiveDate>,
        /// Earliest hour kept, inclusive
        #[arg(long, default_value = "0")]
        start_hour: u32,
        /// Latest hour kept, inclusive
        #[arg(long, default_value = "23")]
        end_hour: u32,
        /// Comma-separated days of week kept (0-6, Monday is 0)
        #[arg(long)]
        dows: Option<String>,
        /// Comma-separated canonical categories (e.g. "THEFT,HOMICIDE")
        #[arg(long)]
        categories: Option<String>,
        /// Comma-separated location key paths (e.g. "OUTDOOR/PUBLIC/STREET")
        #[arg(long)]
        locations: Option<String>,
    },
    /// Build block bulk rows from tract GeoJSON and a population CSV
    PrepareBlocks {
        /// Tract boundary GeoJSON feature collection
        #[arg(long)]
        tracts: PathBuf,
        /// Per-unit population CSV
        #[arg(long)]
        populations: PathBuf,
        /// Population CSV column holding the unit geoid
        #[arg(long, default_value = "CENSUS BLOCK FULL")]
        id_column: String,
        /// Population CSV column holding the resident count
        #[arg(long, default_value = "TOTAL POPULATION")]
        population_column: String,
        #[arg(long, default_value = "1")]
        city_id: CityId,
        /// Id assigned to the first block row
        #[arg(long, default_value = "1")]
        first_id: BlockId,
        /// Output block bulk rows CSV
        #[arg(long)]
        output: PathBuf,
    },
    /// Build zipcode bulk rows from a ZCTA GeoJSON feature collection
    PrepareZips {
        /// ZCTA boundary GeoJSON feature collection
        #[arg(long)]
        zctas: PathBuf,
        /// Comma-separated zipcodes to keep
        #[arg(long)]
        zipcodes: Option<String>,
        /// File with one zipcode to keep per line
        #[arg(long)]
        zipcodes_file: Option<PathBuf>,
        #[arg(long, default_value = "1")]
        city_id: CityId,
        /// Output zipcode bulk rows CSV
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            source,
            input,
            blocks,
            output,
            city_id,
            catalogs,
        } => run_ingest(&source, &input, &blocks, &output, city_id, catalogs),
        Commands::Tensors {
            incidents,
            blocks,
            output,
            months,
            reference,
        } => run_tensors(&incidents, &blocks, &output, months, reference),
        Commands::Export {
            source,
            input,
            blocks,
            output,
            city_id,
            start_date,
            end_date,
            start_hour,
            end_hour,
            dows,
            categories,
            locations,
        } => {
            let mut filter = IncidentFilter::for_city(city_id);
            filter.start_date = start_date;
            filter.end_date = end_date;
            filter.start_hour = start_hour;
            filter.end_hour = end_hour;
            filter.dows = dows.as_deref().map(parse_dows).transpose()?;
            filter.categories = categories.as_deref().map(parse_categories).transpose()?;
            filter.location_kinds = locations.as_deref().map(parse_locations).transpose()?;
            run_export(&source, &input, &blocks, &output, city_id, &filter)
        }
        Commands::PrepareBlocks {
            tracts,
            populations,
            id_column,
            population_column,
            city_id,
            first_id,
            output,
        } => run_prepare_blocks(
            &tracts,
            &populations,
            &id_column,
            &population_column,
            city_id,
            first_id,
            &output,
        ),
        Commands::PrepareZips {
            zctas,
            zipcodes,
            zipcodes_file,
            city_id,
            output,
        } => run_prepare_zips(
            &zctas,
            zipcodes.as_deref(),
            zipcodes_file.as_deref(),
            city_id,
            &output,
        ),
    }
}

fn run_ingest(
    source: &str,
    input: &Path,
    blocks_path: &Path,
    output: &Path,
    city_id: CityId,
    catalogs: bool,
) -> Result<(), Box<dyn Error>> {
    let started = Instant::now();
    let spec = source_spec(source)?;
    let taxonomy = Taxonomy::builtin();
    let blocks = load_blocks(blocks_path)?;
    let index = BlockIndex::build(&blocks);

    let file = fs::File::open(input)?;
    let (incidents, stats) = read_incidents(file, &spec, &taxonomy, &index, city_id)?;
    stats.log(&spec.name);

    let catalog = Catalog::new(&taxonomy);
    let rows: Vec<IncidentRow> = incidents
        .iter()
        .map(|incident| IncidentRow::new(incident, &catalog))
        .collect();
    write_rows_atomic(output, &rows)?;

    if catalogs {
        let dir = output.parent().unwrap_or_else(|| Path::new("."));
        write_rows_atomic(&dir.join("crimetypes.csv"), &Catalog::crime_rows())?;
        write_rows_atomic(&dir.join("locdesctypes.csv"), &catalog.location_rows())?;
    }

    log::info!(
        "Wrote {} incident rows to {} in {:?}",
        rows.len(),
        output.display(),
        started.elapsed(),
    );
    Ok(())
}

/// Output row of the `tensors` subcommand: one encoded tensor per block,
/// stamped with the month/year it was computed.
#[derive(Debug, Serialize)]
struct PredictionRow {
    id: BlockId,
    /// Hex-encoded tensor blob.
    prediction: String,
    month: u32,
    year: i32,
}

fn run_tensors(
    incidents: &Path,
    blocks_path: &Path,
    output: &Path,
    months: usize,
    reference: Option<NaiveDate>,
) -> Result<(), Box<dyn Error>> {
    let started = Instant::now();
    let reference = reference.unwrap_or_else(|| Local::now().date_naive());
    let window = TimeWindow::lookback(reference, months)?;

    let mut facts = Vec::new();
    let mut unknown_categories = 0_usize;
    let mut reader = csv::Reader::from_path(incidents)?;
    for row in reader.deserialize() {
        let row: IncidentRow = row?;
        let Some(category) = category_for_id(row.crimetypeid) else {
            unknown_categories += 1;
            continue;
        };
        facts.push(IncidentFact {
            block_id: row.blockid,
            year: row.year,
            month: row.month,
            dow: row.dow,
            hour: row.hour,
            severity_weight: category.severity().weight(),
        });
    }
    if unknown_categories > 0 {
        log::warn!("Skipped {unknown_categories} incident rows with unknown crime type ids");
    }

    let blocks = load_blocks(blocks_path)?;
    let populations: BTreeMap<BlockId, u32> = blocks
        .iter()
        .map(|block| (block.id, block.population))
        .collect();

    let buckets = aggregate(&facts, &populations, window);
    let tensors = build_tensors(&buckets, window)?;

    let rows: Vec<PredictionRow> = tensors
        .iter()
        .map(|(id, tensor)| PredictionRow {
            id: *id,
            prediction: tensor.to_hex(),
            month: reference.month(),
            year: reference.year(),
        })
        .collect();
    write_rows_atomic(output, &rows)?;

    log::info!(
        "Wrote {} block tensors ({} months each) to {} in {:?}",
        rows.len(),
        window.months(),
        output.display(),
        started.elapsed(),
    );
    Ok(())
}

fn run_export(
    source: &str,
    input: &Path,
    blocks_path: &Path,
    output: &Path,
    city_id: CityId,
    filter: &IncidentFilter,
) -> Result<(), Box<dyn Error>> {
    let started = Instant::now();
    let spec = source_spec(source)?;
    let city = source_city(&spec.name, city_id);
    let taxonomy = Taxonomy::builtin();
    let blocks = load_blocks(blocks_path)?;
    let index = BlockIndex::build(&blocks);

    let file = fs::File::open(input)?;
    let (incidents, stats) = read_incidents(file, &spec, &taxonomy, &index, city_id)?;
    stats.log(&spec.name);

    let rows = export_rows(&incidents, &city, filter);
    let mut buffer = Vec::new();
    crime_grid_export::write_csv(&mut buffer, &rows)?;
    write_bytes_atomic(output, &buffer)?;

    log::info!(
        "Wrote {} export rows to {} in {:?}",
        rows.len(),
        output.display(),
        started.elapsed(),
    );
    Ok(())
}

fn run_prepare_blocks(
    tracts: &Path,
    populations: &Path,
    id_column: &str,
    population_column: &str,
    city_id: CityId,
    first_id: BlockId,
    output: &Path,
) -> Result<(), Box<dyn Error>> {
    let started = Instant::now();
    let counts = read_population_counts(fs::File::open(populations)?, id_column, population_column)?;
    let geojson = fs::read_to_string(tracts)?;
    let rows = blocks_from_tracts(&geojson, &counts, city_id, first_id)?;
    write_rows_atomic(output, &rows)?;
    log::info!(
        "Wrote {} block rows to {} in {:?}",
        rows.len(),
        output.display(),
        started.elapsed(),
    );
    Ok(())
}

fn run_prepare_zips(
    zctas: &Path,
    zipcodes: Option<&str>,
    zipcodes_file: Option<&Path>,
    city_id: CityId,
    output: &Path,
) -> Result<(), Box<dyn Error>> {
    let started = Instant::now();
    let mut allowlist = BTreeSet::new();
    if let Some(list) = zipcodes {
        for zip in list.split(',') {
            let zip = zip.trim();
            if !zip.is_empty() {
                allowlist.insert(zip.to_string());
            }
        }
    }
    if let Some(path) = zipcodes_file {
        for line in fs::read_to_string(path)?.lines() {
            let line = line.trim();
            if !line.is_empty() {
                allowlist.insert(line.to_string());
            }
        }
    }
    if allowlist.is_empty() {
        return Err("No zipcodes given; pass --zipcodes or --zipcodes-file".into());
    }

    let geojson = fs::read_to_string(zctas)?;
    let rows = zip_rows(&geojson, &allowlist, city_id)?;
    write_rows_atomic(output, &rows)?;
    log::info!(
        "Wrote {} zipcode rows to {} in {:?}",
        rows.len(),
        output.display(),
        started.elapsed(),
    );
    Ok(())
}

fn source_spec(name: &str) -> Result<SourceSpec, Box<dyn Error>> {
    match name {
        "chicago" => Ok(SourceSpec::chicago()),
        "los_angeles" | "la" => Ok(SourceSpec::los_angeles()),
        other => Err(format!("Unknown source {other:?}; expected chicago or los_angeles").into()),
    }
}

fn source_city(name: &str, city_id: CityId) -> City {
    if name == "los_angeles" {
        City {
            id: city_id,
            name: "LOS ANGELES".to_string(),
            state: "CALIFORNIA".to_string(),
            country: "UNITED STATES OF AMERICA".to_string(),
            location: Point::new(-118.2437, 34.0522),
        }
    } else {
        City {
            id: city_id,
            name: "CHICAGO".to_string(),
            state: "ILLINOIS".to_string(),
            country: "UNITED STATES OF AMERICA".to_string(),
            location: Point::new(-87.6298, 41.8781),
        }
    }
}

/// Maps a bulk-row crime type id back to its category.
fn category_for_id(id: i64) -> Option<CrimeCategory> {
    usize::try_from(id)
        .ok()
        .and_then(|i| i.checked_sub(1))
        .and_then(|i| CrimeCategory::all().get(i))
        .copied()
}

fn load_blocks(path: &Path) -> Result<Vec<Block>, Box<dyn Error>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut blocks = Vec::new();
    for row in reader.deserialize() {
        let row: BlockRow = row?;
        let boundary = geometry::parse_multipolygon(&row.shape)?;
        blocks.push(Block {
            id: row.id,
            city_id: row.cityid,
            boundary,
            population: u32::try_from(row.population.max(0)).unwrap_or(u32::MAX),
            prediction: None,
            stamped: None,
        });
    }
    log::info!("Loaded {} blocks from {}", blocks.len(), path.display());
    Ok(blocks)
}

fn parse_dows(text: &str) -> Result<Vec<u32>, Box<dyn Error>> {
    let mut dows = Vec::new();
    for part in text.split(',') {
        let part = part.trim();
        let dow: u32 = part
            .parse()
            .map_err(|_| format!("Invalid day of week {part:?}; expected 0-6"))?;
        if dow > 6 {
            return Err(format!("Day of week {dow} out of range; expected 0-6").into());
        }
        dows.push(dow);
    }
    Ok(dows)
}

fn parse_categories(text: &str) -> Result<Vec<CrimeCategory>, Box<dyn Error>> {
    let mut categories = Vec::new();
    for part in text.split(',') {
        let part = part.trim();
        categories.push(
            part.parse()
                .map_err(|_| format!("Unknown crime category {part:?}"))?,
        );
    }
    Ok(categories)
}

fn parse_locations(text: &str) -> Result<Vec<LocationKind>, Box<dyn Error>> {
    let mut kinds = Vec::new();
    for part in text.split(',') {
        let part = part.trim();
        kinds.push(
            part.parse()
                .map_err(|_| format!("Invalid location key path {part:?}"))?,
        );
    }
    Ok(kinds)
}

/// Serializes rows as CSV to a temp file, then renames it into place.
fn write_rows_atomic<S: Serialize>(path: &Path, rows: &[S]) -> Result<(), Box<dyn Error>> {
    let tmp = path.with_extension("tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Writes bytes to a temp file, then renames it into place.
fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), Box<dyn Error>> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_id_roundtrip() {
        for category in CrimeCategory::all() {
            let id = Catalog::crime_id(*category);
            assert_eq!(category_for_id(id), Some(*category));
        }
        assert_eq!(category_for_id(0), None);
        assert_eq!(category_for_id(-3), None);
        assert_eq!(category_for_id(1000), None);
    }

    #[test]
    fn filter_list_parsing() {
        assert_eq!(parse_dows("5, 6").unwrap(), vec![5, 6]);
        assert!(parse_dows("7").is_err());
        assert!(parse_dows("x").is_err());

        assert_eq!(
            parse_categories("THEFT, HOMICIDE").unwrap(),
            vec![CrimeCategory::Theft, CrimeCategory::Homicide]
        );
        assert!(parse_categories("NOT_A_CATEGORY").is_err());

        let kinds = parse_locations("OUTDOOR/PUBLIC/STREET").unwrap();
        assert_eq!(kinds.len(), 1);
        assert!(parse_locations("OUTDOOR/PUBLIC").is_err());
    }

    #[test]
    fn unknown_source_is_an_error() {
        assert!(source_spec("chicago").is_ok());
        assert!(source_spec("la").is_ok());
        assert!(source_spec("springfield").is_err());
    }
}
