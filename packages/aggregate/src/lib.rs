#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Severity aggregation over a monthly lookback window.
//!
//! Incidents are grouped into `(block, year, month, day-of-week, hour)`
//! buckets. Each bucket's rate is the sum of severity weights divided by
//! the block's population; rates are then normalized to `[0, 1]` by the
//! largest rate in the window. Blocks with zero or unknown population are
//! excluded. The normalized buckets pack into one fixed-shape tensor per
//! block.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use crime_grid_geography::BlockId;
use crime_grid_tensor::{FeatureTensor, FormatError, TensorShape};

/// Errors raised while constructing aggregation windows.
#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    /// The window's start is not strictly before its end.
    #[error("Window start {start_year}-{start_month:02} is not before end {end_year}-{end_month:02}")]
    Empty {
        start_year: i32,
        start_month: u32,
        end_year: i32,
        end_month: u32,
    },

    /// A month outside `1..=12`.
    #[error("Month {month} out of range")]
    BadMonth {
        /// The offending month number.
        month: u32,
    },
}

/// A half-open `[start, end)` range of whole months.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Months since year zero of the first month in the window.
    start: i64,
    /// Months since year zero of the first month past the window.
    end: i64,
}

#[allow(clippy::cast_lossless)]
const fn month_ordinal(year: i32, month: u32) -> i64 {
    year as i64 * 12 + month as i64 - 1
}

impl TimeWindow {
    /// A window from `(start_year, start_month)` inclusive to
    /// `(end_year, end_month)` exclusive. Months are `1..=12`.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError`] for out-of-range months or an empty range.
    #[allow(clippy::manual_range_contains)]
    pub const fn new(
        start_year: i32,
        start_month: u32,
        end_year: i32,
        end_month: u32,
    ) -> Result<Self, WindowError> {
        if start_month < 1 || start_month > 12 {
            return Err(WindowError::BadMonth { month: start_month });
        }
        if end_month < 1 || end_month > 12 {
            return Err(WindowError::BadMonth { month: end_month });
        }
        let start = month_ordinal(start_year, start_month);
        let end = month_ordinal(end_year, end_month);
        if start >= end {
            return Err(WindowError::Empty {
                start_year,
                start_month,
                end_year,
                end_month,
            });
        }
        Ok(Self { start, end })
    }

    /// The rolling window of `months` whole months ending just before the
    /// month containing `reference`.
    ///
    /// A reference of 2024-03-15 with a 24-month lookback yields
    /// `[2022-03, 2024-03)`: the reference's own partial month is excluded.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::Empty`] when `months` is zero.
    #[allow(clippy::cast_possible_wrap)]
    pub fn lookback(reference: NaiveDate, months: usize) -> Result<Self, WindowError> {
        if months == 0 {
            return Err(WindowError::Empty {
                start_year: reference.year(),
                start_month: reference.month(),
                end_year: reference.year(),
                end_month: reference.month(),
            });
        }
        let end = month_ordinal(reference.year(), reference.month());
        Ok(Self {
            start: end - months as i64,
            end,
        })
    }

    /// Number of whole months covered.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn months(self) -> usize {
        (self.end - self.start) as usize
    }

    /// Whether `(year, month)` falls inside the window.
    #[must_use]
    pub const fn contains(self, year: i32, month: u32) -> bool {
        let ordinal = month_ordinal(year, month);
        ordinal >= self.start && ordinal < self.end
    }

    /// Months since the window start, or `None` outside the window.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn month_offset(self, year: i32, month: u32) -> Option<usize> {
        if !self.contains(year, month) {
            return None;
        }
        Some((month_ordinal(year, month) - self.start) as usize)
    }

    /// The tensor shape this window's aggregates pack into.
    #[must_use]
    pub const fn tensor_shape(self) -> TensorShape {
        TensorShape::new(self.months())
    }
}

/// The grouping key of one aggregation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BucketKey {
    pub block_id: BlockId,
    pub year: i32,
    /// `1..=12`.
    pub month: u32,
    /// `0..=6`, Monday is `0`.
    pub dow: u32,
    /// `0..=23`.
    pub hour: u32,
}

/// One incident reduced to the fields aggregation needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncidentFact {
    pub block_id: BlockId,
    pub year: i32,
    /// `1..=12`.
    pub month: u32,
    /// `0..=6`, Monday is `0`.
    pub dow: u32,
    /// `0..=23`.
    pub hour: u32,
    pub severity_weight: f64,
}

/// Groups incidents into buckets and normalizes the rates to `[0, 1]`.
///
/// A bucket's raw rate is the sum of its incidents' severity weights
/// divided by the block population. Incidents outside `window` and blocks
/// absent from `populations` or with zero population are excluded; a second
/// pass divides every rate by the window maximum, so unless all rates are
/// zero at least one bucket is exactly `1.0`. Iteration over the result is
/// sorted by key, making reruns over the same input byte-identical.
#[must_use]
pub fn aggregate(
    facts: &[IncidentFact],
    populations: &BTreeMap<BlockId, u32>,
    window: TimeWindow,
) -> BTreeMap<BucketKey, f64> {
    let mut sums: BTreeMap<BucketKey, f64> = BTreeMap::new();
    let mut skipped_population = 0_usize;
    let mut skipped_window = 0_usize;

    for fact in facts {
        if !window.contains(fact.year, fact.month) {
            skipped_window += 1;
            continue;
        }
        let population = populations.get(&fact.block_id).copied().unwrap_or(0);
        if population == 0 {
            skipped_population += 1;
            continue;
        }
        let key = BucketKey {
            block_id: fact.block_id,
            year: fact.year,
            month: fact.month,
            dow: fact.dow,
            hour: fact.hour,
        };
        *sums.entry(key).or_insert(0.0) += fact.severity_weight / f64::from(population);
    }

    if skipped_window > 0 {
        log::info!("Skipped {skipped_window} incidents outside the aggregation window");
    }
    if skipped_population > 0 {
        log::info!("Skipped {skipped_population} incidents in blocks without population");
    }

    let max = sums.values().copied().fold(0.0_f64, f64::max);
    if max > 0.0 {
        for rate in sums.values_mut() {
            *rate /= max;
        }
    }

    sums
}

/// Packs normalized bucket rates into one tensor per block.
///
/// Slots with no bucket stay zero. Buckets are assumed to come from
/// [`aggregate`] over the same window.
///
/// # Errors
///
/// Returns [`FormatError`] if a bucket's day-of-week or hour is outside
/// the tensor grid.
#[allow(clippy::cast_possible_truncation)]
pub fn build_tensors(
    buckets: &BTreeMap<BucketKey, f64>,
    window: TimeWindow,
) -> Result<BTreeMap<BlockId, FeatureTensor>, FormatError> {
    let shape = window.tensor_shape();
    let mut tensors: BTreeMap<BlockId, FeatureTensor> = BTreeMap::new();

    for (key, rate) in buckets {
        let Some(month_offset) = window.month_offset(key.year, key.month) else {
            continue;
        };
        let tensor = tensors
            .entry(key.block_id)
            .or_insert_with(|| FeatureTensor::zeros(shape));
        tensor.set(month_offset, key.dow as usize, key.hour as usize, *rate)?;
    }

    Ok(tensors)
}
