//! Persistence traits and record types for measurements and verdicts.
//!
//! The services only need append and range-query-by-timestamp operations,
//! so the traits stay small and object-safe. Two implementations exist:
//! a remote PostgREST-style table store and an in-memory store used by
//! tests and by deployments without a configured database.

use thiserror::Error;
use time::macros::time;
use time::{Date, OffsetDateTime};

pub mod http;
pub mod memory;
pub mod rest;

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub id: i64,
    pub created_at: OffsetDateTime,
    pub device_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub device_azimuth: f64,
    pub device_altitude: f64,
    pub magnetic_azimuth: Option<f64>,
    pub magnetic_declination: Option<f64>,
    pub nasa_azimuth: f64,
    pub nasa_altitude: f64,
    pub delta_azimuth: f64,
    pub delta_altitude: f64,
    pub flat_earth_sun_height_km: Option<f64>,
}

/// A measurement as handed to the store. `id` and `created_at` are assigned
/// at persistence time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeasurement {
    pub device_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub device_azimuth: f64,
    pub device_altitude: f64,
    pub magnetic_azimuth: Option<f64>,
    pub magnetic_declination: Option<f64>,
    pub nasa_azimuth: f64,
    pub nasa_altitude: f64,
    pub delta_azimuth: f64,
    pub delta_altitude: f64,
    pub flat_earth_sun_height_km: Option<f64>,
}

/// The two deltas the verdict engine scores on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaSample {
    pub delta_azimuth: f64,
    pub delta_altitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub id: i64,
    pub created_at: OffsetDateTime,
    pub total_samples: u64,
    pub valid_samples: u64,
    pub avg_error_azimuth: f64,
    pub avg_error_altitude: f64,
    pub confidence_score: f64,
    pub winning_model: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewVerdict {
    pub total_samples: u64,
    pub valid_samples: u64,
    pub avg_error_azimuth: f64,
    pub avg_error_altitude: f64,
    pub confidence_score: f64,
    pub winning_model: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store transport error: {0}")]
    Transport(String),
    #[error("store returned http status {0}")]
    Status(u16),
    #[error("store response decode error: {0}")]
    Decode(String),
    #[error("store returned no row for insert")]
    NoRowReturned,
    #[error("store lock poisoned")]
    Lock,
}

pub trait MeasurementStore: Send + Sync {
    /// Append a measurement; the store assigns id and creation timestamp.
    fn insert(&self, measurement: NewMeasurement) -> Result<Measurement, StoreError>;

    /// Measurements with `created_at` in `[start, end]`, newest first.
    /// `limit` of `None` returns every matching row.
    fn in_range(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
        limit: Option<usize>,
    ) -> Result<Vec<Measurement>, StoreError>;

    /// Delta columns only, for every measurement created at or after `cutoff`.
    fn deltas_since(&self, cutoff: OffsetDateTime) -> Result<Vec<DeltaSample>, StoreError>;

    /// Creation timestamp of the device's most recent measurement, if any.
    fn last_created_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<OffsetDateTime>, StoreError>;
}

pub trait VerdictStore: Send + Sync {
    fn insert(&self, verdict: NewVerdict) -> Result<Verdict, StoreError>;

    /// Newest verdict with `created_at` in `[start, end]`, if any.
    fn latest_in_range(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Option<Verdict>, StoreError>;

    /// Newest verdict overall, if any.
    fn latest(&self) -> Result<Option<Verdict>, StoreError>;

    fn delete(&self, id: i64) -> Result<(), StoreError>;
}

/// Inclusive UTC range covering a full calendar day:
/// `[00:00:00.000000Z, 23:59:59.999999Z]`.
pub fn day_bounds(date: Date) -> (OffsetDateTime, OffsetDateTime) {
    let start = date.midnight().assume_utc();
    let end = date.with_time(time!(23:59:59.999999)).assume_utc();
    (start, end)
}
