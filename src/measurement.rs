//! Measurement service: validation, sun position lookup, delta and
//! flat-earth calculations, persistence, and the per-day aggregation and
//! CSV export used by the dashboard.

use crate::astro::{SolarEphemeris, flat_earth};
use crate::error::AppError;
use crate::ratelimit::RateLimiter;
use crate::stats::{mean, round_to, sample_std_dev};
use crate::store::{Measurement, MeasurementStore, NewMeasurement, StoreError, day_bounds};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};

pub const DEFAULT_LIST_LIMIT: usize = 5000;
pub const MAX_LIST_LIMIT: usize = 5000;
pub const EXPORT_ROW_LIMIT: usize = 10_000;

/// Minimum seconds between measurements per device for the deprecated
/// timestamp-based limiter.
const LEGACY_RATE_LIMIT_SECONDS: i64 = 10;

pub const CSV_HEADER: &str = "id,created_at,device_id,latitude,longitude,device_azimuth,\
device_altitude,magnetic_azimuth,magnetic_declination,nasa_azimuth,nasa_altitude,\
delta_azimuth,delta_altitude,flat_earth_sun_height_km";

/// A device submission after JSON decoding, before validation.
#[derive(Debug, Clone)]
pub struct NewReading {
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub device_azimuth: f64,
    pub device_altitude: f64,
    pub magnetic_azimuth: Option<f64>,
    pub magnetic_declination: Option<f64>,
    pub timestamp: Option<OffsetDateTime>,
}

/// Per-day aggregate statistics. `None` means "no data", which is distinct
/// from a statistic whose value happens to be zero.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyStats {
    pub count: u64,
    pub avg_delta_azimuth: Option<f64>,
    pub avg_delta_altitude: Option<f64>,
    pub std_dev_azimuth: Option<f64>,
    pub std_dev_altitude: Option<f64>,
    pub flat_earth_count: u64,
    pub avg_flat_earth_height_km: Option<f64>,
    pub std_dev_flat_earth_height_km: Option<f64>,
}

pub struct MeasurementService {
    store: Arc<dyn MeasurementStore>,
    ephemeris: Arc<dyn SolarEphemeris>,
    limiter: RateLimiter,
}

impl MeasurementService {
    pub fn new(
        store: Arc<dyn MeasurementStore>,
        ephemeris: Arc<dyn SolarEphemeris>,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            store,
            ephemeris,
            limiter,
        }
    }

    /// Validate, rate-limit, compute the oracle position and deltas, and
    /// persist. Nothing is persisted unless the insert confirms a row, and
    /// no deltas are reported without a successful save.
    pub fn create(&self, reading: NewReading) -> Result<Measurement, AppError> {
        validate_reading(&reading)?;

        if self.limiter.should_block(&reading.device_id) {
            return Err(AppError::RateLimited {
                wait_seconds: self.limiter.ttl_seconds(),
            });
        }

        let at = reading.timestamp.unwrap_or_else(OffsetDateTime::now_utc);
        let sun = self
            .ephemeris
            .sun_position(reading.latitude, reading.longitude, at);

        // Deltas are always device minus oracle.
        let delta_azimuth = reading.device_azimuth - sun.azimuth;
        let delta_altitude = reading.device_altitude - sun.altitude;

        let flat_earth_sun_height_km = flat_earth::flat_earth_sun_height_km(
            reading.latitude,
            reading.longitude,
            reading.device_altitude,
            at,
        );

        self.store.insert(NewMeasurement {
            device_id: Some(reading.device_id),
            latitude: reading.latitude,
            longitude: reading.longitude,
            device_azimuth: reading.device_azimuth,
            device_altitude: reading.device_altitude,
            magnetic_azimuth: reading.magnetic_azimuth,
            magnetic_declination: reading.magnetic_declination,
            nasa_azimuth: sun.azimuth,
            nasa_altitude: sun.altitude,
            delta_azimuth,
            delta_altitude,
            flat_earth_sun_height_km,
        })
        .map_err(|err| match err {
            StoreError::NoRowReturned => AppError::SaveFailed("failed to save measurement"),
            other => AppError::Store(other),
        })
    }

    /// Measurements for the given date (default today, UTC), newest first.
    /// `limit` must be in `[1, 5000]`.
    pub fn list_by_date(
        &self,
        target_date: Option<Date>,
        limit: usize,
    ) -> Result<Vec<Measurement>, AppError> {
        if limit == 0 {
            return Err(AppError::Validation("limit must be at least 1".to_string()));
        }
        let date = target_date.unwrap_or_else(|| OffsetDateTime::now_utc().date());
        let (start, end) = day_bounds(date);
        let capped = limit.min(MAX_LIST_LIMIT);
        Ok(self.store.in_range(start, end, Some(capped))?)
    }

    /// Aggregate statistics over every measurement of the date. No outlier
    /// filtering here; that belongs to the verdict engine.
    pub fn stats_for_date(&self, target_date: Option<Date>) -> Result<DailyStats, AppError> {
        let date = target_date.unwrap_or_else(|| OffsetDateTime::now_utc().date());
        let (start, end) = day_bounds(date);
        let rows = self.store.in_range(start, end, None)?;

        if rows.is_empty() {
            return Ok(DailyStats {
                count: 0,
                avg_delta_azimuth: None,
                avg_delta_altitude: None,
                std_dev_azimuth: None,
                std_dev_altitude: None,
                flat_earth_count: 0,
                avg_flat_earth_height_km: None,
                std_dev_flat_earth_height_km: None,
            });
        }

        let azimuths: Vec<f64> = rows.iter().map(|m| m.delta_azimuth).collect();
        let altitudes: Vec<f64> = rows.iter().map(|m| m.delta_altitude).collect();
        let heights: Vec<f64> = rows
            .iter()
            .filter_map(|m| m.flat_earth_sun_height_km)
            .collect();

        Ok(DailyStats {
            count: rows.len() as u64,
            avg_delta_azimuth: mean(&azimuths).map(|v| round_to(v, 4)),
            avg_delta_altitude: mean(&altitudes).map(|v| round_to(v, 4)),
            std_dev_azimuth: sample_std_dev(&azimuths).map(|v| round_to(v, 4)),
            std_dev_altitude: sample_std_dev(&altitudes).map(|v| round_to(v, 4)),
            flat_earth_count: heights.len() as u64,
            avg_flat_earth_height_km: mean(&heights).map(|v| round_to(v, 2)),
            std_dev_flat_earth_height_km: sample_std_dev(&heights).map(|v| round_to(v, 2)),
        })
    }

    /// CSV export for the date, newest first, capped at
    /// [`EXPORT_ROW_LIMIT`] rows. Absent optionals render as empty fields.
    pub fn export_csv(&self, target_date: Option<Date>) -> Result<String, AppError> {
        let date = target_date.unwrap_or_else(|| OffsetDateTime::now_utc().date());
        let (start, end) = day_bounds(date);
        let rows = self.store.in_range(start, end, Some(EXPORT_ROW_LIMIT))?;

        let mut csv = String::from(CSV_HEADER);
        csv.push('\n');
        for row in &rows {
            csv.push_str(&csv_line(row));
            csv.push('\n');
        }
        Ok(csv)
    }

    /// Deprecated timestamp-based limiter, superseded by the flag-based
    /// [`RateLimiter`]. Kept for parity with older deployments that blocked
    /// on the device's most recent row being under ten seconds old.
    pub fn legacy_rate_limit_check(&self, device_id: &str) -> Result<(), AppError> {
        self.legacy_rate_limit_check_at(device_id, OffsetDateTime::now_utc())
    }

    fn legacy_rate_limit_check_at(
        &self,
        device_id: &str,
        now: OffsetDateTime,
    ) -> Result<(), AppError> {
        let Some(last) = self.store.last_created_for_device(device_id)? else {
            return Ok(());
        };

        let elapsed = (now - last).whole_seconds();
        if elapsed < LEGACY_RATE_LIMIT_SECONDS {
            return Err(AppError::RateLimited {
                wait_seconds: (LEGACY_RATE_LIMIT_SECONDS - elapsed) as u64,
            });
        }
        Ok(())
    }
}

fn validate_reading(reading: &NewReading) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&reading.latitude) {
        return Err(AppError::Validation(format!(
            "latitude {} out of range [-90, 90]",
            reading.latitude
        )));
    }
    if !(-180.0..=180.0).contains(&reading.longitude) {
        return Err(AppError::Validation(format!(
            "longitude {} out of range [-180, 180]",
            reading.longitude
        )));
    }
    if !(0.0..360.0).contains(&reading.device_azimuth) {
        return Err(AppError::Validation(format!(
            "device_azimuth {} out of range [0, 360)",
            reading.device_azimuth
        )));
    }
    if !(-90.0..=90.0).contains(&reading.device_altitude) {
        return Err(AppError::Validation(format!(
            "device_altitude {} out of range [-90, 90]",
            reading.device_altitude
        )));
    }
    if reading.device_id.is_empty() {
        return Err(AppError::Validation("device_id must not be empty".to_string()));
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line(row: &Measurement) -> String {
    let created_at = row
        .created_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::new());
    let optional = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();

    [
        row.id.to_string(),
        created_at,
        csv_field(row.device_id.as_deref().unwrap_or("")),
        row.latitude.to_string(),
        row.longitude.to_string(),
        row.device_azimuth.to_string(),
        row.device_altitude.to_string(),
        optional(row.magnetic_azimuth),
        optional(row.magnetic_declination),
        row.nasa_azimuth.to_string(),
        row.nasa_altitude.to_string(),
        row.delta_azimuth.to_string(),
        row.delta_altitude.to_string(),
        optional(row.flat_earth_sun_height_km),
    ]
    .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::mock::FixedEphemeris;
    use crate::ratelimit::MemoryFlagStore;
    use crate::store::memory::MemoryStore;
    use std::time::Duration;
    use time::macros::{date, datetime};

    fn service_with(
        store: Arc<MemoryStore>,
        limiter: RateLimiter,
    ) -> MeasurementService {
        MeasurementService::new(
            store,
            Arc::new(FixedEphemeris::new(180.0, 40.0)),
            limiter,
        )
    }

    fn reading(device_id: &str) -> NewReading {
        NewReading {
            device_id: device_id.to_string(),
            latitude: 48.85,
            longitude: 2.35,
            device_azimuth: 185.0,
            device_altitude: 43.0,
            magnetic_azimuth: None,
            magnetic_declination: None,
            timestamp: Some(datetime!(2026-08-29 12:00:00 UTC)),
        }
    }

    #[test]
    fn create_computes_device_minus_oracle_deltas() -> Result<(), AppError> {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(Arc::clone(&store), RateLimiter::disabled());

        let saved = service.create(reading("device-a"))?;

        assert_eq!(saved.nasa_azimuth, 180.0);
        assert_eq!(saved.nasa_altitude, 40.0);
        assert_eq!(saved.delta_azimuth, 5.0);
        assert_eq!(saved.delta_altitude, 3.0);
        assert_eq!(saved.device_id.as_deref(), Some("device-a"));
        Ok(())
    }

    #[test]
    fn create_records_flat_earth_height_above_threshold() -> Result<(), AppError> {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, RateLimiter::disabled());

        let saved = service.create(reading("device-a"))?;

        let height = saved
            .flat_earth_sun_height_km
            .expect("height for 43 degree altitude");
        assert!(height.is_finite());
        Ok(())
    }

    #[test]
    fn create_omits_flat_earth_height_near_horizon() -> Result<(), AppError> {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, RateLimiter::disabled());
        let mut low = reading("device-a");
        low.device_altitude = 3.0;

        let saved = service.create(low)?;

        assert_eq!(saved.flat_earth_sun_height_km, None);
        Ok(())
    }

    #[test]
    fn create_stamps_created_at_with_wall_clock() -> Result<(), AppError> {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, RateLimiter::disabled());

        // The reading's timestamp feeds the oracle only; the row itself is
        // stamped at persistence time.
        let mut backdated = reading("device-a");
        backdated.timestamp = Some(datetime!(2026-01-01 09:00:00 UTC));
        let saved = service.create(backdated)?;

        assert_eq!(saved.created_at.date(), OffsetDateTime::now_utc().date());
        assert_ne!(saved.created_at.date(), date!(2026-01-01));
        Ok(())
    }

    #[test]
    fn list_rejects_zero_limit() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, RateLimiter::disabled());

        let result = service.list_by_date(Some(date!(2026-08-29)), 0);

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn create_rejects_out_of_range_latitude() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, RateLimiter::disabled());
        let mut bad = reading("device-a");
        bad.latitude = 95.0;

        assert!(matches!(
            service.create(bad),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn create_rejects_azimuth_of_360() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, RateLimiter::disabled());
        let mut bad = reading("device-a");
        bad.device_azimuth = 360.0;

        assert!(matches!(
            service.create(bad),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn create_blocks_second_submission_within_ttl() -> Result<(), AppError> {
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::new(
            Arc::new(MemoryFlagStore::new()),
            Duration::from_secs(60),
        );
        let service = service_with(store, limiter);

        service.create(reading("device-a"))?;
        let second = service.create(reading("device-a"));

        assert!(matches!(
            second,
            Err(AppError::RateLimited { wait_seconds: 60 })
        ));
        Ok(())
    }

    #[test]
    fn stats_for_empty_date_is_all_absent() -> Result<(), AppError> {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, RateLimiter::disabled());

        let stats = service.stats_for_date(Some(date!(2026-08-29)))?;

        assert_eq!(stats.count, 0);
        assert_eq!(stats.avg_delta_azimuth, None);
        assert_eq!(stats.std_dev_azimuth, None);
        assert_eq!(stats.flat_earth_count, 0);
        assert_eq!(stats.avg_flat_earth_height_km, None);
        Ok(())
    }

    fn stored_measurement(
        delta_azimuth: f64,
        delta_altitude: f64,
        height: Option<f64>,
    ) -> crate::store::NewMeasurement {
        crate::store::NewMeasurement {
            device_id: Some("device-a".to_string()),
            latitude: 48.85,
            longitude: 2.35,
            device_azimuth: 180.0,
            device_altitude: 45.0,
            magnetic_azimuth: None,
            magnetic_declination: None,
            nasa_azimuth: 180.0 - delta_azimuth,
            nasa_altitude: 45.0 - delta_altitude,
            delta_azimuth,
            delta_altitude,
            flat_earth_sun_height_km: height,
        }
    }

    #[test]
    fn stats_single_sample_has_zero_std_dev() -> Result<(), AppError> {
        let store = Arc::new(MemoryStore::new());
        store.insert_at(
            stored_measurement(2.0, 1.0, Some(3000.0)),
            datetime!(2026-08-29 10:00:00 UTC),
        )?;
        let service = service_with(store, RateLimiter::disabled());

        let stats = service.stats_for_date(Some(date!(2026-08-29)))?;

        assert_eq!(stats.count, 1);
        assert_eq!(stats.avg_delta_azimuth, Some(2.0));
        assert_eq!(stats.std_dev_azimuth, Some(0.0));
        assert_eq!(stats.flat_earth_count, 1);
        assert_eq!(stats.avg_flat_earth_height_km, Some(3000.0));
        assert_eq!(stats.std_dev_flat_earth_height_km, Some(0.0));
        Ok(())
    }

    #[test]
    fn stats_flat_earth_fields_skip_absent_heights() -> Result<(), AppError> {
        let store = Arc::new(MemoryStore::new());
        store.insert_at(
            stored_measurement(1.0, 1.0, Some(2000.0)),
            datetime!(2026-08-29 09:00:00 UTC),
        )?;
        store.insert_at(
            stored_measurement(3.0, 1.0, None),
            datetime!(2026-08-29 10:00:00 UTC),
        )?;
        store.insert_at(
            stored_measurement(5.0, 1.0, Some(4000.0)),
            datetime!(2026-08-29 11:00:00 UTC),
        )?;
        let service = service_with(store, RateLimiter::disabled());

        let stats = service.stats_for_date(Some(date!(2026-08-29)))?;

        assert_eq!(stats.count, 3);
        assert_eq!(stats.avg_delta_azimuth, Some(3.0));
        assert_eq!(stats.std_dev_azimuth, Some(2.0));
        assert_eq!(stats.flat_earth_count, 2);
        assert_eq!(stats.avg_flat_earth_height_km, Some(3000.0));
        // std dev of [2000, 4000] with N-1 divisor
        assert_eq!(stats.std_dev_flat_earth_height_km, Some(1414.21));
        Ok(())
    }

    #[test]
    fn export_csv_has_fixed_header_and_blank_optionals() -> Result<(), AppError> {
        let store = Arc::new(MemoryStore::new());
        store.insert_at(
            stored_measurement(1.5, -0.5, None),
            datetime!(2026-08-29 10:00:00 UTC),
        )?;
        let service = service_with(store, RateLimiter::disabled());

        let csv = service.export_csv(Some(date!(2026-08-29)))?;
        let mut lines = csv.lines();

        assert_eq!(lines.next(), Some(CSV_HEADER));
        let row = lines.next().expect("one data row");
        assert!(row.starts_with("1,2026-08-29T10:00:00Z,device-a,"));
        assert!(row.ends_with(",1.5,-0.5,"));
        assert_eq!(lines.next(), None);
        Ok(())
    }

    #[test]
    fn export_csv_orders_newest_first() -> Result<(), AppError> {
        let store = Arc::new(MemoryStore::new());
        store.insert_at(
            stored_measurement(1.0, 0.0, None),
            datetime!(2026-08-29 08:00:00 UTC),
        )?;
        store.insert_at(
            stored_measurement(2.0, 0.0, None),
            datetime!(2026-08-29 20:00:00 UTC),
        )?;
        let service = service_with(store, RateLimiter::disabled());

        let csv = service.export_csv(Some(date!(2026-08-29)))?;
        let rows: Vec<&str> = csv.lines().skip(1).collect();

        assert!(rows[0].contains("2026-08-29T20:00:00Z"));
        assert!(rows[1].contains("2026-08-29T08:00:00Z"));
        Ok(())
    }

    #[test]
    fn legacy_limit_blocks_within_ten_seconds() -> Result<(), AppError> {
        let store = Arc::new(MemoryStore::new());
        store.insert_at(
            stored_measurement(0.0, 0.0, None),
            datetime!(2026-08-29 10:00:00 UTC),
        )?;
        let service = service_with(store, RateLimiter::disabled());

        let blocked = service
            .legacy_rate_limit_check_at("device-a", datetime!(2026-08-29 10:00:03 UTC));

        assert!(matches!(
            blocked,
            Err(AppError::RateLimited { wait_seconds: 7 })
        ));
        Ok(())
    }

    #[test]
    fn legacy_limit_allows_after_window() -> Result<(), AppError> {
        let store = Arc::new(MemoryStore::new());
        store.insert_at(
            stored_measurement(0.0, 0.0, None),
            datetime!(2026-08-29 10:00:00 UTC),
        )?;
        let service = service_with(store, RateLimiter::disabled());

        service.legacy_rate_limit_check_at("device-a", datetime!(2026-08-29 10:00:10 UTC))?;
        service.legacy_rate_limit_check_at("device-b", datetime!(2026-08-29 10:00:01 UTC))?;
        Ok(())
    }
}
