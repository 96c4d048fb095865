//! In-memory store backing tests and deployments without a remote database.

use crate::store::{
    DeltaSample, Measurement, MeasurementStore, NewMeasurement, NewVerdict, StoreError, Verdict,
    VerdictStore,
};
use std::sync::Mutex;
use time::OffsetDateTime;

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    measurements: Vec<Measurement>,
    verdicts: Vec<Verdict>,
    next_measurement_id: i64,
    next_verdict_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert with an explicit creation timestamp. Tests use this to build
    /// date-scoped fixtures; the trait method stamps `now` instead.
    pub fn insert_at(
        &self,
        measurement: NewMeasurement,
        created_at: OffsetDateTime,
    ) -> Result<Measurement, StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Lock)?;
        inner.next_measurement_id += 1;
        let row = Measurement {
            id: inner.next_measurement_id,
            created_at,
            device_id: measurement.device_id,
            latitude: measurement.latitude,
            longitude: measurement.longitude,
            device_azimuth: measurement.device_azimuth,
            device_altitude: measurement.device_altitude,
            magnetic_azimuth: measurement.magnetic_azimuth,
            magnetic_declination: measurement.magnetic_declination,
            nasa_azimuth: measurement.nasa_azimuth,
            nasa_altitude: measurement.nasa_altitude,
            delta_azimuth: measurement.delta_azimuth,
            delta_altitude: measurement.delta_altitude,
            flat_earth_sun_height_km: measurement.flat_earth_sun_height_km,
        };
        inner.measurements.push(row.clone());
        Ok(row)
    }

    /// Verdict insert with an explicit creation timestamp, for tests.
    pub fn insert_verdict_at(
        &self,
        verdict: NewVerdict,
        created_at: OffsetDateTime,
    ) -> Result<Verdict, StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Lock)?;
        inner.next_verdict_id += 1;
        let row = Verdict {
            id: inner.next_verdict_id,
            created_at,
            total_samples: verdict.total_samples,
            valid_samples: verdict.valid_samples,
            avg_error_azimuth: verdict.avg_error_azimuth,
            avg_error_altitude: verdict.avg_error_altitude,
            confidence_score: verdict.confidence_score,
            winning_model: verdict.winning_model,
        };
        inner.verdicts.push(row.clone());
        Ok(row)
    }

    pub fn verdict_count(&self) -> Result<usize, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Lock)?;
        Ok(inner.verdicts.len())
    }
}

impl MeasurementStore for MemoryStore {
    fn insert(&self, measurement: NewMeasurement) -> Result<Measurement, StoreError> {
        self.insert_at(measurement, OffsetDateTime::now_utc())
    }

    fn in_range(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
        limit: Option<usize>,
    ) -> Result<Vec<Measurement>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Lock)?;
        let mut rows: Vec<Measurement> = inner
            .measurements
            .iter()
            .filter(|m| m.created_at >= start && m.created_at <= end)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn deltas_since(&self, cutoff: OffsetDateTime) -> Result<Vec<DeltaSample>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Lock)?;
        Ok(inner
            .measurements
            .iter()
            .filter(|m| m.created_at >= cutoff)
            .map(|m| DeltaSample {
                delta_azimuth: m.delta_azimuth,
                delta_altitude: m.delta_altitude,
            })
            .collect())
    }

    fn last_created_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<OffsetDateTime>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Lock)?;
        Ok(inner
            .measurements
            .iter()
            .filter(|m| m.device_id.as_deref() == Some(device_id))
            .map(|m| m.created_at)
            .max())
    }
}

impl VerdictStore for MemoryStore {
    fn insert(&self, verdict: NewVerdict) -> Result<Verdict, StoreError> {
        self.insert_verdict_at(verdict, OffsetDateTime::now_utc())
    }

    fn latest_in_range(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Option<Verdict>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Lock)?;
        Ok(inner
            .verdicts
            .iter()
            .filter(|v| v.created_at >= start && v.created_at <= end)
            .max_by_key(|v| v.created_at)
            .cloned())
    }

    fn latest(&self) -> Result<Option<Verdict>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Lock)?;
        Ok(inner.verdicts.iter().max_by_key(|v| v.created_at).cloned())
    }

    fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Lock)?;
        inner.verdicts.retain(|v| v.id != id);
        Ok(())
    }
}
