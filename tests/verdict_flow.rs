use helios_api::astro::mock::FixedEphemeris;
use helios_api::context::AppContext;
use helios_api::measurement::NewReading;
use helios_api::ratelimit::{MemoryFlagStore, RateLimiter};
use helios_api::store::memory::MemoryStore;
use helios_api::verdict::{MODEL_ANOMALY, MODEL_NASA};
use std::sync::Arc;
use std::time::Duration;
use time::{Date, OffsetDateTime};

fn context(limiter: RateLimiter) -> AppContext {
    let store = Arc::new(MemoryStore::new());
    AppContext {
        measurements: Arc::clone(&store) as _,
        verdicts: store as _,
        ephemeris: Arc::new(FixedEphemeris::new(180.0, 40.0)),
        limiter,
        trigger_secret: "test-secret".to_string(),
    }
}

// Rows are stamped at persistence time, so queries use the wall-clock date.
fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

fn reading(device_id: &str, device_azimuth: f64) -> NewReading {
    NewReading {
        device_id: device_id.to_string(),
        latitude: 48.85,
        longitude: 2.35,
        device_azimuth,
        device_altitude: 40.0,
        magnetic_azimuth: None,
        magnetic_declination: None,
        timestamp: None,
    }
}

#[test]
fn measurements_flow_into_a_nasa_verdict() -> Result<(), helios_api::error::AppError> {
    let context = context(RateLimiter::disabled());
    let measurements = context.measurement_service();

    // Three devices, each a few degrees off the oracle.
    measurements.create(reading("device-a", 182.0))?;
    measurements.create(reading("device-b", 184.0))?;
    measurements.create(reading("device-c", 177.0))?;

    let verdicts = context.verdict_service();
    let verdict = verdicts.trigger(Some(today()))?;

    assert_eq!(verdict.total_samples, 3);
    assert_eq!(verdict.valid_samples, 3);
    assert_eq!(verdict.avg_error_azimuth, 3.0);
    assert_eq!(verdict.confidence_score, 97.0);
    assert_eq!(verdict.winning_model, MODEL_NASA);

    let latest = verdicts.get_latest(Some(today()))?;
    assert_eq!(latest, Some(verdict));
    Ok(())
}

#[test]
fn outlier_only_day_yields_anomaly_verdict() -> Result<(), helios_api::error::AppError> {
    let context = context(RateLimiter::disabled());
    let measurements = context.measurement_service();

    // A device pointed nowhere near the sun.
    measurements.create(reading("device-a", 30.0))?;

    let verdict = context.verdict_service().trigger(Some(today()))?;

    assert_eq!(verdict.total_samples, 1);
    assert_eq!(verdict.valid_samples, 0);
    assert_eq!(verdict.confidence_score, 0.0);
    assert_eq!(verdict.winning_model, MODEL_ANOMALY);
    Ok(())
}

#[test]
fn rate_limiter_blocks_repeat_device_but_not_others() -> Result<(), helios_api::error::AppError> {
    let limiter = RateLimiter::new(Arc::new(MemoryFlagStore::new()), Duration::from_secs(60));
    let context = context(limiter);
    let measurements = context.measurement_service();

    measurements.create(reading("device-a", 182.0))?;

    let repeat = measurements.create(reading("device-a", 182.0));
    assert!(matches!(
        repeat,
        Err(helios_api::error::AppError::RateLimited { wait_seconds: 60 })
    ));

    // Another device is unaffected, and the blocked attempt saved nothing.
    measurements.create(reading("device-b", 184.0))?;
    let stats = measurements.stats_for_date(Some(today()))?;
    assert_eq!(stats.count, 2);
    Ok(())
}

#[test]
fn retrigger_replaces_the_verdict_for_the_day() -> Result<(), helios_api::error::AppError> {
    let context = context(RateLimiter::disabled());
    let measurements = context.measurement_service();
    let verdicts = context.verdict_service();

    measurements.create(reading("device-a", 182.0))?;
    let first = verdicts.trigger(Some(today()))?;

    measurements.create(reading("device-b", 210.0))?;
    let second = verdicts.trigger(Some(today()))?;

    assert_ne!(first.id, second.id);
    assert_eq!(second.total_samples, 2);
    assert_eq!(second.valid_samples, 1);
    assert_eq!(verdicts.get_latest(Some(today()))?, Some(second));
    Ok(())
}
