//! Solar ephemeris trait for pluggable sun position sources.
//!
//! The rest of the service only needs azimuth/altitude for a location and
//! instant; the concrete algorithm is behind `SolarEphemeris` so tests can
//! substitute a fixed-output implementation.

use time::OffsetDateTime;

pub mod flat_earth;
pub mod mock;
pub mod noaa;

/// Sun position in degrees. Azimuth is clockwise from true north in
/// `[0, 360)`; altitude is above the horizon in `[-90, 90]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunPosition {
    pub azimuth: f64,
    pub altitude: f64,
}

pub trait SolarEphemeris: Send + Sync {
    fn sun_position(&self, latitude: f64, longitude: f64, at: OffsetDateTime) -> SunPosition;
}
