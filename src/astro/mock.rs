use crate::astro::{SolarEphemeris, SunPosition};
use time::OffsetDateTime;

/// Ephemeris returning the same position for every query. Used by tests to
/// make measurement deltas fully predictable.
#[derive(Debug, Clone, Copy)]
pub struct FixedEphemeris {
    pub azimuth: f64,
    pub altitude: f64,
}

impl FixedEphemeris {
    pub fn new(azimuth: f64, altitude: f64) -> Self {
        Self { azimuth, altitude }
    }
}

impl SolarEphemeris for FixedEphemeris {
    fn sun_position(&self, _latitude: f64, _longitude: f64, _at: OffsetDateTime) -> SunPosition {
        SunPosition {
            azimuth: self.azimuth,
            altitude: self.altitude,
        }
    }
}
