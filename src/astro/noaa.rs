//! Built-in sun position source based on the NOAA low-accuracy equations.
//!
//! Accurate to well under a degree for the years around now, which is far
//! below the 20-degree outlier threshold used by the verdict engine.

use crate::astro::{SolarEphemeris, SunPosition};
use time::OffsetDateTime;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoaaEphemeris;

impl SolarEphemeris for NoaaEphemeris {
    fn sun_position(&self, latitude: f64, longitude: f64, at: OffsetDateTime) -> SunPosition {
        let utc = at.to_offset(time::UtcOffset::UTC);

        let day_of_year = f64::from(utc.ordinal());
        let hour = f64::from(utc.hour())
            + f64::from(utc.minute()) / 60.0
            + f64::from(utc.second()) / 3600.0;

        // Fractional year in radians.
        let gamma = 2.0 * std::f64::consts::PI / 365.0 * (day_of_year - 1.0 + (hour - 12.0) / 24.0);

        // Equation of time (minutes) and solar declination (radians).
        let eqtime = 229.18
            * (0.000075 + 0.001868 * gamma.cos()
                - 0.032077 * gamma.sin()
                - 0.014615 * (2.0 * gamma).cos()
                - 0.040849 * (2.0 * gamma).sin());
        let decl = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
            - 0.006758 * (2.0 * gamma).cos()
            + 0.000907 * (2.0 * gamma).sin()
            - 0.002697 * (3.0 * gamma).cos()
            + 0.00148 * (3.0 * gamma).sin();

        // True solar time (minutes) and hour angle (degrees).
        let time_offset = eqtime + 4.0 * longitude;
        let true_solar_minutes = hour * 60.0 + time_offset;
        let hour_angle_deg = true_solar_minutes / 4.0 - 180.0;
        let hour_angle = hour_angle_deg.to_radians();

        let lat = latitude.to_radians();
        let cos_zenith = (lat.sin() * decl.sin() + lat.cos() * decl.cos() * hour_angle.cos())
            .clamp(-1.0, 1.0);
        let zenith = cos_zenith.acos();
        let altitude = 90.0 - zenith.to_degrees();

        let sin_zenith = zenith.sin();
        let azimuth = if sin_zenith.abs() < 1e-9 || lat.cos().abs() < 1e-9 {
            // Sun at zenith/nadir or observer at a pole: azimuth degenerate.
            180.0
        } else {
            let cos_az = ((decl.sin() - lat.sin() * cos_zenith) / (lat.cos() * sin_zenith))
                .clamp(-1.0, 1.0);
            let az = cos_az.acos().to_degrees();
            if hour_angle_deg > 0.0 { 360.0 - az } else { az }
        };

        SunPosition {
            azimuth: azimuth.rem_euclid(360.0),
            altitude,
        }
    }
}
