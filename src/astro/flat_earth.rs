//! Flat-earth triangulation side-calculation.
//!
//! If the Earth were flat, an observer measuring the sun's altitude angle
//! could triangulate the sun's height above the plane from the ground
//! distance to the sub-solar point. The service records that hypothetical
//! height alongside each measurement so the two models can be compared.

use time::OffsetDateTime;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Minimum observed altitude for the triangulation to be meaningful.
/// Below this, tan() of the shallow angle amplifies noise into nonsense.
pub const MIN_ALTITUDE_DEG: f64 = 5.0;

/// Approximate sub-solar point (latitude, longitude) in degrees.
///
/// Declination uses the classic `-23.45 * cos(360/365 * (N + 10))`
/// approximation; longitude follows the mean sun westward at 15 deg/hour
/// from solar noon at Greenwich.
pub fn subsolar_point(at: OffsetDateTime) -> (f64, f64) {
    let utc = at.to_offset(time::UtcOffset::UTC);
    let day_of_year = f64::from(utc.ordinal());
    let latitude = -23.45 * (360.0 / 365.0 * (day_of_year + 10.0)).to_radians().cos();

    let utc_hour = f64::from(utc.hour())
        + f64::from(utc.minute()) / 60.0
        + f64::from(utc.second()) / 3600.0;
    let mut longitude = (12.0 - utc_hour) * 15.0;
    // Normalize to [-180, 180].
    if longitude > 180.0 {
        longitude -= 360.0;
    } else if longitude < -180.0 {
        longitude += 360.0;
    }

    (latitude, longitude)
}

/// Great-circle (haversine) distance between two points in kilometers.
pub fn great_circle_distance_km(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let phi_a = lat_a.to_radians();
    let phi_b = lat_b.to_radians();
    let d_phi = (lat_b - lat_a).to_radians();
    let d_lambda = (lon_b - lon_a).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi_a.cos() * phi_b.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().clamp(-1.0, 1.0).asin();

    EARTH_RADIUS_KM * c
}

/// Hypothetical flat-earth sun height in kilometers, or `None` when the
/// observed altitude is below [`MIN_ALTITUDE_DEG`].
pub fn flat_earth_sun_height_km(
    observer_lat: f64,
    observer_lon: f64,
    observed_altitude_deg: f64,
    at: OffsetDateTime,
) -> Option<f64> {
    if observed_altitude_deg < MIN_ALTITUDE_DEG {
        return None;
    }

    let (sun_lat, sun_lon) = subsolar_point(at);
    let distance = great_circle_distance_km(observer_lat, observer_lon, sun_lat, sun_lon);

    Some(distance * observed_altitude_deg.to_radians().tan())
}
