use crate::error::AppError;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

#[derive(Debug, Deserialize)]
pub struct SolarPositionRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MeasureRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub device_azimuth: f64,
    pub device_altitude: f64,
    pub device_id: String,
    #[serde(default)]
    pub magnetic_azimuth: Option<f64>,
    #[serde(default)]
    pub magnetic_declination: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MeasurementsQuery {
    #[serde(default)]
    pub target_date: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    #[serde(default)]
    pub target_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerQuery {
    pub secret: String,
    #[serde(default)]
    pub target_date: Option<String>,
}

/// Parse a `YYYY-MM-DD` query parameter.
pub fn parse_date(raw: &str) -> Result<Date, AppError> {
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map_err(|_| AppError::Validation(format!("invalid date: {raw} (expected YYYY-MM-DD)")))
}

pub fn parse_optional_date(raw: Option<&str>) -> Result<Option<Date>, AppError> {
    raw.map(parse_date).transpose()
}

/// Parse an RFC 3339 timestamp from a request body.
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|_| {
        AppError::Validation(format!("invalid timestamp: {raw} (expected RFC 3339)"))
    })
}

pub fn parse_optional_timestamp(raw: Option<&str>) -> Result<Option<OffsetDateTime>, AppError> {
    raw.map(parse_timestamp).transpose()
}
