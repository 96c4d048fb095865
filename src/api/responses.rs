use crate::error::AppError;
use crate::measurement::DailyStats;
use crate::store::{Measurement, Verdict};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SolarPositionResponse {
    pub azimuth: f64,
    pub altitude: f64,
    pub timestamp: String,
}

/// Full measurement record as returned by the API. Optional fields render
/// as JSON null rather than being omitted: "no data" is part of the
/// payload contract.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct MeasurementResponse {
    pub id: i64,
    pub created_at: String,
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

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StatsResponse {
    pub count: u64,
    pub avg_delta_azimuth: Option<f64>,
    pub avg_delta_altitude: Option<f64>,
    pub std_dev_azimuth: Option<f64>,
    pub std_dev_altitude: Option<f64>,
    pub flat_earth_count: u64,
    pub avg_flat_earth_height_km: Option<f64>,
    pub std_dev_flat_earth_height_km: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct VerdictResponse {
    pub id: i64,
    pub created_at: String,
    pub total_samples: u64,
    pub valid_samples: u64,
    pub avg_error_azimuth: f64,
    pub avg_error_altitude: f64,
    pub confidence_score: f64,
    pub winning_model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TriggerResponse {
    pub success: bool,
    pub verdict: VerdictResponse,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    ValidationError,
    RateLimited,
    Unauthorized,
    NotFound,
    InternalError,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorBody {
    pub error_code: ApiErrorCode,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_seconds: Option<u64>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn not_found(message: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorBody {
                error_code: ApiErrorCode::NotFound,
                error_message: message.to_string(),
                wait_seconds: None,
            },
        }
    }

    pub fn internal(message: &str) -> Self {
        error!(detail = message, "Internal error while handling request");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                error_code: ApiErrorCode::InternalError,
                error_message: "Internal server error".to_string(),
                wait_seconds: None,
            },
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(message) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: ErrorBody {
                    error_code: ApiErrorCode::ValidationError,
                    error_message: message,
                    wait_seconds: None,
                },
            },
            AppError::RateLimited { wait_seconds } => Self {
                status: StatusCode::TOO_MANY_REQUESTS,
                body: ErrorBody {
                    error_code: ApiErrorCode::RateLimited,
                    error_message: format!(
                        "Rate limit exceeded. Please wait {wait_seconds} seconds."
                    ),
                    wait_seconds: Some(wait_seconds),
                },
            },
            AppError::Unauthorized => Self {
                status: StatusCode::UNAUTHORIZED,
                body: ErrorBody {
                    error_code: ApiErrorCode::Unauthorized,
                    error_message: "Invalid trigger secret".to_string(),
                    wait_seconds: None,
                },
            },
            AppError::SaveFailed(message) => {
                error!(detail = message, "Persistence returned no confirmed row");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: ErrorBody {
                        error_code: ApiErrorCode::InternalError,
                        error_message: message.to_string(),
                        wait_seconds: None,
                    },
                }
            }
            AppError::Store(err) => ApiError::internal(&err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, ApiError> {
    timestamp
        .format(&Rfc3339)
        .map_err(|_| ApiError::internal("timestamp formatting failure"))
}

pub fn measurement_response(measurement: &Measurement) -> Result<MeasurementResponse, ApiError> {
    Ok(MeasurementResponse {
        id: measurement.id,
        created_at: format_timestamp(measurement.created_at)?,
        device_id: measurement.device_id.clone(),
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
    })
}

pub fn stats_response(stats: &DailyStats) -> StatsResponse {
    StatsResponse {
        count: stats.count,
        avg_delta_azimuth: stats.avg_delta_azimuth,
        avg_delta_altitude: stats.avg_delta_altitude,
        std_dev_azimuth: stats.std_dev_azimuth,
        std_dev_altitude: stats.std_dev_altitude,
        flat_earth_count: stats.flat_earth_count,
        avg_flat_earth_height_km: stats.avg_flat_earth_height_km,
        std_dev_flat_earth_height_km: stats.std_dev_flat_earth_height_km,
    }
}

pub fn verdict_response(verdict: &Verdict) -> Result<VerdictResponse, ApiError> {
    Ok(VerdictResponse {
        id: verdict.id,
        created_at: format_timestamp(verdict.created_at)?,
        total_samples: verdict.total_samples,
        valid_samples: verdict.valid_samples,
        avg_error_azimuth: verdict.avg_error_azimuth,
        avg_error_altitude: verdict.avg_error_altitude,
        confidence_score: verdict.confidence_score,
        winning_model: verdict.winning_model.clone(),
    })
}
