//! HTTP handlers. Each axum handler is a thin async wrapper around a
//! synchronous `build_*` function so the endpoint logic stays testable
//! without a running server.

use crate::api::requests::{
    DateQuery, MeasureRequest, MeasurementsQuery, SolarPositionRequest, TriggerQuery,
    parse_optional_date, parse_optional_timestamp,
};
use crate::api::responses::{
    ApiError, MeasurementResponse, SolarPositionResponse, StatsResponse, TriggerResponse,
    VerdictResponse, format_timestamp, measurement_response, stats_response, verdict_response,
};
use crate::context::AppContext;
use crate::measurement::{DEFAULT_LIST_LIMIT, NewReading};
use axum::Json;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub status: &'static str,
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "Helios Server Running",
    })
}

pub async fn calculate(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<SolarPositionRequest>,
) -> Result<Json<SolarPositionResponse>, ApiError> {
    build_calculate(&context, request).map(Json)
}

pub async fn measure(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<MeasureRequest>,
) -> Result<Json<MeasurementResponse>, ApiError> {
    build_measure(&context, request).map(Json)
}

pub async fn measurements(
    State(context): State<Arc<AppContext>>,
    Query(query): Query<MeasurementsQuery>,
) -> Result<Json<Vec<MeasurementResponse>>, ApiError> {
    build_measurements(&context, query).map(Json)
}

pub async fn stats(
    State(context): State<Arc<AppContext>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    build_stats(&context, query).map(Json)
}

pub async fn export(
    State(context): State<Arc<AppContext>>,
    Query(query): Query<DateQuery>,
) -> Result<Response, ApiError> {
    let (filename, csv) = build_export(&context, query)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        csv,
    )
        .into_response())
}

pub async fn verdict_latest(
    State(context): State<Arc<AppContext>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<VerdictResponse>, ApiError> {
    build_verdict_latest(&context, query).map(Json)
}

pub async fn verdict_trigger(
    State(context): State<Arc<AppContext>>,
    Query(query): Query<TriggerQuery>,
) -> Result<Json<TriggerResponse>, ApiError> {
    build_verdict_trigger(&context, query).map(Json)
}

pub fn build_calculate(
    context: &AppContext,
    request: SolarPositionRequest,
) -> Result<SolarPositionResponse, ApiError> {
    validate_coordinates(request.latitude, request.longitude)?;
    let at = parse_optional_timestamp(request.timestamp.as_deref())?
        .unwrap_or_else(OffsetDateTime::now_utc);

    let sun = context
        .ephemeris
        .sun_position(request.latitude, request.longitude, at);

    Ok(SolarPositionResponse {
        azimuth: sun.azimuth,
        altitude: sun.altitude,
        timestamp: format_timestamp(at)?,
    })
}

pub fn build_measure(
    context: &AppContext,
    request: MeasureRequest,
) -> Result<MeasurementResponse, ApiError> {
    let timestamp = parse_optional_timestamp(request.timestamp.as_deref())?;
    let saved = context.measurement_service().create(NewReading {
        device_id: request.device_id,
        latitude: request.latitude,
        longitude: request.longitude,
        device_azimuth: request.device_azimuth,
        device_altitude: request.device_altitude,
        magnetic_azimuth: request.magnetic_azimuth,
        magnetic_declination: request.magnetic_declination,
        timestamp,
    })?;

    info!(
        measurement_id = saved.id,
        device_id = saved.device_id.as_deref().unwrap_or(""),
        delta_azimuth = saved.delta_azimuth,
        delta_altitude = saved.delta_altitude,
        "Measurement recorded"
    );
    measurement_response(&saved)
}

pub fn build_measurements(
    context: &AppContext,
    query: MeasurementsQuery,
) -> Result<Vec<MeasurementResponse>, ApiError> {
    let date = parse_optional_date(query.target_date.as_deref())?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let rows = context.measurement_service().list_by_date(date, limit)?;
    rows.iter().map(measurement_response).collect()
}

pub fn build_stats(context: &AppContext, query: DateQuery) -> Result<StatsResponse, ApiError> {
    let date = parse_optional_date(query.target_date.as_deref())?;
    let stats = context.measurement_service().stats_for_date(date)?;
    Ok(stats_response(&stats))
}

pub fn build_export(
    context: &AppContext,
    query: DateQuery,
) -> Result<(String, String), ApiError> {
    let date = parse_optional_date(query.target_date.as_deref())?;
    let csv = context.measurement_service().export_csv(date)?;

    let effective = date.unwrap_or_else(|| OffsetDateTime::now_utc().date());
    let formatted = effective
        .format(format_description!("[year]-[month]-[day]"))
        .map_err(|_| ApiError::internal("date formatting failure"))?;
    Ok((format!("helios_data_{formatted}.csv"), csv))
}

pub fn build_verdict_latest(
    context: &AppContext,
    query: DateQuery,
) -> Result<VerdictResponse, ApiError> {
    let date = parse_optional_date(query.target_date.as_deref())?;
    let verdict = context
        .verdict_service()
        .get_latest(date)?
        .ok_or_else(|| ApiError::not_found("No verdict found"))?;
    verdict_response(&verdict)
}

pub fn build_verdict_trigger(
    context: &AppContext,
    query: TriggerQuery,
) -> Result<TriggerResponse, ApiError> {
    if query.secret != context.trigger_secret {
        return Err(ApiError::from(crate::error::AppError::Unauthorized));
    }

    let date = parse_optional_date(query.target_date.as_deref())?;
    let verdict = context.verdict_service().trigger(date)?;
    let message = format!(
        "Verdict calculated: {} wins with {}% confidence",
        verdict.winning_model, verdict.confidence_score
    );
    Ok(TriggerResponse {
        success: true,
        verdict: verdict_response(&verdict)?,
        message,
    })
}

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), ApiError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(ApiError::from(crate::error::AppError::Validation(format!(
            "latitude {latitude} out of range [-90, 90]"
        ))));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(ApiError::from(crate::error::AppError::Validation(format!(
            "longitude {longitude} out of range [-180, 180]"
        ))));
    }
    Ok(())
}
