//! Remote table store speaking a PostgREST-style API (as exposed by
//! Supabase). Each trait call maps to one HTTP request; filters ride in the
//! query string (`created_at=gte.<iso>`), inserts ask for the created row
//! back via `Prefer: return=representation`.

use crate::store::http::{HttpClient, HttpError};
use crate::store::{
    DeltaSample, Measurement, MeasurementStore, NewMeasurement, NewVerdict, StoreError, Verdict,
    VerdictStore,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub struct RestStore {
    base_url: String,
    api_key: String,
    client: HttpClient,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str, client: HttpClient) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        }
    }

    fn get(&self, table: &str, query: &str) -> Result<String, StoreError> {
        let url = format!("{}/rest/v1/{}?{}", self.base_url, table, query);
        let bearer = format!("Bearer {}", self.api_key);
        let response = self
            .client
            .request(
                "GET",
                &url,
                &[("apikey", &self.api_key), ("Authorization", &bearer)],
                None,
            )
            .map_err(transport)?;
        if response.status >= 400 {
            return Err(StoreError::Status(response.status));
        }
        Ok(response.body)
    }

    fn post_returning(&self, table: &str, body: &str) -> Result<String, StoreError> {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let bearer = format!("Bearer {}", self.api_key);
        let response = self
            .client
            .request(
                "POST",
                &url,
                &[
                    ("apikey", &self.api_key),
                    ("Authorization", &bearer),
                    ("Prefer", "return=representation"),
                ],
                Some(body),
            )
            .map_err(transport)?;
        if response.status >= 400 {
            return Err(StoreError::Status(response.status));
        }
        Ok(response.body)
    }

    fn delete_by_id(&self, table: &str, id: i64) -> Result<(), StoreError> {
        let url = format!("{}/rest/v1/{}?id=eq.{}", self.base_url, table, id);
        let bearer = format!("Bearer {}", self.api_key);
        let response = self
            .client
            .request(
                "DELETE",
                &url,
                &[("apikey", &self.api_key), ("Authorization", &bearer)],
                None,
            )
            .map_err(transport)?;
        if response.status >= 400 {
            return Err(StoreError::Status(response.status));
        }
        Ok(())
    }
}

fn transport(err: HttpError) -> StoreError {
    StoreError::Transport(err.to_string())
}

fn decode(err: impl std::fmt::Display) -> StoreError {
    StoreError::Decode(err.to_string())
}

fn format_ts(at: OffsetDateTime) -> Result<String, StoreError> {
    at.format(&Rfc3339).map_err(decode)
}

fn parse_ts(raw: &str) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::parse(raw, &Rfc3339).map_err(decode)
}

fn range_query(
    select: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
    order_desc: bool,
    limit: Option<usize>,
) -> Result<String, StoreError> {
    let mut query = format!(
        "select={}&created_at=gte.{}&created_at=lte.{}",
        select,
        format_ts(start)?,
        format_ts(end)?
    );
    if order_desc {
        query.push_str("&order=created_at.desc");
    }
    if let Some(limit) = limit {
        query.push_str(&format!("&limit={limit}"));
    }
    Ok(query)
}

#[derive(Debug, Deserialize)]
struct MeasurementRow {
    id: i64,
    created_at: String,
    device_id: Option<String>,
    latitude: f64,
    longitude: f64,
    device_azimuth: f64,
    device_altitude: f64,
    #[serde(default)]
    magnetic_azimuth: Option<f64>,
    #[serde(default)]
    magnetic_declination: Option<f64>,
    nasa_azimuth: f64,
    nasa_altitude: f64,
    delta_azimuth: f64,
    delta_altitude: f64,
    #[serde(default)]
    flat_earth_sun_height_km: Option<f64>,
}

impl MeasurementRow {
    fn into_measurement(self) -> Result<Measurement, StoreError> {
        Ok(Measurement {
            id: self.id,
            created_at: parse_ts(&self.created_at)?,
            device_id: self.device_id,
            latitude: self.latitude,
            longitude: self.longitude,
            device_azimuth: self.device_azimuth,
            device_altitude: self.device_altitude,
            magnetic_azimuth: self.magnetic_azimuth,
            magnetic_declination: self.magnetic_declination,
            nasa_azimuth: self.nasa_azimuth,
            nasa_altitude: self.nasa_altitude,
            delta_azimuth: self.delta_azimuth,
            delta_altitude: self.delta_altitude,
            flat_earth_sun_height_km: self.flat_earth_sun_height_km,
        })
    }
}

#[derive(Debug, Serialize)]
struct NewMeasurementRow<'a> {
    device_id: Option<&'a str>,
    latitude: f64,
    longitude: f64,
    device_azimuth: f64,
    device_altitude: f64,
    magnetic_azimuth: Option<f64>,
    magnetic_declination: Option<f64>,
    nasa_azimuth: f64,
    nasa_altitude: f64,
    delta_azimuth: f64,
    delta_altitude: f64,
    flat_earth_sun_height_km: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DeltaRow {
    delta_azimuth: f64,
    delta_altitude: f64,
}

#[derive(Debug, Deserialize)]
struct CreatedAtRow {
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct VerdictRow {
    id: i64,
    created_at: String,
    total_samples: u64,
    valid_samples: u64,
    avg_error_azimuth: f64,
    avg_error_altitude: f64,
    confidence_score: f64,
    winning_model: String,
}

impl VerdictRow {
    fn into_verdict(self) -> Result<Verdict, StoreError> {
        Ok(Verdict {
            id: self.id,
            created_at: parse_ts(&self.created_at)?,
            total_samples: self.total_samples,
            valid_samples: self.valid_samples,
            avg_error_azimuth: self.avg_error_azimuth,
            avg_error_altitude: self.avg_error_altitude,
            confidence_score: self.confidence_score,
            winning_model: self.winning_model,
        })
    }
}

#[derive(Debug, Serialize)]
struct NewVerdictRow<'a> {
    total_samples: u64,
    valid_samples: u64,
    avg_error_azimuth: f64,
    avg_error_altitude: f64,
    confidence_score: f64,
    winning_model: &'a str,
}

impl MeasurementStore for RestStore {
    fn insert(&self, measurement: NewMeasurement) -> Result<Measurement, StoreError> {
        let row = NewMeasurementRow {
            device_id: measurement.device_id.as_deref(),
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
        let body = serde_json::to_string(&row).map_err(decode)?;
        let response = self.post_returning("measurements", &body)?;
        let mut rows: Vec<MeasurementRow> = serde_json::from_str(&response).map_err(decode)?;
        if rows.is_empty() {
            return Err(StoreError::NoRowReturned);
        }
        rows.remove(0).into_measurement()
    }

    fn in_range(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
        limit: Option<usize>,
    ) -> Result<Vec<Measurement>, StoreError> {
        let query = range_query("*", start, end, true, limit)?;
        let body = self.get("measurements", &query)?;
        let rows: Vec<MeasurementRow> = serde_json::from_str(&body).map_err(decode)?;
        rows.into_iter().map(MeasurementRow::into_measurement).collect()
    }

    fn deltas_since(&self, cutoff: OffsetDateTime) -> Result<Vec<DeltaSample>, StoreError> {
        let query = format!(
            "select=delta_azimuth,delta_altitude&created_at=gte.{}",
            format_ts(cutoff)?
        );
        let body = self.get("measurements", &query)?;
        let rows: Vec<DeltaRow> = serde_json::from_str(&body).map_err(decode)?;
        Ok(rows
            .into_iter()
            .map(|row| DeltaSample {
                delta_azimuth: row.delta_azimuth,
                delta_altitude: row.delta_altitude,
            })
            .collect())
    }

    fn last_created_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<OffsetDateTime>, StoreError> {
        let query = format!(
            "select=created_at&device_id=eq.{}&order=created_at.desc&limit=1",
            device_id
        );
        let body = self.get("measurements", &query)?;
        let rows: Vec<CreatedAtRow> = serde_json::from_str(&body).map_err(decode)?;
        match rows.first() {
            Some(row) => Ok(Some(parse_ts(&row.created_at)?)),
            None => Ok(None),
        }
    }
}

impl VerdictStore for RestStore {
    fn insert(&self, verdict: NewVerdict) -> Result<Verdict, StoreError> {
        let row = NewVerdictRow {
            total_samples: verdict.total_samples,
            valid_samples: verdict.valid_samples,
            avg_error_azimuth: verdict.avg_error_azimuth,
            avg_error_altitude: verdict.avg_error_altitude,
            confidence_score: verdict.confidence_score,
            winning_model: &verdict.winning_model,
        };
        let body = serde_json::to_string(&row).map_err(decode)?;
        let response = self.post_returning("verdicts", &body)?;
        let mut rows: Vec<VerdictRow> = serde_json::from_str(&response).map_err(decode)?;
        if rows.is_empty() {
            return Err(StoreError::NoRowReturned);
        }
        rows.remove(0).into_verdict()
    }

    fn latest_in_range(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Option<Verdict>, StoreError> {
        let query = range_query("*", start, end, true, Some(1))?;
        let body = self.get("verdicts", &query)?;
        let mut rows: Vec<VerdictRow> = serde_json::from_str(&body).map_err(decode)?;
        match rows.is_empty() {
            true => Ok(None),
            false => Ok(Some(rows.remove(0).into_verdict()?)),
        }
    }

    fn latest(&self) -> Result<Option<Verdict>, StoreError> {
        let body = self.get("verdicts", "select=*&order=created_at.desc&limit=1")?;
        let mut rows: Vec<VerdictRow> = serde_json::from_str(&body).map_err(decode)?;
        match rows.is_empty() {
            true => Ok(None),
            false => Ok(Some(rows.remove(0).into_verdict()?)),
        }
    }

    fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.delete_by_id("verdicts", id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn range_query_includes_both_bounds_and_order() -> Result<(), StoreError> {
        let query = range_query(
            "*",
            datetime!(2026-08-29 00:00:00 UTC),
            datetime!(2026-08-29 23:59:59.999999 UTC),
            true,
            Some(5000),
        )?;

        assert_eq!(
            query,
            "select=*&created_at=gte.2026-08-29T00:00:00Z\
             &created_at=lte.2026-08-29T23:59:59.999999Z\
             &order=created_at.desc&limit=5000"
        );
        Ok(())
    }

    #[test]
    fn range_query_can_omit_order_and_limit() -> Result<(), StoreError> {
        let query = range_query(
            "delta_azimuth,delta_altitude",
            datetime!(2026-08-29 00:00:00 UTC),
            datetime!(2026-08-29 23:59:59.999999 UTC),
            false,
            None,
        )?;

        assert!(!query.contains("order="));
        assert!(!query.contains("limit="));
        Ok(())
    }

    #[test]
    fn measurement_row_decodes_with_missing_optionals() -> Result<(), StoreError> {
        let raw = r#"{
            "id": 7,
            "created_at": "2026-08-29T10:15:00Z",
            "device_id": null,
            "latitude": 48.85,
            "longitude": 2.35,
            "device_azimuth": 181.0,
            "device_altitude": 42.0,
            "nasa_azimuth": 180.0,
            "nasa_altitude": 41.5,
            "delta_azimuth": 1.0,
            "delta_altitude": 0.5
        }"#;

        let row: MeasurementRow =
            serde_json::from_str(raw).map_err(|e| StoreError::Decode(e.to_string()))?;
        let measurement = row.into_measurement()?;

        assert_eq!(measurement.id, 7);
        assert_eq!(measurement.created_at, datetime!(2026-08-29 10:15:00 UTC));
        assert_eq!(measurement.device_id, None);
        assert_eq!(measurement.magnetic_azimuth, None);
        assert_eq!(measurement.flat_earth_sun_height_km, None);
        Ok(())
    }

    #[test]
    fn measurement_row_rejects_bad_timestamp() {
        let row = MeasurementRow {
            id: 1,
            created_at: "yesterday".to_string(),
            device_id: None,
            latitude: 0.0,
            longitude: 0.0,
            device_azimuth: 0.0,
            device_altitude: 0.0,
            magnetic_azimuth: None,
            magnetic_declination: None,
            nasa_azimuth: 0.0,
            nasa_altitude: 0.0,
            delta_azimuth: 0.0,
            delta_altitude: 0.0,
            flat_earth_sun_height_km: None,
        };

        assert!(matches!(row.into_measurement(), Err(StoreError::Decode(_))));
    }

    #[test]
    fn new_measurement_row_serializes_optionals_as_null() {
        let row = NewMeasurementRow {
            device_id: Some("device-a"),
            latitude: 48.85,
            longitude: 2.35,
            device_azimuth: 181.0,
            device_altitude: 42.0,
            magnetic_azimuth: None,
            magnetic_declination: None,
            nasa_azimuth: 180.0,
            nasa_altitude: 41.5,
            delta_azimuth: 1.0,
            delta_altitude: 0.5,
            flat_earth_sun_height_km: None,
        };

        let value = serde_json::to_value(&row).expect("serialize new measurement row");

        assert_eq!(value["device_id"], "device-a");
        assert_eq!(value["magnetic_azimuth"], serde_json::Value::Null);
        assert_eq!(value["flat_earth_sun_height_km"], serde_json::Value::Null);
    }

    #[test]
    fn verdict_row_round_trips() -> Result<(), StoreError> {
        let raw = r#"[{
            "id": 3,
            "created_at": "2026-08-29T00:05:00Z",
            "total_samples": 10,
            "valid_samples": 9,
            "avg_error_azimuth": 2.5,
            "avg_error_altitude": 1.25,
            "confidence_score": 96.25,
            "winning_model": "NASA"
        }]"#;

        let mut rows: Vec<VerdictRow> =
            serde_json::from_str(raw).map_err(|e| StoreError::Decode(e.to_string()))?;
        let verdict = rows.remove(0).into_verdict()?;

        assert_eq!(verdict.total_samples, 10);
        assert_eq!(verdict.winning_model, "NASA");
        assert_eq!(verdict.created_at, datetime!(2026-08-29 00:05:00 UTC));
        Ok(())
    }
}
