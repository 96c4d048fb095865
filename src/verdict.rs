//! Verdict engine: scores crowdsourced deltas against the oracle and
//! persists one verdict per analysis window.
//!
//! Scoring filters obvious user error (any delta beyond 20 degrees),
//! averages the absolute errors that remain, and maps the sum onto a
//! 0-100 confidence scale. The winning label is `NASA` only above a strict
//! 85-point threshold; anything else, including an empty window, is
//! `ANOMALY`.

use crate::error::AppError;
use crate::stats::round_to;
use crate::store::{
    DeltaSample, MeasurementStore, NewVerdict, Verdict, VerdictStore, day_bounds,
};
use std::sync::Arc;
use time::{Date, Duration, OffsetDateTime};
use tracing::info;

/// Deltas beyond this many degrees are treated as user/sensor error.
pub const OUTLIER_THRESHOLD_DEG: f64 = 20.0;
/// Confidence strictly above this labels the oracle the winner.
pub const NASA_THRESHOLD: f64 = 85.0;
pub const ANALYSIS_WINDOW_HOURS: i64 = 24;

pub const MODEL_NASA: &str = "NASA";
pub const MODEL_ANOMALY: &str = "ANOMALY";

#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub total_samples: u64,
    pub valid_samples: u64,
    pub avg_error_azimuth: f64,
    pub avg_error_altitude: f64,
    pub confidence_score: f64,
    pub winning_model: &'static str,
}

impl Score {
    fn empty(total_samples: u64) -> Self {
        Self {
            total_samples,
            valid_samples: 0,
            avg_error_azimuth: 0.0,
            avg_error_altitude: 0.0,
            confidence_score: 0.0,
            winning_model: MODEL_ANOMALY,
        }
    }
}

/// Score a window of delta samples. Pure; the persistence side lives in
/// [`VerdictService::trigger`].
pub fn score(samples: &[DeltaSample]) -> Score {
    let total_samples = samples.len() as u64;
    if total_samples == 0 {
        return Score::empty(0);
    }

    let valid: Vec<&DeltaSample> = samples
        .iter()
        .filter(|s| {
            s.delta_azimuth.abs() <= OUTLIER_THRESHOLD_DEG
                && s.delta_altitude.abs() <= OUTLIER_THRESHOLD_DEG
        })
        .collect();

    if valid.is_empty() {
        return Score::empty(total_samples);
    }

    let n = valid.len() as f64;
    let avg_error_azimuth = valid.iter().map(|s| s.delta_azimuth.abs()).sum::<f64>() / n;
    let avg_error_altitude = valid.iter().map(|s| s.delta_altitude.abs()).sum::<f64>() / n;

    let raw_score = 100.0 - (avg_error_azimuth + avg_error_altitude);
    let confidence_score = round_to(raw_score.clamp(0.0, 100.0), 2);

    let winning_model = if confidence_score > NASA_THRESHOLD {
        MODEL_NASA
    } else {
        MODEL_ANOMALY
    };

    Score {
        total_samples,
        valid_samples: valid.len() as u64,
        avg_error_azimuth: round_to(avg_error_azimuth, 4),
        avg_error_altitude: round_to(avg_error_altitude, 4),
        confidence_score,
        winning_model,
    }
}

pub struct VerdictService {
    measurements: Arc<dyn MeasurementStore>,
    verdicts: Arc<dyn VerdictStore>,
}

impl VerdictService {
    pub fn new(measurements: Arc<dyn MeasurementStore>, verdicts: Arc<dyn VerdictStore>) -> Self {
        Self {
            measurements,
            verdicts,
        }
    }

    /// Score the window and persist the result, replacing any verdict
    /// already recorded for the same calendar date.
    ///
    /// The delete-then-insert pair is best-effort idempotency, not a
    /// transaction: two concurrent triggers for one date can transiently
    /// leave two rows before one is deleted.
    pub fn trigger(&self, target_date: Option<Date>) -> Result<Verdict, AppError> {
        self.trigger_at(target_date, OffsetDateTime::now_utc())
    }

    fn trigger_at(
        &self,
        target_date: Option<Date>,
        now: OffsetDateTime,
    ) -> Result<Verdict, AppError> {
        let samples = match target_date {
            Some(date) => {
                let (start, end) = day_bounds(date);
                let rows = self.measurements.in_range(start, end, None)?;
                rows.iter()
                    .map(|m| DeltaSample {
                        delta_azimuth: m.delta_azimuth,
                        delta_altitude: m.delta_altitude,
                    })
                    .collect()
            }
            None => {
                let cutoff = now - Duration::hours(ANALYSIS_WINDOW_HOURS);
                self.measurements.deltas_since(cutoff)?
            }
        };

        let result = score(&samples);

        let verdict_date = target_date.unwrap_or_else(|| now.date());
        let (start, end) = day_bounds(verdict_date);
        if let Some(existing) = self.verdicts.latest_in_range(start, end)? {
            info!(
                verdict_id = existing.id,
                %verdict_date,
                "Replacing existing verdict for date"
            );
            self.verdicts.delete(existing.id)?;
        }

        let saved = self.verdicts.insert(NewVerdict {
            total_samples: result.total_samples,
            valid_samples: result.valid_samples,
            avg_error_azimuth: result.avg_error_azimuth,
            avg_error_altitude: result.avg_error_altitude,
            confidence_score: result.confidence_score,
            winning_model: result.winning_model.to_string(),
        })?;

        info!(
            verdict_id = saved.id,
            winner = saved.winning_model,
            confidence = saved.confidence_score,
            total = saved.total_samples,
            valid = saved.valid_samples,
            "Verdict persisted"
        );
        Ok(saved)
    }

    /// Newest verdict for the date, or newest overall when no date given.
    pub fn get_latest(&self, target_date: Option<Date>) -> Result<Option<Verdict>, AppError> {
        match target_date {
            Some(date) => {
                let (start, end) = day_bounds(date);
                Ok(self.verdicts.latest_in_range(start, end)?)
            }
            None => Ok(self.verdicts.latest()?),
        }
    }
}
