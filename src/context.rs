use crate::astro::SolarEphemeris;
use crate::measurement::MeasurementService;
use crate::ratelimit::RateLimiter;
use crate::store::{MeasurementStore, VerdictStore};
use crate::verdict::VerdictService;
use std::sync::Arc;

/// Everything a request handler needs, injected at construction time.
/// The context itself is immutable; all shared state lives behind the
/// stores.
pub struct AppContext {
    pub measurements: Arc<dyn MeasurementStore>,
    pub verdicts: Arc<dyn VerdictStore>,
    pub ephemeris: Arc<dyn SolarEphemeris>,
    pub limiter: RateLimiter,
    pub trigger_secret: String,
}

impl AppContext {
    pub fn measurement_service(&self) -> MeasurementService {
        MeasurementService::new(
            Arc::clone(&self.measurements),
            Arc::clone(&self.ephemeris),
            self.limiter.clone(),
        )
    }

    pub fn verdict_service(&self) -> VerdictService {
        VerdictService::new(Arc::clone(&self.measurements), Arc::clone(&self.verdicts))
    }
}
