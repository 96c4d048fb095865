pub mod handlers;
pub mod requests;
pub mod responses;

use crate::context::AppContext;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;

pub fn router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/solar/calculate", post(handlers::calculate))
        .route("/solar/measure", post(handlers::measure))
        .route("/solar/measurements", get(handlers::measurements))
        .route("/solar/stats", get(handlers::stats))
        .route("/solar/export", get(handlers::export))
        .route("/verdict/latest", get(handlers::verdict_latest))
        .route("/verdict/trigger", post(handlers::verdict_trigger))
        .with_state(context)
}
