use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("rate limit exceeded, wait {wait_seconds} seconds")]
    RateLimited { wait_seconds: u64 },
    #[error("{0}")]
    SaveFailed(&'static str),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid trigger secret")]
    Unauthorized,
}
