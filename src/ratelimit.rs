//! Per-device throttle in front of the measurement path.
//!
//! The limiter sets a short-lived flag in a remote key-value store before
//! any downstream work runs, so a burst of submissions during a slow
//! calculation still hits the flag. Policy is fail-open: if the flag store
//! is unconfigured or unreachable, requests are allowed. This is the one
//! place in the service where a remote error is swallowed on purpose.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, warn};

use crate::store::http::{HttpClient, HttpError};

pub const DEFAULT_TTL_SECONDS: u64 = 60;

#[derive(Debug, Error)]
pub enum FlagStoreError {
    #[error("flag store transport error: {0}")]
    Transport(String),
    #[error("flag store returned http status {0}")]
    Status(u16),
    #[error("flag store lock poisoned")]
    Lock,
}

/// Check-and-set flag storage with expiry, in the shape of a Redis
/// GET / SET EX pair.
pub trait FlagStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, FlagStoreError>;
    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), FlagStoreError>;
}

/// Upstash-style REST flag store: `GET /get/<key>` and
/// `GET /set/<key>/<value>?EX=<ttl>`, bearer-token authenticated.
pub struct RestFlagStore {
    base_url: String,
    token: String,
    client: HttpClient,
}

impl RestFlagStore {
    pub fn new(base_url: &str, token: &str, client: HttpClient) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        }
    }

    fn command(&self, path: &str) -> Result<String, FlagStoreError> {
        let url = format!("{}{}", self.base_url, path);
        let bearer = format!("Bearer {}", self.token);
        let response = self
            .client
            .request("GET", &url, &[("Authorization", &bearer)], None)
            .map_err(|err: HttpError| FlagStoreError::Transport(err.to_string()))?;
        if response.status >= 400 {
            return Err(FlagStoreError::Status(response.status));
        }
        Ok(response.body)
    }
}

impl FlagStore for RestFlagStore {
    fn get(&self, key: &str) -> Result<Option<String>, FlagStoreError> {
        let body = self.command(&format!("/get/{key}"))?;
        // Upstash wraps the value: {"result": "1"} or {"result": null}.
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|err| FlagStoreError::Transport(err.to_string()))?;
        match &value["result"] {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::String(s) => Ok(Some(s.clone())),
            other => Ok(Some(other.to_string())),
        }
    }

    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), FlagStoreError> {
        self.command(&format!("/set/{key}/{value}?EX={}", ttl.as_secs()))?;
        Ok(())
    }
}

/// In-memory flag store with real expiry, for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for MemoryFlagStore {
    fn get(&self, key: &str) -> Result<Option<String>, FlagStoreError> {
        let mut entries = self.entries.lock().map_err(|_| FlagStoreError::Lock)?;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), FlagStoreError> {
        let mut entries = self.entries.lock().map_err(|_| FlagStoreError::Lock)?;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Option<Arc<dyn FlagStore>>,
    ttl: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn FlagStore>, ttl: Duration) -> Self {
        Self {
            store: Some(store),
            ttl,
        }
    }

    /// Limiter with no backing store: every request is allowed.
    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs()
    }

    /// Returns `true` when the device should be blocked.
    ///
    /// First call inside the TTL window sets the flag (with expiry) before
    /// returning `false`; later calls see the flag and are blocked without
    /// the TTL being refreshed. Any store failure allows the request.
    pub fn should_block(&self, device_id: &str) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };

        let key = format!("rate_limit:{device_id}");
        match store.get(&key) {
            Ok(Some(_)) => true,
            Ok(None) => {
                if let Err(err) = store.set_ex(&key, "1", self.ttl) {
                    error!(error = %err, device_id, "Failed to set rate limit flag");
                }
                false
            }
            Err(err) => {
                warn!(error = %err, device_id, "Rate limit check failed, allowing request");
                false
            }
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("configured", &self.store.is_some())
            .field("ttl", &self.ttl)
            .finish()
    }
}
