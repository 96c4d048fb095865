use helios_api::astro::noaa::NoaaEphemeris;
use helios_api::ratelimit::{RateLimiter, RestFlagStore};
use helios_api::store::memory::MemoryStore;
use helios_api::store::http::HttpClient;
use helios_api::store::rest::RestStore;
use helios_api::store::{MeasurementStore, VerdictStore};
use helios_api::{api, config, context::AppContext};
use std::net::SocketAddr;
use std::sync::Arc;

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt().with_target(false).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        "helios-api starting"
    );
    let config = config::load_default()?;

    let (measurements, verdicts): (Arc<dyn MeasurementStore>, Arc<dyn VerdictStore>) =
        match config.store_credentials() {
            Some((url, api_key)) => {
                tracing::info!(url, "Using remote table store");
                let store = Arc::new(RestStore::new(url, api_key, HttpClient::default()));
                (Arc::clone(&store) as _, store as _)
            }
            None => {
                tracing::warn!("No table store configured, falling back to in-memory store");
                let store = Arc::new(MemoryStore::new());
                (Arc::clone(&store) as _, store as _)
            }
        };

    let limiter = match config.rate_limit_credentials() {
        Some((url, token)) => {
            tracing::info!(url, ttl_secs = config.rate_limit_ttl().as_secs(), "Rate limiting enabled");
            RateLimiter::new(
                Arc::new(RestFlagStore::new(url, token, HttpClient::default())),
                config.rate_limit_ttl(),
            )
        }
        None => {
            tracing::warn!("No flag store configured, rate limiting disabled");
            RateLimiter::disabled()
        }
    };

    let context = Arc::new(AppContext {
        measurements,
        verdicts,
        ephemeris: Arc::new(NoaaEphemeris),
        limiter,
        trigger_secret: config.trigger_secret().to_string(),
    });

    let app = api::router(context);
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
