use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use creel_core::{CoreConfig, LogAlerter, NullAlerter, PatientService};
use creel_store::{DocumentStore, FsStore, MemoryStore};

/// Main entry point for the creel patient-record service.
///
/// # Environment Variables
/// - `CREEL_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CREEL_KEY_HASH`: SHA3-512 hex digest of the master key (required).
///   The master key itself is never configured server-side; it arrives
///   with each request.
/// - `CREEL_DATA_DIR`: directory for the filesystem store. When unset an
///   in-memory store is used (data lost on restart; fine for dev).
/// - `CREEL_ALERTS`: set to "off" to disable operator alerting.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("creel=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr: SocketAddr = std::env::var("CREEL_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".into())
        .parse()?;

    let key_hash = std::env::var("CREEL_KEY_HASH")
        .map_err(|_| anyhow::anyhow!("CREEL_KEY_HASH must be set (SHA3-512 hex of the master key)"))?;
    let alerts_enabled = std::env::var("CREEL_ALERTS")
        .map(|v| v != "off")
        .unwrap_or(true);
    let cfg = CoreConfig::new(key_hash, alerts_enabled)?;

    let store: Arc<dyn DocumentStore> = match std::env::var("CREEL_DATA_DIR") {
        Ok(dir) => {
            tracing::info!("using filesystem store at {dir}");
            Arc::new(FsStore::new(dir))
        }
        Err(_) => {
            tracing::warn!("CREEL_DATA_DIR not set; using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState {
        patients: PatientService::new(&cfg, store),
        alerter: if cfg.alerts_enabled() {
            Arc::new(LogAlerter)
        } else {
            Arc::new(NullAlerter)
        },
    };

    let app = api_rest::router(state).layer(tower_http::cors::CorsLayer::permissive());

    tracing::info!("REST server listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
