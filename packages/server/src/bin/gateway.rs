//! Gateway server
//!
//! Loads configuration from the environment, starts the gateway and serves
//! until Ctrl+C or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gateway_core::server::auth::{MemorySessionStore, RedisSessionStore, SessionStore};
use gateway_core::server::{shutdown_signal, start_gateway, Components};
use gateway_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often the in-memory session store drops expired records
const SESSION_CLEANUP_PERIOD: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gateway_core=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(mode = config.mode.as_str(), "Configuration loaded");

    let session_store: Arc<dyn SessionStore> = match &config.redis_url {
        Some(url) => {
            tracing::info!("Connecting to session store...");
            let store = RedisSessionStore::connect(url)
                .await
                .context("Failed to connect to Redis session store")?;
            tracing::info!("Session store connected");
            Arc::new(store)
        }
        None => {
            tracing::warn!("REDIS_URL not set, keeping sessions in memory");
            let store = Arc::new(MemorySessionStore::new());
            store.spawn_cleanup(SESSION_CLEANUP_PERIOD);
            store
        }
    };

    let components = Components::new(&config, session_store);
    let gateway = start_gateway(config, components)
        .await
        .context("Failed to start gateway")?;

    gateway.run_until(shutdown_signal()).await
}
