//! Gateway lifecycle: bind the listener, start both store connections, and
//! stop everything again.

use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::kernel::readiness::{channel, ListenerState, Readiness, ReadinessPublisher};
use crate::kernel::stores::spawn_connect;
use crate::server::app::{build_app, Components};

/// A running gateway
///
/// Dropping the handle leaves the server running; call [`GatewayHandle::stop`]
/// or [`GatewayHandle::run_until`] to shut it down.
pub struct GatewayHandle {
    address: SocketAddr,
    readiness: Readiness,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<std::io::Result<()>>,
    stores: Vec<JoinHandle<()>>,
}

impl GatewayHandle {
    /// Address the listener is bound to
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    /// Gracefully stop the listener and abandon pending store connections.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.abort_stores();

        self.server
            .await
            .context("Server task failed")?
            .context("Server error")
    }

    /// Serve until `signal` resolves, then stop.
    pub async fn run_until<F>(mut self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => {}
            result = &mut self.server => {
                self.abort_stores();
                return result.context("Server task failed")?.context("Server error");
            }
        }
        self.stop().await
    }

    fn abort_stores(&self) {
        for store in &self.stores {
            store.abort();
        }
    }
}

/// Start the gateway.
///
/// The listener and both store connections start independently: the
/// listener reports `Listening` whether or not either store has come up, and
/// a failed store is logged and published, never fatal. Only a bind failure
/// is returned as an error.
pub async fn start_gateway(config: Config, components: Components) -> Result<GatewayHandle> {
    let (publisher, readiness) = channel();
    let ReadinessPublisher {
        listener: listener_state,
        document_store,
        relational_store,
    } = publisher;

    let app = build_app(&config, &components, readiness.clone())?;

    let stores = vec![
        spawn_connect(components.document_store.clone(), document_store),
        spawn_connect(components.relational_store.clone(), relational_store),
    ];

    let bound = bind(&config).await;
    let (listener, address) = match bound {
        Ok(bound) => bound,
        Err(e) => {
            for store in &stores {
                store.abort();
            }
            return Err(e);
        }
    };

    listener_state.send_replace(ListenerState::Listening(address));
    info!(mode = config.mode.as_str(), "App: Bootstrap Succeeded.");
    info!("Host: {}.", config.listen_url(address.port()));

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
                info!("HTTP server received shutdown signal");
            })
            .await;

        listener_state.send_replace(ListenerState::Stopped);
        match &result {
            Ok(()) => info!("HTTP server shutdown complete"),
            Err(e) => warn!(error = %e, "HTTP server exited with error"),
        }
        result
    });

    Ok(GatewayHandle {
        address,
        readiness,
        shutdown: Some(shutdown_tx),
        server,
        stores,
    })
}

async fn bind(config: &Config) -> Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind to {}:{}", config.host, config.port))?;
    let address = listener
        .local_addr()
        .context("Failed to read the bound address")?;
    Ok((listener, address))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
