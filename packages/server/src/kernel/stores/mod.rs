//! Backing-store connections.
//!
//! The gateway only needs to know whether each store came up. Connection
//! attempts run as independent tasks and publish their outcome on a
//! readiness channel; a failure is logged and never terminates the process.

pub mod document;
pub mod relational;

pub use document::DocumentStore;
pub use relational::RelationalStore;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::kernel::readiness::StoreState;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document store error: {0}")]
    Document(#[from] mongodb::error::Error),

    #[error("Relational store error: {0}")]
    Relational(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

/// A store whose readiness the gateway reports at startup
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Name used in log lines, e.g. `Mongo` or `Postgres`
    fn name(&self) -> &'static str;

    /// Open the connection and prove it usable.
    async fn connect(&self) -> Result<(), StoreError>;
}

/// Spawn one connection attempt.
///
/// Publishes `Connecting`, then exactly one of `Connected` or `Failed`.
/// No retry and no timeout beyond what the driver applies.
pub(crate) fn spawn_connect(
    store: Arc<dyn BackingStore>,
    state: watch::Sender<StoreState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = store.name();
        state.send_replace(StoreState::Connecting);

        match store.connect().await {
            Ok(()) => {
                info!(store = name, "{}: Connection Succeeded.", name);
                state.send_replace(StoreState::Connected);
            }
            Err(e) => {
                error!(store = name, error = %e, "{}: Connection Failed.", name);
                state.send_replace(StoreState::Failed(e.to_string()));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticStore(Result<(), &'static str>);

    #[async_trait]
    impl BackingStore for StaticStore {
        fn name(&self) -> &'static str {
            "Static"
        }

        async fn connect(&self) -> Result<(), StoreError> {
            self.0.map_err(|e| StoreError::Other(e.to_string()))
        }
    }

    #[tokio::test]
    async fn test_successful_connect_publishes_connected() {
        let (tx, mut rx) = watch::channel(StoreState::Disconnected);
        spawn_connect(Arc::new(StaticStore(Ok(()))), tx)
            .await
            .unwrap();
        assert_eq!(*rx.borrow_and_update(), StoreState::Connected);
    }

    #[tokio::test]
    async fn test_failed_connect_publishes_error() {
        let (tx, rx) = watch::channel(StoreState::Disconnected);
        spawn_connect(Arc::new(StaticStore(Err("connection refused"))), tx)
            .await
            .unwrap();
        assert_eq!(
            *rx.borrow(),
            StoreState::Failed("connection refused".to_string())
        );
    }
}
