//! Readiness signals for the listener and the two backing stores.
//!
//! Each resource publishes on its own `watch` channel. Nothing here orders
//! one signal after another: the listener may be `Listening` while both
//! stores are still `Connecting`.

use std::net::SocketAddr;

use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle of the HTTP listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "address", rename_all = "snake_case")]
pub enum ListenerState {
    Unbound,
    Listening(SocketAddr),
    Stopped,
}

/// Lifecycle of a backing-store connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum StoreState {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

impl StoreState {
    /// True once the connection attempt has finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Connected | Self::Failed(_))
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed(_) => "failed",
        }
    }
}

/// Point-in-time view of all three signals
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessSnapshot {
    pub listener: ListenerState,
    pub document_store: StoreState,
    pub relational_store: StoreState,
}

/// Sending half, owned by the gateway tasks
pub(crate) struct ReadinessPublisher {
    pub(crate) listener: watch::Sender<ListenerState>,
    pub(crate) document_store: watch::Sender<StoreState>,
    pub(crate) relational_store: watch::Sender<StoreState>,
}

/// Observable readiness of a running gateway
#[derive(Clone, Debug)]
pub struct Readiness {
    listener: watch::Receiver<ListenerState>,
    document_store: watch::Receiver<StoreState>,
    relational_store: watch::Receiver<StoreState>,
}

pub(crate) fn channel() -> (ReadinessPublisher, Readiness) {
    let (listener_tx, listener_rx) = watch::channel(ListenerState::Unbound);
    let (document_tx, document_rx) = watch::channel(StoreState::Disconnected);
    let (relational_tx, relational_rx) = watch::channel(StoreState::Disconnected);

    (
        ReadinessPublisher {
            listener: listener_tx,
            document_store: document_tx,
            relational_store: relational_tx,
        },
        Readiness {
            listener: listener_rx,
            document_store: document_rx,
            relational_store: relational_rx,
        },
    )
}

impl Readiness {
    /// Readiness with every resource stuck in its initial state.
    ///
    /// Useful for mounting routers outside a running gateway.
    pub fn detached() -> Self {
        channel().1
    }

    pub fn listener(&self) -> ListenerState {
        self.listener.borrow().clone()
    }

    pub fn document_store(&self) -> StoreState {
        self.document_store.borrow().clone()
    }

    pub fn relational_store(&self) -> StoreState {
        self.relational_store.borrow().clone()
    }

    pub fn snapshot(&self) -> ReadinessSnapshot {
        ReadinessSnapshot {
            listener: self.listener(),
            document_store: self.document_store(),
            relational_store: self.relational_store(),
        }
    }

    /// Wait until the listener has left `Unbound`.
    pub async fn wait_for_listener(&self) -> ListenerState {
        wait_until(&self.listener, |state| *state != ListenerState::Unbound).await
    }

    /// Wait until the document store is `Connected` or `Failed`.
    pub async fn wait_for_document_store(&self) -> StoreState {
        wait_until(&self.document_store, StoreState::is_settled).await
    }

    /// Wait until the relational store is `Connected` or `Failed`.
    pub async fn wait_for_relational_store(&self) -> StoreState {
        wait_until(&self.relational_store, StoreState::is_settled).await
    }
}

/// Resolves with the current value if the publisher goes away first.
async fn wait_until<T, F>(receiver: &watch::Receiver<T>, done: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    let mut receiver = receiver.clone();
    if let Ok(state) = receiver.wait_for(done).await {
        return state.clone();
    }
    let state = receiver.borrow().clone();
    state
}
