use async_trait::async_trait;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::common::error_response;

/// Opaque session identifier (random UUID)
pub type SessionId = String;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Session unavailable")
    }
}

/// Cookie metadata kept alongside the session record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieMeta {
    pub original_max_age: Option<u64>,
    pub http_only: bool,
    pub path: String,
}

impl Default for CookieMeta {
    fn default() -> Self {
        Self {
            original_max_age: None,
            http_only: true,
            path: "/".to_string(),
        }
    }
}

/// Persisted session record
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub cookie: CookieMeta,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

/// Request-scoped handle to the caller's session.
///
/// Cloned into request extensions; every clone shares the same record, which
/// the session middleware writes back once the response is ready.
#[derive(Clone, Debug)]
pub struct Session {
    id: SessionId,
    is_new: bool,
    data: Arc<Mutex<SessionData>>,
}

impl Session {
    /// Fresh session with a random id
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            is_new: true,
            data: Arc::new(Mutex::new(SessionData::default())),
        }
    }

    /// Session rebuilt from a stored record
    pub fn existing(id: SessionId, data: SessionData) -> Self {
        Self {
            id,
            is_new: false,
            data: Arc::new(Mutex::new(data)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// True when no record existed for the incoming cookie
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let data = self.data.lock();
        let value = data.values.get(key)?.clone();
        serde_json::from_value(value).ok()
    }

    pub fn insert<T: Serialize>(&self, key: &str, value: T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value)?;
        self.data.lock().values.insert(key.to_string(), value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.lock().values.remove(key)
    }

    /// Apply `f` to the raw record while holding the lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut SessionData) -> R) -> R {
        f(&mut self.data.lock())
    }

    /// Copy of the record as it stands now
    pub fn snapshot(&self) -> SessionData {
        self.data.lock().clone()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Keyed, TTL-backed storage for session records.
///
/// Implementations must tolerate concurrent calls for different keys.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError>;

    async fn save(&self, id: &str, data: &SessionData, ttl: Duration) -> Result<(), SessionError>;

    async fn destroy(&self, id: &str) -> Result<(), SessionError>;
}

struct StoredSession {
    data: SessionData,
    expires_at: DateTime<Utc>,
}

/// In-memory session store
///
/// Records expire after the TTL they were saved with.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, StoredSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records currently held, expired or not
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Clean up expired sessions (run periodically)
    pub async fn cleanup_expired(&self) {
        let now = Utc::now();
        self.sessions
            .write()
            .await
            .retain(|_, session| session.expires_at > now);
    }

    /// Run `cleanup_expired` every `period` until the task is aborted.
    pub fn spawn_cleanup(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                store.cleanup_expired().await;
            }
        })
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError> {
        let sessions = self.sessions.read().await;
        let Some(stored) = sessions.get(id) else {
            return Ok(None);
        };

        if stored.expires_at <= Utc::now() {
            return Ok(None);
        }

        Ok(Some(stored.data.clone()))
    }

    async fn save(&self, id: &str, data: &SessionData, ttl: Duration) -> Result<(), SessionError> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.sessions.write().await.insert(
            id.to_string(),
            StoredSession {
                data: data.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }
}
