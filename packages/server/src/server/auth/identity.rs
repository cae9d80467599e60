use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::session::{Session, SessionError};

/// Session key holding the serialized identity
pub const PASSPORT_KEY: &str = "passport";

/// Authenticated user attached to a request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: String,
    pub is_admin: bool,
}

/// Turns the user id stored in a session back into a user.
///
/// `Ok(None)` means the user no longer exists and the stored login is dropped.
#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve(&self, user_id: &str) -> Result<Option<AuthUser>>;
}

/// Resolver that trusts the id stored in the session
pub struct SessionUserResolver;

#[async_trait]
impl UserResolver for SessionUserResolver {
    async fn resolve(&self, user_id: &str) -> Result<Option<AuthUser>> {
        Ok(Some(AuthUser {
            user_id: user_id.to_string(),
            is_admin: false,
        }))
    }
}

/// Per-request identity slot.
///
/// Inserted empty by the auth initialization step and filled by session
/// restoration. Clones share the slot.
#[derive(Clone, Debug, Default)]
pub struct Identity {
    user: Arc<RwLock<Option<AuthUser>>>,
}

impl Identity {
    pub fn user(&self) -> Option<AuthUser> {
        self.user.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.read().is_some()
    }

    pub(crate) fn set(&self, user: Option<AuthUser>) {
        *self.user.write() = user;
    }

    /// Attach `user` to this request and remember it in the session.
    pub fn login(&self, session: &Session, user: AuthUser) -> Result<(), SessionError> {
        session.insert(PASSPORT_KEY, json!({ "user": user.user_id }))?;
        self.set(Some(user));
        Ok(())
    }

    /// Forget the user for this request and in the session.
    pub fn logout(&self, session: &Session) {
        session.remove(PASSPORT_KEY);
        self.set(None);
    }
}

/// User id serialized into the session by a previous login
pub fn stored_user_id(session: &Session) -> Option<String> {
    session.update(|data| {
        data.values
            .get(PASSPORT_KEY)?
            .get("user")?
            .as_str()
            .map(str::to_string)
    })
}
