use axum::{
    extract::{Request, State},
    http::{header::SET_COOKIE, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::server::auth::{CookieSigner, Session, SessionError, SessionStore};
use crate::server::middleware::Cookies;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "sid";

/// Session attachment settings plus the backing store
///
/// Sessions are always re-saved and always created, so every response
/// refreshes the record and carries the cookie.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    signer: CookieSigner,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, secret: &str, ttl: Duration) -> Self {
        Self {
            store,
            signer: CookieSigner::new(secret),
            ttl,
        }
    }

    pub fn signer(&self) -> &CookieSigner {
        &self.signer
    }

    /// Session named by a validly signed cookie, or a fresh one.
    pub async fn load_or_create(&self, signed_id: Option<&str>) -> Result<Session, SessionError> {
        let Some(id) = signed_id.and_then(|signed| self.signer.unsign(signed)) else {
            return Ok(Session::new());
        };

        match self.store.load(&id).await? {
            Some(data) => Ok(Session::existing(id, data)),
            None => {
                debug!("Session cookie refers to a missing record, starting a new session");
                Ok(Session::new())
            }
        }
    }

    pub async fn persist(&self, session: &Session) -> Result<(), SessionError> {
        self.store
            .save(session.id(), &session.snapshot(), self.ttl)
            .await
    }

    /// `Set-Cookie` value for `session`
    pub fn cookie(&self, session: &Session) -> String {
        format!(
            "{}={}; Path=/; HttpOnly",
            SESSION_COOKIE,
            self.signer.sign(session.id())
        )
    }
}

/// Session middleware.
///
/// Expects `Cookies` from the cookie-parsing stage. Store failures fail the
/// request with a 500.
pub async fn attach_session(
    State(manager): State<Arc<SessionManager>>,
    mut request: Request,
    next: Next,
) -> Response {
    let signed_id = request
        .extensions()
        .get::<Cookies>()
        .and_then(|cookies| cookies.get(SESSION_COOKIE))
        .map(str::to_string);

    let session = match manager.load_or_create(signed_id.as_deref()).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "Failed to load session");
            return e.into_response();
        }
    };

    request.extensions_mut().insert(session.clone());
    let mut response = next.run(request).await;

    if let Err(e) = manager.persist(&session).await {
        error!(error = %e, session_id = %session.id(), "Failed to save session");
        return e.into_response();
    }

    match HeaderValue::from_str(&manager.cookie(&session)) {
        Ok(cookie) => {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        Err(e) => error!(error = %e, "Session cookie is not a valid header value"),
    }

    response
}
