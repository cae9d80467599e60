use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::server::auth::{stored_user_id, Identity, Session, UserResolver, PASSPORT_KEY};

/// Authentication initialization: every request gets an empty identity slot.
pub async fn initialize_auth(mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(Identity::default());
    next.run(request).await
}

/// Session-based identity restoration.
///
/// Never fails the request: a resolver error leaves the request anonymous.
pub async fn restore_identity(
    State(resolver): State<Arc<dyn UserResolver>>,
    request: Request,
    next: Next,
) -> Response {
    let session = request.extensions().get::<Session>().cloned();
    let identity = request.extensions().get::<Identity>().cloned();

    if let (Some(session), Some(identity)) = (session, identity) {
        if let Some(user_id) = stored_user_id(&session) {
            match resolver.resolve(&user_id).await {
                Ok(Some(user)) => {
                    debug!(user_id = %user.user_id, "Restored identity from session");
                    identity.set(Some(user));
                }
                Ok(None) => {
                    debug!(user_id = %user_id, "Stored user no longer exists, dropping login");
                    session.remove(PASSPORT_KEY);
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Failed to restore identity");
                }
            }
        }
    }

    next.run(request).await
}
