use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::common::error_response;
use crate::server::app::ApiState;
use crate::server::auth::{AuthUser, Identity, Session};
use crate::server::middleware::{Flash, ParsedBody};
use crate::server::routes::health_handler;

#[derive(Serialize)]
pub struct Banner {
    name: &'static str,
    version: &'static str,
    mode: &'static str,
}

#[derive(Serialize)]
pub struct SessionView {
    session_id: Option<String>,
    user: Option<AuthUser>,
    flash: BTreeMap<String, Vec<String>>,
}

/// Default REST sub-application, mounted under `/__`
pub fn rest_router() -> Router<ApiState> {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health_handler))
        .route("/session", get(session_handler))
        .route("/session/flash", post(push_flash))
}

async fn banner(State(state): State<ApiState>) -> Json<Banner> {
    Json(Banner {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mode: state.mode.as_str(),
    })
}

/// What the middleware chain attached to this request
async fn session_handler(
    session: Option<Extension<Session>>,
    identity: Option<Extension<Identity>>,
    flash: Option<Extension<Flash>>,
) -> Json<SessionView> {
    Json(SessionView {
        session_id: session.map(|Extension(s)| s.id().to_string()),
        user: identity.and_then(|Extension(i)| i.user()),
        flash: flash.map(|Extension(f)| f.take_all()).unwrap_or_default(),
    })
}

/// Queue `{ "kind": ..., "message": ... }` (JSON or form) for the next request.
async fn push_flash(
    flash: Option<Extension<Flash>>,
    body: Option<Extension<ParsedBody>>,
) -> Response {
    let Some(Extension(flash)) = flash else {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Flash unavailable");
    };

    let fields = match body {
        Some(Extension(ParsedBody::Json(Value::Object(map)))) => map,
        Some(Extension(ParsedBody::Form(map))) => map,
        _ => return error_response(StatusCode::BAD_REQUEST, "Expected kind and message"),
    };

    let kind = fields.get("kind").and_then(Value::as_str).unwrap_or("info");
    let Some(message) = fields.get("message").and_then(Value::as_str) else {
        return error_response(StatusCode::BAD_REQUEST, "Expected kind and message");
    };

    flash.push(kind, message);
    StatusCode::NO_CONTENT.into_response()
}
