use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::common::error_response;

/// Largest body the gateway buffers (100 KiB)
pub const BODY_LIMIT: usize = 100 * 1024;

/// Body parsed by the body-parsing stage
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedBody {
    Empty,
    Json(Value),
    /// URL-encoded pairs; repeated keys collect into an array
    Form(Map<String, Value>),
}

#[derive(Error, Debug)]
pub enum BodyError {
    #[error("Malformed JSON body: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("JSON body must be an object or an array")]
    NotStrictJson,

    #[error("Malformed URL-encoded body: {0}")]
    MalformedForm(#[from] serde_urlencoded::de::Error),

    #[error("Request body exceeds the 100kb limit")]
    TooLarge,

    #[error("Request body could not be read")]
    Unreadable,
}

impl IntoResponse for BodyError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        error_response(status, self.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum BodyKind {
    Json,
    Form,
}

fn body_kind(headers: &HeaderMap) -> Option<BodyKind> {
    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence == "application/json" || essence.ends_with("+json") {
        Some(BodyKind::Json)
    } else if essence == "application/x-www-form-urlencoded" {
        Some(BodyKind::Form)
    } else {
        None
    }
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(axum::http::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Only objects and arrays are accepted at the top level.
pub fn parse_json(bytes: &[u8]) -> Result<Value, BodyError> {
    let value: Value = serde_json::from_slice(bytes)?;
    match value {
        Value::Object(_) | Value::Array(_) => Ok(value),
        _ => Err(BodyError::NotStrictJson),
    }
}

/// Flat key/value decoding; nested bracket syntax is kept verbatim in keys.
pub fn parse_form(bytes: &[u8]) -> Result<Map<String, Value>, BodyError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)?;
    let mut form = Map::new();

    for (key, value) in pairs {
        match form.get_mut(&key) {
            None => {
                form.insert(key, Value::String(value));
            }
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
        }
    }

    Ok(form)
}

fn parse(kind: BodyKind, bytes: &Bytes) -> Result<ParsedBody, BodyError> {
    if bytes.is_empty() {
        return Ok(ParsedBody::Empty);
    }
    match kind {
        BodyKind::Json => parse_json(bytes).map(ParsedBody::Json),
        BodyKind::Form => parse_form(bytes).map(ParsedBody::Form),
    }
}

/// Body-parsing middleware: JSON, then URL-encoded.
///
/// The raw bytes are put back on the request so handlers can still use
/// their own extractors. A malformed body ends the request here.
pub async fn parse_body(request: Request, next: Next) -> Response {
    let Some(kind) = body_kind(request.headers()) else {
        return next.run(request).await;
    };

    if declared_length(request.headers()).is_some_and(|len| len > BODY_LIMIT) {
        return BodyError::TooLarge.into_response();
    }

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let error = if e.into_inner().is::<LengthLimitError>() {
                BodyError::TooLarge
            } else {
                BodyError::Unreadable
            };
            return error.into_response();
        }
    };

    let parsed = match parse(kind, &bytes) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "Rejecting request body");
            return e.into_response();
        }
    };

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(parsed);
    next.run(request).await
}
