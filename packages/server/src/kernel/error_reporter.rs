//! Crash and error reporting.
//!
//! Events are always logged. When an endpoint is configured they are also
//! posted as JSON to it from a background task, so reporting never delays
//! the response being observed.

use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use axum::extract::Request;
use axum::http::{header::USER_AGENT, StatusCode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

static PANIC_HOOK: OnceLock<()> = OnceLock::new();

/// Request details attached to a reported event
#[derive(Debug, Clone, Serialize)]
pub struct RequestContext {
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_request(request: &Request) -> Self {
        Self {
            method: request.method().to_string(),
            url: request.uri().to_string(),
            user_agent: request
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Fatal,
}

/// A single reported error
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestContext>,
}

impl ErrorEvent {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4().simple().to_string(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
            request: None,
        }
    }

    /// Event for a 5xx response produced by an API handler
    pub fn server_error(status: StatusCode, request: Option<RequestContext>) -> Self {
        Self {
            request,
            ..Self::new(Level::Error, format!("Handler responded with {status}"))
        }
    }
}

struct ReporterInner {
    endpoint: Option<String>,
    http: reqwest::Client,
    reported: AtomicUsize,
}

/// Forwards errors to the external reporting service
#[derive(Clone)]
pub struct ErrorReporter {
    inner: Arc<ReporterInner>,
}

impl ErrorReporter {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                endpoint,
                http: reqwest::Client::new(),
                reported: AtomicUsize::new(0),
            }),
        }
    }

    /// Reporter that only logs
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Number of events reported through this reporter
    pub fn reported_count(&self) -> usize {
        self.inner.reported.load(Ordering::Relaxed)
    }

    pub fn report(&self, event: ErrorEvent) {
        self.inner.reported.fetch_add(1, Ordering::Relaxed);
        error!(
            event_id = %event.event_id,
            request = ?event.request,
            "Reporting error: {}",
            event.message
        );

        let Some(endpoint) = self.inner.endpoint.clone() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(event_id = %event.event_id, "No runtime available, error not forwarded");
            return;
        };

        let http = self.inner.http.clone();
        runtime.spawn(async move {
            let result = http
                .post(&endpoint)
                .json(&event)
                .send()
                .await
                .and_then(|response| response.error_for_status());
            if let Err(e) = result {
                warn!(event_id = %event.event_id, error = %e, "Failed to forward error event");
            }
        });
    }

    /// Route process panics through this reporter.
    ///
    /// The hook is process-wide, so only the first call per process installs
    /// it; the previously installed hook still runs afterwards.
    pub fn install_panic_hook(&self) {
        PANIC_HOOK.get_or_init(|| {
            let reporter = self.clone();
            let previous = panic::take_hook();
            panic::set_hook(Box::new(move |info| {
                let payload = info.payload();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic".to_string());
                let location = info
                    .location()
                    .map(|l| format!(" at {}:{}", l.file(), l.line()))
                    .unwrap_or_default();

                reporter.report(ErrorEvent::new(
                    Level::Fatal,
                    format!("{message}{location}"),
                ));
                previous(info);
            }));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_without_endpoint_only_counts() {
        let reporter = ErrorReporter::disabled();
        reporter.report(ErrorEvent::new(Level::Error, "boom"));
        reporter.report(ErrorEvent::server_error(
            StatusCode::BAD_GATEWAY,
            None,
        ));
        assert_eq!(reporter.reported_count(), 2);
    }

    #[test]
    fn test_server_error_event_carries_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/__/graphql")
            .header(USER_AGENT, "curl/8.0")
            .body(axum::body::Body::empty())
            .unwrap();
        let event = ErrorEvent::server_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            Some(RequestContext::from_request(&request)),
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["request"]["method"], "POST");
        assert_eq!(json["request"]["url"], "/__/graphql");
        assert_eq!(json["request"]["user_agent"], "curl/8.0");
        assert!(json["message"].as_str().unwrap().contains("500"));
    }
}
