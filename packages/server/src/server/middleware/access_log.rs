use axum::http::{header::CONTENT_LENGTH, Request, Response};
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnBodyChunk, DefaultOnEos, MakeSpan, OnResponse, TraceLayer};
use tracing::Span;

/// Span carrying method and URI for the access line
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessSpan;

impl<B> MakeSpan<B> for AccessSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
        )
    }
}

/// One concise line per response: `STATUS LENGTH - LATENCY ms`
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessLine;

impl<B> OnResponse<B> for AccessLine {
    fn on_response(self, response: &Response<B>, latency: Duration, _span: &Span) {
        let length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        tracing::info!(
            "{} {} - {:.3} ms",
            response.status().as_u16(),
            length,
            latency.as_secs_f64() * 1000.0
        );
    }
}

pub type AccessLogLayer = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    AccessSpan,
    (),
    AccessLine,
    DefaultOnBodyChunk,
    DefaultOnEos,
    (),
>;

/// Access logging, one line per request
pub fn access_log() -> AccessLogLayer {
    TraceLayer::new_for_http()
        .make_span_with(AccessSpan)
        .on_request(())
        .on_response(AccessLine)
        .on_failure(())
}
