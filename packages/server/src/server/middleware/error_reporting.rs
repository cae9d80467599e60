use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;

use crate::common::error_response;
use crate::kernel::{ErrorEvent, ErrorReporter, RequestContext};

/// Marks a 500 produced from a panic, which the panic hook has already reported
#[derive(Clone, Copy, Debug)]
pub struct PanicCaught;

pub type PanicResponder = fn(Box<dyn Any + Send + 'static>) -> Response;

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    let mut response = error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
    response.extensions_mut().insert(PanicCaught);
    response
}

/// Turns handler panics into plain 500 responses
pub fn catch_panics() -> CatchPanicLayer<PanicResponder> {
    CatchPanicLayer::custom(panic_response as PanicResponder)
}

/// Request-side hook: remember what the request was for later reports.
pub async fn capture_request_context(mut request: Request, next: Next) -> Response {
    let context = RequestContext::from_request(&request);
    request.extensions_mut().insert(context);
    next.run(request).await
}

/// Response-side hook around the API mounts.
///
/// Forwards 5xx responses to the reporter and passes them through unchanged.
pub async fn report_server_errors(
    State(reporter): State<ErrorReporter>,
    request: Request,
    next: Next,
) -> Response {
    let context = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(|| RequestContext::from_request(&request));

    let response = next.run(request).await;

    if response.status().is_server_error() && response.extensions().get::<PanicCaught>().is_none()
    {
        reporter.report(ErrorEvent::server_error(response.status(), Some(context)));
    }

    response
}
