//! Application setup: the middleware chain, the API mounts and the
//! production-only static stage.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{OriginalUri, Request},
    http::{uri::PathAndQuery, Method, StatusCode, Uri},
    middleware,
    response::Response,
    Router,
};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

use crate::common::error_response;
use crate::config::{Config, DeploymentMode};
use crate::kernel::{BackingStore, DocumentStore, ErrorReporter, Readiness, RelationalStore};
use crate::server::auth::{SessionStore, SessionUserResolver, UserResolver};
use crate::server::graphql::{create_schema, Schema};
use crate::server::middleware::{
    access_log, attach_flash, attach_session, capture_request_context, catch_panics,
    initialize_auth, parse_body, parse_cookies, prerender, report_server_errors, restore_identity,
    security_headers, Prerenderer, SessionManager,
};
use crate::server::routes::{graphql_router, rest_router};
use crate::server::static_files::spa_service;

/// State shared by the REST and GraphQL sub-applications
#[derive(Clone)]
pub struct ApiState {
    pub mode: DeploymentMode,
    pub readiness: Readiness,
    pub schema: Arc<Schema>,
}

/// Everything the gateway wires together but does not implement itself
#[derive(Clone)]
pub struct Components {
    pub session_store: Arc<dyn SessionStore>,
    pub user_resolver: Arc<dyn UserResolver>,
    pub document_store: Arc<dyn BackingStore>,
    pub relational_store: Arc<dyn BackingStore>,
    pub reporter: ErrorReporter,
    pub rest: Router<ApiState>,
    pub graphql: Router<ApiState>,
}

impl Components {
    /// Default components for `config`: real store drivers, the default REST
    /// and GraphQL routers, and a reporter posting to `SENTRY_DSN` if set.
    pub fn new(config: &Config, session_store: Arc<dyn SessionStore>) -> Self {
        Self {
            session_store,
            user_resolver: Arc::new(SessionUserResolver),
            document_store: Arc::new(DocumentStore::new(config.mongodb_uri.clone())),
            relational_store: Arc::new(RelationalStore::new(config.database_url.clone())),
            reporter: ErrorReporter::new(config.sentry_dsn.clone()),
            rest: rest_router(),
            graphql: graphql_router(),
        }
    }

    pub fn with_user_resolver(mut self, resolver: Arc<dyn UserResolver>) -> Self {
        self.user_resolver = resolver;
        self
    }

    pub fn with_document_store(mut self, store: Arc<dyn BackingStore>) -> Self {
        self.document_store = store;
        self
    }

    pub fn with_relational_store(mut self, store: Arc<dyn BackingStore>) -> Self {
        self.relational_store = store;
        self
    }

    pub fn with_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_rest(mut self, rest: Router<ApiState>) -> Self {
        self.rest = rest;
        self
    }

    pub fn with_graphql(mut self, graphql: Router<ApiState>) -> Self {
        self.graphql = graphql;
        self
    }
}

/// Mount point of the REST and GraphQL sub-applications
const API_PREFIX: &str = "/__";

/// Unmatched paths under `/__` never reach the SPA document
async fn api_not_found(method: Method, OriginalUri(uri): OriginalUri) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("No route for {} {}", method, uri.path()),
    )
}

/// `/__/` and `/__/graphql/` route like `/__` and `/__/graphql`.
///
/// Paths outside the API are left alone so the static stage keeps its own
/// directory handling.
fn trim_api_trailing_slash(mut request: Request) -> Request {
    let path = request.uri().path();
    let trimmed = path.trim_end_matches('/');
    let is_api = trimmed == API_PREFIX
        || trimmed
            .strip_prefix(API_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'));
    if trimmed.len() == path.len() || !is_api {
        return request;
    }

    let path_and_query = match request.uri().query() {
        Some(query) => format!("{trimmed}?{query}"),
        None => trimmed.to_string(),
    };
    let mut parts = request.uri().clone().into_parts();
    parts.path_and_query = path_and_query.parse::<PathAndQuery>().ok();
    if let Ok(uri) = Uri::from_parts(parts) {
        *request.uri_mut() = uri;
    }
    request
}

/// Build the Axum application router
///
/// Layers are listed outermost first in the global chain; `Router::layer`
/// calls elsewhere wrap what was added before them.
pub fn build_app(
    config: &Config,
    components: &Components,
    readiness: Readiness,
) -> Result<Router> {
    let mode = config.mode;

    // The crash hook goes in before any middleware is built
    if mode.is_production() {
        components.reporter.install_panic_hook();
    }

    let state = ApiState {
        mode,
        readiness,
        schema: Arc::new(create_schema()),
    };

    let mut api = Router::new()
        .merge(components.rest.clone())
        .nest("/graphql", components.graphql.clone())
        .fallback(api_not_found)
        .with_state(state);

    if mode.is_production() {
        api = api.layer(catch_panics()).layer(middleware::from_fn_with_state(
            components.reporter.clone(),
            report_server_errors,
        ));
    }

    let mut app = Router::new().nest(API_PREFIX, api);

    if mode.is_production() {
        let statics = spa_service(&config.static_root);
        app = match &config.rendertron_url {
            Some(url) => {
                let prerenderer = Prerenderer::new(url.clone())
                    .context("Failed to create prerender client")?;
                app.fallback_service(
                    ServiceBuilder::new()
                        .layer(middleware::from_fn_with_state(prerenderer, prerender))
                        .service(statics),
                )
            }
            None => app.fallback_service(statics),
        };
        app = app.layer(middleware::from_fn(capture_request_context));
    }

    let sessions = Arc::new(SessionManager::new(
        components.session_store.clone(),
        &config.session_secret,
        config.session_ttl,
    ));

    let app = app.layer(
        ServiceBuilder::new()
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(middleware::from_fn(security_headers))
            .layer(access_log())
            .layer(middleware::from_fn(parse_body))
            .layer(middleware::from_fn(parse_cookies))
            .layer(middleware::from_fn_with_state(sessions, attach_session))
            .layer(middleware::from_fn(initialize_auth))
            .layer(middleware::from_fn_with_state(
                components.user_resolver.clone(),
                restore_identity,
            ))
            .layer(middleware::from_fn(attach_flash)),
    );

    // Routing runs before any `Router::layer` middleware, so the path
    // rewrite has to wrap the finished router from outside.
    Ok(Router::new().fallback_service(
        ServiceBuilder::new()
            .map_request(trim_api_trailing_slash)
            .service(app),
    ))
}
