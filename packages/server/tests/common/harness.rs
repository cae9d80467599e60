//! In-process test harness for gateway integration tests.
//!
//! Backing stores are fakes, sessions live in memory and the static root is
//! a temp directory, so no test needs an external service.

#![allow(dead_code)]

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use gateway_core::kernel::{BackingStore, ErrorReporter, Readiness, StoreError};
use gateway_core::server::auth::{CookieSigner, MemorySessionStore, SessionData};
use gateway_core::server::{build_app, Components};
use gateway_core::{Config, DeploymentMode};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret";
pub const INDEX_HTML: &str = "<!doctype html><html><body>spa shell</body></html>";

/// How a fake store answers `connect`
#[derive(Clone, Copy, Debug)]
pub enum FakeBehavior {
    Ready,
    Fail(&'static str),
    /// Never finishes connecting
    Hang,
}

pub struct FakeStore {
    name: &'static str,
    behavior: FakeBehavior,
}

impl FakeStore {
    pub fn mongo(behavior: FakeBehavior) -> Arc<Self> {
        Arc::new(Self {
            name: "Mongo",
            behavior,
        })
    }

    pub fn postgres(behavior: FakeBehavior) -> Arc<Self> {
        Arc::new(Self {
            name: "Postgres",
            behavior,
        })
    }
}

#[async_trait]
impl BackingStore for FakeStore {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn connect(&self) -> Result<(), StoreError> {
        match self.behavior {
            FakeBehavior::Ready => Ok(()),
            FakeBehavior::Fail(reason) => Err(StoreError::Other(reason.to_string())),
            FakeBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

/// Gateway wiring shared by the integration tests
pub struct TestHarness {
    pub config: Config,
    pub sessions: Arc<MemorySessionStore>,
    pub reporter: ErrorReporter,
    static_root: TempDir,
}

impl TestHarness {
    pub fn development() -> Self {
        Self::new(DeploymentMode::Development)
    }

    pub fn production() -> Self {
        Self::new(DeploymentMode::Production)
    }

    fn new(mode: DeploymentMode) -> Self {
        let static_root = tempfile::tempdir().expect("Failed to create static root");
        std::fs::write(static_root.path().join("index.html"), INDEX_HTML)
            .expect("Failed to write index.html");
        std::fs::write(static_root.path().join("app.js"), "console.log('app');")
            .expect("Failed to write app.js");

        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            session_secret: TEST_SECRET.to_string(),
            mode,
            session_ttl: Duration::from_secs(300),
            static_root: static_root.path().to_path_buf(),
            ..Config::default()
        };

        Self {
            config,
            sessions: Arc::new(MemorySessionStore::new()),
            reporter: ErrorReporter::disabled(),
            static_root,
        }
    }

    pub fn with_rendertron(mut self, url: impl Into<String>) -> Self {
        self.config.rendertron_url = Some(url.into());
        self
    }

    /// Default components with both stores ready
    pub fn components(&self) -> Components {
        Components::new(&self.config, self.sessions.clone())
            .with_document_store(FakeStore::mongo(FakeBehavior::Ready))
            .with_relational_store(FakeStore::postgres(FakeBehavior::Ready))
            .with_reporter(self.reporter.clone())
    }

    /// Router built outside a running gateway
    pub fn app(&self) -> Router {
        self.app_with(self.components())
    }

    pub fn app_with(&self, components: Components) -> Router {
        build_app(&self.config, &components, Readiness::detached()).expect("Failed to build app")
    }

    /// `sid=...` cookie pair for an existing session id
    pub fn signed_cookie(&self, session_id: &str) -> String {
        format!("sid={}", CookieSigner::new(TEST_SECRET).sign(session_id))
    }

    /// Store a session record and return the cookie that names it
    pub async fn seed_session(&self, session_id: &str, data: SessionData) -> String {
        use gateway_core::server::auth::SessionStore;

        self.sessions
            .save(session_id, &data, Duration::from_secs(300))
            .await
            .expect("Failed to seed session");
        self.signed_cookie(session_id)
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone()
        .oneshot(request)
        .await
        .expect("Router is infallible")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::HOST, "example.com")
        .body(Body::empty())
        .unwrap()
}

pub fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::HOST, "example.com")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::HOST, "example.com")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// The `sid=...` pair from the response's `Set-Cookie`, if any
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("sid="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8")
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).expect("Body is not JSON")
}

/// Log output captured from a scoped subscriber
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Install a subscriber writing into this buffer for the current thread.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let buffer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || buffer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
