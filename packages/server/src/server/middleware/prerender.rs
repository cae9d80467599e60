use axum::{
    extract::{Request, State},
    http::{header, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, warn};

lazy_static! {
    // Crawlers that cannot execute the client bundle
    static ref BOT_USER_AGENTS: Regex = Regex::new(
        r"(?i)W3C_Validator|baiduspider|bingbot|embedly|facebookexternalhit|linkedinbot|outbrain|pinterest|quora link preview|rogerbot|showyoubot|slackbot|twitterbot|vkShare"
    ).unwrap();

    // Static assets are never rendered
    static ref EXCLUDED_PATHS: Regex = Regex::new(
        r"(?i)\.(js|css|xml|less|png|jpg|jpeg|gif|pdf|doc|txt|ico|rss|zip|mp3|rar|exe|wmv|avi|ppt|mpg|mpeg|tif|wav|mov|psd|ai|xls|mp4|m4a|swf|dat|dmg|iso|flv|m4v|torrent|woff|ttf|svg|eot)$"
    ).unwrap();
}

/// Time allowed for the rendering service to answer
const RENDER_TIMEOUT: Duration = Duration::from_secs(11);

/// Client for the headless rendering service
#[derive(Clone)]
pub struct Prerenderer {
    proxy_url: String,
    http: reqwest::Client,
}

impl Prerenderer {
    pub fn new(proxy_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::with_timeout(proxy_url, RENDER_TIMEOUT)
    }

    pub fn with_timeout(
        proxy_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let mut proxy_url = proxy_url.into();
        if !proxy_url.ends_with('/') {
            proxy_url.push('/');
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { proxy_url, http })
    }

    /// Rendering-service URL for an absolute page URL
    pub fn render_url(&self, page_url: &str) -> String {
        format!("{}{}", self.proxy_url, urlencoding::encode(page_url))
    }

    async fn render(&self, page_url: &str) -> Result<Response, reqwest::Error> {
        let rendered = self.http.get(self.render_url(page_url)).send().await?;
        let status = rendered.status();
        let content_type = rendered.headers().get(header::CONTENT_TYPE).cloned();
        let body = rendered.bytes().await?;

        let mut response = (status, body).into_response();
        if let Some(content_type) = content_type {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, content_type);
        }
        Ok(response)
    }
}

/// True for crawler GETs of pages (not assets)
pub fn is_crawler_request(request: &Request) -> bool {
    if request.method() != Method::GET {
        return false;
    }

    let is_bot = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ua| BOT_USER_AGENTS.is_match(ua));

    is_bot && !EXCLUDED_PATHS.is_match(request.uri().path())
}

/// Absolute URL of the incoming request, as the crawler saw it
fn page_url(request: &Request) -> Option<String> {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))?;

    let scheme = request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");

    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    Some(format!("{scheme}://{host}{path}"))
}

/// Prerender middleware.
///
/// Crawler requests are answered by the rendering service; everything else,
/// and any request the service fails to render, continues unchanged.
pub async fn prerender(
    State(prerenderer): State<Prerenderer>,
    request: Request,
    next: Next,
) -> Response {
    if !is_crawler_request(&request) {
        return next.run(request).await;
    }
    let Some(url) = page_url(&request) else {
        return next.run(request).await;
    };

    match prerenderer.render(&url).await {
        Ok(response) => {
            debug!(url = %url, status = %response.status(), "Served prerendered page");
            response
        }
        Err(e) => {
            warn!(url = %url, error = %e, "Prerender failed, serving the page as is");
            next.run(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use std::time::Instant;
    use tower::ServiceExt;

    fn request(method: &str, path: &str, user_agent: &str) -> Request {
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::HOST, "example.com")
            .header(header::USER_AGENT, user_agent)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_detects_crawlers() {
        assert!(is_crawler_request(&request(
            "GET",
            "/posts/1",
            "Mozilla/5.0 (compatible; bingbot/2.0)"
        )));
        assert!(is_crawler_request(&request("GET", "/", "Twitterbot/1.0")));
        assert!(!is_crawler_request(&request(
            "GET",
            "/posts/1",
            "Mozilla/5.0 (X11; Linux x86_64) Firefox/120.0"
        )));
    }

    #[test]
    fn test_skips_assets_and_non_get() {
        assert!(!is_crawler_request(&request("GET", "/app.js", "Twitterbot/1.0")));
        assert!(!is_crawler_request(&request("GET", "/logo.PNG", "Twitterbot/1.0")));
        assert!(!is_crawler_request(&request("POST", "/posts", "Twitterbot/1.0")));
    }

    #[test]
    fn test_render_url_encodes_page() {
        let prerenderer = Prerenderer::new("http://render.local/render").unwrap();
        let url = page_url(&request("GET", "/posts?id=1", "Twitterbot/1.0")).unwrap();
        assert_eq!(url, "http://example.com/posts?id=1");
        assert_eq!(
            prerenderer.render_url(&url),
            "http://render.local/render/http%3A%2F%2Fexample.com%2Fposts%3Fid%3D1"
        );
    }

    #[tokio::test]
    async fn test_slow_renderer_times_out_and_falls_through() {
        let renderer = Router::new().route(
            "/render/*page",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "<html>rendered</html>"
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, renderer).await.unwrap();
        });

        let prerenderer = Prerenderer::with_timeout(
            format!("http://{address}/render"),
            Duration::from_millis(200),
        )
        .unwrap();
        let app = Router::new()
            .fallback(|| async { "spa shell" })
            .layer(middleware::from_fn_with_state(prerenderer, prerender));

        let started = Instant::now();
        let response = app
            .oneshot(request("GET", "/posts/1", "Twitterbot/1.0"))
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        assert_eq!(&body[..], b"spa shell");
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
