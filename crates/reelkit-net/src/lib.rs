//! # ReelKit Net
//!
//! Production network fetcher for the ReelKit offline cache proxy.
//!
//! Implements [`NetworkFetcher`] over reqwest and classifies every response
//! against the configured shell origin the way the caching policy expects:
//! same-origin responses are [`ResponseKind::Basic`], cross-origin responses
//! the server exposed through CORS are [`ResponseKind::Cors`], and anything
//! else comes back masked [`ResponseKind::Opaque`] (status 0, no headers,
//! empty body).
//!
//! Transport failures map to [`SwError::Network`]; HTTP error statuses come
//! back as ordinary responses. That split lets the proxy tell "the server
//! said no" apart from "the network is gone", which is what triggers the
//! offline fallback.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

use reelkit_sw::{NetworkFetcher, Request, Response, ResponseKind, SwError};

/// Network fetcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConfig {
    /// User agent string.
    pub user_agent: String,
    /// Accept-Language header sent with every request.
    pub accept_language: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            user_agent: "ReelKit/0.1".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// reqwest-backed [`NetworkFetcher`].
pub struct HttpFetcher {
    client: reqwest::Client,
    config: NetConfig,
    /// Origin of the application shell; responses from anywhere else are
    /// cross-origin.
    origin: Url,
}

impl HttpFetcher {
    /// Create a fetcher for the application served from `shell_origin`.
    pub fn new(shell_origin: Url, config: NetConfig) -> Result<Self, SwError> {
        if shell_origin.cannot_be_a_base() {
            return Err(SwError::Config(format!(
                "shell origin {} cannot be a base URL",
                shell_origin
            )));
        }

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| SwError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            origin: shell_origin,
        })
    }

    /// The shell origin responses are classified against.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn classify(&self, url: &Url, headers: &HashMap<String, String>) -> ResponseKind {
        if url.origin() == self.origin.origin() {
            return ResponseKind::Basic;
        }
        match headers.get("access-control-allow-origin").map(String::as_str) {
            Some("*") => ResponseKind::Cors,
            Some(allowed) if allowed == self.origin.origin().ascii_serialization() => {
                ResponseKind::Cors
            }
            _ => ResponseKind::Opaque,
        }
    }
}

#[async_trait]
impl NetworkFetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, SwError> {
        debug!(method = %request.method, url = %request.url, "fetching resource");

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| SwError::Config(format!("invalid method: {}", request.method)))?;

        let mut builder = self
            .client
            .request(method, request.url.clone())
            .header("Accept-Language", &self.config.accept_language);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        // Transport failures (refused connection, DNS, timeout) surface here;
        // HTTP error statuses do not.
        let response = builder
            .send()
            .await
            .map_err(|e| SwError::Network(e.to_string()))?;

        let status = response.status();
        let url = response.url().clone();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| SwError::Network(e.to_string()))?;

        let kind = self.classify(&url, &headers);
        trace!(
            url = %url,
            status = status.as_u16(),
            kind = ?kind,
            body_len = body.len(),
            "response received"
        );

        if kind == ResponseKind::Opaque {
            // Cross-origin without CORS: mask everything, browser-style.
            return Ok(Response {
                url,
                status: 0,
                status_text: String::new(),
                headers: HashMap::new(),
                body: Bytes::new(),
                kind,
                from_cache: false,
            });
        }

        Ok(Response {
            url,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
            kind,
            from_cache: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with(route: &str, template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    fn origin_of(server: &MockServer) -> Url {
        Url::parse(&server.uri()).unwrap()
    }

    fn foreign_origin() -> Url {
        Url::parse("https://app.logreel.test/").unwrap()
    }

    #[test]
    fn test_rejects_non_base_origin() {
        let origin = Url::parse("mailto:team@logreel.test").unwrap();
        let err = HttpFetcher::new(origin, NetConfig::default()).err().unwrap();
        assert!(matches!(err, SwError::Config(_)));
    }

    #[tokio::test]
    async fn test_same_origin_200_is_basic_and_cacheable() {
        let server = server_with(
            "/app.js",
            ResponseTemplate::new(200).set_body_raw("console.log('reel')", "application/javascript"),
        )
        .await;
        let fetcher = HttpFetcher::new(origin_of(&server), NetConfig::default()).unwrap();

        let request = Request::get(origin_of(&server).join("/app.js").unwrap());
        let response = fetcher.fetch(&request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.kind, ResponseKind::Basic);
        assert!(response.is_cacheable());
        assert!(!response.from_cache);
        assert_eq!(&response.body[..], b"console.log('reel')");
        assert_eq!(response.header("content-type"), Some("application/javascript"));
    }

    #[tokio::test]
    async fn test_http_error_status_is_an_ok_response() {
        let server = server_with("/missing", ResponseTemplate::new(404)).await;
        let fetcher = HttpFetcher::new(origin_of(&server), NetConfig::default()).unwrap();

        let request = Request::get(origin_of(&server).join("/missing").unwrap());
        let response = fetcher.fetch(&request).await.unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.kind, ResponseKind::Basic);
        assert!(!response.ok());
        assert!(!response.is_cacheable());
    }

    #[tokio::test]
    async fn test_cross_origin_with_cors_header_is_cors() {
        let server = server_with(
            "/font.css",
            ResponseTemplate::new(200)
                .insert_header("access-control-allow-origin", "*")
                .set_body_raw("@font-face{}", "text/css"),
        )
        .await;
        // The shell lives elsewhere; the loopback server is a foreign origin.
        let fetcher = HttpFetcher::new(foreign_origin(), NetConfig::default()).unwrap();

        let request = Request::get(origin_of(&server).join("/font.css").unwrap());
        let response = fetcher.fetch(&request).await.unwrap();

        assert_eq!(response.kind, ResponseKind::Cors);
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"@font-face{}");
        // Visible but never stored by live-traffic policy.
        assert!(!response.is_cacheable());
    }

    #[tokio::test]
    async fn test_cross_origin_without_cors_is_masked_opaque() {
        let server = server_with(
            "/secret.js",
            ResponseTemplate::new(200).set_body_raw("leak", "application/javascript"),
        )
        .await;
        let fetcher = HttpFetcher::new(foreign_origin(), NetConfig::default()).unwrap();

        let request = Request::get(origin_of(&server).join("/secret.js").unwrap());
        let response = fetcher.fetch(&request).await.unwrap();

        assert_eq!(response.kind, ResponseKind::Opaque);
        assert_eq!(response.status, 0);
        assert!(response.headers.is_empty());
        assert!(response.body.is_empty());
        assert!(!response.is_cacheable());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_network_error() {
        // A pooled server from `MockServer::start()` keeps listening after
        // drop; an exclusively-owned one shuts its listener down.
        let server = MockServer::builder().start().await;
        let url = origin_of(&server).join("/index.html").unwrap();
        let fetcher = HttpFetcher::new(origin_of(&server), NetConfig::default()).unwrap();
        drop(server);

        let err = fetcher.fetch(&Request::navigate(url)).await.unwrap_err();
        assert!(matches!(err, SwError::Network(_)));
    }
}
