//! Request and response model, and the host network abstraction.

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::SwError;

/// How a request was dispatched by the application.
///
/// Only [`RequestMode::Navigate`] changes proxy policy: a navigation that
/// fails offline is answered with the cached shell document. The other modes
/// matter to the network fetcher when it classifies the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level document navigation.
    Navigate,
    /// Same-origin subresource.
    SameOrigin,
    /// Cross-origin request with CORS.
    #[default]
    Cors,
    /// Cross-origin request without CORS; the response comes back opaque.
    NoCors,
}

impl RequestMode {
    /// Whether this is a page navigation.
    pub fn is_navigation(&self) -> bool {
        matches!(self, RequestMode::Navigate)
    }
}

/// An outgoing request as seen by the proxy.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method, normalized to uppercase.
    pub method: String,
    /// Target URL.
    pub url: Url,
    /// Dispatch mode.
    pub mode: RequestMode,
    /// Request headers.
    pub headers: HashMap<String, String>,
}

impl Request {
    /// Create a request with an explicit method and mode.
    pub fn new(method: impl Into<String>, url: Url, mode: RequestMode) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            url,
            mode,
            headers: HashMap::new(),
        }
    }

    /// Create a GET subresource request.
    pub fn get(url: Url) -> Self {
        Self::new("GET", url, RequestMode::default())
    }

    /// Create a top-level navigation request.
    pub fn navigate(url: Url) -> Self {
        Self::new("GET", url, RequestMode::Navigate)
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The store key this request is looked up under.
    pub fn cache_key(&self) -> String {
        crate::cache::request_key(&self.method, &self.url)
    }
}

/// How much of a response is visible to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    /// Same-origin response; status, headers and body fully visible.
    Basic,
    /// Cross-origin response the server exposed through CORS.
    Cors,
    /// Cross-origin response with masked status, headers and body.
    Opaque,
}

/// A response as seen by the proxy: status and headers plus a fully buffered
/// body.
///
/// Bodies are [`Bytes`], so copying a response into a cache store is a
/// reference-count bump rather than a stream split.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL, after any redirects the fetcher followed.
    pub url: Url,
    /// HTTP status code (0 for opaque responses).
    pub status: u16,
    /// Status reason phrase.
    pub status_text: String,
    /// Response headers, names lowercase.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Bytes,
    /// Visibility classification.
    pub kind: ResponseKind,
    /// Whether this response was served out of a cache store.
    pub from_cache: bool,
}

impl Response {
    /// Whether the status is a success (2xx).
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether live-traffic policy may store a copy of this response: status
    /// exactly 200 and a fully visible same-origin body. Partial, redirect
    /// and error statuses fail the first check; opaque and CORS responses
    /// fail the second.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind == ResponseKind::Basic
    }

    /// Get a header value by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.as_str())
    }
}

/// Host-provided network access.
///
/// `fetch` resolves with a [`Response`] for every exchange that produced one,
/// including HTTP error statuses. It returns [`SwError::Network`] only when
/// transport fails outright (connectivity loss, DNS failure, reset); that
/// distinction is what drives the offline fallback path.
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
    /// Perform the request against the live network.
    async fn fetch(&self, request: &Request) -> Result<Response, SwError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn response(status: u16, kind: ResponseKind) -> Response {
        Response {
            url: url("https://app.logreel.test/index.html"),
            status,
            status_text: String::new(),
            headers: HashMap::new(),
            body: Bytes::from_static(b"hello"),
            kind,
            from_cache: false,
        }
    }

    #[test]
    fn test_request_method_normalized() {
        let request = Request::new("post", url("https://app.logreel.test/api"), RequestMode::Cors);
        assert_eq!(request.method, "POST");
    }

    #[test]
    fn test_request_constructors() {
        let get = Request::get(url("https://app.logreel.test/a.js"));
        assert_eq!(get.method, "GET");
        assert_eq!(get.mode, RequestMode::Cors);
        assert!(!get.mode.is_navigation());

        let nav = Request::navigate(url("https://app.logreel.test/"));
        assert_eq!(nav.mode, RequestMode::Navigate);
        assert!(nav.mode.is_navigation());
    }

    #[test]
    fn test_request_header_builder() {
        let request = Request::get(url("https://app.logreel.test/a.js"))
            .header("accept", "application/json");
        assert_eq!(
            request.headers.get("accept").map(|v| v.as_str()),
            Some("application/json")
        );
    }

    #[test]
    fn test_response_ok_bounds() {
        assert!(response(200, ResponseKind::Basic).ok());
        assert!(response(204, ResponseKind::Basic).ok());
        assert!(!response(199, ResponseKind::Basic).ok());
        assert!(!response(301, ResponseKind::Basic).ok());
        assert!(!response(404, ResponseKind::Basic).ok());
    }

    #[test]
    fn test_cacheable_requires_200_and_basic() {
        assert!(response(200, ResponseKind::Basic).is_cacheable());
        // 2xx is not enough; only a full 200 qualifies.
        assert!(!response(204, ResponseKind::Basic).is_cacheable());
        assert!(!response(206, ResponseKind::Basic).is_cacheable());
        assert!(!response(404, ResponseKind::Basic).is_cacheable());
        assert!(!response(200, ResponseKind::Cors).is_cacheable());
        assert!(!response(200, ResponseKind::Opaque).is_cacheable());
    }

    #[test]
    fn test_header_lookup() {
        let mut resp = response(200, ResponseKind::Basic);
        resp.headers
            .insert("content-type".to_string(), "text/html".to_string());
        assert_eq!(resp.header("content-type"), Some("text/html"));
        assert_eq!(resp.header("etag"), None);
    }
}
