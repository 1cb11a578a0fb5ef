//! Transport layer for endpoint fetches
//!
//! This module defines the [`Transport`] seam used by the orchestrator and
//! the reqwest-backed implementation used in production, along with URL
//! composition and the JSON fetch contract:
//!
//! - `config`: HTTP client configuration and building
//! - `http`: reqwest transport with optional client-side rate limiting
//!
//! A fetch succeeds only on a 2xx status with a JSON body. Anything else is
//! a [`FetchError`]: `Transport` for network failures and non-2xx statuses,
//! `Decode` for bodies that are not JSON.

use std::fmt;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{FetchError, FetchResult};

pub mod config;
pub mod http;

pub use config::ClientConfig;
pub use http::HttpTransport;

/// Raw response as seen by the fetch layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues HTTP GET requests
///
/// Implementations report network failures as [`FetchError::Transport`];
/// status interpretation and JSON decoding happen in [`fetch_json`].
pub trait Transport: Send + Sync + fmt::Debug {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, FetchResult<TransportResponse>>;
}

/// Whether a path is already an absolute HTTP(S) URL
pub fn is_absolute(path: &str) -> bool {
    let lower = path.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Build the request URL for a resource path
///
/// Absolute URLs pass through verbatim; anything else is appended to the
/// base URL.
pub fn compose_url(base_url: &str, path: &str) -> String {
    if is_absolute(path) {
        path.to_string()
    } else {
        format!("{}{}", base_url, path)
    }
}

/// GET a URL and decode its JSON body
pub async fn fetch_json(transport: &dyn Transport, url: &str) -> FetchResult<Value> {
    debug!("GET {}", url);
    let response = transport.get(url).await.map_err(|e| {
        warn!("Request to {} failed: {}", url, e);
        e
    })?;

    if !response.is_success() {
        warn!("Request to {} returned HTTP {}", url, response.status);
        return Err(FetchError::http_status(response.status));
    }

    let value = serde_json::from_str(&response.body)?;
    debug!("Decoded response from {}", url);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;

    #[derive(Debug)]
    struct Fixed(FetchResult<TransportResponse>);

    impl Transport for Fixed {
        fn get<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, FetchResult<TransportResponse>> {
            let response = self.0.clone();
            async move { response }.boxed()
        }
    }

    #[test]
    fn test_compose_relative_and_absolute() {
        assert_eq!(compose_url("/api", "/engineers"), "/api/engineers");
        assert_eq!(
            compose_url("https://example.com/api", "/engineers"),
            "https://example.com/api/engineers"
        );
        assert_eq!(
            compose_url("/api", "https://other.example.com/x"),
            "https://other.example.com/x"
        );
        assert!(is_absolute("HTTP://EXAMPLE.COM"));
        assert!(!is_absolute("/http://"));
    }

    #[tokio::test]
    async fn test_fetch_json_success() {
        let transport = Fixed(Ok(TransportResponse::new(200, r#"{"a":1}"#)));
        let value = fetch_json(&transport, "/x").await.unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_fetch_json_non_2xx() {
        let transport = Fixed(Ok(TransportResponse::new(404, "not found")));
        let error = fetch_json(&transport, "/x").await.unwrap_err();
        assert_eq!(error.status(), Some(404));
        assert_eq!(error.to_string(), "HTTP error! status: 404");
    }

    #[tokio::test]
    async fn test_fetch_json_decode_error() {
        let transport = Fixed(Ok(TransportResponse::new(200, "<html>")));
        let error = fetch_json(&transport, "/x").await.unwrap_err();
        assert_eq!(error.category(), "decode");
    }

    #[tokio::test]
    async fn test_fetch_json_network_error() {
        let transport = Fixed(Err(FetchError::network("connection refused")));
        let error = fetch_json(&transport, "/x").await.unwrap_err();
        assert!(error.is_transport());
        assert_eq!(error.status(), None);
    }
}
