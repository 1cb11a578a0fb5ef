//! reqwest-backed transport
//!
//! Issues plain GET requests with an optional client-side rate limit. The
//! transport never retries: a failed request is reported to the caller as
//! is and the orchestrator decides what the consumer sees.

use std::num::NonZeroU32;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Jitter, Quota, RateLimiter};
use reqwest::Client;
use tracing::{debug, trace};

use crate::errors::{FetchError, FetchResult};

use super::config::ClientConfig;
use super::{Transport, TransportResponse};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// HTTP transport with optional rate limiting
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    rate_limiter: Option<DirectRateLimiter>,
}

impl HttpTransport {
    /// Creates a transport from client configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if the reqwest client cannot be built
    pub fn new(config: &ClientConfig) -> FetchResult<Self> {
        let client = config.build_http_client()?;
        Ok(Self::with_client(client, config.rate_limit_rps))
    }

    /// Wrap an existing client
    pub fn with_client(client: Client, rate_limit_rps: u32) -> Self {
        Self {
            client,
            rate_limiter: Self::build_rate_limiter(rate_limit_rps),
        }
    }

    /// Builds the rate limiter, `None` when unlimited
    fn build_rate_limiter(rate_limit_rps: u32) -> Option<DirectRateLimiter> {
        NonZeroU32::new(rate_limit_rps).map(|rps| RateLimiter::direct(Quota::per_second(rps)))
    }

    /// Get a reference to the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn send(&self, url: &str) -> FetchResult<TransportResponse> {
        if let Some(limiter) = &self.rate_limiter {
            limiter
                .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
                .await;
            trace!("Rate limiter admitted request to {}", url);
        }

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_builder() {
                FetchError::network(format!("Invalid request URL '{}': {}", url, e))
            } else {
                FetchError::from(e)
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!("Received HTTP {} from {} ({} bytes)", status, url, body.len());

        Ok(TransportResponse { status, body })
    }
}

impl Transport for HttpTransport {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, FetchResult<TransportResponse>> {
        self.send(url).boxed()
    }
}
