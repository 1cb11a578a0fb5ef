//! Fetch Cache Library
//!
//! A client-side fetch cache for JSON endpoints. Concurrent requests for the
//! same resource share one network call, cached responses are served while
//! they are revalidated in the background, and bursts of invalidation
//! signals collapse into a single refresh.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_accessible() {
        assert_eq!(env::API_BASE_URL, "FETCH_CACHE_API_URL");
        assert_eq!(api::FALLBACK_BASE_URL, "/api");
        assert!(http::USER_AGENT.starts_with("fetch-cache/"));
    }

    #[test]
    fn test_error_types() {
        let app_error = AppError::from(errors::FetchError::http_status(404));
        assert_eq!(app_error.category(), "transport");
        assert_eq!(app_error.to_string(), "HTTP error! status: 404");
    }
}
