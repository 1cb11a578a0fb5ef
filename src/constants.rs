//! Application constants for the fetch cache
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// Environment variable holding the API base URL
    pub const API_BASE_URL: &str = "FETCH_CACHE_API_URL";
}

/// API endpoint resolution
pub mod api {
    /// Base URL used when neither the environment nor the config file set one
    pub const FALLBACK_BASE_URL: &str = "/api";
}

/// Cache freshness and validity policy
pub mod cache {
    use super::Duration;

    /// Age below which an entry is served without a background refresh
    pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(30);

    /// Age at or beyond which an entry is discarded
    pub const VALIDITY_WINDOW: Duration = Duration::from_secs(5 * 60);
}

/// Invalidation debouncing and task scheduling
pub mod debounce {
    use super::Duration;

    /// Quiet period that must elapse after the last signal before refreshing
    pub const QUIET_WINDOW: Duration = Duration::from_millis(500);

    /// Upper bound on how long an idle-time callback may be deferred
    pub const IDLE_TIMEOUT: Duration = Duration::from_secs(2);

    /// Scheduler rounds that approximate an idle runtime
    pub const IDLE_YIELD_ROUNDS: usize = 8;

    /// Capacity of each invalidation broadcast channel
    pub const SIGNAL_CHANNEL_CAPACITY: usize = 64;
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!("fetch-cache/", env!("CARGO_PKG_VERSION"));

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 8;
}

/// Rate limiting
pub mod limits {
    /// Default client-side rate limit (requests per second, 0 = unlimited)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 0;
}

/// Configuration file locations
pub mod files {
    /// Project-local configuration file name
    pub const LOCAL_CONFIG_FILE: &str = "fetch-cache.toml";

    /// Directory under the user config dir
    pub const CONFIG_DIR_NAME: &str = "fetch-cache";

    /// File name under the user config dir
    pub const CONFIG_FILE_NAME: &str = "config.toml";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_are_ordered() {
        assert!(cache::FRESHNESS_WINDOW < cache::VALIDITY_WINDOW);
        assert_eq!(debounce::QUIET_WINDOW, Duration::from_millis(500));
    }

    #[test]
    fn test_user_agent_has_version() {
        assert!(http::USER_AGENT.starts_with("fetch-cache/"));
    }
}
