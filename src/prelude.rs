//! Prelude module for the Fetch Cache Library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical usage
//! with a single `use fetch_cache::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use fetch_cache::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(None).await?;
//!     let transport = Arc::new(HttpTransport::new(&config.client_config())?);
//!     let service = FetchCache::new(config.fetch_cache_config()?, config.resolve_base_url(), transport);
//!
//!     let session = service.attach("/engineers", SessionOptions::default().without_auto_fetch());
//!     let engineers = session.request(false).await?;
//!     println!("{}", engineers);
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, FetchError, FetchResult, Result};

// Configuration
pub use crate::config::AppConfig;

// Essential app components that are used in most integrations
pub use crate::app::{
    CacheConfig,
    CacheStats,
    ClientConfig,
    // Core orchestration
    FetchCache,
    FetchCacheConfig,
    FetchSession,
    FetchState,
    FetchStatus,
    HttpTransport,
    // Extension points
    InvalidationChannel,
    Scheduler,
    SchedulerKind,
    SessionOptions,
    Transform,
    Transport,
};

// Standard library re-exports that are commonly needed
pub use std::sync::Arc;

// Common external crate re-exports for convenience
pub use serde_json::Value;
pub use tokio;
