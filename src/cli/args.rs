//! Command-line argument parsing for the fetch cache
//!
//! This module defines the CLI structure using clap derive macros: fetching
//! endpoints through the cache, watching an endpoint for invalidations, and
//! managing the configuration file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Fetch Cache - cached, deduplicated JSON endpoint fetching
#[derive(Parser, Debug)]
#[command(
    name = "fetch_cache",
    version,
    about = "Fetch JSON endpoints through a deduplicating, stale-while-revalidate cache",
    long_about = "Fetches JSON endpoints through an in-memory cache.
Concurrent requests share one network call, aging responses are served while they are refreshed in the background, and bursts of invalidation signals collapse into one refresh."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (trace level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - warnings and errors only
    #[arg(short, long, global = true, conflicts_with_all = ["verbose", "very_verbose"])]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base URL for relative paths (overrides config and environment)
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch one or more endpoints and print their JSON
    Get(GetArgs),

    /// Attach to an endpoint and print every state change
    Watch(WatchArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for the get command
#[derive(Args, Debug, Clone)]
pub struct GetArgs {
    /// Resource paths (relative to the base URL) or absolute URLs
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<String>,

    /// Request every path this many times, concurrently
    #[arg(short, long, default_value = "1")]
    pub repeat: usize,

    /// Always go to the network
    #[arg(short, long)]
    pub force: bool,

    /// Bypass the cache when deciding whether to fetch
    #[arg(long)]
    pub no_cache: bool,

    /// JSON pointer selecting part of each response (e.g. /items/0)
    #[arg(short, long, value_name = "POINTER")]
    pub select: Option<String>,
}

/// Arguments for the watch command
#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Resource path or absolute URL
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Invalidation signal emitted for every line read from stdin
    #[arg(long, default_value = "refresh")]
    pub signal: String,

    /// JSON pointer selecting part of the response
    #[arg(short, long, value_name = "POINTER")]
    pub select: Option<String>,
}

/// Arguments for configuration management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented default configuration file
    Init {
        /// Where to write it (defaults to the user config directory)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration and resolved base URL
    Show,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging level requested on the command line
    ///
    /// `None` means the configuration file decides.
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.global.quiet {
            Some(tracing::Level::WARN)
        } else if self.global.very_verbose {
            Some(tracing::Level::TRACE)
        } else if self.global.verbose {
            Some(tracing::Level::DEBUG)
        } else {
            None
        }
    }
}

impl GetArgs {
    /// Validate argument combinations
    pub fn validate(&self) -> Result<(), String> {
        if self.repeat == 0 {
            return Err("--repeat must be at least 1".to_string());
        }

        if let Some(pointer) = &self.select {
            validate_pointer(pointer)?;
        }

        Ok(())
    }
}

impl WatchArgs {
    /// Validate argument combinations
    pub fn validate(&self) -> Result<(), String> {
        if self.signal.trim().is_empty() {
            return Err("--signal cannot be empty".to_string());
        }

        if let Some(pointer) = &self.select {
            validate_pointer(pointer)?;
        }

        Ok(())
    }
}

fn validate_pointer(pointer: &str) -> Result<(), String> {
    if pointer.is_empty() || pointer.starts_with('/') {
        Ok(())
    } else {
        Err(format!("JSON pointer '{}' must start with '/'", pointer))
    }
}
