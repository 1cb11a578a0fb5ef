//! Command-line interface components
//!
//! This module contains CLI-specific code for the fetch cache application:
//! argument parsing and the command handlers.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, ConfigAction, ConfigArgs, GetArgs, GlobalArgs, WatchArgs};
pub use commands::{build_service, effective_base_url, handle_config, handle_get, handle_watch};
