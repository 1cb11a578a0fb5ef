//! Fetch Cache CLI application
//!
//! Command-line interface for fetching JSON endpoints through the cache,
//! watching an endpoint for invalidations, and managing configuration.

use std::process;

use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

// Import CLI modules through the library (module is public but not re-exported)
use fetch_cache::cli::{handle_config, handle_get, handle_watch, Cli, Commands, ConfigAction};
use fetch_cache::config::AppConfig;
use fetch_cache::errors::Result;

#[tokio::main]
async fn main() {
    // Initialize program
    let result = run().await;

    // Handle any errors that occurred
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok(); // Ignore errors if file doesn't exist

    // Parse command line arguments
    let cli = Cli::parse_args();

    // `config init` must work before any config file exists
    let config = match &cli.command {
        Commands::Config(args) if matches!(args.action, ConfigAction::Init { .. }) => {
            AppConfig::default()
        }
        _ => AppConfig::load(cli.global.config.clone()).await?,
    };

    // Initialize logging based on verbosity
    init_logging(&cli, &config);

    info!("Fetch Cache v{} starting", env!("CARGO_PKG_VERSION"));

    // Execute the appropriate command
    match cli.command {
        Commands::Get(args) => {
            info!("Executing get command");
            handle_get(&cli.global, &config, args).await
        }
        Commands::Watch(args) => {
            info!("Executing watch command");
            handle_watch(&cli.global, &config, args).await
        }
        Commands::Config(args) => {
            info!("Executing config command");
            handle_config(&cli.global, &config, args).await
        }
    }
}

/// Initialize logging from CLI verbosity, falling back to the config file
fn init_logging(cli: &Cli, config: &AppConfig) {
    let level = cli
        .log_level()
        .map(|level| level.to_string().to_lowercase())
        .unwrap_or_else(|| config.logging.level.to_lowercase());

    // Create environment filter
    let mut filter = EnvFilter::from_default_env();
    let mut rejected = None;
    match format!("fetch_cache={}", level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(_) => {
            rejected = Some(level.clone());
            if let Ok(directive) = "fetch_cache=info".parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    // Initialize subscriber
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose) // Show levels only in very verbose mode
        .init();

    if let Some(level) = rejected {
        warn!("Unknown log level '{}' in configuration, using info", level);
    }

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
