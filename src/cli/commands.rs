//! Command handlers for the fetch cache CLI
//!
//! This module implements the command handlers that coordinate between
//! CLI arguments and the cache engine.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::app::client::is_absolute;
use crate::app::signals::shutdown_signal;
use crate::app::{FetchCache, FetchState, FetchStatus, HttpTransport, SessionOptions, Transform};
use crate::cli::{ConfigAction, ConfigArgs, GetArgs, GlobalArgs, WatchArgs};
use crate::config::{resolve_base_url, AppConfig, ConfigInit};
use crate::errors::{AppError, Result};

/// Base URL after applying the `--base-url` override
pub fn effective_base_url(global: &GlobalArgs, config: &AppConfig) -> String {
    match &global.base_url {
        Some(url) => resolve_base_url(Some(url), None),
        None => config.resolve_base_url(),
    }
}

/// Build the fetch cache service from configuration
pub fn build_service(global: &GlobalArgs, config: &AppConfig) -> Result<Arc<FetchCache>> {
    let (service_config, client_config) = config.to_runtime_config()?;
    let transport = Arc::new(HttpTransport::new(&client_config)?);
    let base_url = effective_base_url(global, config);

    if !is_absolute(&base_url) {
        warn!(
            "Base URL '{}' is relative; only absolute paths can be fetched. Set --base-url or {}",
            base_url,
            crate::constants::env::API_BASE_URL
        );
    }

    Ok(FetchCache::new(service_config, base_url, transport))
}

fn session_options(select: Option<&str>) -> SessionOptions {
    let options = SessionOptions::default();
    match select {
        Some(pointer) => options.with_transform(Transform::pointer(pointer)),
        None => options,
    }
}

/// When and how long ago the cached entry for an identifier was captured
fn describe_entry(service: &FetchCache, identifier: &str) -> Option<String> {
    let entry = service.store().peek(identifier)?;
    Some(format!(
        "cached at {} (age {:.2?})",
        entry.captured_wall.format("%Y-%m-%d %H:%M:%S UTC"),
        entry.age()
    ))
}

fn render(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Handle the get command
///
/// Every path gets its own session; all requests (`paths × repeat`) are
/// issued concurrently so repeated paths share one network call.
pub async fn handle_get(global: &GlobalArgs, config: &AppConfig, args: GetArgs) -> Result<()> {
    args.validate().map_err(AppError::generic)?;
    let service = build_service(global, config)?;
    let start_time = Instant::now();

    let options = session_options(args.select.as_deref())
        .without_auto_fetch()
        .with_cache_enabled(!args.no_cache);
    let sessions: Vec<_> = args
        .paths
        .iter()
        .map(|path| service.attach(path.clone(), options.clone()))
        .collect();

    info!(
        "Requesting {} paths {} time(s) each",
        sessions.len(),
        args.repeat
    );
    let (force, repeat) = (args.force, args.repeat);
    let requests = sessions
        .iter()
        .flat_map(|session| (0..repeat).map(move |_| session.request(force)));
    let results = join_all(requests).await;

    let mut first_error = None;
    for (session, outcomes) in sessions.iter().zip(results.chunks(repeat)) {
        println!("📄 {}", session.identifier());
        match outcomes.first() {
            Some(Ok(value)) => {
                println!("{}", render(value));
                if let Some(line) = describe_entry(&service, &session.identifier()) {
                    println!("   {}", line);
                }
            }
            Some(Err(e)) => {
                println!("❌ {}", e);
                first_error.get_or_insert_with(|| e.clone());
            }
            None => {}
        }
        println!();
    }

    println!("📊 Cache Statistics ({:.2?})", start_time.elapsed());
    println!("========================");
    println!("{}", service.stats());

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn print_state(identifier: &str, state: &FetchState) {
    let marker = match state.status {
        FetchStatus::Idle => "⏸️ ",
        FetchStatus::ServingFromCache => "💾",
        FetchStatus::Loading => "⏳",
        FetchStatus::Success => "✅",
        FetchStatus::Error => "❌",
    };
    println!("{} {} [{}]", marker, identifier, state.status);

    if let Some(error) = &state.error {
        println!("   error: {}", error);
    }
    if !state.loading {
        if let Some(data) = &state.data {
            println!("{}", render(data));
        }
    }
}

/// Handle the watch command
///
/// Attaches an auto-fetching session and prints every state it publishes.
/// Each line on stdin emits the invalidation signal; Ctrl+C stops.
pub async fn handle_watch(global: &GlobalArgs, config: &AppConfig, args: WatchArgs) -> Result<()> {
    args.validate().map_err(AppError::generic)?;
    let service = build_service(global, config)?;

    let options = session_options(args.select.as_deref()).with_invalidation_signal(args.signal.clone());
    let session = service.attach(args.path.clone(), options);
    let mut states = session.subscribe();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    println!(
        "👀 Watching {} (Enter emits '{}', Ctrl+C stops)",
        args.path, args.signal
    );

    loop {
        tokio::select! {
            reason = &mut shutdown => {
                debug!("Stopping watch on {}", reason);
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                print_state(&args.path, &state);
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(_)) => {
                    let listeners = service.emit(&args.signal);
                    debug!("Emitted '{}' to {} listeners", args.signal, listeners);
                }
                Ok(None) => {
                    debug!("stdin closed, signals can no longer be emitted");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    session.detach();

    println!();
    println!("📊 Cache Statistics");
    println!("==================");
    println!("{}", service.stats());
    Ok(())
}

/// Handle configuration management
pub async fn handle_config(global: &GlobalArgs, config: &AppConfig, args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Init { path, force } => {
            let target = path.or_else(|| global.config.clone());
            match AppConfig::write_default(target, force).await? {
                ConfigInit::Created(path) => {
                    println!("📁 Created default configuration file:");
                    println!("   {}", path.display());
                    println!("   You can customize settings by editing this file.");
                }
                ConfigInit::AlreadyExists(path) => {
                    println!("📁 Configuration file already exists:");
                    println!("   {}", path.display());
                    println!("   Use --force to overwrite it.");
                }
            }
        }
        ConfigAction::Show => {
            println!("⚙️  Effective Configuration");
            println!("=========================");
            println!("{}", config.to_toml_string()?);
            println!("Resolved base URL: {}", effective_base_url(global, config));
        }
    }

    Ok(())
}
