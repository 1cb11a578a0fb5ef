//! Configuration management for the fetch cache
//!
//! This module provides TOML configuration loading with zero-config
//! defaults, conversion to the runtime configuration types, and resolution
//! of the API base URL every relative resource path is composed against.

use std::path::{Path, PathBuf};
use std::time::Duration;

use humantime_serde::re::humantime::format_duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app::scheduler::SchedulerKind;
use crate::app::{CacheConfig, ClientConfig, FetchCacheConfig};
use crate::constants::{api, cache, debounce, env, files, http, limits};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// API endpoint settings
    pub api: ApiConfigToml,
    /// Cache freshness policy
    pub cache: CacheConfigToml,
    /// HTTP client settings
    pub client: ClientConfigToml,
    /// Invalidation debounce settings
    pub debounce: DebounceConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly API configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApiConfigToml {
    /// Base URL for relative resource paths
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// TOML-friendly cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfigToml {
    /// Entries younger than this are served without revalidation
    #[serde(with = "humantime_serde")]
    pub freshness_window: Duration,
    /// Entries older than this are discarded
    #[serde(with = "humantime_serde")]
    pub validity_window: Duration,
}

impl Default for CacheConfigToml {
    fn default() -> Self {
        Self {
            freshness_window: cache::FRESHNESS_WINDOW,
            validity_window: cache::VALIDITY_WINDOW,
        }
    }
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    /// Connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Whole-request timeout (unset = none)
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<Duration>,
    /// Connection pool idle timeout (unset = keep forever)
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections per host
    pub pool_max_per_host: usize,
    /// Rate limit in requests per second (0 = unlimited)
    pub rate_limit_rps: u32,
    /// User agent override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            connect_timeout: http::CONNECT_TIMEOUT,
            request_timeout: None,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            user_agent: None,
        }
    }
}

/// TOML-friendly debounce configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfigToml {
    /// Quiet period closing a burst of invalidation signals
    #[serde(with = "humantime_serde")]
    pub quiet_window: Duration,
    /// Upper bound for the idle scheduler
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// priority, idle or immediate
    pub scheduler: SchedulerKind,
}

impl Default for DebounceConfigToml {
    fn default() -> Self {
        Self {
            quiet_window: debounce::QUIET_WINDOW,
            idle_timeout: debounce::IDLE_TIMEOUT,
            scheduler: SchedulerKind::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Result of writing the default configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigInit {
    Created(PathBuf),
    AlreadyExists(PathBuf),
}

impl AppConfig {
    /// Convert TOML-friendly configuration to runtime configuration
    pub fn to_runtime_config(&self) -> ConfigResult<(FetchCacheConfig, ClientConfig)> {
        Ok((self.fetch_cache_config()?, self.client_config()))
    }

    /// Runtime configuration for the fetch cache service
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for zero windows or a freshness
    /// window that is not shorter than the validity window
    pub fn fetch_cache_config(&self) -> ConfigResult<FetchCacheConfig> {
        let config = FetchCacheConfig {
            cache: self.cache.to_runtime_config(),
            quiet_window: self.debounce.quiet_window,
            idle_timeout: self.debounce.idle_timeout,
            scheduler: self.debounce.scheduler,
        };
        config.validate().map_err(|reason| ConfigError::InvalidValue {
            field: "cache/debounce".to_string(),
            reason,
        })?;
        Ok(config)
    }

    /// Runtime configuration for the HTTP transport
    pub fn client_config(&self) -> ClientConfig {
        self.client.to_runtime_config()
    }

    /// Resolve the base URL relative paths are composed against
    ///
    /// Precedence: the `FETCH_CACHE_API_URL` environment variable, then
    /// `[api] base_url`, then `/api`. Trailing slashes are stripped.
    pub fn resolve_base_url(&self) -> String {
        resolve_base_url(
            std::env::var(env::API_BASE_URL).ok().as_deref(),
            self.api.base_url.as_deref(),
        )
    }

    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        self.fetch_cache_config()?;

        if let Some(base_url) = &self.api.base_url {
            let trimmed = base_url.trim();
            if crate::app::client::is_absolute(trimmed) {
                url::Url::parse(trimmed).map_err(|e| ConfigError::InvalidValue {
                    field: "api.base_url".to_string(),
                    reason: e.to_string(),
                })?;
            }
        }

        Ok(())
    }

    /// Load configuration with multi-source precedence:
    /// 1. Default values
    /// 2. Config file (explicit path, else the first standard location found)
    /// 3. Environment variables (base URL only, see [`resolve_base_url`](Self::resolve_base_url))
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path });
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        let config = match config_path {
            Some(path) => Self::load_from_file(&path).await?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Write a commented default configuration file
    ///
    /// Uses the user config directory when no path is given. An existing
    /// file is left alone unless `force` is set.
    pub async fn write_default(path: Option<PathBuf>, force: bool) -> ConfigResult<ConfigInit> {
        let config_path = match path {
            Some(path) => path,
            None => Self::default_config_path()?,
        };

        if config_path.exists() && !force {
            return Ok(ConfigInit::AlreadyExists(config_path));
        }

        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(&config_path, Self::generate_default_config_content())
            .await
            .map_err(|source| ConfigError::Io {
                path: config_path.clone(),
                source,
            })?;

        info!("Wrote default configuration to {}", config_path.display());
        Ok(ConfigInit::Created(config_path))
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(".").join(files::LOCAL_CONFIG_FILE)];
        match Self::default_config_path() {
            Ok(path) => search_paths.push(path),
            Err(e) => debug!("Skipping user config: {}", e),
        }

        for path in search_paths {
            if path.exists() {
                debug!("Found config file: {}", path.display());
                return Some(path);
            }
        }

        debug!("No config file found in standard locations");
        None
    }

    /// Get the default config file path for the current user
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir
            .join(files::CONFIG_DIR_NAME)
            .join(files::CONFIG_FILE_NAME))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let config: AppConfig =
            toml::from_str(&content).map_err(|source| ConfigError::InvalidFormat {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Generate default configuration content with helpful comments
    fn generate_default_config_content() -> String {
        format!(
            r#"# Fetch Cache Configuration
# You can customize any of these settings to suit your needs.

[api]
# Base URL for relative resource paths.
# The {env_var} environment variable takes precedence.
# base_url = "https://example.com/api"

[cache]
# Entries younger than this are served without a background refresh
freshness_window = "{freshness}"
# Entries this old are discarded on the next read
validity_window = "{validity}"

[client]
connect_timeout = "{connect}"
# request_timeout = "60s"  # No request timeout unless set
pool_idle_timeout = "{pool_idle}"
pool_max_per_host = {pool_max}
rate_limit_rps = {rps}  # 0 = unlimited
# user_agent = "{user_agent}"

[debounce]
# Quiet period closing a burst of invalidation signals
quiet_window = "{quiet}"
idle_timeout = "{idle}"
scheduler = "{scheduler}"  # priority, idle or immediate

[logging]
level = "info"  # error, warn, info, debug, trace
"#,
            env_var = env::API_BASE_URL,
            freshness = format_duration(cache::FRESHNESS_WINDOW),
            validity = format_duration(cache::VALIDITY_WINDOW),
            connect = format_duration(http::CONNECT_TIMEOUT),
            pool_idle = format_duration(http::POOL_IDLE_TIMEOUT),
            pool_max = http::POOL_MAX_PER_HOST,
            rps = limits::DEFAULT_RATE_LIMIT_RPS,
            user_agent = http::USER_AGENT,
            quiet = format_duration(debounce::QUIET_WINDOW),
            idle = format_duration(debounce::IDLE_TIMEOUT),
            scheduler = SchedulerKind::default(),
        )
    }
}

/// Pick the base URL from an environment value and a configured value
///
/// Blank values are ignored; the fallback is [`api::FALLBACK_BASE_URL`].
pub fn resolve_base_url(from_env: Option<&str>, configured: Option<&str>) -> String {
    let chosen = [from_env, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(api::FALLBACK_BASE_URL);

    let stripped = chosen.trim_end_matches('/');
    if stripped.is_empty() && !chosen.is_empty() {
        warn!("Base URL '{}' is only slashes, using the site root", chosen);
    }
    stripped.to_string()
}

impl CacheConfigToml {
    /// Convert to runtime CacheConfig
    pub fn to_runtime_config(&self) -> CacheConfig {
        CacheConfig {
            freshness_window: self.freshness_window,
            validity_window: self.validity_window,
        }
    }
}

impl ClientConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            pool_idle_timeout: self.pool_idle_timeout,
            pool_max_per_host: self.pool_max_per_host,
            rate_limit_rps: self.rate_limit_rps,
            user_agent: self
                .user_agent
                .clone()
                .unwrap_or_else(|| http::USER_AGENT.to_string()),
        }
    }
}
