//! Configuration types, built from environment variables.
//!
//! Every section reads through a [`ConfigLookup`] so tests can supply a map
//! instead of mutating the process environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::channels::mailhog::MailHogConfig;
use crate::channels::smtp::SmtpConfig;
use crate::erp::ErpConfig;
use crate::error::ConfigError;

/// Key → value source (normally `std::env::var`).
pub type ConfigLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Read a string, falling back to `default` when unset or blank.
pub fn env_or(lookup: ConfigLookup<'_>, key: &str, default: &str) -> String {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Read an optional string; blank counts as unset.
pub fn env_opt(lookup: ConfigLookup<'_>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a typed value, falling back to `default` when unset.
pub fn env_parse<T>(lookup: ConfigLookup<'_>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(lookup, key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_lookup(lookup: ConfigLookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or(lookup, "APP_HOST", "0.0.0.0"),
            port: env_parse(lookup, "APP_PORT", 8000)?,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "APP_HOST".into(),
                message: format!("{}:{}: {e}", self.host, self.port),
            })
    }
}

/// Event store settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Upper bound on concurrent store operations.
    pub max_connections: usize,
    /// How long a caller may wait for a free slot before failing.
    pub acquire_timeout: Duration,
    /// Bound on a single write.
    pub write_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/poquotator.db"),
            max_connections: 5,
            acquire_timeout: Duration::from_millis(2000),
            write_timeout: Duration::from_millis(5000),
        }
    }
}

impl StoreConfig {
    pub fn from_lookup(lookup: ConfigLookup<'_>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_connections: usize =
            env_parse(lookup, "DB_MAX_CONNECTIONS", defaults.max_connections)?;
        if max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DB_MAX_CONNECTIONS".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(Self {
            path: PathBuf::from(env_or(
                lookup,
                "DATABASE_PATH",
                &defaults.path.to_string_lossy(),
            )),
            max_connections,
            acquire_timeout: Duration::from_millis(env_parse(lookup, "DB_ACQUIRE_TIMEOUT_MS", 2000)?),
            write_timeout: Duration::from_millis(env_parse(lookup, "DB_WRITE_TIMEOUT_MS", 5000)?),
        })
    }
}

/// Pipeline execution settings.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    /// Max attempts processed at once by a batch run.
    pub max_concurrency: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

impl ProcessingConfig {
    pub fn from_lookup(lookup: ConfigLookup<'_>) -> Result<Self, ConfigError> {
        let max_concurrency: usize = env_parse(lookup, "PROCESS_MAX_CONCURRENCY", 4)?;
        Ok(Self {
            max_concurrency: max_concurrency.max(1),
        })
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub erp: ErpConfig,
    pub mail: MailHogConfig,
    pub smtp: SmtpConfig,
    pub store: StoreConfig,
    pub processing: ProcessingConfig,
    /// Directory for the rolling file log; stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: ConfigLookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_lookup(lookup)?,
            erp: ErpConfig::from_lookup(lookup)?,
            mail: MailHogConfig::from_lookup(lookup)?,
            smtp: SmtpConfig::from_lookup(lookup)?,
            store: StoreConfig::from_lookup(lookup)?,
            processing: ProcessingConfig::from_lookup(lookup)?,
            log_dir: env_opt(lookup, "POQUOTATOR_LOG_DIR").map(PathBuf::from),
        })
    }
}
