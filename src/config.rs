/*!
 * File configuration for Duplex
 *
 * A TOML document describing the backend, logging, both endpoints, and the
 * failover policy. Every field is optional and defaults to the same value as
 * the core library; durations are integer milliseconds.
 */

use crate::error::{DuplexError, Result};
use duplex_core_failover::{EndpointConfig, FailoverPolicy, ManagerConfig, PoolLimits};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DuplexConfig {
    /// Store adapter used for both endpoints
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub primary: EndpointSection,

    /// Replica endpoint; required unless `failover.use_replica = false`
    #[serde(default)]
    pub replica: Option<EndpointSection>,

    #[serde(default)]
    pub failover: FailoverSection,
}

/// Which adapter connects the endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Plain TCP reachability
    #[default]
    Tcp,

    /// PostgreSQL via sqlx (requires the `postgres` feature)
    Postgres,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Tcp => write!(f, "tcp"),
            BackendKind::Postgres => write!(f, "postgres"),
        }
    }
}

/// Logging output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single line
    #[default]
    Compact,

    /// One JSON object per line
    Json,
}

/// One endpoint as written in the file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSection {
    pub name: String,
    pub address: String,
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    pub database: Option<String>,
    pub max_open: u32,
    pub max_idle: u32,
    /// 0 disables the limit
    pub max_lifetime_ms: u64,
    /// 0 disables the limit
    pub max_idle_time_ms: u64,
    pub connect_timeout_ms: u64,
    pub operation_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_interval_ms: u64,
}

impl Default for EndpointSection {
    fn default() -> Self {
        Self::from(&EndpointConfig::default())
    }
}

impl From<&EndpointConfig> for EndpointSection {
    fn from(endpoint: &EndpointConfig) -> Self {
        Self {
            name: endpoint.name.clone(),
            address: endpoint.address.clone(),
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
            database: endpoint.database.clone(),
            max_open: endpoint.pool.max_open,
            max_idle: endpoint.pool.max_idle,
            max_lifetime_ms: endpoint.pool.max_lifetime.map_or(0, as_millis),
            max_idle_time_ms: endpoint.pool.max_idle_time.map_or(0, as_millis),
            connect_timeout_ms: as_millis(endpoint.connect_timeout),
            operation_timeout_ms: as_millis(endpoint.operation_timeout),
            max_retries: endpoint.max_retries,
            retry_interval_ms: as_millis(endpoint.retry_interval),
        }
    }
}

impl From<&EndpointSection> for EndpointConfig {
    fn from(section: &EndpointSection) -> Self {
        Self {
            name: section.name.clone(),
            address: section.address.clone(),
            username: section.username.clone(),
            password: section.password.clone(),
            database: section.database.clone(),
            pool: PoolLimits {
                max_open: section.max_open,
                max_idle: section.max_idle,
                max_lifetime: optional_millis(section.max_lifetime_ms),
                max_idle_time: optional_millis(section.max_idle_time_ms),
            },
            connect_timeout: Duration::from_millis(section.connect_timeout_ms),
            operation_timeout: Duration::from_millis(section.operation_timeout_ms),
            max_retries: section.max_retries,
            retry_interval: Duration::from_millis(section.retry_interval_ms),
        }
    }
}

/// Failover policy as written in the file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverSection {
    pub use_replica: bool,
    pub replica_read_only: bool,
    pub auto_failover: bool,
    pub failover_retries: usize,
    pub failover_interval_ms: u64,
    pub health_check_enabled: bool,
    pub health_check_interval_ms: u64,
}

impl Default for FailoverSection {
    fn default() -> Self {
        Self::from(&FailoverPolicy::default())
    }
}

impl From<&FailoverPolicy> for FailoverSection {
    fn from(policy: &FailoverPolicy) -> Self {
        Self {
            use_replica: policy.use_replica,
            replica_read_only: policy.replica_read_only,
            auto_failover: policy.auto_failover,
            failover_retries: policy.failover_retries,
            failover_interval_ms: as_millis(policy.failover_interval),
            health_check_enabled: policy.health_check_enabled,
            health_check_interval_ms: as_millis(policy.health_check_interval),
        }
    }
}

impl From<&FailoverSection> for FailoverPolicy {
    fn from(section: &FailoverSection) -> Self {
        Self {
            use_replica: section.use_replica,
            replica_read_only: section.replica_read_only,
            auto_failover: section.auto_failover,
            failover_retries: section.failover_retries,
            failover_interval: Duration::from_millis(section.failover_interval_ms),
            health_check_enabled: section.health_check_enabled,
            health_check_interval: Duration::from_millis(section.health_check_interval_ms),
        }
    }
}

fn as_millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

fn optional_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl DuplexConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DuplexError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&contents).map_err(|source| DuplexError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| DuplexError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Render as TOML with passwords removed
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        redacted.primary.password.clear();
        if let Some(replica) = redacted.replica.as_mut() {
            replica.password.clear();
        }
        toml::to_string_pretty(&redacted)
            .map_err(|e| DuplexError::Config(format!("Failed to render configuration: {}", e)))
    }

    /// Convert to the core manager configuration
    pub fn to_manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            primary: EndpointConfig::from(&self.primary),
            replica: self.replica.as_ref().map(EndpointConfig::from),
            policy: FailoverPolicy::from(&self.failover),
        }
    }

    /// Validate the file configuration and return the manager configuration
    pub fn validate(&self) -> Result<ManagerConfig> {
        if self.backend == BackendKind::Postgres && !cfg!(feature = "postgres") {
            return Err(DuplexError::Backend(
                "postgres (rebuild with --features postgres)".to_string(),
            ));
        }
        let config = self.to_manager_config();
        config.validate()?;
        Ok(config)
    }
}
