//! Endpoint and failover policy configuration
//!
//! All configuration is supplied once when a manager is constructed and is
//! read-only afterwards. [`ManagerConfig::validate`] runs before any network
//! activity and is the only source of [`FailoverError::ConfigInvalid`].

use crate::error::{FailoverError, Result};
use crate::role::Side;
use std::fmt;
use std::time::Duration;

/// Timeout applied to every background health probe.
///
/// Independent of caller-configured timeouts so that a wedged endpoint
/// cannot stall the monitor.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool sizing limits for one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolLimits {
    /// Maximum number of open connections
    pub max_open: u32,
    /// Maximum number of idle connections kept in the pool
    pub max_idle: u32,
    /// Maximum lifetime of a connection
    pub max_lifetime: Option<Duration>,
    /// Maximum time a connection may stay idle
    pub max_idle_time: Option<Duration>,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_open: 25,
            max_idle: 5,
            max_lifetime: Some(Duration::from_secs(300)),
            max_idle_time: Some(Duration::from_secs(300)),
        }
    }
}

/// Configuration for a single endpoint (primary or replica)
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Label used in logs; defaults to the address when empty
    pub name: String,
    /// Host/address of the endpoint, e.g. `db-1:5432`
    pub address: String,
    pub username: String,
    pub password: String,
    /// Database, keyspace, or virtual host, if the store has one
    pub database: Option<String>,
    pub pool: PoolLimits,
    /// Bound on a single connect attempt
    pub connect_timeout: Duration,
    /// Bound on a single store operation issued by an adapter
    pub operation_timeout: Duration,
    /// Extra attempts after the first failed connect
    pub max_retries: usize,
    /// Base interval for linear backoff between connect attempts
    pub retry_interval: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: "localhost:5432".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
            database: None,
            pool: PoolLimits::default(),
            connect_timeout: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_interval: Duration::from_secs(1),
        }
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("pool", &self.pool)
            .field("connect_timeout", &self.connect_timeout)
            .field("operation_timeout", &self.operation_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_interval", &self.retry_interval)
            .finish()
    }
}

impl EndpointConfig {
    /// Create an endpoint config for an address with default limits
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Name used in logs and errors
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.address
        } else {
            &self.name
        }
    }

    /// Total number of connect attempts made by the factory
    pub fn total_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Validate the endpoint configuration
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(FailoverError::ConfigInvalid("address is required".into()));
        }
        if self.username.trim().is_empty() {
            return Err(FailoverError::ConfigInvalid("username is required".into()));
        }
        if self.pool.max_open == 0 {
            return Err(FailoverError::ConfigInvalid(
                "max_open must be greater than 0".into(),
            ));
        }
        if self.pool.max_idle > self.pool.max_open {
            return Err(FailoverError::ConfigInvalid(format!(
                "max_idle ({}) cannot be greater than max_open ({})",
                self.pool.max_idle, self.pool.max_open
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(FailoverError::ConfigInvalid(
                "connect_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Policy governing replica use, failover, and health checking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverPolicy {
    /// Create and maintain a replica handle
    pub use_replica: bool,
    /// Advisory: callers should not write through the replica
    pub replica_read_only: bool,
    /// Allow demotion to replica-only mode when the primary fails
    pub auto_failover: bool,
    /// Reconnect attempts per detected failure
    pub failover_retries: usize,
    /// Pause between reconnect attempts
    pub failover_interval: Duration,
    /// Run the background health monitor
    pub health_check_enabled: bool,
    /// Period of the health monitor
    pub health_check_interval: Duration,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self {
            use_replica: true,
            replica_read_only: true,
            auto_failover: true,
            failover_retries: 3,
            failover_interval: Duration::from_secs(5),
            health_check_enabled: true,
            health_check_interval: Duration::from_secs(30),
        }
    }
}

impl FailoverPolicy {
    /// Policy for a primary-only deployment
    pub fn primary_only() -> Self {
        Self {
            use_replica: false,
            auto_failover: false,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.health_check_enabled && self.health_check_interval.is_zero() {
            return Err(FailoverError::ConfigInvalid(
                "health_check_interval must be greater than 0".into(),
            ));
        }
        if (self.auto_failover || self.health_check_enabled) && self.failover_retries == 0 {
            return Err(FailoverError::ConfigInvalid(
                "failover_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Complete configuration of one primary/replica manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    pub primary: EndpointConfig,
    pub replica: Option<EndpointConfig>,
    pub policy: FailoverPolicy,
}

impl ManagerConfig {
    /// Primary-only configuration
    pub fn primary_only(primary: EndpointConfig) -> Self {
        Self {
            primary,
            replica: None,
            policy: FailoverPolicy::primary_only(),
        }
    }

    /// Primary plus replica with the default failover policy
    pub fn with_replica(primary: EndpointConfig, replica: EndpointConfig) -> Self {
        Self {
            primary,
            replica: Some(replica),
            policy: FailoverPolicy::default(),
        }
    }

    /// Endpoint configuration for one side, if that side is configured
    pub fn endpoint(&self, side: Side) -> Option<&EndpointConfig> {
        match side {
            Side::Primary => Some(&self.primary),
            Side::Replica if self.policy.use_replica => self.replica.as_ref(),
            Side::Replica => None,
        }
    }

    /// True when a replica handle will be created
    pub fn replica_enabled(&self) -> bool {
        self.endpoint(Side::Replica).is_some()
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        self.primary
            .validate()
            .map_err(|e| prefix(Side::Primary, e))?;

        if self.policy.use_replica {
            let replica = self.replica.as_ref().ok_or_else(|| {
                FailoverError::ConfigInvalid(
                    "replica configuration is required when use_replica is true".into(),
                )
            })?;
            replica.validate().map_err(|e| prefix(Side::Replica, e))?;
        }

        self.policy.validate()
    }
}

fn prefix(side: Side, err: FailoverError) -> FailoverError {
    match err {
        FailoverError::ConfigInvalid(msg) => {
            FailoverError::ConfigInvalid(format!("invalid {} configuration: {}", side, msg))
        }
        other => other,
    }
}
