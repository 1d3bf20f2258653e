//! PostgreSQL adapter backed by an sqlx pool
//!
//! Each handle owns one `PgPool` sized from the endpoint's [`PoolLimits`].
//! `connect` creates the pool and opens its first connection; `ping` runs
//! `SELECT 1` bounded by the endpoint's operation timeout.
//!
//! [`PoolLimits`]: duplex_core_failover::PoolLimits

use async_trait::async_trait;
use duplex_core_failover::{
    ConnectionHandle, ConnectionStats, Connector, EndpointConfig, FailoverError,
};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::debug;

/// Creates [`PostgresHandle`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

impl PostgresConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for PostgresConnector {
    type Handle = PostgresHandle;

    fn handle(&self, endpoint: &EndpointConfig) -> Result<PostgresHandle, FailoverError> {
        Ok(PostgresHandle {
            label: endpoint.label().to_string(),
            connect_options: connect_options(endpoint)?,
            pool_options: pool_options(endpoint),
            operation_timeout: endpoint.operation_timeout,
            max_open: endpoint.pool.max_open,
            pool: None,
        })
    }
}

fn connect_options(endpoint: &EndpointConfig) -> Result<PgConnectOptions, FailoverError> {
    let (host, port) = match endpoint.address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                FailoverError::ConfigInvalid(format!(
                    "address '{}' has an invalid port",
                    endpoint.address
                ))
            })?;
            (host, port)
        }
        None => (endpoint.address.as_str(), 5432),
    };

    let mut options = PgConnectOptions::new()
        .host(host)
        .port(port)
        .username(&endpoint.username);
    if !endpoint.password.is_empty() {
        options = options.password(&endpoint.password);
    }
    if let Some(database) = endpoint.database.as_deref() {
        options = options.database(database);
    }
    Ok(options)
}

fn pool_options(endpoint: &EndpointConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(endpoint.pool.max_open)
        .min_connections(0)
        .acquire_timeout(endpoint.connect_timeout)
        .max_lifetime(endpoint.pool.max_lifetime)
        .idle_timeout(endpoint.pool.max_idle_time)
}

/// One sqlx pool against a single PostgreSQL server
pub struct PostgresHandle {
    label: String,
    connect_options: PgConnectOptions,
    pool_options: PgPoolOptions,
    operation_timeout: Duration,
    max_open: u32,
    pool: Option<PgPool>,
}

impl PostgresHandle {
    /// The underlying pool, once connected
    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    fn connected_pool(&self) -> Result<&PgPool, FailoverError> {
        self.pool
            .as_ref()
            .ok_or_else(|| FailoverError::Backend(format!("{} is not connected", self.label)))
    }
}

#[async_trait]
impl ConnectionHandle for PostgresHandle {
    async fn connect(&mut self) -> Result<(), FailoverError> {
        let pool = self
            .pool_options
            .clone()
            .connect_with(self.connect_options.clone())
            .await
            .map_err(backend_error)?;
        debug!(
            endpoint = %self.label,
            max_connections = self.max_open,
            "PostgreSQL pool created"
        );
        self.pool = Some(pool);
        Ok(())
    }

    async fn close(&self) -> Result<(), FailoverError> {
        if let Some(pool) = self.pool.as_ref() {
            pool.close().await;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), FailoverError> {
        let pool = self.connected_pool()?;
        let query = sqlx::query("SELECT 1").execute(pool);
        match tokio::time::timeout(self.operation_timeout, query).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(backend_error(e)),
            Err(_) => Err(FailoverError::Timeout(self.operation_timeout)),
        }
    }

    fn stats(&self) -> ConnectionStats {
        let Some(pool) = self.pool.as_ref() else {
            return ConnectionStats::default();
        };
        let open = pool.size();
        let idle = u32::try_from(pool.num_idle()).unwrap_or(open);
        ConnectionStats {
            open_connections: open,
            idle_connections: idle,
            in_use_connections: open.saturating_sub(idle),
            ..Default::default()
        }
    }

    fn endpoint(&self) -> &str {
        &self.label
    }
}

fn backend_error(err: sqlx::Error) -> FailoverError {
    match err {
        sqlx::Error::Io(e) => FailoverError::from(e),
        sqlx::Error::PoolTimedOut => FailoverError::Backend("pool timed out".to_string()),
        sqlx::Error::Configuration(e) => FailoverError::ConfigInvalid(e.to_string()),
        other => FailoverError::Backend(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_starts_unconnected() {
        let mut endpoint = EndpointConfig::new("db-primary:6543");
        endpoint.database = Some("orders".into());
        let handle = PostgresConnector::new().handle(&endpoint).unwrap();

        assert!(handle.pool().is_none());
        assert!(handle.stats().is_empty());
        assert_eq!(handle.endpoint(), "db-primary:6543");
        assert_eq!(handle.connect_options.get_port(), 6543);
        assert_eq!(handle.connect_options.get_database(), Some("orders"));
    }

    #[test]
    fn test_default_port() {
        let options = connect_options(&EndpointConfig::new("localhost")).unwrap();
        assert_eq!(options.get_port(), 5432);
        assert_eq!(options.get_host(), "localhost");
    }

    #[test]
    fn test_bad_port_is_config_error() {
        let err = connect_options(&EndpointConfig::new("db:abc")).unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_ping_before_connect() {
        let handle = PostgresConnector::new()
            .handle(&EndpointConfig::new("localhost:5432"))
            .unwrap();
        assert!(handle.ping().await.is_err());
        assert!(handle.close().await.is_ok());
    }
}
