/*!
 * Duplex - primary/replica connection manager
 *
 * Keeps a primary and an optional replica connection to a store and fails
 * over between them when health probes say so:
 * - Bounded connect retry with linear backoff
 * - Periodic, timeout-bounded health probes
 * - Automatic demotion to replica-only mode and recovery
 * - TCP adapter built in, PostgreSQL adapter behind the `postgres` feature
 * - TOML configuration and structured logging
 *
 * The generic machinery lives in `duplex-core-failover`; this crate adds the
 * adapters, file configuration, and the CLI.
 */

pub mod adapters;
pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{BackendKind, DuplexConfig, LogFormat, LogLevel};
pub use duplex_core_failover::{
    ConnectionHandle, Connector, EndpointConfig, FailoverError, FailoverPolicy, ManagerConfig,
    ManagerStatus, Role, RoleGuard,
};
pub use error::{DuplexError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
