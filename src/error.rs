/*!
 * Error types for Duplex
 */

use duplex_core_failover::FailoverError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DuplexError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_DEGRADED: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug, Error)]
pub enum DuplexError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error from the failover manager
    #[error(transparent)]
    Failover(#[from] FailoverError),

    /// Backend named in the configuration is unknown or not compiled in
    #[error("Unsupported backend: {0}")]
    Backend(String),
}

impl DuplexError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // Fatal errors: nothing can work until the operator fixes something
            DuplexError::Config(_) | DuplexError::Toml { .. } | DuplexError::Backend(_) => {
                EXIT_FATAL
            }
            DuplexError::Failover(e) if e.is_config() => EXIT_FATAL,
            DuplexError::Failover(FailoverError::ConnectFailed { .. }) => EXIT_FATAL,
            // Everything else: the process ran but the endpoints are not all healthy
            _ => EXIT_DEGRADED,
        }
    }

    /// Check if this error is fatal (should not retry)
    pub fn is_fatal(&self) -> bool {
        match self {
            DuplexError::Config(_) | DuplexError::Toml { .. } | DuplexError::Backend(_) => true,
            DuplexError::Failover(e) => e.is_config(),
            DuplexError::Io(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_exit_codes() {
        assert_eq!(DuplexError::Config("bad".to_string()).exit_code(), EXIT_FATAL);
        assert_eq!(
            DuplexError::Backend("redis".to_string()).exit_code(),
            EXIT_FATAL
        );
        assert_eq!(
            DuplexError::from(FailoverError::ConfigInvalid("address is required".into()))
                .exit_code(),
            EXIT_FATAL
        );
        assert_eq!(
            DuplexError::from(FailoverError::Timeout(Duration::from_secs(5))).exit_code(),
            EXIT_DEGRADED
        );
    }

    #[test]
    fn test_connect_failure_is_fatal_exit() {
        let err = DuplexError::from(FailoverError::ConnectFailed {
            endpoint: "db:5432".into(),
            attempts: 4,
            source: Box::new(FailoverError::Io("connection refused".into())),
        });
        assert_eq!(err.exit_code(), EXIT_FATAL);
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("after 4 attempt(s)"));
    }

    #[test]
    fn test_is_fatal() {
        assert!(DuplexError::Config("x".into()).is_fatal());
        assert!(!DuplexError::Io(io::Error::new(io::ErrorKind::TimedOut, "slow")).is_fatal());
        assert!(DuplexError::from(FailoverError::ConfigInvalid("x".into())).is_fatal());
    }

    #[test]
    fn test_failover_error_is_transparent() {
        let err = DuplexError::from(FailoverError::Closed);
        assert_eq!(err.to_string(), "Manager is closed");
    }
}
