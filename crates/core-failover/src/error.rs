//! Error types for the failover core

use std::time::Duration;
use thiserror::Error;

use crate::role::Side;

/// Errors produced by connection handles and the manager around them
///
/// Only [`FailoverError::ConfigInvalid`] and [`FailoverError::ConnectFailed`]
/// (plus cancellation and lifecycle misuse) are ever returned from
/// `RoleGuard::connect`. Probe and reconnect failures stay inside the
/// background monitor and surface only through `is_healthy()`/`has_replica()`.
#[derive(Debug, Error, Clone)]
pub enum FailoverError {
    /// Configuration rejected before any network activity
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// All initial connection attempts were exhausted
    #[error("Failed to connect to {endpoint} after {attempts} attempt(s): {source}")]
    ConnectFailed {
        endpoint: String,
        attempts: usize,
        #[source]
        source: Box<FailoverError>,
    },

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// A bounded operation did not finish in time
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Health probe failed (never returned to callers)
    #[error("Health probe failed for {side}: {reason}")]
    ProbeFailed { side: Side, reason: String },

    /// Reconnection gave up after the configured number of retries
    #[error("Reconnect of {side} exhausted after {attempts} attempt(s)")]
    ReconnectExhausted { side: Side, attempts: usize },

    /// Closing one side of the manager failed
    #[error("Error closing {side} connection: {source}")]
    CloseError {
        side: Side,
        #[source]
        source: Box<FailoverError>,
    },

    /// No handle is installed for the requested side
    #[error("{0} connection not established")]
    NotConnected(Side),

    /// `connect()` was called on a manager that is already connected
    #[error("Manager is already connected")]
    AlreadyConnected,

    /// The manager has been closed and cannot be reused
    #[error("Manager is closed")]
    Closed,

    /// Store-specific failure reported by an adapter
    #[error("Backend error: {0}")]
    Backend(String),

    /// I/O failure reported by an adapter
    #[error("I/O error: {0}")]
    Io(String),
}

impl FailoverError {
    /// Check if this error came from configuration validation
    pub fn is_config(&self) -> bool {
        matches!(self, FailoverError::ConfigInvalid(_))
    }

    /// Check if retrying the same operation could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailoverError::Timeout(_)
                | FailoverError::Backend(_)
                | FailoverError::Io(_)
                | FailoverError::ProbeFailed { .. }
        )
    }

    /// Build a close error for one side
    pub fn close(side: Side, source: FailoverError) -> Self {
        FailoverError::CloseError {
            side,
            source: Box::new(source),
        }
    }
}

impl From<std::io::Error> for FailoverError {
    fn from(err: std::io::Error) -> Self {
        FailoverError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FailoverError>;
