//! The minimal contract a store-specific connection must satisfy
//!
//! A store plugs into the manager by implementing two traits:
//!
//! - [`ConnectionHandle`]: one live connection (or driver pool) to a single
//!   endpoint.
//! - [`Connector`]: creates unconnected handles from an [`EndpointConfig`].
//!
//! Everything else a store offers (queries, commands, publish/consume) is
//! layered on top of the handle and never seen by the manager.

use crate::config::EndpointConfig;
use crate::error::FailoverError;
use crate::stats::ConnectionStats;

/// A connection to one endpoint
///
/// `connect` is called exactly once, by the factory, on a handle nobody else
/// can see yet. After that the handle is shared behind an `Arc` and only the
/// `&self` methods are used.
#[async_trait::async_trait]
pub trait ConnectionHandle: Send + Sync + 'static {
    /// Establish the connection
    async fn connect(&mut self) -> Result<(), FailoverError>;

    /// Release the connection. Called at most once per handle by the manager.
    async fn close(&self) -> Result<(), FailoverError>;

    /// Round-trip check against the endpoint
    async fn ping(&self) -> Result<(), FailoverError>;

    /// Health check used by the monitor
    async fn is_healthy(&self) -> bool {
        self.ping().await.is_ok()
    }

    /// Pool statistics; must not perform I/O
    fn stats(&self) -> ConnectionStats;

    /// Label used in logs
    fn endpoint(&self) -> &str;
}

/// Per-store adapter that knows how to create handles
pub trait Connector: Send + Sync + 'static {
    type Handle: ConnectionHandle;

    /// Create an unconnected handle for `endpoint`
    ///
    /// Failures here are configuration problems (bad DSN, unparsable
    /// address) and should be reported as `ConfigInvalid`.
    fn handle(&self, endpoint: &EndpointConfig) -> Result<Self::Handle, FailoverError>;
}
