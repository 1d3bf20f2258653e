//! Duplex Core Failover: primary/replica connection management
//!
//! # Overview
//!
//! This crate keeps a primary connection and an optional replica connection
//! to any store that can answer a ping, and fails over between them
//! automatically. It includes:
//!
//! - **Connection Factory**: Builds connected handles with bounded retry and linear backoff
//! - **Health Monitor**: Periodic, timeout-bounded probes of both handles
//! - **Failover Controller**: Demotes to replica-only mode and reconnects failed sides
//! - **Role Guard**: The public manager tying the pieces together behind a reader/writer lock
//!
//! # Key Principles
//!
//! This crate has no knowledge of any particular store. Postgres, Redis,
//! a message broker, or a plain TCP service all plug in through two traits
//! in [`handle`]: [`ConnectionHandle`] and [`Connector`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Your Application                │
//! └─────────────┬───────────────────────────┘
//!               │ reader() / writer() / ping()
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       RoleGuard                         │  ← Owns slots + role
//! │  (RwLock: primary, replica, role)       │
//! └──────┬──────────────────────▲───────────┘
//!        │ spawn                │ swap under write lock
//!        ▼                      │
//! ┌──────────────────┐   ┌──────┴──────────────────┐
//! │  Health Monitor  │──▶│  Failover Controller    │
//! │  (tick, probe)   │   │  (demote, reconnect)    │
//! └──────────────────┘   └──────┬──────────────────┘
//!                               │
//!                               ▼
//!                  ┌─────────────────────────┐
//!                  │   Connection Factory    │
//!                  │  (retry, backoff)       │
//!                  └────────────┬────────────┘
//!                               ▼
//!                     Store adapter (Connector)
//! ```
//!
//! # Usage Example
//!
//! ```
//! use duplex_core_failover::prelude::*;
//! use duplex_core_failover::testing::MockConnector;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), FailoverError> {
//! let config = ManagerConfig::with_replica(
//!     EndpointConfig::new("db-primary:5432"),
//!     EndpointConfig::new("db-replica:5432"),
//! );
//!
//! let guard = RoleGuard::new(MockConnector::new(), config);
//! let cancel = CancellationToken::new();
//! guard.connect(&cancel).await?;
//!
//! assert!(guard.is_primary_active().await);
//! guard.ping(&cancel).await?;
//!
//! guard.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod factory;
pub mod guard;
pub mod handle;
pub mod metrics;
pub mod monitor;
pub mod role;
mod slots;
pub mod stats;
pub mod testing;

// Re-export main types for convenience
pub use config::{EndpointConfig, FailoverPolicy, ManagerConfig, PoolLimits, PROBE_TIMEOUT};
pub use controller::{decide, Decision, FailoverController, ProbeReport};
pub use error::{FailoverError, Result};
pub use factory::ConnectionFactory;
pub use guard::{ManagerStatus, RoleGuard};
pub use handle::{ConnectionHandle, Connector};
pub use metrics::{FailoverMetrics, MetricsSnapshot};
pub use monitor::{HealthMonitor, MonitorTask};
pub use role::{Lifecycle, Role, Side};
pub use stats::ConnectionStats;

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use duplex_core_failover::prelude::*;
/// ```
pub mod prelude {
    pub use super::config::{EndpointConfig, FailoverPolicy, ManagerConfig};
    pub use super::error::FailoverError;
    pub use super::guard::{ManagerStatus, RoleGuard};
    pub use super::handle::{ConnectionHandle, Connector};
    pub use super::role::{Role, Side};
    pub use super::stats::ConnectionStats;
}
