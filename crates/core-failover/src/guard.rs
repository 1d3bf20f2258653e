//! RoleGuard: the public primary/replica manager
//!
//! Owns both handle slots, the current [`Role`], and the lifecycle of the
//! background [`HealthMonitor`]. Readers take a shared lock and never wait on
//! network I/O; writers (failover, reconnect, close) take the exclusive lock
//! only to swap state.
//!
//! Concurrent `connect` calls are serialized on their own mutex, which no
//! accessor takes, so `status()` and friends answer while a connect is still
//! retrying.

use crate::config::ManagerConfig;
use crate::controller::FailoverController;
use crate::error::{FailoverError, Result};
use crate::factory::ConnectionFactory;
use crate::handle::{ConnectionHandle, Connector};
use crate::metrics::{FailoverMetrics, MetricsSnapshot};
use crate::monitor::{HealthMonitor, MonitorTask};
use crate::role::{Lifecycle, Role, Side};
use crate::slots::{SharedSlots, Slots};
use crate::stats::ConnectionStats;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Point-in-time view of a manager
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerStatus {
    pub role: Role,
    pub lifecycle: Lifecycle,
    pub has_replica: bool,
    pub replica_read_only: bool,
    pub primary_endpoint: String,
    pub replica_endpoint: Option<String>,
    /// Stats of the installed primary handle, if any
    pub primary: Option<ConnectionStats>,
    /// Stats of the installed replica handle, if any
    pub replica: Option<ConnectionStats>,
    pub monitor_running: bool,
    pub metrics: MetricsSnapshot,
}

/// Primary/replica connection manager with health-driven failover
pub struct RoleGuard<C: Connector> {
    config: Arc<ManagerConfig>,
    factory: Arc<ConnectionFactory<C>>,
    slots: SharedSlots<C::Handle>,
    metrics: Arc<FailoverMetrics>,
    connecting: Mutex<()>,
    monitor: Mutex<Option<MonitorTask>>,
}

impl<C: Connector> RoleGuard<C> {
    /// Create an idle manager. Nothing is connected until [`connect`](Self::connect).
    pub fn new(connector: C, config: ManagerConfig) -> Self {
        Self {
            config: Arc::new(config),
            factory: Arc::new(ConnectionFactory::new(connector)),
            slots: Arc::new(RwLock::new(Slots::new())),
            metrics: Arc::new(FailoverMetrics::new()),
            connecting: Mutex::new(()),
            monitor: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        self.factory.connector()
    }

    /// Build the primary (and replica, if enabled) and start the monitor
    ///
    /// # Errors
    ///
    /// - `AlreadyConnected` / `Closed` when called out of order
    /// - `ConfigInvalid` before any network activity
    /// - `ConnectFailed` or `Cancelled` from the factory; if the replica
    ///   fails the already-built primary is closed and the manager stays idle
    /// - `Closed` if [`close`](Self::close) ran while the handles were being
    ///   built; the new handles are closed again
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<()> {
        let _connecting = self.connecting.lock().await;

        match self.slots.read().await.lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Connected => return Err(FailoverError::AlreadyConnected),
            Lifecycle::Closed => return Err(FailoverError::Closed),
        }

        self.config.validate()?;

        info!(
            primary = self.config.primary.label(),
            replica = self.config.endpoint(Side::Replica).map(|e| e.label()),
            "Connecting"
        );

        let primary = self.factory.build(&self.config.primary, cancel).await?;

        let replica = match self.config.endpoint(Side::Replica) {
            Some(endpoint) => match self.factory.build(endpoint, cancel).await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    if let Err(close_err) = primary.close().await {
                        warn!(error = %close_err, "Failed to close primary after replica failure");
                    }
                    error!(error = %e, "Failed to connect to replica");
                    return Err(e);
                }
            },
            None => None,
        };

        let mut monitor = self.monitor.lock().await;
        let closed = {
            let mut slots = self.slots.write().await;
            if slots.lifecycle == Lifecycle::Closed {
                true
            } else {
                slots.primary = Some(primary.clone());
                slots.replica = replica.clone();
                slots.role = Role::PrimaryActive;
                slots.lifecycle = Lifecycle::Connected;
                false
            }
        };

        if closed {
            drop(monitor);
            warn!("Manager closed while connecting, discarding new connections");
            for handle in replica.into_iter().chain(std::iter::once(primary)) {
                if let Err(e) = handle.close().await {
                    debug!(endpoint = handle.endpoint(), error = %e, "Failed to close unused handle");
                }
            }
            return Err(FailoverError::Closed);
        }

        if self.config.policy.health_check_enabled {
            *monitor = Some(self.monitor_for(CancellationToken::new()).spawn());
        }

        info!(
            replica = self.config.replica_enabled(),
            health_check = self.config.policy.health_check_enabled,
            "Connected"
        );
        Ok(())
    }

    fn monitor_for(&self, stop: CancellationToken) -> HealthMonitor<C> {
        let controller = FailoverController::new(
            self.config.clone(),
            self.factory.clone(),
            self.slots.clone(),
            self.metrics.clone(),
            stop.clone(),
        );
        HealthMonitor::new(
            self.config.clone(),
            self.slots.clone(),
            self.metrics.clone(),
            controller,
            stop,
        )
    }

    /// Stop the monitor and close both handles
    ///
    /// Both handles are closed even if the first close fails; the replica
    /// error is reported in preference to the primary one. Calling `close`
    /// again is a no-op.
    pub async fn close(&self) -> Result<()> {
        let mut monitor = self.monitor.lock().await;
        if let Some(task) = monitor.take() {
            task.shutdown().await;
        }

        let (primary, replica) = {
            let mut slots = self.slots.write().await;
            if slots.lifecycle == Lifecycle::Closed {
                return Ok(());
            }
            slots.lifecycle = Lifecycle::Closed;
            (slots.primary.take(), slots.replica.take())
        };

        let replica_result = match replica {
            Some(handle) => handle
                .close()
                .await
                .map_err(|e| FailoverError::close(Side::Replica, e)),
            None => Ok(()),
        };
        let primary_result = match primary {
            Some(handle) => handle
                .close()
                .await
                .map_err(|e| FailoverError::close(Side::Primary, e)),
            None => Ok(()),
        };

        for err in [&replica_result, &primary_result]
            .into_iter()
            .filter_map(|r| r.as_ref().err())
        {
            warn!(error = %err, "Error while closing connection");
        }
        info!("Connections closed");

        replica_result.and(primary_result)
    }

    /// Ping the handle currently serving traffic
    ///
    /// The ping runs outside the lock, bounded by the side's
    /// `operation_timeout`.
    ///
    /// # Errors
    ///
    /// - `NotConnected` when no handle is installed for the side
    /// - `Timeout` when the endpoint does not answer in time
    /// - `Cancelled` as soon as `cancel` fires
    pub async fn ping(&self, cancel: &CancellationToken) -> Result<()> {
        let (side, handle) = {
            let slots = self.slots.read().await;
            let side = match slots.role {
                Role::PrimaryActive => Side::Primary,
                Role::ReplicaOnlyDegraded => Side::Replica,
            };
            (side, slots.get(side).ok_or(FailoverError::NotConnected(side))?)
        };

        let limit = self.operation_timeout(side);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FailoverError::Cancelled),
            result = tokio::time::timeout(limit, handle.ping()) => {
                result.unwrap_or_else(|_| Err(FailoverError::Timeout(limit)))
            }
        }
    }

    /// True if the primary answers, or auto-failover is on and the replica
    /// answers
    ///
    /// The replica counts whether the role is already `ReplicaOnlyDegraded`
    /// or still `PrimaryActive` with the demotion pending on the next
    /// monitor tick. Each check is bounded by that side's
    /// `operation_timeout`; a check that times out or is cancelled counts as
    /// unhealthy.
    pub async fn is_healthy(&self, cancel: &CancellationToken) -> bool {
        let (primary, replica) = {
            let slots = self.slots.read().await;
            (slots.primary.clone(), slots.replica.clone())
        };

        let check = async {
            if let Some(primary) = primary {
                if self.check(Side::Primary, primary.as_ref()).await {
                    return true;
                }
            }
            if self.config.policy.auto_failover {
                if let Some(replica) = replica {
                    return self.check(Side::Replica, replica.as_ref()).await;
                }
            }
            false
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            healthy = check => healthy,
        }
    }

    async fn check(&self, side: Side, handle: &C::Handle) -> bool {
        let limit = self.operation_timeout(side);
        match tokio::time::timeout(limit, handle.is_healthy()).await {
            Ok(healthy) => healthy,
            Err(_) => {
                warn!(
                    %side,
                    endpoint = handle.endpoint(),
                    timeout_ms = limit.as_millis() as u64,
                    "Health check timed out"
                );
                false
            }
        }
    }

    fn operation_timeout(&self, side: Side) -> Duration {
        self.config
            .endpoint(side)
            .unwrap_or(&self.config.primary)
            .operation_timeout
    }

    pub async fn get_primary(&self) -> Option<Arc<C::Handle>> {
        self.slots.read().await.primary.clone()
    }

    pub async fn get_replica(&self) -> Option<Arc<C::Handle>> {
        self.slots.read().await.replica.clone()
    }

    pub async fn has_replica(&self) -> bool {
        self.slots.read().await.replica.is_some()
    }

    /// Handle to read from: the replica when present and enabled, else the
    /// primary
    pub async fn reader(&self) -> Option<Arc<C::Handle>> {
        let slots = self.slots.read().await;
        slots.replica.clone().or_else(|| slots.primary.clone())
    }

    /// Handle to write to: the primary, unless degraded and the replica is
    /// writable
    pub async fn writer(&self) -> Option<Arc<C::Handle>> {
        let slots = self.slots.read().await;
        match slots.role {
            Role::PrimaryActive => slots.primary.clone(),
            Role::ReplicaOnlyDegraded if !self.config.policy.replica_read_only => {
                slots.replica.clone()
            }
            Role::ReplicaOnlyDegraded => None,
        }
    }

    pub async fn role(&self) -> Role {
        self.slots.read().await.role
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        self.slots.read().await.lifecycle
    }

    pub async fn is_primary_active(&self) -> bool {
        self.role().await == Role::PrimaryActive
    }

    pub async fn is_degraded(&self) -> bool {
        self.role().await.is_degraded()
    }

    /// Primary pool statistics, or zeros when not connected
    pub async fn stats(&self) -> ConnectionStats {
        self.slots
            .read()
            .await
            .primary
            .as_ref()
            .map(|h| h.stats())
            .unwrap_or_default()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn status(&self) -> ManagerStatus {
        let monitor_running = self
            .monitor
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished());

        let slots = self.slots.read().await;
        ManagerStatus {
            role: slots.role,
            lifecycle: slots.lifecycle,
            has_replica: slots.replica.is_some(),
            replica_read_only: self.config.policy.replica_read_only,
            primary_endpoint: self.config.primary.label().to_string(),
            replica_endpoint: self
                .config
                .endpoint(Side::Replica)
                .map(|e| e.label().to_string()),
            primary: slots.primary.as_ref().map(|h| h.stats()),
            replica: slots.replica.as_ref().map(|h| h.stats()),
            monitor_running,
            metrics: self.metrics.snapshot(),
        }
    }
}

impl<C: Connector> Drop for RoleGuard<C> {
    fn drop(&mut self) {
        if let Some(task) = self.monitor.get_mut().as_ref() {
            debug!("Manager dropped without close, stopping health monitor");
            task.cancel();
        }
    }
}
