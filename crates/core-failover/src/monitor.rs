//! Background health monitor
//!
//! Probes both handles on a fixed period and hands each [`ProbeReport`] to
//! the [`FailoverController`]. Probing never holds the manager lock: the
//! handles are cloned out under a read lock and probed concurrently, each
//! bounded by [`PROBE_TIMEOUT`].
//!
//! Role changes are committed on the tick itself. Reconnects run as tracked
//! tasks, at most one per side, so a slow replica rebuild never delays the
//! next primary probe. Stopping the monitor waits for those tasks.

use crate::config::{ManagerConfig, PROBE_TIMEOUT};
use crate::controller::{FailoverController, ProbeReport};
use crate::handle::{ConnectionHandle, Connector};
use crate::metrics::FailoverMetrics;
use crate::role::{Lifecycle, Side};
use crate::slots::SharedSlots;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodic prober for one manager
pub struct HealthMonitor<C: Connector> {
    config: Arc<ManagerConfig>,
    slots: SharedSlots<C::Handle>,
    metrics: Arc<FailoverMetrics>,
    controller: FailoverController<C>,
    stop: CancellationToken,
}

impl<C: Connector> HealthMonitor<C> {
    pub(crate) fn new(
        config: Arc<ManagerConfig>,
        slots: SharedSlots<C::Handle>,
        metrics: Arc<FailoverMetrics>,
        controller: FailoverController<C>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            config,
            slots,
            metrics,
            controller,
            stop,
        }
    }

    /// Start the monitor on the current runtime
    pub fn spawn(self) -> MonitorTask {
        let stop = self.stop.clone();
        let join = tokio::spawn(self.run());
        MonitorTask { stop, join }
    }

    /// Tick loop; returns once the stop token fires
    pub async fn run(self) {
        let period = self.config.policy.health_check_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = period.as_millis() as u64,
            replica = self.config.replica_enabled(),
            "Health monitor started"
        );

        let mut reconnects = Reconnects::default();
        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(report) = self.probe().await else {
                        break;
                    };
                    if self.stop.is_cancelled() {
                        break;
                    }
                    let decision = self.controller.commit(report).await;
                    if decision.reconnect_primary {
                        reconnects.start(&self.controller, Side::Primary);
                    }
                    if decision.reconnect_replica {
                        reconnects.start(&self.controller, Side::Replica);
                    }
                }
            }
        }

        reconnects.finish().await;
        info!("Health monitor stopped");
    }

    /// Probe both sides once. Returns `None` if the manager is no longer
    /// connected or the monitor was stopped mid-probe.
    pub async fn probe(&self) -> Option<ProbeReport> {
        let (primary, replica) = {
            let slots = self.slots.read().await;
            if slots.lifecycle != Lifecycle::Connected {
                return None;
            }
            (slots.get(Side::Primary), slots.get(Side::Replica))
        };

        let replica_enabled = self.config.replica_enabled();
        let probes = async {
            tokio::join!(
                probe_handle(Side::Primary, primary.as_deref()),
                async {
                    if replica_enabled {
                        Some(probe_handle(Side::Replica, replica.as_deref()).await)
                    } else {
                        None
                    }
                }
            )
        };

        let (primary_healthy, replica_healthy) = tokio::select! {
            biased;
            _ = self.stop.cancelled() => return None,
            result = probes => result,
        };

        self.metrics.record_probe(primary_healthy);
        if let Some(healthy) = replica_healthy {
            self.metrics.record_probe(healthy);
        }

        debug!(
            primary = primary_healthy,
            replica = ?replica_healthy,
            "Health probe complete"
        );
        Some(ProbeReport::new(primary_healthy, replica_healthy))
    }
}

async fn probe_handle<H: ConnectionHandle>(side: Side, handle: Option<&H>) -> bool {
    let Some(handle) = handle else {
        return false;
    };
    match tokio::time::timeout(PROBE_TIMEOUT, handle.is_healthy()).await {
        Ok(true) => true,
        Ok(false) => {
            warn!(%side, endpoint = handle.endpoint(), "Health check failed");
            false
        }
        Err(_) => {
            warn!(
                %side,
                endpoint = handle.endpoint(),
                timeout_ms = PROBE_TIMEOUT.as_millis() as u64,
                "Health check timed out"
            );
            false
        }
    }
}

/// In-flight reconnect per side
#[derive(Default)]
struct Reconnects {
    primary: Option<JoinHandle<bool>>,
    replica: Option<JoinHandle<bool>>,
}

impl Reconnects {
    fn start<C: Connector>(&mut self, controller: &FailoverController<C>, side: Side) {
        let slot = match side {
            Side::Primary => &mut self.primary,
            Side::Replica => &mut self.replica,
        };
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!(%side, "Reconnect already in progress");
            return;
        }
        let controller = controller.clone();
        *slot = Some(tokio::spawn(async move { controller.reconnect(side).await }));
    }

    async fn finish(self) {
        for task in [self.primary, self.replica].into_iter().flatten() {
            if let Err(e) = task.await {
                warn!(error = %e, "Reconnect task ended abnormally");
            }
        }
    }
}

/// A running monitor
pub struct MonitorTask {
    stop: CancellationToken,
    join: JoinHandle<()>,
}

impl MonitorTask {
    /// Signal the monitor to stop without waiting for it
    pub fn cancel(&self) {
        self.stop.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the monitor and wait for its current tick to finish
    pub async fn shutdown(self) {
        self.stop.cancel();
        if let Err(e) = self.join.await {
            warn!(error = %e, "Health monitor task ended abnormally");
        }
    }
}
