//! Failover controller: turns probe results into role changes and reconnects
//!
//! # States
//!
//! ```text
//!                 primary down, replica up, auto_failover
//!   PrimaryActive ───────────────────────────────────────▶ ReplicaOnlyDegraded
//!        ▲                                                        │
//!        └────────── primary probe ok / primary reconnected ──────┘
//! ```
//!
//! Reconnecting is an activity, not a state: it can run from either state,
//! and only a successful primary reconnect changes the role.
//!
//! # Transition table
//!
//! | Current  | Primary | Replica | Auto | Next     | Action                 |
//! |----------|---------|---------|------|----------|------------------------|
//! | Active   | up      | any     | any  | Active   | none                   |
//! | Active   | down    | up      | on   | Degraded | none (demote)          |
//! | Active   | down    | any     | off  | Active   | reconnect primary      |
//! | Degraded | down    | any     | any  | Degraded | reconnect primary      |
//! | any      | down    | down    | any  | same     | reconnect both         |
//! | any      | up      | down    | any  | Active   | reconnect replica      |
//! | Degraded | up      | up/none | any  | Active   | none (recover)         |
//!
//! The decision is pure ([`decide`]); the controller commits it under the
//! manager's write lock ([`FailoverController::commit`]) and runs reconnects
//! outside of it ([`FailoverController::repair`]).

use crate::config::ManagerConfig;
use crate::error::FailoverError;
use crate::factory::ConnectionFactory;
use crate::handle::{ConnectionHandle, Connector};
use crate::metrics::FailoverMetrics;
use crate::role::{Lifecycle, Role, Side};
use crate::slots::SharedSlots;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of one health-monitor tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub primary_healthy: bool,
    /// `None` when no replica is configured
    pub replica_healthy: Option<bool>,
}

impl ProbeReport {
    pub fn new(primary_healthy: bool, replica_healthy: Option<bool>) -> Self {
        Self {
            primary_healthy,
            replica_healthy,
        }
    }
}

/// What the controller should do for one report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub next_role: Role,
    pub reconnect_primary: bool,
    pub reconnect_replica: bool,
}

impl Decision {
    pub fn is_steady(&self, current: Role) -> bool {
        self.next_role == current && !self.reconnect_primary && !self.reconnect_replica
    }
}

/// Evaluate the transition table
pub fn decide(current: Role, report: ProbeReport, auto_failover: bool) -> Decision {
    let replica_up = report.replica_healthy == Some(true);
    let replica_down = report.replica_healthy == Some(false);

    if report.primary_healthy {
        return Decision {
            next_role: Role::PrimaryActive,
            reconnect_primary: false,
            reconnect_replica: replica_down,
        };
    }

    let demote = current == Role::PrimaryActive && auto_failover && replica_up;
    Decision {
        next_role: if demote {
            Role::ReplicaOnlyDegraded
        } else {
            current
        },
        reconnect_primary: !demote,
        reconnect_replica: replica_down,
    }
}

/// Applies decisions to a manager's slots
pub struct FailoverController<C: Connector> {
    config: Arc<ManagerConfig>,
    factory: Arc<ConnectionFactory<C>>,
    slots: SharedSlots<C::Handle>,
    metrics: Arc<FailoverMetrics>,
    stop: CancellationToken,
}

impl<C: Connector> Clone for FailoverController<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            factory: self.factory.clone(),
            slots: self.slots.clone(),
            metrics: self.metrics.clone(),
            stop: self.stop.clone(),
        }
    }
}

impl<C: Connector> FailoverController<C> {
    pub(crate) fn new(
        config: Arc<ManagerConfig>,
        factory: Arc<ConnectionFactory<C>>,
        slots: SharedSlots<C::Handle>,
        metrics: Arc<FailoverMetrics>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            config,
            factory,
            slots,
            metrics,
            stop,
        }
    }

    /// Commit the role change for `report`, then run any reconnects
    ///
    /// Failures are logged and counted, never returned.
    pub async fn evaluate(&self, report: ProbeReport) -> Decision {
        let decision = self.commit(report).await;
        self.repair(decision).await;
        decision
    }

    /// Decide on `report` and apply the role change under the write lock.
    /// Reconnects the decision asks for are left to the caller.
    pub async fn commit(&self, report: ProbeReport) -> Decision {
        let decision = {
            let mut slots = self.slots.write().await;
            let current = slots.role;
            let decision = decide(current, report, self.config.policy.auto_failover);

            if slots.lifecycle == Lifecycle::Connected && decision.next_role != current {
                slots.role = decision.next_role;
                match decision.next_role {
                    Role::ReplicaOnlyDegraded => {
                        self.metrics.record_failover();
                        warn!(
                            from = %current,
                            to = %decision.next_role,
                            "Primary connection is down, operating in replica-only mode"
                        );
                    }
                    Role::PrimaryActive => {
                        self.metrics.record_recovery();
                        info!(
                            from = %current,
                            to = %decision.next_role,
                            "Primary connection is healthy again, restored primary-active mode"
                        );
                    }
                }
            }
            decision
        };

        if decision.reconnect_primary && decision.reconnect_replica {
            warn!("Both primary and replica connections are down, attempting to reconnect");
        }
        decision
    }

    /// Run the reconnects `decision` asks for, both sides concurrently
    pub async fn repair(&self, decision: Decision) {
        let primary = async {
            if decision.reconnect_primary {
                self.reconnect(Side::Primary).await;
            }
        };
        let replica = async {
            if decision.reconnect_replica {
                self.reconnect(Side::Replica).await;
            }
        };
        tokio::join!(primary, replica);
    }

    /// Rebuild one side, up to `failover_retries` attempts spaced by
    /// `failover_interval`. Returns true if a new handle was installed.
    pub async fn reconnect(&self, side: Side) -> bool {
        let Some(endpoint) = self.config.endpoint(side) else {
            return false;
        };
        let retries = self.config.policy.failover_retries;
        let interval = self.config.policy.failover_interval;

        info!(%side, endpoint = endpoint.label(), "Attempting to reconnect");

        for attempt in 1..=retries {
            let result = tokio::select! {
                biased;
                _ = self.stop.cancelled() => return false,
                result = self.factory.attempt(endpoint) => result,
            };

            match result {
                Ok(handle) => return self.install(side, handle).await,
                Err(e) => debug!(%side, attempt, error = %e, "Reconnect attempt failed"),
            }

            if attempt < retries {
                tokio::select! {
                    biased;
                    _ = self.stop.cancelled() => return false,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }

        self.metrics.record_reconnect(false);
        let err = FailoverError::ReconnectExhausted {
            side,
            attempts: retries,
        };
        error!(%side, endpoint = endpoint.label(), error = %err, "Failed to reconnect");
        false
    }

    /// Swap in a new handle, then close the one it replaced
    async fn install(&self, side: Side, handle: Arc<C::Handle>) -> bool {
        let previous = {
            let mut slots = self.slots.write().await;
            if slots.lifecycle != Lifecycle::Connected {
                drop(slots);
                if let Err(e) = handle.close().await {
                    debug!(%side, error = %e, "Failed to close unused handle");
                }
                return false;
            }

            let previous = slots.slot_mut(side).replace(handle);
            if side == Side::Primary && slots.role != Role::PrimaryActive {
                slots.role = Role::PrimaryActive;
                self.metrics.record_recovery();
            }
            previous
        };

        self.metrics.record_reconnect(true);
        info!(%side, "Successfully reconnected");

        if let Some(old) = previous {
            if let Err(e) = old.close().await {
                warn!(%side, endpoint = old.endpoint(), error = %e, "Failed to close replaced handle");
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointConfig, FailoverPolicy};
    use crate::slots::Slots;
    use crate::testing::MockConnector;
    use std::time::Duration;
    use tokio::sync::RwLock;

    use crate::role::Role::{PrimaryActive as Active, ReplicaOnlyDegraded as Degraded};

    fn report(primary: bool, replica: Option<bool>) -> ProbeReport {
        ProbeReport::new(primary, replica)
    }

    #[test]
    fn test_primary_healthy_is_steady() {
        for replica in [Some(true), None] {
            for auto in [true, false] {
                let d = decide(Active, report(true, replica), auto);
                assert!(d.is_steady(Active), "replica={:?} auto={}", replica, auto);
            }
        }
    }

    #[test]
    fn test_demote_when_replica_healthy_and_auto_failover() {
        let d = decide(Active, report(false, Some(true)), true);
        assert_eq!(d.next_role, Degraded);
        assert!(!d.reconnect_primary);
        assert!(!d.reconnect_replica);
    }

    #[test]
    fn test_no_demotion_without_auto_failover() {
        for replica in [Some(true), Some(false), None] {
            let d = decide(Active, report(false, replica), false);
            assert_eq!(d.next_role, Active);
            assert!(d.reconnect_primary);
        }
    }

    #[test]
    fn test_no_demotion_without_replica() {
        let d = decide(Active, report(false, None), true);
        assert_eq!(d.next_role, Active);
        assert!(d.reconnect_primary);
        assert!(!d.reconnect_replica);
    }

    #[test]
    fn test_degraded_keeps_reconnecting_primary() {
        let d = decide(Degraded, report(false, Some(true)), true);
        assert_eq!(d.next_role, Degraded);
        assert!(d.reconnect_primary);
        assert!(!d.reconnect_replica);
    }

    #[test]
    fn test_both_down_reconnects_both() {
        for current in [Active, Degraded] {
            for auto in [true, false] {
                let d = decide(current, report(false, Some(false)), auto);
                assert_eq!(d.next_role, current);
                assert!(d.reconnect_primary);
                assert!(d.reconnect_replica);
            }
        }
    }

    #[test]
    fn test_replica_down_reconnects_replica_only() {
        let d = decide(Active, report(true, Some(false)), true);
        assert_eq!(d.next_role, Active);
        assert!(!d.reconnect_primary);
        assert!(d.reconnect_replica);
    }

    #[test]
    fn test_degraded_recovers_when_primary_probe_succeeds() {
        let d = decide(Degraded, report(true, Some(true)), true);
        assert_eq!(d.next_role, Active);
        assert!(!d.reconnect_primary);
    }

    struct Fixture {
        connector: MockConnector,
        controller: FailoverController<MockConnector>,
        slots: SharedSlots<crate::testing::MockHandle>,
        metrics: Arc<FailoverMetrics>,
        stop: CancellationToken,
    }

    async fn fixture(policy: FailoverPolicy) -> Fixture {
        let connector = MockConnector::new();
        let config = Arc::new(ManagerConfig {
            primary: EndpointConfig::new("primary:1"),
            replica: Some(EndpointConfig::new("replica:1")),
            policy,
        });
        let factory = Arc::new(ConnectionFactory::new(connector.clone()));
        let slots = Arc::new(RwLock::new(Slots::new()));
        let metrics = Arc::new(FailoverMetrics::new());
        let stop = CancellationToken::new();

        {
            let mut guard = slots.write().await;
            guard.primary = Some(factory.attempt(&config.primary).await.unwrap());
            guard.replica = Some(factory.attempt(config.replica.as_ref().unwrap()).await.unwrap());
            guard.lifecycle = Lifecycle::Connected;
        }

        let controller = FailoverController::new(
            config,
            factory,
            slots.clone(),
            metrics.clone(),
            stop.clone(),
        );
        Fixture {
            connector,
            controller,
            slots,
            metrics,
            stop,
        }
    }

    fn fast_policy() -> FailoverPolicy {
        FailoverPolicy {
            failover_retries: 3,
            failover_interval: Duration::from_secs(1),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_swaps_then_closes_previous() {
        let f = fixture(fast_policy()).await;
        let primary = f.connector.endpoint("primary:1");
        let old = f.slots.read().await.primary.clone().unwrap();

        assert!(f.controller.reconnect(Side::Primary).await);

        let new = f.slots.read().await.primary.clone().unwrap();
        assert_ne!(old.id(), new.id());
        assert_eq!(old.close_calls(), 1);
        assert_eq!(new.close_calls(), 0);
        assert_eq!(primary.total_close_calls(), 1);
        assert_eq!(f.metrics.snapshot().reconnect_successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_exhaustion_leaves_state() {
        let f = fixture(fast_policy()).await;
        let primary = f.connector.endpoint("primary:1");
        primary.set_down();
        f.slots.write().await.role = Degraded;
        let before = primary.connect_attempts();

        let start = tokio::time::Instant::now();
        assert!(!f.controller.reconnect(Side::Primary).await);

        assert_eq!(primary.connect_attempts() - before, 3);
        assert!(start.elapsed() >= Duration::from_secs(2));
        let slots = f.slots.read().await;
        assert_eq!(slots.role, Degraded);
        assert_eq!(slots.primary.as_ref().unwrap().close_calls(), 0);
        assert_eq!(f.metrics.snapshot().reconnect_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_reconnect_restores_active_role() {
        let f = fixture(fast_policy()).await;
        f.slots.write().await.role = Degraded;

        assert!(f.controller.reconnect(Side::Primary).await);
        assert_eq!(f.slots.read().await.role, Active);
        assert_eq!(f.metrics.snapshot().recoveries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_demotes_and_counts() {
        let f = fixture(fast_policy()).await;
        f.connector.endpoint("primary:1").set_down();

        let decision = f.controller.evaluate(report(false, Some(true))).await;
        assert_eq!(decision.next_role, Degraded);
        assert_eq!(f.slots.read().await.role, Degraded);
        assert_eq!(f.metrics.snapshot().failovers, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_reconnect() {
        let f = fixture(FailoverPolicy {
            failover_retries: 100,
            failover_interval: Duration::from_secs(60),
            ..Default::default()
        })
        .await;
        f.connector.endpoint("primary:1").set_down();

        let stop = f.stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            stop.cancel();
        });

        let start = tokio::time::Instant::now();
        assert!(!f.controller.reconnect(Side::Primary).await);
        assert!(start.elapsed() < Duration::from_secs(60));
        assert_eq!(f.metrics.snapshot().reconnect_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_after_close_discards_handle() {
        let f = fixture(fast_policy()).await;
        f.slots.write().await.lifecycle = Lifecycle::Closed;
        let primary = f.connector.endpoint("primary:1");

        assert!(!f.controller.reconnect(Side::Primary).await);
        // original handle untouched, freshly built one closed
        assert_eq!(primary.close_calls(), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_leaves_reconnects_to_caller() {
        let f = fixture(fast_policy()).await;
        let primary = f.connector.endpoint("primary:1");
        primary.set_down();
        let before = primary.connect_attempts();

        let decision = f.controller.commit(report(false, Some(false))).await;
        assert!(decision.reconnect_primary && decision.reconnect_replica);
        assert_eq!(primary.connect_attempts(), before);
        assert_eq!(f.slots.read().await.role, Active);
    }
}
