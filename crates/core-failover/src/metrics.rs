//! Failover counters
//!
//! Tracks what the monitor and controller have done over the lifetime of a
//! manager, for status output and tests.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters updated by the health monitor and failover controller
#[derive(Debug, Default)]
pub struct FailoverMetrics {
    probes: AtomicU64,
    probe_failures: AtomicU64,
    failovers: AtomicU64,
    recoveries: AtomicU64,
    reconnect_successes: AtomicU64,
    reconnect_failures: AtomicU64,
}

impl FailoverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_probe(&self, healthy: bool) {
        self.probes.fetch_add(1, Ordering::Relaxed);
        if !healthy {
            self.probe_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_failover(&self) {
        self.failovers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recovery(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self, success: bool) {
        if success {
            self.reconnect_successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.reconnect_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            probes: self.probes.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            failovers: self.failovers.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            reconnect_successes: self.reconnect_successes.load(Ordering::Relaxed),
            reconnect_failures: self.reconnect_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`FailoverMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Individual handle probes performed
    pub probes: u64,
    /// Probes that timed out or failed
    pub probe_failures: u64,
    /// Demotions to replica-only mode
    pub failovers: u64,
    /// Returns to primary-active mode
    pub recoveries: u64,
    /// Reconnects that installed a new handle
    pub reconnect_successes: u64,
    /// Reconnects that gave up after all retries
    pub reconnect_failures: u64,
}

impl MetricsSnapshot {
    /// Fraction of probes that succeeded (1.0 when nothing was probed)
    pub fn probe_success_ratio(&self) -> f64 {
        if self.probes == 0 {
            1.0
        } else {
            (self.probes - self.probe_failures) as f64 / self.probes as f64
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Probes: {} ({:.1}% ok) | Failovers: {} | Recoveries: {} | Reconnects: {} ok / {} exhausted",
            self.probes,
            self.probe_success_ratio() * 100.0,
            self.failovers,
            self.recoveries,
            self.reconnect_successes,
            self.reconnect_failures
        )
    }
}
