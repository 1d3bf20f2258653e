//! Connection pool statistics reported by handles

use serde::Serialize;
use std::time::Duration;

/// Pool statistics for one live handle
///
/// Adapters fill in what their driver exposes and leave the rest at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Established connections, in use or idle
    pub open_connections: u32,
    /// Connections currently checked out
    pub in_use_connections: u32,
    /// Connections waiting in the pool
    pub idle_connections: u32,
    /// Total number of waits for a free connection
    pub wait_count: u64,
    /// Total time spent waiting for a free connection
    pub wait_duration: Duration,
    /// Connections closed because the idle limit was exceeded
    pub max_idle_closed: u64,
    /// Connections closed because they sat idle too long
    pub max_idle_time_closed: u64,
    /// Connections closed because they reached their maximum lifetime
    pub max_lifetime_closed: u64,
}

impl ConnectionStats {
    /// Fraction of `max_open` currently established, as a percentage
    pub fn utilization(&self, max_open: u32) -> f64 {
        if max_open == 0 {
            0.0
        } else {
            (self.open_connections as f64 / max_open as f64) * 100.0
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == ConnectionStats::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization() {
        let stats = ConnectionStats {
            open_connections: 5,
            in_use_connections: 3,
            idle_connections: 2,
            ..Default::default()
        };
        assert_eq!(stats.utilization(10), 50.0);
        assert_eq!(stats.utilization(0), 0.0);
    }

    #[test]
    fn test_default_is_empty() {
        assert!(ConnectionStats::default().is_empty());
        let stats = ConnectionStats {
            wait_count: 1,
            ..Default::default()
        };
        assert!(!stats.is_empty());
    }
}
