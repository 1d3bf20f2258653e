//! Roles, sides, and lifecycle states of a manager

use serde::Serialize;
use std::fmt;

/// Which side the manager treats as authoritative for writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The primary is reachable and serves writes
    #[default]
    PrimaryActive,
    /// The primary is down; only the replica is usable
    ReplicaOnlyDegraded,
}

impl Role {
    pub fn is_degraded(self) -> bool {
        matches!(self, Role::ReplicaOnlyDegraded)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::PrimaryActive => write!(f, "primary-active"),
            Role::ReplicaOnlyDegraded => write!(f, "replica-only-degraded"),
        }
    }
}

/// One of the two handle slots owned by a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Primary,
    Replica,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Primary => write!(f, "primary"),
            Side::Replica => write!(f, "replica"),
        }
    }
}

/// Lifecycle of a manager instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Constructed, `connect()` not yet successful
    #[default]
    Idle,
    /// Handles installed, monitor possibly running
    Connected,
    /// `close()` has run; terminal
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_defaults_to_primary_active() {
        assert_eq!(Role::default(), Role::PrimaryActive);
        assert!(!Role::PrimaryActive.is_degraded());
        assert!(Role::ReplicaOnlyDegraded.is_degraded());
    }

    #[test]
    fn test_display() {
        assert_eq!(Role::ReplicaOnlyDegraded.to_string(), "replica-only-degraded");
        assert_eq!(Side::Primary.to_string(), "primary");
    }

    #[test]
    fn test_serialize_snake_case() {
        let json = serde_json::to_string(&Role::ReplicaOnlyDegraded).unwrap();
        assert_eq!(json, "\"replica_only_degraded\"");
        let json = serde_json::to_string(&Lifecycle::Connected).unwrap();
        assert_eq!(json, "\"connected\"");
    }
}
