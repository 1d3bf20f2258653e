//! Test doubles for the connection contract
//!
//! [`MockConnector`] hands out [`MockHandle`]s bound to a shared
//! [`MockEndpoint`] per address. Flipping an endpoint down or up changes the
//! behaviour of every handle pointing at it, which is how tests simulate a
//! primary dying and coming back.
//!
//! ## Example
//!
//! ```
//! use duplex_core_failover::testing::MockConnector;
//! use duplex_core_failover::{ConnectionFactory, EndpointConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let connector = MockConnector::new();
//! let primary = connector.endpoint("db-1:5432");
//! let factory = ConnectionFactory::new(connector.clone());
//!
//! let handle = factory
//!     .build(&EndpointConfig::new("db-1:5432"), &CancellationToken::new())
//!     .await
//!     .unwrap();
//! assert_eq!(primary.connect_attempts(), 1);
//! # drop(handle);
//! # }
//! ```

use crate::config::EndpointConfig;
use crate::error::FailoverError;
use crate::handle::{ConnectionHandle, Connector};
use crate::stats::ConnectionStats;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared, switchable state of one simulated endpoint
#[derive(Debug)]
pub struct MockEndpoint {
    address: String,
    reachable: AtomicBool,
    healthy: AtomicBool,
    close_fails: AtomicBool,
    connect_delay_ms: AtomicU64,
    ping_delay_ms: AtomicU64,
    open_connections: AtomicU32,
    connect_attempts: AtomicUsize,
    pings: AtomicUsize,
    handles: Mutex<Vec<Arc<MockHandleState>>>,
}

impl MockEndpoint {
    fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            reachable: AtomicBool::new(true),
            healthy: AtomicBool::new(true),
            close_fails: AtomicBool::new(false),
            connect_delay_ms: AtomicU64::new(0),
            ping_delay_ms: AtomicU64::new(0),
            open_connections: AtomicU32::new(1),
            connect_attempts: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Refuse new connections and fail pings on existing handles
    pub fn set_down(&self) {
        self.reachable.store(false, Ordering::SeqCst);
        self.healthy.store(false, Ordering::SeqCst);
    }

    /// Accept connections and answer pings again
    pub fn set_up(&self) {
        self.reachable.store(true, Ordering::SeqCst);
        self.healthy.store(true, Ordering::SeqCst);
    }

    /// Control whether `connect` succeeds
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Control whether `ping` succeeds
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Make `close` return an error
    pub fn set_close_fails(&self, fails: bool) {
        self.close_fails.store(fails, Ordering::SeqCst);
    }

    /// Delay every `connect` call
    pub fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Delay every `ping` call
    pub fn set_ping_delay(&self, delay: Duration) {
        self.ping_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Open connection count reported by handle stats
    pub fn set_open_connections(&self, open: u32) {
        self.open_connections.store(open, Ordering::SeqCst);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Number of `connect` calls made against this endpoint
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Number of `ping` calls made against this endpoint
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// Number of handles created for this endpoint
    pub fn handles_created(&self) -> usize {
        lock(&self.handles).len()
    }

    /// `close` call count of each handle, in creation order
    pub fn close_calls(&self) -> Vec<usize> {
        lock(&self.handles)
            .iter()
            .map(|state| state.close_calls.load(Ordering::SeqCst))
            .collect()
    }

    /// Sum of `close` calls across all handles
    pub fn total_close_calls(&self) -> usize {
        self.close_calls().iter().sum()
    }

    fn register(&self) -> Arc<MockHandleState> {
        let mut handles = lock(&self.handles);
        let state = Arc::new(MockHandleState {
            id: handles.len() + 1,
            connected: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        });
        handles.push(state.clone());
        state
    }

    async fn delay(&self, millis: &AtomicU64) {
        let ms = millis.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[derive(Debug)]
struct MockHandleState {
    id: usize,
    connected: AtomicBool,
    close_calls: AtomicUsize,
}

/// Connector producing [`MockHandle`]s
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    endpoints: Arc<Mutex<HashMap<String, Arc<MockEndpoint>>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the simulated endpoint for `address`
    pub fn endpoint(&self, address: &str) -> Arc<MockEndpoint> {
        lock(&self.endpoints)
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(MockEndpoint::new(address)))
            .clone()
    }
}

impl Connector for MockConnector {
    type Handle = MockHandle;

    fn handle(&self, endpoint: &EndpointConfig) -> Result<MockHandle, FailoverError> {
        let shared = self.endpoint(&endpoint.address);
        let state = shared.register();
        Ok(MockHandle {
            label: endpoint.label().to_string(),
            endpoint: shared,
            state,
        })
    }
}

/// Handle whose behaviour is driven by its [`MockEndpoint`]
#[derive(Debug)]
pub struct MockHandle {
    label: String,
    endpoint: Arc<MockEndpoint>,
    state: Arc<MockHandleState>,
}

impl MockHandle {
    /// 1-based creation index of this handle on its endpoint
    pub fn id(&self) -> usize {
        self.state.id
    }

    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.close_calls() > 0
    }
}

#[async_trait::async_trait]
impl ConnectionHandle for MockHandle {
    async fn connect(&mut self) -> Result<(), FailoverError> {
        self.endpoint.connect_attempts.fetch_add(1, Ordering::SeqCst);
        self.endpoint.delay(&self.endpoint.connect_delay_ms).await;

        if !self.endpoint.reachable.load(Ordering::SeqCst) {
            return Err(FailoverError::Io(format!(
                "connection refused: {}",
                self.endpoint.address
            )));
        }
        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), FailoverError> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.connected.store(false, Ordering::SeqCst);
        if self.endpoint.close_fails.load(Ordering::SeqCst) {
            return Err(FailoverError::Backend(format!(
                "close failed: {}",
                self.endpoint.address
            )));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), FailoverError> {
        self.endpoint.pings.fetch_add(1, Ordering::SeqCst);
        self.endpoint.delay(&self.endpoint.ping_delay_ms).await;

        if !self.state.connected.load(Ordering::SeqCst) {
            return Err(FailoverError::Backend("handle not connected".into()));
        }
        if !self.endpoint.healthy.load(Ordering::SeqCst) {
            return Err(FailoverError::Io(format!(
                "ping failed: {}",
                self.endpoint.address
            )));
        }
        Ok(())
    }

    fn stats(&self) -> ConnectionStats {
        let open = self.endpoint.open_connections.load(Ordering::SeqCst);
        ConnectionStats {
            open_connections: open,
            idle_connections: open,
            ..Default::default()
        }
    }

    fn endpoint(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_endpoint_switch_affects_existing_handles() {
        let connector = MockConnector::new();
        let mut handle = connector.handle(&EndpointConfig::new("db:1")).unwrap();
        handle.connect().await.unwrap();
        assert!(handle.ping().await.is_ok());

        connector.endpoint("db:1").set_down();
        assert!(handle.ping().await.is_err());
        assert!(!handle.is_healthy().await);

        connector.endpoint("db:1").set_up();
        assert!(handle.is_healthy().await);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_refuses_connect() {
        let connector = MockConnector::new();
        connector.endpoint("db:1").set_reachable(false);
        let mut handle = connector.handle(&EndpointConfig::new("db:1")).unwrap();
        assert!(handle.connect().await.is_err());
        assert_eq!(connector.endpoint("db:1").connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_close_is_counted_per_handle() {
        let connector = MockConnector::new();
        let first = connector.handle(&EndpointConfig::new("db:1")).unwrap();
        let second = connector.handle(&EndpointConfig::new("db:1")).unwrap();
        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);

        second.close().await.unwrap();
        assert_eq!(connector.endpoint("db:1").close_calls(), vec![0, 1]);
        assert!(second.is_closed());
        assert!(!first.is_closed());
    }

    #[tokio::test]
    async fn test_stats_follow_endpoint() {
        let connector = MockConnector::new();
        connector.endpoint("db:1").set_open_connections(7);
        let handle = connector.handle(&EndpointConfig::new("db:1")).unwrap();
        assert_eq!(handle.stats().open_connections, 7);
    }
}
