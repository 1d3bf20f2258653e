//! Failover against real local TCP listeners

use duplex::adapters::TcpConnector;
use duplex_core_failover::{
    ConnectionFactory, ConnectionHandle, EndpointConfig, FailoverError, FailoverPolicy,
    ManagerConfig, Role, RoleGuard,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Accepts and holds connections until aborted
struct Server {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Server {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener)
    }

    async fn restart(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        Self::serve(listener)
    }

    fn serve(listener: TcpListener) -> Self {
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        Self { addr, task }
    }

    async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

fn endpoint(addr: SocketAddr) -> EndpointConfig {
    EndpointConfig {
        max_retries: 1,
        retry_interval: Duration::from_millis(20),
        connect_timeout: Duration::from_secs(1),
        operation_timeout: Duration::from_millis(500),
        ..EndpointConfig::new(addr.to_string())
    }
}

fn manager_config(primary: SocketAddr, replica: SocketAddr) -> ManagerConfig {
    ManagerConfig {
        primary: endpoint(primary),
        replica: Some(endpoint(replica)),
        policy: FailoverPolicy {
            failover_retries: 2,
            failover_interval: Duration::from_millis(50),
            health_check_interval: Duration::from_millis(100),
            ..Default::default()
        },
    }
}

async fn wait_for_role(guard: &RoleGuard<TcpConnector>, role: Role) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while guard.role().await != role {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            role
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_tcp_handle_connects_and_pings() {
    let server = Server::start().await;
    let factory = ConnectionFactory::new(TcpConnector::new());

    let handle = factory
        .build(&endpoint(server.addr), &CancellationToken::new())
        .await
        .unwrap();
    assert!(handle.is_open());
    assert_eq!(handle.stats().open_connections, 1);
    assert!(handle.ping().await.is_ok());

    handle.close().await.unwrap();
    assert!(!handle.is_open());
    assert!(handle.stats().is_empty());
    server.stop().await;
}

#[tokio::test]
async fn test_unreachable_endpoint_exhausts_retries() {
    let server = Server::start().await;
    let addr = server.addr;
    server.stop().await;

    let factory = ConnectionFactory::new(TcpConnector::new());
    let err = factory
        .build(&endpoint(addr), &CancellationToken::new())
        .await
        .map(|_| ())
        .unwrap_err();

    match err {
        FailoverError::ConnectFailed { attempts, source, .. } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*source, FailoverError::Io(_)));
        }
        other => panic!("Expected ConnectFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_bad_address_is_config_error() {
    let factory = ConnectionFactory::new(TcpConnector::new());
    let err = factory
        .build(&EndpointConfig::new("no-port"), &CancellationToken::new())
        .await
        .map(|_| ())
        .unwrap_err();
    assert!(err.is_config());
}

#[tokio::test]
async fn test_failover_and_recovery_over_tcp() {
    let primary = Server::start().await;
    let replica = Server::start().await;
    let primary_addr = primary.addr;

    let guard = RoleGuard::new(
        TcpConnector::new(),
        manager_config(primary_addr, replica.addr),
    );
    guard.connect(&CancellationToken::new()).await.unwrap();
    assert_eq!(guard.stats().await.open_connections, 1);

    primary.stop().await;
    wait_for_role(&guard, Role::ReplicaOnlyDegraded).await;
    assert!(guard.is_healthy(&CancellationToken::new()).await);
    assert!(guard.has_replica().await);
    guard.ping(&CancellationToken::new()).await.unwrap();

    let primary = Server::restart(primary_addr).await;
    wait_for_role(&guard, Role::PrimaryActive).await;
    assert!(guard.metrics().recoveries >= 1);

    guard.close().await.unwrap();
    guard.close().await.unwrap();
    primary.stop().await;
    replica.stop().await;
}
