//! TCP reachability adapter
//!
//! Holds one established stream per endpoint. A ping opens a second, short
//! lived connection to the same address, so a peer that stops accepting is
//! detected even while the held stream still looks open.

use async_trait::async_trait;
use duplex_core_failover::{
    ConnectionHandle, ConnectionStats, Connector, EndpointConfig, FailoverError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

/// Creates [`TcpHandle`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for TcpConnector {
    type Handle = TcpHandle;

    fn handle(&self, endpoint: &EndpointConfig) -> Result<TcpHandle, FailoverError> {
        validate_address(&endpoint.address)?;
        Ok(TcpHandle {
            address: endpoint.address.clone(),
            label: endpoint.label().to_string(),
            operation_timeout: endpoint.operation_timeout,
            stream: Mutex::new(None),
            open: AtomicBool::new(false),
        })
    }
}

fn validate_address(address: &str) -> Result<(), FailoverError> {
    let (host, port) = address.rsplit_once(':').ok_or_else(|| {
        FailoverError::ConfigInvalid(format!("address '{}' must be host:port", address))
    })?;
    if host.is_empty() {
        return Err(FailoverError::ConfigInvalid(format!(
            "address '{}' is missing a host",
            address
        )));
    }
    port.parse::<u16>().map_err(|_| {
        FailoverError::ConfigInvalid(format!("address '{}' has an invalid port", address))
    })?;
    Ok(())
}

/// One held TCP connection
#[derive(Debug)]
pub struct TcpHandle {
    address: String,
    label: String,
    operation_timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
    open: AtomicBool,
}

impl TcpHandle {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionHandle for TcpHandle {
    async fn connect(&mut self) -> Result<(), FailoverError> {
        let stream = TcpStream::connect(self.address.as_str()).await?;
        stream.set_nodelay(true)?;
        *self.stream.get_mut() = Some(stream);
        self.open.store(true, Ordering::SeqCst);
        debug!(endpoint = %self.label, "TCP connection established");
        Ok(())
    }

    async fn close(&self) -> Result<(), FailoverError> {
        self.open.store(false, Ordering::SeqCst);
        let stream = self.stream.lock().await.take();
        match stream {
            Some(mut stream) => match stream.shutdown().await {
                Ok(()) => Ok(()),
                // Peer already gone
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(e) => Err(e.into()),
            },
            None => Ok(()),
        }
    }

    async fn ping(&self) -> Result<(), FailoverError> {
        if !self.is_open() {
            return Err(FailoverError::Backend(format!(
                "{} is not connected",
                self.label
            )));
        }
        let probe = TcpStream::connect(self.address.as_str());
        match tokio::time::timeout(self.operation_timeout, probe).await {
            Ok(Ok(_probe)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(FailoverError::Timeout(self.operation_timeout)),
        }
    }

    fn stats(&self) -> ConnectionStats {
        let open = u32::from(self.is_open());
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

    #[test]
    fn test_address_validation() {
        assert!(validate_address("db:5432").is_ok());
        assert!(validate_address("10.0.0.5:6379").is_ok());
        assert!(validate_address("db").unwrap_err().is_config());
        assert!(validate_address(":5432").unwrap_err().is_config());
        assert!(validate_address("db:http").unwrap_err().is_config());
    }

    #[test]
    fn test_unconnected_handle_reports_no_connections() {
        let handle = TcpConnector::new()
            .handle(&EndpointConfig::new("127.0.0.1:1"))
            .unwrap();
        assert!(!handle.is_open());
        assert!(handle.stats().is_empty());
        assert_eq!(handle.endpoint(), "127.0.0.1:1");
    }

    #[tokio::test]
    async fn test_ping_requires_connect() {
        let handle = TcpConnector::new()
            .handle(&EndpointConfig::new("127.0.0.1:1"))
            .unwrap();
        assert!(handle.ping().await.is_err());
        assert!(handle.close().await.is_ok());
    }
}
