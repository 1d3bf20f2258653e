//! Connection factory: builds connected handles with bounded retry
//!
//! `build` makes up to `max_retries + 1` attempts. Each attempt runs
//! `connect` followed by one `ping`, both inside a single `connect_timeout`.
//! Between attempts it waits `retry_interval * attempt` (linear backoff,
//! saturating rather than overflowing on huge intervals).
//! The caller's [`CancellationToken`] aborts the build immediately, whether
//! it fires during an attempt or during a backoff wait.

use crate::config::EndpointConfig;
use crate::error::{FailoverError, Result};
use crate::handle::{ConnectionHandle, Connector};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Builds handles for a [`Connector`]
pub struct ConnectionFactory<C: Connector> {
    connector: Arc<C>,
}

impl<C: Connector> ConnectionFactory<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }

    pub fn from_arc(connector: Arc<C>) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Validate `endpoint` and build a connected, pinged handle
    ///
    /// # Errors
    ///
    /// - `ConfigInvalid` before any network activity if the endpoint is invalid
    /// - `Cancelled` as soon as `cancel` fires
    /// - `ConnectFailed` wrapping the last attempt's error once all attempts
    ///   are exhausted
    pub async fn build(
        &self,
        endpoint: &EndpointConfig,
        cancel: &CancellationToken,
    ) -> Result<Arc<C::Handle>> {
        endpoint.validate()?;

        let attempts = endpoint.total_attempts();
        let mut last_error = None;

        for attempt in 1..=attempts {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FailoverError::Cancelled),
                result = self.attempt(endpoint) => result,
            };

            match result {
                Ok(handle) => {
                    info!(
                        endpoint = endpoint.label(),
                        attempt, "Connection established"
                    );
                    return Ok(handle);
                }
                Err(e) if e.is_config() => return Err(e),
                Err(e) => {
                    warn!(
                        endpoint = endpoint.label(),
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Connection attempt failed"
                    );
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                let backoff = backoff_for(endpoint, attempt);
                debug!(
                    endpoint = endpoint.label(),
                    backoff_ms = backoff.as_millis() as u64,
                    "Waiting before next connection attempt"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(FailoverError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }

        Err(FailoverError::ConnectFailed {
            endpoint: endpoint.label().to_string(),
            attempts,
            source: Box::new(last_error.unwrap_or_else(|| {
                FailoverError::Backend("no connection attempt was made".into())
            })),
        })
    }

    /// One connection attempt: create, connect, ping, all within
    /// `connect_timeout`. A handle that connects but fails the ping is
    /// closed before the error is returned.
    pub async fn attempt(&self, endpoint: &EndpointConfig) -> Result<Arc<C::Handle>> {
        let mut handle = self.connector.handle(endpoint)?;

        let outcome =
            tokio::time::timeout(endpoint.connect_timeout, establish(&mut handle)).await;

        match outcome {
            Ok(Ok(())) => Ok(Arc::new(handle)),
            Ok(Err(Established::ConnectFailed(e))) => Err(e),
            Ok(Err(Established::PingFailed(e))) => {
                discard(&handle).await;
                Err(e)
            }
            Err(_) => {
                discard(&handle).await;
                Err(FailoverError::Timeout(endpoint.connect_timeout))
            }
        }
    }
}

enum Established {
    ConnectFailed(FailoverError),
    PingFailed(FailoverError),
}

async fn establish<H: ConnectionHandle>(handle: &mut H) -> std::result::Result<(), Established> {
    handle.connect().await.map_err(Established::ConnectFailed)?;
    handle.ping().await.map_err(Established::PingFailed)
}

/// Linear backoff before attempt `attempt + 1`, saturating at `Duration::MAX`
fn backoff_for(endpoint: &EndpointConfig, attempt: usize) -> Duration {
    let factor = u32::try_from(attempt).unwrap_or(u32::MAX);
    endpoint.retry_interval.saturating_mul(factor)
}

async fn discard<H: ConnectionHandle>(handle: &H) {
    if let Err(e) = handle.close().await {
        debug!(endpoint = handle.endpoint(), error = %e, "Failed to close rejected handle");
    }
}
