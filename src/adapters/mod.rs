/*!
 * Store adapters
 *
 * Each adapter implements the core `Connector` / `ConnectionHandle` pair for
 * one kind of store. The manager never sees anything beyond that contract.
 */

pub mod tcp;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use tcp::{TcpConnector, TcpHandle};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConnector, PostgresHandle};
