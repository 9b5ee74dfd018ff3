//! The byte-stream transport consumed by the connection runtime
//!
//! The runtime is transport-agnostic: anything that can send and receive
//! bytes and close on demand can carry a connection. Writes of a single
//! packet are serialized by the connection, so implementations only need to
//! tolerate one writer at a time.

pub mod mock;
pub mod tcp;

pub use tcp::{TcpFactory, TcpTransport};

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A connected byte-stream transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Writes bytes, returning how many were accepted
    ///
    /// A return value smaller than `buf.len()` is treated as a network
    /// error by the runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn send(&self, buf: &[u8]) -> Result<usize>;

    /// Reads bytes into `buf`, returning how many were read
    ///
    /// A return value of 0 means the peer closed the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn receive(&self, buf: &mut [u8]) -> Result<usize>;

    /// Closes the transport
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be closed cleanly.
    async fn close(&self) -> Result<()>;
}

/// Creates transports on demand
///
/// A connection given a factory owns the transport it creates and closes
/// it during teardown; a connection given an existing transport does not.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Establishes a new transport
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    async fn create(&self) -> Result<Arc<dyn Transport>>;
}
