//! TCP transport

use crate::error::{MqttError, Result};
use crate::transport::{Transport, TransportFactory};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// A connected TCP transport
///
/// The stream is split so the receive task can read while operations
/// write.
pub struct TcpTransport {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl TcpTransport {
    /// Connects to `addr` (host:port)
    ///
    /// # Errors
    ///
    /// Returns `MqttError::NetworkError` if the TCP connection fails.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            tracing::error!(addr, error = %e, "TCP connect failed");
            MqttError::NetworkError
        })?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(error = %e, "Failed to disable Nagle's algorithm");
        }

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(Some(writer)),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, buf: &[u8]) -> Result<usize> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(MqttError::NetworkError)?;
        writer.write_all(buf).await?;
        Ok(buf.len())
    }

    async fn receive(&self, buf: &mut [u8]) -> Result<usize> {
        let mut reader = self.reader.lock().await;
        Ok(reader.read(buf).await?)
    }

    async fn close(&self) -> Result<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }
}

/// Factory creating [`TcpTransport`]s for one address
pub struct TcpFactory {
    addr: String,
}

impl TcpFactory {
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl TransportFactory for TcpFactory {
    async fn create(&self) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(TcpTransport::connect(&self.addr).await?))
    }
}
