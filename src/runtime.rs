//! Library runtime
//!
//! Process-wide state is limited to an explicit [`MqttRuntime`] value: the
//! task pool, the validated configuration, the message-buffer allocator,
//! and the built-in serializer. Connections are created through it and
//! dropping it stops admitting new jobs.

use crate::connection::{self, MqttConnection};
use crate::error::{MqttError, Result};
use crate::memory::{MessageAllocator, MessagePool};
use crate::serialize::{DefaultSerializer, PacketSerializer};
use crate::task_pool::TaskPool;
use crate::types::{ConnectInfo, MqttConfig, NetworkInfo};
use std::sync::Arc;
use std::time::Duration;

/// The MQTT library runtime
pub struct MqttRuntime {
    task_pool: TaskPool,
    config: MqttConfig,
    allocator: MessageAllocator,
    serializer: Arc<dyn PacketSerializer>,
}

impl MqttRuntime {
    /// Initializes the library with the given configuration
    ///
    /// # Errors
    ///
    /// Returns `MqttError::InitFailed` if the configuration is invalid:
    /// zero response wait, zero retry ceiling, or a zero-sized message
    /// pool.
    pub fn new(config: MqttConfig) -> Result<Self> {
        if config.response_wait.is_zero() {
            return Err(MqttError::InitFailed(
                "response wait cannot be zero".to_string(),
            ));
        }

        if config.retry_ceiling.is_zero() {
            return Err(MqttError::InitFailed(
                "retry ceiling cannot be zero".to_string(),
            ));
        }

        let allocator = match &config.message_pool {
            Some(pool_config) => {
                if pool_config.buffers == 0 || pool_config.buffer_size == 0 {
                    return Err(MqttError::InitFailed(
                        "message pool dimensions cannot be zero".to_string(),
                    ));
                }
                MessageAllocator::Static(MessagePool::new(pool_config))
            }
            None => MessageAllocator::Heap,
        };

        let serializer: Arc<dyn PacketSerializer> =
            Arc::new(DefaultSerializer::new(config.metrics));

        tracing::info!("MQTT library successfully initialized");

        Ok(Self {
            task_pool: TaskPool::new(),
            config,
            allocator,
            serializer,
        })
    }

    /// The active configuration
    #[must_use]
    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    /// Establishes a new MQTT connection
    ///
    /// Blocks until the broker acknowledges the CONNECT or `timeout`
    /// elapses. On failure every partially acquired resource is released:
    /// a factory-created transport is closed and the partially built
    /// connection is torn down.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered: `BadParameter` from
    /// validation, `NetworkError` from the transport, `ServerRefused` from
    /// the CONNACK return code, or `Timeout`.
    pub async fn connect(
        &self,
        network_info: NetworkInfo,
        connect_info: ConnectInfo,
        timeout: Duration,
    ) -> Result<MqttConnection> {
        connection::establish(
            self.task_pool.clone(),
            self.config.clone(),
            self.allocator.clone(),
            Arc::clone(&self.serializer),
            network_info,
            connect_info,
            timeout,
        )
        .await
    }
}

impl Drop for MqttRuntime {
    fn drop(&mut self) {
        self.task_pool.shutdown();
        tracing::info!("MQTT library cleanup done");
    }
}
