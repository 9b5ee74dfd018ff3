//! # MQTT 3.1.1 Client Library
//!
//! An asynchronous MQTT 3.1.1 client with a callback-based connection
//! runtime, suitable for constrained and server-class hosts alike.
//!
//! The core of the library is the per-connection runtime: it owns
//! outbound operations, multiplexes them over scheduled jobs, tracks
//! in-flight packet identifiers, dispatches inbound packets to
//! subscription callbacks, enforces keep-alive, and coordinates orderly
//! teardown under concurrent use and network failure. QoS 0 and QoS 1 are
//! supported; retransmission of unacknowledged QoS 1 publishes uses a
//! doubling backoff with a configurable ceiling.
//!
//! Connections run over any byte-stream transport implementing the
//! [`transport::Transport`] trait; a TCP transport and a scriptable mock
//! are provided. An optional AWS IoT profile clamps keep-alive intervals
//! and preserves packet-identifier byte identity across retransmissions.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mqtt_v3::{
//!     ConnectInfo, DisconnectMode, MqttConfig, MqttRuntime, NetworkInfo, PublishInfo, QoS,
//!     SubscriptionInfo,
//! };
//! use mqtt_v3::transport::TcpFactory;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = MqttRuntime::new(MqttConfig::default())?;
//!
//!     let connection = runtime
//!         .connect(
//!             NetworkInfo::create(Arc::new(TcpFactory::new("test.mosquitto.org:1883"))),
//!             ConnectInfo::new("weather-station").with_keep_alive(Duration::from_secs(60)),
//!             Duration::from_secs(5),
//!         )
//!         .await?;
//!
//!     connection
//!         .timed_subscribe(
//!             vec![SubscriptionInfo::new("sensors/+/temp", QoS::AtLeastOnce, |msg| {
//!                 println!("{}: {:?}", msg.topic, msg.payload);
//!             })],
//!             Duration::from_secs(5),
//!         )
//!         .await?;
//!
//!     let publish = PublishInfo::new("sensors/42/temp", b"23".to_vec())
//!         .with_qos(QoS::AtLeastOnce)
//!         .with_retry(3, Duration::from_millis(500));
//!     connection.timed_publish(&publish, Duration::from_secs(5)).await?;
//!
//!     connection.disconnect(DisconnectMode::Graceful).await;
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]

pub mod connection;
pub mod constants;
pub mod encoding;
pub mod error;
pub mod flags;
pub mod memory;
pub mod operation;
pub mod runtime;
pub mod serialize;
pub mod subscription;
pub mod task_pool;
pub mod tasks;
pub mod topic_matching;
pub mod transport;
pub mod types;
pub mod validation;

pub use connection::MqttConnection;
pub use error::{MqttError, Result};
pub use memory::{MessageAllocator, MessagePool, MessagePoolConfig};
pub use operation::{
    MqttOperation, OperationCallback, OperationOutcome, OperationStatus, OperationType,
};
pub use runtime::MqttRuntime;
pub use serialize::{DefaultSerializer, PacketSerializer};
pub use task_pool::{CancelResult, JobHandle, TaskPool};
pub use types::{
    ConnectInfo, DisconnectMode, MqttConfig, NetworkConnection, NetworkInfo, PublishInfo,
    ReceivedPublish, SubscriptionCallback, SubscriptionInfo,
};

/// Quality of service levels
///
/// The connection runtime implements the QoS 0 and QoS 1 flows; QoS 2 is
/// rejected during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl From<u8> for QoS {
    fn from(value: u8) -> Self {
        match value {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce, // Default to QoS 0 for invalid values
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}
