use crate::memory::MessagePoolConfig;
use crate::serialize::PacketSerializer;
use crate::transport::{Transport, TransportFactory};
use crate::QoS;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// An inbound PUBLISH delivered to a subscription callback
#[derive(Debug, Clone)]
pub struct ReceivedPublish {
    /// Topic name the message was published to
    pub topic: String,
    /// Message payload
    pub payload: Bytes,
    /// Quality of service the broker used for delivery
    pub qos: QoS,
    /// Whether the message was a retained message
    pub retain: bool,
    /// Whether the broker marked the message as a duplicate delivery
    pub dup: bool,
}

/// Callback invoked for each inbound PUBLISH matching a subscription
///
/// Callbacks may run concurrently with unsubscription; a subscription whose
/// callback is still executing stays alive until the callback returns.
pub type SubscriptionCallback = Arc<dyn Fn(ReceivedPublish) + Send + Sync>;

/// A single topic-filter subscription request
#[derive(Clone)]
pub struct SubscriptionInfo {
    /// Topic filter, possibly containing `+`/`#` wildcards
    pub topic_filter: String,
    /// Requested quality of service
    pub qos: QoS,
    /// Callback invoked for matching inbound messages
    pub callback: SubscriptionCallback,
}

impl SubscriptionInfo {
    pub fn new(
        topic_filter: impl Into<String>,
        qos: QoS,
        callback: impl Fn(ReceivedPublish) + Send + Sync + 'static,
    ) -> Self {
        Self {
            topic_filter: topic_filter.into(),
            qos,
            callback: Arc::new(callback),
        }
    }
}

impl std::fmt::Debug for SubscriptionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionInfo")
            .field("topic_filter", &self.topic_filter)
            .field("qos", &self.qos)
            .finish_non_exhaustive()
    }
}

/// Information needed to publish a message
///
/// Also describes the will message inside [`ConnectInfo`]; will payloads
/// are additionally limited to 65535 bytes.
#[derive(Debug, Clone)]
pub struct PublishInfo {
    /// Topic name to publish to (no wildcards)
    pub topic: String,
    /// Message payload
    pub payload: Vec<u8>,
    /// Quality of service
    pub qos: QoS,
    /// Whether the broker should retain the message
    pub retain: bool,
    /// Maximum number of retransmissions while no PUBACK arrives.
    /// Only meaningful for QoS 1; a QoS 0 publish may not retry.
    pub retry_limit: u32,
    /// Initial period before the first retransmission; doubles after each
    /// retransmission up to the configured ceiling
    pub retry_interval: Duration,
}

impl PublishInfo {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
            retry_limit: 0,
            retry_interval: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, limit: u32, interval: Duration) -> Self {
        self.retry_limit = limit;
        self.retry_interval = interval;
        self
    }
}

/// Connection options for establishing an MQTT session
///
/// # Examples
///
/// ```
/// use mqtt_v3::{ConnectInfo, PublishInfo, QoS};
/// use std::time::Duration;
///
/// let will = PublishInfo::new("status/offline", b"gone".to_vec())
///     .with_qos(QoS::AtLeastOnce)
///     .with_retain(true);
///
/// let info = ConnectInfo::new("weather-station")
///     .with_keep_alive(Duration::from_secs(60))
///     .with_clean_session(true)
///     .with_will(will);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectInfo {
    /// Client identifier presented to the broker
    pub client_id: String,
    /// Whether this connection targets an AWS IoT MQTT server, enabling
    /// the AWS profile constraints
    pub aws_mode: bool,
    /// Whether to request a clean session
    pub clean_session: bool,
    /// Keep-alive interval; zero disables keep-alive
    pub keep_alive: Duration,
    /// Optional username
    pub username: Option<String>,
    /// Optional password
    pub password: Option<Vec<u8>>,
    /// Optional will message
    pub will: Option<PublishInfo>,
    /// Subscriptions known from a previous session, restored into the
    /// subscription table when `clean_session` is false
    pub previous_subscriptions: Vec<SubscriptionInfo>,
}

impl ConnectInfo {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            aws_mode: false,
            clean_session: true,
            keep_alive: Duration::from_secs(60),
            username: None,
            password: None,
            will: None,
            previous_subscriptions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_aws_mode(mut self, aws_mode: bool) -> Self {
        self.aws_mode = aws_mode;
        self
    }

    #[must_use]
    pub fn with_clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<Vec<u8>>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_will(mut self, will: PublishInfo) -> Self {
        self.will = Some(will);
        self
    }

    #[must_use]
    pub fn with_previous_subscriptions(mut self, subscriptions: Vec<SubscriptionInfo>) -> Self {
        self.previous_subscriptions = subscriptions;
        self
    }
}

/// How the connection obtains its transport
#[derive(Clone)]
pub enum NetworkConnection {
    /// Use an already-established transport; the caller retains ownership
    /// and the connection will not destroy it
    Existing(Arc<dyn Transport>),
    /// Create a transport through the factory; the connection owns the
    /// result and closes it on teardown
    Create(Arc<dyn TransportFactory>),
}

/// Network information for establishing a connection
#[derive(Clone)]
pub struct NetworkInfo {
    /// Transport source
    pub connection: NetworkConnection,
    /// Optional packet serializer overriding the built-in codec
    pub serializer: Option<Arc<dyn PacketSerializer>>,
}

impl NetworkInfo {
    /// Network info that connects through an existing transport
    #[must_use]
    pub fn existing(transport: Arc<dyn Transport>) -> Self {
        Self {
            connection: NetworkConnection::Existing(transport),
            serializer: None,
        }
    }

    /// Network info that creates its transport through a factory
    #[must_use]
    pub fn create(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            connection: NetworkConnection::Create(factory),
            serializer: None,
        }
    }

    /// Overrides the packet serializer for this connection
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn PacketSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }
}

/// Whether `disconnect` attempts a graceful DISCONNECT exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectMode {
    /// Send a DISCONNECT packet and wait briefly for it to go out
    #[default]
    Graceful,
    /// Skip the DISCONNECT packet and only release resources; used after
    /// network failure or on an already-closed connection
    CleanupOnly,
}

/// Library-wide configuration, validated at runtime construction
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// How long an operation waits for a server response where a bounded
    /// internal wait applies (DISCONNECT transmission, PINGRESP deadline,
    /// final retry grace period). Must be non-zero.
    pub response_wait: Duration,
    /// Ceiling for the doubling publish retry period. Must be non-zero.
    pub retry_ceiling: Duration,
    /// Whether to append the SDK metrics fragment to the CONNECT username
    /// in AWS mode
    pub metrics: bool,
    /// Optional fixed message-buffer pool; `None` allocates from the heap
    pub message_pool: Option<MessagePoolConfig>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            response_wait: Duration::from_millis(crate::constants::DEFAULT_RESPONSE_WAIT_MS),
            retry_ceiling: Duration::from_millis(crate::constants::DEFAULT_RETRY_MS_CEILING),
            metrics: true,
            message_pool: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_info_builders() {
        let info = ConnectInfo::new("test-client")
            .with_keep_alive(Duration::from_secs(30))
            .with_clean_session(false)
            .with_credentials("user", b"pass".to_vec());

        assert_eq!(info.client_id, "test-client");
        assert_eq!(info.keep_alive, Duration::from_secs(30));
        assert!(!info.clean_session);
        assert_eq!(info.username.as_deref(), Some("user"));
        assert_eq!(info.password.as_deref(), Some(&b"pass"[..]));
        assert!(!info.aws_mode);
    }

    #[test]
    fn test_publish_info_builders() {
        let info = PublishInfo::new("a/b", b"23".to_vec())
            .with_qos(QoS::AtLeastOnce)
            .with_retry(3, Duration::from_millis(500));

        assert_eq!(info.qos, QoS::AtLeastOnce);
        assert_eq!(info.retry_limit, 3);
        assert_eq!(info.retry_interval, Duration::from_millis(500));
        assert!(!info.retain);
    }

    #[test]
    fn test_config_defaults() {
        let config = MqttConfig::default();
        assert_eq!(config.response_wait, Duration::from_millis(1000));
        assert_eq!(config.retry_ceiling, Duration::from_secs(60));
        assert!(config.metrics);
        assert!(config.message_pool.is_none());
    }
}
