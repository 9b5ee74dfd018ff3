//! The per-session connection runtime
//!
//! A connection groups a transport, the subscription table, the two
//! operation lists, and an optional keep-alive. It is shared between user
//! calls, the scheduler jobs, and the network receive task through
//! `Arc<ConnectionInner>`; the last clone to drop runs the teardown
//! assertions. Once a connection is marked `disconnected` it never becomes
//! active again: new operations are rejected and no further network I/O is
//! attempted.

use crate::error::{MqttError, Result};
use crate::memory::MessageAllocator;
use crate::operation::{
    MqttOperation, Operation, OperationCallback, OperationStatus, OperationType, RetryState,
};
use crate::serialize::PacketSerializer;
use crate::subscription::{SubscriptionTable, RESTORED_SESSION_ID};
use crate::task_pool::{JobHandle, TaskPool};
use crate::tasks;
use crate::transport::Transport;
use crate::types::{
    ConnectInfo, DisconnectMode, MqttConfig, NetworkConnection, NetworkInfo, PublishInfo,
    SubscriptionInfo,
};
use crate::validation;
use crate::QoS;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// Keep-alive configuration and liveness flag
pub(crate) struct KeepAliveState {
    /// Interval between PINGREQ probes
    pub interval: Duration,
    /// Pre-serialized PINGREQ packet
    pub pingreq: Vec<u8>,
    /// Set after a PINGREQ goes out; cleared when PINGRESP arrives
    pub outstanding: AtomicBool,
}

/// Lifecycle state and the two operation lists, guarded by one mutex
pub(crate) struct ConnectionState {
    /// Once true, never false again
    pub disconnected: bool,
    /// Operations queued for transmission, in admission order
    pub pending_send: VecDeque<Arc<Operation>>,
    /// Operations awaiting an acknowledgement, keyed by packet identifier
    /// (the CONNECT operation correlates under key 0)
    pub pending_response: HashMap<u16, Arc<Operation>>,
    /// The armed keep-alive job, if any
    pub keep_alive_job: Option<JobHandle>,
    /// Next candidate packet identifier, in 1..=65535
    pub next_packet_id: u16,
}

pub(crate) struct ConnectionInner {
    pub aws_mode: bool,
    /// Whether this connection created (and therefore closes) its transport
    pub own_transport: bool,
    pub transport: Arc<dyn Transport>,
    pub serializer: Arc<dyn PacketSerializer>,
    pub config: MqttConfig,
    pub task_pool: TaskPool,
    pub allocator: MessageAllocator,
    pub subscriptions: SubscriptionTable,
    state: Mutex<ConnectionState>,
    /// Send turnstile: serializes packet writes on this connection.
    /// Acquired only inside `process_send` and the keep-alive probe.
    pub send_gate: tokio::sync::Mutex<()>,
    pub keep_alive: Option<KeepAliveState>,
    /// Wakes the receive task when the connection closes
    pub shutdown: Notify,
}

impl ConnectionInner {
    pub(crate) fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().expect("connection state mutex poisoned")
    }

    pub(crate) fn is_disconnected(&self) -> bool {
        self.state().disconnected
    }

    /// Assigns the next packet identifier
    ///
    /// Runs under the state lock and skips zero and every identifier still
    /// in `pending_response`, so an identifier is unique within the set of
    /// in-flight operations even after the 16-bit space wraps.
    pub(crate) fn next_packet_id(&self) -> u16 {
        let mut state = self.state();
        loop {
            let candidate = state.next_packet_id;
            state.next_packet_id = if candidate == u16::MAX { 1 } else { candidate + 1 };

            if !state.pending_response.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Copies a serialized packet into an allocator-owned buffer and
    /// attaches it to the operation
    fn attach_packet(
        &self,
        op: &Arc<Operation>,
        packet: &[u8],
        packet_id: u16,
        packet_id_offset: Option<usize>,
    ) -> Result<()> {
        debug_assert!(!packet.is_empty());

        let mut buffer = self.allocator.alloc(packet.len())?;
        buffer.as_mut_slice().copy_from_slice(packet);

        let mut state = op.state();
        state.packet = Some(buffer);
        state.packet_id = packet_id;
        state.packet_id_offset = packet_id_offset;
        Ok(())
    }
}

/// Enqueues an operation and schedules `process_send` for it
///
/// On scheduling failure the operation is removed from the send queue
/// again and the error is returned for the caller's cleanup path.
pub(crate) fn enqueue_and_schedule(
    conn: &Arc<ConnectionInner>,
    op: &Arc<Operation>,
) -> Result<()> {
    {
        let mut state = conn.state();
        if state.disconnected {
            tracing::warn!("Attempt to use closed connection");
            return Err(MqttError::NetworkError);
        }
        state.pending_send.push_back(Arc::clone(op));
    }

    match schedule_send(conn, op, Duration::ZERO) {
        Ok(()) => Ok(()),
        Err(e) => {
            conn.state()
                .pending_send
                .retain(|queued| !Arc::ptr_eq(queued, op));
            Err(e)
        }
    }
}

/// Schedules `process_send` for an operation after `delay`
pub(crate) fn schedule_send(
    conn: &Arc<ConnectionInner>,
    op: &Arc<Operation>,
    delay: Duration,
) -> Result<()> {
    let job_conn = Arc::clone(conn);
    let job_op = Arc::clone(op);
    let job = conn.task_pool.schedule(delay, async move {
        tasks::process_send(job_conn, job_op).await;
    })?;

    op.state().job = Some(job);
    Ok(())
}

/// Arms the keep-alive job after `delay`
pub(crate) fn arm_keep_alive(conn: &Arc<ConnectionInner>, delay: Duration) -> Result<()> {
    let job_conn = Arc::clone(conn);
    let job = conn.task_pool.schedule(delay, async move {
        tasks::process_keep_alive(job_conn).await;
    })?;

    let mut state = conn.state();
    if state.disconnected {
        drop(state);
        let _ = job.try_cancel();
        return Err(MqttError::NetworkError);
    }
    state.keep_alive_job = Some(job);
    Ok(())
}

/// Closes the connection
///
/// Marks the connection disconnected, cancels the keep-alive job, closes
/// the transport when requested, wakes the receive task, and fails every
/// remaining operation with a network error. Calling this on an
/// already-closed connection is a no-op.
pub(crate) async fn close_connection(conn: &Arc<ConnectionInner>, close_transport: bool) {
    let (was_active, keep_alive_job, orphans) = {
        let mut state = conn.state();
        let was_active = !state.disconnected;
        state.disconnected = true;

        let job = state.keep_alive_job.take();
        let mut orphans: Vec<Arc<Operation>> = state.pending_send.drain(..).collect();
        orphans.extend(state.pending_response.drain().map(|(_, op)| op));
        (was_active, job, orphans)
    };

    if let Some(job) = keep_alive_job {
        let _ = job.try_cancel();
    }

    if was_active {
        tracing::info!("Closing MQTT connection");
        if close_transport {
            if let Err(e) = conn.transport.close().await {
                tracing::warn!(error = %e, "Failed to close network connection");
            }
        }
    }

    conn.shutdown.notify_waiters();

    for op in orphans {
        tasks::complete_operation(conn, &op, OperationStatus::NetworkError);
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().expect("connection state mutex poisoned");
        debug_assert!(state.pending_send.is_empty());
        debug_assert!(state.pending_response.is_empty());
        debug_assert!(state.keep_alive_job.is_none());

        // Remaining subscriptions are flagged and released; records still
        // referenced by an executing callback outlive the table.
        self.subscriptions.clear();

        tracing::debug!("Connection destroyed");
    }
}

/// Establishes a new MQTT connection
pub(crate) async fn establish(
    task_pool: TaskPool,
    config: MqttConfig,
    allocator: MessageAllocator,
    default_serializer: Arc<dyn PacketSerializer>,
    network_info: NetworkInfo,
    connect_info: ConnectInfo,
    timeout: Duration,
) -> Result<MqttConnection> {
    validation::validate_connect_info(&connect_info)?;

    // Obtain the transport: the caller supplies one, or the factory is
    // invoked and ownership of the result is recorded.
    let (transport, own_transport) = match &network_info.connection {
        NetworkConnection::Existing(transport) => (Arc::clone(transport), false),
        NetworkConnection::Create(factory) => (factory.create().await?, true),
    };

    let serializer = network_info
        .serializer
        .unwrap_or_else(|| Arc::clone(&default_serializer));

    let mut connect_info = connect_info;
    if connect_info.aws_mode {
        let clamped =
            validation::clamp_aws_keep_alive(connect_info.keep_alive.as_secs() as u16);
        connect_info.keep_alive = Duration::from_secs(u64::from(clamped));
    }

    // Pre-serialize the PINGREQ when keep-alive is enabled; the keep-alive
    // job itself is armed only after a successful CONNACK.
    let keep_alive = if connect_info.keep_alive.is_zero() {
        None
    } else {
        let pingreq = serializer.pingreq().map_err(|e| {
            tracing::error!("Failed to serialize PINGREQ packet for new connection");
            e
        })?;
        Some(KeepAliveState {
            interval: connect_info.keep_alive,
            pingreq,
            outstanding: AtomicBool::new(false),
        })
    };

    tracing::info!(client_id = %connect_info.client_id, "Establishing new MQTT connection");

    let inner = Arc::new(ConnectionInner {
        aws_mode: connect_info.aws_mode,
        own_transport,
        transport,
        serializer,
        config,
        task_pool,
        allocator,
        subscriptions: SubscriptionTable::new(),
        state: Mutex::new(ConnectionState {
            disconnected: false,
            pending_send: VecDeque::new(),
            pending_response: HashMap::new(),
            keep_alive_job: None,
            next_packet_id: 1,
        }),
        send_gate: tokio::sync::Mutex::new(()),
        keep_alive,
        shutdown: Notify::new(),
    });

    // Bind the inbound byte stream to this connection.
    {
        let receiver = Arc::clone(&inner);
        if inner
            .task_pool
            .schedule(Duration::ZERO, async move {
                tasks::network_receive_task(receiver).await;
            })
            .is_err()
        {
            teardown_failed_connect(&inner, own_transport).await;
            return Err(MqttError::SchedulingError);
        }
    }

    // Restore subscriptions known from a previous session before anything
    // can arrive for them. They carry the session-restored identifier, so
    // SUBACK pruning never touches them.
    if !connect_info.clean_session && !connect_info.previous_subscriptions.is_empty() {
        inner
            .subscriptions
            .add_all(RESTORED_SESSION_ID, &connect_info.previous_subscriptions);
    }

    let connect_op = Operation::new(Arc::clone(&inner), OperationType::Connect, true, None);

    let result = (|| {
        let packet = inner.serializer.connect(&connect_info)?;
        inner.attach_packet(&connect_op, &packet, 0, None)?;
        enqueue_and_schedule(&inner, &connect_op)
    })();

    if let Err(e) = result {
        tracing::error!(error = %e, "Failed to enqueue CONNECT for sending");
        teardown_failed_connect(&inner, own_transport).await;
        return Err(e);
    }

    // Wait for the CONNECT operation to complete, i.e. wait for CONNACK.
    let wait_result = MqttOperation {
        op: Arc::clone(&connect_op),
    }
    .wait(timeout)
    .await;

    match wait_result {
        Ok(()) => {
            // Schedule the first keep-alive probe.
            if let Some(keep_alive) = &inner.keep_alive {
                tracing::debug!("Scheduling first MQTT keep-alive job");
                if let Err(e) = arm_keep_alive(&inner, keep_alive.interval) {
                    teardown_failed_connect(&inner, own_transport).await;
                    return Err(e);
                }
            }

            tracing::info!("New MQTT connection established");
            Ok(MqttConnection { inner })
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to establish new MQTT connection");
            teardown_failed_connect(&inner, own_transport).await;
            Err(e)
        }
    }
}

async fn teardown_failed_connect(inner: &Arc<ConnectionInner>, own_transport: bool) {
    // The transport is closed only if this connect call created it.
    close_connection(inner, own_transport).await;
}

/// Handle to an established MQTT connection
///
/// The handle is the user's reference to the session. Call
/// [`MqttConnection::disconnect`] to tear the session down; merely
/// dropping the handle leaves the session running until the transport
/// closes.
pub struct MqttConnection {
    pub(crate) inner: Arc<ConnectionInner>,
}

impl MqttConnection {
    /// Whether the connection is still active
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.inner.is_disconnected()
    }

    /// Whether an active subscription exists for exactly `filter`
    #[must_use]
    pub fn is_subscribed(&self, filter: &str) -> bool {
        self.inner.subscriptions.is_subscribed(filter)
    }

    /// Publishes a message
    ///
    /// For QoS 1 the returned handle can be waited on for the PUBACK; for
    /// QoS 0 the message is queued for transmission and no handle exists.
    ///
    /// # Errors
    ///
    /// Returns `MqttError::BadParameter` on validation failure or
    /// `MqttError::NetworkError` if the connection is closed.
    pub fn publish(&self, info: &PublishInfo) -> Result<Option<MqttOperation>> {
        let waitable = info.qos != QoS::AtMostOnce;
        self.publish_common(info, waitable, None)
    }

    /// Publishes a QoS 1 message with a completion callback
    ///
    /// # Errors
    ///
    /// Returns `MqttError::BadParameter` for a QoS 0 publish: completion
    /// notification is not available without an acknowledgement.
    pub fn publish_with_callback(
        &self,
        info: &PublishInfo,
        callback: OperationCallback,
    ) -> Result<()> {
        if info.qos == QoS::AtMostOnce {
            tracing::error!("QoS 0 PUBLISH should not have notification parameters set");
            return Err(MqttError::BadParameter(
                "a QoS 0 publish cannot carry a completion callback".to_string(),
            ));
        }

        self.publish_common(info, false, Some(callback))?;
        Ok(())
    }

    /// Publishes a message and waits for its completion
    ///
    /// A QoS 0 publish returns as soon as the message is queued.
    ///
    /// # Errors
    ///
    /// Returns the operation's terminal error or `MqttError::Timeout`.
    pub async fn timed_publish(&self, info: &PublishInfo, timeout: Duration) -> Result<()> {
        match self.publish(info)? {
            Some(operation) => operation.wait(timeout).await,
            None => Ok(()),
        }
    }

    fn publish_common(
        &self,
        info: &PublishInfo,
        waitable: bool,
        callback: Option<OperationCallback>,
    ) -> Result<Option<MqttOperation>> {
        let inner = &self.inner;
        validation::validate_publish(inner.aws_mode, info)?;

        let op = Operation::new(
            Arc::clone(inner),
            OperationType::PublishToServer,
            waitable,
            callback,
        );

        let packet_id = if info.qos == QoS::AtMostOnce {
            0
        } else {
            inner.next_packet_id()
        };

        let serialized = inner.serializer.publish(info, packet_id)?;
        // The packet identifier offset is captured only in AWS mode, where
        // a retransmission must keep the serialized bytes identical.
        let offset = if inner.aws_mode {
            serialized.packet_id_offset
        } else {
            None
        };
        inner.attach_packet(&op, &serialized.packet, packet_id, offset)?;

        if info.retry_limit > 0 && info.qos != QoS::AtMostOnce {
            op.state().retry = RetryState {
                limit: info.retry_limit,
                count: 0,
                next_period: info.retry_interval,
            };
        }

        enqueue_and_schedule(inner, &op)?;

        tracing::info!(
            topic = %info.topic,
            qos = ?info.qos,
            packet_id,
            "MQTT PUBLISH operation queued"
        );

        Ok(if info.qos == QoS::AtMostOnce {
            None
        } else {
            Some(MqttOperation { op })
        })
    }

    /// Subscribes to a list of topic filters
    ///
    /// Subscription records become active immediately so no inbound
    /// message is lost between SUBACK and the caller observing it; filters
    /// the broker refuses are removed when the SUBACK arrives. The
    /// returned handle waits for the SUBACK.
    ///
    /// # Errors
    ///
    /// Returns `MqttError::BadParameter` on validation failure or
    /// `MqttError::NetworkError` if the connection is closed.
    pub fn subscribe(&self, subscriptions: Vec<SubscriptionInfo>) -> Result<MqttOperation> {
        self.subscription_common(OperationType::Subscribe, subscriptions, true, None)
            .map(|op| op.expect("waitable subscription returns a handle"))
    }

    /// Subscribes with a completion callback instead of a waitable handle
    ///
    /// # Errors
    ///
    /// Returns `MqttError::BadParameter` on validation failure or
    /// `MqttError::NetworkError` if the connection is closed.
    pub fn subscribe_with_callback(
        &self,
        subscriptions: Vec<SubscriptionInfo>,
        callback: OperationCallback,
    ) -> Result<()> {
        self.subscription_common(
            OperationType::Subscribe,
            subscriptions,
            false,
            Some(callback),
        )?;
        Ok(())
    }

    /// Subscribes and waits for the SUBACK
    ///
    /// # Errors
    ///
    /// Returns the operation's terminal error or `MqttError::Timeout`; on
    /// timeout the provisionally added subscription records are removed.
    pub async fn timed_subscribe(
        &self,
        subscriptions: Vec<SubscriptionInfo>,
        timeout: Duration,
    ) -> Result<()> {
        self.subscribe(subscriptions)?.wait(timeout).await
    }

    /// Unsubscribes from a list of topic filters
    ///
    /// Matching subscription records are removed before the UNSUBSCRIBE is
    /// sent, so an immediate same-filter SUBSCRIBE cannot race the
    /// in-flight acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns `MqttError::BadParameter` on validation failure or
    /// `MqttError::NetworkError` if the connection is closed.
    pub fn unsubscribe(&self, subscriptions: Vec<SubscriptionInfo>) -> Result<MqttOperation> {
        self.subscription_common(OperationType::Unsubscribe, subscriptions, true, None)
            .map(|op| op.expect("waitable subscription returns a handle"))
    }

    /// Unsubscribes with a completion callback instead of a waitable handle
    ///
    /// # Errors
    ///
    /// Returns `MqttError::BadParameter` on validation failure or
    /// `MqttError::NetworkError` if the connection is closed.
    pub fn unsubscribe_with_callback(
        &self,
        subscriptions: Vec<SubscriptionInfo>,
        callback: OperationCallback,
    ) -> Result<()> {
        self.subscription_common(
            OperationType::Unsubscribe,
            subscriptions,
            false,
            Some(callback),
        )?;
        Ok(())
    }

    /// Unsubscribes and waits for the UNSUBACK
    ///
    /// # Errors
    ///
    /// Returns the operation's terminal error or `MqttError::Timeout`.
    pub async fn timed_unsubscribe(
        &self,
        subscriptions: Vec<SubscriptionInfo>,
        timeout: Duration,
    ) -> Result<()> {
        self.unsubscribe(subscriptions)?.wait(timeout).await
    }

    /// The common component of subscribe and unsubscribe
    fn subscription_common(
        &self,
        op_type: OperationType,
        subscriptions: Vec<SubscriptionInfo>,
        waitable: bool,
        callback: Option<OperationCallback>,
    ) -> Result<Option<MqttOperation>> {
        debug_assert!(matches!(
            op_type,
            OperationType::Subscribe | OperationType::Unsubscribe
        ));

        let inner = &self.inner;
        validation::validate_subscription_list(inner.aws_mode, &subscriptions)?;

        // Remove the subscription records for an UNSUBSCRIBE before the
        // packet is sent.
        if op_type == OperationType::Unsubscribe {
            inner.subscriptions.remove_by_filters(&subscriptions);
        }

        let op = Operation::new(Arc::clone(inner), op_type, waitable, callback);
        let packet_id = inner.next_packet_id();

        let packet = match op_type {
            OperationType::Subscribe => inner.serializer.subscribe(&subscriptions, packet_id)?,
            _ => inner.serializer.unsubscribe(&subscriptions, packet_id)?,
        };
        inner.attach_packet(&op, &packet, packet_id, None)?;

        // Add the subscription records for a SUBSCRIBE, keyed by the
        // packet identifier, before the send is scheduled.
        if op_type == OperationType::Subscribe {
            inner.subscriptions.add_all(packet_id, &subscriptions);
        }

        if let Err(e) = enqueue_and_schedule(inner, &op) {
            tracing::error!(
                operation = %op_type,
                error = %e,
                "Failed to schedule subscription operation for sending"
            );
            if op_type == OperationType::Subscribe {
                inner.subscriptions.remove_by_packet(packet_id, None);
            }
            return Err(e);
        }

        tracing::info!(operation = %op_type, packet_id, "Subscription operation scheduled");

        Ok(if waitable {
            Some(MqttOperation { op })
        } else {
            None
        })
    }

    /// Disconnects and releases the user's reference
    ///
    /// In [`DisconnectMode::Graceful`], a DISCONNECT packet is sent first
    /// and its transmission awaited briefly. In either mode the underlying
    /// network connection is closed, every remaining operation fails with
    /// a network error, and the keep-alive is cancelled. Calling this on
    /// an already-closed connection only releases the reference.
    pub async fn disconnect(self, mode: DisconnectMode) {
        let inner = &self.inner;

        tracing::info!("Disconnecting MQTT connection");

        if !inner.is_disconnected() && mode == DisconnectMode::Graceful {
            let op = Operation::new(Arc::clone(inner), OperationType::Disconnect, true, None);

            let queued = inner
                .serializer
                .disconnect()
                .and_then(|packet| inner.attach_packet(&op, &packet, 0, None))
                .and_then(|()| enqueue_and_schedule(inner, &op));

            match queued {
                Ok(()) => {
                    // Wait a short time for the DISCONNECT packet to be
                    // transmitted; SUCCESS, TIMEOUT, and NETWORK ERROR are
                    // the only expected outcomes.
                    let status = MqttOperation { op }.wait(inner.config.response_wait).await;
                    match status {
                        Ok(()) => tracing::info!("Connection disconnected"),
                        Err(e @ (MqttError::Timeout | MqttError::NetworkError)) => {
                            tracing::warn!(error = %e, "DISCONNECT not sent");
                        }
                        Err(e) => tracing::warn!(error = %e, "Unexpected DISCONNECT outcome"),
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to schedule DISCONNECT for sending");
                }
            }
        }

        // Close the underlying network connection. This cleans up the
        // keep-alive and fails every remaining operation.
        close_connection(inner, true).await;

        // The user's reference drops with `self`.
    }
}

impl std::fmt::Debug for MqttConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttConnection")
            .field("disconnected", &self.inner.is_disconnected())
            .field("subscriptions", &self.inner.subscriptions.count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::DefaultSerializer;
    use crate::transport::mock::MockTransport;

    fn test_inner() -> Arc<ConnectionInner> {
        Arc::new(ConnectionInner {
            aws_mode: false,
            own_transport: false,
            transport: MockTransport::new(),
            serializer: Arc::new(DefaultSerializer::default()),
            config: MqttConfig::default(),
            task_pool: TaskPool::new(),
            allocator: MessageAllocator::Heap,
            subscriptions: SubscriptionTable::new(),
            state: Mutex::new(ConnectionState {
                disconnected: false,
                pending_send: VecDeque::new(),
                pending_response: HashMap::new(),
                keep_alive_job: None,
                next_packet_id: 1,
            }),
            send_gate: tokio::sync::Mutex::new(()),
            keep_alive: None,
            shutdown: Notify::new(),
        })
    }

    #[test]
    fn test_packet_id_assignment_skips_zero_on_wrap() {
        let inner = test_inner();

        assert_eq!(inner.next_packet_id(), 1);
        assert_eq!(inner.next_packet_id(), 2);

        inner.state().next_packet_id = u16::MAX;
        assert_eq!(inner.next_packet_id(), u16::MAX);
        // Zero is reserved for "no identifier" and is never issued.
        assert_eq!(inner.next_packet_id(), 1);
    }

    #[test]
    fn test_packet_id_assignment_skips_in_flight() {
        let inner = test_inner();
        let op = Operation::new(
            Arc::clone(&inner),
            OperationType::PublishToServer,
            false,
            None,
        );
        inner.state().pending_response.insert(2, Arc::clone(&op));

        assert_eq!(inner.next_packet_id(), 1);
        // 2 still awaits its acknowledgement and must not be reissued.
        assert_eq!(inner.next_packet_id(), 3);

        inner.state().pending_response.clear();
    }

    #[test]
    fn test_packet_id_assignment_resumes_after_ack() {
        let inner = test_inner();
        let op = Operation::new(
            Arc::clone(&inner),
            OperationType::PublishToServer,
            false,
            None,
        );

        inner.state().pending_response.insert(1, Arc::clone(&op));
        inner.state().next_packet_id = 1;
        assert_eq!(inner.next_packet_id(), 2);

        // Once the acknowledgement retires the identifier, it is issued
        // again on the next pass over the space.
        inner.state().pending_response.clear();
        inner.state().next_packet_id = 1;
        assert_eq!(inner.next_packet_id(), 1);
    }
}
