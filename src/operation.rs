//! Operation records
//!
//! An operation is one asynchronous user request: the serialized wire
//! packet plus delivery metadata, an optional retry schedule, and a
//! completion signal. Operations are shared between the caller, the
//! scheduler jobs, and the receive task through `Arc`; the last clone to
//! drop frees the record and releases its hold on the connection.

use crate::connection::ConnectionInner;
use crate::error::{MqttError, Result};
use crate::memory::MessageBuffer;
use crate::task_pool::JobHandle;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// The kind of request an operation carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Connect,
    PublishToServer,
    PubAck,
    Subscribe,
    Unsubscribe,
    PingReq,
    Disconnect,
}

impl OperationType {
    /// Human-readable name of the operation type
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::PublishToServer => "PUBLISH",
            Self::PubAck => "PUBACK",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::PingReq => "PINGREQ",
            Self::Disconnect => "DISCONNECT",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle status of an operation
///
/// Starts as `Pending`; the transition to any other value is terminal and
/// happens exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Success,
    NetworkError,
    Timeout,
    BadResponse,
    ServerRefused,
    RetryNoResponse,
    SchedulingError,
    NoMemory,
    BadParameter,
}

impl OperationStatus {
    /// Whether the status is terminal
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }

    /// Short diagnostic name for the status
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::NetworkError => "NETWORK ERROR",
            Self::Timeout => "TIMEOUT",
            Self::BadResponse => "BAD RESPONSE RECEIVED",
            Self::ServerRefused => "SERVER REFUSED",
            Self::RetryNoResponse => "NO RESPONSE",
            Self::SchedulingError => "SCHEDULING ERROR",
            Self::NoMemory => "NO MEMORY",
            Self::BadParameter => "BAD PARAMETER",
        }
    }

    /// Converts a terminal status into an API result
    ///
    /// # Errors
    ///
    /// Returns the error corresponding to any non-success status. A pending
    /// status maps to `Timeout` as it can only be observed by a caller that
    /// stopped waiting.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Success => Ok(()),
            Self::Pending | Self::Timeout => Err(MqttError::Timeout),
            Self::NetworkError => Err(MqttError::NetworkError),
            Self::BadResponse => Err(MqttError::BadResponse("malformed response".to_string())),
            Self::ServerRefused => Err(MqttError::ServerRefused),
            Self::RetryNoResponse => Err(MqttError::RetryNoResponse),
            Self::SchedulingError => Err(MqttError::SchedulingError),
            Self::NoMemory => Err(MqttError::NoMemory),
            Self::BadParameter => Err(MqttError::BadParameter("invalid operation".to_string())),
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome passed to an operation completion callback
#[derive(Debug, Clone, Copy)]
pub struct OperationOutcome {
    /// Which request completed
    pub operation: OperationType,
    /// Its terminal status
    pub status: OperationStatus,
}

/// Callback notified exactly once when an operation completes
pub type OperationCallback = Arc<dyn Fn(OperationOutcome) + Send + Sync>;

/// Retry schedule for a QoS 1 publish
#[derive(Debug, Clone)]
pub(crate) struct RetryState {
    /// Maximum retransmissions after the initial send; 0 disables retry
    pub limit: u32,
    /// Retransmissions performed so far
    pub count: u32,
    /// Period before the next retransmission; doubles after each one up
    /// to the configured ceiling
    pub next_period: Duration,
}

impl RetryState {
    pub(crate) fn disabled() -> Self {
        Self {
            limit: 0,
            count: 0,
            next_period: Duration::ZERO,
        }
    }
}

/// Mutable operation state, guarded by the operation's mutex
pub(crate) struct OperationState {
    pub status: OperationStatus,
    pub packet: Option<MessageBuffer>,
    pub packet_id: u16,
    /// Byte offset of the packet identifier within the serialized packet,
    /// captured in AWS mode so a retransmission can rewrite it in place
    pub packet_id_offset: Option<usize>,
    pub retry: RetryState,
    /// The currently scheduled send or retry job, if any
    pub job: Option<JobHandle>,
    pub callback: Option<OperationCallback>,
}

/// One asynchronous request and its completion state
pub(crate) struct Operation {
    pub op_type: OperationType,
    pub waitable: bool,
    pub conn: Arc<ConnectionInner>,
    state: Mutex<OperationState>,
    /// Completion signal: zero permits until the operation completes
    done: Semaphore,
}

impl Operation {
    pub(crate) fn new(
        conn: Arc<ConnectionInner>,
        op_type: OperationType,
        waitable: bool,
        callback: Option<OperationCallback>,
    ) -> Arc<Self> {
        Arc::new(Self {
            op_type,
            waitable,
            conn,
            state: Mutex::new(OperationState {
                status: OperationStatus::Pending,
                packet: None,
                packet_id: 0,
                packet_id_offset: None,
                retry: RetryState::disabled(),
                job: None,
                callback,
            }),
            done: Semaphore::new(0),
        })
    }

    pub(crate) fn state(&self) -> std::sync::MutexGuard<'_, OperationState> {
        self.state.lock().expect("operation state mutex poisoned")
    }

    /// Current status
    pub(crate) fn status(&self) -> OperationStatus {
        self.state().status
    }

    /// Packet identifier, 0 if none was assigned
    pub(crate) fn packet_id(&self) -> u16 {
        self.state().packet_id
    }

    /// Whether this operation expects an acknowledgement packet
    pub(crate) fn expects_response(&self) -> bool {
        match self.op_type {
            OperationType::Connect | OperationType::Subscribe | OperationType::Unsubscribe => true,
            OperationType::PublishToServer => self.state().packet_id != 0,
            _ => false,
        }
    }

    /// Attempts the terminal status transition
    ///
    /// Returns `None` if the operation already completed. On the first
    /// transition, returns the completion callback (if any) for the caller
    /// to invoke outside all locks, and cancels any scheduled retry job.
    pub(crate) fn try_complete(&self, status: OperationStatus) -> Option<Option<OperationCallback>> {
        debug_assert!(status.is_terminal());

        let (callback, job) = {
            let mut state = self.state();
            if state.status.is_terminal() {
                return None;
            }
            state.status = status;
            (state.callback.take(), state.job.take())
        };

        if let Some(job) = job {
            let _ = job.try_cancel();
        }

        if self.waitable {
            self.done.add_permits(1);
        }

        Some(callback)
    }

    /// Waits for the completion signal
    pub(crate) async fn wait_signal(&self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.done.acquire()).await {
            Ok(Ok(_permit)) => Ok(()),
            Ok(Err(_closed)) => Err(MqttError::Timeout),
            Err(_elapsed) => Err(MqttError::Timeout),
        }
    }

    /// Cancels the currently scheduled job, best-effort
    pub(crate) fn cancel_job(&self) {
        let job = self.state().job.take();
        if let Some(job) = job {
            let _ = job.try_cancel();
        }
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Operation")
            .field("op_type", &self.op_type)
            .field("waitable", &self.waitable)
            .field("status", &state.status)
            .field("packet_id", &state.packet_id)
            .finish_non_exhaustive()
    }
}

/// Handle to an in-flight operation
///
/// Returned by the request APIs for operations that can be waited on. The
/// handle holds one reference to the operation; dropping it without
/// waiting lets the operation complete in the background.
#[derive(Debug, Clone)]
pub struct MqttOperation {
    pub(crate) op: Arc<Operation>,
}

impl MqttOperation {
    /// The operation's type
    #[must_use]
    pub fn operation_type(&self) -> OperationType {
        self.op.op_type
    }

    /// The operation's current status
    #[must_use]
    pub fn status(&self) -> OperationStatus {
        self.op.status()
    }

    /// Blocks until the operation completes or the timeout elapses
    ///
    /// On timeout the scheduled work is cancelled best-effort; work already
    /// executing runs to completion asynchronously and its resources are
    /// freed on the last reference. A timed-out SUBSCRIBE removes the
    /// subscription records that were provisionally added for its packet
    /// identifier.
    ///
    /// # Errors
    ///
    /// Returns `MqttError::NetworkError` if the connection is already
    /// closed, `MqttError::Timeout` on timeout, or the operation's terminal
    /// error.
    pub async fn wait(self, timeout: Duration) -> Result<()> {
        let conn = &self.op.conn;

        if conn.is_disconnected() && !self.op.status().is_terminal() {
            tracing::error!(
                operation = %self.op.op_type,
                "Connection is closed; operation cannot be waited on"
            );
            return Err(MqttError::NetworkError);
        }

        match self.op.wait_signal(timeout).await {
            Ok(()) => {
                let status = self.op.status();
                tracing::info!(
                    operation = %self.op.op_type,
                    status = %status,
                    "Wait complete"
                );
                status.into_result()
            }
            Err(_) => {
                // Attempt to cancel the job of the timed-out operation.
                self.op.cancel_job();

                if self.op.op_type == OperationType::Subscribe {
                    tracing::debug!(
                        packet_id = self.op.packet_id(),
                        "Cleaning up subscriptions of timed-out SUBSCRIBE"
                    );
                    conn.subscriptions
                        .remove_by_packet(self.op.packet_id(), None);
                }

                Err(MqttError::Timeout)
            }
        }
    }
}
