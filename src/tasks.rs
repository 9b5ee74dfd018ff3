//! Scheduler jobs driving the operation state machine
//!
//! Four job bodies run on the task pool: `process_send` transmits a queued
//! operation (and re-fires for publish retries), the network receive task
//! parses inbound bytes and dispatches acknowledgements and messages,
//! `complete_operation` performs the terminal transition exactly once, and
//! `process_keep_alive` probes the broker with PINGREQ. None of them
//! invokes user callbacks while holding a lock.

use crate::connection::ConnectionInner;
use crate::encoding::RemainingLength;
use crate::error::Result;
use crate::operation::{Operation, OperationOutcome, OperationStatus, OperationType};
use crate::serialize::{self, IncomingPacket, PacketType};
use crate::types::ReceivedPublish;
use crate::QoS;
use bytes::{Buf, Bytes, BytesMut};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// SUBACK return code marking a refused topic filter
const SUBACK_FAILURE: u8 = 0x80;

/// Transmits one operation
///
/// Moves the operation from the send queue to the response map when an
/// acknowledgement is expected, applies retransmission adjustments, writes
/// the packet, and either completes the operation or arms the next retry.
pub(crate) async fn process_send(conn: Arc<ConnectionInner>, op: Arc<Operation>) {
    // Send turnstile: one packet writer per connection at a time.
    let _turnstile = conn.send_gate.lock().await;

    let ack_expected = op.expects_response();
    {
        let mut state = conn.state();
        if state.disconnected {
            drop(state);
            complete_operation(&conn, &op, OperationStatus::NetworkError);
            return;
        }

        state.pending_send.retain(|queued| !Arc::ptr_eq(queued, &op));

        if ack_expected {
            let packet_id = op.packet_id();
            match state.pending_response.get(&packet_id) {
                // A retransmission finds itself already registered.
                Some(existing) => debug_assert!(Arc::ptr_eq(existing, &op)),
                None => {
                    state.pending_response.insert(packet_id, Arc::clone(&op));
                }
            }
        }
    }

    let bytes = {
        let mut state = op.state();
        if state.status.is_terminal() {
            // The acknowledgement won while this job was queued.
            return;
        }

        let is_retransmission = state.retry.count > 0;
        let packet_id = state.packet_id;
        let offset = state.packet_id_offset;
        let Some(packet) = state.packet.as_mut() else {
            drop(state);
            complete_operation(&conn, &op, OperationStatus::BadParameter);
            return;
        };

        if is_retransmission {
            if let Some(offset) = offset {
                // AWS brokers use byte identity for replay detection, so
                // the identifier is rewritten in place and DUP stays
                // clear; the retransmitted packet is bit-for-bit the
                // original.
                serialize::rewrite_packet_id(packet.as_mut_slice(), offset, packet_id);
            } else {
                serialize::set_dup(packet.as_mut_slice());
            }
        }

        packet.as_slice().to_vec()
    };

    match conn.transport.send(&bytes).await {
        Ok(written) if written == bytes.len() => {
            tracing::debug!(
                operation = %op.op_type,
                packet_id = op.packet_id(),
                bytes = bytes.len(),
                "Packet sent"
            );
        }
        Ok(written) => {
            tracing::error!(
                operation = %op.op_type,
                written,
                expected = bytes.len(),
                "Short write on transport"
            );
            complete_operation(&conn, &op, OperationStatus::NetworkError);
            return;
        }
        Err(e) => {
            tracing::error!(operation = %op.op_type, error = %e, "Transport send failed");
            complete_operation(&conn, &op, OperationStatus::NetworkError);
            return;
        }
    }

    let retry_armed = op.state().retry.limit > 0;

    if !ack_expected && !retry_armed {
        complete_operation(&conn, &op, OperationStatus::Success);
        return;
    }

    if retry_armed {
        schedule_next_retry(&conn, &op);
    }
}

/// Arms the next retry step for a QoS 1 publish
///
/// While retransmissions remain, the send job is re-scheduled after the
/// current period and the period doubles up to the ceiling. After the
/// final retransmission a grace period of `response_wait` runs before the
/// operation completes with `RetryNoResponse`. A PUBACK cancels the armed
/// job through the operation's terminal transition.
fn schedule_next_retry(conn: &Arc<ConnectionInner>, op: &Arc<Operation>) {
    enum Next {
        Resend(Duration),
        GiveUp(Duration),
    }

    let next = {
        let mut state = op.state();
        if state.status.is_terminal() {
            return;
        }

        if state.retry.count < state.retry.limit {
            let period = state.retry.next_period;
            state.retry.next_period = (period * 2).min(conn.config.retry_ceiling);
            Next::Resend(period)
        } else {
            Next::GiveUp(conn.config.response_wait)
        }
    };

    let job = match next {
        Next::Resend(delay) => {
            let job_conn = Arc::clone(conn);
            let job_op = Arc::clone(op);
            conn.task_pool.schedule(delay, async move {
                {
                    let mut state = job_op.state();
                    if state.status.is_terminal() {
                        return;
                    }
                    state.retry.count += 1;
                    tracing::debug!(
                        packet_id = state.packet_id,
                        retry_count = state.retry.count,
                        "Retransmitting PUBLISH"
                    );
                }
                process_send(job_conn, job_op).await;
            })
        }
        Next::GiveUp(delay) => {
            let job_conn = Arc::clone(conn);
            let job_op = Arc::clone(op);
            conn.task_pool.schedule(delay, async move {
                tracing::warn!(
                    packet_id = job_op.packet_id(),
                    "No PUBACK after final retransmission"
                );
                complete_operation(&job_conn, &job_op, OperationStatus::RetryNoResponse);
            })
        }
    };

    match job {
        Ok(job) => {
            op.state().job = Some(job);
        }
        Err(_) => {
            complete_operation(conn, op, OperationStatus::SchedulingError);
        }
    }
}

/// Performs the terminal transition for an operation
///
/// Removes the operation from whichever list holds it, signals the waiter
/// or schedules the completion callback, and cancels any armed retry job.
/// Safe to call multiple times; only the first terminal status wins.
pub(crate) fn complete_operation(
    conn: &ConnectionInner,
    op: &Arc<Operation>,
    status: OperationStatus,
) {
    {
        let mut state = conn.state();
        state.pending_send.retain(|queued| !Arc::ptr_eq(queued, op));

        let packet_id = op.packet_id();
        if let Some(existing) = state.pending_response.get(&packet_id) {
            if Arc::ptr_eq(existing, op) {
                state.pending_response.remove(&packet_id);
            }
        }
    }

    let Some(callback) = op.try_complete(status) else {
        return;
    };

    tracing::info!(
        operation = %op.op_type,
        packet_id = op.packet_id(),
        status = %status,
        "Operation complete"
    );

    if let Some(callback) = callback {
        let outcome = OperationOutcome {
            operation: op.op_type,
            status,
        };
        // Callbacks run as their own job, never under a lock. If the pool
        // is already shut down, invoke inline as a last resort.
        let scheduled = conn
            .task_pool
            .schedule(Duration::ZERO, {
                let callback = Arc::clone(&callback);
                async move { callback(outcome) }
            })
            .is_ok();
        if !scheduled {
            callback(outcome);
        }
    }
}

/// Reads and dispatches inbound packets until the connection closes
///
/// This task is the connection's receive binding: it owns the read side of
/// the transport for the connection's lifetime. A read error, end of
/// stream, or unframeable input closes the connection.
pub(crate) async fn network_receive_task(conn: Arc<ConnectionInner>) {
    let mut buffer = BytesMut::with_capacity(1024);
    let mut chunk = [0u8; 4096];

    // Register for the shutdown notification up front; a close landing
    // before registration is caught by the disconnected check below.
    let shutdown = conn.shutdown.notified();
    tokio::pin!(shutdown);
    shutdown.as_mut().enable();

    loop {
        if conn.is_disconnected() {
            return;
        }

        loop {
            match split_packet(&mut buffer) {
                Ok(Some((first_byte, body))) => {
                    process_receive(&conn, first_byte, body).await;
                    if conn.is_disconnected() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Unparseable inbound stream; closing connection");
                    crate::connection::close_connection(&conn, true).await;
                    return;
                }
            }
        }

        let read = tokio::select! {
            () = shutdown.as_mut() => return,
            result = conn.transport.receive(&mut chunk) => result,
        };

        match read {
            Ok(0) => {
                if !conn.is_disconnected() {
                    tracing::info!("Peer closed the network connection");
                    crate::connection::close_connection(&conn, true).await;
                }
                return;
            }
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) => {
                if !conn.is_disconnected() {
                    tracing::error!(error = %e, "Transport receive failed");
                    crate::connection::close_connection(&conn, true).await;
                }
                return;
            }
        }
    }
}

/// Splits one complete packet off the front of the receive buffer
///
/// Returns the first byte of the fixed header and the packet body, or
/// `None` when the buffer does not yet hold a complete packet.
fn split_packet(buffer: &mut BytesMut) -> Result<Option<(u8, Bytes)>> {
    if buffer.len() < 2 {
        return Ok(None);
    }

    let first_byte = buffer[0];
    let Some((remaining, header_len)) = RemainingLength::peek(&buffer[1..])? else {
        return Ok(None);
    };

    let total = 1 + header_len + remaining as usize;
    if buffer.len() < total {
        return Ok(None);
    }

    let mut packet = buffer.split_to(total);
    packet.advance(1 + header_len);
    Ok(Some((first_byte, packet.freeze())))
}

/// Dispatches one parsed inbound packet
pub(crate) async fn process_receive(conn: &Arc<ConnectionInner>, first_byte: u8, body: Bytes) {
    match serialize::decode_packet(first_byte, body.clone()) {
        Ok(IncomingPacket::ConnAck(connack)) => {
            let Some(op) = take_response(conn, 0, OperationType::Connect) else {
                tracing::warn!("Unsolicited CONNACK");
                return;
            };

            let status = if connack.is_accepted() {
                OperationStatus::Success
            } else {
                tracing::error!(return_code = connack.return_code, "CONNECT refused by server");
                OperationStatus::ServerRefused
            };
            complete_operation(conn, &op, status);
        }

        Ok(IncomingPacket::Publish { publish, packet_id }) => {
            handle_incoming_publish(conn, publish, packet_id);
        }

        Ok(IncomingPacket::PubAck { packet_id }) => {
            let Some(op) = take_response(conn, packet_id, OperationType::PublishToServer) else {
                tracing::warn!(packet_id, "PUBACK without matching PUBLISH");
                return;
            };
            // The terminal transition also cancels a pending retry job.
            complete_operation(conn, &op, OperationStatus::Success);
        }

        Ok(IncomingPacket::SubAck {
            packet_id,
            return_codes,
        }) => {
            let Some(op) = take_response(conn, packet_id, OperationType::Subscribe) else {
                tracing::warn!(packet_id, "SUBACK without matching SUBSCRIBE");
                return;
            };

            // Retain only the subscription records the server accepted.
            let mut any_refused = false;
            for (order, code) in return_codes.iter().enumerate() {
                if *code == SUBACK_FAILURE {
                    any_refused = true;
                    tracing::warn!(packet_id, order, "Server refused subscription");
                    conn.subscriptions.remove_by_packet(packet_id, Some(order));
                }
            }

            let status = if any_refused {
                OperationStatus::ServerRefused
            } else {
                OperationStatus::Success
            };
            complete_operation(conn, &op, status);
        }

        Ok(IncomingPacket::UnsubAck { packet_id }) => {
            let Some(op) = take_response(conn, packet_id, OperationType::Unsubscribe) else {
                tracing::warn!(packet_id, "UNSUBACK without matching UNSUBSCRIBE");
                return;
            };
            complete_operation(conn, &op, OperationStatus::Success);
        }

        Ok(IncomingPacket::PingResp) => {
            tracing::debug!("PINGRESP received");
            if let Some(keep_alive) = &conn.keep_alive {
                keep_alive.outstanding.store(false, Ordering::SeqCst);
            }
        }

        Err(e) => {
            // A malformed packet with a recognizable correlation fails
            // that operation; anything else closes the connection.
            if let Some(op) = take_malformed_correlation(conn, first_byte, &body) {
                tracing::error!(
                    operation = %op.op_type,
                    error = %e,
                    "Malformed response for known operation"
                );
                complete_operation(conn, &op, OperationStatus::BadResponse);
            } else {
                tracing::error!(error = %e, "Malformed inbound packet; closing connection");
                crate::connection::close_connection(&conn, true).await;
            }
        }
    }
}

fn take_response(
    conn: &ConnectionInner,
    packet_id: u16,
    expected: OperationType,
) -> Option<Arc<Operation>> {
    let mut state = conn.state();
    match state.pending_response.get(&packet_id) {
        Some(op) if op.op_type == expected => state.pending_response.remove(&packet_id),
        _ => None,
    }
}

/// Attempts to correlate a malformed acknowledgement with a pending
/// operation through its packet identifier bytes
fn take_malformed_correlation(
    conn: &ConnectionInner,
    first_byte: u8,
    body: &Bytes,
) -> Option<Arc<Operation>> {
    let expected = match PacketType::from_first_byte(first_byte)? {
        PacketType::ConnAck => return take_any_response(conn, 0),
        PacketType::PubAck => OperationType::PublishToServer,
        PacketType::SubAck => OperationType::Subscribe,
        PacketType::UnsubAck => OperationType::Unsubscribe,
        _ => return None,
    };

    if body.len() < 2 {
        return None;
    }
    let packet_id = u16::from_be_bytes([body[0], body[1]]);
    take_response(conn, packet_id, expected)
}

fn take_any_response(conn: &ConnectionInner, packet_id: u16) -> Option<Arc<Operation>> {
    conn.state().pending_response.remove(&packet_id)
}

/// Delivers an inbound PUBLISH to matching subscriptions
///
/// For QoS 1 a PUBACK operation is synthesized and scheduled before
/// dispatch. Matching records are copied out under the subscription lock
/// and their callbacks invoked after it is released.
fn handle_incoming_publish(
    conn: &Arc<ConnectionInner>,
    publish: ReceivedPublish,
    packet_id: Option<u16>,
) {
    if publish.qos == QoS::AtLeastOnce {
        if let Some(packet_id) = packet_id {
            send_puback(conn, packet_id);
        }
    } else if publish.qos == QoS::ExactlyOnce {
        // The runtime never grants QoS 2; deliver without acknowledgement.
        tracing::warn!(topic = %publish.topic, "Inbound QoS 2 PUBLISH treated as unacknowledged");
    }

    let matches = conn.subscriptions.matching(&publish.topic);
    if matches.is_empty() {
        tracing::debug!(topic = %publish.topic, "Inbound PUBLISH matched no subscription");
        return;
    }

    tracing::debug!(
        topic = %publish.topic,
        subscribers = matches.len(),
        "Dispatching inbound PUBLISH"
    );

    for record in matches {
        (record.callback)(publish.clone());
    }
}

/// Synthesizes and schedules a PUBACK for an inbound QoS 1 PUBLISH
fn send_puback(conn: &Arc<ConnectionInner>, packet_id: u16) {
    let result: Result<()> = (|| {
        let packet = conn.serializer.puback(packet_id)?;
        let op = Operation::new(Arc::clone(conn), OperationType::PubAck, false, None);
        {
            let mut buffer = conn.allocator.alloc(packet.len())?;
            buffer.as_mut_slice().copy_from_slice(&packet);
            let mut state = op.state();
            state.packet = Some(buffer);
            state.packet_id = packet_id;
        }
        crate::connection::enqueue_and_schedule(conn, &op)
    })();

    if let Err(e) = result {
        tracing::warn!(packet_id, error = %e, "Failed to schedule PUBACK");
    }
}

/// Keep-alive probe
///
/// Sends the pre-serialized PINGREQ, waits out the response deadline, and
/// either closes the connection (missing PINGRESP or write failure) or
/// re-arms itself so the probe period stays at the keep-alive interval.
pub(crate) async fn process_keep_alive(conn: Arc<ConnectionInner>) {
    if conn.is_disconnected() {
        return;
    }

    let Some(keep_alive) = &conn.keep_alive else {
        return;
    };

    // Raised before the probe is written: on a fast link the PINGRESP can
    // already be in flight when send returns, and its clear must not be
    // overwritten.
    keep_alive.outstanding.store(true, Ordering::SeqCst);

    let sent = {
        let _turnstile = conn.send_gate.lock().await;
        conn.transport.send(&keep_alive.pingreq).await
    };

    match sent {
        Ok(written) if written == keep_alive.pingreq.len() => {
            tracing::debug!("PINGREQ sent; awaiting PINGRESP");
        }
        _ => {
            tracing::error!("Failed to send PINGREQ; closing connection");
            crate::connection::close_connection(&conn, true).await;
            return;
        }
    }

    // Inner deadline for the PINGRESP.
    tokio::time::sleep(conn.config.response_wait).await;

    if conn.is_disconnected() {
        return;
    }

    if keep_alive.outstanding.load(Ordering::SeqCst) {
        tracing::error!("PINGRESP not received within deadline; closing connection");
        crate::connection::close_connection(&conn, true).await;
        return;
    }

    let next_probe = keep_alive.interval.saturating_sub(conn.config.response_wait);
    if let Err(e) = crate::connection::arm_keep_alive(&conn, next_probe) {
        if !conn.is_disconnected() {
            tracing::error!(error = %e, "Failed to re-arm keep-alive; closing connection");
            crate::connection::close_connection(&conn, true).await;
        }
    }
}
