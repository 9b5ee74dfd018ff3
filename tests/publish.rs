//! QoS 0/1 publish scenarios, including the retry/backoff machinery

mod common;

use common::*;
use mqtt_v3::transport::mock::MockTransport;
use mqtt_v3::{DisconnectMode, MqttError, PublishInfo, QoS};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn qos0_publish_has_no_handle() {
    let runtime = runtime();
    let transport = MockTransport::new();
    let connection = establish(&runtime, &transport, quiet_connect_info("c1")).await;

    let publish = PublishInfo::new("a/b", b"23".to_vec());
    assert!(connection.publish(&publish).unwrap().is_none());

    let packets = transport.wait_for_packets(2).await;
    assert_eq!(packet_type(&packets[1]), 3);
    // QoS 0: no packet identifier, payload directly after the topic.
    assert_eq!(packets[1], vec![0x30, 7, 0x00, 3, b'a', b'/', b'b', b'2', b'3']);

    connection.disconnect(DisconnectMode::CleanupOnly).await;
}

#[tokio::test(start_paused = true)]
async fn qos0_completion_callback_rejected() {
    let runtime = runtime();
    let transport = MockTransport::new();
    let connection = establish(&runtime, &transport, quiet_connect_info("c1")).await;

    let publish = PublishInfo::new("a/b", b"x".to_vec());
    let result = connection.publish_with_callback(&publish, Arc::new(|_| {}));
    assert!(matches!(result, Err(MqttError::BadParameter(_))));

    connection.disconnect(DisconnectMode::CleanupOnly).await;
}

#[tokio::test(start_paused = true)]
async fn qos1_publish_completes_on_puback() {
    let runtime = runtime();
    let transport = MockTransport::new();
    let connection = establish(&runtime, &transport, quiet_connect_info("c1")).await;

    let publish = PublishInfo::new("a/b", b"x".to_vec()).with_qos(QoS::AtLeastOnce);
    let operation = connection.publish(&publish).unwrap().unwrap();

    let packets = transport.wait_for_packets(2).await;
    let packet_id = u16::from_be_bytes([packets[1][7], packets[1][8]]);
    transport.inject(&puback(packet_id));

    assert!(operation.wait(Duration::from_secs(5)).await.is_ok());

    connection.disconnect(DisconnectMode::CleanupOnly).await;
}

/// A QoS 1 publish with `retry_limit = 3` against a broker that drops the
/// first two PUBACKs: three sends with identical bytes in AWS mode, no
/// fourth send, final status success.
#[tokio::test(start_paused = true)]
async fn qos1_retry_preserves_bytes_in_aws_mode() {
    let runtime = runtime();
    let transport = MockTransport::new();
    let connection = establish(
        &runtime,
        &transport,
        quiet_connect_info("c1").with_aws_mode(true),
    )
    .await;

    let publish = PublishInfo::new("a/b", b"23".to_vec())
        .with_qos(QoS::AtLeastOnce)
        .with_retry(3, Duration::from_millis(500));
    let operation = connection.publish(&publish).unwrap().unwrap();

    // Initial transmission plus two retransmissions; the broker stays
    // silent through the first two.
    let packets = transport.wait_for_packets(4).await;
    let first = &packets[1];
    assert_eq!(packet_type(first), 3);
    assert_eq!(packets[2], *first, "retransmission must be byte-identical");
    assert_eq!(packets[3], *first, "retransmission must be byte-identical");

    // The broker finally acknowledges the third transmission.
    let packet_id = u16::from_be_bytes([first[7], first[8]]);
    transport.inject(&puback(packet_id));

    assert!(operation.wait(Duration::from_secs(5)).await.is_ok());

    // No fourth transmission happens after the PUBACK.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.written_packets().len(), 4);

    connection.disconnect(DisconnectMode::CleanupOnly).await;
}

#[tokio::test(start_paused = true)]
async fn qos1_retry_sets_dup_outside_aws_mode() {
    let runtime = runtime();
    let transport = MockTransport::new();
    let connection = establish(&runtime, &transport, quiet_connect_info("c1")).await;

    let publish = PublishInfo::new("a/b", b"x".to_vec())
        .with_qos(QoS::AtLeastOnce)
        .with_retry(1, Duration::from_millis(500));
    let operation = connection.publish(&publish).unwrap().unwrap();

    let packets = transport.wait_for_packets(3).await;
    let first = &packets[1];
    let second = &packets[2];

    assert_eq!(first[0] & 0x08, 0, "initial send carries no DUP flag");
    assert_eq!(second[0] & 0x08, 0x08, "retransmission sets the DUP flag");
    // Same packet identifier on both transmissions.
    assert_eq!(&first[7..9], &second[7..9]);

    let packet_id = u16::from_be_bytes([first[7], first[8]]);
    transport.inject(&puback(packet_id));
    assert!(operation.wait(Duration::from_secs(5)).await.is_ok());

    connection.disconnect(DisconnectMode::CleanupOnly).await;
}

#[tokio::test(start_paused = true)]
async fn qos1_retry_exhaustion_reports_no_response() {
    let runtime = runtime();
    let transport = MockTransport::new();
    let connection = establish(&runtime, &transport, quiet_connect_info("c1")).await;

    let publish = PublishInfo::new("a/b", b"x".to_vec())
        .with_qos(QoS::AtLeastOnce)
        .with_retry(2, Duration::from_millis(100));
    let operation = connection.publish(&publish).unwrap().unwrap();

    assert_eq!(
        operation.wait(Duration::from_secs(60)).await,
        Err(MqttError::RetryNoResponse)
    );

    // Initial transmission plus exactly two retransmissions.
    let publishes = transport
        .written_packets()
        .iter()
        .filter(|p| packet_type(p) == 3)
        .count();
    assert_eq!(publishes, 3);

    connection.disconnect(DisconnectMode::CleanupOnly).await;
}

#[tokio::test(start_paused = true)]
async fn qos1_retry_backoff_doubles() {
    let runtime = runtime();
    let transport = MockTransport::new();
    let connection = establish(&runtime, &transport, quiet_connect_info("c1")).await;

    let publish = PublishInfo::new("a/b", b"x".to_vec())
        .with_qos(QoS::AtLeastOnce)
        .with_retry(2, Duration::from_millis(500));
    let _operation = connection.publish(&publish).unwrap().unwrap();

    transport.wait_for_packets(2).await;
    let start = tokio::time::Instant::now();

    // First retransmission after the initial period.
    transport.wait_for_packets(3).await;
    let first_gap = start.elapsed();
    assert!(first_gap >= Duration::from_millis(500));
    assert!(first_gap < Duration::from_millis(1000));

    // Second retransmission after a doubled period.
    transport.wait_for_packets(4).await;
    let second_gap = start.elapsed() - first_gap;
    assert!(second_gap >= Duration::from_millis(1000));

    connection.disconnect(DisconnectMode::CleanupOnly).await;
}

/// A transport write error during an active QoS 1 publish completes the
/// operation with a network error; cleanup-only disconnect still works.
#[tokio::test(start_paused = true)]
async fn write_error_fails_publish() {
    let runtime = runtime();
    let transport = MockTransport::new();
    let connection = establish(&runtime, &transport, quiet_connect_info("c1")).await;

    transport.set_fail_writes(true);

    let publish = PublishInfo::new("a/b", b"x".to_vec()).with_qos(QoS::AtLeastOnce);
    let operation = connection.publish(&publish).unwrap().unwrap();

    assert_eq!(
        operation.wait(Duration::from_secs(5)).await,
        Err(MqttError::NetworkError)
    );

    connection.disconnect(DisconnectMode::CleanupOnly).await;
    assert!(transport.is_closed());
}

#[tokio::test(start_paused = true)]
async fn short_write_is_a_network_error() {
    let runtime = runtime();
    let transport = MockTransport::new();
    let connection = establish(&runtime, &transport, quiet_connect_info("c1")).await;

    transport.set_short_writes(true);

    let publish = PublishInfo::new("a/b", b"x".to_vec()).with_qos(QoS::AtLeastOnce);
    let operation = connection.publish(&publish).unwrap().unwrap();

    assert_eq!(
        operation.wait(Duration::from_secs(5)).await,
        Err(MqttError::NetworkError)
    );

    connection.disconnect(DisconnectMode::CleanupOnly).await;
}

#[tokio::test(start_paused = true)]
async fn publish_completion_callback_fires_once() {
    let runtime = runtime();
    let transport = MockTransport::new();
    let connection = establish(&runtime, &transport, quiet_connect_info("c1")).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let publish = PublishInfo::new("a/b", b"x".to_vec()).with_qos(QoS::AtLeastOnce);
    connection
        .publish_with_callback(
            &publish,
            Arc::new(move |outcome| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(outcome.status);
            }),
        )
        .unwrap();

    let packets = transport.wait_for_packets(2).await;
    let packet_id = u16::from_be_bytes([packets[1][7], packets[1][8]]);

    // A duplicate PUBACK must not re-fire the callback.
    transport.inject(&puback(packet_id));
    transport.inject(&puback(packet_id));

    let status = rx.recv().await.unwrap();
    assert_eq!(status, mqtt_v3::OperationStatus::Success);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    connection.disconnect(DisconnectMode::CleanupOnly).await;
}

#[tokio::test(start_paused = true)]
async fn publish_rejected_after_disconnect() {
    let runtime = runtime();
    let transport = MockTransport::new();
    let connection = establish(&runtime, &transport, quiet_connect_info("c1")).await;

    transport.close_peer();
    // Let the receive task observe the close.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let publish = PublishInfo::new("a/b", b"x".to_vec()).with_qos(QoS::AtLeastOnce);
    assert!(matches!(
        connection.publish(&publish),
        Err(MqttError::NetworkError)
    ));

    connection.disconnect(DisconnectMode::CleanupOnly).await;
}
