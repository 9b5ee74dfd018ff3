//! Shared helpers for the integration tests
//!
//! Tests play the broker side of the wire through the mock transport:
//! they watch what the client writes and inject the broker's responses.

#![allow(dead_code)]

use mqtt_v3::transport::mock::MockTransport;
use mqtt_v3::transport::Transport;
use mqtt_v3::{ConnectInfo, MqttConfig, MqttConnection, MqttRuntime, NetworkInfo};
use std::sync::Arc;
use std::time::Duration;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A CONNACK packet
pub fn connack(session_present: bool, return_code: u8) -> Vec<u8> {
    vec![0x20, 0x02, u8::from(session_present), return_code]
}

/// A SUBACK packet
pub fn suback(packet_id: u16, return_codes: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x90, (2 + return_codes.len()) as u8];
    packet.extend_from_slice(&packet_id.to_be_bytes());
    packet.extend_from_slice(return_codes);
    packet
}

/// An UNSUBACK packet
pub fn unsuback(packet_id: u16) -> Vec<u8> {
    let mut packet = vec![0xB0, 0x02];
    packet.extend_from_slice(&packet_id.to_be_bytes());
    packet
}

/// A PUBACK packet
pub fn puback(packet_id: u16) -> Vec<u8> {
    let mut packet = vec![0x40, 0x02];
    packet.extend_from_slice(&packet_id.to_be_bytes());
    packet
}

/// A PINGRESP packet
pub fn pingresp() -> Vec<u8> {
    vec![0xD0, 0x00]
}

/// An inbound QoS 0 PUBLISH packet
pub fn publish_qos0(topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x30, (2 + topic.len() + payload.len()) as u8];
    packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// An inbound QoS 1 PUBLISH packet
pub fn publish_qos1(topic: &str, packet_id: u16, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x32, (4 + topic.len() + payload.len()) as u8];
    packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(&packet_id.to_be_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// Extracts the packet type nibble from a serialized packet
pub fn packet_type(packet: &[u8]) -> u8 {
    packet[0] >> 4
}

/// Extracts the packet identifier from a small SUBSCRIBE/UNSUBSCRIBE/PUBACK
/// style packet (single-byte remaining length)
pub fn packet_id_of(packet: &[u8]) -> u16 {
    u16::from_be_bytes([packet[2], packet[3]])
}

/// Establishes a connection over a mock transport, answering the CONNECT
/// with an accepting CONNACK
pub async fn establish(
    runtime: &MqttRuntime,
    transport: &Arc<MockTransport>,
    info: ConnectInfo,
) -> MqttConnection {
    let broker = Arc::clone(transport);
    let answer = tokio::spawn(async move {
        let packets = broker.wait_for_packets(1).await;
        assert_eq!(packet_type(&packets[0]), 1, "expected CONNECT first");
        broker.inject(&connack(false, 0));
    });

    let connection = runtime
        .connect(
            NetworkInfo::existing(Arc::clone(transport) as Arc<dyn Transport>),
            info,
            CONNECT_TIMEOUT,
        )
        .await
        .expect("connect should succeed");

    answer.await.unwrap();
    connection
}

/// A runtime with the default configuration
pub fn runtime() -> MqttRuntime {
    MqttRuntime::new(MqttConfig::default()).expect("default config is valid")
}

/// Connection info with keep-alive disabled, the baseline for most tests
pub fn quiet_connect_info(client_id: &str) -> ConnectInfo {
    ConnectInfo::new(client_id).with_keep_alive(Duration::ZERO)
}
