//! MQTT 3.1.1 packet serialization
//!
//! The connection runtime consumes this module through the
//! [`PacketSerializer`] trait so a transport integration can substitute its
//! own codec for any of the outbound packet types. The built-in
//! [`DefaultSerializer`] is used unless an override is configured on the
//! connection's network information.

mod connect;
mod incoming;
mod publish;
mod subscribe;

pub use incoming::{decode_packet, ConnAck, IncomingPacket};
pub use publish::{rewrite_packet_id, set_dup};

use crate::constants::packets;
use crate::error::Result;
use crate::types::{ConnectInfo, PublishInfo, SubscriptionInfo};

/// MQTT control packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    /// Extracts the packet type from the first byte of a fixed header
    #[must_use]
    pub fn from_first_byte(byte: u8) -> Option<Self> {
        match byte >> 4 {
            1 => Some(Self::Connect),
            2 => Some(Self::ConnAck),
            3 => Some(Self::Publish),
            4 => Some(Self::PubAck),
            8 => Some(Self::Subscribe),
            9 => Some(Self::SubAck),
            10 => Some(Self::Unsubscribe),
            11 => Some(Self::UnsubAck),
            12 => Some(Self::PingReq),
            13 => Some(Self::PingResp),
            14 => Some(Self::Disconnect),
            _ => None,
        }
    }
}

/// A serialized PUBLISH packet
#[derive(Debug, Clone)]
pub struct SerializedPublish {
    /// The complete wire packet
    pub packet: Vec<u8>,
    /// Byte offset of the packet identifier field within `packet`, present
    /// for QoS > 0. Retransmission writes the identifier through this
    /// offset instead of re-serializing the packet.
    pub packet_id_offset: Option<usize>,
}

/// Serializes outbound MQTT packets
///
/// Implementations must be pure: no I/O, no shared mutable state. Packet
/// identifiers are assigned by the connection and passed in.
pub trait PacketSerializer: Send + Sync {
    /// Serializes a CONNECT packet
    ///
    /// # Errors
    /// Returns an error if a field exceeds its wire-format limits.
    fn connect(&self, info: &ConnectInfo) -> Result<Vec<u8>>;

    /// Serializes a PUBLISH packet
    ///
    /// # Errors
    /// Returns an error if a field exceeds its wire-format limits.
    fn publish(&self, info: &PublishInfo, packet_id: u16) -> Result<SerializedPublish>;

    /// Serializes a PUBACK packet for an inbound QoS 1 PUBLISH
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    fn puback(&self, packet_id: u16) -> Result<Vec<u8>>;

    /// Serializes a SUBSCRIBE packet
    ///
    /// # Errors
    /// Returns an error if a field exceeds its wire-format limits.
    fn subscribe(&self, list: &[SubscriptionInfo], packet_id: u16) -> Result<Vec<u8>>;

    /// Serializes an UNSUBSCRIBE packet
    ///
    /// # Errors
    /// Returns an error if a field exceeds its wire-format limits.
    fn unsubscribe(&self, list: &[SubscriptionInfo], packet_id: u16) -> Result<Vec<u8>>;

    /// Serializes a PINGREQ packet
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    fn pingreq(&self) -> Result<Vec<u8>>;

    /// Serializes a DISCONNECT packet
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    fn disconnect(&self) -> Result<Vec<u8>>;
}

/// The built-in MQTT 3.1.1 serializer
#[derive(Debug, Clone, Default)]
pub struct DefaultSerializer {
    /// Append the SDK metrics fragment to the CONNECT username in AWS mode
    pub metrics: bool,
}

impl DefaultSerializer {
    #[must_use]
    pub fn new(metrics: bool) -> Self {
        Self { metrics }
    }
}

impl PacketSerializer for DefaultSerializer {
    fn connect(&self, info: &ConnectInfo) -> Result<Vec<u8>> {
        connect::serialize_connect(info, self.metrics)
    }

    fn publish(&self, info: &PublishInfo, packet_id: u16) -> Result<SerializedPublish> {
        publish::serialize_publish(info, packet_id)
    }

    fn puback(&self, packet_id: u16) -> Result<Vec<u8>> {
        Ok(publish::serialize_puback(packet_id))
    }

    fn subscribe(&self, list: &[SubscriptionInfo], packet_id: u16) -> Result<Vec<u8>> {
        subscribe::serialize_subscription(SubscriptionPacket::Subscribe, list, packet_id)
    }

    fn unsubscribe(&self, list: &[SubscriptionInfo], packet_id: u16) -> Result<Vec<u8>> {
        subscribe::serialize_subscription(SubscriptionPacket::Unsubscribe, list, packet_id)
    }

    fn pingreq(&self) -> Result<Vec<u8>> {
        Ok(packets::PINGREQ_BYTES.to_vec())
    }

    fn disconnect(&self) -> Result<Vec<u8>> {
        Ok(packets::DISCONNECT_BYTES.to_vec())
    }
}

/// Which of the two subscription-list packets to serialize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubscriptionPacket {
    Subscribe,
    Unsubscribe,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::fixed_header;

    #[test]
    fn test_packet_type_from_first_byte() {
        assert_eq!(
            PacketType::from_first_byte(fixed_header::CONNACK),
            Some(PacketType::ConnAck)
        );
        assert_eq!(
            PacketType::from_first_byte(fixed_header::PUBLISH_BASE | 0x03),
            Some(PacketType::Publish)
        );
        assert_eq!(PacketType::from_first_byte(0x00), None);
        assert_eq!(PacketType::from_first_byte(0xF0), None);
    }

    #[test]
    fn test_pingreq_and_disconnect_bytes() {
        let serializer = DefaultSerializer::default();
        assert_eq!(serializer.pingreq().unwrap(), vec![0xC0, 0x00]);
        assert_eq!(serializer.disconnect().unwrap(), vec![0xE0, 0x00]);
    }
}
