//! Inbound packet deserialization
//!
//! Parses the server-to-client half of MQTT 3.1.1. The connection's
//! receive task hands each complete packet here and dispatches on the
//! result.

use crate::constants::masks;
use crate::error::{MqttError, Result};
use crate::flags::{ConnAckFlags, PublishFlags};
use crate::serialize::PacketType;
use crate::types::ReceivedPublish;
use crate::QoS;
use bytes::{Buf, Bytes};

/// CONNACK contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    /// Whether the broker resumed a previous session
    pub session_present: bool,
    /// CONNACK return code; 0 means the connection was accepted
    pub return_code: u8,
}

impl ConnAck {
    /// Whether the broker accepted the connection
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.return_code == 0
    }
}

/// A parsed server-to-client packet
#[derive(Debug, Clone)]
pub enum IncomingPacket {
    ConnAck(ConnAck),
    /// An inbound PUBLISH and, for QoS > 0, its packet identifier
    Publish {
        publish: ReceivedPublish,
        packet_id: Option<u16>,
    },
    PubAck {
        packet_id: u16,
    },
    SubAck {
        packet_id: u16,
        /// Per-filter return codes in request order; 0x80 marks a refused
        /// filter, other values are the granted QoS
        return_codes: Vec<u8>,
    },
    UnsubAck {
        packet_id: u16,
    },
    PingResp,
}

/// Decodes one complete packet from its first byte and body
///
/// # Errors
///
/// Returns `MqttError::BadResponse` for unknown packet types, reserved
/// flag violations, and truncated or malformed bodies.
pub fn decode_packet(first_byte: u8, body: Bytes) -> Result<IncomingPacket> {
    let packet_type = PacketType::from_first_byte(first_byte)
        .ok_or_else(|| MqttError::BadResponse(format!("unknown packet type {first_byte:#04x}")))?;

    match packet_type {
        PacketType::ConnAck => decode_connack(first_byte, body),
        PacketType::Publish => decode_publish(first_byte, body),
        PacketType::PubAck => {
            let packet_id = decode_ack_body(first_byte, body, "PUBACK")?;
            Ok(IncomingPacket::PubAck { packet_id })
        }
        PacketType::SubAck => decode_suback(first_byte, body),
        PacketType::UnsubAck => {
            let packet_id = decode_ack_body(first_byte, body, "UNSUBACK")?;
            Ok(IncomingPacket::UnsubAck { packet_id })
        }
        PacketType::PingResp => {
            check_reserved_flags(first_byte, "PINGRESP")?;
            if !body.is_empty() {
                return Err(MqttError::BadResponse(
                    "PINGRESP carries unexpected payload".to_string(),
                ));
            }
            Ok(IncomingPacket::PingResp)
        }
        _ => Err(MqttError::BadResponse(format!(
            "unexpected client-to-server packet type {packet_type:?}"
        ))),
    }
}

fn check_reserved_flags(first_byte: u8, name: &str) -> Result<()> {
    if first_byte & masks::FLAGS != 0 {
        return Err(MqttError::BadResponse(format!(
            "{name} has non-zero reserved flags"
        )));
    }
    Ok(())
}

fn decode_connack(first_byte: u8, mut body: Bytes) -> Result<IncomingPacket> {
    check_reserved_flags(first_byte, "CONNACK")?;

    if body.len() != 2 {
        return Err(MqttError::BadResponse(format!(
            "CONNACK remaining length is {} instead of 2",
            body.len()
        )));
    }

    let ack_flags = body.get_u8();
    if ack_flags & !(ConnAckFlags::SessionPresent as u8) != 0 {
        return Err(MqttError::BadResponse(
            "CONNACK has reserved acknowledge flags set".to_string(),
        ));
    }

    let return_code = body.get_u8();
    if return_code > 5 {
        return Err(MqttError::BadResponse(format!(
            "CONNACK return code {return_code} is not defined"
        )));
    }

    Ok(IncomingPacket::ConnAck(ConnAck {
        session_present: ack_flags & ConnAckFlags::SessionPresent as u8 != 0,
        return_code,
    }))
}

fn decode_publish(first_byte: u8, mut body: Bytes) -> Result<IncomingPacket> {
    let qos_bits = PublishFlags::extract_qos(first_byte);
    let qos = match qos_bits {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => {
            return Err(MqttError::BadResponse(
                "PUBLISH has both QoS bits set".to_string(),
            ))
        }
    };

    if body.len() < 2 {
        return Err(MqttError::BadResponse("PUBLISH body truncated".to_string()));
    }
    let topic_len = body.get_u16() as usize;
    if body.len() < topic_len {
        return Err(MqttError::BadResponse(
            "PUBLISH topic name truncated".to_string(),
        ));
    }
    let topic_bytes = body.split_to(topic_len);
    let topic = std::str::from_utf8(&topic_bytes)
        .map_err(|_| MqttError::BadResponse("PUBLISH topic is not valid UTF-8".to_string()))?
        .to_string();

    let packet_id = if qos != QoS::AtMostOnce {
        if body.len() < 2 {
            return Err(MqttError::BadResponse(
                "PUBLISH packet identifier truncated".to_string(),
            ));
        }
        let id = body.get_u16();
        if id == 0 {
            return Err(MqttError::BadResponse(
                "PUBLISH packet identifier is zero".to_string(),
            ));
        }
        Some(id)
    } else {
        None
    };

    Ok(IncomingPacket::Publish {
        publish: ReceivedPublish {
            topic,
            payload: body,
            qos,
            retain: first_byte & PublishFlags::Retain as u8 != 0,
            dup: first_byte & PublishFlags::Dup as u8 != 0,
        },
        packet_id,
    })
}

fn decode_suback(first_byte: u8, mut body: Bytes) -> Result<IncomingPacket> {
    check_reserved_flags(first_byte, "SUBACK")?;

    if body.len() < 3 {
        return Err(MqttError::BadResponse(
            "SUBACK must carry a packet identifier and at least one return code".to_string(),
        ));
    }

    let packet_id = body.get_u16();
    let return_codes: Vec<u8> = body.to_vec();

    for code in &return_codes {
        if !matches!(code, 0x00 | 0x01 | 0x02 | 0x80) {
            return Err(MqttError::BadResponse(format!(
                "SUBACK return code {code:#04x} is not defined"
            )));
        }
    }

    Ok(IncomingPacket::SubAck {
        packet_id,
        return_codes,
    })
}

fn decode_ack_body(first_byte: u8, mut body: Bytes, name: &str) -> Result<u16> {
    check_reserved_flags(first_byte, name)?;

    if body.len() != 2 {
        return Err(MqttError::BadResponse(format!(
            "{name} remaining length is {} instead of 2",
            body.len()
        )));
    }

    Ok(body.get_u16())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::fixed_header;

    #[test]
    fn test_decode_connack_accepted() {
        let packet =
            decode_packet(fixed_header::CONNACK, Bytes::from_static(&[0x01, 0x00])).unwrap();
        match packet {
            IncomingPacket::ConnAck(connack) => {
                assert!(connack.session_present);
                assert!(connack.is_accepted());
            }
            other => panic!("expected CONNACK, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_connack_refused() {
        let packet =
            decode_packet(fixed_header::CONNACK, Bytes::from_static(&[0x00, 0x05])).unwrap();
        match packet {
            IncomingPacket::ConnAck(connack) => assert!(!connack.is_accepted()),
            other => panic!("expected CONNACK, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_connack_malformed() {
        // Wrong length
        assert!(decode_packet(fixed_header::CONNACK, Bytes::from_static(&[0x00])).is_err());
        // Reserved acknowledge flags
        assert!(
            decode_packet(fixed_header::CONNACK, Bytes::from_static(&[0x02, 0x00])).is_err()
        );
        // Undefined return code
        assert!(
            decode_packet(fixed_header::CONNACK, Bytes::from_static(&[0x00, 0x06])).is_err()
        );
    }

    #[test]
    fn test_decode_publish_qos0() {
        // topic "a/b", payload "23"
        let body = Bytes::from_static(&[0x00, 3, b'a', b'/', b'b', b'2', b'3']);
        let packet = decode_packet(fixed_header::PUBLISH_BASE, body).unwrap();
        match packet {
            IncomingPacket::Publish { publish, packet_id } => {
                assert_eq!(publish.topic, "a/b");
                assert_eq!(&publish.payload[..], b"23");
                assert_eq!(publish.qos, QoS::AtMostOnce);
                assert_eq!(packet_id, None);
            }
            other => panic!("expected PUBLISH, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_publish_qos1() {
        let body = Bytes::from_static(&[0x00, 3, b'a', b'/', b'b', 0x00, 0x07, b'x']);
        let packet = decode_packet(fixed_header::PUBLISH_BASE | 0x02, body).unwrap();
        match packet {
            IncomingPacket::Publish { publish, packet_id } => {
                assert_eq!(publish.qos, QoS::AtLeastOnce);
                assert_eq!(packet_id, Some(7));
                assert_eq!(&publish.payload[..], b"x");
            }
            other => panic!("expected PUBLISH, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_publish_invalid_qos() {
        let body = Bytes::from_static(&[0x00, 1, b'a']);
        assert!(decode_packet(fixed_header::PUBLISH_BASE | 0x06, body).is_err());
    }

    #[test]
    fn test_decode_suback() {
        let body = Bytes::from_static(&[0x00, 0x0A, 0x01, 0x80]);
        let packet = decode_packet(fixed_header::SUBACK, body).unwrap();
        match packet {
            IncomingPacket::SubAck {
                packet_id,
                return_codes,
            } => {
                assert_eq!(packet_id, 10);
                assert_eq!(return_codes, vec![0x01, 0x80]);
            }
            other => panic!("expected SUBACK, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_suback_bad_code() {
        let body = Bytes::from_static(&[0x00, 0x0A, 0x03]);
        assert!(decode_packet(fixed_header::SUBACK, body).is_err());
    }

    #[test]
    fn test_decode_puback_and_unsuback() {
        match decode_packet(fixed_header::PUBACK, Bytes::from_static(&[0x00, 0x2A])).unwrap() {
            IncomingPacket::PubAck { packet_id } => assert_eq!(packet_id, 42),
            other => panic!("expected PUBACK, got {other:?}"),
        }

        match decode_packet(fixed_header::UNSUBACK, Bytes::from_static(&[0x00, 0x2B])).unwrap()
        {
            IncomingPacket::UnsubAck { packet_id } => assert_eq!(packet_id, 43),
            other => panic!("expected UNSUBACK, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_pingresp() {
        assert!(matches!(
            decode_packet(fixed_header::PINGRESP, Bytes::new()).unwrap(),
            IncomingPacket::PingResp
        ));
        assert!(decode_packet(fixed_header::PINGRESP, Bytes::from_static(&[0x00])).is_err());
    }

    #[test]
    fn test_decode_unknown_type() {
        assert!(decode_packet(0x00, Bytes::new()).is_err());
        // SUBSCRIBE is client-to-server only
        assert!(decode_packet(fixed_header::SUBSCRIBE, Bytes::new()).is_err());
    }
}
