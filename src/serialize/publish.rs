//! PUBLISH and PUBACK packet serialization

use crate::constants::fixed_header;
use crate::encoding::{encode_string, RemainingLength};
use crate::error::Result;
use crate::flags::PublishFlags;
use crate::serialize::SerializedPublish;
use crate::types::PublishInfo;
use crate::QoS;
use bytes::{BufMut, BytesMut};

/// Serializes a PUBLISH packet.
///
/// For QoS > 0 the returned [`SerializedPublish`] carries the byte offset
/// of the packet identifier so a retransmission can rewrite it in place.
pub(super) fn serialize_publish(info: &PublishInfo, packet_id: u16) -> Result<SerializedPublish> {
    let mut flags = PublishFlags::with_qos(0, info.qos as u8);
    if info.retain {
        flags |= PublishFlags::Retain as u8;
    }

    let has_packet_id = info.qos != QoS::AtMostOnce;
    let body_len = 2 + info.topic.len() + if has_packet_id { 2 } else { 0 } + info.payload.len();
    let remaining = RemainingLength::new(body_len as u32)?;

    let mut packet = BytesMut::with_capacity(1 + remaining.encoded_size() + body_len);
    packet.put_u8(fixed_header::PUBLISH_BASE | flags);
    remaining.encode(&mut packet);
    encode_string(&mut packet, &info.topic)?;

    let packet_id_offset = if has_packet_id {
        let offset = packet.len();
        packet.put_u16(packet_id);
        Some(offset)
    } else {
        None
    };

    packet.put_slice(&info.payload);

    Ok(SerializedPublish {
        packet: packet.to_vec(),
        packet_id_offset,
    })
}

/// Serializes a PUBACK packet acknowledging an inbound QoS 1 PUBLISH
pub(super) fn serialize_puback(packet_id: u16) -> Vec<u8> {
    vec![
        fixed_header::PUBACK,
        0x02,
        (packet_id >> 8) as u8,
        (packet_id & 0xFF) as u8,
    ]
}

/// Rewrites the packet identifier of a serialized PUBLISH in place
pub fn rewrite_packet_id(packet: &mut [u8], offset: usize, packet_id: u16) {
    packet[offset] = (packet_id >> 8) as u8;
    packet[offset + 1] = (packet_id & 0xFF) as u8;
}

/// Sets the DUP flag in the first byte of a serialized PUBLISH
pub fn set_dup(packet: &mut [u8]) {
    packet[0] |= PublishFlags::Dup as u8;
}
