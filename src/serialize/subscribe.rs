//! SUBSCRIBE and UNSUBSCRIBE packet serialization
//!
//! The two packets share their shape: a packet identifier followed by a
//! list of topic filters, with SUBSCRIBE adding a requested QoS byte per
//! filter.

use crate::constants::fixed_header;
use crate::encoding::{encode_string, RemainingLength};
use crate::error::Result;
use crate::serialize::SubscriptionPacket;
use crate::types::SubscriptionInfo;
use bytes::{BufMut, BytesMut};

pub(super) fn serialize_subscription(
    packet_type: SubscriptionPacket,
    list: &[SubscriptionInfo],
    packet_id: u16,
) -> Result<Vec<u8>> {
    let first_byte = match packet_type {
        SubscriptionPacket::Subscribe => fixed_header::SUBSCRIBE,
        SubscriptionPacket::Unsubscribe => fixed_header::UNSUBSCRIBE,
    };

    let per_filter_overhead = match packet_type {
        SubscriptionPacket::Subscribe => 3, // length prefix + requested QoS
        SubscriptionPacket::Unsubscribe => 2,
    };
    let body_len = 2 + list
        .iter()
        .map(|s| s.topic_filter.len() + per_filter_overhead)
        .sum::<usize>();
    let remaining = RemainingLength::new(body_len as u32)?;

    let mut packet = BytesMut::with_capacity(1 + remaining.encoded_size() + body_len);
    packet.put_u8(first_byte);
    remaining.encode(&mut packet);
    packet.put_u16(packet_id);

    for subscription in list {
        encode_string(&mut packet, &subscription.topic_filter)?;
        if packet_type == SubscriptionPacket::Subscribe {
            packet.put_u8(subscription.qos as u8);
        }
    }

    Ok(packet.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QoS;

    fn subscription(filter: &str, qos: QoS) -> SubscriptionInfo {
        SubscriptionInfo::new(filter, qos, |_| {})
    }

    #[test]
    fn test_subscribe_packet() {
        let list = vec![subscription("a/b", QoS::AtLeastOnce)];
        let packet =
            serialize_subscription(SubscriptionPacket::Subscribe, &list, 0x000A).unwrap();

        assert_eq!(
            packet,
            vec![0x82, 8, 0x00, 0x0A, 0x00, 3, b'a', b'/', b'b', 0x01]
        );
    }

    #[test]
    fn test_unsubscribe_packet() {
        let list = vec![subscription("a/b", QoS::AtMostOnce)];
        let packet =
            serialize_subscription(SubscriptionPacket::Unsubscribe, &list, 0x000B).unwrap();

        assert_eq!(packet, vec![0xA2, 7, 0x00, 0x0B, 0x00, 3, b'a', b'/', b'b']);
    }

    #[test]
    fn test_multiple_filters() {
        let list = vec![
            subscription("a/b", QoS::AtMostOnce),
            subscription("sensors/+/temp", QoS::AtLeastOnce),
        ];
        let packet = serialize_subscription(SubscriptionPacket::Subscribe, &list, 1).unwrap();

        // packet id + (2+3+1) + (2+14+1)
        assert_eq!(packet[1], 2 + 6 + 17);
        assert_eq!(*packet.last().unwrap(), 0x01);
    }
}
