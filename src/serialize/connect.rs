//! CONNECT packet serialization

use crate::constants::{aws, fixed_header};
use crate::encoding::{encode_binary, encode_string, RemainingLength};
use crate::error::Result;
use crate::flags::ConnectFlags;
use crate::types::ConnectInfo;
use bytes::{BufMut, BytesMut};

/// Serializes a CONNECT packet from connection information.
///
/// In AWS mode with metrics enabled, the username carries the SDK metrics
/// fragment so the service can attribute the connection to this library.
pub(super) fn serialize_connect(info: &ConnectInfo, metrics: bool) -> Result<Vec<u8>> {
    let username = effective_username(info, metrics);

    let mut flags = 0u8;
    if info.clean_session {
        flags |= ConnectFlags::CleanSession as u8;
    }
    if let Some(will) = &info.will {
        flags |= ConnectFlags::WillFlag as u8;
        flags = ConnectFlags::with_will_qos(flags, will.qos as u8);
        if will.retain {
            flags |= ConnectFlags::WillRetain as u8;
        }
    }
    if username.is_some() {
        flags |= ConnectFlags::UsernameFlag as u8;
    }
    if info.password.is_some() {
        flags |= ConnectFlags::PasswordFlag as u8;
    }

    // Variable header and payload are built first so the remaining length
    // is known when the fixed header is written.
    let mut body = BytesMut::new();
    encode_string(&mut body, "MQTT")?;
    body.put_u8(4); // protocol level for MQTT 3.1.1
    body.put_u8(flags);
    body.put_u16(info.keep_alive.as_secs() as u16);

    encode_string(&mut body, &info.client_id)?;

    if let Some(will) = &info.will {
        encode_string(&mut body, &will.topic)?;
        encode_binary(&mut body, &will.payload)?;
    }

    if let Some(username) = &username {
        encode_string(&mut body, username)?;
    }

    if let Some(password) = &info.password {
        encode_binary(&mut body, password)?;
    }

    let remaining = RemainingLength::new(body.len() as u32)?;
    let mut packet = BytesMut::with_capacity(1 + remaining.encoded_size() + body.len());
    packet.put_u8(fixed_header::CONNECT);
    remaining.encode(&mut packet);
    packet.extend_from_slice(&body);

    tracing::debug!(
        client_id = %info.client_id,
        clean_session = info.clean_session,
        keep_alive_secs = info.keep_alive.as_secs(),
        packet_size = packet.len(),
        "Serialized CONNECT packet"
    );

    Ok(packet.to_vec())
}

fn effective_username(info: &ConnectInfo, metrics: bool) -> Option<String> {
    if info.aws_mode && metrics {
        Some(match &info.username {
            Some(username) => format!("{username}{}", aws::METRICS_USERNAME),
            None => aws::METRICS_USERNAME.to_string(),
        })
    } else {
        info.username.clone()
    }
}
