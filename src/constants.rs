//! MQTT 3.1.1 protocol constants
//!
//! This module defines constants for MQTT packet types, flags, and the
//! AWS IoT profile limits to avoid magic numbers throughout the codebase.

use crate::serialize::PacketType;

/// Fixed header byte 1 values (packet type << 4 | flags)
pub mod fixed_header {
    /// CONNECT packet fixed header (0x10)
    pub const CONNECT: u8 = (super::PacketType::Connect as u8) << 4;

    /// CONNACK packet fixed header (0x20)
    pub const CONNACK: u8 = (super::PacketType::ConnAck as u8) << 4;

    /// PUBLISH packet fixed header base (0x30) - flags vary
    pub const PUBLISH_BASE: u8 = (super::PacketType::Publish as u8) << 4;

    /// PUBACK packet fixed header (0x40)
    pub const PUBACK: u8 = (super::PacketType::PubAck as u8) << 4;

    /// SUBSCRIBE packet fixed header (0x82) - has required flags
    pub const SUBSCRIBE: u8 = (super::PacketType::Subscribe as u8) << 4 | 0x02;

    /// SUBACK packet fixed header (0x90)
    pub const SUBACK: u8 = (super::PacketType::SubAck as u8) << 4;

    /// UNSUBSCRIBE packet fixed header (0xA2) - has required flags
    pub const UNSUBSCRIBE: u8 = (super::PacketType::Unsubscribe as u8) << 4 | 0x02;

    /// UNSUBACK packet fixed header (0xB0)
    pub const UNSUBACK: u8 = (super::PacketType::UnsubAck as u8) << 4;

    /// PINGREQ packet fixed header (0xC0)
    pub const PINGREQ: u8 = (super::PacketType::PingReq as u8) << 4;

    /// PINGRESP packet fixed header (0xD0)
    pub const PINGRESP: u8 = (super::PacketType::PingResp as u8) << 4;

    /// DISCONNECT packet fixed header (0xE0)
    pub const DISCONNECT: u8 = (super::PacketType::Disconnect as u8) << 4;
}

/// Masks for extracting fields from the fixed header
pub mod masks {
    /// Mask for extracting packet type from fixed header byte 1 (0xF0)
    pub const PACKET_TYPE: u8 = 0xF0;

    /// Mask for extracting flags from fixed header byte 1 (0x0F)
    pub const FLAGS: u8 = 0x0F;

    /// Mask for checking continuation bit in the remaining length (0x80)
    pub const CONTINUATION_BIT: u8 = 0x80;

    /// Mask for extracting value bits from the remaining length (0x7F)
    pub const REMAINING_LENGTH_VALUE: u8 = 0x7F;
}

/// Common packet payloads
pub mod packets {
    /// PINGREQ packet as bytes
    pub const PINGREQ_BYTES: [u8; 2] = [super::fixed_header::PINGREQ, 0x00];

    /// PINGRESP packet as bytes
    pub const PINGRESP_BYTES: [u8; 2] = [super::fixed_header::PINGRESP, 0x00];

    /// DISCONNECT packet as bytes
    pub const DISCONNECT_BYTES: [u8; 2] = [super::fixed_header::DISCONNECT, 0x00];
}

/// AWS IoT profile limits
pub mod aws {
    /// Minimum keep-alive interval accepted by AWS IoT, in seconds
    pub const MIN_KEEPALIVE_SECS: u16 = 30;

    /// Maximum keep-alive interval accepted by AWS IoT, in seconds.
    /// A keep-alive of 0 (disabled) is remapped to this value.
    pub const MAX_KEEPALIVE_SECS: u16 = 1200;

    /// Maximum topic length accepted by AWS IoT, in bytes
    pub const MAX_TOPIC_LENGTH: usize = 256;

    /// Metrics fragment appended to the CONNECT username when metrics
    /// reporting is enabled
    pub const METRICS_USERNAME: &str = concat!("?SDK=rust&Version=", env!("CARGO_PKG_VERSION"));
}

/// Default time an operation waits for a server response, in milliseconds
pub const DEFAULT_RESPONSE_WAIT_MS: u64 = 1000;

/// Default ceiling for the doubling publish retry period, in milliseconds
pub const DEFAULT_RETRY_MS_CEILING: u64 = 60_000;

/// Maximum payload size of a will message, in bytes. This restriction
/// applies only to will messages, not to normal PUBLISH payloads.
pub const MAX_WILL_PAYLOAD: usize = 65_535;

/// Maximum client identifier length brokers are required to accept
pub const MAX_CLIENT_ID_LENGTH: usize = 23;
