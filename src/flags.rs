//! MQTT 3.1.1 packet flag definitions using `BeBytes` flag decomposition

use bebytes::BeBytes;

/// Flags for the MQTT CONNECT packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, BeBytes)]
#[bebytes(flags)]
pub enum ConnectFlags {
    /// Reserved bit - must be 0
    Reserved = 0x01,
    /// Clean Session flag
    CleanSession = 0x02,
    /// Will Flag
    WillFlag = 0x04,
    /// Will `QoS` bit 0
    WillQoS0 = 0x08,
    /// Will `QoS` bit 1
    WillQoS1 = 0x10,
    /// Will Retain flag
    WillRetain = 0x20,
    /// Password flag
    PasswordFlag = 0x40,
    /// Username flag
    UsernameFlag = 0x80,
}

impl ConnectFlags {
    /// Extract the Will `QoS` value from a flags byte
    #[must_use]
    pub fn extract_will_qos(flags: u8) -> u8 {
        (flags >> WILL_QOS_SHIFT) & WILL_QOS_MASK
    }

    /// Create a flags byte with the Will `QoS` value set
    #[must_use]
    pub fn with_will_qos(mut flags: u8, qos: u8) -> u8 {
        flags &= WILL_QOS_CLEAR_MASK;
        flags |= (qos & WILL_QOS_MASK) << WILL_QOS_SHIFT;
        flags
    }
}

/// Mask for clearing Will `QoS` bits (bits 3-4)
const WILL_QOS_CLEAR_MASK: u8 = !0x18;
/// Mask for extracting Will `QoS` (bits 3-4 shifted)
const WILL_QOS_MASK: u8 = 0x03;
/// Shift for Will `QoS`
const WILL_QOS_SHIFT: u8 = 3;

/// Flags for the MQTT PUBLISH packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, BeBytes)]
#[bebytes(flags)]
pub enum PublishFlags {
    /// Retain flag
    Retain = 0x01,
    /// `QoS` bit 0
    QoS0 = 0x02,
    /// `QoS` bit 1
    QoS1 = 0x04,
    /// Duplicate delivery flag
    Dup = 0x08,
}

impl PublishFlags {
    /// Extract the `QoS` value from a flags byte
    #[must_use]
    pub fn extract_qos(flags: u8) -> u8 {
        (flags >> QOS_SHIFT) & QOS_MASK
    }

    /// Create a flags byte with the `QoS` value set
    #[must_use]
    pub fn with_qos(mut flags: u8, qos: u8) -> u8 {
        flags &= QOS_CLEAR_MASK;
        flags |= (qos & QOS_MASK) << QOS_SHIFT;
        flags
    }
}

/// Mask for clearing `QoS` bits (bits 1-2)
const QOS_CLEAR_MASK: u8 = !0x06;
/// Mask for extracting `QoS` (bits 1-2 shifted)
const QOS_MASK: u8 = 0x03;
/// Shift for `QoS`
const QOS_SHIFT: u8 = 1;

/// Flags for the MQTT CONNACK packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, BeBytes)]
#[bebytes(flags)]
pub enum ConnAckFlags {
    /// Session Present flag
    SessionPresent = 0x01,
}
