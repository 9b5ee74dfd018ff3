//! Wire-level field encoding for MQTT 3.1.1
//!
//! Covers the remaining-length variable integer and the length-prefixed
//! UTF-8 string and binary fields used by the packet serializers.

use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut};

/// Maximum value that can be encoded as a remaining length (268,435,455)
pub const REMAINING_LENGTH_MAX: u32 = 268_435_455;

/// Remaining length as defined by the MQTT specification
///
/// Encodes values using 1-4 bytes:
/// - 0-127: 1 byte
/// - 128-16,383: 2 bytes
/// - 16,384-2,097,151: 3 bytes
/// - 2,097,152-268,435,455: 4 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemainingLength {
    value: u32,
}

impl RemainingLength {
    /// Creates a new `RemainingLength` from a u32 value
    ///
    /// # Errors
    ///
    /// Returns `MqttError::BadParameter` if the value exceeds the maximum
    pub fn new(value: u32) -> Result<Self> {
        if value > REMAINING_LENGTH_MAX {
            return Err(MqttError::BadParameter(format!(
                "remaining length {value} exceeds maximum {REMAINING_LENGTH_MAX}"
            )));
        }
        Ok(Self { value })
    }

    /// Returns the actual value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Returns the number of bytes needed to encode this value
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        match self.value {
            0..=127 => 1,
            128..=16_383 => 2,
            16_384..=2_097_151 => 3,
            _ => 4,
        }
    }

    /// Encodes this remaining length into the provided buffer
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        let mut val = self.value;
        loop {
            let mut byte = (val % 128) as u8;
            val /= 128;
            if val > 0 {
                byte |= 0x80; // continuation bit
            }
            buf.put_u8(byte);
            if val == 0 {
                break;
            }
        }
    }

    /// Decodes a remaining length from the buffer
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer doesn't contain enough bytes or more
    /// than 4 bytes carry the continuation bit (protocol violation).
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let mut value = 0u32;
        let mut multiplier = 1u32;
        let mut byte_count = 0;

        loop {
            if !buf.has_remaining() {
                return Err(MqttError::BadResponse(
                    "insufficient bytes for remaining length".to_string(),
                ));
            }

            byte_count += 1;
            if byte_count > 4 {
                return Err(MqttError::BadResponse(
                    "remaining length exceeds 4 bytes".to_string(),
                ));
            }

            let byte = buf.get_u8();
            value += u32::from(byte & 0x7F) * multiplier;

            if (byte & 0x80) == 0 {
                break;
            }

            multiplier *= 128;
        }

        Ok(Self { value })
    }

    /// Attempts to decode a remaining length from a byte slice without
    /// consuming input.
    ///
    /// Returns `Ok(None)` when the slice ends before the integer is
    /// complete, so a streaming reader can wait for more bytes.
    pub fn peek(bytes: &[u8]) -> Result<Option<(u32, usize)>> {
        let mut value = 0u32;
        let mut multiplier = 1u32;

        for (i, byte) in bytes.iter().enumerate() {
            if i >= 4 {
                return Err(MqttError::BadResponse(
                    "remaining length exceeds 4 bytes".to_string(),
                ));
            }

            value += u32::from(byte & 0x7F) * multiplier;

            if (byte & 0x80) == 0 {
                return Ok(Some((value, i + 1)));
            }

            multiplier *= 128;
        }

        Ok(None)
    }
}

/// Encodes a UTF-8 string with a 2-byte big-endian length prefix
///
/// # Errors
///
/// Returns an error if the string exceeds 65535 bytes or contains a null
/// character.
pub fn encode_string<B: BufMut>(buf: &mut B, string: &str) -> Result<()> {
    if string.len() > u16::MAX as usize {
        return Err(MqttError::BadParameter(format!(
            "string of {} bytes exceeds the 65535-byte field limit",
            string.len()
        )));
    }

    if string.contains('\0') {
        return Err(MqttError::BadParameter(
            "string contains a null character".to_string(),
        ));
    }

    buf.put_u16(string.len() as u16);
    buf.put_slice(string.as_bytes());
    Ok(())
}

/// Decodes a UTF-8 string with a 2-byte big-endian length prefix
///
/// # Errors
///
/// Returns an error on insufficient bytes or invalid UTF-8.
pub fn decode_string<B: Buf>(buf: &mut B) -> Result<String> {
    let bytes = decode_binary(buf)?;
    String::from_utf8(bytes)
        .map_err(|_| MqttError::BadResponse("string field is not valid UTF-8".to_string()))
}

/// Encodes binary data with a 2-byte big-endian length prefix
///
/// # Errors
///
/// Returns an error if the data exceeds 65535 bytes.
pub fn encode_binary<B: BufMut>(buf: &mut B, data: &[u8]) -> Result<()> {
    if data.len() > u16::MAX as usize {
        return Err(MqttError::BadParameter(format!(
            "binary field of {} bytes exceeds the 65535-byte field limit",
            data.len()
        )));
    }

    buf.put_u16(data.len() as u16);
    buf.put_slice(data);
    Ok(())
}

/// Decodes binary data with a 2-byte big-endian length prefix
///
/// # Errors
///
/// Returns an error on insufficient bytes.
pub fn decode_binary<B: Buf>(buf: &mut B) -> Result<Vec<u8>> {
    if buf.remaining() < 2 {
        return Err(MqttError::BadResponse(
            "insufficient bytes for length prefix".to_string(),
        ));
    }

    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(MqttError::BadResponse(
            "insufficient bytes for length-prefixed field".to_string(),
        ));
    }

    let mut data = vec![0u8; len];
    buf.copy_to_slice(&mut data);
    Ok(data)
}
