#[cfg(test)]
mod fingerprint_test;

use crc::{Crc, CRC_32_ISO_HDLC};

use super::attributes::*;
use super::message::{append_attribute, set_message_length, StunMessage, MESSAGE_HEADER_SIZE};
use crate::error::{Error, Result};

pub const FINGERPRINT_XOR_VALUE: u32 = 0x5354554e;
pub const FINGERPRINT_SIZE: usize = 4; // 32 bit

/// CRC-32 of b XOR-ed by 0x5354554e.
///
/// The XOR helps in cases where an application packet is also using CRC-32.
pub fn fingerprint_value(b: &[u8]) -> u32 {
    let checksum = Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(b);
    checksum ^ FINGERPRINT_XOR_VALUE
}

/// Appends FINGERPRINT as the final attribute, RFC 5389 Section 15.5.
/// Computed over everything preceding it with the header length field
/// adjusted to include the fingerprint TLV.
pub(crate) fn add_fingerprint(raw: &mut Vec<u8>) {
    let adjusted = raw.len() - MESSAGE_HEADER_SIZE + ATTRIBUTE_HEADER_SIZE + FINGERPRINT_SIZE;
    set_message_length(raw, adjusted);
    let val = fingerprint_value(raw);
    append_attribute(raw, ATTR_FINGERPRINT, &val.to_be_bytes());
}

/// Reads the FINGERPRINT value from a parsed message and checks it.
pub fn check_fingerprint(m: &StunMessage) -> Result<()> {
    let attr = m.get(ATTR_FINGERPRINT).ok_or(Error::ErrAttributeNotFound)?;
    if attr.value.len() != FINGERPRINT_SIZE {
        return Err(Error::ErrAttributeSizeInvalid);
    }

    let val = u32::from_be_bytes([attr.value[0], attr.value[1], attr.value[2], attr.value[3]]);
    let attr_start = m.raw.len() - (FINGERPRINT_SIZE + ATTRIBUTE_HEADER_SIZE);
    let expected = fingerprint_value(&m.raw[..attr_start]);

    if val == expected {
        Ok(())
    } else {
        Err(Error::ErrFingerprintMismatch)
    }
}
