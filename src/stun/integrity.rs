#[cfg(test)]
mod integrity_test;

use ring::hmac;
use subtle::ConstantTimeEq;

use super::attributes::*;
use super::message::{append_attribute, set_message_length, StunMessage, MESSAGE_HEADER_SIZE};
use crate::error::{Error, Result};

pub(crate) const MESSAGE_INTEGRITY_SIZE: usize = 20;

fn new_hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mac = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key);
    hmac::sign(&mac, message).as_ref().to_vec()
}

/// Appends MESSAGE-INTEGRITY, RFC 5389 Section 15.4.
///
/// The text used as input to HMAC is the message up to the attribute, with
/// the header length field adjusted to include the integrity TLV itself.
pub(crate) fn add_message_integrity(raw: &mut Vec<u8>, key: &[u8]) {
    let adjusted =
        raw.len() - MESSAGE_HEADER_SIZE + ATTRIBUTE_HEADER_SIZE + MESSAGE_INTEGRITY_SIZE;
    set_message_length(raw, adjusted);
    let mac = new_hmac(key, raw);
    append_attribute(raw, ATTR_MESSAGE_INTEGRITY, &mac);
}

/// Recomputes MESSAGE-INTEGRITY over the received octets and compares in
/// constant time. Attributes after the integrity TLV (FINGERPRINT) are
/// excluded by the length adjustment.
pub(crate) fn verify_message_integrity(m: &StunMessage, key: &[u8]) -> Result<()> {
    let attr = m
        .get(ATTR_MESSAGE_INTEGRITY)
        .ok_or(Error::ErrAttributeNotFound)?;
    if attr.value.len() != MESSAGE_INTEGRITY_SIZE {
        return Err(Error::ErrAttributeSizeInvalid);
    }

    // Byte offset of the integrity attribute within the raw message.
    let mut offset = MESSAGE_HEADER_SIZE;
    for a in &m.attributes {
        if a.typ == ATTR_MESSAGE_INTEGRITY {
            break;
        }
        offset += ATTRIBUTE_HEADER_SIZE + nearest_padded_value_length(a.value.len());
    }

    if m.raw.len() < offset {
        // Not a message read off the wire.
        return Err(Error::ErrUnexpectedEof);
    }

    let mut input = m.raw[..offset].to_vec();
    let adjusted = offset - MESSAGE_HEADER_SIZE + ATTRIBUTE_HEADER_SIZE + MESSAGE_INTEGRITY_SIZE;
    set_message_length(&mut input, adjusted);

    let expected = new_hmac(key, &input);
    check_hmac(&attr.value, &expected)
}

pub(crate) fn check_hmac(got: &[u8], expected: &[u8]) -> Result<()> {
    if got.ct_eq(expected).unwrap_u8() != 1 {
        Err(Error::ErrIntegrityMismatch)
    } else {
        Ok(())
    }
}
