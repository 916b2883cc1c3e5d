use super::*;
use crate::stun::message::{MessageClass, StunMessage, TransactionId, METHOD_BINDING};

fn signed_request(password: &str) -> Vec<u8> {
    let mut m = StunMessage::new(MessageClass::Request, METHOD_BINDING, TransactionId::new());
    m.add_username("abc123:xyz789");
    m.serialize(password)
}

#[test]
fn test_check_integrity_accepts_valid_key() -> crate::error::Result<()> {
    let raw = signed_request("P1");
    let parsed = StunMessage::parse(&raw)?;
    parsed.check_integrity("P1")
}

#[test]
fn test_check_integrity_rejects_wrong_key() -> crate::error::Result<()> {
    let raw = signed_request("P1");
    let parsed = StunMessage::parse(&raw)?;
    assert_eq!(
        parsed.check_integrity("P2").unwrap_err(),
        Error::ErrIntegrityMismatch
    );
    Ok(())
}

#[test]
fn test_check_integrity_rejects_one_byte_flip() -> crate::error::Result<()> {
    let raw = signed_request("P1");
    let parsed = StunMessage::parse(&raw)?;

    // Locate the integrity value inside the message and flip one byte.
    let mut offset = MESSAGE_HEADER_SIZE;
    for a in &parsed.attributes {
        if a.typ == ATTR_MESSAGE_INTEGRITY {
            break;
        }
        offset += ATTRIBUTE_HEADER_SIZE + nearest_padded_value_length(a.value.len());
    }

    let mut tampered = raw.clone();
    tampered[offset + ATTRIBUTE_HEADER_SIZE] ^= 0x01;
    let parsed = StunMessage::parse(&tampered)?;
    assert_eq!(
        parsed.check_integrity("P1").unwrap_err(),
        Error::ErrIntegrityMismatch
    );
    Ok(())
}

#[test]
fn test_check_integrity_rejects_tampered_payload() -> crate::error::Result<()> {
    let raw = signed_request("P1");

    // Flip a byte of the USERNAME value, which the HMAC covers.
    let mut tampered = raw.clone();
    tampered[MESSAGE_HEADER_SIZE + ATTRIBUTE_HEADER_SIZE] ^= 0x01;
    let parsed = StunMessage::parse(&tampered)?;
    assert_eq!(
        parsed.check_integrity("P1").unwrap_err(),
        Error::ErrIntegrityMismatch
    );
    Ok(())
}

#[test]
fn test_check_integrity_requires_attribute() {
    let mut m = StunMessage::new(MessageClass::Request, METHOD_BINDING, TransactionId::new());
    m.add_username("abc123:xyz789");
    assert_eq!(
        m.check_integrity("P1").unwrap_err(),
        Error::ErrAttributeNotFound
    );
}

#[test]
fn test_integrity_excludes_fingerprint() -> crate::error::Result<()> {
    // FINGERPRINT follows MESSAGE-INTEGRITY on the wire; corrupting it must
    // not invalidate the HMAC.
    let raw = signed_request("P1");
    let mut tampered = raw.clone();
    let len = tampered.len();
    tampered[len - 1] ^= 0xff;

    let parsed = StunMessage::parse(&tampered)?;
    parsed.check_integrity("P1")
}
