use super::*;
use crate::stun::message::{MessageClass, StunMessage, TransactionId, METHOD_BINDING};

#[test]
fn test_fingerprint_value_xor_constant() {
    // CRC-32 of the empty input is zero, leaving only the XOR constant.
    assert_eq!(fingerprint_value(&[]), FINGERPRINT_XOR_VALUE);
}

#[test]
fn test_fingerprint_is_last_and_verifies() -> crate::error::Result<()> {
    let mut m = StunMessage::new(MessageClass::Request, METHOD_BINDING, TransactionId::new());
    m.add_username("abc123:xyz789");
    let raw = m.serialize("pwd");

    let parsed = StunMessage::parse(&raw)?;
    assert_eq!(
        parsed.attributes.last().map(|a| a.typ),
        Some(ATTR_FINGERPRINT)
    );
    check_fingerprint(&parsed)
}

#[test]
fn test_fingerprint_detects_corruption() -> crate::error::Result<()> {
    let m = StunMessage::new(MessageClass::Request, METHOD_BINDING, TransactionId::new());
    let mut raw = m.serialize("pwd");
    // Corrupt a header byte the CRC covers.
    raw[8] ^= 0x01;

    let parsed = StunMessage::parse(&raw)?;
    assert_eq!(
        check_fingerprint(&parsed).unwrap_err(),
        Error::ErrFingerprintMismatch
    );
    Ok(())
}

#[test]
fn test_fingerprint_requires_attribute() {
    let m = StunMessage::new(MessageClass::Request, METHOD_BINDING, TransactionId::new());
    assert_eq!(
        check_fingerprint(&m).unwrap_err(),
        Error::ErrAttributeNotFound
    );
}
