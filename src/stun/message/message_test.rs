use std::net::SocketAddr;

use super::*;
use crate::stun::fingerprint::check_fingerprint;

fn sample_request() -> StunMessage {
    let mut m = StunMessage::new(MessageClass::Request, METHOD_BINDING, TransactionId::new());
    m.add_username("abc123:xyz789");
    m.add(ATTR_USE_CANDIDATE, &[]);
    m.add(ATTR_PRIORITY, &0x6e7f1effu32.to_be_bytes());
    m
}

#[test]
fn test_message_type_encoding() {
    let tests = vec![
        (MessageClass::Request, METHOD_BINDING, 0x0001u16),
        (MessageClass::Indication, METHOD_BINDING, 0x0011),
        (MessageClass::SuccessResponse, METHOD_BINDING, 0x0101),
        (MessageClass::ErrorResponse, METHOD_BINDING, 0x0111),
        (MessageClass::Request, METHOD_ALLOCATE, 0x0003),
        (MessageClass::Request, METHOD_CHANNEL_BIND, 0x0009),
    ];

    for (class, method, expected) in tests {
        let m = StunMessage::new(class, method, TransactionId::default());
        let raw = m.serialize("pwd");
        let value = u16::from_be_bytes([raw[0], raw[1]]);
        assert_eq!(value, expected, "{method} {class} encoded as 0x{value:04x}");

        let parsed = StunMessage::parse(&raw).unwrap();
        assert_eq!(parsed.class, class);
        assert_eq!(parsed.method, method);
    }
}

#[test]
fn test_serialize_then_parse_round_trip() -> crate::error::Result<()> {
    let m = sample_request();
    let raw = m.serialize("VOkJxbRl1RmTxUk");

    let parsed = StunMessage::parse(&raw)?;
    assert_eq!(parsed.class, MessageClass::Request);
    assert_eq!(parsed.method, METHOD_BINDING);
    assert_eq!(parsed.transaction_id, m.transaction_id);
    assert_eq!(parsed.ufrags()?, ("abc123".to_owned(), "xyz789".to_owned()));
    assert!(parsed.get(ATTR_USE_CANDIDATE).is_some());
    assert_eq!(
        parsed.get(ATTR_PRIORITY).map(|a| a.value.clone()),
        Some(0x6e7f1effu32.to_be_bytes().to_vec())
    );

    // Authentication attributes are appended on serialize, FINGERPRINT last.
    assert_eq!(
        parsed.attributes.last().map(|a| a.typ),
        Some(ATTR_FINGERPRINT)
    );
    parsed.check_integrity("VOkJxbRl1RmTxUk")?;
    check_fingerprint(&parsed)?;

    // The header length field covers all attributes.
    let length = u16::from_be_bytes([raw[2], raw[3]]) as usize;
    assert_eq!(raw.len(), MESSAGE_HEADER_SIZE + length);

    Ok(())
}

#[test]
fn test_parse_rejects_short_buffer() {
    let result = StunMessage::parse(&[0x00, 0x01, 0x00]);
    assert_eq!(result.unwrap_err(), Error::ErrUnexpectedHeaderEof);
}

#[test]
fn test_parse_rejects_bad_cookie() {
    let mut raw = sample_request().serialize("pwd");
    raw[4] = 0xde;
    raw[5] = 0xad;
    let result = StunMessage::parse(&raw);
    assert_eq!(result.unwrap_err(), Error::ErrInvalidMagicCookie);
}

#[test]
fn test_parse_rejects_truncated_message() {
    let raw = sample_request().serialize("pwd");
    let result = StunMessage::parse(&raw[..raw.len() - 1]);
    assert_eq!(result.unwrap_err(), Error::ErrUnexpectedEof);
}

#[test]
fn test_parse_keeps_unknown_attributes() -> crate::error::Result<()> {
    let mut m = StunMessage::new(MessageClass::Request, METHOD_BINDING, TransactionId::new());
    // https://tools.ietf.org/html/draft-thatcher-ice-network-cost-00
    m.add(AttrType(0xc057), &[0x00, 0x02, 0x00, 0x00]);
    let raw = m.serialize("pwd");

    let parsed = StunMessage::parse(&raw)?;
    let attr = parsed.get(AttrType(0xc057)).expect("attribute dropped");
    assert_eq!(attr.value, vec![0x00, 0x02, 0x00, 0x00]);
    Ok(())
}

#[test]
fn test_ufrags() {
    let mut m = StunMessage::new(MessageClass::Request, METHOD_BINDING, TransactionId::new());
    assert_eq!(m.ufrags().unwrap_err(), Error::ErrAttributeNotFound);

    m.add_username("nocolon");
    assert_eq!(m.ufrags().unwrap_err(), Error::ErrInvalidUsername);

    let mut m = StunMessage::new(MessageClass::Request, METHOD_BINDING, TransactionId::new());
    m.add_username("abc123:xyz789");
    assert_eq!(
        m.ufrags().unwrap(),
        ("abc123".to_owned(), "xyz789".to_owned())
    );
}

#[test]
fn test_xor_mapped_address_round_trip() -> crate::error::Result<()> {
    let address: SocketAddr = "198.51.100.7:54321".parse().unwrap();

    let mut m = StunMessage::new(
        MessageClass::SuccessResponse,
        METHOD_BINDING,
        TransactionId::new(),
    );
    m.add_xor_mapped_address(address);
    let raw = m.serialize("pwd");

    let parsed = StunMessage::parse(&raw)?;
    assert_eq!(parsed.xor_mapped_address()?, address);
    Ok(())
}

#[test]
fn test_attribute_padding() -> crate::error::Result<()> {
    let mut m = StunMessage::new(MessageClass::Request, METHOD_BINDING, TransactionId::new());
    // 5 value bytes pad to 8 on the wire.
    m.add(ATTR_USERNAME, b"ab:cd");
    let raw = m.serialize("pwd");
    let length = u16::from_be_bytes([raw[2], raw[3]]) as usize;
    assert_eq!(length % 4, 0);

    let parsed = StunMessage::parse(&raw)?;
    // The padding must not leak into the value.
    assert_eq!(parsed.get(ATTR_USERNAME).map(|a| a.value.clone()), Some(b"ab:cd".to_vec()));
    Ok(())
}
