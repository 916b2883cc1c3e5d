#[cfg(test)]
mod message_test;

use std::fmt;
use std::net::SocketAddr;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use rand::Rng;

use super::attributes::*;
use super::fingerprint::add_fingerprint;
use super::integrity::{add_message_integrity, verify_message_integrity};
use super::xoraddr::XorMappedAddress;
use crate::error::{Error, Result};

/// MAGIC_COOKIE is the fixed value that aids in distinguishing STUN packets
/// from packets of other protocols when STUN is multiplexed with those
/// other protocols on the same port.
///
/// Defined in "STUN Message Structure", section 6.
pub const MAGIC_COOKIE: u32 = 0x2112A442;
pub const MESSAGE_HEADER_SIZE: usize = 20;

/// TRANSACTION_ID_SIZE is length of transaction id array (in bytes).
pub const TRANSACTION_ID_SIZE: usize = 12; // 96 bit

/// TransactionId correlates a STUN request with its response.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(pub [u8; TRANSACTION_ID_SIZE]);

impl TransactionId {
    /// Fresh id from the thread CSPRNG.
    pub fn new() -> Self {
        let mut id = [0u8; TRANSACTION_ID_SIZE];
        rand::thread_rng().fill(&mut id);
        TransactionId(id)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", BASE64_STANDARD.encode(self.0))
    }
}

/// MessageClass is the 2-bit class of a STUN message type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageClass {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

impl MessageClass {
    fn bits(self) -> u16 {
        match self {
            Self::Request => 0b00,
            Self::Indication => 0b01,
            Self::SuccessResponse => 0b10,
            Self::ErrorResponse => 0b11,
        }
    }

    fn from_bits(value: u16) -> Self {
        match value & 0b11 {
            0b00 => Self::Request,
            0b01 => Self::Indication,
            0b10 => Self::SuccessResponse,
            _ => Self::ErrorResponse,
        }
    }
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Request => "request",
            Self::Indication => "indication",
            Self::SuccessResponse => "success response",
            Self::ErrorResponse => "error response",
        };
        write!(f, "{s}")
    }
}

/// Method is uint16 representation of 12-bit STUN method.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Method(pub u16);

pub const METHOD_BINDING: Method = Method(0x001);

// TURN control methods, RFC 5766.
pub const METHOD_ALLOCATE: Method = Method(0x003);
pub const METHOD_REFRESH: Method = Method(0x004);
pub const METHOD_SEND: Method = Method(0x006);
pub const METHOD_DATA: Method = Method(0x007);
pub const METHOD_CREATE_PERMISSION: Method = Method(0x008);
pub const METHOD_CHANNEL_BIND: Method = Method(0x009);

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unknown = format!("0x{:x}", self.0);

        let s = match *self {
            METHOD_BINDING => "Binding",
            METHOD_ALLOCATE => "Allocate",
            METHOD_REFRESH => "Refresh",
            METHOD_SEND => "Send",
            METHOD_DATA => "Data",
            METHOD_CREATE_PERMISSION => "CreatePermission",
            METHOD_CHANNEL_BIND => "ChannelBind",
            _ => unknown.as_str(),
        };

        write!(f, "{s}")
    }
}

//	 0                 1
//	 2  3  4 5 6 7 8 9 0 1 2 3 4 5
//	+--+--+-+-+-+-+-+-+-+-+-+-+-+-+
//	|M |M |M|M|M|C|M|M|M|C|M|M|M|M|
//	|11|10|9|8|7|1|6|5|4|0|3|2|1|0|
//	+--+--+-+-+-+-+-+-+-+-+-+-+-+-+
// Figure 3: Format of STUN Message Type Field
const METHOD_ABITS: u16 = 0x000f; // M0-M3
const METHOD_BBITS: u16 = 0x0070; // M4-M6
const METHOD_DBITS: u16 = 0x0f80; // M7-M11

const CLASS_C0SHIFT: u16 = 4;
const CLASS_C1SHIFT: u16 = 7;

fn message_type_value(method: Method, class: MessageClass) -> u16 {
    // The method bits are interleaved with the two class bits C0 (bit 4)
    // and C1 (bit 8).
    let m = method.0;
    let typ = (m & METHOD_ABITS) | ((m & METHOD_BBITS) << 1) | ((m & METHOD_DBITS) << 2);

    let c = class.bits();
    typ | ((c & 0b01) << CLASS_C0SHIFT) | ((c & 0b10) << CLASS_C1SHIFT)
}

fn split_message_type(value: u16) -> (Method, MessageClass) {
    let c0 = (value >> CLASS_C0SHIFT) & 0b01;
    let c1 = (value >> CLASS_C1SHIFT) & 0b10;
    let class = MessageClass::from_bits(c0 | c1);

    let a = value & METHOD_ABITS;
    let b = (value >> 1) & METHOD_BBITS;
    let d = (value >> 2) & METHOD_DBITS;
    (Method(a | b | d), class)
}

/// A single STUN packet: class, method, transaction id and attributes.
///
/// Messages built locally are turned into wire bytes with [`serialize`],
/// which always authenticates them; messages read off the wire keep their
/// raw bytes so that [`check_integrity`] can recompute the HMAC over the
/// exact octets the peer signed.
///
/// [`serialize`]: StunMessage::serialize
/// [`check_integrity`]: StunMessage::check_integrity
#[derive(Debug, Clone)]
pub struct StunMessage {
    pub class: MessageClass,
    pub method: Method,
    pub transaction_id: TransactionId,
    pub attributes: Vec<RawAttribute>,
    pub(crate) raw: Vec<u8>,
}

// Ignores raw.
impl PartialEq for StunMessage {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class
            && self.method == other.method
            && self.transaction_id == other.transaction_id
            && self.attributes == other.attributes
    }
}

impl fmt::Display for StunMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} attrs={} id={}",
            self.method,
            self.class,
            self.attributes.len(),
            self.transaction_id
        )
    }
}

impl StunMessage {
    pub fn new(class: MessageClass, method: Method, transaction_id: TransactionId) -> Self {
        StunMessage {
            class,
            method,
            transaction_id,
            attributes: vec![],
            raw: vec![],
        }
    }

    /// Decodes a datagram into a message, retaining the wire bytes for
    /// later integrity verification. Trailing bytes beyond the encoded
    /// message length are ignored.
    pub fn parse(buf: &[u8]) -> Result<StunMessage> {
        if buf.len() < MESSAGE_HEADER_SIZE {
            return Err(Error::ErrUnexpectedHeaderEof);
        }

        let typ = u16::from_be_bytes([buf[0], buf[1]]);
        let size = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        let cookie = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);

        if cookie != MAGIC_COOKIE {
            return Err(Error::ErrInvalidMagicCookie);
        }

        let full_size = MESSAGE_HEADER_SIZE + size;
        if buf.len() < full_size {
            return Err(Error::ErrUnexpectedEof);
        }

        let (method, class) = split_message_type(typ);
        let mut transaction_id = [0u8; TRANSACTION_ID_SIZE];
        transaction_id.copy_from_slice(&buf[8..MESSAGE_HEADER_SIZE]);

        let mut attributes = vec![];
        let mut b = &buf[MESSAGE_HEADER_SIZE..full_size];
        while !b.is_empty() {
            if b.len() < ATTRIBUTE_HEADER_SIZE {
                return Err(Error::ErrUnexpectedEof);
            }

            let typ = AttrType(u16::from_be_bytes([b[0], b[1]]));
            let length = u16::from_be_bytes([b[2], b[3]]) as usize;
            let padded = nearest_padded_value_length(length);

            b = &b[ATTRIBUTE_HEADER_SIZE..];
            if b.len() < padded {
                return Err(Error::ErrUnexpectedEof);
            }

            attributes.push(RawAttribute {
                typ,
                value: b[..length].to_vec(),
            });
            b = &b[padded..];
        }

        Ok(StunMessage {
            class,
            method,
            transaction_id: TransactionId(transaction_id),
            attributes,
            raw: buf[..full_size].to_vec(),
        })
    }

    /// Appends an attribute. The value is padded to a 32-bit boundary when
    /// the message is encoded.
    pub fn add(&mut self, typ: AttrType, value: &[u8]) {
        self.attributes.push(RawAttribute {
            typ,
            value: value.to_vec(),
        });
    }

    /// First attribute of the given type, if present.
    pub fn get(&self, typ: AttrType) -> Option<&RawAttribute> {
        self.attributes.iter().find(|a| a.typ == typ)
    }

    /// Encodes the message and authenticates it with the short-term
    /// credential `key`: MESSAGE-INTEGRITY is computed over the message
    /// with its length field covering the integrity attribute, then
    /// FINGERPRINT is appended as the final attribute.
    pub fn serialize(&self, key: &str) -> Vec<u8> {
        let mut raw = self.encode();
        add_message_integrity(&mut raw, key.as_bytes());
        add_fingerprint(&mut raw);
        raw
    }

    fn encode(&self) -> Vec<u8> {
        let mut raw = vec![0u8; MESSAGE_HEADER_SIZE];
        raw[0..2].copy_from_slice(&message_type_value(self.method, self.class).to_be_bytes());
        raw[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        raw[8..MESSAGE_HEADER_SIZE].copy_from_slice(&self.transaction_id.0);

        for a in &self.attributes {
            append_attribute(&mut raw, a.typ, &a.value);
        }
        raw
    }

    /// Recomputes MESSAGE-INTEGRITY with `password` over the received
    /// octets preceding the attribute (length field adjusted to end at the
    /// integrity TLV, which excludes FINGERPRINT) and compares it against
    /// the carried value in constant time. Fails if the attribute is
    /// absent.
    pub fn check_integrity(&self, password: &str) -> Result<()> {
        verify_message_integrity(self, password.as_bytes())
    }

    /// USERNAME, `local-ufrag:remote-ufrag` as sent by an ICE peer.
    pub fn add_username(&mut self, username: &str) {
        self.add(ATTR_USERNAME, username.as_bytes());
    }

    /// Splits USERNAME into the (local, remote) ufrag halves.
    pub fn ufrags(&self) -> Result<(String, String)> {
        let attr = self
            .get(ATTR_USERNAME)
            .ok_or(Error::ErrAttributeNotFound)?;
        let username = String::from_utf8(attr.value.clone())?;

        let (local, remote) = username
            .split_once(':')
            .ok_or(Error::ErrInvalidUsername)?;
        if local.is_empty() || remote.is_empty() {
            return Err(Error::ErrInvalidUsername);
        }

        Ok((local.to_owned(), remote.to_owned()))
    }

    /// XOR-MAPPED-ADDRESS carrying the peer's reflexive transport address.
    pub fn add_xor_mapped_address(&mut self, address: SocketAddr) {
        let value = XorMappedAddress {
            ip: address.ip(),
            port: address.port(),
        }
        .encode(&self.transaction_id);
        self.add(ATTR_XORMAPPED_ADDRESS, &value);
    }

    pub fn xor_mapped_address(&self) -> Result<SocketAddr> {
        let attr = self
            .get(ATTR_XORMAPPED_ADDRESS)
            .ok_or(Error::ErrAttributeNotFound)?;
        let xor = XorMappedAddress::decode(&attr.value, &self.transaction_id)?;
        Ok(SocketAddr::new(xor.ip, xor.port))
    }
}

/// Appends a TLV (with padding) and keeps the header length field in sync.
pub(crate) fn append_attribute(raw: &mut Vec<u8>, typ: AttrType, value: &[u8]) {
    raw.extend_from_slice(&typ.value().to_be_bytes());
    raw.extend_from_slice(&(value.len() as u16).to_be_bytes());
    raw.extend_from_slice(value);

    let padded = nearest_padded_value_length(value.len());
    raw.resize(raw.len() + padded - value.len(), 0);

    let length = raw.len() - MESSAGE_HEADER_SIZE;
    set_message_length(raw, length);
}

/// Writes the header length field. The integrity and fingerprint
/// computations pre-adjust it to cover the attribute about to be added.
pub(crate) fn set_message_length(raw: &mut [u8], length: usize) {
    raw[2..4].copy_from_slice(&(length as u16).to_be_bytes());
}
