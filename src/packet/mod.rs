#[cfg(test)]
mod packet_test;

use std::fmt;

/// Protocol family of a datagram arriving on an ICE endpoint.
///
/// STUN, DTLS and RTP share the same ports, so the first byte decides
/// where a packet goes (the RFC 7983 demultiplexing scheme):
///
/// ```text
///              +----------------+
///              |    [0x00..0x03]-+--> STUN
///              |    [0x10..0x13]-+--> ZRTP
///  packet -->  |    [0x14..0x17]-+--> DTLS
///              |    [0x40..0x7f]-+--> TURN channel data
///              |    [0x80..0xbf]-+--> RTP/RTCP
///              +----------------+
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PacketKind {
    Stun,
    TurnChannelData,
    Dtls,
    RtpRtcp,
    Zrtp,
    Unknown,
}

impl PacketKind {
    /// Classifies a datagram by its first byte. Empty input is `Unknown`.
    pub fn of(buf: &[u8]) -> Self {
        let Some(&first) = buf.first() else {
            return Self::Unknown;
        };

        match first {
            0x00..=0x03 => Self::Stun,
            0x10..=0x13 => Self::Zrtp,
            0x14..=0x17 => Self::Dtls,
            0x40..=0x7f => Self::TurnChannelData,
            0x80..=0xbf => Self::RtpRtcp,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Stun => "STUN",
            Self::TurnChannelData => "TURN channel data",
            Self::Dtls => "DTLS",
            Self::RtpRtcp => "RTP/RTCP",
            Self::Zrtp => "ZRTP",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Metadata gathered for a datagram while demultiplexing.
#[derive(Debug, Copy, Clone)]
pub struct PacketInfo {
    pub kind: PacketKind,
    /// Set when the payload was carried inside TURN channel data.
    pub channel_number: Option<u16>,
}

impl PacketInfo {
    pub fn new(kind: PacketKind) -> Self {
        PacketInfo {
            kind,
            channel_number: None,
        }
    }
}
