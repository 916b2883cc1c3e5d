use super::*;

#[test]
fn test_packet_kind_of_first_byte() {
    let tests = vec![
        (0x00u8, PacketKind::Stun),
        (0x01, PacketKind::Stun),
        (0x03, PacketKind::Stun),
        (0x10, PacketKind::Zrtp),
        (0x13, PacketKind::Zrtp),
        (0x14, PacketKind::Dtls),
        (0x16, PacketKind::Dtls),
        (0x17, PacketKind::Dtls),
        (0x40, PacketKind::TurnChannelData),
        (0x7f, PacketKind::TurnChannelData),
        (0x80, PacketKind::RtpRtcp),
        (0xbf, PacketKind::RtpRtcp),
        (0x04, PacketKind::Unknown),
        (0x18, PacketKind::Unknown),
        (0xc0, PacketKind::Unknown),
        (0xff, PacketKind::Unknown),
    ];

    for (first, expected) in tests {
        let buf = [first, 0x00, 0x00, 0x00];
        assert_eq!(
            PacketKind::of(&buf),
            expected,
            "first byte 0x{first:02x} misclassified"
        );
    }
}

#[test]
fn test_packet_kind_of_empty() {
    assert_eq!(PacketKind::of(&[]), PacketKind::Unknown);
}

#[test]
fn test_packet_info_channel_number_default() {
    let info = PacketInfo::new(PacketKind::RtpRtcp);
    assert_eq!(info.kind, PacketKind::RtpRtcp);
    assert!(info.channel_number.is_none());
}
