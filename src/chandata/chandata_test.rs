use super::*;

#[test]
fn test_channel_data_encode_decode() -> crate::error::Result<()> {
    let message = ChannelData {
        number: 0x4001,
        data: vec![1, 2, 3, 4],
    };
    let raw = message.encode();
    assert_eq!(raw.len(), 8);
    assert_eq!(&raw[..4], &[0x40, 0x01, 0x00, 0x04]);

    let decoded = ChannelData::decode(&raw)?;
    assert_eq!(decoded, message);
    Ok(())
}

#[test]
fn test_channel_data_padding() -> crate::error::Result<()> {
    let message = ChannelData {
        number: MIN_CHANNEL_NUMBER,
        data: vec![0xaa, 0xbb, 0xcc],
    };
    let raw = message.encode();
    // 4-byte header + 3 data bytes padded to the 32-bit boundary.
    assert_eq!(raw.len(), 8);
    assert_eq!(raw[7], 0x00);

    // The length field keeps the unpadded size.
    let decoded = ChannelData::decode(&raw)?;
    assert_eq!(decoded.data, vec![0xaa, 0xbb, 0xcc]);
    Ok(())
}

#[test]
fn test_channel_data_decode_errors() {
    let result = ChannelData::decode(&[0x40, 0x00, 0x00]);
    assert_eq!(result.unwrap_err(), Error::ErrUnexpectedEof);

    // 0x1234 is outside the RFC 5766 channel range.
    let result = ChannelData::decode(&[0x12, 0x34, 0x00, 0x00]);
    assert_eq!(result.unwrap_err(), Error::ErrInvalidChannelNumber);

    // Length field says 8, only 4 payload bytes follow.
    let result = ChannelData::decode(&[0x40, 0x00, 0x00, 0x08, 1, 2, 3, 4]);
    assert_eq!(result.unwrap_err(), Error::ErrBadChannelDataLength);
}

#[test]
fn test_is_channel_data() {
    assert!(ChannelData::is_channel_data(&[0x40, 0x00, 0x00, 0x00]));
    assert!(ChannelData::is_channel_data(&[
        0x7f, 0xff, 0x00, 0x02, 0xaa, 0xbb
    ]));

    assert!(!ChannelData::is_channel_data(&[0x40, 0x00]));
    assert!(!ChannelData::is_channel_data(&[0x3f, 0xff, 0x00, 0x00]));
    assert!(!ChannelData::is_channel_data(&[0x40, 0x00, 0x00, 0x04]));
}

#[test]
fn test_channel_number_valid() {
    assert!(channel_number_valid(MIN_CHANNEL_NUMBER));
    assert!(channel_number_valid(0x5000));
    assert!(channel_number_valid(MAX_CHANNEL_NUMBER));
    assert!(!channel_number_valid(MIN_CHANNEL_NUMBER - 1));
    assert!(!channel_number_valid(MAX_CHANNEL_NUMBER + 1));
}
