use bytes::Bytes;

use super::*;

fn base_header() -> Header {
    Header {
        version: 2,
        payload_type: 96,
        sequence_number: 27023,
        timestamp: 3653407706,
        ssrc: 476325762,
        ..Default::default()
    }
}

#[test]
fn test_fixed_header_round_trip() {
    let h = base_header();
    let raw = h.marshal().unwrap();
    assert_eq!(raw.len(), FIXED_HEADER_SIZE);

    let mut buf = &raw[..];
    let parsed = Header::unmarshal(&mut buf).unwrap();
    assert_eq!(parsed, h);
}

#[test]
fn test_csrc_round_trip() {
    let mut h = base_header();
    h.csrc = vec![0x11223344, 0x55667788];
    let raw = h.marshal().unwrap();
    assert_eq!(raw.len(), FIXED_HEADER_SIZE + 8);
    assert_eq!(raw[0] & 0x0f, 2);

    let mut buf = &raw[..];
    assert_eq!(Header::unmarshal(&mut buf).unwrap(), h);
}

#[test]
fn test_one_byte_extension_round_trip() {
    let mut h = base_header();
    h.set_extension(5, Bytes::from_static(&[0xaa, 0xbb])).unwrap();
    h.set_extension(3, Bytes::from_static(&[0x01])).unwrap();
    let raw = h.marshal().unwrap();
    // Extension bit set, profile 0xBEDE.
    assert_eq!(raw[0] & 0x10, 0x10);
    assert_eq!(&raw[12..14], &[0xbe, 0xde]);

    let mut buf = &raw[..];
    let parsed = Header::unmarshal(&mut buf).unwrap();
    assert_eq!(parsed.get_extension(5), Some(Bytes::from_static(&[0xaa, 0xbb])));
    assert_eq!(parsed.get_extension(3), Some(Bytes::from_static(&[0x01])));
    assert_eq!(parsed.get_extension(7), None);
}

#[test]
fn test_two_byte_extension_round_trip() {
    let mut h = base_header();
    h.extension_profile = EXTENSION_PROFILE_TWO_BYTE;
    let long_payload = Bytes::from(vec![0x42; 17]);
    h.set_extension(17, long_payload.clone()).unwrap();
    let raw = h.marshal().unwrap();

    let mut buf = &raw[..];
    let parsed = Header::unmarshal(&mut buf).unwrap();
    assert_eq!(parsed.get_extension(17), Some(long_payload));
}

#[test]
fn test_one_byte_extension_id_bounds() {
    let mut h = base_header();
    assert_eq!(
        h.set_extension(15, Bytes::from_static(&[0x00])).unwrap_err(),
        Error::ExtensionIdInvalid(15, EXTENSION_PROFILE_ONE_BYTE)
    );
    assert!(matches!(
        h.set_extension(5, Bytes::from(vec![0u8; 17])).unwrap_err(),
        Error::ExtensionPayloadTooLarge(17, _)
    ));
}

#[test]
fn test_extension_padding_skipped() {
    // One extension of 2 bytes: 3 bytes of data, one padding byte.
    let mut h = base_header();
    h.set_extension(1, Bytes::from_static(&[0x10, 0x20])).unwrap();
    let raw = h.marshal().unwrap();
    assert_eq!(raw.len(), FIXED_HEADER_SIZE + 4 + 4);
    assert_eq!(raw[raw.len() - 1], 0x00);

    let mut buf = &raw[..];
    let parsed = Header::unmarshal(&mut buf).unwrap();
    assert_eq!(parsed.extensions.len(), 1);
}

#[test]
fn test_truncated_header_rejected() {
    let raw = [0x80u8, 96, 0, 1, 0, 0];
    let mut buf = &raw[..];
    assert!(Header::unmarshal(&mut buf).is_err());
}

#[test]
fn test_wrong_version_rejected() {
    let mut raw = base_header().marshal().unwrap().to_vec();
    raw[0] = (raw[0] & 0x3f) | (1 << 6);
    let mut buf = &raw[..];
    let err = Header::unmarshal(&mut buf).unwrap_err();
    assert_eq!(err.downcast_ref::<Error>(), Some(&Error::BadVersion(1)));
}
