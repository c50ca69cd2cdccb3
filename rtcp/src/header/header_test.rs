use super::*;

#[test]
fn test_header_round_trip() {
    let h = Header {
        padding: false,
        count: 2,
        packet_type: PacketType::ReceiverReport,
        length: 13,
    };
    let raw = h.marshal().unwrap();
    assert_eq!(&raw[..], &[0x82, 201, 0, 13]);

    let mut buf = &raw[..];
    assert_eq!(Header::unmarshal(&mut buf).unwrap(), h);
}

#[test]
fn test_bad_version() {
    let raw = [0x00u8, 200, 0, 0];
    let mut buf = &raw[..];
    let err = Header::unmarshal(&mut buf).unwrap_err();
    assert_eq!(err.downcast_ref::<Error>(), Some(&Error::BadVersion));
}

#[test]
fn test_count_overflow() {
    let h = Header {
        count: 32,
        ..Default::default()
    };
    assert!(h.marshal().is_err());
}
