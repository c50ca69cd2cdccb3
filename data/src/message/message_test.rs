use super::*;

#[test]
fn test_open_round_trip() {
    let open = Message::Open(DataChannelOpen {
        channel_type: ChannelType::PartialReliableRexmitUnordered,
        priority: 256,
        reliability_parameter: 3,
        label: "echo".to_owned(),
        protocol: "".to_owned(),
    });
    let raw = open.marshal().unwrap();
    assert_eq!(raw[0], 0x03);
    assert_eq!(raw[1], 0x81);

    let mut buf = &raw[..];
    assert_eq!(Message::unmarshal(&mut buf).unwrap(), open);
}

#[test]
fn test_ack_round_trip() {
    let raw = Message::Ack.marshal().unwrap();
    assert_eq!(&raw[..], &[0x02]);
    let mut buf = &raw[..];
    assert_eq!(Message::unmarshal(&mut buf).unwrap(), Message::Ack);
}

#[test]
fn test_open_wire_layout() {
    let open = Message::Open(DataChannelOpen {
        channel_type: ChannelType::Reliable,
        priority: 0,
        reliability_parameter: 0,
        label: "ab".to_owned(),
        protocol: "c".to_owned(),
    });
    let raw = open.marshal().unwrap();
    // type, channel type, priority(2), reliability(4), label len(2),
    // protocol len(2), then the strings.
    assert_eq!(raw.len(), 12 + 2 + 1);
    assert_eq!(&raw[8..10], &[0, 2]);
    assert_eq!(&raw[10..12], &[0, 1]);
    assert_eq!(&raw[12..14], b"ab");
    assert_eq!(&raw[14..], b"c");
}

#[test]
fn test_unknown_message_type_rejected() {
    let mut buf = &[0x07u8][..];
    let err = Message::unmarshal(&mut buf).unwrap_err();
    assert_eq!(
        err.downcast_ref::<Error>(),
        Some(&Error::InvalidMessageType(0x07))
    );
}

#[test]
fn test_unknown_channel_type_rejected() {
    let raw = [0x03u8, 0x11, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    let mut buf = &raw[..];
    let err = Message::unmarshal(&mut buf).unwrap_err();
    assert_eq!(
        err.downcast_ref::<Error>(),
        Some(&Error::InvalidChannelType(0x11))
    );
}

#[test]
fn test_channel_type_mapping() {
    assert_eq!(
        ChannelType::from_config(true, None, None),
        ChannelType::Reliable
    );
    assert_eq!(
        ChannelType::from_config(false, Some(5), None),
        ChannelType::PartialReliableRexmitUnordered
    );
    assert_eq!(
        ChannelType::from_config(true, None, Some(1000)),
        ChannelType::PartialReliableTimed
    );
    assert!(!ChannelType::ReliableUnordered.ordered());
    assert!(ChannelType::PartialReliableTimed.ordered());
}
