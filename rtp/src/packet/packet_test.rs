use super::*;

#[test]
fn test_packet_round_trip() {
    let p = Packet {
        header: Header {
            version: 2,
            payload_type: 111,
            sequence_number: 1234,
            timestamp: 160,
            ssrc: 0xdecafbad,
            marker: true,
            ..Default::default()
        },
        payload: Bytes::from_static(b"opus-frame"),
    };
    let raw = p.marshal().unwrap();

    let mut buf = &raw[..];
    let parsed = Packet::unmarshal(&mut buf).unwrap();
    assert_eq!(parsed, p);
}

#[test]
fn test_padding_stripped() {
    let mut p = Packet {
        header: Header {
            version: 2,
            payload_type: 96,
            ..Default::default()
        },
        payload: Bytes::from_static(&[1, 2, 3, 0, 0, 0, 0, 4]),
    };
    p.header.padding = true;
    // Payload already carries its padding: last byte is the pad count.
    let raw = p.marshal().unwrap();

    let mut buf = &raw[..];
    let parsed = Packet::unmarshal(&mut buf).unwrap();
    assert_eq!(&parsed.payload[..], &[1, 2, 3, 0]);
}

#[test]
fn test_zero_pad_count_rejected() {
    let mut p = Packet {
        header: Header {
            version: 2,
            ..Default::default()
        },
        payload: Bytes::from_static(&[1, 2, 3, 0]),
    };
    p.header.padding = true;
    let raw = {
        let mut raw = p.marshal().unwrap().to_vec();
        let len = raw.len();
        raw[len - 1] = 0;
        raw
    };
    let mut buf = &raw[..];
    assert!(Packet::unmarshal(&mut buf).is_err());
}
