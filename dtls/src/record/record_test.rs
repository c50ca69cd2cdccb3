use super::*;

#[test]
fn test_record_header_round_trip() {
    let h = RecordHeader {
        content_type: ContentType::Handshake,
        epoch: 1,
        sequence: 0x0000_1234_5678,
        length: 42,
    };
    let raw = h.marshal();
    assert_eq!(raw[0], 22);
    assert_eq!(RecordHeader::unmarshal(&raw).unwrap(), h);
}

#[test]
fn test_split_datagram() {
    let a = RecordHeader {
        content_type: ContentType::Handshake,
        epoch: 0,
        sequence: 0,
        length: 3,
    };
    let b = RecordHeader {
        content_type: ContentType::ChangeCipherSpec,
        epoch: 0,
        sequence: 1,
        length: 1,
    };
    let mut datagram = a.marshal().to_vec();
    datagram.extend_from_slice(&[1, 2, 3]);
    datagram.extend_from_slice(&b.marshal());
    datagram.push(1);

    let records = split_datagram(&datagram).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].payload, vec![1, 2, 3]);
    assert_eq!(records[1].header.content_type, ContentType::ChangeCipherSpec);
}

#[test]
fn test_truncated_record_rejected() {
    let h = RecordHeader {
        content_type: ContentType::Alert,
        epoch: 0,
        sequence: 0,
        length: 10,
    };
    let datagram = h.marshal().to_vec();
    assert!(split_datagram(&datagram).is_err());
}
