use super::*;

#[test]
fn test_sender_report_round_trip() {
    let sr = SenderReport {
        ssrc: 0x902f9e2e,
        ntp_time: 0xda8bd1fcdddda05a,
        rtp_time: 0xaaf4edd5,
        packet_count: 1,
        octet_count: 2,
        reports: vec![ReceptionReport {
            ssrc: 0xbc5e9a40,
            fraction_lost: 0,
            total_lost: 0,
            last_sequence_number: 0x0004_6e6f,
            jitter: 273,
            last_sender_report: 0x9f36432,
            delay: 150137,
        }],
    };
    let raw = sr.marshal().unwrap();
    assert_eq!(raw.len(), sr.marshal_size());
    assert_eq!(raw[0], 0x81);
    assert_eq!(raw[1], 200);

    let mut buf = &raw[..];
    let parsed = SenderReport::unmarshal(&mut buf).unwrap();
    assert_eq!(parsed, sr);
    assert!(parsed.destination_ssrc().contains(&0x902f9e2e));
}

#[test]
fn test_wrong_type_rejected() {
    let rr = crate::receiver_report::ReceiverReport::default();
    let raw = rr.marshal().unwrap();
    let mut buf = &raw[..];
    assert!(SenderReport::unmarshal(&mut buf).is_err());
}
