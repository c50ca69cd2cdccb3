use super::*;

#[test]
fn test_receiver_report_round_trip() {
    let rr = ReceiverReport {
        ssrc: 0x902f9e2e,
        reports: vec![
            ReceptionReport {
                ssrc: 0x12345678,
                fraction_lost: 51,
                total_lost: 15,
                last_sequence_number: 0x00011111,
                jitter: 42,
                last_sender_report: 0,
                delay: 0,
            },
            ReceptionReport::default(),
        ],
    };
    let raw = rr.marshal().unwrap();
    assert_eq!(raw[0] & 0x1f, 2);

    let mut buf = &raw[..];
    assert_eq!(ReceiverReport::unmarshal(&mut buf).unwrap(), rr);
}

#[test]
fn test_total_lost_24_bits() {
    let report = ReceptionReport {
        total_lost: 0x00aabbcc,
        ..Default::default()
    };
    let raw = report.marshal().unwrap();
    assert_eq!(&raw[5..8], &[0xaa, 0xbb, 0xcc]);
}
