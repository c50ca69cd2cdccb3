use super::*;

fn primary(seq: u16, payload: &'static [u8]) -> Packet {
    Packet {
        header: rtp::header::Header {
            version: 2,
            payload_type: 96,
            sequence_number: seq,
            timestamp: 1000,
            ssrc: 0x1111,
            ..Default::default()
        },
        payload: Bytes::from_static(payload),
    }
}

#[test]
fn test_rtx_round_trip() {
    let mut sender = RtxSender::new(0x2222, 97);
    let original = primary(500, b"frame-part");
    sender.record(&original);

    let rtx = sender.resend(&[500]);
    assert_eq!(rtx.len(), 1);
    assert_eq!(rtx[0].header.ssrc, 0x2222);
    assert_eq!(rtx[0].header.payload_type, 97);
    assert_eq!(rtx[0].header.timestamp, 1000);
    // OSN prefix.
    assert_eq!(&rtx[0].payload[..2], &500u16.to_be_bytes());

    let restored = unwrap_rtx(&rtx[0], 0x1111, 96).unwrap();
    assert_eq!(restored.header.ssrc, 0x1111);
    assert_eq!(restored.header.payload_type, 96);
    assert_eq!(restored.header.sequence_number, 500);
    assert_eq!(&restored.payload[..], b"frame-part");
}

#[test]
fn test_unknown_sequence_ignored() {
    let mut sender = RtxSender::new(0x2222, 97);
    sender.record(&primary(1, b"x"));
    assert!(sender.resend(&[999]).is_empty());
}

#[test]
fn test_history_bounded() {
    let mut sender = RtxSender::new(0x2222, 97);
    for seq in 0..600u16 {
        sender.record(&primary(seq, b"p"));
    }
    // The oldest entries have been evicted.
    assert!(sender.resend(&[0]).is_empty());
    assert_eq!(sender.resend(&[599]).len(), 1);
}

#[test]
fn test_rtx_sequences_are_continuous() {
    let mut sender = RtxSender::new(0x2222, 97);
    sender.record(&primary(1, b"a"));
    sender.record(&primary(2, b"b"));
    let first = sender.resend(&[1])[0].header.sequence_number;
    let second = sender.resend(&[2])[0].header.sequence_number;
    assert_eq!(second, first.wrapping_add(1));
}

#[test]
fn test_short_rtx_payload_rejected() {
    let mut bad = primary(7, b"");
    bad.payload = Bytes::from_static(&[0x01]);
    assert!(unwrap_rtx(&bad, 1, 96).is_none());
}
