use super::*;

#[test]
fn test_classify_stun() {
    // Binding request type starts with 0x00.
    assert_eq!(classify(&[0x00, 0x01, 0, 0]), PacketKind::Stun);
    assert_eq!(classify(&[0x01, 0x01, 0, 0]), PacketKind::Stun);
}

#[test]
fn test_classify_dtls() {
    // Handshake record.
    assert_eq!(classify(&[22, 254, 253]), PacketKind::Dtls);
    assert_eq!(classify(&[23, 254, 253]), PacketKind::Dtls);
}

#[test]
fn test_classify_rtp_vs_rtcp() {
    // RTP with payload type 96.
    assert_eq!(classify(&[0x80, 96, 0, 0]), PacketKind::Rtp);
    // RTCP sender report (PT 200).
    assert_eq!(classify(&[0x80, 200, 0, 6]), PacketKind::Rtcp);
    // RTCP BYE (PT 203).
    assert_eq!(classify(&[0x81, 203, 0, 1]), PacketKind::Rtcp);
    // Marker bit set on a dynamic payload type is still RTP.
    assert_eq!(classify(&[0x80, 0xe0, 0, 0]), PacketKind::Rtp);
}

#[test]
fn test_classify_unknown() {
    assert_eq!(classify(&[70, 0, 0]), PacketKind::Unknown);
    assert_eq!(classify(&[255]), PacketKind::Unknown);
    assert_eq!(classify(&[]), PacketKind::Unknown);
}

#[test]
fn test_stats_counting() {
    let mut stats = DemuxStats::default();
    stats.record(classify(&[0x00, 1]));
    stats.record(classify(&[22]));
    stats.record(classify(&[0x80, 96]));
    stats.record(classify(&[99]));
    assert_eq!(stats.stun, 1);
    assert_eq!(stats.dtls, 1);
    assert_eq!(stats.rtp, 1);
    assert_eq!(stats.dropped, 1);
}
