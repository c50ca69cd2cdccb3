use super::*;

#[test]
fn test_remb_round_trip() {
    let remb = ReceiverEstimatedMaximumBitrate {
        sender_ssrc: 1,
        bitrate: 8_927_168,
        ssrcs: vec![0x215f2ea2],
    };
    let raw = remb.marshal().unwrap();
    let mut buf = &raw[..];
    let parsed = ReceiverEstimatedMaximumBitrate::unmarshal(&mut buf).unwrap();
    assert_eq!(parsed.sender_ssrc, 1);
    assert_eq!(parsed.ssrcs, vec![0x215f2ea2]);
    // Mantissa rounding keeps the value within one part in 2^17.
    let err = (parsed.bitrate as i64 - 8_927_168i64).abs();
    assert!(err <= 8_927_168 >> 17, "bitrate error too large: {err}");
}

#[test]
fn test_small_bitrate_exact() {
    let remb = ReceiverEstimatedMaximumBitrate {
        sender_ssrc: 5,
        bitrate: 1000,
        ssrcs: vec![7, 8],
    };
    let raw = remb.marshal().unwrap();
    let mut buf = &raw[..];
    let parsed = ReceiverEstimatedMaximumBitrate::unmarshal(&mut buf).unwrap();
    assert_eq!(parsed.bitrate, 1000);
    assert_eq!(parsed.ssrcs, vec![7, 8]);
}

#[test]
fn test_bad_identifier_rejected() {
    let remb = ReceiverEstimatedMaximumBitrate {
        sender_ssrc: 5,
        bitrate: 1000,
        ssrcs: vec![],
    };
    let mut raw = remb.marshal().unwrap().to_vec();
    raw[12] = b'X';
    let mut buf = &raw[..];
    let err = ReceiverEstimatedMaximumBitrate::unmarshal(&mut buf).unwrap_err();
    assert_eq!(
        err.downcast_ref::<Error>(),
        Some(&Error::BadRembIdentifier)
    );
}
