use super::*;

#[test]
fn test_transport_cc_round_trip() {
    let e = TransportCcExtension {
        transport_sequence: 0xbeef,
    };
    let raw = e.marshal().unwrap();
    assert_eq!(&raw[..], &[0xbe, 0xef]);

    let mut buf = &raw[..];
    assert_eq!(TransportCcExtension::unmarshal(&mut buf).unwrap(), e);
}

#[test]
fn test_abs_send_time_round_trip() {
    let e = AbsSendTimeExtension {
        timestamp: 0x00aabbcc,
    };
    let raw = e.marshal().unwrap();
    assert_eq!(&raw[..], &[0xaa, 0xbb, 0xcc]);

    let mut buf = &raw[..];
    assert_eq!(AbsSendTimeExtension::unmarshal(&mut buf).unwrap(), e);
}

#[test]
fn test_abs_send_time_encoding() {
    // 1.5 s -> 1.5 * 2^18 = 0x060000.
    let e = AbsSendTimeExtension::new(Duration::from_millis(1500));
    assert_eq!(e.timestamp, 0x06_0000);
    // 64 s wraps to zero in 24 bits.
    let e = AbsSendTimeExtension::new(Duration::from_secs(64));
    assert_eq!(e.timestamp, 0);
}
