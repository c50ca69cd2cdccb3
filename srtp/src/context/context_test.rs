use super::*;

const MASTER_KEY: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
    0x0f,
];
const MASTER_SALT: [u8; 14] = [
    0xa0, 0xa1, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xab, 0xac, 0xad,
];

fn pair() -> (Context, Context) {
    let send = Context::new(
        &MASTER_KEY,
        &MASTER_SALT,
        ProtectionProfile::Aes128CmHmacSha1_80,
        false,
    )
    .unwrap();
    let recv = Context::new(
        &MASTER_KEY,
        &MASTER_SALT,
        ProtectionProfile::Aes128CmHmacSha1_80,
        true,
    )
    .unwrap();
    (send, recv)
}

fn rtp_packet(seq: u16, ssrc: u32, payload: &[u8]) -> Vec<u8> {
    let mut p = vec![0x80, 96, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0];
    p[2..4].copy_from_slice(&seq.to_be_bytes());
    p[8..12].copy_from_slice(&ssrc.to_be_bytes());
    p.extend_from_slice(payload);
    p
}

#[test]
fn test_rtp_round_trip() {
    let (mut send, mut recv) = pair();
    let plain = rtp_packet(100, 7, b"hello srtp");
    let protected = send.encrypt_rtp(&plain).unwrap();
    let opened = recv.decrypt_rtp(&protected).unwrap();
    assert_eq!(&opened[..], &plain[..]);
}

#[test]
fn test_replay_rejected() {
    let (mut send, mut recv) = pair();
    let protected = send.encrypt_rtp(&rtp_packet(5, 7, b"x")).unwrap();
    recv.decrypt_rtp(&protected).unwrap();
    assert!(matches!(
        recv.decrypt_rtp(&protected).unwrap_err(),
        Error::Replayed { ssrc: 7, .. }
    ));
}

#[test]
fn test_forgery_does_not_advance_replay_window() {
    let (mut send, mut recv) = pair();
    let protected = send.encrypt_rtp(&rtp_packet(5, 7, b"x")).unwrap();

    let mut forged = protected.to_vec();
    let len = forged.len();
    forged[len - 1] ^= 0xff;
    assert_eq!(recv.decrypt_rtp(&forged).unwrap_err(), Error::AuthFailed);

    // The genuine packet still decrypts.
    recv.decrypt_rtp(&protected).unwrap();
}

#[test]
fn test_roc_advances_across_wrap() {
    let (mut send, mut recv) = pair();
    for seq in [65534u16, 65535, 0, 1] {
        let plain = rtp_packet(seq, 9, b"wrap");
        let protected = send.encrypt_rtp(&plain).unwrap();
        let opened = recv.decrypt_rtp(&protected).unwrap();
        assert_eq!(&opened[..], &plain[..], "seq {seq}");
    }
    assert_eq!(send.roc(9), Some(1));
    assert_eq!(recv.roc(9), Some(1));
}

#[test]
fn test_rtcp_round_trip_and_replay() {
    let (mut send, mut recv) = pair();
    let rr = vec![0x80, 201, 0x00, 0x01, 0x00, 0x00, 0x00, 0x2a];
    let protected = send.encrypt_rtcp(&rr).unwrap();
    let opened = recv.decrypt_rtcp(&protected).unwrap();
    assert_eq!(&opened[..], &rr[..]);
    assert!(matches!(
        recv.decrypt_rtcp(&protected).unwrap_err(),
        Error::Replayed { .. }
    ));
}

#[test]
fn test_distinct_ssrcs_have_distinct_streams() {
    let (mut send, mut recv) = pair();
    let a = send.encrypt_rtp(&rtp_packet(1, 100, b"a")).unwrap();
    let b = send.encrypt_rtp(&rtp_packet(1, 200, b"b")).unwrap();
    assert_eq!(&recv.decrypt_rtp(&a).unwrap()[12..], b"a".as_slice());
    assert_eq!(&recv.decrypt_rtp(&b).unwrap()[12..], b"b".as_slice());
}

#[test]
fn test_gcm_context_round_trip() {
    let key = [0x55u8; 16];
    let salt = [0x66u8; 12];
    let mut send =
        Context::new(&key, &salt, ProtectionProfile::AeadAes128Gcm, false).unwrap();
    let mut recv =
        Context::new(&key, &salt, ProtectionProfile::AeadAes128Gcm, true).unwrap();
    let plain = rtp_packet(4000, 77, b"gcm payload");
    let protected = send.encrypt_rtp(&plain).unwrap();
    let opened = recv.decrypt_rtp(&protected).unwrap();
    assert_eq!(&opened[..], &plain[..]);
}

#[test]
fn test_key_length_validation() {
    assert!(matches!(
        Context::new(
            &[0u8; 15],
            &MASTER_SALT,
            ProtectionProfile::Aes128CmHmacSha1_80,
            false
        )
        .unwrap_err(),
        Error::BadMasterKeyLength { expected: 16, .. }
    ));
}
