use super::*;

// Public P_SHA256 test vector (secret/seed/label triple widely used for
// TLS 1.2 PRF interop testing).
#[test]
fn test_p_sha256_vector() {
    let secret = [
        0x9b, 0xbe, 0x43, 0x6b, 0xa9, 0x40, 0xf0, 0x17, 0xb1, 0x76, 0x52, 0x84, 0x9a, 0x71,
        0xdb, 0x35,
    ];
    let seed = [
        0xa0, 0xba, 0x9f, 0x93, 0x6c, 0xda, 0x31, 0x18, 0x27, 0xa6, 0xf7, 0x96, 0xff, 0xd5,
        0x19, 0x8c,
    ];
    let out = prf(&secret, b"test label", &seed, 100);
    let expected: [u8; 100] = [
        0xe3, 0xf2, 0x29, 0xba, 0x72, 0x7b, 0xe1, 0x7b, 0x8d, 0x12, 0x26, 0x20, 0x55, 0x7c,
        0xd4, 0x53, 0xc2, 0xaa, 0xb2, 0x1d, 0x07, 0xc3, 0xd4, 0x95, 0x32, 0x9b, 0x52, 0xd4,
        0xe6, 0x1e, 0xdb, 0x5a, 0x6b, 0x30, 0x17, 0x91, 0xe9, 0x0d, 0x35, 0xc9, 0xc9, 0xa4,
        0x6b, 0x4e, 0x14, 0xba, 0xf9, 0xaf, 0x0f, 0xa0, 0x22, 0xf7, 0x07, 0x7d, 0xef, 0x17,
        0xab, 0xfd, 0x37, 0x97, 0xc0, 0x56, 0x4b, 0xab, 0x4f, 0xbc, 0x91, 0x66, 0x6e, 0x9d,
        0xef, 0x9b, 0x97, 0xfc, 0xe3, 0x4f, 0x79, 0x67, 0x89, 0xba, 0xa4, 0x80, 0x82, 0xd1,
        0x22, 0xee, 0x42, 0xc5, 0xa7, 0x2e, 0x5a, 0x51, 0x10, 0xff, 0xf7, 0x01, 0x87, 0x34,
        0x7b, 0x66,
    ];
    assert_eq!(&out[..], &expected[..]);
}

#[test]
fn test_master_secret_is_48_bytes() {
    let ms = master_secret(&[1; 32], &[2; 32], &[3; 32]);
    assert_eq!(ms.len(), 48);
    // Deterministic.
    assert_eq!(ms, master_secret(&[1; 32], &[2; 32], &[3; 32]));
}

#[test]
fn test_exporter_depends_on_label() {
    let a = export_keying_material(&[1; 48], b"EXTRACTOR-dtls_srtp", &[2; 32], &[3; 32], 60);
    let b = export_keying_material(&[1; 48], b"other label", &[2; 32], &[3; 32], 60);
    assert_eq!(a.len(), 60);
    assert_ne!(a, b);
}
