use super::*;

// Test vectors from RFC 3711 appendix B.3.
const MASTER_KEY: [u8; 16] = [
    0xe1, 0xf9, 0x7a, 0x0d, 0x3e, 0x01, 0x8b, 0xe0, 0xd6, 0x4f, 0xa3, 0x2c, 0x06, 0xde, 0x41,
    0x39,
];
const MASTER_SALT: [u8; 14] = [
    0x0e, 0xc6, 0x75, 0xad, 0x49, 0x8a, 0xfe, 0xeb, 0xb6, 0x96, 0x0b, 0x3a, 0xab, 0xe6,
];

#[test]
fn test_session_key() {
    let key =
        aes_cm_key_derivation(LABEL_SRTP_ENCRYPTION, &MASTER_KEY, &MASTER_SALT, 16).unwrap();
    assert_eq!(
        key,
        vec![
            0xc6, 0x1e, 0x7a, 0x93, 0x74, 0x4f, 0x39, 0xee, 0x10, 0x73, 0x4a, 0xfe, 0x3f, 0xf7,
            0xa0, 0x87
        ]
    );
}

#[test]
fn test_session_salt() {
    let salt = aes_cm_key_derivation(LABEL_SRTP_SALT, &MASTER_KEY, &MASTER_SALT, 14).unwrap();
    assert_eq!(
        salt,
        vec![
            0x30, 0xcb, 0xbc, 0x08, 0x86, 0x3d, 0x8c, 0x85, 0xd4, 0x9d, 0xb3, 0x4a, 0x9a, 0xe1
        ]
    );
}

#[test]
fn test_auth_key() {
    let key = aes_cm_key_derivation(
        LABEL_SRTP_AUTHENTICATION,
        &MASTER_KEY,
        &MASTER_SALT,
        20,
    )
    .unwrap();
    assert_eq!(
        key,
        vec![
            0xce, 0xbe, 0x32, 0x1f, 0x6f, 0xf7, 0x71, 0x6b, 0x6f, 0xd4, 0xab, 0x49, 0xaf, 0x25,
            0x6a, 0x15, 0x6d, 0x38, 0xba, 0xa4
        ]
    );
}

#[test]
fn test_bad_key_length() {
    assert!(aes_cm_key_derivation(0, &[0u8; 15], &MASTER_SALT, 16).is_err());
}
