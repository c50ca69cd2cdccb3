use super::*;

#[test]
fn test_extension_round_trip() {
    let exts = vec![
        Extension::UseSrtp {
            profiles: vec![0x0001, 0x0007],
        },
        Extension::SupportedGroups {
            groups: vec![GROUP_P256],
        },
        Extension::EcPointFormats,
        Extension::SignatureAlgorithms {
            algorithms: vec![SIG_ECDSA_SHA256],
        },
    ];
    let raw = marshal_extensions(&exts);
    let (parsed, consumed) = unmarshal_extensions(&raw).unwrap();
    assert_eq!(consumed, raw.len());
    assert_eq!(parsed, exts);
}

#[test]
fn test_unknown_extension_preserved() {
    let exts = vec![Extension::Unknown {
        typ: 0xff01,
        data: vec![0x00],
    }];
    let raw = marshal_extensions(&exts);
    let (parsed, _) = unmarshal_extensions(&raw).unwrap();
    assert_eq!(parsed, exts);
}

#[test]
fn test_empty_extensions() {
    let (parsed, consumed) = unmarshal_extensions(&[]).unwrap();
    assert!(parsed.is_empty());
    assert_eq!(consumed, 0);
}
