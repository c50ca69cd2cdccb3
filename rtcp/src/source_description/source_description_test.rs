use super::*;

#[test]
fn test_cname_round_trip() {
    let sdes = SourceDescription::cname(0x1020_3040, "peer@example.invalid");
    let raw = sdes.marshal().unwrap();
    assert_eq!(raw.len() % 4, 0);

    let mut buf = &raw[..];
    let parsed = SourceDescription::unmarshal(&mut buf).unwrap();
    assert_eq!(parsed, sdes);
}

#[test]
fn test_multiple_chunks() {
    let sdes = SourceDescription {
        chunks: vec![
            SourceDescriptionChunk {
                source: 1,
                items: vec![SourceDescriptionItem {
                    sdes_type: SDES_TYPE_CNAME,
                    text: "a".to_owned(),
                }],
            },
            SourceDescriptionChunk {
                source: 2,
                items: vec![SourceDescriptionItem {
                    sdes_type: SDES_TYPE_CNAME,
                    text: "bc".to_owned(),
                }],
            },
        ],
    };
    let raw = sdes.marshal().unwrap();
    let mut buf = &raw[..];
    let parsed = SourceDescription::unmarshal(&mut buf).unwrap();
    assert_eq!(parsed, sdes);
    assert_eq!(parsed.destination_ssrc(), vec![1, 2]);
}

#[test]
fn test_text_too_long() {
    let sdes = SourceDescription::cname(7, &"x".repeat(256));
    assert!(sdes.marshal().is_err());
}
