use super::*;

fn remote_video() -> Vec<Format> {
    vec![
        Format {
            payload_type: 102,
            name: "VP8".to_owned(),
            clock_rate: 90000,
            channels: 0,
            parameters: None,
            rtcp_feedback: vec!["nack".to_owned()],
        },
        Format {
            payload_type: 103,
            name: "rtx".to_owned(),
            clock_rate: 90000,
            channels: 0,
            parameters: Some("apt=102".to_owned()),
            rtcp_feedback: vec![],
        },
        Format {
            payload_type: 104,
            name: "H264".to_owned(),
            clock_rate: 90000,
            channels: 0,
            parameters: None,
            rtcp_feedback: vec![],
        },
    ]
}

#[test]
fn test_negotiate_uses_remote_payload_types() {
    let engine = MediaEngine::default();
    let negotiated = engine.negotiate(MediaKind::Video, &remote_video(), None);
    // VP8 matched under the remote PT, its RTX follows, H264 dropped.
    assert_eq!(negotiated.len(), 2);
    assert_eq!(negotiated[0].payload_type, 102);
    assert_eq!(negotiated[0].name, "VP8");
    assert_eq!(negotiated[1].payload_type, 103);
    assert_eq!(negotiated[1].apt(), Some(102));
}

#[test]
fn test_negotiate_no_common_codec() {
    let engine = MediaEngine::default();
    let remote = vec![Format {
        payload_type: 104,
        name: "H264".to_owned(),
        clock_rate: 90000,
        channels: 0,
        parameters: None,
        rtcp_feedback: vec![],
    }];
    assert!(engine.negotiate(MediaKind::Video, &remote, None).is_empty());
}

#[test]
fn test_preferences_outrank_remote_order() {
    let mut engine = MediaEngine::default();
    engine.register_codec(
        MediaKind::Audio,
        Codec {
            payload_type: 9,
            name: "G722".to_owned(),
            clock_rate: 8000,
            channels: 1,
            parameters: None,
            rtcp_feedback: vec![],
        },
    );
    let remote = vec![
        Format {
            payload_type: 9,
            name: "G722".to_owned(),
            clock_rate: 8000,
            channels: 1,
            parameters: None,
            rtcp_feedback: vec![],
        },
        Format {
            payload_type: 111,
            name: "opus".to_owned(),
            clock_rate: 48000,
            channels: 2,
            parameters: None,
            rtcp_feedback: vec![],
        },
    ];
    // Remote prefers G722; local preference says opus first.
    let preferences = vec!["opus".to_owned()];
    let negotiated = engine.negotiate(MediaKind::Audio, &remote, Some(&preferences));
    assert_eq!(negotiated[0].name, "opus");

    // Without preferences the remote ordering stands.
    let negotiated = engine.negotiate(MediaKind::Audio, &remote, None);
    assert_eq!(negotiated[0].name, "G722");
}

#[test]
fn test_default_extensions_registered() {
    let engine = MediaEngine::default();
    assert!(engine.extension_id(rtp::extension::TRANSPORT_CC_URI).is_some());
    assert!(engine.extension_id(rtp::extension::SDES_MID_URI).is_some());
    assert_eq!(engine.extension_id("urn:example:unknown"), None);
}
