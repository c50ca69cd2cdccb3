use super::*;

fn sample() -> SessionDescription {
    let mut sd = SessionDescription::new();
    sd.bundle_mids = vec!["0".to_owned(), "1".to_owned()];

    let mut audio = MediaSection::new(MediaKind::Audio, "0");
    audio.ice_ufrag = "Frag".to_owned();
    audio.ice_pwd = "PasswordPasswordPassw".to_owned();
    audio.fingerprint = Some("sha-256 AA:BB:CC".to_owned());
    audio.setup = Some(Setup::ActPass);
    audio.direction = Direction::SendRecv;
    audio.formats.push(Format {
        payload_type: 111,
        name: "opus".to_owned(),
        clock_rate: 48000,
        channels: 2,
        parameters: Some("minptime=10;useinbandfec=1".to_owned()),
        rtcp_feedback: vec!["transport-cc".to_owned()],
    });
    audio.extmaps.push(ExtMap {
        id: 3,
        uri: "urn:ietf:params:rtp-hdrext:sdes:mid".to_owned(),
    });
    audio.ssrcs.push((12345, "cname-a".to_owned()));
    sd.media.push(audio);

    let mut dc = MediaSection::new(MediaKind::Application, "1");
    dc.ice_ufrag = "Frag".to_owned();
    dc.ice_pwd = "PasswordPasswordPassw".to_owned();
    dc.fingerprint = Some("sha-256 AA:BB:CC".to_owned());
    dc.setup = Some(Setup::ActPass);
    dc.sctp_port = Some(5000);
    dc.max_message_size = Some(262144);
    sd.media.push(dc);
    sd
}

#[test]
fn test_serialize_parse_round_trip() {
    let sd = sample();
    let text = sd.serialize();
    let parsed = SessionDescription::parse(&text).unwrap();

    assert_eq!(parsed.bundle_mids, sd.bundle_mids);
    assert_eq!(parsed.media.len(), 2);

    let audio = &parsed.media[0];
    assert_eq!(audio.kind, MediaKind::Audio);
    assert_eq!(audio.mid, "0");
    assert_eq!(audio.ice_ufrag, "Frag");
    assert_eq!(audio.setup, Some(Setup::ActPass));
    assert_eq!(audio.direction, Direction::SendRecv);
    let opus = audio.format(111).unwrap();
    assert_eq!(opus.name, "opus");
    assert_eq!(opus.clock_rate, 48000);
    assert_eq!(opus.channels, 2);
    assert_eq!(opus.rtcp_feedback, vec!["transport-cc"]);
    assert_eq!(
        opus.parameters.as_deref(),
        Some("minptime=10;useinbandfec=1")
    );
    assert_eq!(audio.ssrcs, vec![(12345, "cname-a".to_owned())]);

    let dc = &parsed.media[1];
    assert_eq!(dc.kind, MediaKind::Application);
    assert_eq!(dc.sctp_port, Some(5000));
    assert_eq!(dc.max_message_size, Some(262144));
}

#[test]
fn test_rtx_apt() {
    let f = Format {
        payload_type: 97,
        name: "rtx".to_owned(),
        clock_rate: 90000,
        channels: 0,
        parameters: Some("apt=96".to_owned()),
        rtcp_feedback: vec![],
    };
    assert_eq!(f.apt(), Some(96));
}

#[test]
fn test_direction_intersection() {
    use Direction::*;
    assert_eq!(SendRecv.intersect(SendRecv), SendRecv);
    assert_eq!(SendRecv.intersect(RecvOnly), SendOnly);
    assert_eq!(SendRecv.intersect(SendOnly), RecvOnly);
    assert_eq!(SendOnly.intersect(SendOnly), Inactive);
    assert_eq!(RecvOnly.intersect(SendRecv), RecvOnly);
    assert_eq!(Inactive.intersect(SendRecv), Inactive);
}

#[test]
fn test_parse_browser_style_offer() {
    let text = "v=0\r\n\
                o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
                s=-\r\n\
                t=0 0\r\n\
                a=group:BUNDLE 0\r\n\
                a=msid-semantic: WMS\r\n\
                m=video 9 UDP/TLS/RTP/SAVPF 96 97\r\n\
                c=IN IP4 0.0.0.0\r\n\
                a=ice-ufrag:4ZcD\r\n\
                a=ice-pwd:2e13dFTSuL3yYaQMTpflpdf7\r\n\
                a=ice-options:trickle\r\n\
                a=fingerprint:sha-256 19:E2:1C:3B:4B:9F:81:E6:B8:5C:F4:A5:A8:D8:73:04:BB:05:2F:70:9F:04:A9:0E:05:E9:26:33:E8:70:88:A2\r\n\
                a=setup:actpass\r\n\
                a=mid:0\r\n\
                a=extmap:4 http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01\r\n\
                a=sendrecv\r\n\
                a=rtcp-mux\r\n\
                a=rtpmap:96 VP8/90000\r\n\
                a=rtcp-fb:96 nack\r\n\
                a=rtcp-fb:96 nack pli\r\n\
                a=rtcp-fb:96 transport-cc\r\n\
                a=rtpmap:97 rtx/90000\r\n\
                a=fmtp:97 apt=96\r\n\
                a=ssrc-group:FID 2231627014 632943048\r\n\
                a=ssrc:2231627014 cname:4YPXyyVltjrjI6e1\r\n\
                a=ssrc:632943048 cname:4YPXyyVltjrjI6e1\r\n\
                a=candidate:1 1 udp 2130706431 192.168.1.4 50000 typ host\r\n";
    let parsed = SessionDescription::parse(text).unwrap();
    assert_eq!(parsed.session_id, 4611731400430051336);
    let video = &parsed.media[0];
    assert_eq!(video.mid, "0");
    let vp8 = video.format(96).unwrap();
    assert!(vp8.rtcp_feedback.contains(&"nack pli".to_owned()));
    let rtx = video.format(97).unwrap();
    assert_eq!(rtx.apt(), Some(96));
    assert_eq!(video.ssrc_groups[0].semantics, "FID");
    assert_eq!(video.ssrc_groups[0].ssrcs, vec![2231627014, 632943048]);
    assert_eq!(video.candidates.len(), 1);
    assert_eq!(video.extmaps[0].id, 4);
}

#[test]
fn test_missing_version_rejected() {
    assert_eq!(
        SessionDescription::parse("o=- 1 1 IN IP4 0.0.0.0\r\n").unwrap_err(),
        Error::MissingVersion
    );
}
