#[cfg(test)]
mod media_engine_test;

use rtp::extension::{
    ABS_SEND_TIME_URI, SDES_MID_URI, SDES_REPAIRED_RTP_STREAM_ID_URI, SDES_RTP_STREAM_ID_URI,
    TRANSPORT_CC_URI,
};
use sdp::{Format, MediaKind};

/// One registered codec. Mirrors the `a=rtpmap`/`a=fmtp`/`a=rtcp-fb`
/// triple for a payload type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codec {
    pub payload_type: u8,
    pub name: String,
    pub clock_rate: u32,
    pub channels: u16,
    pub parameters: Option<String>,
    pub rtcp_feedback: Vec<String>,
}

impl Codec {
    pub fn is_rtx(&self) -> bool {
        self.name.eq_ignore_ascii_case("rtx")
    }

    pub fn apt(&self) -> Option<u8> {
        self.parameters
            .as_deref()?
            .split(';')
            .find_map(|p| p.trim().strip_prefix("apt=").and_then(|v| v.parse().ok()))
    }

    fn matches(&self, format: &Format) -> bool {
        self.name.eq_ignore_ascii_case(&format.name)
            && self.clock_rate == format.clock_rate
            && self.channels == format.channels
    }

    fn to_format(&self) -> Format {
        Format {
            payload_type: self.payload_type,
            name: self.name.clone(),
            clock_rate: self.clock_rate,
            channels: self.channels,
            parameters: self.parameters.clone(),
            rtcp_feedback: self.rtcp_feedback.clone(),
        }
    }
}

/// The codec table handed to a PeerConnection. There is no process-wide
/// registry; every connection owns its own engine.
#[derive(Debug, Clone)]
pub struct MediaEngine {
    audio: Vec<Codec>,
    video: Vec<Codec>,
    header_extensions: Vec<(u8, String)>,
}

impl Default for MediaEngine {
    fn default() -> Self {
        let mut engine = MediaEngine {
            audio: vec![],
            video: vec![],
            header_extensions: vec![
                (2, ABS_SEND_TIME_URI.to_owned()),
                (3, TRANSPORT_CC_URI.to_owned()),
                (4, SDES_MID_URI.to_owned()),
                (5, SDES_RTP_STREAM_ID_URI.to_owned()),
                (6, SDES_REPAIRED_RTP_STREAM_ID_URI.to_owned()),
            ],
        };
        engine.register_default_codecs();
        engine
    }
}

impl MediaEngine {
    pub fn register_default_codecs(&mut self) {
        self.audio.push(Codec {
            payload_type: 111,
            name: "opus".to_owned(),
            clock_rate: 48000,
            channels: 2,
            parameters: Some("minptime=10;useinbandfec=1".to_owned()),
            rtcp_feedback: vec!["transport-cc".to_owned()],
        });
        self.video.push(Codec {
            payload_type: 96,
            name: "VP8".to_owned(),
            clock_rate: 90000,
            channels: 0,
            parameters: None,
            rtcp_feedback: vec![
                "nack".to_owned(),
                "nack pli".to_owned(),
                "ccm fir".to_owned(),
                "transport-cc".to_owned(),
                "goog-remb".to_owned(),
            ],
        });
        self.video.push(Codec {
            payload_type: 97,
            name: "rtx".to_owned(),
            clock_rate: 90000,
            channels: 0,
            parameters: Some("apt=96".to_owned()),
            rtcp_feedback: vec![],
        });
    }

    pub fn register_codec(&mut self, kind: MediaKind, codec: Codec) {
        match kind {
            MediaKind::Audio => self.audio.push(codec),
            MediaKind::Video => self.video.push(codec),
            MediaKind::Application => {}
        }
    }

    pub fn codecs(&self, kind: MediaKind) -> &[Codec] {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
            MediaKind::Application => &[],
        }
    }

    pub fn header_extensions(&self) -> &[(u8, String)] {
        &self.header_extensions
    }

    pub fn extension_id(&self, uri: &str) -> Option<u8> {
        self.header_extensions
            .iter()
            .find(|(_, u)| u == uri)
            .map(|(id, _)| *id)
    }

    /// Offer formats for a media kind: our codec table verbatim.
    pub fn offered_formats(&self, kind: MediaKind) -> Vec<Format> {
        self.codecs(kind).iter().map(|c| c.to_format()).collect()
    }

    /// Codec intersection against a remote media section. The result uses
    /// the remote payload-type numbering. Local `preferences` (codec
    /// names) outrank the remote ordering when set; RTX entries follow
    /// whichever primary survived via their `apt`.
    pub fn negotiate(
        &self,
        kind: MediaKind,
        remote: &[Format],
        preferences: Option<&[String]>,
    ) -> Vec<Format> {
        let local = self.codecs(kind);
        let mut matched: Vec<Format> = vec![];
        for format in remote {
            if format.name.eq_ignore_ascii_case("rtx") {
                continue;
            }
            if local.iter().any(|c| !c.is_rtx() && c.matches(format)) {
                matched.push(format.clone());
            }
        }
        if let Some(preferences) = preferences {
            matched.sort_by_key(|f| {
                preferences
                    .iter()
                    .position(|p| p.eq_ignore_ascii_case(&f.name))
                    .unwrap_or(usize::MAX)
            });
        }
        // Re-attach RTX formats whose apt refers to a surviving primary.
        let supports_rtx = local.iter().any(Codec::is_rtx);
        let mut out: Vec<Format> = vec![];
        for format in matched {
            let rtx = remote
                .iter()
                .find(|r| {
                    r.name.eq_ignore_ascii_case("rtx")
                        && r.apt() == Some(format.payload_type)
                })
                .cloned();
            out.push(format);
            if supports_rtx {
                if let Some(rtx) = rtx {
                    out.push(rtx);
                }
            }
        }
        out
    }
}
