#[cfg(test)]
mod session_description_test;

use std::fmt::Write as _;

use rand::Rng;

use crate::error::Error;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Application,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Application => "application",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            "application" => Some(MediaKind::Application),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    #[default]
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::SendRecv => "sendrecv",
            Direction::SendOnly => "sendonly",
            Direction::RecvOnly => "recvonly",
            Direction::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sendrecv" => Some(Direction::SendRecv),
            "sendonly" => Some(Direction::SendOnly),
            "recvonly" => Some(Direction::RecvOnly),
            "inactive" => Some(Direction::Inactive),
            _ => None,
        }
    }

    /// The direction the answerer responds with: our wish intersected
    /// with the reverse of the offerer's.
    pub fn intersect(self, remote: Direction) -> Direction {
        let local_send =
            matches!(self, Direction::SendRecv | Direction::SendOnly);
        let local_recv =
            matches!(self, Direction::SendRecv | Direction::RecvOnly);
        let remote_send =
            matches!(remote, Direction::SendRecv | Direction::SendOnly);
        let remote_recv =
            matches!(remote, Direction::SendRecv | Direction::RecvOnly);
        match (local_send && remote_recv, local_recv && remote_send) {
            (true, true) => Direction::SendRecv,
            (true, false) => Direction::SendOnly,
            (false, true) => Direction::RecvOnly,
            (false, false) => Direction::Inactive,
        }
    }

    pub fn reversed(self) -> Direction {
        match self {
            Direction::SendOnly => Direction::RecvOnly,
            Direction::RecvOnly => Direction::SendOnly,
            other => other,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Setup {
    #[default]
    ActPass,
    Active,
    Passive,
}

impl Setup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Setup::ActPass => "actpass",
            Setup::Active => "active",
            Setup::Passive => "passive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "actpass" => Some(Setup::ActPass),
            "active" => Some(Setup::Active),
            "passive" => Some(Setup::Passive),
            _ => None,
        }
    }
}

/// One negotiated payload format from `a=rtpmap` and friends.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Format {
    pub payload_type: u8,
    pub name: String,
    pub clock_rate: u32,
    /// 0 when the rtpmap carries no channel count.
    pub channels: u16,
    /// The raw `a=fmtp` value, if any.
    pub parameters: Option<String>,
    /// `a=rtcp-fb` entries, e.g. "nack", "nack pli", "transport-cc".
    pub rtcp_feedback: Vec<String>,
}

impl Format {
    /// apt payload type for RTX formats (`a=fmtp:<pt> apt=<primary>`).
    pub fn apt(&self) -> Option<u8> {
        let params = self.parameters.as_deref()?;
        params.split(';').find_map(|p| {
            p.trim().strip_prefix("apt=").and_then(|v| v.parse().ok())
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtMap {
    pub id: u8,
    pub uri: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SsrcGroup {
    pub semantics: String,
    pub ssrcs: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSection {
    pub kind: MediaKind,
    pub mid: String,
    pub direction: Direction,
    pub ice_ufrag: String,
    pub ice_pwd: String,
    /// `sha-256 XX:YY:..`
    pub fingerprint: Option<String>,
    pub setup: Option<Setup>,
    pub formats: Vec<Format>,
    pub extmaps: Vec<ExtMap>,
    pub msid: Option<String>,
    pub ssrcs: Vec<(u32, String)>,
    pub ssrc_groups: Vec<SsrcGroup>,
    pub rids: Vec<String>,
    /// Candidate attribute values, without the `candidate:` prefix.
    pub candidates: Vec<String>,
    pub end_of_candidates: bool,
    /// `a=sctp-port` on application sections.
    pub sctp_port: Option<u16>,
    pub max_message_size: Option<u32>,
}

impl MediaSection {
    pub fn new(kind: MediaKind, mid: &str) -> Self {
        MediaSection {
            kind,
            mid: mid.to_owned(),
            direction: Direction::SendRecv,
            ice_ufrag: String::new(),
            ice_pwd: String::new(),
            fingerprint: None,
            setup: None,
            formats: vec![],
            extmaps: vec![],
            msid: None,
            ssrcs: vec![],
            ssrc_groups: vec![],
            rids: vec![],
            candidates: vec![],
            end_of_candidates: false,
            sctp_port: None,
            max_message_size: None,
        }
    }

    pub fn format(&self, payload_type: u8) -> Option<&Format> {
        self.formats.iter().find(|f| f.payload_type == payload_type)
    }
}

/// A parsed session description: the session-level BUNDLE group plus the
/// media sections, which carry everything the connection plane needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub session_id: u64,
    pub session_version: u64,
    pub bundle_mids: Vec<String>,
    pub media: Vec<MediaSection>,
}

impl Default for SessionDescription {
    fn default() -> Self {
        SessionDescription::new()
    }
}

impl SessionDescription {
    pub fn new() -> Self {
        SessionDescription {
            session_id: rand::thread_rng().gen::<u32>() as u64,
            session_version: 2,
            bundle_mids: vec![],
            media: vec![],
        }
    }

    pub fn media_by_mid(&self, mid: &str) -> Option<&MediaSection> {
        self.media.iter().find(|m| m.mid == mid)
    }

    /// Serializes to SDP text with CRLF line endings.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "v=0\r\no=- {} {} IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\n",
            self.session_id, self.session_version
        );
        if !self.bundle_mids.is_empty() {
            let _ = write!(out, "a=group:BUNDLE {}\r\n", self.bundle_mids.join(" "));
        }
        out.push_str("a=msid-semantic: WMS *\r\n");
        for m in &self.media {
            self.serialize_media(&mut out, m);
        }
        out
    }

    fn serialize_media(&self, out: &mut String, m: &MediaSection) {
        match m.kind {
            MediaKind::Application => {
                out.push_str("m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n");
            }
            kind => {
                let pts: Vec<String> = m
                    .formats
                    .iter()
                    .map(|f| f.payload_type.to_string())
                    .collect();
                let _ = write!(
                    out,
                    "m={} 9 UDP/TLS/RTP/SAVPF {}\r\n",
                    kind.as_str(),
                    pts.join(" ")
                );
            }
        }
        out.push_str("c=IN IP4 0.0.0.0\r\n");
        if !m.ice_ufrag.is_empty() {
            let _ = write!(out, "a=ice-ufrag:{}\r\n", m.ice_ufrag);
            let _ = write!(out, "a=ice-pwd:{}\r\n", m.ice_pwd);
        }
        out.push_str("a=ice-options:trickle\r\n");
        if let Some(fp) = &m.fingerprint {
            let _ = write!(out, "a=fingerprint:{fp}\r\n");
        }
        if let Some(setup) = m.setup {
            let _ = write!(out, "a=setup:{}\r\n", setup.as_str());
        }
        let _ = write!(out, "a=mid:{}\r\n", m.mid);
        for ext in &m.extmaps {
            let _ = write!(out, "a=extmap:{} {}\r\n", ext.id, ext.uri);
        }
        if m.kind != MediaKind::Application {
            let _ = write!(out, "a={}\r\n", m.direction.as_str());
            if let Some(msid) = &m.msid {
                let _ = write!(out, "a=msid:{msid}\r\n");
            }
            out.push_str("a=rtcp-mux\r\n");
            for f in &m.formats {
                if f.channels > 0 {
                    let _ = write!(
                        out,
                        "a=rtpmap:{} {}/{}/{}\r\n",
                        f.payload_type, f.name, f.clock_rate, f.channels
                    );
                } else {
                    let _ = write!(
                        out,
                        "a=rtpmap:{} {}/{}\r\n",
                        f.payload_type, f.name, f.clock_rate
                    );
                }
                for fb in &f.rtcp_feedback {
                    let _ = write!(out, "a=rtcp-fb:{} {fb}\r\n", f.payload_type);
                }
                if let Some(params) = &f.parameters {
                    let _ = write!(out, "a=fmtp:{} {params}\r\n", f.payload_type);
                }
            }
            for rid in &m.rids {
                let _ = write!(out, "a=rid:{rid} recv\r\n");
            }
            if m.rids.len() > 1 {
                let _ = write!(out, "a=simulcast:recv {}\r\n", m.rids.join(";"));
            }
            for group in &m.ssrc_groups {
                let ssrcs: Vec<String> =
                    group.ssrcs.iter().map(|s| s.to_string()).collect();
                let _ = write!(
                    out,
                    "a=ssrc-group:{} {}\r\n",
                    group.semantics,
                    ssrcs.join(" ")
                );
            }
            for (ssrc, cname) in &m.ssrcs {
                let _ = write!(out, "a=ssrc:{ssrc} cname:{cname}\r\n");
            }
        } else {
            let _ = write!(out, "a=sctp-port:{}\r\n", m.sctp_port.unwrap_or(5000));
            if let Some(size) = m.max_message_size {
                let _ = write!(out, "a=max-message-size:{size}\r\n");
            }
        }
        for candidate in &m.candidates {
            let _ = write!(out, "a=candidate:{candidate}\r\n");
        }
        if m.end_of_candidates {
            out.push_str("a=end-of-candidates\r\n");
        }
    }

    /// Parses SDP text. Unknown lines are skipped; the connection plane
    /// only needs the attributes modeled here.
    pub fn parse(sdp: &str) -> Result<Self> {
        let mut lines = sdp.lines().enumerate();
        let Some((_, first)) = lines.next() else {
            return Err(Error::MissingVersion);
        };
        if first.trim() != "v=0" {
            return Err(Error::MissingVersion);
        }

        let mut session = SessionDescription {
            session_id: 0,
            session_version: 0,
            bundle_mids: vec![],
            media: vec![],
        };
        let mut current: Option<MediaSection> = None;

        for (lineno, raw_line) in lines {
            let line = raw_line.trim_end();
            if line.len() < 2 || line.as_bytes().get(1) != Some(&b'=') {
                continue;
            }
            let (kind, value) = (line.as_bytes()[0], &line[2..]);
            match kind {
                b'o' => {
                    let fields: Vec<&str> = value.split_whitespace().collect();
                    if fields.len() >= 3 {
                        session.session_id = fields[1].parse().unwrap_or(0);
                        session.session_version = fields[2].parse().unwrap_or(0);
                    }
                }
                b'm' => {
                    if let Some(section) = current.take() {
                        session.media.push(section);
                    }
                    let media_type = value.split(' ').next().unwrap_or("");
                    let kind = MediaKind::parse(media_type).ok_or_else(|| {
                        Error::BadLine(lineno + 1, raw_line.to_owned())
                    })?;
                    let mut section = MediaSection::new(kind, "");
                    // Remember the m-line payload types; rtpmap fills the
                    // details in as attributes arrive.
                    if kind != MediaKind::Application {
                        for pt in value.split(' ').skip(3) {
                            if let Ok(pt) = pt.parse::<u8>() {
                                section.formats.push(Format {
                                    payload_type: pt,
                                    ..Default::default()
                                });
                            }
                        }
                    }
                    current = Some(section);
                }
                b'a' => {
                    let (name, attr_value) = match value.split_once(':') {
                        Some((n, v)) => (n, v),
                        None => (value, ""),
                    };
                    if let Some(section) = current.as_mut() {
                        Self::parse_media_attribute(section, name, attr_value);
                    } else if name == "group" {
                        if let Some(mids) = attr_value.strip_prefix("BUNDLE") {
                            session.bundle_mids =
                                mids.split_whitespace().map(str::to_owned).collect();
                        }
                    }
                }
                _ => {}
            }
        }
        if let Some(section) = current.take() {
            session.media.push(section);
        }
        Ok(session)
    }

    fn parse_media_attribute(section: &mut MediaSection, name: &str, value: &str) {
        match name {
            "mid" => section.mid = value.to_owned(),
            "ice-ufrag" => section.ice_ufrag = value.to_owned(),
            "ice-pwd" => section.ice_pwd = value.to_owned(),
            "fingerprint" => section.fingerprint = Some(value.to_owned()),
            "setup" => section.setup = Setup::parse(value),
            "sendrecv" | "sendonly" | "recvonly" | "inactive" => {
                if let Some(direction) = Direction::parse(name) {
                    section.direction = direction;
                }
            }
            "msid" => section.msid = Some(value.to_owned()),
            "rtpmap" => {
                let Some((pt, spec)) = value.split_once(' ') else {
                    return;
                };
                let Ok(pt) = pt.parse::<u8>() else { return };
                let mut spec_fields = spec.split('/');
                let codec_name = spec_fields.next().unwrap_or("").to_owned();
                let clock_rate = spec_fields
                    .next()
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(0);
                let channels = spec_fields
                    .next()
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(0);
                if let Some(f) =
                    section.formats.iter_mut().find(|f| f.payload_type == pt)
                {
                    f.name = codec_name;
                    f.clock_rate = clock_rate;
                    f.channels = channels;
                }
            }
            "fmtp" => {
                if let Some((pt, params)) = value.split_once(' ') {
                    if let Ok(pt) = pt.parse::<u8>() {
                        if let Some(f) =
                            section.formats.iter_mut().find(|f| f.payload_type == pt)
                        {
                            f.parameters = Some(params.to_owned());
                        }
                    }
                }
            }
            "rtcp-fb" => {
                if let Some((pt, fb)) = value.split_once(' ') {
                    if let Ok(pt) = pt.parse::<u8>() {
                        if let Some(f) =
                            section.formats.iter_mut().find(|f| f.payload_type == pt)
                        {
                            f.rtcp_feedback.push(fb.to_owned());
                        }
                    }
                }
            }
            "extmap" => {
                if let Some((id, uri)) = value.split_once(' ') {
                    // Direction suffixes on the id ("1/recvonly") are not
                    // modeled.
                    let id = id.split('/').next().unwrap_or(id);
                    if let Ok(id) = id.parse::<u8>() {
                        section.extmaps.push(ExtMap {
                            id,
                            uri: uri.to_owned(),
                        });
                    }
                }
            }
            "ssrc" => {
                let mut fields = value.splitn(2, ' ');
                let Some(Ok(ssrc)) = fields.next().map(|s| s.parse::<u32>()) else {
                    return;
                };
                let cname = fields
                    .next()
                    .and_then(|rest| rest.strip_prefix("cname:"))
                    .unwrap_or("")
                    .to_owned();
                if !section.ssrcs.iter().any(|(s, _)| *s == ssrc) {
                    section.ssrcs.push((ssrc, cname));
                }
            }
            "ssrc-group" => {
                let mut fields = value.split_whitespace();
                let Some(semantics) = fields.next() else { return };
                let ssrcs: Vec<u32> =
                    fields.filter_map(|s| s.parse().ok()).collect();
                section.ssrc_groups.push(SsrcGroup {
                    semantics: semantics.to_owned(),
                    ssrcs,
                });
            }
            "rid" => {
                if let Some((rid, _direction)) = value.split_once(' ') {
                    section.rids.push(rid.to_owned());
                }
            }
            "candidate" => section.candidates.push(value.to_owned()),
            "end-of-candidates" => section.end_of_candidates = true,
            "sctp-port" => section.sctp_port = value.parse().ok(),
            "max-message-size" => section.max_message_size = value.parse().ok(),
            _ => {}
        }
    }
}
