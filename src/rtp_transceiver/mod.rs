use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;

use sdp::{Direction, Format, MediaKind};

use crate::rtp_engine::{JitterBuffer, NackGenerator, ReceiverStats, RtxSender, SenderStats};

/// A decoded inbound RTP packet handed to the application, with the
/// transport-level signals the depacketizer needs.
#[derive(Debug, Clone)]
pub struct TrackPacket {
    pub packet: rtp::packet::Packet,
    pub keyframe: bool,
    pub rid: Option<String>,
}

/// The receiving side of a transceiver as exposed to the application:
/// identifies the source and streams its packets.
pub struct TrackRemote {
    pub mid: String,
    pub kind: MediaKind,
    pub ssrc: u32,
    pub rid: Option<String>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<TrackPacket>>,
}

impl TrackRemote {
    pub(crate) fn new(
        mid: String,
        kind: MediaKind,
        ssrc: u32,
        rid: Option<String>,
    ) -> (Self, mpsc::UnboundedSender<TrackPacket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            TrackRemote {
                mid,
                kind,
                ssrc,
                rid,
                receiver: tokio::sync::Mutex::new(rx),
            },
            tx,
        )
    }

    /// Next packet in extended-sequence order, `None` once the
    /// transceiver is gone.
    pub async fn recv(&self) -> Option<TrackPacket> {
        self.receiver.lock().await.recv().await
    }
}

/// Send half state: SSRC allocation, counters and the RTX history.
pub(crate) struct SenderState {
    pub ssrc: u32,
    pub rtx_ssrc: u32,
    pub payload_type: Option<u8>,
    pub rtx_payload_type: Option<u8>,
    pub stats: SenderStats,
    pub rtx: Option<RtxSender>,
    pub twcc_ext_id: Option<u8>,
    pub mid_ext_id: Option<u8>,
}

impl SenderState {
    fn new(clock_rate: u32) -> Self {
        let mut rng = rand::thread_rng();
        let ssrc: u32 = rng.gen();
        let rtx_ssrc: u32 = rng.gen();
        SenderState {
            ssrc,
            rtx_ssrc,
            payload_type: None,
            rtx_payload_type: None,
            stats: SenderStats::new(ssrc, clock_rate),
            rtx: None,
            twcc_ext_id: None,
            mid_ext_id: None,
        }
    }
}

/// One inbound RTP stream (a simulcast layer or the single stream).
pub(crate) struct ReceiveStream {
    pub jitter: JitterBuffer,
    pub nack: NackGenerator,
    pub stats: ReceiverStats,
    pub track_tx: mpsc::UnboundedSender<TrackPacket>,
    pub rid: Option<String>,
    /// Arrival-clock reference for jitter computation.
    pub epoch: std::time::Instant,
}

/// Receive half state: per-SSRC streams plus the demux hints from SDP.
pub(crate) struct ReceiverState {
    pub expected_ssrcs: Vec<u32>,
    /// primary <- rtx from `a=ssrc-group:FID`.
    pub rtx_to_primary: HashMap<u32, u32>,
    pub streams: HashMap<u32, ReceiveStream>,
}

impl ReceiverState {
    fn new() -> Self {
        ReceiverState {
            expected_ssrcs: vec![],
            rtx_to_primary: HashMap::new(),
            streams: HashMap::new(),
        }
    }
}

/// Transceiver: one m-line's sender/receiver pair. `mid` is assigned at
/// first negotiation and immutable afterwards.
pub(crate) struct Transceiver {
    pub mid: String,
    pub kind: MediaKind,
    pub direction: Direction,
    pub negotiated_direction: Option<Direction>,
    pub codecs: Vec<Format>,
    /// Negotiated header extensions (offerer's ids win, RFC 8285 §6).
    pub ext_ids: Vec<(u8, String)>,
    pub sender: SenderState,
    pub receiver: ReceiverState,
    pub cname: String,
}

impl Transceiver {
    pub fn new(mid: String, kind: MediaKind, direction: Direction) -> Self {
        let clock_rate = match kind {
            MediaKind::Audio => 48000,
            _ => 90000,
        };
        let cname: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        Transceiver {
            mid,
            kind,
            direction,
            negotiated_direction: None,
            codecs: vec![],
            ext_ids: vec![],
            sender: SenderState::new(clock_rate),
            receiver: ReceiverState::new(),
            cname,
        }
    }

    pub fn ext_id(&self, uri: &str) -> Option<u8> {
        self.ext_ids
            .iter()
            .find(|(_, u)| u == uri)
            .map(|(id, _)| *id)
    }

    pub fn effective_direction(&self) -> Direction {
        self.negotiated_direction.unwrap_or(self.direction)
    }

    pub fn sends(&self) -> bool {
        matches!(
            self.effective_direction(),
            Direction::SendRecv | Direction::SendOnly
        )
    }

    pub fn receives(&self) -> bool {
        matches!(
            self.effective_direction(),
            Direction::SendRecv | Direction::RecvOnly
        )
    }

    /// Negotiated primary (non-RTX) payload types.
    pub fn primary_payload_types(&self) -> Vec<u8> {
        self.codecs
            .iter()
            .filter(|c| !c.name.eq_ignore_ascii_case("rtx"))
            .map(|c| c.payload_type)
            .collect()
    }

    /// rtx payload type -> primary payload type.
    pub fn rtx_payload_map(&self) -> HashMap<u8, u8> {
        self.codecs
            .iter()
            .filter(|c| c.name.eq_ignore_ascii_case("rtx"))
            .filter_map(|c| c.apt().map(|apt| (c.payload_type, apt)))
            .collect()
    }

    pub fn jitter_hold(&self) -> Duration {
        match self.kind {
            MediaKind::Audio => crate::rtp_engine::jitter_buffer::DEFAULT_AUDIO_HOLD,
            _ => crate::rtp_engine::jitter_buffer::DEFAULT_VIDEO_HOLD,
        }
    }
}

/// Public, immutable view of a transceiver, returned by
/// `add_transceiver` and carried on `on_track`.
#[derive(Debug, Clone)]
pub struct TransceiverInfo {
    pub mid: String,
    pub kind: MediaKind,
    pub direction: Direction,
}
