#[cfg(test)]
mod jitter_buffer_test;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::extend_seq;

/// Default hold bounds: audio tolerates less delay than video.
pub const DEFAULT_AUDIO_HOLD: Duration = Duration::from_millis(200);
pub const DEFAULT_VIDEO_HOLD: Duration = Duration::from_millis(500);

/// A packet enriched with the payloader-provided flags. The buffer never
/// inspects codec payloads; keyframe and DTX signals travel alongside.
#[derive(Debug, Clone)]
pub struct MediaPacket {
    pub packet: rtp::packet::Packet,
    pub extended_sequence: u64,
    pub keyframe: bool,
    pub dtx: bool,
    pub received_at: Instant,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JitterBufferStats {
    pub delivered: u64,
    pub duplicates: u64,
    pub too_late: u64,
    pub lost_skipped: u64,
}

/// Per-SSRC reorder buffer keyed by extended sequence. Packets leave in
/// order; a gap is released once the head of the buffer has waited out
/// the hold time.
pub struct JitterBuffer {
    max_hold: Duration,
    highest: Option<u64>,
    next_release: Option<u64>,
    buffer: BTreeMap<u64, MediaPacket>,
    /// Gaps currently blocking delivery, for the NACK scheduler.
    stats: JitterBufferStats,
}

impl JitterBuffer {
    pub fn new(max_hold: Duration) -> Self {
        JitterBuffer {
            max_hold,
            highest: None,
            next_release: None,
            buffer: BTreeMap::new(),
            stats: JitterBufferStats::default(),
        }
    }

    pub fn stats(&self) -> JitterBufferStats {
        self.stats
    }

    pub fn highest_extended_sequence(&self) -> Option<u64> {
        self.highest
    }

    /// Inserts a packet and returns everything now deliverable in order.
    /// The second return value lists freshly detected missing sequences.
    pub fn push(
        &mut self,
        packet: rtp::packet::Packet,
        keyframe: bool,
        dtx: bool,
        now: Instant,
    ) -> (Vec<MediaPacket>, Vec<u64>) {
        let ext = extend_seq(self.highest, packet.header.sequence_number);
        let previous_highest = self.highest;
        if self.highest.map(|h| ext > h).unwrap_or(true) {
            self.highest = Some(ext);
        }

        if let Some(next) = self.next_release {
            if ext < next {
                self.stats.too_late += 1;
                return (vec![], vec![]);
            }
        }
        if self.buffer.contains_key(&ext) {
            self.stats.duplicates += 1;
            return (vec![], vec![]);
        }
        self.buffer.insert(
            ext,
            MediaPacket {
                packet,
                extended_sequence: ext,
                keyframe,
                dtx,
                received_at: now,
            },
        );
        if self.next_release.is_none() {
            self.next_release = Some(ext);
        }

        // Newly opened gap: everything between the previous highest and
        // this arrival is now known missing.
        let mut missing = vec![];
        if let Some(previous) = previous_highest {
            let mut candidate = previous + 1;
            while candidate < ext {
                if !self.buffer.contains_key(&candidate)
                    && self.next_release.map(|n| candidate >= n).unwrap_or(true)
                {
                    missing.push(candidate);
                }
                candidate += 1;
            }
        }

        (self.release_ready(), missing)
    }

    fn release_ready(&mut self) -> Vec<MediaPacket> {
        let mut out = vec![];
        while let Some(next) = self.next_release {
            match self.buffer.remove(&next) {
                Some(packet) => {
                    out.push(packet);
                    self.stats.delivered += 1;
                    self.next_release = Some(next + 1);
                }
                None => break,
            }
        }
        out
    }

    /// When the oldest buffered packet must be forced out.
    pub fn poll_timeout(&self) -> Option<Instant> {
        let head = self.buffer.values().next()?;
        Some(head.received_at + self.max_hold)
    }

    /// Gives up on gaps older than the hold bound and releases what is
    /// behind them.
    pub fn handle_timeout(&mut self, now: Instant) -> Vec<MediaPacket> {
        let Some(head) = self.buffer.iter().next().map(|(k, v)| (*k, v.received_at)) else {
            return vec![];
        };
        if now < head.1 + self.max_hold {
            return vec![];
        }
        if let Some(next) = self.next_release {
            if head.0 > next {
                self.stats.lost_skipped += head.0 - next;
            }
        }
        self.next_release = Some(head.0);
        self.release_ready()
    }

    /// Sequences currently blocking in-order delivery.
    pub fn pending_gaps(&self) -> Vec<u64> {
        let Some(next) = self.next_release else {
            return vec![];
        };
        let Some((&max, _)) = self.buffer.iter().next_back() else {
            return vec![];
        };
        (next..max)
            .filter(|seq| !self.buffer.contains_key(seq))
            .collect()
    }
}
