#[cfg(test)]
mod nack_test;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rtcp::transport_feedbacks::transport_layer_nack::{
    nack_pairs_from_sequence_numbers, TransportLayerNack,
};

/// At most one NACK per missing packet per interval, with bounded
/// retries.
const NACK_INTERVAL: Duration = Duration::from_millis(300);
const MAX_NACK_TRIES: u32 = 10;

#[derive(Debug)]
struct MissingEntry {
    last_nack: Option<Instant>,
    tries: u32,
}

/// Schedules Generic NACK feedback for one inbound SSRC, fed by the
/// jitter buffer's gap reports.
pub struct NackGenerator {
    sender_ssrc: u32,
    media_ssrc: u32,
    missing: HashMap<u64, MissingEntry>,
}

impl NackGenerator {
    pub fn new(sender_ssrc: u32, media_ssrc: u32) -> Self {
        NackGenerator {
            sender_ssrc,
            media_ssrc,
            missing: HashMap::new(),
        }
    }

    pub fn on_missing(&mut self, extended_sequences: &[u64]) {
        for &seq in extended_sequences {
            self.missing.entry(seq).or_insert(MissingEntry {
                last_nack: None,
                tries: 0,
            });
        }
    }

    /// The packet arrived (possibly via RTX) or was given up on.
    pub fn on_recovered(&mut self, extended_sequence: u64) {
        self.missing.remove(&extended_sequence);
    }

    pub fn pending(&self) -> usize {
        self.missing.len()
    }

    /// Builds a NACK for every missing packet that is due another try.
    pub fn poll(&mut self, now: Instant) -> Option<TransportLayerNack> {
        let mut due: Vec<u64> = vec![];
        self.missing.retain(|&seq, entry| {
            if entry.tries >= MAX_NACK_TRIES {
                return false;
            }
            let ready = entry
                .last_nack
                .map(|at| now.saturating_duration_since(at) >= NACK_INTERVAL)
                .unwrap_or(true);
            if ready {
                entry.tries += 1;
                entry.last_nack = Some(now);
                due.push(seq);
            }
            true
        });
        if due.is_empty() {
            return None;
        }
        due.sort_unstable();
        let seqs: Vec<u16> = due.iter().map(|&s| s as u16).collect();
        Some(TransportLayerNack {
            sender_ssrc: self.sender_ssrc,
            media_ssrc: self.media_ssrc,
            nacks: nack_pairs_from_sequence_numbers(&seqs),
        })
    }

    pub fn poll_timeout(&self, now: Instant) -> Option<Instant> {
        self.missing
            .values()
            .filter(|e| e.tries < MAX_NACK_TRIES)
            .map(|e| {
                e.last_nack
                    .map(|at| at + NACK_INTERVAL)
                    .unwrap_or(now)
            })
            .min()
    }
}
