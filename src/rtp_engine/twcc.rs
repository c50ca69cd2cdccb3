#[cfg(test)]
mod twcc_test;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rtcp::transport_feedbacks::transport_layer_cc::{
    PacketStatusChunk, RecvDelta, SymbolType, TransportLayerCc, TYPE_TCC_DELTA_SCALE_FACTOR,
};

const FEEDBACK_INTERVAL: Duration = Duration::from_millis(100);
const REFERENCE_TIME_UNIT: Duration = Duration::from_millis(64);

/// Receiver half of transport-wide congestion control: records arrival
/// times keyed by the transport-wide sequence extension and periodically
/// packs them into TransportLayerCc feedback.
pub struct TwccRecorder {
    sender_ssrc: u32,
    media_ssrc: u32,
    epoch: Option<Instant>,
    /// Unrolled wide sequence -> arrival.
    arrivals: BTreeMap<i64, Instant>,
    highest: Option<i64>,
    next_feedback_seq: i64,
    fb_pkt_count: u8,
    next_feedback_at: Option<Instant>,
}

impl TwccRecorder {
    pub fn new(sender_ssrc: u32, media_ssrc: u32) -> Self {
        TwccRecorder {
            sender_ssrc,
            media_ssrc,
            epoch: None,
            arrivals: BTreeMap::new(),
            highest: None,
            next_feedback_seq: 0,
            fb_pkt_count: 0,
            next_feedback_at: None,
        }
    }

    fn unroll(&mut self, wide_seq: u16) -> i64 {
        let Some(highest) = self.highest else {
            self.highest = Some(wide_seq as i64);
            return wide_seq as i64;
        };
        let base = highest & !0xffff;
        let candidates = [
            base - 0x1_0000 + wide_seq as i64,
            base + wide_seq as i64,
            base + 0x1_0000 + wide_seq as i64,
        ];
        let unrolled = candidates
            .into_iter()
            .min_by_key(|c| (c - highest).abs())
            .unwrap_or(wide_seq as i64);
        if unrolled > highest {
            self.highest = Some(unrolled);
        }
        unrolled
    }

    pub fn record(&mut self, wide_seq: u16, arrival: Instant) {
        if self.epoch.is_none() {
            self.epoch = Some(arrival);
            self.next_feedback_at = Some(arrival + FEEDBACK_INTERVAL);
        }
        let unrolled = self.unroll(wide_seq);
        if unrolled < self.next_feedback_seq {
            return;
        }
        self.arrivals.entry(unrolled).or_insert(arrival);
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        if self.arrivals.is_empty() {
            None
        } else {
            self.next_feedback_at
        }
    }

    /// Emits feedback covering everything recorded so far, consuming it.
    pub fn poll_feedback(&mut self, now: Instant) -> Option<TransportLayerCc> {
        if self.arrivals.is_empty() {
            return None;
        }
        if let Some(at) = self.next_feedback_at {
            if now < at {
                return None;
            }
        }
        self.next_feedback_at = Some(now + FEEDBACK_INTERVAL);
        let epoch = self.epoch?;

        let base_seq = *self.arrivals.keys().next()?;
        let end_seq = *self.arrivals.keys().next_back()? + 1;
        let packet_status_count = (end_seq - base_seq) as u16;

        let first_arrival = *self.arrivals.values().next()?;
        let reference_ticks =
            first_arrival.saturating_duration_since(epoch).as_millis() as i64
                / REFERENCE_TIME_UNIT.as_millis() as i64;
        let reference_time = (reference_ticks & 0x00ff_ffff) as u32;
        let mut reference_instant = epoch
            + Duration::from_millis((reference_ticks * REFERENCE_TIME_UNIT.as_millis() as i64) as u64);

        // Symbols and deltas for the covered range.
        let mut symbols = vec![];
        let mut deltas = vec![];
        for seq in base_seq..end_seq {
            match self.arrivals.get(&seq) {
                Some(&arrival) => {
                    let delta_us = arrival
                        .saturating_duration_since(reference_instant)
                        .as_micros() as i64;
                    let ticks = delta_us / TYPE_TCC_DELTA_SCALE_FACTOR;
                    let symbol = if (0..=255).contains(&ticks) {
                        SymbolType::ReceivedSmallDelta
                    } else {
                        SymbolType::ReceivedLargeDelta
                    };
                    symbols.push(symbol);
                    deltas.push(RecvDelta {
                        type_tcc: symbol,
                        delta_us: ticks * TYPE_TCC_DELTA_SCALE_FACTOR,
                    });
                    reference_instant = arrival;
                }
                None => symbols.push(SymbolType::NotReceived),
            }
        }

        let packet_chunks = pack_chunks(&symbols);
        let feedback = TransportLayerCc {
            sender_ssrc: self.sender_ssrc,
            media_ssrc: self.media_ssrc,
            base_sequence_number: (base_seq & 0xffff) as u16,
            packet_status_count,
            reference_time,
            fb_pkt_count: self.fb_pkt_count,
            packet_chunks,
            recv_deltas: deltas,
        };
        self.fb_pkt_count = self.fb_pkt_count.wrapping_add(1);
        self.next_feedback_seq = end_seq;
        self.arrivals.clear();
        Some(feedback)
    }
}

/// Packs a symbol sequence into run-length and 7-symbol vector chunks.
fn pack_chunks(symbols: &[SymbolType]) -> Vec<PacketStatusChunk> {
    let mut chunks = vec![];
    let mut rest = symbols;
    while !rest.is_empty() {
        let run = rest.iter().take_while(|&&s| s == rest[0]).count();
        if run >= 7 {
            let run = run.min(0x1fff);
            chunks.push(PacketStatusChunk::RunLength {
                symbol: rest[0],
                run_length: run as u16,
            });
            rest = &rest[run..];
        } else {
            let take = rest.len().min(7);
            let mut group: Vec<SymbolType> = rest[..take].to_vec();
            // Spare trailing symbols in a short final chunk are padding.
            group.resize(7, SymbolType::NotReceived);
            chunks.push(PacketStatusChunk::StatusVector { symbols: group });
            rest = &rest[take..];
        }
    }
    chunks
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TwccSendStats {
    pub acked: u64,
    pub lost: u64,
}

/// Sender half: stamps outgoing packets with the wide sequence number and
/// digests inbound feedback into loss counters. Congestion control proper
/// consumes these numbers; it is not part of the transport.
pub struct TwccSender {
    next_wide_seq: u16,
    stats: TwccSendStats,
}

impl TwccSender {
    pub fn new() -> Self {
        TwccSender {
            next_wide_seq: 0,
            stats: TwccSendStats::default(),
        }
    }

    pub fn next_sequence(&mut self) -> u16 {
        let seq = self.next_wide_seq;
        self.next_wide_seq = self.next_wide_seq.wrapping_add(1);
        seq
    }

    pub fn handle_feedback(&mut self, feedback: &TransportLayerCc) {
        let mut received = 0u64;
        for chunk in &feedback.packet_chunks {
            match chunk {
                PacketStatusChunk::RunLength { symbol, run_length } => {
                    if symbol.has_delta() {
                        received += *run_length as u64;
                    }
                }
                PacketStatusChunk::StatusVector { symbols } => {
                    received += symbols.iter().filter(|s| s.has_delta()).count() as u64;
                }
            }
        }
        let covered = feedback.packet_status_count as u64;
        self.stats.acked += received.min(covered);
        self.stats.lost += covered.saturating_sub(received);
    }

    pub fn stats(&self) -> TwccSendStats {
        self.stats
    }
}

impl Default for TwccSender {
    fn default() -> Self {
        Self::new()
    }
}
