#[cfg(test)]
mod reassembly_test;

use std::collections::{BTreeMap, HashMap};

use bytes::{Bytes, BytesMut};

use crate::chunk::ChunkPayloadData;
use crate::{ssn_lt, tsn_le};

/// A fully reassembled user message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    pub stream_id: u16,
    pub ppid: u32,
    pub unordered: bool,
    pub data: Bytes,
}

/// Fragment reassembly plus per-stream ordered delivery.
///
/// Fragments are keyed by TSN; a message spans a run of consecutive TSNs
/// from a B-flagged chunk to an E-flagged one. Ordered messages then wait
/// for their stream sequence number to come up.
#[derive(Default)]
pub struct ReassemblyQueue {
    fragments: BTreeMap<u32, ChunkPayloadData>,
    pending_ordered: HashMap<u16, BTreeMap<u16, (u32, Bytes)>>,
    next_ssn: HashMap<u16, u16>,
}

impl ReassemblyQueue {
    /// Buffers one DATA chunk and returns whatever messages became
    /// deliverable.
    pub fn push(&mut self, chunk: ChunkPayloadData) -> Vec<AssembledMessage> {
        let tsn = chunk.tsn;
        self.fragments.insert(tsn, chunk);
        let Some((start, end)) = self.complete_run_around(tsn) else {
            return vec![];
        };

        let mut data = BytesMut::new();
        let mut head = None;
        let mut cursor = start;
        loop {
            let fragment = self
                .fragments
                .remove(&cursor)
                .expect("run verified complete");
            data.extend_from_slice(&fragment.user_data);
            if cursor == start {
                head = Some(fragment);
            }
            if cursor == end {
                break;
            }
            cursor = cursor.wrapping_add(1);
        }
        let head = head.expect("run is non-empty");
        let message = AssembledMessage {
            stream_id: head.stream_identifier,
            ppid: head.payload_protocol_identifier,
            unordered: head.unordered,
            data: data.freeze(),
        };

        if message.unordered {
            return vec![message];
        }
        self.enqueue_ordered(head.stream_identifier, head.stream_sequence_number, message)
    }

    /// Finds the complete B..E run containing `tsn`, if every fragment of
    /// it has arrived.
    fn complete_run_around(&self, tsn: u32) -> Option<(u32, u32)> {
        let mut start = tsn;
        loop {
            let fragment = self.fragments.get(&start)?;
            if fragment.beginning_fragment {
                break;
            }
            let prev = start.wrapping_sub(1);
            let prev_fragment = self.fragments.get(&prev)?;
            if prev_fragment.ending_fragment {
                // The previous message's tail; this run has no beginning.
                return None;
            }
            start = prev;
        }
        let mut end = tsn;
        loop {
            let fragment = self.fragments.get(&end)?;
            if fragment.ending_fragment {
                break;
            }
            end = end.wrapping_add(1);
        }
        Some((start, end))
    }

    fn enqueue_ordered(
        &mut self,
        stream_id: u16,
        ssn: u16,
        message: AssembledMessage,
    ) -> Vec<AssembledMessage> {
        let next = self.next_ssn.entry(stream_id).or_insert(0);
        if ssn_lt(ssn, *next) {
            // Stale: already skipped via FORWARD-TSN.
            return vec![];
        }
        self.pending_ordered
            .entry(stream_id)
            .or_default()
            .insert(ssn, (message.ppid, message.data));
        self.drain_ordered(stream_id)
    }

    fn drain_ordered(&mut self, stream_id: u16) -> Vec<AssembledMessage> {
        let mut out = vec![];
        let next = self.next_ssn.entry(stream_id).or_insert(0);
        if let Some(pending) = self.pending_ordered.get_mut(&stream_id) {
            while let Some((ppid, data)) = pending.remove(next) {
                out.push(AssembledMessage {
                    stream_id,
                    ppid,
                    unordered: false,
                    data,
                });
                *next = next.wrapping_add(1);
            }
        }
        out
    }

    /// FORWARD-TSN handling: skip ordered delivery up to `ssn` on the
    /// stream and flush whatever is now in order.
    pub fn advance_ordered(&mut self, stream_id: u16, ssn: u16) -> Vec<AssembledMessage> {
        let next = self.next_ssn.entry(stream_id).or_insert(0);
        if !ssn_lt(ssn, *next) {
            *next = ssn.wrapping_add(1);
        }
        if let Some(pending) = self.pending_ordered.get_mut(&stream_id) {
            let next = *self.next_ssn.get(&stream_id).unwrap_or(&0);
            pending.retain(|&s, _| !ssn_lt(s, next));
        }
        self.drain_ordered(stream_id)
    }

    /// Drops buffered fragments made obsolete by a FORWARD-TSN.
    pub fn drop_fragments_up_to(&mut self, tsn: u32) {
        self.fragments.retain(|&t, _| !tsn_le(t, tsn));
    }

    /// Incoming stream reset: ordered delivery starts over at zero.
    pub fn reset_stream(&mut self, stream_id: u16) {
        self.next_ssn.insert(stream_id, 0);
        self.pending_ordered.remove(&stream_id);
    }

    pub fn buffered_fragments(&self) -> usize {
        self.fragments.len()
    }
}
