#[cfg(test)]
mod rtx_test;

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};
use rtp::packet::Packet;
use rtp::sequence::Sequencer;

const HISTORY_LIMIT: usize = 512;

/// Retransmission sender (RFC 4588): retains recently sent primary
/// packets and re-encapsulates them on the RTX SSRC when NACKed. The
/// original sequence number rides in the first two payload bytes.
pub struct RtxSender {
    rtx_ssrc: u32,
    rtx_payload_type: u8,
    sequencer: Sequencer,
    history: BTreeMap<u16, Packet>,
    order: Vec<u16>,
    pub retransmitted: u64,
}

impl RtxSender {
    pub fn new(rtx_ssrc: u32, rtx_payload_type: u8) -> Self {
        RtxSender {
            rtx_ssrc,
            rtx_payload_type,
            sequencer: Sequencer::new(),
            history: BTreeMap::new(),
            order: vec![],
            retransmitted: 0,
        }
    }

    /// Remembers an outgoing primary packet.
    pub fn record(&mut self, packet: &Packet) {
        let seq = packet.header.sequence_number;
        if self.history.insert(seq, packet.clone()).is_none() {
            self.order.push(seq);
        }
        while self.order.len() > HISTORY_LIMIT {
            let oldest = self.order.remove(0);
            self.history.remove(&oldest);
        }
    }

    /// Builds RTX packets for the NACKed sequence numbers still in the
    /// history window.
    pub fn resend(&mut self, sequences: &[u16]) -> Vec<Packet> {
        let mut out = vec![];
        for &seq in sequences {
            let Some(original) = self.history.get(&seq) else {
                continue;
            };
            let mut payload = BytesMut::with_capacity(2 + original.payload.len());
            payload.put_u16(seq);
            payload.extend_from_slice(&original.payload);

            let mut header = original.header.clone();
            header.ssrc = self.rtx_ssrc;
            header.payload_type = self.rtx_payload_type;
            header.sequence_number = self.sequencer.next_sequence_number();
            out.push(Packet {
                header,
                payload: payload.freeze(),
            });
            self.retransmitted += 1;
        }
        out
    }
}

/// Receiver side: restores the primary packet from an RTX encapsulation.
pub fn unwrap_rtx(packet: &Packet, primary_ssrc: u32, primary_payload_type: u8) -> Option<Packet> {
    if packet.payload.len() < 2 {
        return None;
    }
    let original_seq = u16::from_be_bytes([packet.payload[0], packet.payload[1]]);
    let mut header = packet.header.clone();
    header.ssrc = primary_ssrc;
    header.payload_type = primary_payload_type;
    header.sequence_number = original_seq;
    Some(Packet {
        header,
        payload: Bytes::copy_from_slice(&packet.payload[2..]),
    })
}
