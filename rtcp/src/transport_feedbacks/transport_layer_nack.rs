
use std::any::Any;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::Packet;

/// One Generic NACK FCI entry: a base sequence number and a bitmask of the
/// sixteen packets after it (RFC 4585 §6.2.1).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NackPair {
    pub packet_id: u16,
    pub lost_packets: u16,
}

impl NackPair {
    pub fn new(packet_id: u16) -> Self {
        NackPair {
            packet_id,
            lost_packets: 0,
        }
    }

    /// Every sequence number this pair flags as lost.
    pub fn packet_list(&self) -> Vec<u16> {
        let mut out = vec![self.packet_id];
        for bit in 0..16u16 {
            if self.lost_packets & (1 << bit) != 0 {
                out.push(self.packet_id.wrapping_add(bit + 1));
            }
        }
        out
    }
}

/// Packs an ascending run of lost sequence numbers into as few pairs as
/// the 17-packets-per-pair wire format allows.
pub fn nack_pairs_from_sequence_numbers(seqs: &[u16]) -> Vec<NackPair> {
    let mut pairs: Vec<NackPair> = vec![];
    for &seq in seqs {
        match pairs.last_mut() {
            Some(pair) => {
                let distance = seq.wrapping_sub(pair.packet_id);
                if distance > 0 && distance <= 16 {
                    pair.lost_packets |= 1 << (distance - 1);
                } else if distance != 0 {
                    pairs.push(NackPair::new(seq));
                }
            }
            None => pairs.push(NackPair::new(seq)),
        }
    }
    pairs
}

/// TransportLayerNack: a Generic NACK feedback packet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportLayerNack {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub nacks: Vec<NackPair>,
}

impl TransportLayerNack {
    fn body_size(&self) -> usize {
        8 + self.nacks.len() * 4
    }
}

impl Packet for TransportLayerNack {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_GENERIC_NACK,
            packet_type: PacketType::TransportSpecificFeedback,
            length: (self.body_size() / 4) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        vec![self.media_ssrc]
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

impl MarshalSize for TransportLayerNack {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH + self.body_size()
    }
}

impl Marshal for TransportLayerNack {
    fn marshal_to(&self, mut buf: &mut [u8]) -> util::Result<usize> {
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(Error::PacketTooShort.into());
        }
        let n = self.header().marshal_to(buf)?;
        buf = &mut buf[n..];
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        for nack in &self.nacks {
            buf.put_u16(nack.packet_id);
            buf.put_u16(nack.lost_packets);
        }
        Ok(size)
    }
}

impl Unmarshal for TransportLayerNack {
    fn unmarshal<B>(raw: &mut B) -> util::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let header = Header::unmarshal(raw)?;
        if header.packet_type != PacketType::TransportSpecificFeedback
            || header.count != FORMAT_GENERIC_NACK
        {
            return Err(Error::WrongType.into());
        }
        if raw.remaining() < 8 || (raw.remaining() - 8) % 4 != 0 {
            return Err(Error::PacketTooShort.into());
        }
        let sender_ssrc = raw.get_u32();
        let media_ssrc = raw.get_u32();
        let mut nacks = vec![];
        while raw.remaining() >= 4 {
            nacks.push(NackPair {
                packet_id: raw.get_u16(),
                lost_packets: raw.get_u16(),
            });
        }
        Ok(TransportLayerNack {
            sender_ssrc,
            media_ssrc,
            nacks,
        })
    }
}
