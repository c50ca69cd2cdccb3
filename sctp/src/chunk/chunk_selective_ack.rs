use bytes::BufMut;

use crate::error::Error;
use crate::Result;

/// One gap ack block: offsets relative to the cumulative TSN ack.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GapAckBlock {
    pub start: u16,
    pub end: u16,
}

/// SACK chunk (RFC 4960 §3.3.4).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkSelectiveAck {
    pub cumulative_tsn_ack: u32,
    pub advertised_receiver_window: u32,
    pub gap_ack_blocks: Vec<GapAckBlock>,
    pub duplicate_tsns: Vec<u32>,
}

impl ChunkSelectiveAck {
    pub fn parse(value: &[u8]) -> Result<Self> {
        if value.len() < 12 {
            return Err(Error::BadChunk);
        }
        let cumulative_tsn_ack = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
        let advertised_receiver_window =
            u32::from_be_bytes([value[4], value[5], value[6], value[7]]);
        let num_gaps = u16::from_be_bytes([value[8], value[9]]) as usize;
        let num_dups = u16::from_be_bytes([value[10], value[11]]) as usize;
        if value.len() < 12 + num_gaps * 4 + num_dups * 4 {
            return Err(Error::BadChunk);
        }
        let mut at = 12;
        let mut gap_ack_blocks = Vec::with_capacity(num_gaps);
        for _ in 0..num_gaps {
            gap_ack_blocks.push(GapAckBlock {
                start: u16::from_be_bytes([value[at], value[at + 1]]),
                end: u16::from_be_bytes([value[at + 2], value[at + 3]]),
            });
            at += 4;
        }
        let mut duplicate_tsns = Vec::with_capacity(num_dups);
        for _ in 0..num_dups {
            duplicate_tsns.push(u32::from_be_bytes([
                value[at],
                value[at + 1],
                value[at + 2],
                value[at + 3],
            ]));
            at += 4;
        }
        Ok(ChunkSelectiveAck {
            cumulative_tsn_ack,
            advertised_receiver_window,
            gap_ack_blocks,
            duplicate_tsns,
        })
    }

    pub fn value(&self) -> Vec<u8> {
        let mut out = vec![];
        out.put_u32(self.cumulative_tsn_ack);
        out.put_u32(self.advertised_receiver_window);
        out.put_u16(self.gap_ack_blocks.len() as u16);
        out.put_u16(self.duplicate_tsns.len() as u16);
        for gap in &self.gap_ack_blocks {
            out.put_u16(gap.start);
            out.put_u16(gap.end);
        }
        for dup in &self.duplicate_tsns {
            out.put_u32(*dup);
        }
        out
    }
}
