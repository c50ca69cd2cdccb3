#[cfg(test)]
mod packet_test;

use bytes::BufMut;
use crc::{Crc, CRC_32_ISCSI};

use crate::chunk::{split_chunks, RawChunk};
use crate::error::Error;
use crate::Result;

pub const COMMON_HEADER_SIZE: usize = 12;

const CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// An SCTP packet: common header plus chunks (RFC 4960 §3.1). Ports are
/// fixed at 5000 for the DTLS-encapsulated transport (RFC 8261 leaves
/// them meaningless).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub source_port: u16,
    pub destination_port: u16,
    pub verification_tag: u32,
    pub chunks: Vec<RawChunk>,
}

impl Packet {
    pub fn new(verification_tag: u32, chunks: Vec<RawChunk>) -> Self {
        Packet {
            source_port: 5000,
            destination_port: 5000,
            verification_tag,
            chunks,
        }
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            COMMON_HEADER_SIZE + self.chunks.iter().map(|c| c.wire_size()).sum::<usize>(),
        );
        out.put_u16(self.source_port);
        out.put_u16(self.destination_port);
        out.put_u32(self.verification_tag);
        out.put_u32(0); // checksum patched below
        for chunk in &self.chunks {
            chunk.marshal_to(&mut out);
        }
        let checksum = CRC32C.checksum(&out);
        out[8..12].copy_from_slice(&checksum.to_le_bytes());
        out
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < COMMON_HEADER_SIZE {
            return Err(Error::ShortPacket);
        }
        let mut zeroed = raw.to_vec();
        zeroed[8..12].fill(0);
        let expected = CRC32C.checksum(&zeroed);
        let got = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]);
        if expected != got {
            return Err(Error::ChecksumMismatch);
        }
        Ok(Packet {
            source_port: u16::from_be_bytes([raw[0], raw[1]]),
            destination_port: u16::from_be_bytes([raw[2], raw[3]]),
            verification_tag: u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]),
            chunks: split_chunks(&raw[COMMON_HEADER_SIZE..])?,
        })
    }
}
