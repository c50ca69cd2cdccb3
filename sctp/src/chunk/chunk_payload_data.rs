use bytes::{BufMut, Bytes};

use crate::error::Error;
use crate::Result;

pub const FLAG_END_FRAGMENT: u8 = 0x01;
pub const FLAG_BEGIN_FRAGMENT: u8 = 0x02;
pub const FLAG_UNORDERED: u8 = 0x04;

pub const PAYLOAD_DATA_HEADER_SIZE: usize = 12;

/// DATA chunk (RFC 4960 §3.3.1).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkPayloadData {
    pub unordered: bool,
    pub beginning_fragment: bool,
    pub ending_fragment: bool,
    pub tsn: u32,
    pub stream_identifier: u16,
    pub stream_sequence_number: u16,
    pub payload_protocol_identifier: u32,
    pub user_data: Bytes,
}

impl ChunkPayloadData {
    pub fn parse(flags: u8, value: &[u8]) -> Result<Self> {
        if value.len() < PAYLOAD_DATA_HEADER_SIZE {
            return Err(Error::BadChunk);
        }
        Ok(ChunkPayloadData {
            unordered: flags & FLAG_UNORDERED != 0,
            beginning_fragment: flags & FLAG_BEGIN_FRAGMENT != 0,
            ending_fragment: flags & FLAG_END_FRAGMENT != 0,
            tsn: u32::from_be_bytes([value[0], value[1], value[2], value[3]]),
            stream_identifier: u16::from_be_bytes([value[4], value[5]]),
            stream_sequence_number: u16::from_be_bytes([value[6], value[7]]),
            payload_protocol_identifier: u32::from_be_bytes([
                value[8], value[9], value[10], value[11],
            ]),
            user_data: Bytes::copy_from_slice(&value[PAYLOAD_DATA_HEADER_SIZE..]),
        })
    }

    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.unordered {
            flags |= FLAG_UNORDERED;
        }
        if self.beginning_fragment {
            flags |= FLAG_BEGIN_FRAGMENT;
        }
        if self.ending_fragment {
            flags |= FLAG_END_FRAGMENT;
        }
        flags
    }

    pub fn value(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PAYLOAD_DATA_HEADER_SIZE + self.user_data.len());
        out.put_u32(self.tsn);
        out.put_u16(self.stream_identifier);
        out.put_u16(self.stream_sequence_number);
        out.put_u32(self.payload_protocol_identifier);
        out.extend_from_slice(&self.user_data);
        out
    }
}
