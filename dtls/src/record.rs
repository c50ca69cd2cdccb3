#[cfg(test)]
mod record_test;

use crate::error::Error;
use crate::Result;

pub const RECORD_HEADER_SIZE: usize = 13;
/// DTLS 1.2 on the wire.
pub const PROTOCOL_VERSION: (u8, u8) = (254, 253);
/// DTLS 1.0, used in initial ClientHello record headers for compatibility.
pub const PROTOCOL_VERSION_1_0: (u8, u8) = (254, 255);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
}

impl ContentType {
    pub fn value(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
        }
    }

    pub fn from_value(v: u8) -> Result<Self> {
        match v {
            20 => Ok(ContentType::ChangeCipherSpec),
            21 => Ok(ContentType::Alert),
            22 => Ok(ContentType::Handshake),
            23 => Ok(ContentType::ApplicationData),
            _ => Err(Error::BadRecord),
        }
    }
}

/// DTLS record header (RFC 6347 §4.1): content type, version, 16-bit
/// epoch, 48-bit sequence number, payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub epoch: u16,
    pub sequence: u64,
    pub length: u16,
}

impl RecordHeader {
    pub fn marshal(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut out = [0u8; RECORD_HEADER_SIZE];
        out[0] = self.content_type.value();
        out[1] = PROTOCOL_VERSION.0;
        out[2] = PROTOCOL_VERSION.1;
        out[3..5].copy_from_slice(&self.epoch.to_be_bytes());
        out[5..11].copy_from_slice(&self.sequence.to_be_bytes()[2..8]);
        out[11..13].copy_from_slice(&self.length.to_be_bytes());
        out
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < RECORD_HEADER_SIZE {
            return Err(Error::BadRecord);
        }
        let content_type = ContentType::from_value(raw[0])?;
        if raw[1] != 254 {
            return Err(Error::BadRecord);
        }
        let epoch = u16::from_be_bytes([raw[3], raw[4]]);
        let mut seq = [0u8; 8];
        seq[2..8].copy_from_slice(&raw[5..11]);
        Ok(RecordHeader {
            content_type,
            epoch,
            sequence: u64::from_be_bytes(seq),
            length: u16::from_be_bytes([raw[11], raw[12]]),
        })
    }
}

/// One record: header plus (possibly encrypted) payload.
#[derive(Debug, Clone)]
pub struct Record {
    pub header: RecordHeader,
    pub payload: Vec<u8>,
}

/// Splits a datagram into the records it carries.
pub fn split_datagram(datagram: &[u8]) -> Result<Vec<Record>> {
    let mut records = vec![];
    let mut rest = datagram;
    while !rest.is_empty() {
        let header = RecordHeader::unmarshal(rest)?;
        let total = RECORD_HEADER_SIZE + header.length as usize;
        if rest.len() < total {
            return Err(Error::BadRecord);
        }
        records.push(Record {
            header,
            payload: rest[RECORD_HEADER_SIZE..total].to_vec(),
        });
        rest = &rest[total..];
    }
    Ok(records)
}
