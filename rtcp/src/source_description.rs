#[cfg(test)]
mod source_description_test;

use std::any::Any;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::Packet;

pub const SDES_TYPE_END: u8 = 0;
pub const SDES_TYPE_CNAME: u8 = 1;

/// One SDES item: a type tag and up to 255 octets of UTF-8 text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceDescriptionItem {
    pub sdes_type: u8,
    pub text: String,
}

/// An SSRC and its item list. Chunks pad to a 32-bit boundary with at
/// least one END octet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceDescriptionChunk {
    pub source: u32,
    pub items: Vec<SourceDescriptionItem>,
}

impl SourceDescriptionChunk {
    fn raw_size(&self) -> usize {
        let items: usize = self.items.iter().map(|i| 2 + i.text.len()).sum();
        // SSRC + items + END, padded up.
        (4 + items + 1 + 3) / 4 * 4
    }
}

/// SourceDescription (RFC 3550 §6.5). Every compound we emit carries one
/// with a CNAME item.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceDescription {
    pub chunks: Vec<SourceDescriptionChunk>,
}

impl SourceDescription {
    pub fn cname(ssrc: u32, cname: &str) -> Self {
        SourceDescription {
            chunks: vec![SourceDescriptionChunk {
                source: ssrc,
                items: vec![SourceDescriptionItem {
                    sdes_type: SDES_TYPE_CNAME,
                    text: cname.to_owned(),
                }],
            }],
        }
    }

    fn body_size(&self) -> usize {
        self.chunks.iter().map(|c| c.raw_size()).sum()
    }
}

impl Packet for SourceDescription {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: self.chunks.len() as u8,
            packet_type: PacketType::SourceDescription,
            length: (self.body_size() / 4) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        self.chunks.iter().map(|c| c.source).collect()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

impl MarshalSize for SourceDescription {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH + self.body_size()
    }
}

impl Marshal for SourceDescription {
    fn marshal_to(&self, mut buf: &mut [u8]) -> util::Result<usize> {
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(Error::PacketTooShort.into());
        }
        for item in self.chunks.iter().flat_map(|c| &c.items) {
            if item.text.len() > 255 {
                return Err(Error::SdesTextTooLong.into());
            }
        }
        let n = self.header().marshal_to(buf)?;
        buf = &mut buf[n..];
        for chunk in &self.chunks {
            buf.put_u32(chunk.source);
            let mut written = 4;
            for item in &chunk.items {
                buf.put_u8(item.sdes_type);
                buf.put_u8(item.text.len() as u8);
                buf.put_slice(item.text.as_bytes());
                written += 2 + item.text.len();
            }
            // END plus padding to the word boundary.
            let padded = chunk.raw_size();
            while written < padded {
                buf.put_u8(SDES_TYPE_END);
                written += 1;
            }
        }
        Ok(size)
    }
}

impl Unmarshal for SourceDescription {
    fn unmarshal<B>(raw: &mut B) -> util::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let header = Header::unmarshal(raw)?;
        if header.packet_type != PacketType::SourceDescription {
            return Err(Error::WrongType.into());
        }
        let mut chunks = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            if raw.remaining() < 4 {
                return Err(Error::PacketTooShort.into());
            }
            let source = raw.get_u32();
            let mut consumed = 4usize;
            let mut items = vec![];
            loop {
                if raw.remaining() < 1 {
                    return Err(Error::PacketTooShort.into());
                }
                let sdes_type = raw.get_u8();
                consumed += 1;
                if sdes_type == SDES_TYPE_END {
                    break;
                }
                if raw.remaining() < 1 {
                    return Err(Error::PacketTooShort.into());
                }
                let len = raw.get_u8() as usize;
                consumed += 1;
                if raw.remaining() < len {
                    return Err(Error::PacketTooShort.into());
                }
                let text = String::from_utf8(raw.copy_to_bytes(len).to_vec())
                    .map_err(|_| util::Error::from(Error::PacketTooShort))?;
                consumed += len;
                items.push(SourceDescriptionItem { sdes_type, text });
            }
            // Consume chunk padding.
            while consumed % 4 != 0 {
                if raw.remaining() < 1 {
                    return Err(Error::PacketTooShort.into());
                }
                raw.get_u8();
                consumed += 1;
            }
            chunks.push(SourceDescriptionChunk { source, items });
        }
        Ok(SourceDescription { chunks })
    }
}
