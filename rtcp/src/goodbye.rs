use std::any::Any;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::Packet;

/// Goodbye (RFC 3550 §6.6), sent when a source leaves the session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Goodbye {
    pub sources: Vec<u32>,
    pub reason: String,
}

impl Goodbye {
    fn body_size(&self) -> usize {
        let mut size = self.sources.len() * SSRC_LENGTH;
        if !self.reason.is_empty() {
            size += (1 + self.reason.len() + 3) / 4 * 4;
        }
        size
    }
}

impl Packet for Goodbye {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: self.sources.len() as u8,
            packet_type: PacketType::Goodbye,
            length: (self.body_size() / 4) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        self.sources.clone()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

impl MarshalSize for Goodbye {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH + self.body_size()
    }
}

impl Marshal for Goodbye {
    fn marshal_to(&self, mut buf: &mut [u8]) -> util::Result<usize> {
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(Error::PacketTooShort.into());
        }
        if self.reason.len() > 255 {
            return Err(Error::SdesTextTooLong.into());
        }
        let n = self.header().marshal_to(buf)?;
        buf = &mut buf[n..];
        for ssrc in &self.sources {
            buf.put_u32(*ssrc);
        }
        if !self.reason.is_empty() {
            buf.put_u8(self.reason.len() as u8);
            buf.put_slice(self.reason.as_bytes());
            let mut written = 1 + self.reason.len();
            while written % 4 != 0 {
                buf.put_u8(0);
                written += 1;
            }
        }
        Ok(size)
    }
}

impl Unmarshal for Goodbye {
    fn unmarshal<B>(raw: &mut B) -> util::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let header = Header::unmarshal(raw)?;
        if header.packet_type != PacketType::Goodbye {
            return Err(Error::WrongType.into());
        }
        if raw.remaining() < header.count as usize * SSRC_LENGTH {
            return Err(Error::PacketTooShort.into());
        }
        let sources = (0..header.count).map(|_| raw.get_u32()).collect();
        let mut reason = String::new();
        if raw.has_remaining() {
            let len = raw.get_u8() as usize;
            if raw.remaining() < len {
                return Err(Error::PacketTooShort.into());
            }
            reason = String::from_utf8(raw.copy_to_bytes(len).to_vec())
                .map_err(|_| util::Error::from(Error::PacketTooShort))?;
        }
        Ok(Goodbye { sources, reason })
    }
}
