use std::any::Any;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::Packet;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FirEntry {
    pub ssrc: u32,
    pub sequence_number: u8,
}

/// FullIntraRequest (RFC 5104 §4.3.1): a decoder refresh request carrying
/// a command sequence number per target SSRC.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FullIntraRequest {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub fir: Vec<FirEntry>,
}

impl FullIntraRequest {
    fn body_size(&self) -> usize {
        8 + self.fir.len() * 8
    }
}

impl Packet for FullIntraRequest {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_FIR,
            packet_type: PacketType::PayloadSpecificFeedback,
            length: (self.body_size() / 4) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        self.fir.iter().map(|f| f.ssrc).collect()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

impl MarshalSize for FullIntraRequest {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH + self.body_size()
    }
}

impl Marshal for FullIntraRequest {
    fn marshal_to(&self, mut buf: &mut [u8]) -> util::Result<usize> {
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(Error::PacketTooShort.into());
        }
        let n = self.header().marshal_to(buf)?;
        buf = &mut buf[n..];
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        for entry in &self.fir {
            buf.put_u32(entry.ssrc);
            buf.put_u8(entry.sequence_number);
            buf.put_u8(0);
            buf.put_u16(0);
        }
        Ok(size)
    }
}

impl Unmarshal for FullIntraRequest {
    fn unmarshal<B>(raw: &mut B) -> util::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let header = Header::unmarshal(raw)?;
        if header.packet_type != PacketType::PayloadSpecificFeedback
            || header.count != FORMAT_FIR
        {
            return Err(Error::WrongType.into());
        }
        if raw.remaining() < 8 || (raw.remaining() - 8) % 8 != 0 {
            return Err(Error::PacketTooShort.into());
        }
        let sender_ssrc = raw.get_u32();
        let media_ssrc = raw.get_u32();
        let mut fir = vec![];
        while raw.remaining() >= 8 {
            let ssrc = raw.get_u32();
            let sequence_number = raw.get_u8();
            raw.get_u8();
            raw.get_u16();
            fir.push(FirEntry {
                ssrc,
                sequence_number,
            });
        }
        Ok(FullIntraRequest {
            sender_ssrc,
            media_ssrc,
            fir,
        })
    }
}
