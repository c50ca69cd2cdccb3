
use std::any::Any;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::Packet;

const PLI_LENGTH: usize = 8;

/// PictureLossIndication (RFC 4585 §6.3.1): the receiver asks the sender
/// for a new keyframe.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PictureLossIndication {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
}

impl Packet for PictureLossIndication {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_PLI,
            packet_type: PacketType::PayloadSpecificFeedback,
            length: (PLI_LENGTH / 4) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        vec![self.media_ssrc]
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

impl MarshalSize for PictureLossIndication {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH + PLI_LENGTH
    }
}

impl Marshal for PictureLossIndication {
    fn marshal_to(&self, mut buf: &mut [u8]) -> util::Result<usize> {
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(Error::PacketTooShort.into());
        }
        let n = self.header().marshal_to(buf)?;
        buf = &mut buf[n..];
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        Ok(size)
    }
}

impl Unmarshal for PictureLossIndication {
    fn unmarshal<B>(raw: &mut B) -> util::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let header = Header::unmarshal(raw)?;
        if header.packet_type != PacketType::PayloadSpecificFeedback
            || header.count != FORMAT_PLI
        {
            return Err(Error::WrongType.into());
        }
        if raw.remaining() < PLI_LENGTH {
            return Err(Error::PacketTooShort.into());
        }
        Ok(PictureLossIndication {
            sender_ssrc: raw.get_u32(),
            media_ssrc: raw.get_u32(),
        })
    }
}
