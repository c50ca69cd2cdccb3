#[cfg(test)]
mod receiver_estimated_maximum_bitrate_test;

use std::any::Any;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::Packet;

const UNIQUE_IDENTIFIER: [u8; 4] = *b"REMB";

/// ReceiverEstimatedMaximumBitrate (draft-alvestrand-rmcat-remb-03): an
/// aggregate bitrate cap in bits per second over the listed SSRCs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReceiverEstimatedMaximumBitrate {
    pub sender_ssrc: u32,
    /// Estimated bitrate in bits per second.
    pub bitrate: u64,
    pub ssrcs: Vec<u32>,
}

impl ReceiverEstimatedMaximumBitrate {
    fn body_size(&self) -> usize {
        16 + self.ssrcs.len() * 4
    }

    /// Splits the bitrate into the 6-bit exponent and 18-bit mantissa used
    /// on the wire. Rounds up so the cap is never understated.
    fn exp_mantissa(&self) -> (u8, u32) {
        let mut exp = 0u8;
        let mut mantissa = self.bitrate;
        while mantissa >= (1 << 18) {
            mantissa = (mantissa + 1) >> 1;
            exp += 1;
        }
        (exp, mantissa as u32)
    }
}

impl Packet for ReceiverEstimatedMaximumBitrate {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_REMB,
            packet_type: PacketType::PayloadSpecificFeedback,
            length: (self.body_size() / 4) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        self.ssrcs.clone()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

impl MarshalSize for ReceiverEstimatedMaximumBitrate {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH + self.body_size()
    }
}

impl Marshal for ReceiverEstimatedMaximumBitrate {
    fn marshal_to(&self, mut buf: &mut [u8]) -> util::Result<usize> {
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(Error::PacketTooShort.into());
        }
        let n = self.header().marshal_to(buf)?;
        buf = &mut buf[n..];
        buf.put_u32(self.sender_ssrc);
        // media SSRC is always zero for REMB.
        buf.put_u32(0);
        buf.put_slice(&UNIQUE_IDENTIFIER);
        let (exp, mantissa) = self.exp_mantissa();
        buf.put_u8(self.ssrcs.len() as u8);
        buf.put_u8((exp << 2) | (mantissa >> 16) as u8);
        buf.put_u16(mantissa as u16);
        for ssrc in &self.ssrcs {
            buf.put_u32(*ssrc);
        }
        Ok(size)
    }
}

impl Unmarshal for ReceiverEstimatedMaximumBitrate {
    fn unmarshal<B>(raw: &mut B) -> util::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let header = Header::unmarshal(raw)?;
        if header.packet_type != PacketType::PayloadSpecificFeedback
            || header.count != FORMAT_REMB
        {
            return Err(Error::WrongType.into());
        }
        if raw.remaining() < 16 {
            return Err(Error::PacketTooShort.into());
        }
        let sender_ssrc = raw.get_u32();
        let _media_ssrc = raw.get_u32();
        let mut ident = [0u8; 4];
        raw.copy_to_slice(&mut ident);
        if ident != UNIQUE_IDENTIFIER {
            return Err(Error::BadRembIdentifier.into());
        }
        let num_ssrc = raw.get_u8() as usize;
        let b = raw.get_u8();
        let exp = b >> 2;
        let mantissa = (((b & 0x03) as u64) << 16) | raw.get_u16() as u64;
        let bitrate = mantissa << exp;
        if raw.remaining() < num_ssrc * 4 {
            return Err(Error::PacketTooShort.into());
        }
        let ssrcs = (0..num_ssrc).map(|_| raw.get_u32()).collect();
        Ok(ReceiverEstimatedMaximumBitrate {
            sender_ssrc,
            bitrate,
            ssrcs,
        })
    }
}
