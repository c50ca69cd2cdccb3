#[cfg(test)]
mod header_test;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;

pub const HEADER_LENGTH: usize = 4;
pub const VERSION: u8 = 2;
pub const SSRC_LENGTH: usize = 4;

/// RTCP packet types (RFC 3550 + RFC 4585).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    #[default]
    Unsupported,
    SenderReport,
    ReceiverReport,
    SourceDescription,
    Goodbye,
    ApplicationDefined,
    TransportSpecificFeedback,
    PayloadSpecificFeedback,
}

impl PacketType {
    pub fn value(&self) -> u8 {
        match self {
            PacketType::Unsupported => 0,
            PacketType::SenderReport => 200,
            PacketType::ReceiverReport => 201,
            PacketType::SourceDescription => 202,
            PacketType::Goodbye => 203,
            PacketType::ApplicationDefined => 204,
            PacketType::TransportSpecificFeedback => 205,
            PacketType::PayloadSpecificFeedback => 206,
        }
    }
}

impl From<u8> for PacketType {
    fn from(b: u8) -> Self {
        match b {
            200 => PacketType::SenderReport,
            201 => PacketType::ReceiverReport,
            202 => PacketType::SourceDescription,
            203 => PacketType::Goodbye,
            204 => PacketType::ApplicationDefined,
            205 => PacketType::TransportSpecificFeedback,
            206 => PacketType::PayloadSpecificFeedback,
            _ => PacketType::Unsupported,
        }
    }
}

/// Feedback message types within PT 205 (RFC 4585 §6.2).
pub const FORMAT_GENERIC_NACK: u8 = 1;
pub const FORMAT_TWCC: u8 = 15;
/// Feedback message types within PT 206.
pub const FORMAT_PLI: u8 = 1;
pub const FORMAT_FIR: u8 = 4;
pub const FORMAT_REMB: u8 = 15;

/// The common four-byte RTCP header. `count` doubles as the feedback
/// format for PT 205/206.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub padding: bool,
    pub count: u8,
    pub packet_type: PacketType,
    /// Packet length in 32-bit words, not counting this header word.
    pub length: u16,
}

impl MarshalSize for Header {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH
    }
}

impl Marshal for Header {
    fn marshal_to(&self, mut buf: &mut [u8]) -> util::Result<usize> {
        if buf.len() < HEADER_LENGTH {
            return Err(Error::PacketTooShort.into());
        }
        if self.count > 0x1f {
            return Err(Error::TooManySources.into());
        }
        let mut b0 = (VERSION << 6) | self.count;
        if self.padding {
            b0 |= 1 << 5;
        }
        buf.put_u8(b0);
        buf.put_u8(self.packet_type.value());
        buf.put_u16(self.length);
        Ok(HEADER_LENGTH)
    }
}

impl Unmarshal for Header {
    fn unmarshal<B>(buf: &mut B) -> util::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if buf.remaining() < HEADER_LENGTH {
            return Err(Error::PacketTooShort.into());
        }
        let b0 = buf.get_u8();
        if b0 >> 6 != VERSION {
            return Err(Error::BadVersion.into());
        }
        Ok(Header {
            padding: b0 & (1 << 5) != 0,
            count: b0 & 0x1f,
            packet_type: PacketType::from(buf.get_u8()),
            length: buf.get_u16(),
        })
    }
}
