use std::any::Any;

use bytes::{Buf, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::Packet;

/// An RTCP packet type this crate does not interpret, carried opaquely so
/// compound parsing can continue past it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RawPacket(pub Bytes);

impl Packet for RawPacket {
    fn header(&self) -> Header {
        let mut buf = &self.0[..];
        Header::unmarshal(&mut buf).unwrap_or_default()
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        vec![]
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

impl MarshalSize for RawPacket {
    fn marshal_size(&self) -> usize {
        self.0.len()
    }
}

impl Marshal for RawPacket {
    fn marshal_to(&self, buf: &mut [u8]) -> util::Result<usize> {
        if buf.len() < self.0.len() {
            return Err(Error::PacketTooShort.into());
        }
        buf[..self.0.len()].copy_from_slice(&self.0);
        Ok(self.0.len())
    }
}

impl Unmarshal for RawPacket {
    fn unmarshal<B>(raw: &mut B) -> util::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if raw.remaining() < HEADER_LENGTH {
            return Err(Error::PacketTooShort.into());
        }
        Ok(RawPacket(raw.copy_to_bytes(raw.remaining())))
    }
}
