#[cfg(test)]
mod packet_test;

use std::fmt;

use bytes::{Buf, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::Header;

/// A parsed RTP packet: header plus opaque payload.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Bytes,
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RTP pt={} ssrc={:#010x} seq={} ts={} marker={} payload={}B",
            self.header.payload_type,
            self.header.ssrc,
            self.header.sequence_number,
            self.header.timestamp,
            self.header.marker,
            self.payload.len(),
        )
    }
}

impl MarshalSize for Packet {
    fn marshal_size(&self) -> usize {
        self.header.marshal_size() + self.payload.len()
    }
}

impl Marshal for Packet {
    fn marshal_to(&self, buf: &mut [u8]) -> util::Result<usize> {
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(util::Error::UnexpectedEndOfBuffer {
                expected: size,
                actual: buf.len(),
            });
        }
        let n = self.header.marshal_to(buf)?;
        buf[n..n + self.payload.len()].copy_from_slice(&self.payload);
        Ok(size)
    }
}

impl Unmarshal for Packet {
    /// Parses an RTP packet, stripping trailing padding when the P bit is
    /// set.
    fn unmarshal<B>(raw: &mut B) -> util::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let header = Header::unmarshal(raw)?;
        let mut payload = raw.copy_to_bytes(raw.remaining());
        if header.padding {
            let pad_len = *payload.last().ok_or(Error::BadPadding)? as usize;
            if pad_len == 0 || pad_len > payload.len() {
                return Err(Error::BadPadding.into());
            }
            payload = payload.slice(..payload.len() - pad_len);
        }
        Ok(Packet { header, payload })
    }
}
