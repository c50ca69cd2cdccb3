#[cfg(test)]
mod extension_test;

use std::time::Duration;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;

/// URIs for the header extensions negotiated via `a=extmap`.
pub const TRANSPORT_CC_URI: &str =
    "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01";
pub const ABS_SEND_TIME_URI: &str =
    "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time";
pub const SDES_MID_URI: &str = "urn:ietf:params:rtp-hdrext:sdes:mid";
pub const SDES_RTP_STREAM_ID_URI: &str = "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id";
pub const SDES_REPAIRED_RTP_STREAM_ID_URI: &str =
    "urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id";

/// Transport-wide sequence number carried on every packet when
/// transport-cc is negotiated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransportCcExtension {
    pub transport_sequence: u16,
}

impl MarshalSize for TransportCcExtension {
    fn marshal_size(&self) -> usize {
        2
    }
}

impl Marshal for TransportCcExtension {
    fn marshal_to(&self, mut buf: &mut [u8]) -> util::Result<usize> {
        if buf.len() < 2 {
            return Err(Error::ShortBuffer.into());
        }
        buf.put_u16(self.transport_sequence);
        Ok(2)
    }
}

impl Unmarshal for TransportCcExtension {
    fn unmarshal<B>(buf: &mut B) -> util::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if buf.remaining() < 2 {
            return Err(Error::ShortBuffer.into());
        }
        Ok(TransportCcExtension {
            transport_sequence: buf.get_u16(),
        })
    }
}

/// Absolute send time, 24 bits of 6.18 fixed-point seconds
/// (rolls over every 64 s).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AbsSendTimeExtension {
    pub timestamp: u32,
}

impl AbsSendTimeExtension {
    /// Encodes a duration since an arbitrary epoch.
    pub fn new(since_epoch: Duration) -> Self {
        let seconds_fp18 =
            (since_epoch.as_secs() << 18) + ((since_epoch.subsec_nanos() as u64) << 18) / 1_000_000_000;
        AbsSendTimeExtension {
            timestamp: (seconds_fp18 & 0x00ff_ffff) as u32,
        }
    }
}

impl MarshalSize for AbsSendTimeExtension {
    fn marshal_size(&self) -> usize {
        3
    }
}

impl Marshal for AbsSendTimeExtension {
    fn marshal_to(&self, mut buf: &mut [u8]) -> util::Result<usize> {
        if buf.len() < 3 {
            return Err(Error::ShortBuffer.into());
        }
        buf.put_u8((self.timestamp >> 16) as u8);
        buf.put_u8((self.timestamp >> 8) as u8);
        buf.put_u8(self.timestamp as u8);
        Ok(3)
    }
}

impl Unmarshal for AbsSendTimeExtension {
    fn unmarshal<B>(buf: &mut B) -> util::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if buf.remaining() < 3 {
            return Err(Error::ShortBuffer.into());
        }
        let b = [buf.get_u8(), buf.get_u8(), buf.get_u8()];
        Ok(AbsSendTimeExtension {
            timestamp: u32::from_be_bytes([0, b[0], b[1], b[2]]),
        })
    }
}
