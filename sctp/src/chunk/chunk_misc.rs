use bytes::BufMut;

use super::{split_params, Param};
use crate::error::Error;
use crate::Result;

const PARAM_HEARTBEAT_INFO: u16 = 1;

/// HEARTBEAT / HEARTBEAT-ACK: opaque sender info echoed back.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkHeartbeat {
    pub info: Vec<u8>,
}

impl ChunkHeartbeat {
    pub fn parse(value: &[u8]) -> Result<Self> {
        let params = split_params(value)?;
        let info = params
            .into_iter()
            .find(|p| p.typ == PARAM_HEARTBEAT_INFO)
            .map(|p| p.value)
            .ok_or(Error::BadChunk)?;
        Ok(ChunkHeartbeat { info })
    }

    pub fn value(&self) -> Vec<u8> {
        let mut out = vec![];
        Param {
            typ: PARAM_HEARTBEAT_INFO,
            value: self.info.clone(),
        }
        .marshal_to(&mut out);
        out
    }
}

/// ABORT / ERROR: error causes kept opaque.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkAbort {
    pub causes: Vec<u8>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChunkShutdown {
    pub cumulative_tsn_ack: u32,
}

impl ChunkShutdown {
    pub fn parse(value: &[u8]) -> Result<Self> {
        if value.len() < 4 {
            return Err(Error::BadChunk);
        }
        Ok(ChunkShutdown {
            cumulative_tsn_ack: u32::from_be_bytes([value[0], value[1], value[2], value[3]]),
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkCookieEcho {
    pub cookie: Vec<u8>,
}

/// FORWARD-TSN (RFC 3758 §3.2): advances the peer's cumulative TSN past
/// abandoned chunks; stream/sequence pairs move ordered delivery forward.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkForwardTsn {
    pub new_cumulative_tsn: u32,
    pub streams: Vec<(u16, u16)>,
}

impl ChunkForwardTsn {
    pub fn parse(value: &[u8]) -> Result<Self> {
        if value.len() < 4 || (value.len() - 4) % 4 != 0 {
            return Err(Error::BadChunk);
        }
        let new_cumulative_tsn =
            u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
        let streams = value[4..]
            .chunks_exact(4)
            .map(|c| {
                (
                    u16::from_be_bytes([c[0], c[1]]),
                    u16::from_be_bytes([c[2], c[3]]),
                )
            })
            .collect();
        Ok(ChunkForwardTsn {
            new_cumulative_tsn,
            streams,
        })
    }

    pub fn value(&self) -> Vec<u8> {
        let mut out = vec![];
        out.put_u32(self.new_cumulative_tsn);
        for (sid, ssn) in &self.streams {
            out.put_u16(*sid);
            out.put_u16(*ssn);
        }
        out
    }
}
