
pub mod chunk_init;
pub mod chunk_misc;
pub mod chunk_payload_data;
pub mod chunk_reconfig;
pub mod chunk_selective_ack;

use bytes::{Buf, BufMut};

use crate::error::Error;
use crate::Result;

pub use chunk_init::ChunkInit;
pub use chunk_misc::*;
pub use chunk_payload_data::ChunkPayloadData;
pub use chunk_reconfig::*;
pub use chunk_selective_ack::{ChunkSelectiveAck, GapAckBlock};

pub const CHUNK_HEADER_SIZE: usize = 4;

pub const CT_PAYLOAD_DATA: u8 = 0;
pub const CT_INIT: u8 = 1;
pub const CT_INIT_ACK: u8 = 2;
pub const CT_SACK: u8 = 3;
pub const CT_HEARTBEAT: u8 = 4;
pub const CT_HEARTBEAT_ACK: u8 = 5;
pub const CT_ABORT: u8 = 6;
pub const CT_SHUTDOWN: u8 = 7;
pub const CT_SHUTDOWN_ACK: u8 = 8;
pub const CT_ERROR: u8 = 9;
pub const CT_COOKIE_ECHO: u8 = 10;
pub const CT_COOKIE_ACK: u8 = 11;
pub const CT_SHUTDOWN_COMPLETE: u8 = 14;
pub const CT_RECONFIG: u8 = 130;
pub const CT_FORWARD_TSN: u8 = 192;

pub(crate) fn padded(len: usize) -> usize {
    (len + 3) / 4 * 4
}

/// Raw chunk framing: type, flags, length (header included, padding
/// excluded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub typ: u8,
    pub flags: u8,
    pub value: Vec<u8>,
}

impl RawChunk {
    pub fn marshal_to(&self, out: &mut Vec<u8>) {
        let length = (CHUNK_HEADER_SIZE + self.value.len()) as u16;
        out.put_u8(self.typ);
        out.put_u8(self.flags);
        out.put_u16(length);
        out.extend_from_slice(&self.value);
        out.resize(out.len() + padded(self.value.len()) - self.value.len(), 0);
    }

    pub fn wire_size(&self) -> usize {
        CHUNK_HEADER_SIZE + padded(self.value.len())
    }
}

/// Splits a packet body into raw chunks.
pub fn split_chunks(mut body: &[u8]) -> Result<Vec<RawChunk>> {
    let mut chunks = vec![];
    while !body.is_empty() {
        if body.len() < CHUNK_HEADER_SIZE {
            return Err(Error::BadChunk);
        }
        let typ = body[0];
        let flags = body[1];
        let length = u16::from_be_bytes([body[2], body[3]]) as usize;
        if length < CHUNK_HEADER_SIZE || body.len() < length {
            return Err(Error::BadChunk);
        }
        let value = body[CHUNK_HEADER_SIZE..length].to_vec();
        let consumed = padded(length).min(body.len());
        chunks.push(RawChunk { typ, flags, value });
        body = &body[consumed..];
    }
    Ok(chunks)
}

/// TLV parameter used inside INIT/INIT-ACK/HEARTBEAT/RECONFIG chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub typ: u16,
    pub value: Vec<u8>,
}

impl Param {
    pub fn marshal_to(&self, out: &mut Vec<u8>) {
        out.put_u16(self.typ);
        out.put_u16((4 + self.value.len()) as u16);
        out.extend_from_slice(&self.value);
        out.resize(out.len() + padded(self.value.len()) - self.value.len(), 0);
    }
}

pub fn split_params(mut body: &[u8]) -> Result<Vec<Param>> {
    let mut params = vec![];
    while !body.is_empty() {
        if body.len() < 4 {
            return Err(Error::BadChunk);
        }
        let typ = u16::from_be_bytes([body[0], body[1]]);
        let length = u16::from_be_bytes([body[2], body[3]]) as usize;
        if length < 4 || body.len() < length {
            return Err(Error::BadChunk);
        }
        params.push(Param {
            typ,
            value: body[4..length].to_vec(),
        });
        let consumed = padded(length).min(body.len());
        body = &body[consumed..];
    }
    Ok(params)
}

/// Typed view over a raw chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Init(ChunkInit),
    InitAck(ChunkInit),
    PayloadData(ChunkPayloadData),
    Sack(ChunkSelectiveAck),
    Heartbeat(ChunkHeartbeat),
    HeartbeatAck(ChunkHeartbeat),
    Abort(ChunkAbort),
    Shutdown(ChunkShutdown),
    ShutdownAck,
    ShutdownComplete,
    CookieEcho(ChunkCookieEcho),
    CookieAck,
    Error(ChunkAbort),
    Reconfig(ChunkReconfig),
    ForwardTsn(ChunkForwardTsn),
    Unknown(RawChunk),
}

impl Chunk {
    pub fn parse(raw: &RawChunk) -> Result<Chunk> {
        Ok(match raw.typ {
            CT_INIT => Chunk::Init(ChunkInit::parse(&raw.value)?),
            CT_INIT_ACK => Chunk::InitAck(ChunkInit::parse(&raw.value)?),
            CT_PAYLOAD_DATA => {
                Chunk::PayloadData(ChunkPayloadData::parse(raw.flags, &raw.value)?)
            }
            CT_SACK => Chunk::Sack(ChunkSelectiveAck::parse(&raw.value)?),
            CT_HEARTBEAT => Chunk::Heartbeat(ChunkHeartbeat::parse(&raw.value)?),
            CT_HEARTBEAT_ACK => Chunk::HeartbeatAck(ChunkHeartbeat::parse(&raw.value)?),
            CT_ABORT => Chunk::Abort(ChunkAbort {
                causes: raw.value.clone(),
            }),
            CT_ERROR => Chunk::Error(ChunkAbort {
                causes: raw.value.clone(),
            }),
            CT_SHUTDOWN => Chunk::Shutdown(ChunkShutdown::parse(&raw.value)?),
            CT_SHUTDOWN_ACK => Chunk::ShutdownAck,
            CT_SHUTDOWN_COMPLETE => Chunk::ShutdownComplete,
            CT_COOKIE_ECHO => Chunk::CookieEcho(ChunkCookieEcho {
                cookie: raw.value.clone(),
            }),
            CT_COOKIE_ACK => Chunk::CookieAck,
            CT_RECONFIG => Chunk::Reconfig(ChunkReconfig::parse(&raw.value)?),
            CT_FORWARD_TSN => Chunk::ForwardTsn(ChunkForwardTsn::parse(&raw.value)?),
            _ => Chunk::Unknown(raw.clone()),
        })
    }

    pub fn raw(&self) -> RawChunk {
        match self {
            Chunk::Init(c) => RawChunk {
                typ: CT_INIT,
                flags: 0,
                value: c.value(),
            },
            Chunk::InitAck(c) => RawChunk {
                typ: CT_INIT_ACK,
                flags: 0,
                value: c.value(),
            },
            Chunk::PayloadData(c) => RawChunk {
                typ: CT_PAYLOAD_DATA,
                flags: c.flags(),
                value: c.value(),
            },
            Chunk::Sack(c) => RawChunk {
                typ: CT_SACK,
                flags: 0,
                value: c.value(),
            },
            Chunk::Heartbeat(c) => RawChunk {
                typ: CT_HEARTBEAT,
                flags: 0,
                value: c.value(),
            },
            Chunk::HeartbeatAck(c) => RawChunk {
                typ: CT_HEARTBEAT_ACK,
                flags: 0,
                value: c.value(),
            },
            Chunk::Abort(c) => RawChunk {
                typ: CT_ABORT,
                flags: 0,
                value: c.causes.clone(),
            },
            Chunk::Error(c) => RawChunk {
                typ: CT_ERROR,
                flags: 0,
                value: c.causes.clone(),
            },
            Chunk::Shutdown(c) => RawChunk {
                typ: CT_SHUTDOWN,
                flags: 0,
                value: c.cumulative_tsn_ack.to_be_bytes().to_vec(),
            },
            Chunk::ShutdownAck => RawChunk {
                typ: CT_SHUTDOWN_ACK,
                flags: 0,
                value: vec![],
            },
            Chunk::ShutdownComplete => RawChunk {
                typ: CT_SHUTDOWN_COMPLETE,
                flags: 0,
                value: vec![],
            },
            Chunk::CookieEcho(c) => RawChunk {
                typ: CT_COOKIE_ECHO,
                flags: 0,
                value: c.cookie.clone(),
            },
            Chunk::CookieAck => RawChunk {
                typ: CT_COOKIE_ACK,
                flags: 0,
                value: vec![],
            },
            Chunk::Reconfig(c) => RawChunk {
                typ: CT_RECONFIG,
                flags: 0,
                value: c.value(),
            },
            Chunk::ForwardTsn(c) => RawChunk {
                typ: CT_FORWARD_TSN,
                flags: 0,
                value: c.value(),
            },
            Chunk::Unknown(raw) => raw.clone(),
        }
    }
}
