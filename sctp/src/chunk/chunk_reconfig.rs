use bytes::BufMut;

use super::{split_params, Param};
use crate::error::Error;
use crate::Result;

pub const PARAM_OUTGOING_RESET_REQUEST: u16 = 13;
pub const PARAM_RECONFIG_RESPONSE: u16 = 16;

pub const RESULT_SUCCESS_PERFORMED: u32 = 1;
pub const RESULT_DENIED: u32 = 4;

/// Outgoing SSN Reset Request (RFC 6525 §4.1).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutgoingResetRequest {
    pub request_seq: u32,
    pub response_seq: u32,
    pub senders_last_tsn: u32,
    pub streams: Vec<u16>,
}

/// Re-configuration Response (RFC 6525 §4.4).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconfigResponse {
    pub response_seq: u32,
    pub result: u32,
}

/// RE-CONFIG chunk carrying at most one request and one response, which
/// is all the data channel close path needs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkReconfig {
    pub reset_request: Option<OutgoingResetRequest>,
    pub response: Option<ReconfigResponse>,
}

impl ChunkReconfig {
    pub fn parse(value: &[u8]) -> Result<Self> {
        let mut out = ChunkReconfig::default();
        for param in split_params(value)? {
            match param.typ {
                PARAM_OUTGOING_RESET_REQUEST => {
                    let v = &param.value;
                    if v.len() < 12 || (v.len() - 12) % 2 != 0 {
                        return Err(Error::BadChunk);
                    }
                    out.reset_request = Some(OutgoingResetRequest {
                        request_seq: u32::from_be_bytes([v[0], v[1], v[2], v[3]]),
                        response_seq: u32::from_be_bytes([v[4], v[5], v[6], v[7]]),
                        senders_last_tsn: u32::from_be_bytes([v[8], v[9], v[10], v[11]]),
                        streams: v[12..]
                            .chunks_exact(2)
                            .map(|c| u16::from_be_bytes([c[0], c[1]]))
                            .collect(),
                    });
                }
                PARAM_RECONFIG_RESPONSE => {
                    let v = &param.value;
                    if v.len() < 8 {
                        return Err(Error::BadChunk);
                    }
                    out.response = Some(ReconfigResponse {
                        response_seq: u32::from_be_bytes([v[0], v[1], v[2], v[3]]),
                        result: u32::from_be_bytes([v[4], v[5], v[6], v[7]]),
                    });
                }
                _ => {}
            }
        }
        Ok(out)
    }

    pub fn value(&self) -> Vec<u8> {
        let mut out = vec![];
        if let Some(req) = &self.reset_request {
            let mut v = vec![];
            v.put_u32(req.request_seq);
            v.put_u32(req.response_seq);
            v.put_u32(req.senders_last_tsn);
            for s in &req.streams {
                v.put_u16(*s);
            }
            Param {
                typ: PARAM_OUTGOING_RESET_REQUEST,
                value: v,
            }
            .marshal_to(&mut out);
        }
        if let Some(resp) = &self.response {
            let mut v = vec![];
            v.put_u32(resp.response_seq);
            v.put_u32(resp.result);
            Param {
                typ: PARAM_RECONFIG_RESPONSE,
                value: v,
            }
            .marshal_to(&mut out);
        }
        out
    }
}
