use bytes::BufMut;

use super::{split_params, Param};
use crate::error::Error;
use crate::Result;

pub const PARAM_STATE_COOKIE: u16 = 7;
pub const PARAM_SUPPORTED_EXTENSIONS: u16 = 0x8008;
pub const PARAM_FORWARD_TSN_SUPPORTED: u16 = 0xc000;

/// INIT and INIT-ACK share one body layout (RFC 4960 §3.3.2/§3.3.3).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkInit {
    pub initiate_tag: u32,
    pub advertised_receiver_window: u32,
    pub num_outbound_streams: u16,
    pub num_inbound_streams: u16,
    pub initial_tsn: u32,
    /// Present only in INIT-ACK.
    pub state_cookie: Option<Vec<u8>>,
}

impl ChunkInit {
    pub fn parse(value: &[u8]) -> Result<Self> {
        if value.len() < 16 {
            return Err(Error::BadChunk);
        }
        let mut init = ChunkInit {
            initiate_tag: u32::from_be_bytes([value[0], value[1], value[2], value[3]]),
            advertised_receiver_window: u32::from_be_bytes([
                value[4], value[5], value[6], value[7],
            ]),
            num_outbound_streams: u16::from_be_bytes([value[8], value[9]]),
            num_inbound_streams: u16::from_be_bytes([value[10], value[11]]),
            initial_tsn: u32::from_be_bytes([value[12], value[13], value[14], value[15]]),
            state_cookie: None,
        };
        for param in split_params(&value[16..])? {
            if param.typ == PARAM_STATE_COOKIE {
                init.state_cookie = Some(param.value);
            }
        }
        Ok(init)
    }

    pub fn value(&self) -> Vec<u8> {
        let mut out = vec![];
        out.put_u32(self.initiate_tag);
        out.put_u32(self.advertised_receiver_window);
        out.put_u16(self.num_outbound_streams);
        out.put_u16(self.num_inbound_streams);
        out.put_u32(self.initial_tsn);
        // Announce RE-CONFIG and FORWARD-TSN support.
        Param {
            typ: PARAM_SUPPORTED_EXTENSIONS,
            value: vec![super::CT_RECONFIG, super::CT_FORWARD_TSN],
        }
        .marshal_to(&mut out);
        Param {
            typ: PARAM_FORWARD_TSN_SUPPORTED,
            value: vec![],
        }
        .marshal_to(&mut out);
        if let Some(cookie) = &self.state_cookie {
            Param {
                typ: PARAM_STATE_COOKIE,
                value: cookie.clone(),
            }
            .marshal_to(&mut out);
        }
        out
    }
}
