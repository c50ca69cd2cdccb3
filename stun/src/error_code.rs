#[cfg(test)]
mod error_code_test;

use crate::attributes::*;
use crate::error::Error;
use crate::message::*;
use crate::Result;

/// ERROR-CODE attribute (RFC 5389 §15.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCodeAttribute {
    pub code: u16,
    pub reason: String,
}

pub const CODE_BAD_REQUEST: u16 = 400;
pub const CODE_UNAUTHORIZED: u16 = 401;
pub const CODE_UNKNOWN_ATTRIBUTE: u16 = 420;
pub const CODE_STALE_NONCE: u16 = 438;
pub const CODE_ROLE_CONFLICT: u16 = 487;
pub const CODE_SERVER_ERROR: u16 = 500;

fn default_reason(code: u16) -> &'static str {
    match code {
        CODE_BAD_REQUEST => "Bad Request",
        CODE_UNAUTHORIZED => "Unauthorized",
        CODE_UNKNOWN_ATTRIBUTE => "Unknown Attribute",
        CODE_STALE_NONCE => "Stale Nonce",
        CODE_ROLE_CONFLICT => "Role Conflict",
        CODE_SERVER_ERROR => "Server Error",
        _ => "",
    }
}

impl ErrorCodeAttribute {
    pub fn new(code: u16) -> Self {
        ErrorCodeAttribute {
            code,
            reason: default_reason(code).to_owned(),
        }
    }

    pub fn add_to(&self, m: &mut Message) -> Result<()> {
        let mut value = vec![0u8, 0, (self.code / 100) as u8, (self.code % 100) as u8];
        value.extend_from_slice(self.reason.as_bytes());
        m.append(ATTR_ERROR_CODE, &value)
    }

    pub fn get_from(m: &Message) -> Result<Self> {
        let value = m.get(ATTR_ERROR_CODE)?;
        if value.len() < 4 {
            return Err(Error::BadAttributeFormat(ATTR_ERROR_CODE.value()));
        }
        let code = (value[2] & 0x07) as u16 * 100 + value[3] as u16;
        let reason = String::from_utf8(value[4..].to_vec())
            .map_err(|_| Error::BadAttributeFormat(ATTR_ERROR_CODE.value()))?;
        Ok(ErrorCodeAttribute { code, reason })
    }
}
