use crate::error::Error;
use crate::Result;

pub const LEVEL_WARNING: u8 = 1;
pub const LEVEL_FATAL: u8 = 2;

pub const DESC_CLOSE_NOTIFY: u8 = 0;
pub const DESC_UNEXPECTED_MESSAGE: u8 = 10;
pub const DESC_BAD_RECORD_MAC: u8 = 20;
pub const DESC_HANDSHAKE_FAILURE: u8 = 40;
pub const DESC_BAD_CERTIFICATE: u8 = 42;
pub const DESC_DECRYPT_ERROR: u8 = 51;
pub const DESC_INTERNAL_ERROR: u8 = 80;

/// TLS alert (RFC 5246 §7.2): two bytes of level and description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub level: u8,
    pub description: u8,
}

impl Alert {
    pub fn fatal(description: u8) -> Self {
        Alert {
            level: LEVEL_FATAL,
            description,
        }
    }

    pub fn close_notify() -> Self {
        Alert {
            level: LEVEL_WARNING,
            description: DESC_CLOSE_NOTIFY,
        }
    }

    pub fn marshal(&self) -> [u8; 2] {
        [self.level, self.description]
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() != 2 {
            return Err(Error::BadRecord);
        }
        Ok(Alert {
            level: raw[0],
            description: raw[1],
        })
    }
}
