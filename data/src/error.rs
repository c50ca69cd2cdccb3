use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("DCEP message truncated")]
    ShortMessage,
    #[error("unknown DCEP message type {0}")]
    InvalidMessageType(u8),
    #[error("unknown DCEP channel type {0:#04x}")]
    InvalidChannelType(u8),
    #[error("label or protocol is not valid UTF-8")]
    BadText,
}
