use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("SRTP master key must be {expected} bytes, got {actual}")]
    BadMasterKeyLength { expected: usize, actual: usize },
    #[error("SRTP master salt must be {expected} bytes, got {actual}")]
    BadMasterSaltLength { expected: usize, actual: usize },
    #[error("packet too short for profile")]
    ShortPacket,
    #[error("authentication failed")]
    AuthFailed,
    #[error("replayed packet: ssrc={ssrc:#010x} index={index}")]
    Replayed { ssrc: u32, index: u64 },
    #[error("exceeded the maximum packet count for one master key")]
    ExceededMaxPackets,
    #[error("malformed RTP header: {0}")]
    BadRtp(String),
    #[error("malformed SRTCP packet")]
    BadRtcp,
}
