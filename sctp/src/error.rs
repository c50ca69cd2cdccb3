use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("SCTP packet smaller than the common header")]
    ShortPacket,
    #[error("SCTP checksum mismatch")]
    ChecksumMismatch,
    #[error("chunk truncated or length field invalid")]
    BadChunk,
    #[error("packet verification tag mismatch")]
    BadVerificationTag,
    #[error("state cookie failed verification")]
    CookieVerifyFailed,
    #[error("peer aborted the association")]
    AbortReceived,
    #[error("association init timed out")]
    InitTimeout,
    #[error("association is not established")]
    NotEstablished,
    #[error("association closed")]
    Closed,
    #[error("message larger than the maximum allowed")]
    MessageTooLarge,
    #[error("unexpected chunk {0} in state {1}")]
    UnexpectedChunk(u8, &'static str),
}
