use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("negotiation failed: {0}")]
    Negotiation(String),
    #[error("operation invalid in signaling state {0}")]
    InvalidSignalingState(&'static str),
    #[error("ICE failure: {0}")]
    Ice(#[from] crate::ice::IceError),
    #[error("DTLS failure: {0}")]
    Dtls(#[from] dtls::Error),
    #[error("SRTP failure: {0}")]
    Srtp(#[from] srtp::Error),
    #[error("SCTP failure: {0}")]
    Sctp(#[from] sctp::Error),
    #[error("SDP error: {0}")]
    Sdp(#[from] sdp::Error),
    #[error("data channel error: {0}")]
    DataChannel(String),
    #[error("connection is closed")]
    Closed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
