use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("record layer malformed")]
    BadRecord,
    #[error("handshake message malformed")]
    BadHandshake,
    #[error("unexpected handshake message {got} in state {state}")]
    UnexpectedMessage { got: u8, state: &'static str },
    #[error("no mutually supported cipher suite")]
    NoCipherSuite,
    #[error("no mutually supported SRTP protection profile")]
    NoSrtpProfile,
    #[error("peer certificate missing")]
    MissingCertificate,
    #[error("peer certificate does not match the signaled fingerprint")]
    CertificateVerifyFailed,
    #[error("signature verification failed")]
    BadSignature,
    #[error("finished verify_data mismatch")]
    BadVerifyData,
    #[error("decryption failed")]
    DecryptFailed,
    #[error("fatal alert received: {0}")]
    AlertReceived(u8),
    #[error("handshake deadline exceeded")]
    HandshakeTimeout,
    #[error("connection is closed")]
    Closed,
    #[error("certificate generation failed: {0}")]
    CertificateGeneration(String),
    #[error("keying material export before handshake completion")]
    ExportBeforeHandshake,
    #[error("crypto failure: {0}")]
    Crypto(String),
}
