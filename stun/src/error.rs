use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("not a STUN message")]
    NotStunMessage,
    #[error("STUN message header too small or length mismatched")]
    BadFormat,
    #[error("attribute {0:#06x} truncated")]
    BadAttributeFormat(u16),
    #[error("attribute not found in message")]
    AttributeNotFound,
    #[error("MESSAGE-INTEGRITY mismatch")]
    BadIntegrity,
    #[error("FINGERPRINT mismatch")]
    FingerprintMismatch,
    #[error("unknown comprehension-required attribute {0:#06x}")]
    UnknownRequiredAttr(u16),
    #[error("unexpected address family {0:#04x}")]
    BadAddressFamily(u8),
    #[error("attribute value exceeds {max} bytes")]
    AttributeTooLong { max: usize },
    #[error("FINGERPRINT must be the last attribute")]
    FingerprintBeforeIntegrity,
}
