use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("SDP line {0} is malformed: {1}")]
    BadLine(usize, String),
    #[error("SDP has no version line")]
    MissingVersion,
    #[error("attribute found outside a media section: {0}")]
    AttributeOutsideMedia(String),
    #[error("malformed candidate line: {0}")]
    BadCandidate(String),
}
