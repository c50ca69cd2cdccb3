use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("packet too short to be a valid RTCP packet")]
    PacketTooShort,
    #[error("RTCP version must be 2")]
    BadVersion,
    #[error("header length field disagrees with available bytes")]
    BadLength,
    #[error("wrong packet type for this decoder")]
    WrongType,
    #[error("SDES item text exceeds 255 octets")]
    SdesTextTooLong,
    #[error("too many sources or reports for the 5-bit count field")]
    TooManySources,
    #[error("compound packets must begin with a sender or receiver report")]
    BadFirstPacket,
    #[error("compound packets must carry a CNAME source description")]
    MissingCname,
    #[error("unexpected packet before CNAME in compound packet")]
    PacketBeforeCname,
    #[error("TWCC packet status chunk malformed")]
    BadStatusChunk,
    #[error("TWCC receive delta out of range")]
    DeltaOutOfRange,
    #[error("unique identifier mismatch in REMB packet")]
    BadRembIdentifier,
}

impl From<Error> for util::Error {
    fn from(e: Error) -> Self {
        util::Error::from_std(e)
    }
}
