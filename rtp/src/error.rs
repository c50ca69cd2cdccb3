use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("RTP header size insufficient")]
    HeaderSizeInsufficient,
    #[error("RTP header size insufficient for extension")]
    HeaderSizeInsufficientForExtension,
    #[error("buffer too small")]
    ShortBuffer,
    #[error("header extension bit unset")]
    HeaderExtensionsNotEnabled,
    #[error("extension id {0} invalid for profile {1:#06x}")]
    ExtensionIdInvalid(u8, u16),
    #[error("extension payload of {0} bytes unrepresentable in profile {1:#06x}")]
    ExtensionPayloadTooLarge(usize, u16),
    #[error("invalid RTP padding")]
    BadPadding,
    #[error("RTP version {0} unsupported")]
    BadVersion(u8),
}

impl From<Error> for util::Error {
    fn from(e: Error) -> Self {
        util::Error::from_std(e)
    }
}
