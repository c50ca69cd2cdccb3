#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod cipher;
pub mod cipher_aead_aes_gcm;
pub mod cipher_aes_cm_hmac_sha1;
pub mod context;
pub mod key_derivation;
pub mod protection_profile;

mod error;

pub use context::Context;
pub use error::Error;
pub use protection_profile::ProtectionProfile;

pub type Result<T> = std::result::Result<T, Error>;
