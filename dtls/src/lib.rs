#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod alert;
pub mod cipher;
pub mod config;
pub mod conn;
pub mod crypto;
pub mod extension;
pub mod handshake;
pub mod prf;
pub mod record;

mod error;

pub use config::{Config, DtlsRole};
pub use conn::{DtlsConn, DtlsEvent};
pub use crypto::Certificate;
pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;
