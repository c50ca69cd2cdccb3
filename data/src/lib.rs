#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod message;

mod error;

pub use error::Error;
pub use message::*;

pub type Result<T> = std::result::Result<T, Error>;
