#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod marshal;
pub mod replay_detector;

mod error;

pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;
