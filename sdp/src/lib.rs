#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod ice_candidate;
pub mod session_description;

mod error;

pub use error::Error;
pub use ice_candidate::CandidateDescription;
pub use session_description::*;

pub type Result<T> = std::result::Result<T, Error>;
