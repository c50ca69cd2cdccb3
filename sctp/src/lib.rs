#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod association;
pub mod chunk;
pub mod packet;
pub mod reassembly;

mod error;

pub use association::{Association, AssociationEvent, Config, Reliability};
pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Serial number arithmetic (RFC 1982) over 32-bit TSNs.
pub(crate) fn tsn_lt(a: u32, b: u32) -> bool {
    a != b && b.wrapping_sub(a) < (1 << 31)
}

pub(crate) fn tsn_le(a: u32, b: u32) -> bool {
    a == b || tsn_lt(a, b)
}

/// Serial number arithmetic over 16-bit stream sequence numbers.
pub(crate) fn ssn_lt(a: u16, b: u16) -> bool {
    a != b && b.wrapping_sub(a) < (1 << 15)
}
