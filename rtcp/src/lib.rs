#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod compound_packet;
pub mod goodbye;
pub mod header;
pub mod packet;
pub mod payload_feedbacks;
pub mod raw_packet;
pub mod receiver_report;
pub mod reception_report;
pub mod sender_report;
pub mod source_description;
pub mod transport_feedbacks;

mod error;

pub use error::Error;
pub use packet::Packet;

pub type Result<T> = std::result::Result<T, Error>;
