#![warn(rust_2018_idioms)]
#![allow(dead_code)]

// re-export sub-crates
pub use data;
pub use dtls;
pub use rtcp;
pub use rtp;
pub use sctp;
pub use sdp;
pub use srtp;
pub use stun;
pub use util;

pub mod api;
pub mod data_channel;
pub mod error;
pub mod ice;
pub mod mux;
pub mod peer_connection;
pub mod rtp_engine;
pub mod rtp_transceiver;

pub use error::Error;
pub use peer_connection::{
    PeerConnection, PeerConnectionState, RtcConfiguration, SessionDescriptionInit,
};

pub type Result<T> = std::result::Result<T, Error>;

/// Datagrams above this size are never produced or accepted.
pub(crate) const RECEIVE_MTU: usize = 1460;
