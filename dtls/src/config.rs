use std::time::Duration;

use srtp::ProtectionProfile;

use crate::crypto::Certificate;

/// Which side of the handshake this endpoint plays, resolved from the SDP
/// `a=setup` negotiation: the `active` side is the DTLS client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsRole {
    Client,
    Server,
}

#[derive(Clone)]
pub struct Config {
    pub certificate: Certificate,
    /// SRTP profiles offered (client) or accepted (server), in preference
    /// order.
    pub srtp_profiles: Vec<ProtectionProfile>,
    /// Expected peer certificate fingerprint from SDP. When set, a
    /// mismatch aborts the handshake before any keys are exported.
    pub remote_fingerprint: Option<String>,
    /// Largest datagram this endpoint emits.
    pub mtu: usize,
    /// Initial retransmit timeout (RFC 6347 recommends 1 s).
    pub initial_retransmit_interval: Duration,
    /// Overall handshake deadline.
    pub handshake_timeout: Duration,
}

impl Config {
    pub fn new(certificate: Certificate) -> Self {
        Config {
            certificate,
            srtp_profiles: vec![
                ProtectionProfile::Aes128CmHmacSha1_80,
                ProtectionProfile::AeadAes128Gcm,
            ],
            remote_fingerprint: None,
            mtu: 1200,
            initial_retransmit_interval: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(30),
        }
    }
}
