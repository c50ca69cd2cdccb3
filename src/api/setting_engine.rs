use std::net::IpAddr;
use std::time::Duration;

/// Per-connection tuning knobs that are not part of the standard
/// configuration surface.
#[derive(Debug, Clone)]
pub struct SettingEngine {
    /// Address the UDP socket binds to; `None` binds the wildcard.
    pub bind_ip: Option<IpAddr>,
    /// Address advertised in host candidates when the socket is bound to
    /// the wildcard. Defaults to the loopback address, which suits local
    /// testing; deployments set their interface address here.
    pub advertised_ip: Option<IpAddr>,
    pub dtls_handshake_timeout: Duration,
    pub ice_gathering_timeout: Duration,
    pub sctp_max_message_size: usize,
}

impl Default for SettingEngine {
    fn default() -> Self {
        SettingEngine {
            bind_ip: None,
            advertised_ip: None,
            dtls_handshake_timeout: Duration::from_secs(30),
            ice_gathering_timeout: Duration::from_secs(5),
            sctp_max_message_size: 262_144,
        }
    }
}
