#[cfg(test)]
mod candidate_test;

use std::fmt;
use std::net::SocketAddr;

use crc::{Crc, CRC_32_ISO_HDLC};

use sdp::CandidateDescription;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// RTP component; RTCP is multiplexed so a second component never exists
/// under BUNDLE.
pub const COMPONENT_RTP: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateType {
    Host,
    ServerReflexive,
    PeerReflexive,
    Relay,
}

impl CandidateType {
    /// RFC 8445 §5.1.2.2 recommended type preferences.
    pub fn preference(&self) -> u32 {
        match self {
            CandidateType::Host => 126,
            CandidateType::PeerReflexive => 110,
            CandidateType::ServerReflexive => 100,
            CandidateType::Relay => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relay => "relay",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "host" => Some(CandidateType::Host),
            "srflx" => Some(CandidateType::ServerReflexive),
            "prflx" => Some(CandidateType::PeerReflexive),
            "relay" => Some(CandidateType::Relay),
            _ => None,
        }
    }
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub foundation: String,
    pub component: u16,
    pub priority: u32,
    pub address: SocketAddr,
    pub typ: CandidateType,
    pub related_address: Option<SocketAddr>,
    /// ICE restart generation this candidate belongs to.
    pub generation: u32,
}

impl Candidate {
    pub fn new(
        typ: CandidateType,
        address: SocketAddr,
        base: SocketAddr,
        related_address: Option<SocketAddr>,
        generation: u32,
    ) -> Self {
        Candidate {
            foundation: foundation(typ, base, related_address),
            component: COMPONENT_RTP,
            priority: priority(typ, COMPONENT_RTP),
            address,
            typ,
            related_address,
            generation,
        }
    }

    pub fn to_description(&self) -> CandidateDescription {
        CandidateDescription {
            foundation: self.foundation.clone(),
            component: self.component,
            transport: "udp".to_owned(),
            priority: self.priority,
            address: self.address.ip(),
            port: self.address.port(),
            typ: self.typ.as_str().to_owned(),
            related_address: self.related_address.map(|a| a.ip()),
            related_port: self.related_address.map(|a| a.port()),
        }
    }

    pub fn from_description(desc: &CandidateDescription, generation: u32) -> Option<Self> {
        let typ = CandidateType::parse(&desc.typ)?;
        Some(Candidate {
            foundation: desc.foundation.clone(),
            component: desc.component,
            priority: desc.priority,
            address: SocketAddr::new(desc.address, desc.port),
            typ,
            related_address: desc
                .related_address
                .zip(desc.related_port)
                .map(|(ip, port)| SocketAddr::new(ip, port)),
            generation,
        })
    }
}

/// RFC 8445 §5.1.2.1:
/// `(2^24)·type-pref + (2^8)·local-pref + (256 − component)`.
pub fn priority(typ: CandidateType, component: u16) -> u32 {
    let local_preference: u32 = 65535;
    (1 << 24) * typ.preference() + (1 << 8) * local_preference
        + 256
        - component as u32
}

/// Priority a peer-reflexive candidate discovered from this local base
/// would carry, sent in the PRIORITY attribute of every check.
pub fn prflx_priority(component: u16) -> u32 {
    priority(CandidateType::PeerReflexive, component)
}

/// Candidates sharing type, base and server collapse into one foundation
/// (RFC 8445 §5.1.1.3).
fn foundation(typ: CandidateType, base: SocketAddr, related: Option<SocketAddr>) -> String {
    let key = format!(
        "{}{}{}",
        typ.as_str(),
        base.ip(),
        related.map(|r| r.ip().to_string()).unwrap_or_default()
    );
    CRC32.checksum(key.as_bytes()).to_string()
}

/// RFC 8445 §6.1.2.3 pair priority:
/// `2^32·MIN(G,D) + 2·MAX(G,D) + (G>D ? 1 : 0)` where G is the
/// controlling agent's candidate priority.
pub fn pair_priority(controlling: u32, controlled: u32) -> u64 {
    let (g, d) = (controlling as u64, controlled as u64);
    (1u64 << 32) * g.min(d) + 2 * g.max(d) + u64::from(g > d)
}
