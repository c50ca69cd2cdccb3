#[cfg(test)]
mod addr_test;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::attributes::*;
use crate::error::Error;
use crate::message::*;
use crate::Result;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

fn encode_addr(addr: SocketAddr, xor: Option<&Message>) -> Vec<u8> {
    let (family, mut octets) = match addr.ip() {
        IpAddr::V4(ip) => (FAMILY_IPV4, ip.octets().to_vec()),
        IpAddr::V6(ip) => (FAMILY_IPV6, ip.octets().to_vec()),
    };
    let mut port = addr.port();
    if let Some(m) = xor {
        port ^= (MAGIC_COOKIE >> 16) as u16;
        let cookie = MAGIC_COOKIE.to_be_bytes();
        let tid = m.transaction_id.0;
        for (i, b) in octets.iter_mut().enumerate() {
            *b ^= if i < 4 { cookie[i] } else { tid[i - 4] };
        }
    }
    let mut out = vec![0, family];
    out.extend_from_slice(&port.to_be_bytes());
    out.extend_from_slice(&octets);
    out
}

fn decode_addr(typ: AttrType, value: &[u8], xor: Option<&Message>) -> Result<SocketAddr> {
    if value.len() < 4 {
        return Err(Error::BadAttributeFormat(typ.value()));
    }
    let family = value[1];
    let mut port = u16::from_be_bytes([value[2], value[3]]);
    let mut octets = value[4..].to_vec();
    if let Some(m) = xor {
        port ^= (MAGIC_COOKIE >> 16) as u16;
        let cookie = MAGIC_COOKIE.to_be_bytes();
        let tid = m.transaction_id.0;
        for (i, b) in octets.iter_mut().enumerate() {
            *b ^= if i < 4 { cookie[i] } else { tid[i - 4] };
        }
    }
    let ip = match family {
        FAMILY_IPV4 if octets.len() == 4 => {
            IpAddr::V4(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]))
        }
        FAMILY_IPV6 if octets.len() == 16 => {
            let mut o = [0u8; 16];
            o.copy_from_slice(&octets);
            IpAddr::V6(Ipv6Addr::from(o))
        }
        FAMILY_IPV4 | FAMILY_IPV6 => return Err(Error::BadAttributeFormat(typ.value())),
        f => return Err(Error::BadAddressFamily(f)),
    };
    Ok(SocketAddr::new(ip, port))
}

/// MAPPED-ADDRESS (RFC 5389 §15.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedAddress(pub SocketAddr);

impl MappedAddress {
    pub fn add_to(&self, m: &mut Message) -> Result<()> {
        m.append(ATTR_MAPPED_ADDRESS, &encode_addr(self.0, None))
    }

    pub fn get_from(m: &Message) -> Result<Self> {
        let value = m.get(ATTR_MAPPED_ADDRESS)?;
        Ok(MappedAddress(decode_addr(ATTR_MAPPED_ADDRESS, value, None)?))
    }
}

/// XOR-MAPPED-ADDRESS (RFC 5389 §15.2): address obfuscated with the magic
/// cookie and transaction id so NATs do not rewrite it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XorMappedAddress(pub SocketAddr);

impl XorMappedAddress {
    pub fn add_to(&self, m: &mut Message) -> Result<()> {
        let encoded = encode_addr(self.0, Some(m));
        m.append(ATTR_XOR_MAPPED_ADDRESS, &encoded)
    }

    pub fn get_from(m: &Message) -> Result<Self> {
        let value = m.get(ATTR_XOR_MAPPED_ADDRESS)?.to_vec();
        Ok(XorMappedAddress(decode_addr(
            ATTR_XOR_MAPPED_ADDRESS,
            &value,
            Some(m),
        )?))
    }
}

/// XOR-RELAYED-ADDRESS (RFC 5766 §14.5), returned by TURN Allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XorRelayedAddress(pub SocketAddr);

impl XorRelayedAddress {
    pub fn get_from(m: &Message) -> Result<Self> {
        let value = m.get(ATTR_XOR_RELAYED_ADDRESS)?.to_vec();
        Ok(XorRelayedAddress(decode_addr(
            ATTR_XOR_RELAYED_ADDRESS,
            &value,
            Some(m),
        )?))
    }
}

/// XOR-PEER-ADDRESS (RFC 5766 §14.3), sent in CreatePermission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XorPeerAddress(pub SocketAddr);

impl XorPeerAddress {
    pub fn add_to(&self, m: &mut Message) -> Result<()> {
        let encoded = encode_addr(self.0, Some(m));
        m.append(ATTR_XOR_PEER_ADDRESS, &encoded)
    }

    pub fn get_from(m: &Message) -> Result<Self> {
        let value = m.get(ATTR_XOR_PEER_ADDRESS)?.to_vec();
        Ok(XorPeerAddress(decode_addr(
            ATTR_XOR_PEER_ADDRESS,
            &value,
            Some(m),
        )?))
    }
}
