#[cfg(test)]
mod extension_test;

use crate::error::Error;
use crate::Result;

pub const EXT_SUPPORTED_GROUPS: u16 = 10;
pub const EXT_EC_POINT_FORMATS: u16 = 11;
pub const EXT_SIGNATURE_ALGORITHMS: u16 = 13;
pub const EXT_USE_SRTP: u16 = 14;

/// secp256r1.
pub const GROUP_P256: u16 = 23;
/// ecdsa_secp256r1_sha256.
pub const SIG_ECDSA_SHA256: u16 = 0x0403;

/// The hello extensions this implementation speaks. Unknown extensions are
/// carried opaquely and ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    /// RFC 5764: SRTP protection profiles, MKI always empty.
    UseSrtp { profiles: Vec<u16> },
    SupportedGroups { groups: Vec<u16> },
    EcPointFormats,
    SignatureAlgorithms { algorithms: Vec<u16> },
    Unknown { typ: u16, data: Vec<u8> },
}

impl Extension {
    pub fn typ(&self) -> u16 {
        match self {
            Extension::UseSrtp { .. } => EXT_USE_SRTP,
            Extension::SupportedGroups { .. } => EXT_SUPPORTED_GROUPS,
            Extension::EcPointFormats => EXT_EC_POINT_FORMATS,
            Extension::SignatureAlgorithms { .. } => EXT_SIGNATURE_ALGORITHMS,
            Extension::Unknown { typ, .. } => *typ,
        }
    }

    fn body(&self) -> Vec<u8> {
        match self {
            Extension::UseSrtp { profiles } => {
                let mut out = ((profiles.len() * 2) as u16).to_be_bytes().to_vec();
                for p in profiles {
                    out.extend_from_slice(&p.to_be_bytes());
                }
                out.push(0); // srtp_mki length
                out
            }
            Extension::SupportedGroups { groups } => {
                let mut out = ((groups.len() * 2) as u16).to_be_bytes().to_vec();
                for g in groups {
                    out.extend_from_slice(&g.to_be_bytes());
                }
                out
            }
            Extension::EcPointFormats => vec![1, 0], // uncompressed only
            Extension::SignatureAlgorithms { algorithms } => {
                let mut out = ((algorithms.len() * 2) as u16).to_be_bytes().to_vec();
                for a in algorithms {
                    out.extend_from_slice(&a.to_be_bytes());
                }
                out
            }
            Extension::Unknown { data, .. } => data.clone(),
        }
    }

    fn parse(typ: u16, body: &[u8]) -> Result<Self> {
        let ext = match typ {
            EXT_USE_SRTP => {
                if body.len() < 2 {
                    return Err(Error::BadHandshake);
                }
                let list_len = u16::from_be_bytes([body[0], body[1]]) as usize;
                if list_len % 2 != 0 || body.len() < 2 + list_len + 1 {
                    return Err(Error::BadHandshake);
                }
                let profiles = body[2..2 + list_len]
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                Extension::UseSrtp { profiles }
            }
            EXT_SUPPORTED_GROUPS => {
                if body.len() < 2 {
                    return Err(Error::BadHandshake);
                }
                let list_len = u16::from_be_bytes([body[0], body[1]]) as usize;
                if list_len % 2 != 0 || body.len() < 2 + list_len {
                    return Err(Error::BadHandshake);
                }
                let groups = body[2..2 + list_len]
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                Extension::SupportedGroups { groups }
            }
            EXT_EC_POINT_FORMATS => Extension::EcPointFormats,
            EXT_SIGNATURE_ALGORITHMS => {
                if body.len() < 2 {
                    return Err(Error::BadHandshake);
                }
                let list_len = u16::from_be_bytes([body[0], body[1]]) as usize;
                if list_len % 2 != 0 || body.len() < 2 + list_len {
                    return Err(Error::BadHandshake);
                }
                let algorithms = body[2..2 + list_len]
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                Extension::SignatureAlgorithms { algorithms }
            }
            _ => Extension::Unknown {
                typ,
                data: body.to_vec(),
            },
        };
        Ok(ext)
    }
}

/// Serializes an extension block including its two-byte total length.
pub fn marshal_extensions(extensions: &[Extension]) -> Vec<u8> {
    let mut body = vec![];
    for ext in extensions {
        let ext_body = ext.body();
        body.extend_from_slice(&ext.typ().to_be_bytes());
        body.extend_from_slice(&(ext_body.len() as u16).to_be_bytes());
        body.extend_from_slice(&ext_body);
    }
    let mut out = (body.len() as u16).to_be_bytes().to_vec();
    out.extend_from_slice(&body);
    out
}

/// Parses an extension block (with leading total length) from `raw`,
/// returning the extensions and the bytes consumed.
pub fn unmarshal_extensions(raw: &[u8]) -> Result<(Vec<Extension>, usize)> {
    if raw.is_empty() {
        return Ok((vec![], 0));
    }
    if raw.len() < 2 {
        return Err(Error::BadHandshake);
    }
    let total = u16::from_be_bytes([raw[0], raw[1]]) as usize;
    if raw.len() < 2 + total {
        return Err(Error::BadHandshake);
    }
    let mut rest = &raw[2..2 + total];
    let mut extensions = vec![];
    while !rest.is_empty() {
        if rest.len() < 4 {
            return Err(Error::BadHandshake);
        }
        let typ = u16::from_be_bytes([rest[0], rest[1]]);
        let len = u16::from_be_bytes([rest[2], rest[3]]) as usize;
        if rest.len() < 4 + len {
            return Err(Error::BadHandshake);
        }
        extensions.push(Extension::parse(typ, &rest[4..4 + len])?);
        rest = &rest[4 + len..];
    }
    Ok((extensions, 2 + total))
}
