#[cfg(test)]
mod header_test;

use bytes::{Buf, BufMut, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;

pub const VERSION: u8 = 2;
pub const FIXED_HEADER_SIZE: usize = 12;
pub const CSRC_LENGTH: usize = 4;

/// RFC 8285 one-byte extension profile.
pub const EXTENSION_PROFILE_ONE_BYTE: u16 = 0xbede;
/// RFC 8285 two-byte extension profile (appbits zero).
pub const EXTENSION_PROFILE_TWO_BYTE: u16 = 0x1000;

const ONE_BYTE_ID_RESERVED: u8 = 0x0f;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Extension {
    pub id: u8,
    pub payload: Bytes,
}

/// RTP packet header (RFC 3550 §5.1) with RFC 8285 header extensions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub padding: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub extension_profile: u16,
    pub extensions: Vec<Extension>,
}

impl Header {
    fn extensions_payload_size(&self) -> usize {
        let raw: usize = match self.extension_profile {
            EXTENSION_PROFILE_ONE_BYTE => self
                .extensions
                .iter()
                .map(|e| 1 + e.payload.len())
                .sum(),
            EXTENSION_PROFILE_TWO_BYTE => self
                .extensions
                .iter()
                .map(|e| 2 + e.payload.len())
                .sum(),
            _ => self.extensions.first().map(|e| e.payload.len()).unwrap_or(0),
        };
        (raw + 3) / 4 * 4
    }

    pub fn has_extensions(&self) -> bool {
        !self.extensions.is_empty()
    }

    /// Returns the payload of the extension with the given id.
    pub fn get_extension(&self, id: u8) -> Option<Bytes> {
        self.extensions
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.payload.clone())
    }

    /// Adds (or replaces) an extension, enforcing the id and length bounds
    /// of the active profile.
    pub fn set_extension(&mut self, id: u8, payload: Bytes) -> Result<(), Error> {
        if self.extension_profile == 0 {
            self.extension_profile = EXTENSION_PROFILE_ONE_BYTE;
        }
        match self.extension_profile {
            EXTENSION_PROFILE_ONE_BYTE => {
                if !(1..=14).contains(&id) {
                    return Err(Error::ExtensionIdInvalid(id, self.extension_profile));
                }
                if payload.is_empty() || payload.len() > 16 {
                    return Err(Error::ExtensionPayloadTooLarge(
                        payload.len(),
                        self.extension_profile,
                    ));
                }
            }
            EXTENSION_PROFILE_TWO_BYTE => {
                if id == 0 {
                    return Err(Error::ExtensionIdInvalid(id, self.extension_profile));
                }
                if payload.len() > 255 {
                    return Err(Error::ExtensionPayloadTooLarge(
                        payload.len(),
                        self.extension_profile,
                    ));
                }
            }
            _ => {}
        }
        if let Some(existing) = self.extensions.iter_mut().find(|e| e.id == id) {
            existing.payload = payload;
        } else {
            self.extensions.push(Extension { id, payload });
        }
        Ok(())
    }

    pub fn del_extension(&mut self, id: u8) {
        self.extensions.retain(|e| e.id != id);
    }
}

impl MarshalSize for Header {
    fn marshal_size(&self) -> usize {
        let mut size = FIXED_HEADER_SIZE + self.csrc.len() * CSRC_LENGTH;
        if self.has_extensions() {
            size += 4 + self.extensions_payload_size();
        }
        size
    }
}

impl Marshal for Header {
    fn marshal_to(&self, mut buf: &mut [u8]) -> util::Result<usize> {
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(util::Error::UnexpectedEndOfBuffer {
                expected: size,
                actual: buf.len(),
            });
        }

        let mut b0 = (VERSION << 6) | self.csrc.len() as u8;
        if self.padding {
            b0 |= 1 << 5;
        }
        if self.has_extensions() {
            b0 |= 1 << 4;
        }
        buf.put_u8(b0);

        let mut b1 = self.payload_type & 0x7f;
        if self.marker {
            b1 |= 1 << 7;
        }
        buf.put_u8(b1);
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if self.has_extensions() {
            buf.put_u16(self.extension_profile);
            let payload_size = self.extensions_payload_size();
            buf.put_u16((payload_size / 4) as u16);
            let mut written = 0usize;
            match self.extension_profile {
                EXTENSION_PROFILE_ONE_BYTE => {
                    for e in &self.extensions {
                        buf.put_u8((e.id << 4) | (e.payload.len() as u8 - 1));
                        buf.put_slice(&e.payload);
                        written += 1 + e.payload.len();
                    }
                }
                EXTENSION_PROFILE_TWO_BYTE => {
                    for e in &self.extensions {
                        buf.put_u8(e.id);
                        buf.put_u8(e.payload.len() as u8);
                        buf.put_slice(&e.payload);
                        written += 2 + e.payload.len();
                    }
                }
                _ => {
                    let payload = &self.extensions[0].payload;
                    buf.put_slice(payload);
                    written += payload.len();
                }
            }
            while written < payload_size {
                buf.put_u8(0);
                written += 1;
            }
        }

        Ok(size)
    }
}

impl Unmarshal for Header {
    fn unmarshal<B>(raw: &mut B) -> util::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if raw.remaining() < FIXED_HEADER_SIZE {
            return Err(Error::HeaderSizeInsufficient.into());
        }

        let b0 = raw.get_u8();
        let version = b0 >> 6;
        if version != VERSION {
            return Err(Error::BadVersion(version).into());
        }
        let padding = b0 & (1 << 5) != 0;
        let has_extension = b0 & (1 << 4) != 0;
        let csrc_count = (b0 & 0x0f) as usize;

        let b1 = raw.get_u8();
        let marker = b1 & (1 << 7) != 0;
        let payload_type = b1 & 0x7f;

        let sequence_number = raw.get_u16();
        let timestamp = raw.get_u32();
        let ssrc = raw.get_u32();

        if raw.remaining() < csrc_count * CSRC_LENGTH {
            return Err(Error::HeaderSizeInsufficient.into());
        }
        let csrc = (0..csrc_count).map(|_| raw.get_u32()).collect();

        let mut extension_profile = 0u16;
        let mut extensions = vec![];
        if has_extension {
            if raw.remaining() < 4 {
                return Err(Error::HeaderSizeInsufficientForExtension.into());
            }
            extension_profile = raw.get_u16();
            let extension_len = raw.get_u16() as usize * 4;
            if raw.remaining() < extension_len {
                return Err(Error::HeaderSizeInsufficientForExtension.into());
            }

            match extension_profile {
                EXTENSION_PROFILE_ONE_BYTE => {
                    let mut remaining = extension_len;
                    while remaining > 0 {
                        let b = raw.get_u8();
                        remaining -= 1;
                        if b == 0x00 {
                            continue;
                        }
                        let id = b >> 4;
                        let len = ((b & 0x0f) + 1) as usize;
                        if id == ONE_BYTE_ID_RESERVED {
                            // id 15 halts processing; skip the rest.
                            raw.advance(remaining);
                            remaining = 0;
                            break;
                        }
                        if len > remaining {
                            return Err(Error::HeaderSizeInsufficientForExtension.into());
                        }
                        extensions.push(Extension {
                            id,
                            payload: raw.copy_to_bytes(len),
                        });
                        remaining -= len;
                    }
                }
                EXTENSION_PROFILE_TWO_BYTE => {
                    let mut remaining = extension_len;
                    while remaining > 0 {
                        let id = raw.get_u8();
                        remaining -= 1;
                        if id == 0x00 {
                            continue;
                        }
                        if remaining < 1 {
                            return Err(Error::HeaderSizeInsufficientForExtension.into());
                        }
                        let len = raw.get_u8() as usize;
                        remaining -= 1;
                        if len > remaining {
                            return Err(Error::HeaderSizeInsufficientForExtension.into());
                        }
                        extensions.push(Extension {
                            id,
                            payload: raw.copy_to_bytes(len),
                        });
                        remaining -= len;
                    }
                }
                _ => {
                    extensions.push(Extension {
                        id: 0,
                        payload: raw.copy_to_bytes(extension_len),
                    });
                }
            }
        }

        Ok(Header {
            version,
            padding,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension_profile,
            extensions,
        })
    }
}
