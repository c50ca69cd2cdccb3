
use aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Nonce};

use crate::error::Error;
use crate::record::{ContentType, RecordHeader, PROTOCOL_VERSION};
use crate::Result;

pub const EXPLICIT_NONCE_LEN: usize = 8;
pub const GCM_TAG_LEN: usize = 16;

/// AES_128_GCM record protection (RFC 5288 adapted to DTLS): the explicit
/// nonce carried on the wire is the record's epoch and sequence number.
pub struct RecordCipher {
    write: Aes128Gcm,
    write_iv: [u8; 4],
    read: Aes128Gcm,
    read_iv: [u8; 4],
}

impl RecordCipher {
    pub fn new(
        write_key: &[u8],
        write_iv: &[u8],
        read_key: &[u8],
        read_iv: &[u8],
    ) -> Result<Self> {
        let make = |key: &[u8]| {
            Aes128Gcm::new_from_slice(key).map_err(|_| Error::Crypto("bad key length".into()))
        };
        let mut wiv = [0u8; 4];
        wiv.copy_from_slice(write_iv);
        let mut riv = [0u8; 4];
        riv.copy_from_slice(read_iv);
        Ok(RecordCipher {
            write: make(write_key)?,
            write_iv: wiv,
            read: make(read_key)?,
            read_iv: riv,
        })
    }

    fn explicit_nonce(header: &RecordHeader) -> [u8; EXPLICIT_NONCE_LEN] {
        let mut out = [0u8; EXPLICIT_NONCE_LEN];
        out[0..2].copy_from_slice(&header.epoch.to_be_bytes());
        out[2..8].copy_from_slice(&header.sequence.to_be_bytes()[2..8]);
        out
    }

    fn aad(explicit: &[u8], content_type: ContentType, length: usize) -> Vec<u8> {
        let mut aad = explicit.to_vec();
        aad.push(content_type.value());
        aad.push(PROTOCOL_VERSION.0);
        aad.push(PROTOCOL_VERSION.1);
        aad.extend_from_slice(&(length as u16).to_be_bytes());
        aad
    }

    /// Returns the wire payload: explicit nonce, ciphertext, tag.
    pub fn encrypt(&self, header: &RecordHeader, plaintext: &[u8]) -> Result<Vec<u8>> {
        let explicit = Self::explicit_nonce(header);
        let mut nonce = [0u8; 12];
        nonce[..4].copy_from_slice(&self.write_iv);
        nonce[4..].copy_from_slice(&explicit);
        let aad = Self::aad(&explicit, header.content_type, plaintext.len());
        let sealed = self
            .write
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::Crypto("seal failed".into()))?;
        let mut out = explicit.to_vec();
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    pub fn decrypt(&self, header: &RecordHeader, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < EXPLICIT_NONCE_LEN + GCM_TAG_LEN {
            return Err(Error::DecryptFailed);
        }
        let (explicit, sealed) = payload.split_at(EXPLICIT_NONCE_LEN);
        let mut nonce = [0u8; 12];
        nonce[..4].copy_from_slice(&self.read_iv);
        nonce[4..].copy_from_slice(explicit);
        let plain_len = sealed.len() - GCM_TAG_LEN;
        let aad = Self::aad(explicit, header.content_type, plain_len);
        self.read
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: sealed,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::DecryptFailed)
    }
}
