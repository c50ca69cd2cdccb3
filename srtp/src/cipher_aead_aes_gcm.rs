
use aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};

use crate::cipher::Cipher;
use crate::error::Error;
use crate::key_derivation::*;
use crate::protection_profile::ProtectionProfile;
use crate::Result;

const SRTCP_INDEX_SIZE: usize = 4;
const E_BIT: u32 = 0x8000_0000;
const IV_LEN: usize = 12;

enum AeadCipher {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl AeadCipher {
    fn new(key: &[u8]) -> Result<Self> {
        match key.len() {
            16 => Ok(AeadCipher::Aes128(Box::new(
                Aes128Gcm::new_from_slice(key).map_err(|_| Error::BadMasterKeyLength {
                    expected: 16,
                    actual: key.len(),
                })?,
            ))),
            32 => Ok(AeadCipher::Aes256(Box::new(
                Aes256Gcm::new_from_slice(key).map_err(|_| Error::BadMasterKeyLength {
                    expected: 32,
                    actual: key.len(),
                })?,
            ))),
            n => Err(Error::BadMasterKeyLength {
                expected: 16,
                actual: n,
            }),
        }
    }

    fn seal(&self, iv: &[u8; IV_LEN], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let payload = Payload { msg, aad };
        match self {
            AeadCipher::Aes128(c) => c.encrypt(Nonce::from_slice(iv), payload),
            AeadCipher::Aes256(c) => c.encrypt(Nonce::from_slice(iv), payload),
        }
        .map_err(|_| Error::AuthFailed)
    }

    fn open(&self, iv: &[u8; IV_LEN], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let payload = Payload { msg, aad };
        match self {
            AeadCipher::Aes128(c) => c.decrypt(Nonce::from_slice(iv), payload),
            AeadCipher::Aes256(c) => c.decrypt(Nonce::from_slice(iv), payload),
        }
        .map_err(|_| Error::AuthFailed)
    }
}

/// AEAD AES-GCM profiles (RFC 7714). The GCM tag replaces the separate
/// HMAC authentication tag.
pub struct CipherAeadAesGcm {
    profile: ProtectionProfile,
    srtp_cipher: AeadCipher,
    srtcp_cipher: AeadCipher,
    srtp_session_salt: Vec<u8>,
    srtcp_session_salt: Vec<u8>,
}

impl CipherAeadAesGcm {
    pub fn new(
        profile: ProtectionProfile,
        master_key: &[u8],
        master_salt: &[u8],
    ) -> Result<Self> {
        let srtp_key = aes_cm_key_derivation(
            LABEL_SRTP_ENCRYPTION,
            master_key,
            master_salt,
            master_key.len(),
        )?;
        let srtcp_key = aes_cm_key_derivation(
            LABEL_SRTCP_ENCRYPTION,
            master_key,
            master_salt,
            master_key.len(),
        )?;
        Ok(CipherAeadAesGcm {
            profile,
            srtp_cipher: AeadCipher::new(&srtp_key)?,
            srtcp_cipher: AeadCipher::new(&srtcp_key)?,
            srtp_session_salt: aes_cm_key_derivation(
                LABEL_SRTP_SALT,
                master_key,
                master_salt,
                IV_LEN,
            )?,
            srtcp_session_salt: aes_cm_key_derivation(
                LABEL_SRTCP_SALT,
                master_key,
                master_salt,
                IV_LEN,
            )?,
        })
    }

    /// RFC 7714 §8.1: `00 00 || SSRC || ROC || SEQ` XOR session salt.
    fn rtp_iv(&self, ssrc: u32, index: u64) -> [u8; IV_LEN] {
        let mut iv = [0u8; IV_LEN];
        iv[2..6].copy_from_slice(&ssrc.to_be_bytes());
        iv[6..10].copy_from_slice(&(((index >> 16) as u32).to_be_bytes()));
        iv[10..12].copy_from_slice(&((index as u16).to_be_bytes()));
        for (b, s) in iv.iter_mut().zip(&self.srtp_session_salt) {
            *b ^= s;
        }
        iv
    }

    /// RFC 7714 §9.1: `00 00 || SSRC || 00 00 || index` XOR session salt.
    fn rtcp_iv(&self, ssrc: u32, index: u32) -> [u8; IV_LEN] {
        let mut iv = [0u8; IV_LEN];
        iv[2..6].copy_from_slice(&ssrc.to_be_bytes());
        iv[8..12].copy_from_slice(&index.to_be_bytes());
        for (b, s) in iv.iter_mut().zip(&self.srtcp_session_salt) {
            *b ^= s;
        }
        iv
    }
}

impl Cipher for CipherAeadAesGcm {
    fn rtp_auth_tag_len(&self) -> usize {
        self.profile.rtp_auth_tag_len()
    }

    fn rtcp_auth_tag_len(&self) -> usize {
        self.profile.rtcp_auth_tag_len()
    }

    fn encrypt_rtp(
        &mut self,
        packet: &[u8],
        header_len: usize,
        ssrc: u32,
        index: u64,
    ) -> Result<Vec<u8>> {
        let iv = self.rtp_iv(ssrc, index);
        let (header, payload) = packet.split_at(header_len);
        let sealed = self.srtp_cipher.seal(&iv, payload, header)?;
        let mut out = header.to_vec();
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt_rtp(
        &mut self,
        packet: &[u8],
        header_len: usize,
        ssrc: u32,
        index: u64,
    ) -> Result<Vec<u8>> {
        if packet.len() < header_len + self.rtp_auth_tag_len() {
            return Err(Error::ShortPacket);
        }
        let iv = self.rtp_iv(ssrc, index);
        let (header, sealed) = packet.split_at(header_len);
        let opened = self.srtp_cipher.open(&iv, sealed, header)?;
        let mut out = header.to_vec();
        out.extend_from_slice(&opened);
        Ok(out)
    }

    fn encrypt_rtcp(&mut self, packet: &[u8], index: u32, ssrc: u32) -> Result<Vec<u8>> {
        if packet.len() < 8 {
            return Err(Error::BadRtcp);
        }
        let iv = self.rtcp_iv(ssrc, index);
        let trailer = (E_BIT | index).to_be_bytes();
        let mut aad = packet[..8].to_vec();
        aad.extend_from_slice(&trailer);
        let sealed = self.srtcp_cipher.seal(&iv, &packet[8..], &aad)?;
        let mut out = packet[..8].to_vec();
        out.extend_from_slice(&sealed);
        out.extend_from_slice(&trailer);
        Ok(out)
    }

    fn decrypt_rtcp(&mut self, packet: &[u8], index: u32, ssrc: u32) -> Result<Vec<u8>> {
        if packet.len() < 8 + SRTCP_INDEX_SIZE + self.rtcp_auth_tag_len() {
            return Err(Error::ShortPacket);
        }
        let iv = self.rtcp_iv(ssrc, index);
        let trailer = &packet[packet.len() - SRTCP_INDEX_SIZE..];
        let mut aad = packet[..8].to_vec();
        aad.extend_from_slice(trailer);
        let sealed = &packet[8..packet.len() - SRTCP_INDEX_SIZE];
        let opened = self.srtcp_cipher.open(&iv, sealed, &aad)?;
        let mut out = packet[..8].to_vec();
        out.extend_from_slice(&opened);
        Ok(out)
    }

    fn rtcp_index(&self, packet: &[u8]) -> Result<u32> {
        if packet.len() < 8 + SRTCP_INDEX_SIZE {
            return Err(Error::ShortPacket);
        }
        let at = packet.len() - SRTCP_INDEX_SIZE;
        let word = u32::from_be_bytes(packet[at..at + 4].try_into().expect("4 bytes"));
        Ok(word & !E_BIT)
    }
}
