
use aes::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::cipher::{aes_cm_iv, Cipher};
use crate::error::Error;
use crate::key_derivation::*;
use crate::protection_profile::ProtectionProfile;
use crate::Result;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type HmacSha1 = Hmac<Sha1>;

const SRTCP_INDEX_SIZE: usize = 4;
const E_BIT: u32 = 0x8000_0000;

/// AES-128 counter mode with HMAC-SHA1 authentication
/// (AES_128_CM_HMAC_SHA1_80 / _32).
pub struct CipherAesCmHmacSha1 {
    profile: ProtectionProfile,
    srtp_session_key: Vec<u8>,
    srtp_session_salt: Vec<u8>,
    srtp_session_auth: Vec<u8>,
    srtcp_session_key: Vec<u8>,
    srtcp_session_salt: Vec<u8>,
    srtcp_session_auth: Vec<u8>,
}

impl CipherAesCmHmacSha1 {
    pub fn new(
        profile: ProtectionProfile,
        master_key: &[u8],
        master_salt: &[u8],
    ) -> Result<Self> {
        Ok(CipherAesCmHmacSha1 {
            profile,
            srtp_session_key: aes_cm_key_derivation(
                LABEL_SRTP_ENCRYPTION,
                master_key,
                master_salt,
                master_key.len(),
            )?,
            srtp_session_salt: aes_cm_key_derivation(
                LABEL_SRTP_SALT,
                master_key,
                master_salt,
                master_salt.len(),
            )?,
            srtp_session_auth: aes_cm_key_derivation(
                LABEL_SRTP_AUTHENTICATION,
                master_key,
                master_salt,
                20,
            )?,
            srtcp_session_key: aes_cm_key_derivation(
                LABEL_SRTCP_ENCRYPTION,
                master_key,
                master_salt,
                master_key.len(),
            )?,
            srtcp_session_salt: aes_cm_key_derivation(
                LABEL_SRTCP_SALT,
                master_key,
                master_salt,
                master_salt.len(),
            )?,
            srtcp_session_auth: aes_cm_key_derivation(
                LABEL_SRTCP_AUTHENTICATION,
                master_key,
                master_salt,
                20,
            )?,
        })
    }

    fn xor_keystream(key: &[u8], iv: &[u8; 16], data: &mut [u8]) {
        let mut cipher = Aes128Ctr::new(key.into(), iv.into());
        cipher.apply_keystream(data);
    }

    /// SRTP tag: HMAC over the packet followed by the big-endian ROC.
    fn rtp_tag(&self, packet: &[u8], roc: u32) -> Vec<u8> {
        let mut mac = HmacSha1::new_from_slice(&self.srtp_session_auth)
            .expect("hmac accepts any key length");
        mac.update(packet);
        mac.update(&roc.to_be_bytes());
        mac.finalize().into_bytes()[..self.rtp_auth_tag_len()].to_vec()
    }

    /// SRTCP tag: HMAC over everything up to and including the E+index
    /// trailer.
    fn rtcp_tag(&self, packet: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha1::new_from_slice(&self.srtcp_session_auth)
            .expect("hmac accepts any key length");
        mac.update(packet);
        mac.finalize().into_bytes()[..self.rtcp_auth_tag_len()].to_vec()
    }
}

impl Cipher for CipherAesCmHmacSha1 {
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
        let mut out = packet.to_vec();
        let iv = aes_cm_iv(&self.srtp_session_salt, ssrc, index);
        Self::xor_keystream(&self.srtp_session_key, &iv, &mut out[header_len..]);
        let tag = self.rtp_tag(&out, (index >> 16) as u32);
        out.extend_from_slice(&tag);
        Ok(out)
    }

    fn decrypt_rtp(
        &mut self,
        packet: &[u8],
        header_len: usize,
        ssrc: u32,
        index: u64,
    ) -> Result<Vec<u8>> {
        let tag_len = self.rtp_auth_tag_len();
        if packet.len() < header_len + tag_len {
            return Err(Error::ShortPacket);
        }
        let (body, tag) = packet.split_at(packet.len() - tag_len);
        let expected = self.rtp_tag(body, (index >> 16) as u32);
        if !bool::from(expected.as_slice().ct_eq(tag)) {
            return Err(Error::AuthFailed);
        }
        let mut out = body.to_vec();
        let iv = aes_cm_iv(&self.srtp_session_salt, ssrc, index);
        Self::xor_keystream(&self.srtp_session_key, &iv, &mut out[header_len..]);
        Ok(out)
    }

    fn encrypt_rtcp(&mut self, packet: &[u8], index: u32, ssrc: u32) -> Result<Vec<u8>> {
        if packet.len() < 8 {
            return Err(Error::BadRtcp);
        }
        let mut out = packet.to_vec();
        let iv = aes_cm_iv(&self.srtcp_session_salt, ssrc, index as u64);
        Self::xor_keystream(&self.srtcp_session_key, &iv, &mut out[8..]);
        out.extend_from_slice(&(E_BIT | index).to_be_bytes());
        let tag = self.rtcp_tag(&out);
        out.extend_from_slice(&tag);
        Ok(out)
    }

    fn decrypt_rtcp(&mut self, packet: &[u8], index: u32, ssrc: u32) -> Result<Vec<u8>> {
        let tag_len = self.rtcp_auth_tag_len();
        if packet.len() < 8 + SRTCP_INDEX_SIZE + tag_len {
            return Err(Error::ShortPacket);
        }
        let (body, tag) = packet.split_at(packet.len() - tag_len);
        let expected = self.rtcp_tag(body);
        if !bool::from(expected.as_slice().ct_eq(tag)) {
            return Err(Error::AuthFailed);
        }
        let trailer =
            u32::from_be_bytes(body[body.len() - 4..].try_into().expect("4 bytes"));
        let mut out = body[..body.len() - SRTCP_INDEX_SIZE].to_vec();
        if trailer & E_BIT != 0 {
            let iv = aes_cm_iv(&self.srtcp_session_salt, ssrc, index as u64);
            Self::xor_keystream(&self.srtcp_session_key, &iv, &mut out[8..]);
        }
        Ok(out)
    }

    fn rtcp_index(&self, packet: &[u8]) -> Result<u32> {
        let tail = self.rtcp_auth_tag_len() + SRTCP_INDEX_SIZE;
        if packet.len() < 8 + tail {
            return Err(Error::ShortPacket);
        }
        let at = packet.len() - tail;
        let word = u32::from_be_bytes(packet[at..at + 4].try_into().expect("4 bytes"));
        Ok(word & !E_BIT)
    }
}
