#[cfg(test)]
mod context_test;

use std::collections::HashMap;

use bytes::Bytes;
use util::replay_detector::{ReplayDetector, SlidingWindowDetector};

use crate::cipher::Cipher;
use crate::cipher_aead_aes_gcm::CipherAeadAesGcm;
use crate::cipher_aes_cm_hmac_sha1::CipherAesCmHmacSha1;
use crate::error::Error;
use crate::protection_profile::ProtectionProfile;
use crate::Result;

/// Default replay window, in packets.
pub const DEFAULT_REPLAY_WINDOW: u64 = 64;

const MAX_SRTP_INDEX: u64 = (1 << 48) - 1;
const MAX_SRTCP_INDEX: u32 = (1 << 31) - 1;

#[derive(Debug)]
struct SrtpSsrcState {
    /// Highest authenticated 48-bit extended sequence.
    index: u64,
    started: bool,
    replay: SlidingWindowDetector,
}

impl SrtpSsrcState {
    fn new() -> Self {
        SrtpSsrcState {
            index: 0,
            started: false,
            replay: SlidingWindowDetector::new(DEFAULT_REPLAY_WINDOW, MAX_SRTP_INDEX),
        }
    }

    /// RFC 3711 appendix A: guess the packet index from the 16-bit
    /// sequence number and the highest index seen so far.
    fn estimate(&self, seq: u16) -> u64 {
        if !self.started {
            return seq as u64;
        }
        let roc = self.index >> 16;
        let s_l = (self.index & 0xffff) as u16;
        let v = if s_l < 0x8000 {
            if seq > s_l && seq - s_l > 0x8000 {
                roc.saturating_sub(1)
            } else {
                roc
            }
        } else if s_l - 0x8000 > seq {
            roc + 1
        } else {
            roc
        };
        (v << 16) | seq as u64
    }

    fn update(&mut self, index: u64) {
        if !self.started || index > self.index {
            self.index = index;
        }
        self.started = true;
    }
}

#[derive(Debug)]
struct SrtcpSsrcState {
    next_index: u32,
    replay: SlidingWindowDetector,
}

impl SrtcpSsrcState {
    fn new() -> Self {
        SrtcpSsrcState {
            next_index: 0,
            replay: SlidingWindowDetector::new(
                DEFAULT_REPLAY_WINDOW,
                MAX_SRTCP_INDEX as u64,
            ),
        }
    }
}

/// SRTP/SRTCP cryptographic context for one direction. A context must be
/// used only for protecting or only for unprotecting; sender and receiver
/// each hold their own.
pub struct Context {
    cipher: Box<dyn Cipher>,
    replay_protection: bool,
    srtp_states: HashMap<u32, SrtpSsrcState>,
    srtcp_states: HashMap<u32, SrtcpSsrcState>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("replay_protection", &self.replay_protection)
            .field("srtp_states", &self.srtp_states)
            .field("srtcp_states", &self.srtcp_states)
            .finish()
    }
}

impl Context {
    pub fn new(
        master_key: &[u8],
        master_salt: &[u8],
        profile: ProtectionProfile,
        replay_protection: bool,
    ) -> Result<Self> {
        if master_key.len() != profile.key_len() {
            return Err(Error::BadMasterKeyLength {
                expected: profile.key_len(),
                actual: master_key.len(),
            });
        }
        if master_salt.len() != profile.salt_len() {
            return Err(Error::BadMasterSaltLength {
                expected: profile.salt_len(),
                actual: master_salt.len(),
            });
        }
        let cipher: Box<dyn Cipher> = match profile {
            ProtectionProfile::Aes128CmHmacSha1_80
            | ProtectionProfile::Aes128CmHmacSha1_32 => {
                Box::new(CipherAesCmHmacSha1::new(profile, master_key, master_salt)?)
            }
            ProtectionProfile::AeadAes128Gcm | ProtectionProfile::AeadAes256Gcm => {
                Box::new(CipherAeadAesGcm::new(profile, master_key, master_salt)?)
            }
        };
        Ok(Context {
            cipher,
            replay_protection,
            srtp_states: HashMap::new(),
            srtcp_states: HashMap::new(),
        })
    }

    /// Byte length of the (possibly extended) RTP header, read straight
    /// off the wire so internal extension padding cannot skew it.
    fn rtp_header_len(packet: &[u8]) -> Result<usize> {
        if packet.len() < 12 {
            return Err(Error::ShortPacket);
        }
        let csrc_count = (packet[0] & 0x0f) as usize;
        let mut len = 12 + csrc_count * 4;
        if packet[0] & 0x10 != 0 {
            if packet.len() < len + 4 {
                return Err(Error::ShortPacket);
            }
            let ext_words =
                u16::from_be_bytes([packet[len + 2], packet[len + 3]]) as usize;
            len += 4 + ext_words * 4;
        }
        if packet.len() < len {
            return Err(Error::ShortPacket);
        }
        Ok(len)
    }

    /// Protects a plaintext RTP packet.
    pub fn encrypt_rtp(&mut self, packet: &[u8]) -> Result<Bytes> {
        let header_len = Self::rtp_header_len(packet)?;
        let seq = u16::from_be_bytes([packet[2], packet[3]]);
        let ssrc = u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]);

        let state = self.srtp_states.entry(ssrc).or_insert_with(SrtpSsrcState::new);
        let index = state.estimate(seq);
        if index >= MAX_SRTP_INDEX {
            return Err(Error::ExceededMaxPackets);
        }
        state.update(index);
        let out = self.cipher.encrypt_rtp(packet, header_len, ssrc, index)?;
        Ok(Bytes::from(out))
    }

    /// Authenticates and decrypts an SRTP packet. Replays and forgeries
    /// are rejected without advancing any state.
    pub fn decrypt_rtp(&mut self, packet: &[u8]) -> Result<Bytes> {
        let header_len = Self::rtp_header_len(packet)?;
        if packet.len() < header_len + self.cipher.rtp_auth_tag_len() {
            return Err(Error::ShortPacket);
        }
        let seq = u16::from_be_bytes([packet[2], packet[3]]);
        let ssrc = u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]);

        let state = self.srtp_states.entry(ssrc).or_insert_with(SrtpSsrcState::new);
        let index = state.estimate(seq);
        if self.replay_protection && !state.replay.check(index) {
            return Err(Error::Replayed { ssrc, index });
        }
        let out = self.cipher.decrypt_rtp(packet, header_len, ssrc, index)?;
        let state = self
            .srtp_states
            .get_mut(&ssrc)
            .expect("state inserted above");
        if self.replay_protection {
            state.replay.accept();
        }
        state.update(index);
        Ok(Bytes::from(out))
    }

    /// Protects a plaintext compound RTCP packet.
    pub fn encrypt_rtcp(&mut self, packet: &[u8]) -> Result<Bytes> {
        if packet.len() < 8 {
            return Err(Error::BadRtcp);
        }
        let ssrc = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);
        let state = self
            .srtcp_states
            .entry(ssrc)
            .or_insert_with(SrtcpSsrcState::new);
        let index = state.next_index;
        state.next_index = (state.next_index + 1) & MAX_SRTCP_INDEX;
        let out = self.cipher.encrypt_rtcp(packet, index, ssrc)?;
        Ok(Bytes::from(out))
    }

    /// Authenticates and decrypts an SRTCP packet.
    pub fn decrypt_rtcp(&mut self, packet: &[u8]) -> Result<Bytes> {
        if packet.len() < 8 {
            return Err(Error::BadRtcp);
        }
        let ssrc = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);
        let index = self.cipher.rtcp_index(packet)?;

        let state = self
            .srtcp_states
            .entry(ssrc)
            .or_insert_with(SrtcpSsrcState::new);
        if self.replay_protection && !state.replay.check(index as u64) {
            return Err(Error::Replayed {
                ssrc,
                index: index as u64,
            });
        }
        let out = self.cipher.decrypt_rtcp(packet, index, ssrc)?;
        if self.replay_protection {
            let state = self
                .srtcp_states
                .get_mut(&ssrc)
                .expect("state inserted above");
            state.replay.accept();
        }
        Ok(Bytes::from(out))
    }

    /// Rollover counter for an SSRC, if any packet has been processed.
    pub fn roc(&self, ssrc: u32) -> Option<u32> {
        self.srtp_states.get(&ssrc).map(|s| (s.index >> 16) as u32)
    }
}
