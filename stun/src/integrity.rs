#[cfg(test)]
mod integrity_test;

use md5::{Digest, Md5};
use ring::hmac;
use subtle::ConstantTimeEq;

use crate::attributes::*;
use crate::error::Error;
use crate::message::*;
use crate::Result;

pub(crate) const INTEGRITY_SIZE: usize = 20;

/// MESSAGE-INTEGRITY attribute: HMAC-SHA1 over the message up to (and
/// patched to include) the integrity attribute itself (RFC 5389 §15.4).
#[derive(Clone)]
pub struct MessageIntegrity(Vec<u8>);

impl MessageIntegrity {
    /// Short-term credential key: the raw password (ICE uses this with the
    /// remote peer's `pwd`).
    pub fn new_short_term(password: &str) -> Self {
        MessageIntegrity(password.as_bytes().to_vec())
    }

    /// Long-term credential key: MD5 of `username:realm:password`
    /// (TURN allocations).
    pub fn new_long_term(username: &str, realm: &str, password: &str) -> Self {
        let mut h = Md5::new();
        h.update(format!("{username}:{realm}:{password}").as_bytes());
        MessageIntegrity(h.finalize().to_vec())
    }

    fn sign(&self, covered: &[u8]) -> Vec<u8> {
        let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, &self.0);
        hmac::sign(&key, covered).as_ref().to_vec()
    }

    /// Appends the integrity attribute. The HMAC input carries a header
    /// length already adjusted for the integrity TLV, per the RFC.
    pub fn add_to(&self, m: &mut Message) -> Result<()> {
        if m.contains(ATTR_FINGERPRINT) {
            return Err(Error::FingerprintBeforeIntegrity);
        }
        let mut covered = m.raw.clone();
        let patched =
            m.attr_length() + (ATTRIBUTE_HEADER_SIZE + INTEGRITY_SIZE) as u16;
        covered[2..4].copy_from_slice(&patched.to_be_bytes());
        let tag = self.sign(&covered);
        m.append(ATTR_MESSAGE_INTEGRITY, &tag)
    }

    /// Verifies the integrity attribute against this key.
    pub fn check(&self, m: &Message) -> Result<()> {
        let attr = m
            .attributes
            .get(ATTR_MESSAGE_INTEGRITY)
            .ok_or(Error::AttributeNotFound)?;
        if attr.value.len() != INTEGRITY_SIZE {
            return Err(Error::BadIntegrity);
        }
        let mut covered = m.raw[..attr.offset].to_vec();
        let patched = (attr.offset - MESSAGE_HEADER_SIZE + ATTRIBUTE_HEADER_SIZE
            + INTEGRITY_SIZE) as u16;
        covered[2..4].copy_from_slice(&patched.to_be_bytes());
        let expected = self.sign(&covered);
        if bool::from(expected.as_slice().ct_eq(attr.value.as_slice())) {
            Ok(())
        } else {
            Err(Error::BadIntegrity)
        }
    }
}

impl std::fmt::Debug for MessageIntegrity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageIntegrity(..)")
    }
}
