#[cfg(test)]
mod fingerprint_test;

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::attributes::*;
use crate::error::Error;
use crate::message::*;
use crate::Result;

const FINGERPRINT_XOR: u32 = 0x5354_554e;
const FINGERPRINT_SIZE: usize = 4;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn checksum(covered: &[u8]) -> u32 {
    CRC32.checksum(covered) ^ FINGERPRINT_XOR
}

/// FINGERPRINT attribute (RFC 5389 §15.5). Always the last attribute.
pub struct Fingerprint;

impl Fingerprint {
    pub fn add_to(m: &mut Message) -> Result<()> {
        let mut covered = m.raw.clone();
        let patched =
            m.attr_length() + (ATTRIBUTE_HEADER_SIZE + FINGERPRINT_SIZE) as u16;
        covered[2..4].copy_from_slice(&patched.to_be_bytes());
        let crc = checksum(&covered);
        m.append(ATTR_FINGERPRINT, &crc.to_be_bytes())
    }

    pub fn check(m: &Message) -> Result<()> {
        let attr = m
            .attributes
            .get(ATTR_FINGERPRINT)
            .ok_or(Error::AttributeNotFound)?;
        if attr.value.len() != FINGERPRINT_SIZE {
            return Err(Error::FingerprintMismatch);
        }
        let mut covered = m.raw[..attr.offset].to_vec();
        let patched = (attr.offset - MESSAGE_HEADER_SIZE + ATTRIBUTE_HEADER_SIZE
            + FINGERPRINT_SIZE) as u16;
        covered[2..4].copy_from_slice(&patched.to_be_bytes());
        let expected = checksum(&covered);
        let got = u32::from_be_bytes([
            attr.value[0],
            attr.value[1],
            attr.value[2],
            attr.value[3],
        ]);
        if expected == got {
            Ok(())
        } else {
            Err(Error::FingerprintMismatch)
        }
    }
}
