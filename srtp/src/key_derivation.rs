#[cfg(test)]
mod key_derivation_test;

use aes::cipher::{KeyIvInit, StreamCipher};

use crate::error::Error;
use crate::Result;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

pub const LABEL_SRTP_ENCRYPTION: u8 = 0x00;
pub const LABEL_SRTP_AUTHENTICATION: u8 = 0x01;
pub const LABEL_SRTP_SALT: u8 = 0x02;
pub const LABEL_SRTCP_ENCRYPTION: u8 = 0x03;
pub const LABEL_SRTCP_AUTHENTICATION: u8 = 0x04;
pub const LABEL_SRTCP_SALT: u8 = 0x05;

/// RFC 3711 §4.3.1 AES-CM key derivation with a key derivation rate of
/// zero: session material is the AES-CTR keystream over a block built from
/// the master salt and the usage label.
pub fn aes_cm_key_derivation(
    label: u8,
    master_key: &[u8],
    master_salt: &[u8],
    out_len: usize,
) -> Result<Vec<u8>> {
    if master_salt.len() > 14 {
        return Err(Error::BadMasterSaltLength {
            expected: 14,
            actual: master_salt.len(),
        });
    }

    // x = (label || index/kdr) XOR master_salt, left-aligned in a block
    // whose low 16 bits are the keystream counter.
    let mut block = [0u8; 16];
    block[..master_salt.len()].copy_from_slice(master_salt);
    block[7] ^= label;

    let mut out = vec![0u8; out_len];
    match master_key.len() {
        16 => {
            let mut cipher = Aes128Ctr::new(master_key.into(), (&block).into());
            cipher.apply_keystream(&mut out);
        }
        32 => {
            let mut cipher = Aes256Ctr::new(master_key.into(), (&block).into());
            cipher.apply_keystream(&mut out);
        }
        n => {
            return Err(Error::BadMasterKeyLength {
                expected: 16,
                actual: n,
            })
        }
    }
    Ok(out)
}
