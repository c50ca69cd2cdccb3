#[cfg(test)]
mod prf_test;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], inputs: &[&[u8]]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    for input in inputs {
        mac.update(input);
    }
    mac.finalize().into_bytes().to_vec()
}

/// TLS 1.2 PRF (RFC 5246 §5) with P_SHA256, the only hash DTLS 1.2 needs
/// for this cipher suite.
pub fn prf(secret: &[u8], label: &[u8], seed: &[u8], out_len: usize) -> Vec<u8> {
    let mut label_seed = label.to_vec();
    label_seed.extend_from_slice(seed);

    let mut out = Vec::with_capacity(out_len);
    let mut a = hmac_sha256(secret, &[&label_seed]);
    while out.len() < out_len {
        let block = hmac_sha256(secret, &[&a, &label_seed]);
        out.extend_from_slice(&block);
        a = hmac_sha256(secret, &[&a]);
    }
    out.truncate(out_len);
    out
}

pub fn master_secret(pre_master: &[u8], client_random: &[u8], server_random: &[u8]) -> Vec<u8> {
    let mut seed = client_random.to_vec();
    seed.extend_from_slice(server_random);
    prf(pre_master, b"master secret", &seed, 48)
}

/// Key block for AES_128_GCM: client/server write keys then implicit IVs.
pub struct KeyBlock {
    pub client_write_key: Vec<u8>,
    pub server_write_key: Vec<u8>,
    pub client_write_iv: Vec<u8>,
    pub server_write_iv: Vec<u8>,
}

pub fn key_block(master: &[u8], client_random: &[u8], server_random: &[u8]) -> KeyBlock {
    let mut seed = server_random.to_vec();
    seed.extend_from_slice(client_random);
    let material = prf(master, b"key expansion", &seed, 40);
    KeyBlock {
        client_write_key: material[0..16].to_vec(),
        server_write_key: material[16..32].to_vec(),
        client_write_iv: material[32..36].to_vec(),
        server_write_iv: material[36..40].to_vec(),
    }
}

pub fn verify_data(master: &[u8], label: &[u8], transcript: &[u8]) -> Vec<u8> {
    let digest = Sha256::digest(transcript);
    prf(master, label, &digest, 12)
}

/// RFC 5705 keying material exporter, without context.
pub fn export_keying_material(
    master: &[u8],
    label: &[u8],
    client_random: &[u8],
    server_random: &[u8],
    out_len: usize,
) -> Vec<u8> {
    let mut seed = client_random.to_vec();
    seed.extend_from_slice(server_random);
    prf(master, label, &seed, out_len)
}
