
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::DecodePrivateKey;

use crate::error::Error;
use crate::Result;

/// A self-signed ECDSA P-256 certificate and its signing key. Generated
/// once per PeerConnection; trust is established by comparing the SHA-256
/// fingerprint against the value signaled in SDP, not by chain validation.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    signing_key: SigningKey,
}

impl Certificate {
    pub fn generate_self_signed() -> Result<Self> {
        let key_pair = rcgen::KeyPair::generate()
            .map_err(|e| Error::CertificateGeneration(e.to_string()))?;
        let params = rcgen::CertificateParams::new(vec!["peerlink".to_owned()])
            .map_err(|e| Error::CertificateGeneration(e.to_string()))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::CertificateGeneration(e.to_string()))?;
        let signing_key = SigningKey::from_pkcs8_der(&key_pair.serialize_der())
            .map_err(|e| Error::CertificateGeneration(e.to_string()))?;
        Ok(Certificate {
            der: cert.der().to_vec(),
            signing_key,
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// `XX:YY:..` uppercase hex of SHA-256 over the DER, the form carried
    /// in `a=fingerprint:sha-256`.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.der)
    }

    /// ECDSA-SHA256 signature in DER form.
    pub(crate) fn sign(&self, data: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(data);
        signature.to_der().as_bytes().to_vec()
    }
}

pub fn fingerprint_of(der: &[u8]) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, der);
    digest
        .as_ref()
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Extracts the uncompressed P-256 point from a certificate's
/// SubjectPublicKeyInfo.
fn spki_point(cert_der: &[u8]) -> Result<Vec<u8>> {
    let (_, cert) = x509_parser::parse_x509_certificate(cert_der)
        .map_err(|e| Error::Crypto(e.to_string()))?;
    Ok(cert.public_key().subject_public_key.data.to_vec())
}

/// Verifies an ECDSA-SHA256 DER signature against the public key of the
/// given certificate.
pub fn verify_signature(cert_der: &[u8], data: &[u8], signature_der: &[u8]) -> Result<()> {
    let point = spki_point(cert_der)?;
    let key = VerifyingKey::from_sec1_bytes(&point).map_err(|_| Error::BadSignature)?;
    let signature = Signature::from_der(signature_der).map_err(|_| Error::BadSignature)?;
    key.verify(data, &signature).map_err(|_| Error::BadSignature)
}

/// The signed portion of ServerKeyExchange (RFC 4492 §5.4): both hello
/// randoms followed by the ECDH params.
pub fn server_key_exchange_signed_data(
    client_random: &[u8],
    server_random: &[u8],
    named_curve: u16,
    public_key: &[u8],
) -> Vec<u8> {
    let mut out = client_random.to_vec();
    out.extend_from_slice(server_random);
    out.push(crate::handshake::CURVE_TYPE_NAMED);
    out.extend_from_slice(&named_curve.to_be_bytes());
    out.push(public_key.len() as u8);
    out.extend_from_slice(public_key);
    out
}
