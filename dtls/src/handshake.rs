#[cfg(test)]
mod handshake_test;

use rand::Rng;

use crate::error::Error;
use crate::extension::{marshal_extensions, unmarshal_extensions, Extension};
use crate::Result;

pub const HANDSHAKE_HEADER_SIZE: usize = 12;

pub const MSG_CLIENT_HELLO: u8 = 1;
pub const MSG_SERVER_HELLO: u8 = 2;
pub const MSG_HELLO_VERIFY_REQUEST: u8 = 3;
pub const MSG_CERTIFICATE: u8 = 11;
pub const MSG_SERVER_KEY_EXCHANGE: u8 = 12;
pub const MSG_CERTIFICATE_REQUEST: u8 = 13;
pub const MSG_SERVER_HELLO_DONE: u8 = 14;
pub const MSG_CERTIFICATE_VERIFY: u8 = 15;
pub const MSG_CLIENT_KEY_EXCHANGE: u8 = 16;
pub const MSG_FINISHED: u8 = 20;

/// TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256, the one suite this stack
/// negotiates.
pub const CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256: u16 = 0xc02b;

/// ECDHE curve_type value for a named curve.
pub const CURVE_TYPE_NAMED: u8 = 3;

/// DTLS handshake message header (RFC 6347 §4.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeHeader {
    pub msg_type: u8,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl HandshakeHeader {
    pub fn marshal(&self) -> [u8; HANDSHAKE_HEADER_SIZE] {
        let mut out = [0u8; HANDSHAKE_HEADER_SIZE];
        out[0] = self.msg_type;
        out[1..4].copy_from_slice(&self.length.to_be_bytes()[1..4]);
        out[4..6].copy_from_slice(&self.message_seq.to_be_bytes());
        out[6..9].copy_from_slice(&self.fragment_offset.to_be_bytes()[1..4]);
        out[9..12].copy_from_slice(&self.fragment_length.to_be_bytes()[1..4]);
        out
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < HANDSHAKE_HEADER_SIZE {
            return Err(Error::BadHandshake);
        }
        Ok(HandshakeHeader {
            msg_type: raw[0],
            length: u32::from_be_bytes([0, raw[1], raw[2], raw[3]]),
            message_seq: u16::from_be_bytes([raw[4], raw[5]]),
            fragment_offset: u32::from_be_bytes([0, raw[6], raw[7], raw[8]]),
            fragment_length: u32::from_be_bytes([0, raw[9], raw[10], raw[11]]),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Random(pub [u8; 32]);

impl Random {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill(&mut bytes);
        Random(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub random: Random,
    pub session_id: Vec<u8>,
    pub cookie: Vec<u8>,
    pub cipher_suites: Vec<u16>,
    pub extensions: Vec<Extension>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub random: Random,
    pub session_id: Vec<u8>,
    pub cipher_suite: u16,
    pub extensions: Vec<Extension>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloVerifyRequest {
    pub cookie: Vec<u8>,
}

/// Each certificate is a DER-encoded X.509 blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateMsg {
    pub certificates: Vec<Vec<u8>>,
}

/// ECDHE params over one named curve, signed with ecdsa_secp256r1_sha256.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyExchange {
    pub named_curve: u16,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKeyExchange {
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerify {
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    HelloVerifyRequest(HelloVerifyRequest),
    Certificate(CertificateMsg),
    ServerKeyExchange(ServerKeyExchange),
    CertificateRequest,
    ServerHelloDone,
    ClientKeyExchange(ClientKeyExchange),
    CertificateVerify(CertificateVerify),
    Finished(Finished),
}

impl HandshakeMessage {
    pub fn msg_type(&self) -> u8 {
        match self {
            HandshakeMessage::ClientHello(_) => MSG_CLIENT_HELLO,
            HandshakeMessage::ServerHello(_) => MSG_SERVER_HELLO,
            HandshakeMessage::HelloVerifyRequest(_) => MSG_HELLO_VERIFY_REQUEST,
            HandshakeMessage::Certificate(_) => MSG_CERTIFICATE,
            HandshakeMessage::ServerKeyExchange(_) => MSG_SERVER_KEY_EXCHANGE,
            HandshakeMessage::CertificateRequest => MSG_CERTIFICATE_REQUEST,
            HandshakeMessage::ServerHelloDone => MSG_SERVER_HELLO_DONE,
            HandshakeMessage::ClientKeyExchange(_) => MSG_CLIENT_KEY_EXCHANGE,
            HandshakeMessage::CertificateVerify(_) => MSG_CERTIFICATE_VERIFY,
            HandshakeMessage::Finished(_) => MSG_FINISHED,
        }
    }

    pub fn marshal_body(&self) -> Vec<u8> {
        match self {
            HandshakeMessage::ClientHello(ch) => {
                let mut out = vec![254, 253];
                out.extend_from_slice(&ch.random.0);
                out.push(ch.session_id.len() as u8);
                out.extend_from_slice(&ch.session_id);
                out.push(ch.cookie.len() as u8);
                out.extend_from_slice(&ch.cookie);
                out.extend_from_slice(&((ch.cipher_suites.len() * 2) as u16).to_be_bytes());
                for cs in &ch.cipher_suites {
                    out.extend_from_slice(&cs.to_be_bytes());
                }
                out.extend_from_slice(&[1, 0]); // null compression only
                out.extend_from_slice(&marshal_extensions(&ch.extensions));
                out
            }
            HandshakeMessage::ServerHello(sh) => {
                let mut out = vec![254, 253];
                out.extend_from_slice(&sh.random.0);
                out.push(sh.session_id.len() as u8);
                out.extend_from_slice(&sh.session_id);
                out.extend_from_slice(&sh.cipher_suite.to_be_bytes());
                out.push(0); // null compression
                out.extend_from_slice(&marshal_extensions(&sh.extensions));
                out
            }
            HandshakeMessage::HelloVerifyRequest(hvr) => {
                let mut out = vec![254, 253];
                out.push(hvr.cookie.len() as u8);
                out.extend_from_slice(&hvr.cookie);
                out
            }
            HandshakeMessage::Certificate(c) => {
                let total: usize = c.certificates.iter().map(|c| 3 + c.len()).sum();
                let mut out = (total as u32).to_be_bytes()[1..4].to_vec();
                for cert in &c.certificates {
                    out.extend_from_slice(&(cert.len() as u32).to_be_bytes()[1..4]);
                    out.extend_from_slice(cert);
                }
                out
            }
            HandshakeMessage::ServerKeyExchange(ske) => {
                let mut out = vec![CURVE_TYPE_NAMED];
                out.extend_from_slice(&ske.named_curve.to_be_bytes());
                out.push(ske.public_key.len() as u8);
                out.extend_from_slice(&ske.public_key);
                out.extend_from_slice(&[0x04, 0x03]); // ecdsa_secp256r1_sha256
                out.extend_from_slice(&(ske.signature.len() as u16).to_be_bytes());
                out.extend_from_slice(&ske.signature);
                out
            }
            HandshakeMessage::CertificateRequest => {
                // ecdsa_sign, one signature algorithm, no CA constraint.
                vec![1, 64, 0, 2, 0x04, 0x03, 0, 0]
            }
            HandshakeMessage::ServerHelloDone => vec![],
            HandshakeMessage::ClientKeyExchange(cke) => {
                let mut out = vec![cke.public_key.len() as u8];
                out.extend_from_slice(&cke.public_key);
                out
            }
            HandshakeMessage::CertificateVerify(cv) => {
                let mut out = vec![0x04, 0x03];
                out.extend_from_slice(&(cv.signature.len() as u16).to_be_bytes());
                out.extend_from_slice(&cv.signature);
                out
            }
            HandshakeMessage::Finished(f) => f.verify_data.clone(),
        }
    }

    pub fn unmarshal_body(msg_type: u8, body: &[u8]) -> Result<Self> {
        match msg_type {
            MSG_CLIENT_HELLO => {
                if body.len() < 2 + 32 + 1 {
                    return Err(Error::BadHandshake);
                }
                let mut at = 2;
                let mut random = [0u8; 32];
                random.copy_from_slice(&body[at..at + 32]);
                at += 32;
                let sid_len = body[at] as usize;
                at += 1;
                if body.len() < at + sid_len + 1 {
                    return Err(Error::BadHandshake);
                }
                let session_id = body[at..at + sid_len].to_vec();
                at += sid_len;
                let cookie_len = body[at] as usize;
                at += 1;
                if body.len() < at + cookie_len + 2 {
                    return Err(Error::BadHandshake);
                }
                let cookie = body[at..at + cookie_len].to_vec();
                at += cookie_len;
                let cs_len = u16::from_be_bytes([body[at], body[at + 1]]) as usize;
                at += 2;
                if cs_len % 2 != 0 || body.len() < at + cs_len + 2 {
                    return Err(Error::BadHandshake);
                }
                let cipher_suites = body[at..at + cs_len]
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                at += cs_len;
                let comp_len = body[at] as usize;
                at += 1 + comp_len;
                if body.len() < at {
                    return Err(Error::BadHandshake);
                }
                let (extensions, _) = unmarshal_extensions(&body[at..])?;
                Ok(HandshakeMessage::ClientHello(ClientHello {
                    random: Random(random),
                    session_id,
                    cookie,
                    cipher_suites,
                    extensions,
                }))
            }
            MSG_SERVER_HELLO => {
                if body.len() < 2 + 32 + 1 {
                    return Err(Error::BadHandshake);
                }
                let mut at = 2;
                let mut random = [0u8; 32];
                random.copy_from_slice(&body[at..at + 32]);
                at += 32;
                let sid_len = body[at] as usize;
                at += 1;
                if body.len() < at + sid_len + 3 {
                    return Err(Error::BadHandshake);
                }
                let session_id = body[at..at + sid_len].to_vec();
                at += sid_len;
                let cipher_suite = u16::from_be_bytes([body[at], body[at + 1]]);
                at += 3; // suite + compression
                let (extensions, _) = unmarshal_extensions(&body[at..])?;
                Ok(HandshakeMessage::ServerHello(ServerHello {
                    random: Random(random),
                    session_id,
                    cipher_suite,
                    extensions,
                }))
            }
            MSG_HELLO_VERIFY_REQUEST => {
                if body.len() < 3 {
                    return Err(Error::BadHandshake);
                }
                let cookie_len = body[2] as usize;
                if body.len() < 3 + cookie_len {
                    return Err(Error::BadHandshake);
                }
                Ok(HandshakeMessage::HelloVerifyRequest(HelloVerifyRequest {
                    cookie: body[3..3 + cookie_len].to_vec(),
                }))
            }
            MSG_CERTIFICATE => {
                if body.len() < 3 {
                    return Err(Error::BadHandshake);
                }
                let total = u32::from_be_bytes([0, body[0], body[1], body[2]]) as usize;
                if body.len() < 3 + total {
                    return Err(Error::BadHandshake);
                }
                let mut rest = &body[3..3 + total];
                let mut certificates = vec![];
                while !rest.is_empty() {
                    if rest.len() < 3 {
                        return Err(Error::BadHandshake);
                    }
                    let len = u32::from_be_bytes([0, rest[0], rest[1], rest[2]]) as usize;
                    if rest.len() < 3 + len {
                        return Err(Error::BadHandshake);
                    }
                    certificates.push(rest[3..3 + len].to_vec());
                    rest = &rest[3 + len..];
                }
                Ok(HandshakeMessage::Certificate(CertificateMsg { certificates }))
            }
            MSG_SERVER_KEY_EXCHANGE => {
                if body.len() < 4 || body[0] != CURVE_TYPE_NAMED {
                    return Err(Error::BadHandshake);
                }
                let named_curve = u16::from_be_bytes([body[1], body[2]]);
                let pk_len = body[3] as usize;
                if body.len() < 4 + pk_len + 4 {
                    return Err(Error::BadHandshake);
                }
                let public_key = body[4..4 + pk_len].to_vec();
                let at = 4 + pk_len + 2; // skip signature algorithm
                let sig_len = u16::from_be_bytes([body[at], body[at + 1]]) as usize;
                if body.len() < at + 2 + sig_len {
                    return Err(Error::BadHandshake);
                }
                Ok(HandshakeMessage::ServerKeyExchange(ServerKeyExchange {
                    named_curve,
                    public_key,
                    signature: body[at + 2..at + 2 + sig_len].to_vec(),
                }))
            }
            MSG_CERTIFICATE_REQUEST => Ok(HandshakeMessage::CertificateRequest),
            MSG_SERVER_HELLO_DONE => Ok(HandshakeMessage::ServerHelloDone),
            MSG_CLIENT_KEY_EXCHANGE => {
                if body.is_empty() {
                    return Err(Error::BadHandshake);
                }
                let pk_len = body[0] as usize;
                if body.len() < 1 + pk_len {
                    return Err(Error::BadHandshake);
                }
                Ok(HandshakeMessage::ClientKeyExchange(ClientKeyExchange {
                    public_key: body[1..1 + pk_len].to_vec(),
                }))
            }
            MSG_CERTIFICATE_VERIFY => {
                if body.len() < 4 {
                    return Err(Error::BadHandshake);
                }
                let sig_len = u16::from_be_bytes([body[2], body[3]]) as usize;
                if body.len() < 4 + sig_len {
                    return Err(Error::BadHandshake);
                }
                Ok(HandshakeMessage::CertificateVerify(CertificateVerify {
                    signature: body[4..4 + sig_len].to_vec(),
                }))
            }
            MSG_FINISHED => Ok(HandshakeMessage::Finished(Finished {
                verify_data: body.to_vec(),
            })),
            t => Err(Error::UnexpectedMessage {
                got: t,
                state: "unmarshal",
            }),
        }
    }

    /// The canonical single-fragment wire form used for the handshake
    /// transcript hash.
    pub fn canonical_bytes(&self, message_seq: u16) -> Vec<u8> {
        let body = self.marshal_body();
        let header = HandshakeHeader {
            msg_type: self.msg_type(),
            length: body.len() as u32,
            message_seq,
            fragment_offset: 0,
            fragment_length: body.len() as u32,
        };
        let mut out = header.marshal().to_vec();
        out.extend_from_slice(&body);
        out
    }
}
