#[cfg(test)]
mod conn_test;

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use rand::Rng;
use srtp::ProtectionProfile;
use subtle::ConstantTimeEq;

use crate::alert::{self, Alert};
use crate::cipher::RecordCipher;
use crate::config::{Config, DtlsRole};
use crate::crypto;
use crate::error::Error;
use crate::extension::{Extension, GROUP_P256, SIG_ECDSA_SHA256};
use crate::handshake::*;
use crate::prf;
use crate::record::{split_datagram, ContentType, Record, RecordHeader, RECORD_HEADER_SIZE};
use crate::Result;

const MAX_RETRANSMIT_INTERVAL: Duration = Duration::from_secs(60);
const COOKIE_LEN: usize = 20;

/// SRTP keying material exported after the handshake (RFC 5764 §4.2).
#[derive(Debug, Clone)]
pub struct SrtpKeyingMaterial {
    pub profile: ProtectionProfile,
    pub local_master_key: Vec<u8>,
    pub local_master_salt: Vec<u8>,
    pub remote_master_key: Vec<u8>,
    pub remote_master_salt: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtlsEvent {
    /// The peer's leaf certificate, surfaced before completion so callers
    /// can pin it.
    PeerCertificate(Vec<u8>),
    HandshakeComplete { srtp_profile: ProtectionProfile },
    ApplicationData(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    New,
    AwaitServerHello,
    AwaitServerHelloDone,
    AwaitServerFinished,
    AwaitClientHello,
    AwaitClientFinished,
    Established,
    Failed,
    Closed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::New => "new",
            State::AwaitServerHello => "await-server-hello",
            State::AwaitServerHelloDone => "await-server-hello-done",
            State::AwaitServerFinished => "await-server-finished",
            State::AwaitClientHello => "await-client-hello",
            State::AwaitClientFinished => "await-client-finished",
            State::Established => "established",
            State::Failed => "failed",
            State::Closed => "closed",
        }
    }
}

struct Reassembly {
    msg_type: u8,
    total: usize,
    data: Vec<u8>,
    received: Vec<bool>,
}

/// A DTLS 1.2 endpoint as a synchronous state machine. The owner feeds it
/// datagrams and timer fires, and drains transmits and events.
pub struct DtlsConn {
    config: Config,
    role: DtlsRole,
    state: State,

    client_random: [u8; 32],
    server_random: [u8; 32],
    cookie: Vec<u8>,
    server_cookie: Vec<u8>,

    local_ephemeral: Option<p256::ecdh::EphemeralSecret>,
    local_public: Vec<u8>,
    remote_public: Vec<u8>,
    peer_cert: Option<Vec<u8>>,
    srtp_profile: Option<ProtectionProfile>,
    offered_profiles: Vec<u16>,

    master_secret: Vec<u8>,
    cipher: Option<RecordCipher>,

    transcript: Vec<u8>,
    next_send_message_seq: u16,
    next_recv_message_seq: u16,
    reassembly: BTreeMap<u16, Reassembly>,
    queued_messages: BTreeMap<u16, (u8, Vec<u8>)>,

    local_epoch: u16,
    record_seq: [u64; 2],

    pending_transmits: VecDeque<Vec<u8>>,
    last_flight: Vec<Vec<u8>>,
    events: VecDeque<DtlsEvent>,

    retransmit_interval: Duration,
    next_timeout: Option<Instant>,
    deadline: Option<Instant>,
}

impl DtlsConn {
    pub fn new(config: Config, role: DtlsRole) -> Self {
        let mut server_cookie = vec![0u8; COOKIE_LEN];
        rand::thread_rng().fill(&mut server_cookie[..]);
        let retransmit_interval = config.initial_retransmit_interval;
        DtlsConn {
            config,
            role,
            state: State::New,
            client_random: [0; 32],
            server_random: [0; 32],
            cookie: vec![],
            server_cookie,
            local_ephemeral: None,
            local_public: vec![],
            remote_public: vec![],
            peer_cert: None,
            srtp_profile: None,
            offered_profiles: vec![],
            master_secret: vec![],
            cipher: None,
            transcript: vec![],
            next_send_message_seq: 0,
            next_recv_message_seq: 0,
            reassembly: BTreeMap::new(),
            queued_messages: BTreeMap::new(),
            local_epoch: 0,
            record_seq: [0, 0],
            pending_transmits: VecDeque::new(),
            last_flight: vec![],
            events: VecDeque::new(),
            retransmit_interval,
            next_timeout: None,
            deadline: None,
        }
    }

    pub fn role(&self) -> DtlsRole {
        self.role
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.state == State::Established
    }

    pub fn peer_certificate(&self) -> Option<&[u8]> {
        self.peer_cert.as_deref()
    }

    /// Client entry point: emits the first ClientHello and arms timers.
    pub fn start_handshake(&mut self, now: Instant) -> Result<()> {
        if self.role != DtlsRole::Client || self.state != State::New {
            return Err(Error::UnexpectedMessage {
                got: 0,
                state: self.state.name(),
            });
        }
        self.client_random = Random::generate().0;
        self.deadline = Some(now + self.config.handshake_timeout);
        self.send_client_hello(now)?;
        self.state = State::AwaitServerHello;
        Ok(())
    }

    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        self.pending_transmits.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<DtlsEvent> {
        self.events.pop_front()
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        self.next_timeout
    }

    /// Retransmits the in-flight flight with exponential backoff
    /// (RFC 6347 §4.2.4).
    pub fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if let Some(deadline) = self.deadline {
            if now >= deadline {
                self.state = State::Failed;
                self.next_timeout = None;
                return Err(Error::HandshakeTimeout);
            }
        }
        let Some(at) = self.next_timeout else {
            return Ok(());
        };
        if now < at {
            return Ok(());
        }
        log::debug!("dtls retransmit after {:?}", self.retransmit_interval);
        for datagram in &self.last_flight {
            self.pending_transmits.push_back(datagram.clone());
        }
        self.retransmit_interval =
            (self.retransmit_interval * 2).min(MAX_RETRANSMIT_INTERVAL);
        self.next_timeout = Some(now + self.retransmit_interval);
        Ok(())
    }

    /// Feeds one inbound UDP datagram to the state machine.
    pub fn handle_receive(&mut self, datagram: &[u8], now: Instant) -> Result<()> {
        if self.state == State::Closed || self.state == State::Failed {
            return Err(Error::Closed);
        }
        let records = match split_datagram(datagram) {
            Ok(records) => records,
            Err(e) => {
                log::debug!("dropping undecodable datagram: {e}");
                return Ok(());
            }
        };
        for record in records {
            if let Err(e) = self.handle_record(record, now) {
                match e {
                    // Per-record garbage is dropped, protocol failures are
                    // fatal.
                    Error::BadRecord | Error::DecryptFailed => {
                        log::debug!("dropping undecodable record: {e}");
                    }
                    e => {
                        self.state = State::Failed;
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }

    /// Encrypts and queues SCTP bytes as application data.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.state != State::Established {
            return Err(Error::Closed);
        }
        let record = self.build_record(ContentType::ApplicationData, data.to_vec())?;
        self.pending_transmits.push_back(record);
        Ok(())
    }

    /// Sends close_notify and stops processing.
    pub fn close(&mut self) {
        if self.state == State::Closed {
            return;
        }
        let alert = Alert::close_notify();
        if let Ok(record) = self.build_record(ContentType::Alert, alert.marshal().to_vec()) {
            self.pending_transmits.push_back(record);
        }
        self.state = State::Closed;
        self.next_timeout = None;
    }

    /// RFC 5705 exporter over the handshake's master secret.
    pub fn export_keying_material(&self, label: &[u8], len: usize) -> Result<Vec<u8>> {
        if self.state != State::Established {
            return Err(Error::ExportBeforeHandshake);
        }
        Ok(prf::export_keying_material(
            &self.master_secret,
            label,
            &self.client_random,
            &self.server_random,
            len,
        ))
    }

    /// Splits the dtls_srtp exporter output into per-direction key and
    /// salt (RFC 5764 §4.2).
    pub fn export_srtp_keying_material(&self) -> Result<SrtpKeyingMaterial> {
        let profile = self.srtp_profile.ok_or(Error::NoSrtpProfile)?;
        let key_len = profile.key_len();
        let salt_len = profile.salt_len();
        let material =
            self.export_keying_material(b"EXTRACTOR-dtls_srtp", 2 * (key_len + salt_len))?;
        let (client_key, rest) = material.split_at(key_len);
        let (server_key, rest) = rest.split_at(key_len);
        let (client_salt, server_salt) = rest.split_at(salt_len);
        let (local_key, local_salt, remote_key, remote_salt) = match self.role {
            DtlsRole::Client => (client_key, client_salt, server_key, server_salt),
            DtlsRole::Server => (server_key, server_salt, client_key, client_salt),
        };
        Ok(SrtpKeyingMaterial {
            profile,
            local_master_key: local_key.to_vec(),
            local_master_salt: local_salt.to_vec(),
            remote_master_key: remote_key.to_vec(),
            remote_master_salt: remote_salt.to_vec(),
        })
    }

    // ---- record plumbing ----

    fn build_record(&mut self, content_type: ContentType, payload: Vec<u8>) -> Result<Vec<u8>> {
        let epoch = self.local_epoch;
        let sequence = self.record_seq[epoch.min(1) as usize];
        self.record_seq[epoch.min(1) as usize] += 1;
        let mut header = RecordHeader {
            content_type,
            epoch,
            sequence,
            length: 0,
        };
        let wire_payload = if epoch > 0 {
            let cipher = self.cipher.as_ref().ok_or(Error::DecryptFailed)?;
            cipher.encrypt(&header, &payload)?
        } else {
            payload
        };
        header.length = wire_payload.len() as u16;
        let mut out = header.marshal().to_vec();
        out.extend_from_slice(&wire_payload);
        Ok(out)
    }

    fn handle_record(&mut self, record: Record, now: Instant) -> Result<()> {
        let payload = if record.header.epoch > 0 {
            match &self.cipher {
                Some(cipher) => cipher.decrypt(&record.header, &record.payload)?,
                // Encrypted records before keys exist: reordered, drop.
                None => return Ok(()),
            }
        } else {
            record.payload
        };

        match record.header.content_type {
            ContentType::ChangeCipherSpec => Ok(()),
            ContentType::Alert => {
                let alert = Alert::unmarshal(&payload)?;
                if alert.level == alert::LEVEL_FATAL {
                    Err(Error::AlertReceived(alert.description))
                } else if alert.description == alert::DESC_CLOSE_NOTIFY {
                    self.state = State::Closed;
                    Ok(())
                } else {
                    Ok(())
                }
            }
            ContentType::ApplicationData => {
                if self.state == State::Established {
                    self.events.push_back(DtlsEvent::ApplicationData(payload));
                }
                Ok(())
            }
            ContentType::Handshake => self.handle_handshake_fragments(&payload, now),
        }
    }

    fn handle_handshake_fragments(&mut self, mut raw: &[u8], now: Instant) -> Result<()> {
        while !raw.is_empty() {
            let header = HandshakeHeader::unmarshal(raw)?;
            let frag_end = HANDSHAKE_HEADER_SIZE + header.fragment_length as usize;
            if raw.len() < frag_end {
                return Err(Error::BadHandshake);
            }
            let fragment = &raw[HANDSHAKE_HEADER_SIZE..frag_end];
            self.accept_fragment(&header, fragment)?;
            raw = &raw[frag_end..];
        }
        self.process_ready_messages(now)
    }

    fn accept_fragment(&mut self, header: &HandshakeHeader, fragment: &[u8]) -> Result<()> {
        if header.message_seq < self.next_recv_message_seq {
            // Retransmission of something we already handled. If our final
            // flight was lost the peer keeps retransmitting; answer it.
            if self.state == State::Established && !self.last_flight.is_empty() {
                for datagram in &self.last_flight {
                    self.pending_transmits.push_back(datagram.clone());
                }
            }
            return Ok(());
        }
        let total = header.length as usize;
        let entry = self
            .reassembly
            .entry(header.message_seq)
            .or_insert_with(|| Reassembly {
                msg_type: header.msg_type,
                total,
                data: vec![0; total],
                received: vec![false; total],
            });
        if entry.msg_type != header.msg_type || entry.total != total {
            return Err(Error::BadHandshake);
        }
        let offset = header.fragment_offset as usize;
        if offset + fragment.len() > total {
            return Err(Error::BadHandshake);
        }
        entry.data[offset..offset + fragment.len()].copy_from_slice(fragment);
        for flag in &mut entry.received[offset..offset + fragment.len()] {
            *flag = true;
        }
        if entry.received.iter().all(|f| *f) || total == 0 {
            let entry = self
                .reassembly
                .remove(&header.message_seq)
                .expect("entry inserted above");
            self.queued_messages
                .insert(header.message_seq, (entry.msg_type, entry.data));
        }
        Ok(())
    }

    fn process_ready_messages(&mut self, now: Instant) -> Result<()> {
        while let Some((msg_type, body)) =
            self.queued_messages.remove(&self.next_recv_message_seq)
        {
            let seq = self.next_recv_message_seq;
            self.next_recv_message_seq += 1;
            let message = HandshakeMessage::unmarshal_body(msg_type, &body)?;
            self.process_message(message, seq, now)?;
        }
        Ok(())
    }

    // ---- flight construction ----

    fn send_client_hello(&mut self, now: Instant) -> Result<()> {
        self.offered_profiles = self
            .config
            .srtp_profiles
            .iter()
            .map(|p| p.value())
            .collect();
        let hello = HandshakeMessage::ClientHello(ClientHello {
            random: Random(self.client_random),
            session_id: vec![],
            cookie: self.cookie.clone(),
            cipher_suites: vec![CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256],
            extensions: vec![
                Extension::UseSrtp {
                    profiles: self.offered_profiles.clone(),
                },
                Extension::SupportedGroups {
                    groups: vec![GROUP_P256],
                },
                Extension::EcPointFormats,
                Extension::SignatureAlgorithms {
                    algorithms: vec![SIG_ECDSA_SHA256],
                },
            ],
        });
        self.send_flight(vec![hello], false, now)
    }

    /// Serializes messages into records and datagrams, saving the flight
    /// for retransmission. `encrypt_from` marks the index of the first
    /// message sent under epoch 1 (after an implicit ChangeCipherSpec).
    fn send_flight(
        &mut self,
        messages: Vec<HandshakeMessage>,
        with_ccs: bool,
        now: Instant,
    ) -> Result<()> {
        let mut records: Vec<Vec<u8>> = vec![];
        let ccs_at = if with_ccs {
            messages.len().saturating_sub(1)
        } else {
            usize::MAX
        };
        for (i, message) in messages.into_iter().enumerate() {
            if i == ccs_at {
                let ccs = self.build_record(ContentType::ChangeCipherSpec, vec![1])?;
                records.push(ccs);
                self.local_epoch = 1;
            }
            let seq = self.next_send_message_seq;
            self.next_send_message_seq += 1;
            let canonical = message.canonical_bytes(seq);
            if !matches!(message, HandshakeMessage::HelloVerifyRequest(_)) {
                self.transcript.extend_from_slice(&canonical);
            }
            for record_payload in self.fragment_message(&message, seq) {
                records.push(self.build_record(ContentType::Handshake, record_payload)?);
            }
        }

        // Pack records into MTU-sized datagrams.
        let mut datagrams: Vec<Vec<u8>> = vec![];
        for record in records {
            match datagrams.last_mut() {
                Some(last) if last.len() + record.len() <= self.config.mtu => {
                    last.extend_from_slice(&record)
                }
                _ => datagrams.push(record),
            }
        }
        self.last_flight = datagrams.clone();
        self.pending_transmits.extend(datagrams);
        self.retransmit_interval = self.config.initial_retransmit_interval;
        self.next_timeout = Some(now + self.retransmit_interval);
        Ok(())
    }

    fn fragment_message(&self, message: &HandshakeMessage, seq: u16) -> Vec<Vec<u8>> {
        let body = message.marshal_body();
        let max_fragment = self
            .config
            .mtu
            .saturating_sub(RECORD_HEADER_SIZE + HANDSHAKE_HEADER_SIZE + 64)
            .max(64);
        let mut out = vec![];
        let mut offset = 0usize;
        loop {
            let end = (offset + max_fragment).min(body.len());
            let header = HandshakeHeader {
                msg_type: message.msg_type(),
                length: body.len() as u32,
                message_seq: seq,
                fragment_offset: offset as u32,
                fragment_length: (end - offset) as u32,
            };
            let mut fragment = header.marshal().to_vec();
            fragment.extend_from_slice(&body[offset..end]);
            out.push(fragment);
            if end == body.len() {
                break;
            }
            offset = end;
        }
        out
    }

    // ---- key schedule ----

    fn generate_ephemeral(&mut self) {
        let secret = p256::ecdh::EphemeralSecret::random(&mut rand_core::OsRng);
        self.local_public = p256::EncodedPoint::from(secret.public_key())
            .as_bytes()
            .to_vec();
        self.local_ephemeral = Some(secret);
    }

    fn compute_keys(&mut self) -> Result<()> {
        let secret = self
            .local_ephemeral
            .take()
            .ok_or_else(|| Error::Crypto("missing ephemeral key".into()))?;
        let peer = p256::PublicKey::from_sec1_bytes(&self.remote_public)
            .map_err(|_| Error::Crypto("bad peer ECDH point".into()))?;
        let shared = secret.diffie_hellman(&peer);
        let pre_master = shared.raw_secret_bytes().as_slice().to_vec();

        self.master_secret =
            prf::master_secret(&pre_master, &self.client_random, &self.server_random);
        let keys = prf::key_block(
            &self.master_secret,
            &self.client_random,
            &self.server_random,
        );
        self.cipher = Some(match self.role {
            DtlsRole::Client => RecordCipher::new(
                &keys.client_write_key,
                &keys.client_write_iv,
                &keys.server_write_key,
                &keys.server_write_iv,
            )?,
            DtlsRole::Server => RecordCipher::new(
                &keys.server_write_key,
                &keys.server_write_iv,
                &keys.client_write_key,
                &keys.client_write_iv,
            )?,
        });
        Ok(())
    }

    fn check_peer_certificate(&mut self, certificates: &[Vec<u8>]) -> Result<()> {
        let leaf = certificates.first().ok_or(Error::MissingCertificate)?;
        if let Some(expected) = &self.config.remote_fingerprint {
            let actual = crypto::fingerprint_of(leaf);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(Error::CertificateVerifyFailed);
            }
        }
        self.peer_cert = Some(leaf.clone());
        self.events
            .push_back(DtlsEvent::PeerCertificate(leaf.clone()));
        Ok(())
    }

    fn finish_handshake(&mut self) {
        self.state = State::Established;
        self.next_timeout = None;
        self.deadline = None;
        let profile = self
            .srtp_profile
            .unwrap_or(ProtectionProfile::Aes128CmHmacSha1_80);
        self.events.push_back(DtlsEvent::HandshakeComplete {
            srtp_profile: profile,
        });
    }

    // ---- message processing ----

    fn process_message(
        &mut self,
        message: HandshakeMessage,
        seq: u16,
        now: Instant,
    ) -> Result<()> {
        // Inbound messages join the transcript in arrival order, except the
        // cookie exchange.
        let canonical = message.canonical_bytes(seq);
        match (self.role, &message) {
            (_, HandshakeMessage::HelloVerifyRequest(_)) => {}
            (DtlsRole::Server, HandshakeMessage::ClientHello(ch)) if ch.cookie.is_empty() => {}
            _ => self.transcript.extend_from_slice(&canonical),
        }

        match (self.role, self.state, message) {
            // -------- server side --------
            (DtlsRole::Server, State::New | State::AwaitClientHello, HandshakeMessage::ClientHello(ch)) => {
                if self.deadline.is_none() {
                    self.deadline = Some(now + self.config.handshake_timeout);
                }
                if !ch
                    .cipher_suites
                    .contains(&CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256)
                {
                    return Err(Error::NoCipherSuite);
                }
                self.client_random = ch.random.0;
                if ch.cookie.is_empty() {
                    let hvr = HandshakeMessage::HelloVerifyRequest(HelloVerifyRequest {
                        cookie: self.server_cookie.clone(),
                    });
                    self.state = State::AwaitClientHello;
                    return self.send_flight(vec![hvr], false, now);
                }
                if ch.cookie != self.server_cookie {
                    return Err(Error::BadHandshake);
                }
                // Pick the first of our profiles the client offered.
                let offered: Vec<u16> = ch
                    .extensions
                    .iter()
                    .find_map(|e| match e {
                        Extension::UseSrtp { profiles } => Some(profiles.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();
                let profile = self
                    .config
                    .srtp_profiles
                    .iter()
                    .find(|p| offered.contains(&p.value()))
                    .copied()
                    .ok_or(Error::NoSrtpProfile)?;
                self.srtp_profile = Some(profile);

                self.server_random = Random::generate().0;
                self.generate_ephemeral();

                let signed = crypto::server_key_exchange_signed_data(
                    &self.client_random,
                    &self.server_random,
                    GROUP_P256,
                    &self.local_public,
                );
                let signature = self.config.certificate.sign(&signed);

                let flight = vec![
                    HandshakeMessage::ServerHello(ServerHello {
                        random: Random(self.server_random),
                        session_id: vec![],
                        cipher_suite: CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256,
                        extensions: vec![
                            Extension::UseSrtp {
                                profiles: vec![profile.value()],
                            },
                            Extension::EcPointFormats,
                        ],
                    }),
                    HandshakeMessage::Certificate(CertificateMsg {
                        certificates: vec![self.config.certificate.der().to_vec()],
                    }),
                    HandshakeMessage::ServerKeyExchange(ServerKeyExchange {
                        named_curve: GROUP_P256,
                        public_key: self.local_public.clone(),
                        signature,
                    }),
                    HandshakeMessage::CertificateRequest,
                    HandshakeMessage::ServerHelloDone,
                ];
                self.state = State::AwaitClientFinished;
                self.send_flight(flight, false, now)
            }
            (DtlsRole::Server, State::AwaitClientFinished, HandshakeMessage::Certificate(c)) => {
                self.check_peer_certificate(&c.certificates)
            }
            (DtlsRole::Server, State::AwaitClientFinished, HandshakeMessage::ClientKeyExchange(cke)) => {
                self.remote_public = cke.public_key;
                self.compute_keys()
            }
            (DtlsRole::Server, State::AwaitClientFinished, HandshakeMessage::CertificateVerify(cv)) => {
                let cert = self.peer_cert.clone().ok_or(Error::MissingCertificate)?;
                // The signature covers the transcript up to (not including)
                // CertificateVerify itself.
                let covered_len = self.transcript.len() - canonical.len();
                crypto::verify_signature(
                    &cert,
                    &self.transcript[..covered_len],
                    &cv.signature,
                )
            }
            (DtlsRole::Server, State::AwaitClientFinished, HandshakeMessage::Finished(f)) => {
                let covered_len = self.transcript.len() - canonical.len();
                let expected = prf::verify_data(
                    &self.master_secret,
                    b"client finished",
                    &self.transcript[..covered_len],
                );
                if !bool::from(expected.as_slice().ct_eq(&f.verify_data)) {
                    return Err(Error::BadVerifyData);
                }
                let server_verify =
                    prf::verify_data(&self.master_secret, b"server finished", &self.transcript);
                self.send_flight(
                    vec![HandshakeMessage::Finished(Finished {
                        verify_data: server_verify,
                    })],
                    true,
                    now,
                )?;
                self.finish_handshake();
                Ok(())
            }

            // -------- client side --------
            (DtlsRole::Client, State::AwaitServerHello, HandshakeMessage::HelloVerifyRequest(hvr)) => {
                self.cookie = hvr.cookie;
                self.transcript.clear();
                self.send_client_hello(now)
            }
            (DtlsRole::Client, State::AwaitServerHello, HandshakeMessage::ServerHello(sh)) => {
                if sh.cipher_suite != CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256 {
                    return Err(Error::NoCipherSuite);
                }
                let profile = sh
                    .extensions
                    .iter()
                    .find_map(|e| match e {
                        Extension::UseSrtp { profiles } => profiles.first().copied(),
                        _ => None,
                    })
                    .and_then(ProtectionProfile::from_value)
                    .ok_or(Error::NoSrtpProfile)?;
                if !self.offered_profiles.contains(&profile.value()) {
                    return Err(Error::NoSrtpProfile);
                }
                self.srtp_profile = Some(profile);
                self.server_random = sh.random.0;
                self.state = State::AwaitServerHelloDone;
                Ok(())
            }
            (DtlsRole::Client, State::AwaitServerHelloDone, HandshakeMessage::Certificate(c)) => {
                self.check_peer_certificate(&c.certificates)
            }
            (DtlsRole::Client, State::AwaitServerHelloDone, HandshakeMessage::ServerKeyExchange(ske)) => {
                if ske.named_curve != GROUP_P256 {
                    return Err(Error::NoCipherSuite);
                }
                let cert = self.peer_cert.clone().ok_or(Error::MissingCertificate)?;
                let signed = crypto::server_key_exchange_signed_data(
                    &self.client_random,
                    &self.server_random,
                    ske.named_curve,
                    &ske.public_key,
                );
                crypto::verify_signature(&cert, &signed, &ske.signature)?;
                self.remote_public = ske.public_key;
                Ok(())
            }
            (DtlsRole::Client, State::AwaitServerHelloDone, HandshakeMessage::CertificateRequest) => {
                Ok(())
            }
            (DtlsRole::Client, State::AwaitServerHelloDone, HandshakeMessage::ServerHelloDone) => {
                self.generate_ephemeral();
                self.compute_keys()?;

                let mut flight = vec![
                    HandshakeMessage::Certificate(CertificateMsg {
                        certificates: vec![self.config.certificate.der().to_vec()],
                    }),
                    HandshakeMessage::ClientKeyExchange(ClientKeyExchange {
                        public_key: self.local_public.clone(),
                    }),
                ];
                // CertificateVerify and Finished depend on the transcript as
                // it stands when they are sent, so extend it incrementally.
                let mut seq = self.next_send_message_seq;
                let mut transcript = self.transcript.clone();
                for m in &flight {
                    transcript.extend_from_slice(&m.canonical_bytes(seq));
                    seq += 1;
                }
                let signature = self.config.certificate.sign(&transcript);
                let cv = HandshakeMessage::CertificateVerify(CertificateVerify { signature });
                transcript.extend_from_slice(&cv.canonical_bytes(seq));
                flight.push(cv);
                let verify =
                    prf::verify_data(&self.master_secret, b"client finished", &transcript);
                flight.push(HandshakeMessage::Finished(Finished {
                    verify_data: verify,
                }));

                self.state = State::AwaitServerFinished;
                self.send_flight(flight, true, now)
            }
            (DtlsRole::Client, State::AwaitServerFinished, HandshakeMessage::Finished(f)) => {
                let covered_len = self.transcript.len() - canonical.len();
                let expected = prf::verify_data(
                    &self.master_secret,
                    b"server finished",
                    &self.transcript[..covered_len],
                );
                if !bool::from(expected.as_slice().ct_eq(&f.verify_data)) {
                    return Err(Error::BadVerifyData);
                }
                self.last_flight.clear();
                self.finish_handshake();
                Ok(())
            }

            (_, state, message) => Err(Error::UnexpectedMessage {
                got: message.msg_type(),
                state: state.name(),
            }),
        }
    }
}
