#[cfg(test)]
mod association_test;

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::Rng;

use crate::chunk::*;
use crate::error::Error;
use crate::packet::Packet;
use crate::reassembly::ReassemblyQueue;
use crate::{tsn_le, tsn_lt, Result};

const DEFAULT_MTU: usize = 1200;
const DEFAULT_RWND: u32 = 1024 * 1024;
const DEFAULT_MAX_MESSAGE: usize = 262_144;
const DATA_CHUNK_OVERHEAD: usize = CHUNK_HEADER_SIZE + 12;

const RTO_INITIAL: Duration = Duration::from_secs(3);
const RTO_MIN: Duration = Duration::from_secs(1);
const RTO_MAX: Duration = Duration::from_secs(60);
const MAX_INIT_RETRANSMITS: u32 = 8;
const SACK_DELAY: Duration = Duration::from_millis(200);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const FAST_RETRANSMIT_THRESHOLD: u32 = 3;

/// How a queued message may be abandoned (PR-SCTP, RFC 3758).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reliability {
    Reliable,
    MaxRetransmits(u32),
    MaxLifetime(Duration),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mtu: usize,
    pub advertised_receiver_window: u32,
    pub max_message_size: usize,
    pub max_streams: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mtu: DEFAULT_MTU,
            advertised_receiver_window: DEFAULT_RWND,
            max_message_size: DEFAULT_MAX_MESSAGE,
            max_streams: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationEvent {
    Connected,
    Data {
        stream_id: u16,
        ppid: u32,
        unordered: bool,
        payload: Bytes,
    },
    /// The peer reset its outgoing streams: our incoming side starts over.
    IncomingStreamsReset { stream_ids: Vec<u16> },
    /// Our own outgoing reset was confirmed by the peer.
    OutgoingStreamsReset { stream_ids: Vec<u16> },
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    CookieWait,
    CookieEchoed,
    Established,
    ShutdownSent,
    ShutdownReceived,
    ShutdownAckSent,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::CookieWait => "cookie-wait",
            State::CookieEchoed => "cookie-echoed",
            State::Established => "established",
            State::ShutdownSent => "shutdown-sent",
            State::ShutdownReceived => "shutdown-received",
            State::ShutdownAckSent => "shutdown-ack-sent",
        }
    }
}

struct InflightChunk {
    chunk: ChunkPayloadData,
    reliability: Reliability,
    queued_at: Instant,
    sent_at: Instant,
    retransmit_count: u32,
    missing_reports: u32,
    gap_acked: bool,
    abandoned: bool,
    retransmitted: bool,
}

impl InflightChunk {
    fn user_bytes(&self) -> usize {
        self.chunk.user_data.len()
    }
}

struct StreamOut {
    next_ssn: u16,
    buffered: usize,
}

/// An SCTP association as a synchronous state machine over the DTLS
/// user-message boundary (RFC 8261): one `poll_transmit` output is one
/// DTLS application-data write.
pub struct Association {
    config: Config,
    state: State,

    local_tag: u32,
    peer_tag: u32,

    // send side
    my_next_tsn: u32,
    cumulative_tsn_ack: u32,
    pending: VecDeque<(ChunkPayloadData, Reliability, Instant)>,
    inflight: BTreeMap<u32, InflightChunk>,
    streams_out: HashMap<u16, StreamOut>,
    cwnd: usize,
    ssthresh: usize,
    partial_bytes_acked: usize,
    fast_recovery_exit: Option<u32>,
    peer_rwnd: u32,
    advanced_ack_point: u32,

    // receive side
    peer_last_tsn: u32,
    received_out_of_order: BTreeSet<u32>,
    duplicates: Vec<u32>,
    reassembly: ReassemblyQueue,
    packets_since_sack: u32,

    // RTO computation
    srtt: Option<f64>,
    rttvar: f64,
    rto: Duration,

    // timers
    t1_deadline: Option<Instant>,
    t1_retries: u32,
    t3_deadline: Option<Instant>,
    t2_deadline: Option<Instant>,
    sack_deadline: Option<Instant>,
    heartbeat_deadline: Option<Instant>,

    // stream reset
    next_reconfig_seq: u32,
    last_peer_reconfig_seq: Option<u32>,
    pending_reset: Option<(OutgoingResetRequest, Option<Instant>)>,

    cookie: Vec<u8>,
    cookie_echo: Option<Vec<u8>>,

    transmits: VecDeque<Vec<u8>>,
    events: VecDeque<AssociationEvent>,
}

impl Association {
    pub fn new(config: Config) -> Self {
        let mut rng = rand::thread_rng();
        let local_tag: u32 = rng.gen_range(1..u32::MAX);
        let my_next_tsn: u32 = rng.gen();
        let mut cookie = vec![0u8; 32];
        rng.fill(&mut cookie[..]);
        Association {
            config,
            state: State::Closed,
            local_tag,
            peer_tag: 0,
            my_next_tsn,
            cumulative_tsn_ack: my_next_tsn.wrapping_sub(1),
            pending: VecDeque::new(),
            inflight: BTreeMap::new(),
            streams_out: HashMap::new(),
            cwnd: 0,
            ssthresh: DEFAULT_RWND as usize,
            partial_bytes_acked: 0,
            fast_recovery_exit: None,
            peer_rwnd: DEFAULT_RWND,
            advanced_ack_point: my_next_tsn.wrapping_sub(1),
            peer_last_tsn: 0,
            received_out_of_order: BTreeSet::new(),
            duplicates: vec![],
            reassembly: ReassemblyQueue::default(),
            packets_since_sack: 0,
            srtt: None,
            rttvar: 0.0,
            rto: RTO_INITIAL,
            t1_deadline: None,
            t1_retries: 0,
            t3_deadline: None,
            t2_deadline: None,
            sack_deadline: None,
            heartbeat_deadline: None,
            next_reconfig_seq: my_next_tsn,
            last_peer_reconfig_seq: None,
            pending_reset: None,
            cookie,
            cookie_echo: None,
            transmits: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    fn initial_cwnd(mtu: usize) -> usize {
        (4 * mtu).min((2 * mtu).max(4404))
    }

    pub fn is_established(&self) -> bool {
        self.state == State::Established
    }

    /// Client entry point: sends INIT.
    pub fn connect(&mut self, now: Instant) {
        if self.state != State::Closed {
            return;
        }
        self.cwnd = Self::initial_cwnd(self.config.mtu);
        self.state = State::CookieWait;
        self.t1_retries = 0;
        self.send_init(now);
    }

    fn send_init(&mut self, now: Instant) {
        let init = Chunk::Init(ChunkInit {
            initiate_tag: self.local_tag,
            advertised_receiver_window: self.config.advertised_receiver_window,
            num_outbound_streams: self.config.max_streams,
            num_inbound_streams: self.config.max_streams,
            initial_tsn: self.my_next_tsn,
            state_cookie: None,
        });
        // INIT is addressed with a zero verification tag.
        self.push_packet(0, vec![init.raw()]);
        self.t1_deadline = Some(now + self.rto);
    }

    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        self.transmits.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<AssociationEvent> {
        self.events.pop_front()
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        [
            self.t1_deadline,
            self.t3_deadline,
            self.t2_deadline,
            self.sack_deadline,
            self.heartbeat_deadline,
            self.pending_reset.as_ref().and_then(|(_, d)| *d),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Bytes queued but not yet acknowledged for one stream.
    pub fn buffered_amount(&self, stream_id: u16) -> usize {
        self.streams_out
            .get(&stream_id)
            .map(|s| s.buffered)
            .unwrap_or(0)
    }

    fn push_packet(&mut self, verification_tag: u32, chunks: Vec<RawChunk>) {
        let packet = Packet::new(verification_tag, chunks);
        self.transmits.push_back(packet.marshal());
    }

    // ---- user send path ----

    /// Queues a user message, fragmenting it across DATA chunks.
    pub fn send(
        &mut self,
        stream_id: u16,
        ppid: u32,
        unordered: bool,
        reliability: Reliability,
        data: &[u8],
        now: Instant,
    ) -> Result<()> {
        match self.state {
            // Messages queued before the handshake finishes flush on
            // establishment.
            State::Closed | State::CookieWait | State::CookieEchoed | State::Established => {}
            _ => return Err(Error::NotEstablished),
        }
        if data.len() > self.config.max_message_size {
            return Err(Error::MessageTooLarge);
        }
        let fragment_size = self
            .config
            .mtu
            .saturating_sub(crate::packet::COMMON_HEADER_SIZE + DATA_CHUNK_OVERHEAD)
            .max(64);

        let stream = self.streams_out.entry(stream_id).or_insert(StreamOut {
            next_ssn: 0,
            buffered: 0,
        });
        let ssn = stream.next_ssn;
        if !unordered {
            stream.next_ssn = stream.next_ssn.wrapping_add(1);
        }
        stream.buffered += data.len();

        let fragments: Vec<&[u8]> = if data.is_empty() {
            vec![&[]]
        } else {
            data.chunks(fragment_size).collect()
        };
        let count = fragments.len();
        for (i, fragment) in fragments.into_iter().enumerate() {
            let chunk = ChunkPayloadData {
                unordered,
                beginning_fragment: i == 0,
                ending_fragment: i == count - 1,
                tsn: self.my_next_tsn,
                stream_identifier: stream_id,
                stream_sequence_number: if unordered { 0 } else { ssn },
                payload_protocol_identifier: ppid,
                user_data: Bytes::copy_from_slice(fragment),
            };
            self.my_next_tsn = self.my_next_tsn.wrapping_add(1);
            self.pending.push_back((chunk, reliability, now));
        }
        if self.state == State::Established {
            self.flush_pending(now);
        }
        Ok(())
    }

    fn outstanding_bytes(&self) -> usize {
        self.inflight
            .values()
            .filter(|c| !c.gap_acked && !c.abandoned)
            .map(|c| c.user_bytes())
            .sum()
    }

    /// Moves pending chunks into flight within cwnd and the peer's window,
    /// bundling them into MTU-sized packets.
    fn flush_pending(&mut self, now: Instant) {
        let mut bundle: Vec<RawChunk> = vec![];
        let mut bundle_size = crate::packet::COMMON_HEADER_SIZE;
        let mut sent_any = false;

        loop {
            let outstanding = self.outstanding_bytes();
            let window = (self.cwnd.min(self.peer_rwnd as usize)).max(
                // Zero-window probe: always allow one chunk in flight.
                if outstanding == 0 { 1 } else { 0 },
            );
            let Some((chunk, _, _)) = self.pending.front() else {
                break;
            };
            if outstanding > 0 && outstanding + chunk.user_data.len() > window {
                break;
            }
            let (chunk, reliability, queued_at) =
                self.pending.pop_front().expect("front checked above");
            let raw = Chunk::PayloadData(chunk.clone()).raw();
            if bundle_size + raw.wire_size() > self.config.mtu && !bundle.is_empty() {
                self.push_packet(self.peer_tag, std::mem::take(&mut bundle));
                bundle_size = crate::packet::COMMON_HEADER_SIZE;
            }
            bundle_size += raw.wire_size();
            bundle.push(raw);
            self.inflight.insert(
                chunk.tsn,
                InflightChunk {
                    chunk,
                    reliability,
                    queued_at,
                    sent_at: now,
                    retransmit_count: 0,
                    missing_reports: 0,
                    gap_acked: false,
                    abandoned: false,
                    retransmitted: false,
                },
            );
            sent_any = true;
        }
        if !bundle.is_empty() {
            self.push_packet(self.peer_tag, bundle);
        }
        if sent_any && self.t3_deadline.is_none() {
            self.t3_deadline = Some(now + self.rto);
        }
    }

    // ---- timers ----

    pub fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if let Some(at) = self.t1_deadline {
            if now >= at {
                self.t1_retries += 1;
                if self.t1_retries > MAX_INIT_RETRANSMITS {
                    self.state = State::Closed;
                    self.events.push_back(AssociationEvent::Closed);
                    self.t1_deadline = None;
                    return Err(Error::InitTimeout);
                }
                self.rto = (self.rto * 2).min(RTO_MAX);
                match self.state {
                    State::CookieWait => self.send_init(now),
                    State::CookieEchoed => self.send_cookie_echo(now),
                    _ => self.t1_deadline = None,
                }
            }
        }
        if let Some(at) = self.t3_deadline {
            if now >= at {
                self.on_t3_timeout(now);
            }
        }
        if let Some(at) = self.t2_deadline {
            if now >= at {
                self.rto = (self.rto * 2).min(RTO_MAX);
                match self.state {
                    State::ShutdownSent => {
                        let cum = self.peer_last_tsn;
                        self.push_packet(
                            self.peer_tag,
                            vec![Chunk::Shutdown(ChunkShutdown {
                                cumulative_tsn_ack: cum,
                            })
                            .raw()],
                        );
                        self.t2_deadline = Some(now + self.rto);
                    }
                    State::ShutdownAckSent => {
                        self.push_packet(self.peer_tag, vec![Chunk::ShutdownAck.raw()]);
                        self.t2_deadline = Some(now + self.rto);
                    }
                    _ => self.t2_deadline = None,
                }
            }
        }
        if let Some(at) = self.sack_deadline {
            if now >= at {
                self.send_sack();
            }
        }
        if let Some(at) = self.heartbeat_deadline {
            if now >= at && self.state == State::Established {
                let mut info = vec![0u8; 8];
                rand::thread_rng().fill(&mut info[..]);
                self.push_packet(
                    self.peer_tag,
                    vec![Chunk::Heartbeat(ChunkHeartbeat { info }).raw()],
                );
                self.heartbeat_deadline = Some(now + HEARTBEAT_INTERVAL);
            }
        }
        let due_reset = match &self.pending_reset {
            Some((request, Some(at))) if now >= *at => Some(request.clone()),
            _ => None,
        };
        if let Some(request) = due_reset {
            let chunk = Chunk::Reconfig(ChunkReconfig {
                reset_request: Some(request),
                response: None,
            });
            self.push_packet(self.peer_tag, vec![chunk.raw()]);
            let next = now + self.rto;
            if let Some((_, deadline)) = &mut self.pending_reset {
                *deadline = Some(next);
            }
        }
        Ok(())
    }

    fn on_t3_timeout(&mut self, now: Instant) {
        log::debug!("sctp t3-rtx expired, rto={:?}", self.rto);
        self.ssthresh = (self.cwnd / 2).max(4 * self.config.mtu);
        self.cwnd = self.config.mtu;
        self.partial_bytes_acked = 0;
        self.rto = (self.rto * 2).min(RTO_MAX);

        // Every outstanding chunk has now failed one more transmission;
        // expire partial-reliability budgets before deciding what to
        // retransmit.
        for chunk in self.inflight.values_mut() {
            if !chunk.gap_acked && !chunk.abandoned {
                chunk.retransmit_count += 1;
            }
        }
        self.abandon_expired(now);
        self.advance_peer_ack_point();

        // Retransmit the earliest outstanding chunks, one MTU's worth.
        let mut bundle: Vec<RawChunk> = vec![];
        let mut size = crate::packet::COMMON_HEADER_SIZE;
        for chunk in self.inflight.values_mut() {
            if chunk.gap_acked || chunk.abandoned {
                continue;
            }
            let raw = Chunk::PayloadData(chunk.chunk.clone()).raw();
            if size + raw.wire_size() > self.config.mtu && !bundle.is_empty() {
                break;
            }
            chunk.retransmitted = true;
            chunk.sent_at = now;
            size += raw.wire_size();
            bundle.push(raw);
        }
        if !bundle.is_empty() {
            self.push_packet(self.peer_tag, bundle);
        }
        self.t3_deadline = if self.inflight.values().any(|c| !c.gap_acked && !c.abandoned) {
            Some(now + self.rto)
        } else {
            None
        };
    }

    /// Marks chunks that ran out of their partial-reliability budget.
    fn abandon_expired(&mut self, now: Instant) {
        for chunk in self.inflight.values_mut() {
            if chunk.abandoned {
                continue;
            }
            let expired = match chunk.reliability {
                Reliability::Reliable => false,
                Reliability::MaxRetransmits(max) => chunk.retransmit_count > max,
                Reliability::MaxLifetime(lifetime) => now >= chunk.queued_at + lifetime,
            };
            if expired {
                chunk.abandoned = true;
                if let Some(stream) = self.streams_out.get_mut(&chunk.chunk.stream_identifier)
                {
                    stream.buffered = stream.buffered.saturating_sub(chunk.user_bytes());
                }
            }
        }
    }

    /// PR-SCTP: when the chunks at the front of the flight are abandoned,
    /// tell the peer to move past them (RFC 3758 §3.5).
    fn advance_peer_ack_point(&mut self) {
        let mut point = self.cumulative_tsn_ack;
        let mut streams: HashMap<u16, u16> = HashMap::new();
        loop {
            let next = point.wrapping_add(1);
            match self.inflight.get(&next) {
                Some(chunk) if chunk.abandoned => {
                    if !chunk.chunk.unordered {
                        streams.insert(
                            chunk.chunk.stream_identifier,
                            chunk.chunk.stream_sequence_number,
                        );
                    }
                    point = next;
                }
                _ => break,
            }
        }
        if point != self.cumulative_tsn_ack && tsn_lt(self.advanced_ack_point, point) {
            self.advanced_ack_point = point;
            let chunk = Chunk::ForwardTsn(ChunkForwardTsn {
                new_cumulative_tsn: point,
                streams: streams.into_iter().collect(),
            });
            self.push_packet(self.peer_tag, vec![chunk.raw()]);
        }
    }

    // ---- inbound ----

    /// Feeds one inbound SCTP packet (one DTLS user message).
    pub fn handle_receive(&mut self, raw: &[u8], now: Instant) -> Result<()> {
        let packet = Packet::unmarshal(raw)?;
        let chunks: Vec<Chunk> = packet
            .chunks
            .iter()
            .map(Chunk::parse)
            .collect::<Result<_>>()?;

        // INIT carries a zero tag; everything else must carry ours.
        let has_init = chunks.iter().any(|c| matches!(c, Chunk::Init(_)));
        if !has_init
            && packet.verification_tag != self.local_tag
            && !chunks
                .iter()
                .any(|c| matches!(c, Chunk::Abort(_) | Chunk::ShutdownComplete))
        {
            return Err(Error::BadVerificationTag);
        }

        let mut saw_data = false;
        for chunk in chunks {
            match chunk {
                Chunk::PayloadData(data) => {
                    saw_data = true;
                    self.handle_data(data);
                }
                other => self.handle_control(other, now)?,
            }
        }
        if saw_data {
            self.packets_since_sack += 1;
            let has_gaps = !self.received_out_of_order.is_empty();
            if has_gaps || !self.duplicates.is_empty() || self.packets_since_sack >= 2 {
                self.send_sack();
            } else if self.sack_deadline.is_none() {
                self.sack_deadline = Some(now + SACK_DELAY);
            }
        }
        Ok(())
    }

    fn handle_control(&mut self, chunk: Chunk, now: Instant) -> Result<()> {
        match chunk {
            Chunk::Init(init) => {
                // Passive open; also covers INIT retransmissions.
                self.peer_tag = init.initiate_tag;
                self.peer_rwnd = init.advertised_receiver_window;
                self.peer_last_tsn = init.initial_tsn.wrapping_sub(1);
                if self.cwnd == 0 {
                    self.cwnd = Self::initial_cwnd(self.config.mtu);
                }
                let ack = Chunk::InitAck(ChunkInit {
                    initiate_tag: self.local_tag,
                    advertised_receiver_window: self.config.advertised_receiver_window,
                    num_outbound_streams: self.config.max_streams,
                    num_inbound_streams: self.config.max_streams,
                    initial_tsn: self.my_next_tsn,
                    state_cookie: Some(self.cookie.clone()),
                });
                self.push_packet(self.peer_tag, vec![ack.raw()]);
                Ok(())
            }
            Chunk::InitAck(ack) => {
                if self.state != State::CookieWait {
                    return Ok(());
                }
                self.peer_tag = ack.initiate_tag;
                self.peer_rwnd = ack.advertised_receiver_window;
                self.peer_last_tsn = ack.initial_tsn.wrapping_sub(1);
                self.cookie_echo = ack.state_cookie;
                self.state = State::CookieEchoed;
                self.t1_retries = 0;
                self.rto = RTO_INITIAL;
                self.send_cookie_echo(now);
                Ok(())
            }
            Chunk::CookieEcho(echo) => {
                if echo.cookie != self.cookie {
                    return Err(Error::CookieVerifyFailed);
                }
                self.push_packet(self.peer_tag, vec![Chunk::CookieAck.raw()]);
                if self.state != State::Established {
                    self.establish(now);
                }
                Ok(())
            }
            Chunk::CookieAck => {
                if self.state == State::CookieEchoed {
                    self.t1_deadline = None;
                    self.establish(now);
                }
                Ok(())
            }
            Chunk::Sack(sack) => {
                self.handle_sack(sack, now);
                Ok(())
            }
            Chunk::Heartbeat(hb) => {
                self.push_packet(
                    self.peer_tag,
                    vec![Chunk::HeartbeatAck(ChunkHeartbeat { info: hb.info }).raw()],
                );
                Ok(())
            }
            Chunk::HeartbeatAck(_) => Ok(()),
            Chunk::Abort(_) => {
                self.state = State::Closed;
                self.events.push_back(AssociationEvent::Closed);
                Err(Error::AbortReceived)
            }
            Chunk::Shutdown(shutdown) => {
                self.handle_sack_cumulative(shutdown.cumulative_tsn_ack, now);
                self.state = State::ShutdownAckSent;
                self.push_packet(self.peer_tag, vec![Chunk::ShutdownAck.raw()]);
                self.t2_deadline = Some(now + self.rto);
                Ok(())
            }
            Chunk::ShutdownAck => {
                if self.state == State::ShutdownSent {
                    self.push_packet(self.peer_tag, vec![Chunk::ShutdownComplete.raw()]);
                    self.state = State::Closed;
                    self.t2_deadline = None;
                    self.events.push_back(AssociationEvent::Closed);
                }
                Ok(())
            }
            Chunk::ShutdownComplete => {
                if self.state == State::ShutdownAckSent {
                    self.state = State::Closed;
                    self.t2_deadline = None;
                    self.events.push_back(AssociationEvent::Closed);
                }
                Ok(())
            }
            Chunk::Reconfig(rc) => {
                self.handle_reconfig(rc);
                Ok(())
            }
            Chunk::ForwardTsn(fwd) => {
                self.handle_forward_tsn(fwd);
                Ok(())
            }
            Chunk::Error(_) | Chunk::Unknown(_) => Ok(()),
            Chunk::PayloadData(_) => unreachable!("handled by caller"),
        }
    }

    fn establish(&mut self, now: Instant) {
        self.state = State::Established;
        self.t1_deadline = None;
        if self.cwnd == 0 {
            self.cwnd = Self::initial_cwnd(self.config.mtu);
        }
        self.heartbeat_deadline = Some(now + HEARTBEAT_INTERVAL);
        self.events.push_back(AssociationEvent::Connected);
        self.flush_pending(now);
    }

    fn send_cookie_echo(&mut self, now: Instant) {
        if let Some(cookie) = &self.cookie_echo {
            let echo = Chunk::CookieEcho(ChunkCookieEcho {
                cookie: cookie.clone(),
            });
            self.push_packet(self.peer_tag, vec![echo.raw()]);
            self.t1_deadline = Some(now + self.rto);
        }
    }

    // ---- data receive ----

    fn handle_data(&mut self, data: ChunkPayloadData) {
        let tsn = data.tsn;
        if tsn_le(tsn, self.peer_last_tsn) || self.received_out_of_order.contains(&tsn) {
            self.duplicates.push(tsn);
            return;
        }
        self.received_out_of_order.insert(tsn);
        // Advance the cumulative point over any now-contiguous TSNs.
        while self
            .received_out_of_order
            .remove(&self.peer_last_tsn.wrapping_add(1))
        {
            self.peer_last_tsn = self.peer_last_tsn.wrapping_add(1);
        }
        for message in self.reassembly.push(data) {
            self.events.push_back(AssociationEvent::Data {
                stream_id: message.stream_id,
                ppid: message.ppid,
                unordered: message.unordered,
                payload: message.data,
            });
        }
    }

    fn gap_ack_blocks(&self) -> Vec<GapAckBlock> {
        let mut blocks: Vec<GapAckBlock> = vec![];
        for &tsn in &self.received_out_of_order {
            let offset = tsn.wrapping_sub(self.peer_last_tsn) as u16;
            match blocks.last_mut() {
                Some(last) if last.end + 1 == offset => last.end = offset,
                _ => blocks.push(GapAckBlock {
                    start: offset,
                    end: offset,
                }),
            }
        }
        blocks
    }

    fn send_sack(&mut self) {
        let sack = Chunk::Sack(ChunkSelectiveAck {
            cumulative_tsn_ack: self.peer_last_tsn,
            advertised_receiver_window: self.config.advertised_receiver_window,
            gap_ack_blocks: self.gap_ack_blocks(),
            duplicate_tsns: std::mem::take(&mut self.duplicates),
        });
        self.push_packet(self.peer_tag, vec![sack.raw()]);
        self.sack_deadline = None;
        self.packets_since_sack = 0;
    }

    // ---- SACK processing (sender side) ----

    fn handle_sack_cumulative(&mut self, cumulative: u32, now: Instant) {
        if tsn_lt(cumulative, self.cumulative_tsn_ack) {
            return;
        }
        let mut newly_acked = 0usize;
        let mut rtt_sample: Option<Duration> = None;
        let acked: Vec<u32> = self
            .inflight
            .keys()
            .copied()
            .filter(|tsn| tsn_le(*tsn, cumulative))
            .collect();
        for tsn in acked {
            if let Some(chunk) = self.inflight.remove(&tsn) {
                if !chunk.gap_acked && !chunk.abandoned {
                    newly_acked += chunk.user_bytes();
                }
                if !chunk.retransmitted && rtt_sample.is_none() {
                    rtt_sample = Some(now.saturating_duration_since(chunk.sent_at));
                }
                if !chunk.abandoned {
                    if let Some(stream) =
                        self.streams_out.get_mut(&chunk.chunk.stream_identifier)
                    {
                        stream.buffered = stream.buffered.saturating_sub(chunk.user_bytes());
                    }
                }
            }
        }
        self.cumulative_tsn_ack = cumulative;
        if tsn_lt(self.advanced_ack_point, cumulative) {
            self.advanced_ack_point = cumulative;
        }
        if let Some(rtt) = rtt_sample {
            self.update_rto(rtt);
        }
        if newly_acked > 0 {
            self.grow_cwnd(newly_acked);
        }
        if let Some(exit) = self.fast_recovery_exit {
            if tsn_le(exit, cumulative) {
                self.fast_recovery_exit = None;
            }
        }
    }

    fn grow_cwnd(&mut self, acked_bytes: usize) {
        if self.fast_recovery_exit.is_some() {
            return;
        }
        if self.cwnd <= self.ssthresh {
            // Slow start.
            self.cwnd += acked_bytes.min(self.config.mtu);
        } else {
            // Congestion avoidance: one MTU per window's worth of acks.
            self.partial_bytes_acked += acked_bytes;
            if self.partial_bytes_acked >= self.cwnd {
                self.partial_bytes_acked -= self.cwnd;
                self.cwnd += self.config.mtu;
            }
        }
    }

    fn update_rto(&mut self, rtt: Duration) {
        let rtt = rtt.as_secs_f64();
        match self.srtt {
            None => {
                self.srtt = Some(rtt);
                self.rttvar = rtt / 2.0;
            }
            Some(srtt) => {
                self.rttvar = 0.75 * self.rttvar + 0.25 * (srtt - rtt).abs();
                self.srtt = Some(0.875 * srtt + 0.125 * rtt);
            }
        }
        let rto = self.srtt.unwrap_or(rtt) + 4.0 * self.rttvar;
        self.rto = Duration::from_secs_f64(rto).clamp(RTO_MIN, RTO_MAX);
    }

    fn handle_sack(&mut self, sack: ChunkSelectiveAck, now: Instant) {
        self.handle_sack_cumulative(sack.cumulative_tsn_ack, now);

        // Gap-acked chunks leave the outstanding count but stay buffered
        // until the cumulative ack passes them.
        let mut highest_gap_tsn = sack.cumulative_tsn_ack;
        for block in &sack.gap_ack_blocks {
            for offset in block.start..=block.end {
                let tsn = sack.cumulative_tsn_ack.wrapping_add(offset as u32);
                if let Some(chunk) = self.inflight.get_mut(&tsn) {
                    chunk.gap_acked = true;
                }
                if tsn_lt(highest_gap_tsn, tsn) {
                    highest_gap_tsn = tsn;
                }
            }
        }

        // Missing reports drive fast retransmit after three strikes.
        let mut to_fast_retransmit: Vec<u32> = vec![];
        for (tsn, chunk) in self.inflight.iter_mut() {
            if chunk.gap_acked || chunk.abandoned || !tsn_lt(*tsn, highest_gap_tsn) {
                continue;
            }
            chunk.missing_reports += 1;
            if chunk.missing_reports == FAST_RETRANSMIT_THRESHOLD {
                to_fast_retransmit.push(*tsn);
            }
        }
        if !to_fast_retransmit.is_empty() {
            if self.fast_recovery_exit.is_none() {
                self.ssthresh = (self.cwnd / 2).max(4 * self.config.mtu);
                self.cwnd = self.ssthresh;
                self.partial_bytes_acked = 0;
                self.fast_recovery_exit = Some(self.my_next_tsn.wrapping_sub(1));
            }
            let mut bundle = vec![];
            for tsn in to_fast_retransmit {
                if let Some(chunk) = self.inflight.get_mut(&tsn) {
                    chunk.retransmitted = true;
                    chunk.retransmit_count += 1;
                    chunk.sent_at = now;
                    bundle.push(Chunk::PayloadData(chunk.chunk.clone()).raw());
                }
            }
            self.push_packet(self.peer_tag, bundle);
        }

        self.peer_rwnd = (sack.advertised_receiver_window as usize)
            .saturating_sub(self.outstanding_bytes()) as u32;

        self.abandon_expired(now);
        self.advance_peer_ack_point();

        self.t3_deadline = if self.inflight.values().any(|c| !c.gap_acked && !c.abandoned) {
            Some(now + self.rto)
        } else {
            None
        };
        self.flush_pending(now);
    }

    // ---- stream reset / forward tsn ----

    /// Requests an outgoing SSN reset for the streams (data channel
    /// close).
    pub fn reset_streams(&mut self, stream_ids: &[u16], now: Instant) -> Result<()> {
        if self.state != State::Established {
            return Err(Error::NotEstablished);
        }
        if self.pending_reset.is_some() {
            // One in-flight request at a time keeps the protocol simple;
            // callers retry when the previous reset completes.
            return Err(Error::NotEstablished);
        }
        let request = OutgoingResetRequest {
            request_seq: self.next_reconfig_seq,
            response_seq: self.last_peer_reconfig_seq.unwrap_or(0),
            senders_last_tsn: self.my_next_tsn.wrapping_sub(1),
            streams: stream_ids.to_vec(),
        };
        self.next_reconfig_seq = self.next_reconfig_seq.wrapping_add(1);
        let chunk = Chunk::Reconfig(ChunkReconfig {
            reset_request: Some(request.clone()),
            response: None,
        });
        self.push_packet(self.peer_tag, vec![chunk.raw()]);
        self.pending_reset = Some((request, Some(now + self.rto)));
        Ok(())
    }

    fn handle_reconfig(&mut self, rc: ChunkReconfig) {
        if let Some(request) = rc.reset_request {
            let duplicate = self.last_peer_reconfig_seq == Some(request.request_seq);
            self.last_peer_reconfig_seq = Some(request.request_seq);
            let response = Chunk::Reconfig(ChunkReconfig {
                reset_request: None,
                response: Some(ReconfigResponse {
                    response_seq: request.request_seq,
                    result: RESULT_SUCCESS_PERFORMED,
                }),
            });
            self.push_packet(self.peer_tag, vec![response.raw()]);
            if !duplicate {
                for stream_id in &request.streams {
                    self.reassembly.reset_stream(*stream_id);
                }
                self.events.push_back(AssociationEvent::IncomingStreamsReset {
                    stream_ids: request.streams,
                });
            }
        }
        if let Some(response) = rc.response {
            if let Some((request, _)) = &self.pending_reset {
                if request.request_seq == response.response_seq {
                    let streams = request.streams.clone();
                    for stream_id in &streams {
                        if let Some(out) = self.streams_out.get_mut(stream_id) {
                            out.next_ssn = 0;
                        }
                    }
                    self.pending_reset = None;
                    self.events
                        .push_back(AssociationEvent::OutgoingStreamsReset {
                            stream_ids: streams,
                        });
                }
            }
        }
    }

    fn handle_forward_tsn(&mut self, fwd: ChunkForwardTsn) {
        if tsn_le(fwd.new_cumulative_tsn, self.peer_last_tsn) {
            return;
        }
        self.peer_last_tsn = fwd.new_cumulative_tsn;
        self.received_out_of_order
            .retain(|&tsn| tsn_lt(self.peer_last_tsn, tsn));
        while self
            .received_out_of_order
            .remove(&self.peer_last_tsn.wrapping_add(1))
        {
            self.peer_last_tsn = self.peer_last_tsn.wrapping_add(1);
        }
        self.reassembly.drop_fragments_up_to(self.peer_last_tsn);
        for (stream_id, ssn) in fwd.streams {
            for message in self.reassembly.advance_ordered(stream_id, ssn) {
                self.events.push_back(AssociationEvent::Data {
                    stream_id: message.stream_id,
                    ppid: message.ppid,
                    unordered: message.unordered,
                    payload: message.data,
                });
            }
        }
        self.send_sack();
    }

    // ---- shutdown ----

    /// Graceful shutdown once everything in flight is acknowledged.
    pub fn close(&mut self, now: Instant) {
        match self.state {
            State::Established | State::CookieEchoed | State::CookieWait => {
                self.state = State::ShutdownSent;
                let cum = self.peer_last_tsn;
                self.push_packet(
                    self.peer_tag,
                    vec![Chunk::Shutdown(ChunkShutdown {
                        cumulative_tsn_ack: cum,
                    })
                    .raw()],
                );
                self.t2_deadline = Some(now + self.rto);
            }
            _ => {}
        }
    }

    /// Hard teardown.
    pub fn abort(&mut self) {
        if self.state != State::Closed {
            self.push_packet(
                self.peer_tag,
                vec![Chunk::Abort(ChunkAbort { causes: vec![] }).raw()],
            );
            self.state = State::Closed;
            self.events.push_back(AssociationEvent::Closed);
        }
    }
}
