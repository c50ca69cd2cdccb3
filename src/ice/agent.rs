#[cfg(test)]
mod agent_test;

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::distributions::Alphanumeric;
use rand::Rng;

use stun::addr::XorMappedAddress;
use stun::attributes::*;
use stun::error_code::{ErrorCodeAttribute, CODE_ROLE_CONFLICT};
use stun::fingerprint::Fingerprint;
use stun::integrity::MessageIntegrity;
use stun::message::*;
use stun::textattrs::Username;

use sdp::CandidateDescription;

use super::candidate::*;
use super::turn::{TurnClient, TurnServer};
use super::IceError;

const CHECK_PACING: Duration = Duration::from_millis(50);
const CHECK_RTO: Duration = Duration::from_millis(500);
const MAX_CHECK_ATTEMPTS: u32 = 5;
const GATHER_RTO: Duration = Duration::from_millis(500);
const MAX_GATHER_ATTEMPTS: u32 = 3;
const GATHERING_TIMEOUT: Duration = Duration::from_secs(5);
const CONSENT_INTERVAL: Duration = Duration::from_secs(15);
const CONSENT_JITTER_MS: u64 = 3000;
const CONSENT_EXPIRY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceRole {
    Controlling,
    Controlled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatheringState {
    New,
    Gathering,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ufrag: String,
    pub pwd: String,
}

impl Credentials {
    fn generate() -> Self {
        let rand_string = |len: usize| {
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(len)
                .map(char::from)
                .collect::<String>()
        };
        Credentials {
            ufrag: rand_string(4),
            pwd: rand_string(22),
        }
    }
}

/// One datagram the owner must put on the wire.
#[derive(Debug, Clone)]
pub struct Transmit {
    pub destination: SocketAddr,
    pub message: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    CandidateGathered(CandidateDescription),
    GatheringComplete,
    StateChange(IceConnectionState),
    /// A pair was nominated; carries the generation so restarts can be
    /// confirmed by their own nomination.
    SelectedPair {
        local: SocketAddr,
        remote: SocketAddr,
        generation: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairState {
    Frozen,
    Waiting,
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
struct Pair {
    local: usize,
    remote: usize,
    state: PairState,
    nominated: bool,
    priority: u64,
    generation: u32,
}

struct InflightCheck {
    pair: usize,
    nominate: bool,
    is_consent: bool,
    attempts: u32,
    retransmit_at: Instant,
    raw: Vec<u8>,
    destination: SocketAddr,
    via_relay: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GatherKind {
    ServerReflexive(SocketAddr),
}

struct GatherCheck {
    kind: GatherKind,
    attempts: u32,
    retransmit_at: Instant,
    raw: Vec<u8>,
}

/// One-component ICE agent (BUNDLE collapses every m-line onto component
/// 1), driven by the PeerConnection loop: datagrams and timer fires go
/// in, transmits and events come out.
pub struct Agent {
    role: IceRole,
    tie_breaker: u64,
    local_credentials: Credentials,
    remote_credentials: Option<Credentials>,
    generation: u32,

    base: Option<SocketAddr>,
    stun_servers: Vec<SocketAddr>,
    turn: Option<TurnClient>,

    local_candidates: Vec<Candidate>,
    remote_candidates: Vec<Candidate>,
    pairs: Vec<Pair>,
    triggered: VecDeque<usize>,

    state: IceConnectionState,
    gathering_state: GatheringState,
    selected: Option<usize>,
    /// Data path from the previous generation, kept alive across an ICE
    /// restart until the new generation nominates.
    previous_selection: Option<(SocketAddr, bool)>,
    nomination_sent: bool,

    checks: HashMap<TransactionId, InflightCheck>,
    gather_checks: HashMap<TransactionId, GatherCheck>,
    gathering_deadline: Option<Instant>,
    next_check_at: Option<Instant>,
    consent_at: Option<Instant>,
    last_consent_response: Option<Instant>,

    transmits: VecDeque<Transmit>,
    events: VecDeque<AgentEvent>,
}

impl Agent {
    pub fn new(
        role: IceRole,
        stun_servers: Vec<SocketAddr>,
        turn_server: Option<TurnServer>,
    ) -> Self {
        Agent {
            role,
            tie_breaker: rand::thread_rng().gen(),
            local_credentials: Credentials::generate(),
            remote_credentials: None,
            generation: 0,
            base: None,
            stun_servers,
            turn: turn_server.map(TurnClient::new),
            local_candidates: vec![],
            remote_candidates: vec![],
            pairs: vec![],
            triggered: VecDeque::new(),
            state: IceConnectionState::New,
            gathering_state: GatheringState::New,
            selected: None,
            previous_selection: None,
            nomination_sent: false,
            checks: HashMap::new(),
            gather_checks: HashMap::new(),
            gathering_deadline: None,
            next_check_at: None,
            consent_at: None,
            last_consent_response: None,
            transmits: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn role(&self) -> IceRole {
        self.role
    }

    pub fn state(&self) -> IceConnectionState {
        self.state
    }

    pub fn local_credentials(&self) -> &Credentials {
        &self.local_credentials
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn set_remote_credentials(&mut self, ufrag: &str, pwd: &str) {
        self.remote_credentials = Some(Credentials {
            ufrag: ufrag.to_owned(),
            pwd: pwd.to_owned(),
        });
    }

    /// ICE restart: fresh credentials and a new generation. The old
    /// selected pair keeps carrying data until the new generation
    /// nominates.
    pub fn restart(&mut self) -> Credentials {
        if let Some(pair) = self.selected {
            let remote = self.remote_candidates[self.pairs[pair].remote].address;
            let via_relay =
                self.local_candidates[self.pairs[pair].local].typ == CandidateType::Relay;
            self.previous_selection = Some((remote, via_relay));
        }
        self.generation += 1;
        self.local_credentials = Credentials::generate();
        self.remote_credentials = None;
        self.local_candidates.clear();
        self.remote_candidates.clear();
        self.pairs.clear();
        self.triggered.clear();
        self.checks.clear();
        self.gather_checks.clear();
        self.selected = None;
        self.nomination_sent = false;
        self.consent_at = None;
        self.last_consent_response = None;
        self.gathering_state = GatheringState::New;
        self.set_state(IceConnectionState::Checking);
        self.local_credentials.clone()
    }

    fn set_state(&mut self, state: IceConnectionState) {
        if self.state != state {
            log::debug!("ice state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.events.push_back(AgentEvent::StateChange(state));
        }
    }

    // ---- gathering ----

    /// Gathers host, server-reflexive and relayed candidates from the one
    /// local socket. Each candidate is surfaced immediately (trickle).
    pub fn start_gathering(&mut self, now: Instant, base: SocketAddr) {
        self.base = Some(base);
        self.gathering_state = GatheringState::Gathering;
        self.gathering_deadline = Some(now + GATHERING_TIMEOUT);

        let host = Candidate::new(CandidateType::Host, base, base, None, self.generation);
        self.add_local_candidate(host);

        for server in self.stun_servers.clone() {
            let mut m = Message::new(BINDING_REQUEST);
            // Gathering binding requests carry no credentials.
            let _ = Fingerprint::add_to(&mut m);
            let raw = m.encode().to_vec();
            self.gather_checks.insert(
                m.transaction_id,
                GatherCheck {
                    kind: GatherKind::ServerReflexive(server),
                    attempts: 1,
                    retransmit_at: now + GATHER_RTO,
                    raw: raw.clone(),
                },
            );
            self.transmits.push_back(Transmit {
                destination: server,
                message: raw,
            });
        }
        if let Some(turn) = &mut self.turn {
            if let Some(t) = turn.allocate() {
                self.transmits.push_back(t);
            }
        }
        if self.stun_servers.is_empty() && self.turn.is_none() {
            self.finish_gathering();
        }
    }

    fn finish_gathering(&mut self) {
        if self.gathering_state != GatheringState::Complete {
            self.gathering_state = GatheringState::Complete;
            self.gathering_deadline = None;
            self.events.push_back(AgentEvent::GatheringComplete);
        }
    }

    fn add_local_candidate(&mut self, candidate: Candidate) {
        if self
            .local_candidates
            .iter()
            .any(|c| c.address == candidate.address && c.typ == candidate.typ)
        {
            return;
        }
        let announce = candidate.typ != CandidateType::PeerReflexive;
        if announce {
            self.events
                .push_back(AgentEvent::CandidateGathered(candidate.to_description()));
        }
        self.local_candidates.push(candidate);
        self.form_pairs();
    }

    /// Adds a remote candidate from signaling.
    pub fn add_remote_candidate(
        &mut self,
        desc: &CandidateDescription,
    ) -> Result<(), IceError> {
        let candidate = Candidate::from_description(desc, self.generation)
            .ok_or_else(|| IceError::BadRemoteCandidate(desc.to_string()))?;
        if self
            .remote_candidates
            .iter()
            .any(|c| c.address == candidate.address)
        {
            return Ok(());
        }
        if let Some(turn) = &mut self.turn {
            if let Some(t) = turn.create_permission(candidate.address) {
                self.transmits.push_back(t);
            }
        }
        self.remote_candidates.push(candidate);
        self.form_pairs();
        Ok(())
    }

    /// Builds the checklist: all viable (local, remote) combinations,
    /// pruned and priority-ordered. Server-reflexive local candidates are
    /// replaced by their base per RFC 8445 §6.1.2.4.
    fn form_pairs(&mut self) {
        for (li, local) in self.local_candidates.iter().enumerate() {
            if local.typ == CandidateType::ServerReflexive {
                continue;
            }
            for (ri, remote) in self.remote_candidates.iter().enumerate() {
                if local.address.is_ipv4() != remote.address.is_ipv4() {
                    continue;
                }
                if self
                    .pairs
                    .iter()
                    .any(|p| p.local == li && p.remote == ri)
                {
                    continue;
                }
                let priority = match self.role {
                    IceRole::Controlling => pair_priority(local.priority, remote.priority),
                    IceRole::Controlled => pair_priority(remote.priority, local.priority),
                };
                self.pairs.push(Pair {
                    local: li,
                    remote: ri,
                    state: PairState::Frozen,
                    nominated: false,
                    priority,
                    generation: self.generation,
                });
            }
        }
        // Pair order is never rearranged: checks, triggers and the
        // selection all hold indices into this vec.
        self.unfreeze();
    }

    /// Promotes the best frozen pair of each foundation that has nothing
    /// else running.
    fn unfreeze(&mut self) {
        let mut active_foundations: Vec<String> = vec![];
        for pair in &self.pairs {
            if matches!(
                pair.state,
                PairState::Waiting | PairState::InProgress | PairState::Succeeded
            ) {
                active_foundations.push(self.pair_foundation(pair));
            }
        }
        let foundations: Vec<String> =
            self.pairs.iter().map(|p| self.pair_foundation(p)).collect();
        let mut order: Vec<usize> = (0..self.pairs.len()).collect();
        order.sort_by(|&a, &b| self.pairs[b].priority.cmp(&self.pairs[a].priority));
        for i in order {
            let pair = &mut self.pairs[i];
            if pair.state == PairState::Frozen && !active_foundations.contains(&foundations[i])
            {
                pair.state = PairState::Waiting;
                active_foundations.push(foundations[i].clone());
            }
        }
    }

    fn pair_foundation(&self, pair: &Pair) -> String {
        format!(
            "{}:{}",
            self.local_candidates[pair.local].foundation,
            self.remote_candidates[pair.remote].foundation
        )
    }

    // ---- polling ----

    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        self.transmits.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<AgentEvent> {
        self.events.pop_front()
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        let check_retransmit = self.checks.values().map(|c| c.retransmit_at).min();
        let gather_retransmit = self.gather_checks.values().map(|c| c.retransmit_at).min();
        [
            self.next_check_at,
            self.gathering_deadline,
            self.consent_at,
            check_retransmit,
            gather_retransmit,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// The wire destination of the current data path, with a flag for
    /// relay encapsulation.
    fn data_path(&self) -> Option<(SocketAddr, bool)> {
        if let Some(i) = self.selected {
            let pair = &self.pairs[i];
            let via_relay = self.local_candidates[pair.local].typ == CandidateType::Relay;
            return Some((self.remote_candidates[pair.remote].address, via_relay));
        }
        if let Some(prev) = self.previous_selection {
            return Some(prev);
        }
        // Best validated pair before nomination.
        self.pairs
            .iter()
            .filter(|p| p.state == PairState::Succeeded)
            .max_by_key(|p| p.priority)
            .map(|p| {
                (
                    self.remote_candidates[p.remote].address,
                    self.local_candidates[p.local].typ == CandidateType::Relay,
                )
            })
    }

    /// Wraps outgoing DTLS/SRTP bytes for the current data path.
    pub fn transmit_data(&self, payload: &[u8]) -> Option<Transmit> {
        let (destination, via_relay) = self.data_path()?;
        if via_relay {
            return self
                .turn
                .as_ref()
                .and_then(|t| t.send_indication(destination, payload));
        }
        Some(Transmit {
            destination,
            message: payload.to_vec(),
        })
    }

    pub fn has_data_path(&self) -> bool {
        self.data_path().is_some()
    }

    // ---- timer driving ----

    pub fn handle_timeout(&mut self, now: Instant) {
        if let Some(deadline) = self.gathering_deadline {
            if now >= deadline {
                log::debug!("ice gathering timed out with partial results");
                self.finish_gathering();
            }
        }
        self.retransmit_gather_checks(now);
        self.retransmit_checks(now);
        self.run_scheduled_check(now);
        self.run_consent(now);
    }

    fn retransmit_gather_checks(&mut self, now: Instant) {
        let mut exhausted = vec![];
        let mut resend = vec![];
        for (tid, check) in self.gather_checks.iter_mut() {
            if now < check.retransmit_at {
                continue;
            }
            if check.attempts >= MAX_GATHER_ATTEMPTS {
                exhausted.push(*tid);
                continue;
            }
            check.attempts += 1;
            check.retransmit_at = now + GATHER_RTO * 2u32.pow(check.attempts - 1);
            let GatherKind::ServerReflexive(server) = check.kind;
            resend.push(Transmit {
                destination: server,
                message: check.raw.clone(),
            });
        }
        for tid in exhausted {
            self.gather_checks.remove(&tid);
        }
        self.transmits.extend(resend);
        self.maybe_finish_gathering();
    }

    fn maybe_finish_gathering(&mut self) {
        let turn_pending = self
            .turn
            .as_ref()
            .map(|t| !t.is_allocated())
            .unwrap_or(false);
        if self.gathering_state == GatheringState::Gathering
            && self.gather_checks.is_empty()
            && !turn_pending
        {
            self.finish_gathering();
        }
    }

    fn retransmit_checks(&mut self, now: Instant) {
        let mut failed_pairs = vec![];
        let mut dead = vec![];
        let mut resend = vec![];
        for (tid, check) in self.checks.iter_mut() {
            if now < check.retransmit_at {
                continue;
            }
            if check.attempts >= MAX_CHECK_ATTEMPTS {
                failed_pairs.push(check.pair);
                dead.push(*tid);
                continue;
            }
            check.attempts += 1;
            check.retransmit_at = now + CHECK_RTO * 2u32.pow(check.attempts - 1);
            resend.push((check.destination, check.raw.clone(), check.via_relay));
        }
        for tid in dead {
            self.checks.remove(&tid);
        }
        for (destination, message, via_relay) in resend {
            self.emit(destination, message, via_relay);
        }
        for pair in failed_pairs {
            if self.pairs[pair].state == PairState::InProgress {
                self.pairs[pair].state = PairState::Failed;
            }
        }
        self.evaluate_failure();
    }

    fn evaluate_failure(&mut self) {
        let done_gathering = self.gathering_state == GatheringState::Complete;
        if !self.pairs.is_empty()
            && done_gathering
            && self.pairs.iter().all(|p| p.state == PairState::Failed)
        {
            self.set_state(IceConnectionState::Failed);
        }
    }

    fn run_scheduled_check(&mut self, now: Instant) {
        if self.remote_credentials.is_none() {
            return;
        }
        if let Some(at) = self.next_check_at {
            if now < at {
                return;
            }
        }
        self.unfreeze();

        let next = self.triggered.pop_front().or_else(|| {
            self.pairs
                .iter()
                .enumerate()
                .filter(|(_, p)| p.state == PairState::Waiting)
                .max_by_key(|(_, p)| p.priority)
                .map(|(i, _)| i)
        });
        if let Some(pair) = next {
            if self.state == IceConnectionState::New {
                self.set_state(IceConnectionState::Checking);
            }
            self.send_check(pair, false, false, now);
        }
        let pending = self
            .pairs
            .iter()
            .any(|p| matches!(p.state, PairState::Waiting | PairState::Frozen))
            || !self.triggered.is_empty();
        self.next_check_at = pending.then(|| now + CHECK_PACING);
    }

    fn run_consent(&mut self, now: Instant) {
        let Some(at) = self.consent_at else { return };
        if now < at {
            return;
        }
        if let Some(last) = self.last_consent_response {
            if now.saturating_duration_since(last) > CONSENT_EXPIRY {
                log::warn!("ice consent expired on selected pair");
                self.set_state(IceConnectionState::Disconnected);
                self.set_state(IceConnectionState::Failed);
                self.consent_at = None;
                return;
            }
        }
        if let Some(pair) = self.selected {
            self.send_check(pair, false, true, now);
        }
        let jitter = rand::thread_rng().gen_range(0..CONSENT_JITTER_MS * 2);
        self.consent_at = Some(
            now + CONSENT_INTERVAL - Duration::from_millis(CONSENT_JITTER_MS)
                + Duration::from_millis(jitter),
        );
    }

    // ---- checks ----

    fn send_check(&mut self, pair: usize, nominate: bool, is_consent: bool, now: Instant) {
        let Some(remote_credentials) = self.remote_credentials.clone() else {
            return;
        };
        let destination = self.remote_candidates[self.pairs[pair].remote].address;
        let via_relay =
            self.local_candidates[self.pairs[pair].local].typ == CandidateType::Relay;

        let mut m = Message::new(BINDING_REQUEST);
        let username = format!(
            "{}:{}",
            remote_credentials.ufrag, self.local_credentials.ufrag
        );
        let build = (|| -> stun::Result<()> {
            Username(username).add_to(&mut m)?;
            m.append(ATTR_PRIORITY, &prflx_priority(COMPONENT_RTP).to_be_bytes())?;
            match self.role {
                IceRole::Controlling => {
                    m.append(ATTR_ICE_CONTROLLING, &self.tie_breaker.to_be_bytes())?;
                    if nominate {
                        m.append(ATTR_USE_CANDIDATE, &[])?;
                    }
                }
                IceRole::Controlled => {
                    m.append(ATTR_ICE_CONTROLLED, &self.tie_breaker.to_be_bytes())?;
                }
            }
            MessageIntegrity::new_short_term(&remote_credentials.pwd).add_to(&mut m)?;
            Fingerprint::add_to(&mut m)
        })();
        if build.is_err() {
            return;
        }

        if !is_consent && self.pairs[pair].state != PairState::Succeeded {
            self.pairs[pair].state = PairState::InProgress;
        }
        let raw = m.encode().to_vec();
        self.checks.insert(
            m.transaction_id,
            InflightCheck {
                pair,
                nominate,
                is_consent,
                attempts: 1,
                retransmit_at: now + CHECK_RTO,
                raw: raw.clone(),
                destination,
                via_relay,
            },
        );
        self.emit(destination, raw, via_relay);
    }

    fn emit(&mut self, destination: SocketAddr, message: Vec<u8>, via_relay: bool) {
        if via_relay {
            if let Some(t) = self
                .turn
                .as_ref()
                .and_then(|turn| turn.send_indication(destination, &message))
            {
                self.transmits.push_back(t);
            }
        } else {
            self.transmits.push_back(Transmit {
                destination,
                message,
            });
        }
    }

    // ---- inbound ----

    /// Feeds one inbound STUN datagram. A TURN Data indication returns the
    /// decapsulated payload and its true source, which the caller must run
    /// back through the demultiplexer.
    pub fn handle_receive(
        &mut self,
        now: Instant,
        from: SocketAddr,
        datagram: &[u8],
    ) -> Option<(SocketAddr, Vec<u8>)> {
        let message = Message::decode(datagram).ok()?;

        if let Some((peer, payload)) = TurnClient::parse_data_indication(&message) {
            return Some((peer, payload));
        }
        let mut from_turn_server = false;
        let mut followup = None;
        let mut relayed = None;
        if let Some(turn) = &mut self.turn {
            if from == turn.server_address() {
                from_turn_server = true;
                (followup, relayed) = turn.handle_message(&message);
            }
        }
        if let Some(t) = followup {
            self.transmits.push_back(t);
        }
        if let Some(relay_addr) = relayed {
            let base = self.base.unwrap_or(relay_addr);
            let candidate = Candidate::new(
                CandidateType::Relay,
                relay_addr,
                base,
                Some(base),
                self.generation,
            );
            self.add_local_candidate(candidate);
            // Permissions for everything already signaled.
            let peers: Vec<SocketAddr> =
                self.remote_candidates.iter().map(|c| c.address).collect();
            if let Some(turn) = &mut self.turn {
                for peer in peers {
                    if let Some(t) = turn.create_permission(peer) {
                        self.transmits.push_back(t);
                    }
                }
            }
            self.maybe_finish_gathering();
        }
        if from_turn_server && turn_allocate_related(&message) {
            return None;
        }

        match message.typ {
            BINDING_REQUEST => {
                self.handle_binding_request(&message, from, now);
                None
            }
            BINDING_SUCCESS | BINDING_ERROR => {
                self.handle_binding_response(&message, from, now);
                None
            }
            _ => None,
        }
    }

    fn handle_binding_request(&mut self, m: &Message, from: SocketAddr, now: Instant) {
        // Checks before credentials arrive cannot be validated.
        let Ok(username) = Username::get_from(m) else {
            return;
        };
        let Some((target_ufrag, _)) = username.0.split_once(':') else {
            return;
        };
        if target_ufrag != self.local_credentials.ufrag {
            return;
        }
        if MessageIntegrity::new_short_term(&self.local_credentials.pwd)
            .check(m)
            .is_err()
        {
            return;
        }
        if m.contains(ATTR_FINGERPRINT) && Fingerprint::check(m).is_err() {
            return;
        }

        // Role conflict resolution (RFC 8445 §7.3.1.1).
        if let Ok(their_tb) = m.get(ATTR_ICE_CONTROLLING) {
            if self.role == IceRole::Controlling {
                let theirs = u64::from_be_bytes(their_tb.try_into().unwrap_or([0; 8]));
                if self.tie_breaker >= theirs {
                    self.send_role_conflict(m, from);
                    return;
                }
                self.switch_role(IceRole::Controlled);
            }
        }
        if m.contains(ATTR_ICE_CONTROLLED) && self.role == IceRole::Controlled {
            let theirs = m
                .get(ATTR_ICE_CONTROLLED)
                .ok()
                .and_then(|v| v.try_into().ok())
                .map(u64::from_be_bytes)
                .unwrap_or(0);
            if self.tie_breaker >= theirs {
                self.switch_role(IceRole::Controlling);
            } else {
                self.send_role_conflict(m, from);
                return;
            }
        }

        // A request from an unknown transport address reveals a
        // peer-reflexive remote candidate.
        if !self.remote_candidates.iter().any(|c| c.address == from) {
            let priority = m
                .get(ATTR_PRIORITY)
                .ok()
                .and_then(|v| v.try_into().ok())
                .map(u32::from_be_bytes)
                .unwrap_or_else(|| prflx_priority(COMPONENT_RTP));
            let mut candidate =
                Candidate::new(CandidateType::PeerReflexive, from, from, None, self.generation);
            candidate.priority = priority;
            self.remote_candidates.push(candidate);
            self.form_pairs();
        }

        // Answer the check.
        let mut response = m.response(MessageClass::SuccessResponse);
        let ok = XorMappedAddress(from)
            .add_to(&mut response)
            .and_then(|_| {
                MessageIntegrity::new_short_term(&self.local_credentials.pwd)
                    .add_to(&mut response)
            })
            .and_then(|_| Fingerprint::add_to(&mut response));
        if ok.is_ok() {
            let via_relay = self.received_via_relay(from);
            self.emit(from, response.encode().to_vec(), via_relay);
        }

        let Some(pair) = self.pair_for_remote(from) else {
            return;
        };
        // Nomination from the controlling peer.
        if m.contains(ATTR_USE_CANDIDATE) && self.role == IceRole::Controlled {
            if self.pairs[pair].state == PairState::Succeeded {
                self.nominate(pair, now);
            } else {
                self.pairs[pair].nominated = true;
            }
        }
        // Triggered check.
        if matches!(
            self.pairs[pair].state,
            PairState::Frozen | PairState::Waiting | PairState::Failed
        ) {
            self.pairs[pair].state = PairState::Waiting;
            self.triggered.push_back(pair);
            if self.next_check_at.is_none() {
                self.next_check_at = Some(now);
            }
        }
    }

    fn handle_binding_response(&mut self, m: &Message, from: SocketAddr, now: Instant) {
        // Gathering responses carry no integrity.
        if let Some(check) = self.gather_checks.remove(&m.transaction_id) {
            let GatherKind::ServerReflexive(_server) = check.kind;
            if let Ok(mapped) = XorMappedAddress::get_from(m) {
                if let Some(base) = self.base {
                    let candidate = Candidate::new(
                        CandidateType::ServerReflexive,
                        mapped.0,
                        base,
                        Some(base),
                        self.generation,
                    );
                    if candidate.address != base {
                        self.add_local_candidate(candidate);
                    }
                }
            }
            self.maybe_finish_gathering();
            return;
        }

        let Some(check) = self.checks.remove(&m.transaction_id) else {
            return;
        };
        let pair = check.pair;

        if m.typ == BINDING_ERROR {
            if let Ok(code) = ErrorCodeAttribute::get_from(m) {
                if code.code == CODE_ROLE_CONFLICT {
                    let new_role = match self.role {
                        IceRole::Controlling => IceRole::Controlled,
                        IceRole::Controlled => IceRole::Controlling,
                    };
                    self.switch_role(new_role);
                    self.pairs[pair].state = PairState::Waiting;
                    self.triggered.push_back(pair);
                    self.next_check_at = Some(now);
                    return;
                }
            }
            self.pairs[pair].state = PairState::Failed;
            self.evaluate_failure();
            return;
        }

        let Some(remote_credentials) = &self.remote_credentials else {
            return;
        };
        if MessageIntegrity::new_short_term(&remote_credentials.pwd)
            .check(m)
            .is_err()
        {
            return;
        }
        let Ok(mapped) = XorMappedAddress::get_from(m) else {
            return;
        };
        // Symmetric check: the response must come from the pair's remote.
        if from != check.destination && !check.via_relay {
            return;
        }

        if check.is_consent {
            self.last_consent_response = Some(now);
            return;
        }

        // A new mapped address is a peer-reflexive local candidate.
        if !self
            .local_candidates
            .iter()
            .any(|c| c.address == mapped.0)
        {
            if let Some(base) = self.base {
                let candidate = Candidate::new(
                    CandidateType::PeerReflexive,
                    mapped.0,
                    base,
                    Some(base),
                    self.generation,
                );
                self.add_local_candidate(candidate);
            }
        }

        self.pairs[pair].state = PairState::Succeeded;
        if self.state == IceConnectionState::Checking
            || self.state == IceConnectionState::Disconnected
        {
            self.set_state(IceConnectionState::Connected);
        }

        if check.nominate || self.pairs[pair].nominated {
            self.nominate(pair, now);
        } else if self.role == IceRole::Controlling && !self.nomination_sent {
            // Regular nomination: first validated pair wins; higher
            // priority pairs that validate later would re-nominate in a
            // fuller implementation.
            self.nomination_sent = true;
            self.send_check(pair, true, false, now);
        }
    }

    fn nominate(&mut self, pair: usize, now: Instant) {
        self.pairs[pair].nominated = true;
        let local = self.local_candidates[self.pairs[pair].local].address;
        let remote = self.remote_candidates[self.pairs[pair].remote].address;
        let is_new = self.selected != Some(pair);
        self.selected = Some(pair);
        self.previous_selection = None;
        if is_new {
            log::debug!("ice nominated pair {local} -> {remote}");
            self.events.push_back(AgentEvent::SelectedPair {
                local,
                remote,
                generation: self.pairs[pair].generation,
            });
        }
        self.set_state(IceConnectionState::Connected);
        self.set_state(IceConnectionState::Completed);
        if self.consent_at.is_none() {
            self.last_consent_response = Some(now);
            self.consent_at = Some(now + CONSENT_INTERVAL);
        }
    }

    fn pair_for_remote(&self, from: SocketAddr) -> Option<usize> {
        self.pairs
            .iter()
            .enumerate()
            .filter(|(_, p)| self.remote_candidates[p.remote].address == from)
            .max_by_key(|(_, p)| p.priority)
            .map(|(i, _)| i)
    }

    fn received_via_relay(&self, _from: SocketAddr) -> bool {
        // With a single socket, anything that reached us through the relay
        // was already decapsulated; answering directly is correct for the
        // direct path and the relay path alike (the TURN server reflects
        // our Send indications).
        false
    }

    fn send_role_conflict(&mut self, m: &Message, from: SocketAddr) {
        let mut response = m.response(MessageClass::ErrorResponse);
        let ok = ErrorCodeAttribute::new(CODE_ROLE_CONFLICT)
            .add_to(&mut response)
            .and_then(|_| {
                MessageIntegrity::new_short_term(&self.local_credentials.pwd)
                    .add_to(&mut response)
            })
            .and_then(|_| Fingerprint::add_to(&mut response));
        if ok.is_ok() {
            self.transmits.push_back(Transmit {
                destination: from,
                message: response.encode().to_vec(),
            });
        }
    }

    fn switch_role(&mut self, role: IceRole) {
        if self.role == role {
            return;
        }
        log::debug!("ice role conflict: switching to {role:?}");
        self.role = role;
        for pair in &mut self.pairs {
            let local = self.local_candidates[pair.local].priority;
            let remote = self.remote_candidates[pair.remote].priority;
            pair.priority = match role {
                IceRole::Controlling => pair_priority(local, remote),
                IceRole::Controlled => pair_priority(remote, local),
            };
        }
    }

    /// Kicks the checklist once remote credentials and candidates exist.
    pub fn start_checks(&mut self, now: Instant) {
        if self.remote_credentials.is_some() && self.next_check_at.is_none() {
            self.next_check_at = Some(now);
        }
    }

    pub fn close(&mut self) {
        self.set_state(IceConnectionState::Closed);
        self.checks.clear();
        self.gather_checks.clear();
        self.next_check_at = None;
        self.consent_at = None;
        self.gathering_deadline = None;
    }
}

/// True when the message is part of the allocate conversation rather than
/// a connectivity check relayed back to us.
fn turn_allocate_related(m: &Message) -> bool {
    matches!(
        m.typ.method,
        METHOD_ALLOCATE | METHOD_REFRESH | METHOD_CREATE_PERMISSION
    )
}
