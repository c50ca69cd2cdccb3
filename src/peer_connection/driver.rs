use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch};

use dtls::conn::{DtlsConn, DtlsEvent};
use dtls::{Config as DtlsConfig, DtlsRole};
use sctp::{Association, AssociationEvent, Reliability};
use sdp::{
    Direction, MediaKind, MediaSection, SessionDescription, Setup, SsrcGroup,
};
use util::marshal::{Marshal, Unmarshal};

use crate::api::{MediaEngine, SettingEngine};
use crate::data_channel::{
    DataChannel, DataChannelCommand, DataChannelInit, DataChannelMessage, DataChannelState,
};
use crate::error::Error;
use crate::ice::turn::TurnServer;
use crate::ice::{Agent, AgentEvent, IceConnectionState, IceRole};
use crate::mux::{classify, DemuxStats, PacketKind};
use crate::rtp_engine::{
    unwrap_rtx, JitterBuffer, NackGenerator, ReceiverStats, RtxSender, TwccRecorder,
    TwccSender,
};
use crate::rtp_transceiver::{
    ReceiveStream, TrackPacket, TrackRemote, Transceiver, TransceiverInfo,
};
use crate::Result;

use super::state::*;
use super::Handlers;

const RTCP_REPORT_INTERVAL: Duration = Duration::from_secs(5);
const IDLE_DEADLINE: Duration = Duration::from_secs(3600);

pub(crate) enum Command {
    CreateOffer {
        ice_restart: bool,
        reply: oneshot::Sender<Result<SessionDescriptionInit>>,
    },
    CreateAnswer {
        reply: oneshot::Sender<Result<SessionDescriptionInit>>,
    },
    SetLocalDescription {
        desc: SessionDescriptionInit,
        reply: oneshot::Sender<Result<()>>,
    },
    SetRemoteDescription {
        desc: SessionDescriptionInit,
        reply: oneshot::Sender<Result<()>>,
    },
    AddIceCandidate {
        candidate: String,
        reply: oneshot::Sender<Result<()>>,
    },
    AddTransceiver {
        kind: MediaKind,
        direction: Direction,
        reply: oneshot::Sender<Result<TransceiverInfo>>,
    },
    RegisterDataChannel {
        channel: Arc<DataChannel>,
        reply: oneshot::Sender<Result<()>>,
    },
    WriteRtp {
        mid: String,
        packet: rtp::packet::Packet,
        keyframe: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    RequestKeyframe {
        mid: String,
        reply: oneshot::Sender<Result<()>>,
    },
    RestartIce {
        reply: oneshot::Sender<Result<()>>,
    },
    GetStats {
        reply: oneshot::Sender<Result<StatsReport>>,
    },
    Close {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Aggregate counters surfaced through `get_stats`.
#[derive(Debug, Default, Clone)]
pub struct StatsReport {
    pub demux: DemuxStats,
    pub rtp_packets_sent: u64,
    pub rtp_packets_received: u64,
    pub srtp_auth_failures: u64,
    pub srtp_replays: u64,
    pub nacks_sent: u64,
    pub nacks_received: u64,
    pub rtx_packets_sent: u64,
    pub rtx_packets_recovered: u64,
    pub keyframe_requests_received: u64,
    pub keyframe_requests_sent: u64,
    pub twcc_feedback_sent: u64,
    pub twcc_acked: u64,
    pub twcc_lost: u64,
    pub remb_bps: u64,
    pub last_error: Option<String>,
}

struct ChannelSlot {
    channel: Arc<DataChannel>,
    dcep_sent: bool,
}

pub(crate) struct Driver {
    socket: Arc<UdpSocket>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    dc_command_rx: mpsc::UnboundedReceiver<DataChannelCommand>,
    dc_command_tx: mpsc::UnboundedSender<DataChannelCommand>,
    handlers: Arc<Handlers>,

    media_engine: MediaEngine,
    setting_engine: SettingEngine,
    codec_preferences: Option<Vec<String>>,
    certificate: dtls::Certificate,

    agent: Agent,
    gathering_started: bool,

    dtls: Option<DtlsConn>,
    dtls_role: Option<DtlsRole>,
    dtls_started: bool,
    remote_fingerprint: Option<String>,

    srtp_in: Option<srtp::Context>,
    srtp_out: Option<srtp::Context>,

    sctp: Option<Association>,
    sctp_started: bool,
    want_data_section: bool,
    data_mid: Option<String>,
    next_stream_id: u16,
    channels: Vec<ChannelSlot>,
    stream_to_channel: HashMap<u16, usize>,
    reset_queue: Vec<u16>,

    transceivers: Vec<Transceiver>,
    twcc_recorder: Option<TwccRecorder>,
    twcc_sender: TwccSender,
    next_rtcp_at: Option<Instant>,

    signaling: SignalingState,
    connection_state: PeerConnectionState,
    local_description: Option<(SdpType, SessionDescription)>,
    remote_description: Option<(SdpType, SessionDescription)>,
    pending_remote_candidates: Vec<String>,

    state_tx: watch::Sender<PeerConnectionState>,
    ice_state_tx: watch::Sender<IceConnectionState>,

    stats: StatsReport,
    failed: bool,
    closed: bool,
}

impl Driver {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        socket: UdpSocket,
        command_rx: mpsc::UnboundedReceiver<Command>,
        dc_command_rx: mpsc::UnboundedReceiver<DataChannelCommand>,
        dc_command_tx: mpsc::UnboundedSender<DataChannelCommand>,
        handlers: Arc<Handlers>,
        media_engine: MediaEngine,
        setting_engine: SettingEngine,
        codec_preferences: Option<Vec<String>>,
        certificate: dtls::Certificate,
        stun_servers: Vec<std::net::SocketAddr>,
        turn_server: Option<TurnServer>,
        state_tx: watch::Sender<PeerConnectionState>,
        ice_state_tx: watch::Sender<IceConnectionState>,
    ) -> Self {
        // The offerer starts controlling; a later role conflict resolves
        // disagreements.
        let agent = Agent::new(IceRole::Controlling, stun_servers, turn_server);
        Driver {
            socket: Arc::new(socket),
            command_rx,
            dc_command_rx,
            dc_command_tx,
            handlers,
            media_engine,
            setting_engine,
            codec_preferences,
            certificate,
            agent,
            gathering_started: false,
            dtls: None,
            dtls_role: None,
            dtls_started: false,
            remote_fingerprint: None,
            srtp_in: None,
            srtp_out: None,
            sctp: None,
            sctp_started: false,
            want_data_section: false,
            data_mid: None,
            next_stream_id: 0,
            channels: vec![],
            stream_to_channel: HashMap::new(),
            reset_queue: vec![],
            transceivers: vec![],
            twcc_recorder: None,
            twcc_sender: TwccSender::new(),
            next_rtcp_at: None,
            signaling: SignalingState::Stable,
            connection_state: PeerConnectionState::New,
            local_description: None,
            remote_description: None,
            pending_remote_candidates: vec![],
            state_tx,
            ice_state_tx,
            stats: StatsReport::default(),
            failed: false,
            closed: false,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut buf = vec![0u8; crate::RECEIVE_MTU];
        loop {
            self.drive().await;
            if self.closed {
                break;
            }
            let deadline = self
                .next_deadline()
                .unwrap_or_else(|| Instant::now() + IDLE_DEADLINE);
            tokio::select! {
                maybe_command = self.command_rx.recv() => {
                    match maybe_command {
                        Some(command) => self.handle_command(command).await,
                        None => break,
                    }
                }
                maybe_dc = self.dc_command_rx.recv() => {
                    if let Some(command) = maybe_dc {
                        self.handle_dc_command(command).await;
                    }
                }
                received = self.socket.recv_from(&mut buf) => {
                    if let Ok((n, from)) = received {
                        let datagram = buf[..n].to_vec();
                        self.handle_datagram(&datagram, from).await;
                    }
                }
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                    self.handle_timeouts(Instant::now()).await;
                }
            }
        }
        log::debug!("peer connection driver stopped");
    }

    // ---- timers ----

    fn next_deadline(&self) -> Option<Instant> {
        let now = Instant::now();
        let mut deadlines: Vec<Option<Instant>> = vec![
            self.agent.poll_timeout(),
            self.dtls.as_ref().and_then(|d| d.poll_timeout()),
            self.sctp.as_ref().and_then(|s| s.poll_timeout()),
            self.twcc_recorder.as_ref().and_then(|t| t.poll_timeout()),
            self.next_rtcp_at,
        ];
        for transceiver in &self.transceivers {
            for stream in transceiver.receiver.streams.values() {
                deadlines.push(stream.jitter.poll_timeout());
                deadlines.push(stream.nack.poll_timeout(now));
            }
        }
        deadlines.into_iter().flatten().min()
    }

    async fn handle_timeouts(&mut self, now: Instant) {
        self.agent.handle_timeout(now);
        if let Some(dtls) = &mut self.dtls {
            if let Err(e) = dtls.handle_timeout(now) {
                self.fail(Error::Dtls(e)).await;
            }
        }
        if let Some(sctp) = &mut self.sctp {
            if let Err(e) = sctp.handle_timeout(now) {
                self.fail(Error::Sctp(e)).await;
            }
        }

        // Jitter buffer hold expiry.
        let mut deliveries: Vec<(usize, u32, Vec<crate::rtp_engine::MediaPacket>)> = vec![];
        for (i, transceiver) in self.transceivers.iter_mut().enumerate() {
            for (&ssrc, stream) in transceiver.receiver.streams.iter_mut() {
                let released = stream.jitter.handle_timeout(now);
                if !released.is_empty() {
                    deliveries.push((i, ssrc, released));
                }
            }
        }
        for (i, ssrc, released) in deliveries {
            self.deliver_released(i, ssrc, released, now);
        }

        // NACK schedule.
        let mut feedback: Vec<Box<dyn rtcp::Packet + Send + Sync>> = vec![];
        for transceiver in &mut self.transceivers {
            for stream in transceiver.receiver.streams.values_mut() {
                if let Some(nack) = stream.nack.poll(now) {
                    self.stats.nacks_sent += 1;
                    feedback.push(Box::new(nack));
                }
            }
        }
        // TWCC feedback.
        if let Some(recorder) = &mut self.twcc_recorder {
            if let Some(fb) = recorder.poll_feedback(now) {
                self.stats.twcc_feedback_sent += 1;
                feedback.push(Box::new(fb));
            }
        }
        if !feedback.is_empty() {
            self.send_rtcp_feedback(feedback, now);
        }

        if let Some(at) = self.next_rtcp_at {
            if now >= at {
                self.send_reports(now);
                self.next_rtcp_at = Some(now + RTCP_REPORT_INTERVAL);
            }
        }
        self.drive().await;
    }

    // ---- command handling ----

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::CreateOffer { ice_restart, reply } => {
                let _ = reply.send(self.create_offer(ice_restart));
            }
            Command::CreateAnswer { reply } => {
                let _ = reply.send(self.create_answer());
            }
            Command::SetLocalDescription { desc, reply } => {
                let _ = reply.send(self.set_local_description(desc).await);
            }
            Command::SetRemoteDescription { desc, reply } => {
                let _ = reply.send(self.set_remote_description(desc).await);
            }
            Command::AddIceCandidate { candidate, reply } => {
                let _ = reply.send(self.add_ice_candidate(&candidate));
            }
            Command::AddTransceiver {
                kind,
                direction,
                reply,
            } => {
                let _ = reply.send(self.add_transceiver(kind, direction).await);
            }
            Command::RegisterDataChannel { channel, reply } => {
                let _ = reply.send(self.register_data_channel(channel).await);
            }
            Command::WriteRtp {
                mid,
                packet,
                keyframe,
                reply,
            } => {
                let _ = reply.send(self.write_rtp(&mid, packet, keyframe).await);
            }
            Command::RequestKeyframe { mid, reply } => {
                let _ = reply.send(self.request_keyframe(&mid));
            }
            Command::RestartIce { reply } => {
                let _ = reply.send(self.restart_ice().await);
            }
            Command::GetStats { reply } => {
                let mut stats = self.stats.clone();
                let twcc = self.twcc_sender.stats();
                stats.twcc_acked = twcc.acked;
                stats.twcc_lost = twcc.lost;
                let _ = reply.send(Ok(stats));
            }
            Command::Close { reply } => {
                self.close().await;
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed || self.signaling == SignalingState::Closed {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    async fn add_transceiver(
        &mut self,
        kind: MediaKind,
        direction: Direction,
    ) -> Result<TransceiverInfo> {
        self.ensure_open()?;
        if kind == MediaKind::Application {
            return Err(Error::Config(
                "application sections come from create_data_channel".to_owned(),
            ));
        }
        let mid = self.next_mid();
        let transceiver = Transceiver::new(mid.clone(), kind, direction);
        let info = TransceiverInfo {
            mid,
            kind,
            direction,
        };
        self.transceivers.push(transceiver);
        self.fire_negotiation_needed().await;
        Ok(info)
    }

    fn next_mid(&self) -> String {
        let mut n = self.transceivers.len() + usize::from(self.data_mid.is_some());
        loop {
            let candidate = n.to_string();
            let taken = self.transceivers.iter().any(|t| t.mid == candidate)
                || self.data_mid.as_deref() == Some(candidate.as_str());
            if !taken {
                return candidate;
            }
            n += 1;
        }
    }

    async fn register_data_channel(&mut self, channel: Arc<DataChannel>) -> Result<()> {
        self.ensure_open()?;
        self.want_data_section = true;
        self.channels.push(ChannelSlot {
            channel,
            dcep_sent: false,
        });
        let slot = self.channels.len() - 1;
        if self.sctp.as_ref().map(|s| s.is_established()).unwrap_or(false) {
            self.open_channel(slot).await;
        }
        self.fire_negotiation_needed().await;
        Ok(())
    }

    async fn restart_ice(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.agent.restart();
        self.gathering_started = false;
        self.fire_negotiation_needed().await;
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.signaling = SignalingState::Closed;
        for slot in &self.channels {
            if slot.channel.ready_state() != DataChannelState::Closed {
                slot.channel.set_state(DataChannelState::Closed);
                Self::fire_dc_close(&slot.channel).await;
            }
        }
        if let Some(sctp) = &mut self.sctp {
            sctp.abort();
        }
        if let Some(dtls) = &mut self.dtls {
            dtls.close();
        }
        self.agent.close();
        self.flush_transports().await;
        self.set_connection_state(PeerConnectionState::Closed).await;
    }

    // ---- negotiation ----

    fn create_offer(&mut self, ice_restart: bool) -> Result<SessionDescriptionInit> {
        self.ensure_open()?;
        if ice_restart {
            self.agent.restart();
            self.gathering_started = false;
        }
        if self.want_data_section && self.data_mid.is_none() {
            self.data_mid = Some(self.next_mid());
        }
        let sdp = self.build_description(None)?;
        Ok(SessionDescriptionInit {
            sdp_type: SdpType::Offer,
            sdp: sdp.serialize(),
        })
    }

    fn create_answer(&mut self) -> Result<SessionDescriptionInit> {
        self.ensure_open()?;
        if self.signaling != SignalingState::HaveRemoteOffer {
            return Err(Error::InvalidSignalingState(self.signaling.name()));
        }
        let remote = self
            .remote_description
            .as_ref()
            .map(|(_, sd)| sd.clone())
            .ok_or(Error::InvalidSignalingState("no remote description"))?;
        let sdp = self.build_description(Some(&remote))?;
        Ok(SessionDescriptionInit {
            sdp_type: SdpType::Answer,
            sdp: sdp.serialize(),
        })
    }

    async fn set_local_description(&mut self, desc: SessionDescriptionInit) -> Result<()> {
        self.ensure_open()?;
        let parsed = SessionDescription::parse(&desc.sdp)?;
        match (self.signaling, desc.sdp_type) {
            (SignalingState::Stable, SdpType::Offer) => {
                self.signaling = SignalingState::HaveLocalOffer;
            }
            (SignalingState::HaveRemoteOffer, SdpType::Answer) => {
                self.signaling = SignalingState::Stable;
            }
            (state, _) => return Err(Error::InvalidSignalingState(state.name())),
        }
        self.local_description = Some((desc.sdp_type, parsed));
        self.start_gathering_if_needed();
        self.drive().await;
        Ok(())
    }

    async fn set_remote_description(&mut self, desc: SessionDescriptionInit) -> Result<()> {
        self.ensure_open()?;
        let parsed = SessionDescription::parse(&desc.sdp)?;
        let remote_is_offer = match (self.signaling, desc.sdp_type) {
            (SignalingState::Stable, SdpType::Offer) => {
                self.signaling = SignalingState::HaveRemoteOffer;
                true
            }
            (SignalingState::HaveLocalOffer, SdpType::Answer) => {
                self.signaling = SignalingState::Stable;
                false
            }
            (state, _) => return Err(Error::InvalidSignalingState(state.name())),
        };
        self.apply_remote_description(&parsed, remote_is_offer)?;
        self.remote_description = Some((desc.sdp_type, parsed));
        for candidate in std::mem::take(&mut self.pending_remote_candidates) {
            let _ = self.add_ice_candidate(&candidate);
        }
        self.drive().await;
        Ok(())
    }

    fn add_ice_candidate(&mut self, candidate: &str) -> Result<()> {
        self.ensure_open()?;
        if candidate.trim().is_empty() {
            return Ok(());
        }
        if self.remote_description.is_none() {
            self.pending_remote_candidates.push(candidate.to_owned());
            return Ok(());
        }
        let desc = sdp::CandidateDescription::parse(candidate)?;
        self.agent.add_remote_candidate(&desc)?;
        self.agent.start_checks(Instant::now());
        Ok(())
    }

    fn start_gathering_if_needed(&mut self) {
        if self.gathering_started {
            return;
        }
        self.gathering_started = true;
        let mut base = self.socket.local_addr().unwrap_or_else(|_| {
            std::net::SocketAddr::from((std::net::Ipv4Addr::UNSPECIFIED, 0))
        });
        if base.ip().is_unspecified() {
            let advertised = self
                .setting_engine
                .advertised_ip
                .unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));
            base.set_ip(advertised);
        }
        self.agent.start_gathering(Instant::now(), base);
    }

    /// Builds either an offer (remote None) or an answer mirroring the
    /// remote offer's section order.
    fn build_description(
        &mut self,
        remote: Option<&SessionDescription>,
    ) -> Result<SessionDescription> {
        let creds = self.agent.local_credentials().clone();
        let fingerprint = format!("sha-256 {}", self.certificate.fingerprint());

        let mut sd = SessionDescription::new();
        match remote {
            None => {
                for i in 0..self.transceivers.len() {
                    let section =
                        self.build_media_section(i, &creds, &fingerprint, Setup::ActPass, None);
                    sd.media.push(section);
                }
                if self.want_data_section {
                    let mid = self
                        .data_mid
                        .get_or_insert_with(|| "data".to_owned())
                        .clone();
                    sd.media
                        .push(self.build_data_section(&mid, &creds, &fingerprint, Setup::ActPass));
                }
            }
            Some(remote) => {
                for remote_section in &remote.media {
                    let setup = match remote_section.setup.unwrap_or(Setup::ActPass) {
                        Setup::Active => Setup::Passive,
                        _ => Setup::Active,
                    };
                    match remote_section.kind {
                        MediaKind::Application => {
                            let mid = remote_section.mid.clone();
                            self.data_mid = Some(mid.clone());
                            sd.media.push(self.build_data_section(
                                &mid,
                                &creds,
                                &fingerprint,
                                setup,
                            ));
                        }
                        _ => {
                            let Some(i) = self
                                .transceivers
                                .iter()
                                .position(|t| t.mid == remote_section.mid)
                            else {
                                continue;
                            };
                            let section = self.build_media_section(
                                i,
                                &creds,
                                &fingerprint,
                                setup,
                                Some(remote_section),
                            );
                            sd.media.push(section);
                        }
                    }
                }
            }
        }
        sd.bundle_mids = sd.media.iter().map(|m| m.mid.clone()).collect();
        Ok(sd)
    }

    fn build_media_section(
        &mut self,
        index: usize,
        creds: &crate::ice::Credentials,
        fingerprint: &str,
        setup: Setup,
        remote: Option<&MediaSection>,
    ) -> MediaSection {
        let transceiver = &mut self.transceivers[index];
        let mut section = MediaSection::new(transceiver.kind, &transceiver.mid);
        section.ice_ufrag = creds.ufrag.clone();
        section.ice_pwd = creds.pwd.clone();
        section.fingerprint = Some(fingerprint.to_owned());
        section.setup = Some(setup);
        section.direction = transceiver.effective_direction();

        match remote {
            None => {
                section.formats = if transceiver.codecs.is_empty() {
                    self.media_engine.offered_formats(transceiver.kind)
                } else {
                    transceiver.codecs.clone()
                };
                section.extmaps = if transceiver.ext_ids.is_empty() {
                    self.media_engine
                        .header_extensions()
                        .iter()
                        .map(|(id, uri)| sdp::ExtMap {
                            id: *id,
                            uri: uri.clone(),
                        })
                        .collect()
                } else {
                    transceiver
                        .ext_ids
                        .iter()
                        .map(|(id, uri)| sdp::ExtMap {
                            id: *id,
                            uri: uri.clone(),
                        })
                        .collect()
                };
            }
            Some(_) => {
                section.formats = transceiver.codecs.clone();
                section.extmaps = transceiver
                    .ext_ids
                    .iter()
                    .map(|(id, uri)| sdp::ExtMap {
                        id: *id,
                        uri: uri.clone(),
                    })
                    .collect();
            }
        }

        if transceiver.sends() {
            let sender = &transceiver.sender;
            section.msid = Some(format!("- {}", transceiver.mid));
            section
                .ssrcs
                .push((sender.ssrc, transceiver.cname.clone()));
            let has_rtx = section
                .formats
                .iter()
                .any(|f| f.name.eq_ignore_ascii_case("rtx"));
            if has_rtx {
                section
                    .ssrcs
                    .push((sender.rtx_ssrc, transceiver.cname.clone()));
                section.ssrc_groups.push(SsrcGroup {
                    semantics: "FID".to_owned(),
                    ssrcs: vec![sender.ssrc, sender.rtx_ssrc],
                });
            }
        }
        section
    }

    fn build_data_section(
        &mut self,
        mid: &str,
        creds: &crate::ice::Credentials,
        fingerprint: &str,
        setup: Setup,
    ) -> MediaSection {
        let mut section = MediaSection::new(MediaKind::Application, mid);
        section.ice_ufrag = creds.ufrag.clone();
        section.ice_pwd = creds.pwd.clone();
        section.fingerprint = Some(fingerprint.to_owned());
        section.setup = Some(setup);
        section.sctp_port = Some(5000);
        section.max_message_size =
            Some(self.setting_engine.sctp_max_message_size as u32);
        self.want_data_section = true;
        section
    }

    fn apply_remote_description(
        &mut self,
        remote: &SessionDescription,
        remote_is_offer: bool,
    ) -> Result<()> {
        let first = remote
            .media
            .first()
            .ok_or_else(|| Error::Negotiation("no media sections".to_owned()))?;
        if first.ice_ufrag.is_empty() || first.ice_pwd.is_empty() {
            return Err(Error::Negotiation("missing ice credentials".to_owned()));
        }

        // A fresh remote ufrag after establishment is an ICE restart from
        // the peer.
        let restart = self
            .remote_description
            .as_ref()
            .map(|(_, prior)| {
                prior
                    .media
                    .first()
                    .map(|m| m.ice_ufrag != first.ice_ufrag)
                    .unwrap_or(false)
            })
            .unwrap_or(false);
        if restart && remote_is_offer {
            self.agent.restart();
            self.gathering_started = false;
            self.start_gathering_if_needed();
        }
        self.agent
            .set_remote_credentials(&first.ice_ufrag, &first.ice_pwd);
        self.agent.start_checks(Instant::now());

        if let Some(fp) = &first.fingerprint {
            // "sha-256 AA:BB:.." -> the hex part.
            let value = fp.split_whitespace().nth(1).unwrap_or(fp);
            self.remote_fingerprint = Some(value.to_owned());
        }

        // DTLS role from a=setup: the active side is the client.
        let remote_setup = first.setup.unwrap_or(Setup::ActPass);
        let role = if remote_is_offer {
            match remote_setup {
                // We answer `active` unless the offerer insisted on it.
                Setup::Active => DtlsRole::Server,
                _ => DtlsRole::Client,
            }
        } else {
            match remote_setup {
                Setup::Active => DtlsRole::Server,
                Setup::Passive => DtlsRole::Client,
                Setup::ActPass => {
                    return Err(Error::Negotiation(
                        "answer must resolve a=setup".to_owned(),
                    ))
                }
            }
        };
        self.setup_dtls(role);

        for remote_section in &remote.media {
            match remote_section.kind {
                MediaKind::Application => {
                    self.want_data_section = true;
                    self.data_mid = Some(remote_section.mid.clone());
                }
                kind => {
                    self.apply_remote_media(kind, remote_section, remote_is_offer)?;
                }
            }
            for candidate in &remote_section.candidates {
                let desc = sdp::CandidateDescription::parse(candidate)?;
                let _ = self.agent.add_remote_candidate(&desc);
            }
        }
        Ok(())
    }

    fn apply_remote_media(
        &mut self,
        kind: MediaKind,
        remote_section: &MediaSection,
        remote_is_offer: bool,
    ) -> Result<()> {
        if remote_section.mid.is_empty() {
            return Err(Error::Negotiation("media section without mid".to_owned()));
        }
        let index = match self
            .transceivers
            .iter()
            .position(|t| t.mid == remote_section.mid)
        {
            Some(i) => i,
            None if remote_is_offer => {
                let t = Transceiver::new(
                    remote_section.mid.clone(),
                    kind,
                    Direction::RecvOnly,
                );
                self.transceivers.push(t);
                self.transceivers.len() - 1
            }
            None => {
                return Err(Error::Negotiation(format!(
                    "answer references unknown mid {}",
                    remote_section.mid
                )))
            }
        };

        let negotiated = self.media_engine.negotiate(
            kind,
            &remote_section.formats,
            self.codec_preferences.as_deref(),
        );
        if negotiated.is_empty() {
            return Err(Error::Negotiation(format!(
                "no common codec for mid {}",
                remote_section.mid
            )));
        }

        // Header extensions: intersect by URI; the offerer's ids win.
        let ext_ids: Vec<(u8, String)> = remote_section
            .extmaps
            .iter()
            .filter(|e| self.media_engine.extension_id(&e.uri).is_some())
            .map(|e| {
                if remote_is_offer {
                    (e.id, e.uri.clone())
                } else {
                    // Remote echoed our offer; our ids were used.
                    (
                        self.media_engine.extension_id(&e.uri).unwrap_or(e.id),
                        e.uri.clone(),
                    )
                }
            })
            .collect();

        let transceiver = &mut self.transceivers[index];
        transceiver.codecs = negotiated;
        transceiver.ext_ids = ext_ids;
        transceiver.negotiated_direction =
            Some(transceiver.direction.intersect(remote_section.direction));

        // Sender payload types from the negotiated list.
        let primary = transceiver
            .codecs
            .iter()
            .find(|c| !c.name.eq_ignore_ascii_case("rtx"))
            .map(|c| c.payload_type);
        transceiver.sender.payload_type = primary;
        let rtx_pt = transceiver.codecs.iter().find_map(|c| {
            if c.name.eq_ignore_ascii_case("rtx") && c.apt() == primary {
                Some(c.payload_type)
            } else {
                None
            }
        });
        transceiver.sender.rtx_payload_type = rtx_pt;
        if let Some(rtx_pt) = rtx_pt {
            if transceiver.sender.rtx.is_none() {
                transceiver.sender.rtx =
                    Some(RtxSender::new(transceiver.sender.rtx_ssrc, rtx_pt));
            }
        }

        // Receiver demux hints.
        let mut rtx_ssrcs: Vec<u32> = vec![];
        for group in &remote_section.ssrc_groups {
            if group.semantics == "FID" && group.ssrcs.len() == 2 {
                transceiver
                    .receiver
                    .rtx_to_primary
                    .insert(group.ssrcs[1], group.ssrcs[0]);
                rtx_ssrcs.push(group.ssrcs[1]);
            }
        }
        transceiver.receiver.expected_ssrcs = remote_section
            .ssrcs
            .iter()
            .map(|(ssrc, _)| *ssrc)
            .filter(|ssrc| !rtx_ssrcs.contains(ssrc))
            .collect();
        Ok(())
    }

    fn setup_dtls(&mut self, role: DtlsRole) {
        if self.dtls.is_some() {
            // Renegotiation never tears DTLS down; keys survive an
            // ICE restart.
            return;
        }
        let mut config = DtlsConfig::new(self.certificate.clone());
        config.remote_fingerprint = self.remote_fingerprint.clone();
        config.handshake_timeout = self.setting_engine.dtls_handshake_timeout;
        self.dtls_role = Some(role);
        self.dtls = Some(DtlsConn::new(config, role));
        self.next_stream_id = match role {
            DtlsRole::Client => 0,
            DtlsRole::Server => 1,
        };
    }

    // ---- the drive loop ----

    async fn drive(&mut self) {
        for _ in 0..8 {
            let mut progressed = false;
            progressed |= self.drain_agent_events().await;
            progressed |= self.maybe_start_dtls();
            progressed |= self.drain_dtls_events().await;
            progressed |= self.drain_sctp_events().await;
            progressed |= self.flush_transports().await;
            if !progressed {
                break;
            }
        }
        self.update_channel_buffers().await;
        self.refresh_connection_state().await;
    }

    async fn drain_agent_events(&mut self) -> bool {
        let mut progressed = false;
        while let Some(event) = self.agent.poll_event() {
            progressed = true;
            match event {
                AgentEvent::CandidateGathered(desc) => {
                    self.fire_ice_candidate(Some(desc.to_string())).await;
                }
                AgentEvent::GatheringComplete => {
                    self.fire_ice_candidate(None).await;
                }
                AgentEvent::StateChange(state) => {
                    let _ = self.ice_state_tx.send(state);
                    self.fire_ice_state(state).await;
                }
                AgentEvent::SelectedPair {
                    local,
                    remote,
                    generation,
                } => {
                    log::debug!(
                        "selected pair {local} -> {remote} (generation {generation})"
                    );
                }
            }
        }
        progressed
    }

    fn maybe_start_dtls(&mut self) -> bool {
        if self.dtls_started || !self.agent.has_data_path() {
            return false;
        }
        let Some(dtls) = &mut self.dtls else {
            return false;
        };
        self.dtls_started = true;
        if dtls.role() == DtlsRole::Client {
            if let Err(e) = dtls.start_handshake(Instant::now()) {
                log::warn!("dtls start failed: {e}");
            }
        }
        true
    }

    async fn drain_dtls_events(&mut self) -> bool {
        let mut progressed = false;
        let mut app_data = vec![];
        let mut completed = false;
        if let Some(dtls) = &mut self.dtls {
            while let Some(event) = dtls.poll_event() {
                progressed = true;
                match event {
                    DtlsEvent::HandshakeComplete { .. } => completed = true,
                    DtlsEvent::ApplicationData(data) => app_data.push(data),
                    DtlsEvent::PeerCertificate(_) => {}
                }
            }
        }
        if completed {
            if let Err(e) = self.on_dtls_established() {
                self.fail(e).await;
            }
        }
        let now = Instant::now();
        for datagram in app_data {
            if let Some(sctp) = &mut self.sctp {
                match sctp.handle_receive(&datagram, now) {
                    Ok(()) => {}
                    Err(sctp::Error::AbortReceived) => {
                        self.fail(Error::Sctp(sctp::Error::AbortReceived)).await;
                        break;
                    }
                    Err(e) => log::debug!("sctp dropped inbound packet: {e}"),
                }
            }
        }
        progressed
    }

    fn on_dtls_established(&mut self) -> Result<()> {
        let dtls = self.dtls.as_ref().ok_or(Error::Closed)?;
        let material = dtls.export_srtp_keying_material()?;
        self.srtp_out = Some(srtp::Context::new(
            &material.local_master_key,
            &material.local_master_salt,
            material.profile,
            false,
        )?);
        self.srtp_in = Some(srtp::Context::new(
            &material.remote_master_key,
            &material.remote_master_salt,
            material.profile,
            true,
        )?);
        self.next_rtcp_at = Some(Instant::now() + RTCP_REPORT_INTERVAL);

        if self.want_data_section && self.sctp.is_none() {
            let mut config = sctp::Config::default();
            config.max_message_size = self.setting_engine.sctp_max_message_size;
            let mut association = Association::new(config);
            if self.dtls_role == Some(DtlsRole::Client) {
                association.connect(Instant::now());
            }
            self.sctp = Some(association);
        }
        Ok(())
    }

    async fn drain_sctp_events(&mut self) -> bool {
        let mut progressed = false;
        let mut events = vec![];
        if let Some(sctp) = &mut self.sctp {
            while let Some(event) = sctp.poll_event() {
                events.push(event);
            }
        }
        for event in events {
            progressed = true;
            match event {
                AssociationEvent::Connected => {
                    if !self.sctp_started {
                        self.sctp_started = true;
                        for slot in 0..self.channels.len() {
                            self.open_channel(slot).await;
                        }
                    }
                }
                AssociationEvent::Data {
                    stream_id,
                    ppid,
                    payload,
                    ..
                } => {
                    self.handle_sctp_data(stream_id, ppid, payload).await;
                }
                AssociationEvent::IncomingStreamsReset { stream_ids } => {
                    for stream_id in stream_ids {
                        self.handle_incoming_reset(stream_id).await;
                    }
                }
                AssociationEvent::OutgoingStreamsReset { stream_ids } => {
                    for stream_id in stream_ids {
                        if let Some(&slot) = self.stream_to_channel.get(&stream_id) {
                            let channel = &self.channels[slot].channel;
                            if channel.ready_state() != DataChannelState::Closed {
                                channel.set_state(DataChannelState::Closed);
                                Self::fire_dc_close(channel).await;
                            }
                        }
                    }
                    self.flush_reset_queue();
                }
                AssociationEvent::Closed => {
                    for slot in &self.channels {
                        if slot.channel.ready_state() != DataChannelState::Closed {
                            slot.channel.set_state(DataChannelState::Closed);
                            Self::fire_dc_close(&slot.channel).await;
                        }
                    }
                }
            }
        }
        progressed
    }

    /// Pushes queued bytes through the component stack and onto the wire.
    async fn flush_transports(&mut self) -> bool {
        let mut progressed = false;
        // SCTP packets ride inside DTLS application data.
        loop {
            let Some(packet) = self.sctp.as_mut().and_then(|s| s.poll_transmit()) else {
                break;
            };
            if let Some(dtls) = &mut self.dtls {
                if let Err(e) = dtls.write(&packet) {
                    log::debug!("dtls write failed: {e}");
                    break;
                }
                progressed = true;
            }
        }
        // DTLS records go out on the ICE-selected path.
        loop {
            let Some(record) = self.dtls.as_mut().and_then(|d| d.poll_transmit()) else {
                break;
            };
            if let Some(transmit) = self.agent.transmit_data(&record) {
                let _ = self
                    .socket
                    .send_to(&transmit.message, transmit.destination)
                    .await;
                progressed = true;
            }
        }
        // The agent's own STUN traffic.
        while let Some(transmit) = self.agent.poll_transmit() {
            let _ = self
                .socket
                .send_to(&transmit.message, transmit.destination)
                .await;
            progressed = true;
        }
        progressed
    }

    // ---- data channels ----

    fn channel_reliability(channel: &DataChannel) -> (bool, Reliability) {
        let unordered = !channel.ordered;
        let reliability = if let Some(n) = channel.max_retransmits {
            Reliability::MaxRetransmits(n)
        } else if let Some(ms) = channel.max_packet_lifetime_ms {
            Reliability::MaxLifetime(Duration::from_millis(ms as u64))
        } else {
            Reliability::Reliable
        };
        (unordered, reliability)
    }

    async fn open_channel(&mut self, slot: usize) {
        let channel = Arc::clone(&self.channels[slot].channel);
        if self.channels[slot].dcep_sent
            || channel.ready_state() != DataChannelState::Connecting
        {
            return;
        }
        let stream_id = match channel.id() {
            Some(id) if channel.negotiated => id,
            _ => {
                let id = self.next_stream_id;
                self.next_stream_id += 2;
                id
            }
        };
        channel.assign_id(stream_id);
        self.stream_to_channel.insert(stream_id, slot);
        self.channels[slot].dcep_sent = true;

        if channel.negotiated {
            channel.set_state(DataChannelState::Open);
            Self::fire_dc_open(&channel).await;
            return;
        }

        let channel_type = data::ChannelType::from_config(
            channel.ordered,
            channel.max_retransmits,
            channel.max_packet_lifetime_ms,
        );
        let open = data::Message::Open(data::DataChannelOpen {
            channel_type,
            priority: 256,
            reliability_parameter: channel
                .max_retransmits
                .or(channel.max_packet_lifetime_ms)
                .unwrap_or(0),
            label: channel.label.clone(),
            protocol: channel.protocol.clone(),
        });
        if let Ok(raw) = open.marshal() {
            if let Some(sctp) = &mut self.sctp {
                let _ = sctp.send(
                    stream_id,
                    data::PPID_DCEP,
                    false,
                    Reliability::Reliable,
                    &raw,
                    Instant::now(),
                );
            }
        }
    }

    async fn handle_sctp_data(&mut self, stream_id: u16, ppid: u32, payload: Bytes) {
        match ppid {
            data::PPID_DCEP => {
                let mut buf = &payload[..];
                match data::Message::unmarshal(&mut buf) {
                    Ok(data::Message::Open(open)) => {
                        self.handle_dcep_open(stream_id, open).await;
                    }
                    Ok(data::Message::Ack) => {
                        if let Some(&slot) = self.stream_to_channel.get(&stream_id) {
                            let channel = &self.channels[slot].channel;
                            if channel.ready_state() == DataChannelState::Connecting {
                                channel.set_state(DataChannelState::Open);
                                Self::fire_dc_open(channel).await;
                            }
                        }
                    }
                    Err(e) => log::debug!("undecodable DCEP message: {e}"),
                }
            }
            data::PPID_STRING | data::PPID_STRING_EMPTY => {
                self.deliver_channel_message(stream_id, true, payload).await;
            }
            data::PPID_BINARY | data::PPID_BINARY_EMPTY => {
                self.deliver_channel_message(stream_id, false, payload).await;
            }
            other => log::debug!("ignoring user message with ppid {other}"),
        }
    }

    async fn handle_dcep_open(&mut self, stream_id: u16, open: data::DataChannelOpen) {
        if self.stream_to_channel.contains_key(&stream_id) {
            return;
        }
        let init = DataChannelInit {
            ordered: Some(open.channel_type.ordered()),
            max_retransmits: match open.channel_type {
                data::ChannelType::PartialReliableRexmit
                | data::ChannelType::PartialReliableRexmitUnordered => {
                    Some(open.reliability_parameter)
                }
                _ => None,
            },
            max_packet_lifetime_ms: match open.channel_type {
                data::ChannelType::PartialReliableTimed
                | data::ChannelType::PartialReliableTimedUnordered => {
                    Some(open.reliability_parameter)
                }
                _ => None,
            },
            protocol: Some(open.protocol.clone()),
            negotiated: Some(false),
            id: Some(stream_id),
        };
        // Inbound channels feed the same command funnel the local ones
        // use.
        let channel = Arc::new(DataChannel::new(
            open.label.clone(),
            &init,
            self.dc_command_tx.clone(),
        ));
        channel.assign_id(stream_id);
        channel.set_state(DataChannelState::Open);

        self.channels.push(ChannelSlot {
            channel: Arc::clone(&channel),
            dcep_sent: true,
        });
        self.stream_to_channel
            .insert(stream_id, self.channels.len() - 1);

        if let Some(sctp) = &mut self.sctp {
            if let Ok(ack) = data::Message::Ack.marshal() {
                let _ = sctp.send(
                    stream_id,
                    data::PPID_DCEP,
                    false,
                    Reliability::Reliable,
                    &ack,
                    Instant::now(),
                );
            }
        }
        self.fire_data_channel(Arc::clone(&channel)).await;
        Self::fire_dc_open(&channel).await;
    }

    async fn deliver_channel_message(
        &mut self,
        stream_id: u16,
        is_string: bool,
        payload: Bytes,
    ) {
        let Some(&slot) = self.stream_to_channel.get(&stream_id) else {
            return;
        };
        let channel = Arc::clone(&self.channels[slot].channel);
        let message = DataChannelMessage {
            is_string,
            data: payload,
        };
        let mut handler = channel.on_message.lock().await;
        if let Some(f) = handler.as_mut() {
            f(message).await;
        }
    }

    async fn handle_incoming_reset(&mut self, stream_id: u16) {
        let Some(&slot) = self.stream_to_channel.get(&stream_id) else {
            return;
        };
        let channel = Arc::clone(&self.channels[slot].channel);
        if channel.ready_state() == DataChannelState::Open {
            // The peer reset its half; reciprocate, and `closed` fires
            // once our own reset is confirmed.
            channel.set_state(DataChannelState::Closing);
            self.queue_reset(stream_id);
        }
    }

    fn queue_reset(&mut self, stream_id: u16) {
        self.reset_queue.push(stream_id);
        self.flush_reset_queue();
    }

    fn flush_reset_queue(&mut self) {
        if self.reset_queue.is_empty() {
            return;
        }
        let Some(sctp) = &mut self.sctp else { return };
        let pending = std::mem::take(&mut self.reset_queue);
        for stream_id in pending {
            if sctp.reset_streams(&[stream_id], Instant::now()).is_err() {
                // A reset is already in flight; retry once it concludes.
                self.reset_queue.push(stream_id);
            }
        }
    }

    async fn handle_dc_command(&mut self, command: DataChannelCommand) {
        match command {
            DataChannelCommand::Send { channel, message } => {
                let Some(stream_id) = channel.id() else { return };
                let (unordered, reliability) = Self::channel_reliability(&channel);
                let ppid = match (message.is_string, message.data.is_empty()) {
                    (true, false) => data::PPID_STRING,
                    (true, true) => data::PPID_STRING_EMPTY,
                    (false, false) => data::PPID_BINARY,
                    (false, true) => data::PPID_BINARY_EMPTY,
                };
                if let Some(sctp) = &mut self.sctp {
                    if let Err(e) = sctp.send(
                        stream_id,
                        ppid,
                        unordered,
                        reliability,
                        &message.data,
                        Instant::now(),
                    ) {
                        log::debug!("data channel send failed: {e}");
                    }
                }
                self.drive().await;
            }
            DataChannelCommand::Close { channel } => {
                if let Some(stream_id) = channel.id() {
                    self.queue_reset(stream_id);
                }
                self.drive().await;
            }
        }
    }

    async fn update_channel_buffers(&mut self) {
        let Some(sctp) = &self.sctp else { return };
        for slot in &self.channels {
            let Some(stream_id) = slot.channel.id() else {
                continue;
            };
            let buffered = sctp.buffered_amount(stream_id);
            let previous = slot.channel.buffered.swap(buffered, Ordering::SeqCst);
            let threshold = slot.channel.buffered_amount_low_threshold();
            if previous > threshold && buffered <= threshold {
                let mut handler = slot.channel.on_buffered_amount_low.lock().await;
                if let Some(f) = handler.as_mut() {
                    f().await;
                }
            }
        }
    }

    // ---- media ----

    async fn write_rtp(
        &mut self,
        mid: &str,
        mut packet: rtp::packet::Packet,
        keyframe: bool,
    ) -> Result<()> {
        self.ensure_open()?;
        let Some(index) = self.transceivers.iter().position(|t| t.mid == mid) else {
            return Err(Error::Config(format!("no transceiver with mid {mid}")));
        };
        let twcc_seq = self.twcc_sender.next_sequence();
        let transceiver = &mut self.transceivers[index];
        if !transceiver.sends() {
            return Err(Error::Config(format!(
                "transceiver {mid} does not send (direction {:?})",
                transceiver.effective_direction()
            )));
        }
        packet.header.ssrc = transceiver.sender.ssrc;
        if let Some(pt) = transceiver.sender.payload_type {
            packet.header.payload_type = pt;
        }
        if let Some(id) = transceiver.ext_id(rtp::extension::SDES_MID_URI) {
            let _ = packet
                .header
                .set_extension(id, Bytes::from(transceiver.mid.clone().into_bytes()));
        }
        if let Some(id) = transceiver.ext_id(rtp::extension::TRANSPORT_CC_URI) {
            let ext = rtp::extension::TransportCcExtension {
                transport_sequence: twcc_seq,
            };
            if let Ok(raw) = ext.marshal() {
                let _ = packet.header.set_extension(id, raw);
            }
        }

        let now = Instant::now();
        transceiver
            .sender
            .stats
            .on_packet(packet.header.timestamp, packet.payload.len(), now);
        if let Some(rtx) = &mut transceiver.sender.rtx {
            rtx.record(&packet);
        }
        let _ = keyframe;

        let raw = packet.marshal().map_err(|e| Error::Config(e.to_string()))?;
        self.stats.rtp_packets_sent += 1;
        self.send_srtp(&raw).await;
        Ok(())
    }

    async fn send_srtp(&mut self, plain_rtp: &[u8]) {
        let Some(srtp_out) = &mut self.srtp_out else {
            return;
        };
        match srtp_out.encrypt_rtp(plain_rtp) {
            Ok(protected) => {
                if let Some(transmit) = self.agent.transmit_data(&protected) {
                    let _ = self
                        .socket
                        .send_to(&transmit.message, transmit.destination)
                        .await;
                }
            }
            Err(e) => log::debug!("srtp protect failed: {e}"),
        }
    }

    fn send_rtcp(&mut self, packets: Vec<Box<dyn rtcp::Packet + Send + Sync>>) {
        let Some(srtp_out) = &mut self.srtp_out else {
            return;
        };
        let Ok(compound) = rtcp::packet::marshal(&packets) else {
            return;
        };
        match srtp_out.encrypt_rtcp(&compound) {
            Ok(protected) => {
                if let Some(transmit) = self.agent.transmit_data(&protected) {
                    let socket = Arc::clone(&self.socket);
                    // Sends initiated from timer context piggyback on the
                    // runtime; ordering against media is not load-bearing.
                    tokio::spawn(async move {
                        let _ = socket.send_to(&transmit.message, transmit.destination).await;
                    });
                }
            }
            Err(e) => log::debug!("srtcp protect failed: {e}"),
        }
    }

    fn send_rtcp_feedback(
        &mut self,
        feedback: Vec<Box<dyn rtcp::Packet + Send + Sync>>,
        now: Instant,
    ) {
        // Feedback compounds still lead with a report + SDES (RFC 3550
        // compound rules).
        let mut packets: Vec<Box<dyn rtcp::Packet + Send + Sync>> = vec![];
        let (rr, sdes) = self.build_receiver_report(now);
        packets.push(Box::new(rr));
        packets.push(Box::new(sdes));
        packets.extend(feedback);
        self.send_rtcp(packets);
    }

    fn reporting_ssrc(&self) -> u32 {
        self.transceivers
            .first()
            .map(|t| t.sender.ssrc)
            .unwrap_or(1)
    }

    fn build_receiver_report(
        &mut self,
        now: Instant,
    ) -> (rtcp::receiver_report::ReceiverReport, rtcp::source_description::SourceDescription)
    {
        let ssrc = self.reporting_ssrc();
        let cname = self
            .transceivers
            .first()
            .map(|t| t.cname.clone())
            .unwrap_or_else(|| "peerlink".to_owned());
        let mut reports = vec![];
        for transceiver in &mut self.transceivers {
            for stream in transceiver.receiver.streams.values_mut() {
                reports.push(stream.stats.build_report(now));
            }
        }
        (
            rtcp::receiver_report::ReceiverReport { ssrc, reports },
            rtcp::source_description::SourceDescription::cname(ssrc, &cname),
        )
    }

    fn send_reports(&mut self, now: Instant) {
        let mut packets: Vec<Box<dyn rtcp::Packet + Send + Sync>> = vec![];
        let mut sent_sr = false;
        for transceiver in &self.transceivers {
            if transceiver.sends() && transceiver.sender.stats.has_sent() {
                let sr = transceiver
                    .sender
                    .stats
                    .build_report(now, SystemTime::now());
                packets.push(Box::new(sr));
                sent_sr = true;
            }
        }
        let (rr, sdes) = self.build_receiver_report(now);
        if !sent_sr || !rr.reports.is_empty() {
            packets.push(Box::new(rr));
        }
        packets.push(Box::new(sdes));
        self.send_rtcp(packets);
    }

    fn request_keyframe(&mut self, mid: &str) -> Result<()> {
        self.ensure_open()?;
        let Some(transceiver) = self.transceivers.iter().find(|t| t.mid == mid) else {
            return Err(Error::Config(format!("no transceiver with mid {mid}")));
        };
        let media_ssrc = transceiver
            .receiver
            .streams
            .keys()
            .next()
            .copied()
            .or_else(|| transceiver.receiver.expected_ssrcs.first().copied())
            .ok_or_else(|| Error::Config("no inbound stream to request from".to_owned()))?;
        let pli = rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication {
            sender_ssrc: self.reporting_ssrc(),
            media_ssrc,
        };
        self.stats.keyframe_requests_sent += 1;
        self.send_rtcp_feedback(vec![Box::new(pli)], Instant::now());
        Ok(())
    }

    // ---- inbound datagrams ----

    async fn handle_datagram(&mut self, datagram: &[u8], from: std::net::SocketAddr) {
        let mut current: Vec<u8> = datagram.to_vec();
        let mut source = from;
        // A TURN Data indication unwraps to an inner datagram that goes
        // through classification again.
        for _ in 0..2 {
            let kind = classify(&current);
            self.stats.demux.record(kind);
            match kind {
                PacketKind::Stun => {
                    let now = Instant::now();
                    match self.agent.handle_receive(now, source, &current) {
                        Some((peer, inner)) => {
                            source = peer;
                            current = inner;
                            continue;
                        }
                        None => break,
                    }
                }
                PacketKind::Dtls => {
                    if let Some(dtls) = &mut self.dtls {
                        if let Err(e) = dtls.handle_receive(&current, Instant::now()) {
                            self.fail(Error::Dtls(e)).await;
                        }
                    }
                    break;
                }
                PacketKind::Rtp => {
                    self.handle_srtp(&current).await;
                    break;
                }
                PacketKind::Rtcp => {
                    self.handle_srtcp(&current).await;
                    break;
                }
                PacketKind::Unknown => break,
            }
        }
        self.drive().await;
    }

    async fn handle_srtp(&mut self, protected: &[u8]) {
        let Some(srtp_in) = &mut self.srtp_in else {
            return;
        };
        let plain = match srtp_in.decrypt_rtp(protected) {
            Ok(plain) => plain,
            Err(srtp::Error::Replayed { .. }) => {
                self.stats.srtp_replays += 1;
                return;
            }
            Err(_) => {
                self.stats.srtp_auth_failures += 1;
                return;
            }
        };
        let mut buf = &plain[..];
        let Ok(packet) = rtp::packet::Packet::unmarshal(&mut buf) else {
            self.stats.demux.dropped += 1;
            return;
        };
        self.stats.rtp_packets_received += 1;
        self.route_rtp(packet, Instant::now()).await;
    }

    /// Routes a plaintext inbound RTP packet to its transceiver: MID
    /// header extension first, then SSRC knowledge, then payload type.
    async fn route_rtp(&mut self, packet: rtp::packet::Packet, now: Instant) {
        let ssrc = packet.header.ssrc;
        let pt = packet.header.payload_type;

        let index = self.transceivers.iter().position(|t| {
            t.ext_id(rtp::extension::SDES_MID_URI)
                .and_then(|id| packet.header.get_extension(id))
                .map(|mid| mid.as_ref() == t.mid.as_bytes())
                .unwrap_or(false)
        });
        let index = index.or_else(|| {
            self.transceivers.iter().position(|t| {
                t.receiver.streams.contains_key(&ssrc)
                    || t.receiver.expected_ssrcs.contains(&ssrc)
                    || t.receiver.rtx_to_primary.contains_key(&ssrc)
            })
        });
        let index = index.or_else(|| {
            self.transceivers.iter().position(|t| {
                t.receives()
                    && (t.codecs.iter().any(|c| c.payload_type == pt))
            })
        });
        let Some(index) = index else {
            self.stats.demux.dropped += 1;
            return;
        };

        // Transport-wide sequence recording happens for every packet on
        // the transport, RTX included.
        if let Some(id) =
            self.transceivers[index].ext_id(rtp::extension::TRANSPORT_CC_URI)
        {
            if let Some(raw) = packet.header.get_extension(id) {
                let mut b = &raw[..];
                if let Ok(ext) = rtp::extension::TransportCcExtension::unmarshal(&mut b) {
                    self.twcc_recorder
                        .get_or_insert_with(|| {
                            TwccRecorder::new(self.transceivers[index].sender.ssrc, ssrc)
                        })
                        .record(ext.transport_sequence, now);
                }
            }
        }
        let rid = self.transceivers[index]
            .ext_id(rtp::extension::SDES_RTP_STREAM_ID_URI)
            .and_then(|id| packet.header.get_extension(id))
            .map(|raw| String::from_utf8_lossy(&raw).into_owned());

        // RTX unwrap (RFC 4588): restore the primary stream identity.
        let transceiver = &mut self.transceivers[index];
        let rtx_map = transceiver.rtx_payload_map();
        let (packet, target_ssrc, was_rtx) = if let Some(&primary_pt) = rtx_map.get(&pt) {
            let primary_ssrc = transceiver
                .receiver
                .rtx_to_primary
                .get(&ssrc)
                .copied()
                .or_else(|| transceiver.receiver.expected_ssrcs.first().copied())
                .or_else(|| transceiver.receiver.streams.keys().next().copied());
            let Some(primary_ssrc) = primary_ssrc else {
                return;
            };
            match unwrap_rtx(&packet, primary_ssrc, primary_pt) {
                Some(restored) => (restored, primary_ssrc, true),
                None => return,
            }
        } else {
            (packet, ssrc, false)
        };
        if was_rtx {
            self.stats.rtx_packets_recovered += 1;
        }

        // Stream state, created on first sight (fires on_track).
        let created = !transceiver.receiver.streams.contains_key(&target_ssrc);
        if created {
            let clock_rate = transceiver
                .codecs
                .iter()
                .find(|c| c.payload_type == packet.header.payload_type)
                .map(|c| c.clock_rate)
                .unwrap_or(90000);
            let hold = transceiver.jitter_hold();
            let sender_ssrc = transceiver.sender.ssrc;
            let (track, track_tx) = TrackRemote::new(
                transceiver.mid.clone(),
                transceiver.kind,
                target_ssrc,
                rid.clone(),
            );
            transceiver.receiver.streams.insert(
                target_ssrc,
                ReceiveStream {
                    jitter: JitterBuffer::new(hold),
                    nack: NackGenerator::new(sender_ssrc, target_ssrc),
                    stats: ReceiverStats::new(target_ssrc, clock_rate),
                    track_tx,
                    rid: rid.clone(),
                    epoch: now,
                },
            );
            let info = TransceiverInfo {
                mid: transceiver.mid.clone(),
                kind: transceiver.kind,
                direction: transceiver.effective_direction(),
            };
            self.fire_track(Arc::new(track), info).await;
        }

        let transceiver = &mut self.transceivers[index];
        let Some(stream) = transceiver.receiver.streams.get_mut(&target_ssrc) else {
            return;
        };
        let (released, missing) = stream.jitter.push(packet, false, false, now);
        stream.nack.on_missing(&missing);
        self.deliver_released(index, target_ssrc, released, now);
    }

    fn deliver_released(
        &mut self,
        index: usize,
        ssrc: u32,
        released: Vec<crate::rtp_engine::MediaPacket>,
        _now: Instant,
    ) {
        let transceiver = &mut self.transceivers[index];
        let Some(stream) = transceiver.receiver.streams.get_mut(&ssrc) else {
            return;
        };
        let epoch = stream.epoch;
        for media in released {
            stream.nack.on_recovered(media.extended_sequence);
            stream.stats.on_packet(
                media.packet.header.sequence_number,
                media.packet.header.timestamp,
                media.received_at,
                epoch,
            );
            let _ = stream.track_tx.send(TrackPacket {
                packet: media.packet,
                keyframe: media.keyframe,
                rid: stream.rid.clone(),
            });
        }
    }

    async fn handle_srtcp(&mut self, protected: &[u8]) {
        let Some(srtp_in) = &mut self.srtp_in else {
            return;
        };
        let plain = match srtp_in.decrypt_rtcp(protected) {
            Ok(plain) => plain,
            Err(srtp::Error::Replayed { .. }) => {
                self.stats.srtp_replays += 1;
                return;
            }
            Err(_) => {
                self.stats.srtp_auth_failures += 1;
                return;
            }
        };
        let mut buf = &plain[..];
        let Ok(packets) = rtcp::packet::unmarshal(&mut buf) else {
            self.stats.demux.dropped += 1;
            return;
        };
        let now = Instant::now();
        for packet in packets {
            self.handle_rtcp_packet(packet.as_ref(), now).await;
        }
    }

    async fn handle_rtcp_packet(&mut self, packet: &(dyn rtcp::Packet), now: Instant) {
        let any = packet.as_any();
        if let Some(sr) = any.downcast_ref::<rtcp::sender_report::SenderReport>() {
            for transceiver in &mut self.transceivers {
                if let Some(stream) = transceiver.receiver.streams.get_mut(&sr.ssrc) {
                    stream.stats.on_sender_report(sr.ntp_time, now);
                }
            }
        } else if let Some(nack) =
            any.downcast_ref::<rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack>()
        {
            self.stats.nacks_received += 1;
            self.handle_inbound_nack(nack.clone()).await;
        } else if any
            .downcast_ref::<rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication>()
            .is_some()
        {
            self.stats.keyframe_requests_received += 1;
        } else if any
            .downcast_ref::<rtcp::payload_feedbacks::full_intra_request::FullIntraRequest>()
            .is_some()
        {
            self.stats.keyframe_requests_received += 1;
        } else if let Some(cc) =
            any.downcast_ref::<rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc>()
        {
            self.twcc_sender.handle_feedback(cc);
        } else if let Some(remb) = any
            .downcast_ref::<rtcp::payload_feedbacks::receiver_estimated_maximum_bitrate::ReceiverEstimatedMaximumBitrate>()
        {
            self.stats.remb_bps = remb.bitrate;
        }
    }

    async fn handle_inbound_nack(
        &mut self,
        nack: rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack,
    ) {
        let Some(index) = self
            .transceivers
            .iter()
            .position(|t| t.sender.ssrc == nack.media_ssrc)
        else {
            return;
        };
        let seqs: Vec<u16> = nack.nacks.iter().flat_map(|p| p.packet_list()).collect();
        let rtx_packets = {
            let transceiver = &mut self.transceivers[index];
            match &mut transceiver.sender.rtx {
                Some(rtx) => rtx.resend(&seqs),
                None => vec![],
            }
        };
        for packet in rtx_packets {
            if let Ok(raw) = packet.marshal() {
                self.stats.rtx_packets_sent += 1;
                self.send_srtp(&raw).await;
            }
        }
    }

    // ---- state plumbing ----

    async fn fail(&mut self, error: Error) {
        if self.failed || self.closed {
            return;
        }
        log::warn!("peer connection failed: {error}");
        self.failed = true;
        self.stats.last_error = Some(error.to_string());
        self.refresh_connection_state().await;
    }

    fn compute_connection_state(&self) -> PeerConnectionState {
        if self.closed {
            return PeerConnectionState::Closed;
        }
        if self.failed {
            return PeerConnectionState::Failed;
        }
        match self.agent.state() {
            IceConnectionState::Failed => return PeerConnectionState::Failed,
            IceConnectionState::Disconnected => return PeerConnectionState::Disconnected,
            _ => {}
        }
        let dtls_complete = self
            .dtls
            .as_ref()
            .map(|d| d.is_handshake_complete())
            .unwrap_or(false);
        let ice_connected = matches!(
            self.agent.state(),
            IceConnectionState::Connected | IceConnectionState::Completed
        );
        if dtls_complete && ice_connected {
            PeerConnectionState::Connected
        } else if self.local_description.is_some() && self.remote_description.is_some() {
            PeerConnectionState::Connecting
        } else {
            PeerConnectionState::New
        }
    }

    async fn refresh_connection_state(&mut self) {
        let state = self.compute_connection_state();
        self.set_connection_state(state).await;
    }

    async fn set_connection_state(&mut self, state: PeerConnectionState) {
        if self.connection_state == state {
            return;
        }
        log::debug!(
            "connection state {:?} -> {:?}",
            self.connection_state,
            state
        );
        self.connection_state = state;
        let _ = self.state_tx.send(state);
        let mut handler = self.handlers.on_connection_state_change.lock().await;
        if let Some(f) = handler.as_mut() {
            f(state).await;
        }
    }

    // ---- handler plumbing ----

    async fn fire_ice_candidate(&self, candidate: Option<String>) {
        let mut handler = self.handlers.on_ice_candidate.lock().await;
        if let Some(f) = handler.as_mut() {
            f(candidate).await;
        }
    }

    async fn fire_ice_state(&self, state: IceConnectionState) {
        let mut handler = self.handlers.on_ice_connection_state_change.lock().await;
        if let Some(f) = handler.as_mut() {
            f(state).await;
        }
    }

    async fn fire_track(&self, track: Arc<TrackRemote>, info: TransceiverInfo) {
        let mut handler = self.handlers.on_track.lock().await;
        if let Some(f) = handler.as_mut() {
            f(track, info).await;
        }
    }

    async fn fire_data_channel(&self, channel: Arc<DataChannel>) {
        let mut handler = self.handlers.on_data_channel.lock().await;
        if let Some(f) = handler.as_mut() {
            f(channel).await;
        }
    }

    async fn fire_negotiation_needed(&self) {
        if self.signaling != SignalingState::Stable || self.local_description.is_some() {
            return;
        }
        let mut handler = self.handlers.on_negotiation_needed.lock().await;
        if let Some(f) = handler.as_mut() {
            f().await;
        }
    }

    async fn fire_dc_open(channel: &Arc<DataChannel>) {
        let mut handler = channel.on_open.lock().await;
        if let Some(f) = handler.as_mut() {
            f().await;
        }
    }

    async fn fire_dc_close(channel: &Arc<DataChannel>) {
        let mut handler = channel.on_close.lock().await;
        if let Some(f) = handler.as_mut() {
            f().await;
        }
    }
}
