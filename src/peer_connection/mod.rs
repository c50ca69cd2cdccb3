pub mod driver;
pub mod state;

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::pin::Pin;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch, Mutex};

use sdp::{Direction, MediaKind};

use crate::api::{MediaEngine, SettingEngine};
use crate::data_channel::{DataChannel, DataChannelInit};
use crate::error::Error;
use crate::ice::turn::TurnServer;
use crate::ice::IceConnectionState;
use crate::rtp_transceiver::{TrackRemote, TransceiverInfo};
use crate::Result;

use driver::{Command, Driver, StatsReport};
pub use state::{PeerConnectionState, SdpType, SessionDescriptionInit, SignalingState};

/// A STUN or TURN server entry, `urls` in the standard
/// `stun:host:port` / `turn:host:port` form.
#[derive(Debug, Clone, Default)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

#[derive(Default)]
pub struct RtcConfiguration {
    pub ice_servers: Vec<IceServer>,
    /// Codec names in preference order; outranks the remote ordering.
    pub codec_preferences: Option<Vec<String>>,
    pub media_engine: Option<MediaEngine>,
    pub setting_engine: Option<SettingEngine>,
}

pub type OnIceCandidateHdlrFn = Box<
    dyn (FnMut(Option<String>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;
pub type OnConnectionStateHdlrFn = Box<
    dyn (FnMut(PeerConnectionState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;
pub type OnIceConnectionStateHdlrFn = Box<
    dyn (FnMut(IceConnectionState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;
pub type OnTrackHdlrFn = Box<
    dyn (FnMut(
            Arc<TrackRemote>,
            TransceiverInfo,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;
pub type OnDataChannelHdlrFn = Box<
    dyn (FnMut(Arc<DataChannel>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;
pub type OnNegotiationNeededHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

/// Event callbacks, invoked on the connection's own loop in the order
/// the underlying transitions happened.
#[derive(Default)]
pub(crate) struct Handlers {
    pub on_ice_candidate: Mutex<Option<OnIceCandidateHdlrFn>>,
    pub on_connection_state_change: Mutex<Option<OnConnectionStateHdlrFn>>,
    pub on_ice_connection_state_change: Mutex<Option<OnIceConnectionStateHdlrFn>>,
    pub on_track: Mutex<Option<OnTrackHdlrFn>>,
    pub on_data_channel: Mutex<Option<OnDataChannelHdlrFn>>,
    pub on_negotiation_needed: Mutex<Option<OnNegotiationNeededHdlrFn>>,
}

/// The WebRTC endpoint. All protocol state lives on one driver task;
/// this handle marshals API calls onto it and receives events back.
pub struct PeerConnection {
    command_tx: mpsc::UnboundedSender<Command>,
    dc_command_tx: mpsc::UnboundedSender<crate::data_channel::DataChannelCommand>,
    handlers: Arc<Handlers>,
    state_rx: watch::Receiver<PeerConnectionState>,
    ice_state_rx: watch::Receiver<IceConnectionState>,
    local_addr: SocketAddr,
}

fn parse_ice_servers(
    servers: &[IceServer],
) -> Result<(Vec<SocketAddr>, Option<TurnServer>)> {
    let mut stun = vec![];
    let mut turn = None;
    for server in servers {
        for url in &server.urls {
            let (scheme, rest) = url
                .split_once(':')
                .ok_or_else(|| Error::Config(format!("bad ICE server url {url}")))?;
            let hostport = rest.split('?').next().unwrap_or(rest);
            let hostport = if hostport.contains(':') {
                hostport.to_owned()
            } else {
                format!("{hostport}:3478")
            };
            let addr = hostport
                .to_socket_addrs()
                .map_err(|e| Error::Config(format!("cannot resolve {url}: {e}")))?
                .next()
                .ok_or_else(|| Error::Config(format!("cannot resolve {url}")))?;
            match scheme {
                "stun" => stun.push(addr),
                "turn" => {
                    turn = Some(TurnServer {
                        address: addr,
                        username: server.username.clone().unwrap_or_default(),
                        credential: server.credential.clone().unwrap_or_default(),
                    });
                }
                other => {
                    return Err(Error::Config(format!("unsupported scheme {other}")))
                }
            }
        }
    }
    Ok((stun, turn))
}

impl PeerConnection {
    pub async fn new(config: RtcConfiguration) -> Result<Arc<Self>> {
        let setting_engine = config.setting_engine.unwrap_or_default();
        let bind_ip = setting_engine
            .bind_ip
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let socket = UdpSocket::bind((bind_ip, 0)).await?;
        let local_addr = socket.local_addr()?;

        let (stun_servers, turn_server) = parse_ice_servers(&config.ice_servers)?;
        let certificate = dtls::Certificate::generate_self_signed()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (dc_command_tx, dc_command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(PeerConnectionState::New);
        let (ice_state_tx, ice_state_rx) = watch::channel(IceConnectionState::New);
        let handlers = Arc::new(Handlers::default());

        let driver = Driver::new(
            socket,
            command_rx,
            dc_command_rx,
            dc_command_tx.clone(),
            Arc::clone(&handlers),
            config.media_engine.unwrap_or_default(),
            setting_engine,
            config.codec_preferences.clone(),
            certificate,
            stun_servers,
            turn_server,
            state_tx,
            ice_state_tx,
        );
        tokio::spawn(driver.run());

        Ok(Arc::new(PeerConnection {
            command_tx,
            dc_command_tx,
            handlers,
            state_rx,
            ice_state_rx,
            local_addr,
        }))
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(make(tx))
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)?
    }

    pub async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescriptionInit> {
        self.call(|reply| Command::CreateOffer { ice_restart, reply }).await
    }

    pub async fn create_answer(&self) -> Result<SessionDescriptionInit> {
        self.call(|reply| Command::CreateAnswer { reply }).await
    }

    pub async fn set_local_description(&self, desc: SessionDescriptionInit) -> Result<()> {
        self.call(|reply| Command::SetLocalDescription { desc, reply }).await
    }

    pub async fn set_remote_description(&self, desc: SessionDescriptionInit) -> Result<()> {
        self.call(|reply| Command::SetRemoteDescription { desc, reply }).await
    }

    /// Adds a trickled remote candidate (the bare `candidate:` string).
    pub async fn add_ice_candidate(&self, candidate: String) -> Result<()> {
        self.call(|reply| Command::AddIceCandidate { candidate, reply }).await
    }

    pub async fn add_transceiver(
        &self,
        kind: MediaKind,
        direction: Direction,
    ) -> Result<TransceiverInfo> {
        self.call(|reply| Command::AddTransceiver {
            kind,
            direction,
            reply,
        })
        .await
    }

    pub async fn create_data_channel(
        &self,
        label: &str,
        init: DataChannelInit,
    ) -> Result<Arc<DataChannel>> {
        let channel = Arc::new(DataChannel::new(
            label.to_owned(),
            &init,
            self.dc_command_tx.clone(),
        ));
        self.call(|reply| Command::RegisterDataChannel {
            channel: Arc::clone(&channel),
            reply,
        })
        .await?;
        Ok(channel)
    }

    /// Sends one RTP packet on the transceiver owning `mid`. The keyframe
    /// flag is the payloader's signal, carried alongside the packet.
    pub async fn write_rtp(
        &self,
        mid: &str,
        packet: rtp::packet::Packet,
        keyframe: bool,
    ) -> Result<()> {
        self.call(|reply| Command::WriteRtp {
            mid: mid.to_owned(),
            packet,
            keyframe,
            reply,
        })
        .await
    }

    /// Asks the remote sender for a keyframe (PLI).
    pub async fn request_keyframe(&self, mid: &str) -> Result<()> {
        self.call(|reply| Command::RequestKeyframe {
            mid: mid.to_owned(),
            reply,
        })
        .await
    }

    pub async fn restart_ice(&self) -> Result<()> {
        self.call(|reply| Command::RestartIce { reply }).await
    }

    pub async fn get_stats(&self) -> Result<StatsReport> {
        self.call(|reply| Command::GetStats { reply }).await
    }

    pub async fn close(&self) {
        let _ = self.call(|reply| Command::Close { reply }).await;
    }

    pub fn connection_state(&self) -> PeerConnectionState {
        *self.state_rx.borrow()
    }

    pub fn ice_connection_state(&self) -> IceConnectionState {
        *self.ice_state_rx.borrow()
    }

    /// The bound UDP address (one socket per connection under BUNDLE).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn on_ice_candidate(&self, f: OnIceCandidateHdlrFn) {
        *self.handlers.on_ice_candidate.lock().await = Some(f);
    }

    pub async fn on_connection_state_change(&self, f: OnConnectionStateHdlrFn) {
        *self.handlers.on_connection_state_change.lock().await = Some(f);
    }

    pub async fn on_ice_connection_state_change(&self, f: OnIceConnectionStateHdlrFn) {
        *self.handlers.on_ice_connection_state_change.lock().await = Some(f);
    }

    pub async fn on_track(&self, f: OnTrackHdlrFn) {
        *self.handlers.on_track.lock().await = Some(f);
    }

    pub async fn on_data_channel(&self, f: OnDataChannelHdlrFn) {
        *self.handlers.on_data_channel.lock().await = Some(f);
    }

    pub async fn on_negotiation_needed(&self, f: OnNegotiationNeededHdlrFn) {
        *self.handlers.on_negotiation_needed.lock().await = Some(f);
    }
}
