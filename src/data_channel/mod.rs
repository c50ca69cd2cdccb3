use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

use crate::error::Error;
use crate::Result;

pub type OnMessageHdlrFn = Box<
    dyn (FnMut(DataChannelMessage) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;
pub type OnStateHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct DataChannelMessage {
    pub is_string: bool,
    pub data: Bytes,
}

/// Matches the RFC 8831 channel states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl DataChannelState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => DataChannelState::Connecting,
            1 => DataChannelState::Open,
            2 => DataChannelState::Closing,
            _ => DataChannelState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            DataChannelState::Connecting => 0,
            DataChannelState::Open => 1,
            DataChannelState::Closing => 2,
            DataChannelState::Closed => 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataChannelInit {
    pub ordered: Option<bool>,
    pub max_retransmits: Option<u32>,
    pub max_packet_lifetime_ms: Option<u32>,
    pub protocol: Option<String>,
    /// Out-of-band negotiated channel: no DCEP, id fixed by the caller.
    pub negotiated: Option<bool>,
    pub id: Option<u16>,
}

pub(crate) enum DataChannelCommand {
    Send {
        channel: Arc<DataChannel>,
        message: DataChannelMessage,
    },
    Close {
        channel: Arc<DataChannel>,
    },
}

/// A WebRTC data channel. Send paths forward onto the owning
/// PeerConnection's loop; state and buffered-amount counters are shared
/// atomics updated by that loop.
pub struct DataChannel {
    pub(crate) label: String,
    pub(crate) protocol: String,
    pub(crate) ordered: bool,
    pub(crate) max_retransmits: Option<u32>,
    pub(crate) max_packet_lifetime_ms: Option<u32>,
    pub(crate) negotiated: bool,

    pub(crate) stream_id: AtomicU16,
    pub(crate) stream_id_set: AtomicU8,
    state: AtomicU8,
    pub(crate) buffered: AtomicUsize,
    pub(crate) buffered_low_threshold: AtomicUsize,

    pub(crate) command_tx: mpsc::UnboundedSender<DataChannelCommand>,

    pub(crate) on_message: Mutex<Option<OnMessageHdlrFn>>,
    pub(crate) on_open: Mutex<Option<OnStateHdlrFn>>,
    pub(crate) on_close: Mutex<Option<OnStateHdlrFn>>,
    pub(crate) on_buffered_amount_low: Mutex<Option<OnStateHdlrFn>>,
}

impl DataChannel {
    pub(crate) fn new(
        label: String,
        init: &DataChannelInit,
        command_tx: mpsc::UnboundedSender<DataChannelCommand>,
    ) -> Self {
        DataChannel {
            label,
            protocol: init.protocol.clone().unwrap_or_default(),
            ordered: init.ordered.unwrap_or(true),
            max_retransmits: init.max_retransmits,
            max_packet_lifetime_ms: init.max_packet_lifetime_ms,
            negotiated: init.negotiated.unwrap_or(false),
            stream_id: AtomicU16::new(init.id.unwrap_or(0)),
            stream_id_set: AtomicU8::new(u8::from(init.id.is_some())),
            state: AtomicU8::new(DataChannelState::Connecting.as_u8()),
            buffered: AtomicUsize::new(0),
            buffered_low_threshold: AtomicUsize::new(0),
            command_tx,
            on_message: Mutex::new(None),
            on_open: Mutex::new(None),
            on_close: Mutex::new(None),
            on_buffered_amount_low: Mutex::new(None),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn ordered(&self) -> bool {
        self.ordered
    }

    /// The SCTP stream id; `None` until negotiation assigns one.
    pub fn id(&self) -> Option<u16> {
        if self.stream_id_set.load(Ordering::SeqCst) != 0 {
            Some(self.stream_id.load(Ordering::SeqCst))
        } else {
            None
        }
    }

    pub(crate) fn assign_id(&self, id: u16) {
        self.stream_id.store(id, Ordering::SeqCst);
        self.stream_id_set.store(1, Ordering::SeqCst);
    }

    pub fn ready_state(&self) -> DataChannelState {
        DataChannelState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: DataChannelState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }

    pub fn buffered_amount_low_threshold(&self) -> usize {
        self.buffered_low_threshold.load(Ordering::SeqCst)
    }

    pub fn set_buffered_amount_low_threshold(&self, threshold: usize) {
        self.buffered_low_threshold.store(threshold, Ordering::SeqCst);
    }

    fn send_message(self: &Arc<Self>, message: DataChannelMessage) -> Result<usize> {
        match self.ready_state() {
            DataChannelState::Open => {}
            DataChannelState::Connecting => {
                return Err(Error::DataChannel("channel not open yet".to_owned()))
            }
            _ => return Err(Error::Closed),
        }
        let len = message.data.len();
        self.buffered.fetch_add(len, Ordering::SeqCst);
        self.command_tx
            .send(DataChannelCommand::Send {
                channel: Arc::clone(self),
                message,
            })
            .map_err(|_| Error::Closed)?;
        Ok(len)
    }

    /// Queues binary data.
    pub fn send(self: &Arc<Self>, data: &Bytes) -> Result<usize> {
        self.send_message(DataChannelMessage {
            is_string: false,
            data: data.clone(),
        })
    }

    /// Queues a UTF-8 text message.
    pub fn send_text(self: &Arc<Self>, text: impl Into<String>) -> Result<usize> {
        self.send_message(DataChannelMessage {
            is_string: true,
            data: Bytes::from(text.into()),
        })
    }

    /// Begins the closing handshake (SCTP stream reset).
    pub fn close(self: &Arc<Self>) {
        if matches!(
            self.ready_state(),
            DataChannelState::Closing | DataChannelState::Closed
        ) {
            return;
        }
        self.set_state(DataChannelState::Closing);
        let _ = self.command_tx.send(DataChannelCommand::Close {
            channel: Arc::clone(self),
        });
    }

    pub async fn on_message(&self, f: OnMessageHdlrFn) {
        *self.on_message.lock().await = Some(f);
    }

    pub async fn on_open(&self, f: OnStateHdlrFn) {
        *self.on_open.lock().await = Some(f);
    }

    pub async fn on_close(&self, f: OnStateHdlrFn) {
        *self.on_close.lock().await = Some(f);
    }

    pub async fn on_buffered_amount_low(&self, f: OnStateHdlrFn) {
        *self.on_buffered_amount_low.lock().await = Some(f);
    }
}
