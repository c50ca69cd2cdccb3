#[cfg(test)]
mod message_test;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;

/// SCTP payload protocol identifiers used by WebRTC data channels
/// (RFC 8831 §8).
pub const PPID_DCEP: u32 = 50;
pub const PPID_STRING: u32 = 51;
pub const PPID_BINARY: u32 = 53;
pub const PPID_STRING_EMPTY: u32 = 56;
pub const PPID_BINARY_EMPTY: u32 = 57;

const MESSAGE_TYPE_ACK: u8 = 0x02;
const MESSAGE_TYPE_OPEN: u8 = 0x03;

const CHANNEL_TYPE_RELIABLE: u8 = 0x00;
const CHANNEL_TYPE_RELIABLE_UNORDERED: u8 = 0x80;
const CHANNEL_TYPE_PARTIAL_RELIABLE_REXMIT: u8 = 0x01;
const CHANNEL_TYPE_PARTIAL_RELIABLE_REXMIT_UNORDERED: u8 = 0x81;
const CHANNEL_TYPE_PARTIAL_RELIABLE_TIMED: u8 = 0x02;
const CHANNEL_TYPE_PARTIAL_RELIABLE_TIMED_UNORDERED: u8 = 0x82;

const OPEN_HEADER_LEN: usize = 12;

/// Channel type byte: ordering in the high bit, reliability mode in the
/// low bits (RFC 8832 §5.1).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    #[default]
    Reliable,
    ReliableUnordered,
    PartialReliableRexmit,
    PartialReliableRexmitUnordered,
    PartialReliableTimed,
    PartialReliableTimedUnordered,
}

impl ChannelType {
    pub fn from_config(
        ordered: bool,
        max_retransmits: Option<u32>,
        max_packet_lifetime: Option<u32>,
    ) -> Self {
        match (ordered, max_retransmits, max_packet_lifetime) {
            (true, None, None) => ChannelType::Reliable,
            (false, None, None) => ChannelType::ReliableUnordered,
            (true, Some(_), _) => ChannelType::PartialReliableRexmit,
            (false, Some(_), _) => ChannelType::PartialReliableRexmitUnordered,
            (true, None, Some(_)) => ChannelType::PartialReliableTimed,
            (false, None, Some(_)) => ChannelType::PartialReliableTimedUnordered,
        }
    }

    pub fn ordered(&self) -> bool {
        matches!(
            self,
            ChannelType::Reliable
                | ChannelType::PartialReliableRexmit
                | ChannelType::PartialReliableTimed
        )
    }

    fn value(&self) -> u8 {
        match self {
            ChannelType::Reliable => CHANNEL_TYPE_RELIABLE,
            ChannelType::ReliableUnordered => CHANNEL_TYPE_RELIABLE_UNORDERED,
            ChannelType::PartialReliableRexmit => CHANNEL_TYPE_PARTIAL_RELIABLE_REXMIT,
            ChannelType::PartialReliableRexmitUnordered => {
                CHANNEL_TYPE_PARTIAL_RELIABLE_REXMIT_UNORDERED
            }
            ChannelType::PartialReliableTimed => CHANNEL_TYPE_PARTIAL_RELIABLE_TIMED,
            ChannelType::PartialReliableTimedUnordered => {
                CHANNEL_TYPE_PARTIAL_RELIABLE_TIMED_UNORDERED
            }
        }
    }

    fn from_value(v: u8) -> Result<Self, Error> {
        match v {
            CHANNEL_TYPE_RELIABLE => Ok(ChannelType::Reliable),
            CHANNEL_TYPE_RELIABLE_UNORDERED => Ok(ChannelType::ReliableUnordered),
            CHANNEL_TYPE_PARTIAL_RELIABLE_REXMIT => Ok(ChannelType::PartialReliableRexmit),
            CHANNEL_TYPE_PARTIAL_RELIABLE_REXMIT_UNORDERED => {
                Ok(ChannelType::PartialReliableRexmitUnordered)
            }
            CHANNEL_TYPE_PARTIAL_RELIABLE_TIMED => Ok(ChannelType::PartialReliableTimed),
            CHANNEL_TYPE_PARTIAL_RELIABLE_TIMED_UNORDERED => {
                Ok(ChannelType::PartialReliableTimedUnordered)
            }
            v => Err(Error::InvalidChannelType(v)),
        }
    }
}

/// DCEP messages exchanged on PPID 50 (RFC 8832 §5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Open(DataChannelOpen),
    Ack,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DataChannelOpen {
    pub channel_type: ChannelType,
    pub priority: u16,
    /// Retransmit count or lifetime in milliseconds, depending on the
    /// channel type; zero for reliable channels.
    pub reliability_parameter: u32,
    pub label: String,
    pub protocol: String,
}

impl MarshalSize for Message {
    fn marshal_size(&self) -> usize {
        match self {
            Message::Ack => 1,
            Message::Open(open) => OPEN_HEADER_LEN + open.label.len() + open.protocol.len(),
        }
    }
}

impl Marshal for Message {
    fn marshal_to(&self, mut buf: &mut [u8]) -> util::Result<usize> {
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(util::Error::UnexpectedEndOfBuffer {
                expected: size,
                actual: buf.len(),
            });
        }
        match self {
            Message::Ack => buf.put_u8(MESSAGE_TYPE_ACK),
            Message::Open(open) => {
                buf.put_u8(MESSAGE_TYPE_OPEN);
                buf.put_u8(open.channel_type.value());
                buf.put_u16(open.priority);
                buf.put_u32(open.reliability_parameter);
                buf.put_u16(open.label.len() as u16);
                buf.put_u16(open.protocol.len() as u16);
                buf.put_slice(open.label.as_bytes());
                buf.put_slice(open.protocol.as_bytes());
            }
        }
        Ok(size)
    }
}

impl Unmarshal for Message {
    fn unmarshal<B>(buf: &mut B) -> util::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if buf.remaining() < 1 {
            return Err(util::Error::from_std(Error::ShortMessage));
        }
        match buf.get_u8() {
            MESSAGE_TYPE_ACK => Ok(Message::Ack),
            MESSAGE_TYPE_OPEN => {
                if buf.remaining() < OPEN_HEADER_LEN - 1 {
                    return Err(util::Error::from_std(Error::ShortMessage));
                }
                let channel_type =
                    ChannelType::from_value(buf.get_u8()).map_err(util::Error::from_std)?;
                let priority = buf.get_u16();
                let reliability_parameter = buf.get_u32();
                let label_len = buf.get_u16() as usize;
                let protocol_len = buf.get_u16() as usize;
                if buf.remaining() < label_len + protocol_len {
                    return Err(util::Error::from_std(Error::ShortMessage));
                }
                let label = String::from_utf8(buf.copy_to_bytes(label_len).to_vec())
                    .map_err(|_| util::Error::from_std(Error::BadText))?;
                let protocol = String::from_utf8(buf.copy_to_bytes(protocol_len).to_vec())
                    .map_err(|_| util::Error::from_std(Error::BadText))?;
                Ok(Message::Open(DataChannelOpen {
                    channel_type,
                    priority,
                    reliability_parameter,
                    label,
                    protocol,
                }))
            }
            t => Err(util::Error::from_std(Error::InvalidMessageType(t))),
        }
    }
}
