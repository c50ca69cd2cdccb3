#[cfg(test)]
mod message_test;

use std::fmt;

use rand::Rng;

use crate::attributes::*;
use crate::error::Error;
use crate::Result;

/// Fixed value distinguishing STUN from other protocols multiplexed on the
/// same port (RFC 5389 §6).
pub const MAGIC_COOKIE: u32 = 0x2112_a442;
pub const MESSAGE_HEADER_SIZE: usize = 20;
pub const ATTRIBUTE_HEADER_SIZE: usize = 4;
pub const TRANSACTION_ID_SIZE: usize = 12;

/// Returns true if `b` plausibly holds a STUN message. Cheap enough for the
/// per-datagram demux path; does not guarantee that decoding succeeds.
pub fn is_message(b: &[u8]) -> bool {
    b.len() >= MESSAGE_HEADER_SIZE
        && b[0] & 0xc0 == 0
        && u32::from_be_bytes([b[4], b[5], b[6], b[7]]) == MAGIC_COOKIE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Method(pub u16);

pub const METHOD_BINDING: Method = Method(0x001);
pub const METHOD_ALLOCATE: Method = Method(0x003);
pub const METHOD_REFRESH: Method = Method(0x004);
pub const METHOD_SEND: Method = Method(0x006);
pub const METHOD_DATA: Method = Method(0x007);
pub const METHOD_CREATE_PERMISSION: Method = Method(0x008);

/// Message type: a class and a method interleaved into 14 bits
/// (RFC 5389 §6, figure 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageType {
    pub method: Method,
    pub class: MessageClass,
}

pub const BINDING_REQUEST: MessageType = MessageType {
    method: METHOD_BINDING,
    class: MessageClass::Request,
};
pub const BINDING_SUCCESS: MessageType = MessageType {
    method: METHOD_BINDING,
    class: MessageClass::SuccessResponse,
};
pub const BINDING_ERROR: MessageType = MessageType {
    method: METHOD_BINDING,
    class: MessageClass::ErrorResponse,
};

impl MessageType {
    pub const fn new(method: Method, class: MessageClass) -> Self {
        MessageType { method, class }
    }

    pub fn encode(&self) -> u16 {
        let m = self.method.0;
        // M0..M3 stay in place, M4..M6 shift over C0, M7..M11 over C1.
        let method_bits = (m & 0x000f) | ((m & 0x0070) << 1) | ((m & 0x0f80) << 2);
        let class_bits = match self.class {
            MessageClass::Request => 0x0000,
            MessageClass::Indication => 0x0010,
            MessageClass::SuccessResponse => 0x0100,
            MessageClass::ErrorResponse => 0x0110,
        };
        method_bits | class_bits
    }

    pub fn decode(value: u16) -> Result<Self> {
        if value & 0xc000 != 0 {
            return Err(Error::NotStunMessage);
        }
        let class = match value & 0x0110 {
            0x0000 => MessageClass::Request,
            0x0010 => MessageClass::Indication,
            0x0100 => MessageClass::SuccessResponse,
            _ => MessageClass::ErrorResponse,
        };
        let method = (value & 0x000f) | ((value >> 1) & 0x0070) | ((value >> 2) & 0x0f80);
        Ok(MessageType {
            method: Method(method),
            class,
        })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match self.method {
            METHOD_BINDING => "binding",
            METHOD_ALLOCATE => "allocate",
            METHOD_REFRESH => "refresh",
            METHOD_SEND => "send",
            METHOD_DATA => "data",
            METHOD_CREATE_PERMISSION => "create-permission",
            Method(m) => return write!(f, "{:#05x} {:?}", m, self.class),
        };
        write!(f, "{} {:?}", method, self.class)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub [u8; TRANSACTION_ID_SIZE]);

impl TransactionId {
    pub fn new() -> Self {
        let mut id = [0u8; TRANSACTION_ID_SIZE];
        rand::thread_rng().fill(&mut id);
        TransactionId(id)
    }
}

/// A single STUN message.
///
/// `raw` always mirrors the encoded form: attribute appends write through to
/// it, so MESSAGE-INTEGRITY and FINGERPRINT can run their keyed hash over
/// the exact wire prefix.
#[derive(Debug, Clone)]
pub struct Message {
    pub typ: MessageType,
    pub transaction_id: TransactionId,
    pub attributes: Attributes,
    pub raw: Vec<u8>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} l={} attrs={}",
            self.typ,
            self.attr_length(),
            self.attributes.0.len()
        )
    }
}

impl Message {
    pub fn new(typ: MessageType) -> Self {
        Self::with_transaction_id(typ, TransactionId::new())
    }

    pub fn with_transaction_id(typ: MessageType, transaction_id: TransactionId) -> Self {
        let mut raw = vec![0u8; MESSAGE_HEADER_SIZE];
        raw[0..2].copy_from_slice(&typ.encode().to_be_bytes());
        raw[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        raw[8..20].copy_from_slice(&transaction_id.0);
        Message {
            typ,
            transaction_id,
            attributes: Attributes::default(),
            raw,
        }
    }

    /// Length of the attribute section, as carried in the header.
    pub fn attr_length(&self) -> u16 {
        (self.raw.len() - MESSAGE_HEADER_SIZE) as u16
    }

    fn write_attr_length(&mut self, length: u16) {
        self.raw[2..4].copy_from_slice(&length.to_be_bytes());
    }

    /// Appends a type-length-value attribute, zero-padding the value to a
    /// 4-byte boundary.
    pub fn append(&mut self, typ: AttrType, value: &[u8]) -> Result<()> {
        if self.attributes.contains(ATTR_FINGERPRINT) {
            return Err(Error::FingerprintBeforeIntegrity);
        }
        if value.len() > u16::MAX as usize {
            return Err(Error::AttributeTooLong {
                max: u16::MAX as usize,
            });
        }
        let offset = self.raw.len();
        self.raw.extend_from_slice(&typ.value().to_be_bytes());
        self.raw
            .extend_from_slice(&(value.len() as u16).to_be_bytes());
        self.raw.extend_from_slice(value);
        self.raw
            .resize(offset + ATTRIBUTE_HEADER_SIZE + nearest_padded_length(value.len()), 0);
        let length = self.attr_length();
        self.write_attr_length(length);
        self.attributes.0.push(RawAttribute {
            typ,
            value: value.to_vec(),
            offset,
        });
        Ok(())
    }

    pub fn get(&self, typ: AttrType) -> Result<&[u8]> {
        self.attributes
            .get(typ)
            .map(|a| a.value.as_slice())
            .ok_or(Error::AttributeNotFound)
    }

    pub fn contains(&self, typ: AttrType) -> bool {
        self.attributes.contains(typ)
    }

    /// The encoded message.
    pub fn encode(&self) -> &[u8] {
        &self.raw
    }

    /// Parses `data` into a message, rejecting malformed headers, truncated
    /// attributes and unknown comprehension-required attribute types.
    pub fn decode(data: &[u8]) -> Result<Message> {
        if !is_message(data) {
            return Err(Error::NotStunMessage);
        }
        let typ = MessageType::decode(u16::from_be_bytes([data[0], data[1]]))?;
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        if length % PADDING != 0 || data.len() != MESSAGE_HEADER_SIZE + length {
            return Err(Error::BadFormat);
        }
        let mut transaction_id = TransactionId::default();
        transaction_id.0.copy_from_slice(&data[8..20]);

        let mut attributes = Attributes::default();
        let mut offset = MESSAGE_HEADER_SIZE;
        while offset < data.len() {
            if data.len() - offset < ATTRIBUTE_HEADER_SIZE {
                return Err(Error::BadFormat);
            }
            let typ_raw = u16::from_be_bytes([data[offset], data[offset + 1]]);
            let attr_typ = AttrType(typ_raw);
            let attr_len =
                u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            let value_start = offset + ATTRIBUTE_HEADER_SIZE;
            let padded = nearest_padded_length(attr_len);
            if data.len() - value_start < padded {
                return Err(Error::BadAttributeFormat(typ_raw));
            }
            if attr_typ.comprehension_required() && !KNOWN_REQUIRED.contains(&attr_typ) {
                return Err(Error::UnknownRequiredAttr(typ_raw));
            }
            attributes.0.push(RawAttribute {
                typ: attr_typ,
                value: data[value_start..value_start + attr_len].to_vec(),
                offset,
            });
            offset = value_start + padded;
        }

        Ok(Message {
            typ,
            transaction_id,
            attributes,
            raw: data.to_vec(),
        })
    }

    /// Builds a response message carrying this request's transaction id.
    pub fn response(&self, class: MessageClass) -> Message {
        Message::with_transaction_id(
            MessageType::new(self.typ.method, class),
            self.transaction_id,
        )
    }
}
