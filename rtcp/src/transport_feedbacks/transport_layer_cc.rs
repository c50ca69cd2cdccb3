#[cfg(test)]
mod transport_layer_cc_test;

use std::any::Any;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::Packet;

/// Per-packet arrival status symbol
/// (draft-holmer-rmcat-transport-wide-cc-extensions-01 §3.1.4).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    #[default]
    NotReceived,
    ReceivedSmallDelta,
    ReceivedLargeDelta,
    Reserved,
}

impl SymbolType {
    fn value(&self) -> u16 {
        match self {
            SymbolType::NotReceived => 0,
            SymbolType::ReceivedSmallDelta => 1,
            SymbolType::ReceivedLargeDelta => 2,
            SymbolType::Reserved => 3,
        }
    }

    fn from_value(v: u16) -> Self {
        match v & 0x03 {
            0 => SymbolType::NotReceived,
            1 => SymbolType::ReceivedSmallDelta,
            2 => SymbolType::ReceivedLargeDelta,
            _ => SymbolType::Reserved,
        }
    }

    pub fn has_delta(&self) -> bool {
        matches!(
            self,
            SymbolType::ReceivedSmallDelta | SymbolType::ReceivedLargeDelta
        )
    }
}

/// A 16-bit packet status chunk: either a run of one symbol or an explicit
/// vector of 14 one-bit / 7 two-bit symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketStatusChunk {
    RunLength {
        symbol: SymbolType,
        run_length: u16,
    },
    /// 14 symbols when every symbol is one-bit representable, otherwise 7.
    StatusVector {
        symbols: Vec<SymbolType>,
    },
}

impl PacketStatusChunk {
    pub fn status_count(&self) -> u16 {
        match self {
            PacketStatusChunk::RunLength { run_length, .. } => *run_length,
            PacketStatusChunk::StatusVector { symbols } => symbols.len() as u16,
        }
    }

    fn symbols(&self) -> Vec<SymbolType> {
        match self {
            PacketStatusChunk::RunLength { symbol, run_length } => {
                vec![*symbol; *run_length as usize]
            }
            PacketStatusChunk::StatusVector { symbols } => symbols.clone(),
        }
    }

    fn encode(&self) -> Result<u16, Error> {
        match self {
            PacketStatusChunk::RunLength { symbol, run_length } => {
                if *run_length > 0x1fff {
                    return Err(Error::BadStatusChunk);
                }
                Ok((symbol.value() << 13) | run_length)
            }
            PacketStatusChunk::StatusVector { symbols } => match symbols.len() {
                14 => {
                    let mut bits = 1u16 << 15;
                    for (i, s) in symbols.iter().enumerate() {
                        match s {
                            SymbolType::NotReceived => {}
                            SymbolType::ReceivedSmallDelta => bits |= 1 << (13 - i),
                            _ => return Err(Error::BadStatusChunk),
                        }
                    }
                    Ok(bits)
                }
                7 => {
                    let mut bits = (1u16 << 15) | (1 << 14);
                    for (i, s) in symbols.iter().enumerate() {
                        bits |= s.value() << (12 - 2 * i);
                    }
                    Ok(bits)
                }
                _ => Err(Error::BadStatusChunk),
            },
        }
    }

    fn decode(raw: u16) -> Self {
        if raw & (1 << 15) == 0 {
            PacketStatusChunk::RunLength {
                symbol: SymbolType::from_value((raw >> 13) & 0x03),
                run_length: raw & 0x1fff,
            }
        } else if raw & (1 << 14) == 0 {
            let symbols = (0..14)
                .map(|i| {
                    if raw & (1 << (13 - i)) != 0 {
                        SymbolType::ReceivedSmallDelta
                    } else {
                        SymbolType::NotReceived
                    }
                })
                .collect();
            PacketStatusChunk::StatusVector { symbols }
        } else {
            let symbols = (0..7)
                .map(|i| SymbolType::from_value((raw >> (12 - 2 * i)) & 0x03))
                .collect();
            PacketStatusChunk::StatusVector { symbols }
        }
    }
}

/// Arrival-time delta for one received packet, in microseconds. The wire
/// carries it in 250 µs ticks: one unsigned byte for small deltas, a
/// signed 16-bit value for large or negative ones.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecvDelta {
    pub type_tcc: SymbolType,
    pub delta_us: i64,
}

impl RecvDelta {
    fn wire_size(&self) -> usize {
        match self.type_tcc {
            SymbolType::ReceivedSmallDelta => 1,
            SymbolType::ReceivedLargeDelta => 2,
            _ => 0,
        }
    }
}

pub const TYPE_TCC_DELTA_SCALE_FACTOR: i64 = 250;
/// Reference time is in multiples of 64 ms.
pub const REFERENCE_TIME_UNIT_MS: i64 = 64;

/// TransportLayerCc: transport-wide congestion control feedback.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportLayerCc {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub base_sequence_number: u16,
    pub packet_status_count: u16,
    /// 24-bit reference time in 64 ms units.
    pub reference_time: u32,
    pub fb_pkt_count: u8,
    pub packet_chunks: Vec<PacketStatusChunk>,
    pub recv_deltas: Vec<RecvDelta>,
}

impl TransportLayerCc {
    fn unpadded_body_size(&self) -> usize {
        8 + 8
            + self.packet_chunks.len() * 2
            + self.recv_deltas.iter().map(|d| d.wire_size()).sum::<usize>()
    }

    fn body_size(&self) -> usize {
        (self.unpadded_body_size() + 3) / 4 * 4
    }
}

impl Packet for TransportLayerCc {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_TWCC,
            packet_type: PacketType::TransportSpecificFeedback,
            length: (self.body_size() / 4) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        vec![self.media_ssrc]
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

impl MarshalSize for TransportLayerCc {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH + self.body_size()
    }
}

impl Marshal for TransportLayerCc {
    fn marshal_to(&self, mut buf: &mut [u8]) -> util::Result<usize> {
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(Error::PacketTooShort.into());
        }
        let n = self.header().marshal_to(buf)?;
        buf = &mut buf[n..];
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        buf.put_u16(self.base_sequence_number);
        buf.put_u16(self.packet_status_count);
        buf.put_u8((self.reference_time >> 16) as u8);
        buf.put_u8((self.reference_time >> 8) as u8);
        buf.put_u8(self.reference_time as u8);
        buf.put_u8(self.fb_pkt_count);
        for chunk in &self.packet_chunks {
            buf.put_u16(chunk.encode().map_err(util::Error::from_std)?);
        }
        for delta in &self.recv_deltas {
            let ticks = delta.delta_us / TYPE_TCC_DELTA_SCALE_FACTOR;
            match delta.type_tcc {
                SymbolType::ReceivedSmallDelta => {
                    if !(0..=255).contains(&ticks) {
                        return Err(Error::DeltaOutOfRange.into());
                    }
                    buf.put_u8(ticks as u8);
                }
                SymbolType::ReceivedLargeDelta => {
                    if !(i16::MIN as i64..=i16::MAX as i64).contains(&ticks) {
                        return Err(Error::DeltaOutOfRange.into());
                    }
                    buf.put_i16(ticks as i16);
                }
                _ => return Err(Error::BadStatusChunk.into()),
            }
        }
        let padding = self.body_size() - self.unpadded_body_size();
        for _ in 0..padding {
            buf.put_u8(0);
        }
        Ok(size)
    }
}

impl Unmarshal for TransportLayerCc {
    fn unmarshal<B>(raw: &mut B) -> util::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let header = Header::unmarshal(raw)?;
        if header.packet_type != PacketType::TransportSpecificFeedback
            || header.count != FORMAT_TWCC
        {
            return Err(Error::WrongType.into());
        }
        if raw.remaining() < 16 {
            return Err(Error::PacketTooShort.into());
        }
        let sender_ssrc = raw.get_u32();
        let media_ssrc = raw.get_u32();
        let base_sequence_number = raw.get_u16();
        let packet_status_count = raw.get_u16();
        let reference_time = ((raw.get_u8() as u32) << 16)
            | ((raw.get_u8() as u32) << 8)
            | raw.get_u8() as u32;
        let fb_pkt_count = raw.get_u8();

        let mut packet_chunks = vec![];
        let mut statuses = 0u16;
        while statuses < packet_status_count {
            if raw.remaining() < 2 {
                return Err(Error::BadStatusChunk.into());
            }
            let chunk = PacketStatusChunk::decode(raw.get_u16());
            statuses = statuses.saturating_add(chunk.status_count());
            packet_chunks.push(chunk);
        }

        let mut recv_deltas = vec![];
        let symbols: Vec<SymbolType> = packet_chunks
            .iter()
            .flat_map(|c| c.symbols())
            .take(packet_status_count as usize)
            .collect();
        for symbol in symbols {
            if !symbol.has_delta() {
                continue;
            }
            match symbol {
                SymbolType::ReceivedSmallDelta => {
                    if raw.remaining() < 1 {
                        return Err(Error::PacketTooShort.into());
                    }
                    recv_deltas.push(RecvDelta {
                        type_tcc: symbol,
                        delta_us: raw.get_u8() as i64 * TYPE_TCC_DELTA_SCALE_FACTOR,
                    });
                }
                SymbolType::ReceivedLargeDelta => {
                    if raw.remaining() < 2 {
                        return Err(Error::PacketTooShort.into());
                    }
                    recv_deltas.push(RecvDelta {
                        type_tcc: symbol,
                        delta_us: raw.get_i16() as i64 * TYPE_TCC_DELTA_SCALE_FACTOR,
                    });
                }
                _ => unreachable!(),
            }
        }
        // Trailing bytes are alignment padding.
        raw.advance(raw.remaining());

        Ok(TransportLayerCc {
            sender_ssrc,
            media_ssrc,
            base_sequence_number,
            packet_status_count,
            reference_time,
            fb_pkt_count,
            packet_chunks,
            recv_deltas,
        })
    }
}
