
use std::any::Any;
use std::fmt;

use bytes::{Buf, Bytes};
use util::marshal::{Marshal, Unmarshal};

use crate::error::Error;
use crate::goodbye::Goodbye;
use crate::header::*;
use crate::payload_feedbacks::full_intra_request::FullIntraRequest;
use crate::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use crate::payload_feedbacks::receiver_estimated_maximum_bitrate::ReceiverEstimatedMaximumBitrate;
use crate::raw_packet::RawPacket;
use crate::receiver_report::ReceiverReport;
use crate::sender_report::SenderReport;
use crate::source_description::SourceDescription;
use crate::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use crate::transport_feedbacks::transport_layer_nack::TransportLayerNack;

/// One RTCP packet of any type.
pub trait Packet: Marshal + fmt::Debug + Send + Sync {
    fn header(&self) -> Header;
    /// SSRCs this packet refers to, used for routing feedback to streams.
    fn destination_ssrc(&self) -> Vec<u32>;
    fn as_any(&self) -> &(dyn Any + Send + Sync);
}

/// Parses a buffer holding one or more concatenated RTCP packets, as they
/// arrive in a compound datagram.
pub fn unmarshal<B>(buf: &mut B) -> util::Result<Vec<Box<dyn Packet + Send + Sync>>>
where
    B: Buf,
{
    let mut packets = vec![];
    while buf.remaining() >= HEADER_LENGTH {
        let mut peek = buf.chunk();
        // The chunk may be smaller than remaining for segmented buffers;
        // RTCP datagrams are contiguous in practice.
        let header = Header::unmarshal(&mut peek)?;
        let total = HEADER_LENGTH + header.length as usize * 4;
        if buf.remaining() < total {
            return Err(Error::BadLength.into());
        }
        let mut body = buf.copy_to_bytes(total);
        packets.push(unmarshal_single(header, &mut body)?);
    }
    if buf.has_remaining() {
        return Err(Error::PacketTooShort.into());
    }
    Ok(packets)
}

fn unmarshal_single(
    header: Header,
    body: &mut Bytes,
) -> util::Result<Box<dyn Packet + Send + Sync>> {
    let packet: Box<dyn Packet + Send + Sync> = match (header.packet_type, header.count) {
        (PacketType::SenderReport, _) => Box::new(SenderReport::unmarshal(body)?),
        (PacketType::ReceiverReport, _) => Box::new(ReceiverReport::unmarshal(body)?),
        (PacketType::SourceDescription, _) => Box::new(SourceDescription::unmarshal(body)?),
        (PacketType::Goodbye, _) => Box::new(Goodbye::unmarshal(body)?),
        (PacketType::TransportSpecificFeedback, FORMAT_GENERIC_NACK) => {
            Box::new(TransportLayerNack::unmarshal(body)?)
        }
        (PacketType::TransportSpecificFeedback, FORMAT_TWCC) => {
            Box::new(TransportLayerCc::unmarshal(body)?)
        }
        (PacketType::PayloadSpecificFeedback, FORMAT_PLI) => {
            Box::new(PictureLossIndication::unmarshal(body)?)
        }
        (PacketType::PayloadSpecificFeedback, FORMAT_FIR) => {
            Box::new(FullIntraRequest::unmarshal(body)?)
        }
        (PacketType::PayloadSpecificFeedback, FORMAT_REMB) => {
            Box::new(ReceiverEstimatedMaximumBitrate::unmarshal(body)?)
        }
        _ => Box::new(RawPacket::unmarshal(body)?),
    };
    Ok(packet)
}

/// Serializes a batch of packets into one compound buffer.
pub fn marshal(packets: &[Box<dyn Packet + Send + Sync>]) -> util::Result<Bytes> {
    let mut out = Vec::new();
    for p in packets {
        out.extend_from_slice(&p.marshal()?);
    }
    Ok(Bytes::from(out))
}
