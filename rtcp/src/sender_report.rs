#[cfg(test)]
mod sender_report_test;

use std::any::Any;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::Packet;
use crate::reception_report::*;

const SR_SSRC_OFFSET: usize = HEADER_LENGTH;
const SR_SENDER_INFO_LENGTH: usize = 20;

/// SenderReport (RFC 3550 §6.4.1): NTP/RTP timestamp mapping plus counters
/// for one sending SSRC, with optional reception report blocks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    pub ntp_time: u64,
    pub rtp_time: u32,
    pub packet_count: u32,
    pub octet_count: u32,
    pub reports: Vec<ReceptionReport>,
}

impl SenderReport {
    fn body_size(&self) -> usize {
        SSRC_LENGTH + SR_SENDER_INFO_LENGTH + self.reports.len() * RECEPTION_REPORT_LENGTH
    }
}

impl Packet for SenderReport {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: self.reports.len() as u8,
            packet_type: PacketType::SenderReport,
            length: (self.body_size() / 4) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        let mut out: Vec<u32> = self.reports.iter().map(|r| r.ssrc).collect();
        out.push(self.ssrc);
        out
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

impl MarshalSize for SenderReport {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH + self.body_size()
    }
}

impl Marshal for SenderReport {
    fn marshal_to(&self, mut buf: &mut [u8]) -> util::Result<usize> {
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(Error::PacketTooShort.into());
        }
        let n = self.header().marshal_to(buf)?;
        buf = &mut buf[n..];
        buf.put_u32(self.ssrc);
        buf.put_u64(self.ntp_time);
        buf.put_u32(self.rtp_time);
        buf.put_u32(self.packet_count);
        buf.put_u32(self.octet_count);
        for report in &self.reports {
            let n = report.marshal_to(buf)?;
            buf = &mut buf[n..];
        }
        Ok(size)
    }
}

impl Unmarshal for SenderReport {
    fn unmarshal<B>(raw: &mut B) -> util::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let header = Header::unmarshal(raw)?;
        if header.packet_type != PacketType::SenderReport {
            return Err(Error::WrongType.into());
        }
        if raw.remaining() < SSRC_LENGTH + SR_SENDER_INFO_LENGTH {
            return Err(Error::PacketTooShort.into());
        }
        let ssrc = raw.get_u32();
        let ntp_time = raw.get_u64();
        let rtp_time = raw.get_u32();
        let packet_count = raw.get_u32();
        let octet_count = raw.get_u32();
        let mut reports = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            reports.push(ReceptionReport::unmarshal(raw)?);
        }
        Ok(SenderReport {
            ssrc,
            ntp_time,
            rtp_time,
            packet_count,
            octet_count,
            reports,
        })
    }
}
