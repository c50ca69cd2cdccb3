#[cfg(test)]
mod compound_packet_test;

use crate::error::Error;
use crate::header::PacketType;
use crate::packet::Packet;
use crate::source_description::{SourceDescription, SDES_TYPE_CNAME};
use crate::Result;

/// Validates the compound rules of RFC 3550 §6.1 for a batch of packets we
/// are about to emit: the first packet must be an SR or RR, and a CNAME
/// source description must appear before anything that is not a report.
pub fn validate(packets: &[Box<dyn Packet + Send + Sync>]) -> Result<()> {
    let first = packets.first().ok_or(Error::BadFirstPacket)?;
    match first.header().packet_type {
        PacketType::SenderReport | PacketType::ReceiverReport => {}
        _ => return Err(Error::BadFirstPacket),
    }

    for p in &packets[1..] {
        match p.header().packet_type {
            PacketType::ReceiverReport => continue,
            PacketType::SourceDescription => {
                let sdes = p
                    .as_any()
                    .downcast_ref::<SourceDescription>()
                    .ok_or(Error::MissingCname)?;
                let has_cname = sdes
                    .chunks
                    .iter()
                    .flat_map(|c| &c.items)
                    .any(|i| i.sdes_type == SDES_TYPE_CNAME);
                if !has_cname {
                    return Err(Error::MissingCname);
                }
                return Ok(());
            }
            _ => return Err(Error::PacketBeforeCname),
        }
    }
    Err(Error::MissingCname)
}
