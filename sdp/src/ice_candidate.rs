
use std::fmt;
use std::net::IpAddr;

use crate::error::Error;
use crate::Result;

/// The `candidate:` attribute value
/// (`foundation component transport priority address port typ type ...`),
/// the wire form candidates travel in over signaling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDescription {
    pub foundation: String,
    pub component: u16,
    pub transport: String,
    pub priority: u32,
    pub address: IpAddr,
    pub port: u16,
    pub typ: String,
    pub related_address: Option<IpAddr>,
    pub related_port: Option<u16>,
}

impl fmt::Display for CandidateDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "candidate:{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.transport,
            self.priority,
            self.address,
            self.port,
            self.typ,
        )?;
        if let (Some(raddr), Some(rport)) = (self.related_address, self.related_port) {
            write!(f, " raddr {raddr} rport {rport}")?;
        }
        Ok(())
    }
}

impl CandidateDescription {
    /// Parses a candidate line, with or without the `candidate:` prefix
    /// and the `a=` prefix before that.
    pub fn parse(line: &str) -> Result<Self> {
        let bad = || Error::BadCandidate(line.to_owned());
        let value = line
            .trim()
            .trim_start_matches("a=")
            .trim_start_matches("candidate:");
        let fields: Vec<&str> = value.split_whitespace().collect();
        if fields.len() < 8 || fields[6] != "typ" {
            return Err(bad());
        }
        let mut candidate = CandidateDescription {
            foundation: fields[0].to_owned(),
            component: fields[1].parse().map_err(|_| bad())?,
            transport: fields[2].to_lowercase(),
            priority: fields[3].parse().map_err(|_| bad())?,
            address: fields[4].parse().map_err(|_| bad())?,
            port: fields[5].parse().map_err(|_| bad())?,
            typ: fields[7].to_owned(),
            related_address: None,
            related_port: None,
        };
        let mut rest = fields[8..].chunks_exact(2);
        for pair in &mut rest {
            match pair[0] {
                "raddr" => candidate.related_address = Some(pair[1].parse().map_err(|_| bad())?),
                "rport" => candidate.related_port = Some(pair[1].parse().map_err(|_| bad())?),
                // generation, ufrag, network-cost and friends are ignored.
                _ => {}
            }
        }
        Ok(candidate)
    }
}
