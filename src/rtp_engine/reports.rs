#[cfg(test)]
mod reports_test;

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rtcp::reception_report::ReceptionReport;
use rtcp::sender_report::SenderReport;

use super::extend_seq;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// 64-bit NTP timestamp for a wall-clock instant.
pub fn ntp_timestamp(at: SystemTime) -> u64 {
    let since = at.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    let seconds = since.as_secs() + NTP_UNIX_OFFSET;
    let fraction = ((since.subsec_nanos() as u64) << 32) / 1_000_000_000;
    (seconds << 32) | fraction
}

/// Receive-side statistics for one SSRC, enough to build reception
/// report blocks (RFC 3550 §6.4 and appendix A.8 for jitter).
pub struct ReceiverStats {
    ssrc: u32,
    clock_rate: u32,
    base_ext_seq: Option<u64>,
    highest_ext_seq: Option<u64>,
    received: u64,
    expected_prior: u64,
    received_prior: u64,
    jitter: f64,
    last_transit: Option<f64>,
    last_sr_ntp: u32,
    last_sr_at: Option<Instant>,
}

impl ReceiverStats {
    pub fn new(ssrc: u32, clock_rate: u32) -> Self {
        ReceiverStats {
            ssrc,
            clock_rate,
            base_ext_seq: None,
            highest_ext_seq: None,
            received: 0,
            expected_prior: 0,
            received_prior: 0,
            jitter: 0.0,
            last_transit: None,
            last_sr_ntp: 0,
            last_sr_at: None,
        }
    }

    pub fn on_packet(&mut self, sequence: u16, rtp_timestamp: u32, arrival: Instant, epoch: Instant) {
        let ext = extend_seq(self.highest_ext_seq, sequence);
        if self.base_ext_seq.is_none() {
            self.base_ext_seq = Some(ext);
        }
        if self.highest_ext_seq.map(|h| ext > h).unwrap_or(true) {
            self.highest_ext_seq = Some(ext);
        }
        self.received += 1;

        // Interarrival jitter in timestamp units.
        let arrival_ts = arrival.saturating_duration_since(epoch).as_secs_f64()
            * self.clock_rate as f64;
        let transit = arrival_ts - rtp_timestamp as f64;
        if let Some(last) = self.last_transit {
            let d = (transit - last).abs();
            self.jitter += (d - self.jitter) / 16.0;
        }
        self.last_transit = Some(transit);
    }

    /// Remembers the middle 32 bits of a SenderReport's NTP timestamp for
    /// the LSR/DLSR fields.
    pub fn on_sender_report(&mut self, ntp_time: u64, at: Instant) {
        self.last_sr_ntp = ((ntp_time >> 16) & 0xffff_ffff) as u32;
        self.last_sr_at = Some(at);
    }

    pub fn expected(&self) -> u64 {
        match (self.base_ext_seq, self.highest_ext_seq) {
            (Some(base), Some(high)) => high - base + 1,
            _ => 0,
        }
    }

    pub fn build_report(&mut self, now: Instant) -> ReceptionReport {
        let expected = self.expected();
        let lost_total = expected.saturating_sub(self.received);

        let expected_interval = expected.saturating_sub(self.expected_prior);
        let received_interval = self.received.saturating_sub(self.received_prior);
        self.expected_prior = expected;
        self.received_prior = self.received;
        let lost_interval = expected_interval.saturating_sub(received_interval);
        let fraction_lost = if expected_interval == 0 {
            0
        } else {
            ((lost_interval * 256) / expected_interval).min(255) as u8
        };

        // Delay since last SR in 1/65536 second units.
        let delay = self
            .last_sr_at
            .map(|at| (now.saturating_duration_since(at).as_secs_f64() * 65536.0) as u32)
            .unwrap_or(0);

        ReceptionReport {
            ssrc: self.ssrc,
            fraction_lost,
            total_lost: (lost_total & 0x00ff_ffff) as u32,
            last_sequence_number: (self.highest_ext_seq.unwrap_or(0) & 0xffff_ffff) as u32,
            jitter: self.jitter as u32,
            last_sender_report: self.last_sr_ntp,
            delay,
        }
    }
}

/// Send-side counters for one SSRC, the source of SenderReports.
pub struct SenderStats {
    ssrc: u32,
    clock_rate: u32,
    packet_count: u32,
    octet_count: u32,
    /// Mapping between the RTP timestamp line and the wall clock: the
    /// timestamp carried on the most recent outgoing packet and when it
    /// left.
    last_rtp_timestamp: u32,
    last_sent_at: Option<Instant>,
}

impl SenderStats {
    pub fn new(ssrc: u32, clock_rate: u32) -> Self {
        SenderStats {
            ssrc,
            clock_rate,
            packet_count: 0,
            octet_count: 0,
            last_rtp_timestamp: 0,
            last_sent_at: None,
        }
    }

    pub fn on_packet(&mut self, rtp_timestamp: u32, payload_len: usize, at: Instant) {
        self.packet_count = self.packet_count.wrapping_add(1);
        self.octet_count = self.octet_count.wrapping_add(payload_len as u32);
        self.last_rtp_timestamp = rtp_timestamp;
        self.last_sent_at = Some(at);
    }

    pub fn has_sent(&self) -> bool {
        self.last_sent_at.is_some()
    }

    /// Builds a SenderReport mapping the current wall clock onto the RTP
    /// timestamp line (RFC 3550 §6.4.1).
    pub fn build_report(&self, now: Instant, wallclock: SystemTime) -> SenderReport {
        let rtp_time = match self.last_sent_at {
            Some(at) => {
                let advanced = now.saturating_duration_since(at).as_secs_f64()
                    * self.clock_rate as f64;
                self.last_rtp_timestamp.wrapping_add(advanced as u32)
            }
            None => self.last_rtp_timestamp,
        };
        SenderReport {
            ssrc: self.ssrc,
            ntp_time: ntp_timestamp(wallclock),
            rtp_time,
            packet_count: self.packet_count,
            octet_count: self.octet_count,
            reports: vec![],
        }
    }
}
