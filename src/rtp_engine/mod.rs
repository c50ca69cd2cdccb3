pub mod jitter_buffer;
pub mod nack;
pub mod reports;
pub mod rtx;
pub mod twcc;

pub use jitter_buffer::{JitterBuffer, MediaPacket};
pub use nack::NackGenerator;
pub use reports::{ntp_timestamp, ReceiverStats, SenderStats};
pub use rtx::{unwrap_rtx, RtxSender};
pub use twcc::{TwccRecorder, TwccSender};

/// Extends a 16-bit RTP sequence number against the highest extended
/// sequence seen so far, tracking rollovers.
pub(crate) fn extend_seq(highest: Option<u64>, seq: u16) -> u64 {
    let Some(highest) = highest else {
        return seq as u64;
    };
    let roc = highest >> 16;
    let candidates = [
        roc.wrapping_sub(1),
        roc,
        roc + 1,
    ]
    .map(|r| (r << 16) | seq as u64);
    candidates
        .into_iter()
        .min_by_key(|c| c.abs_diff(highest))
        .unwrap_or(seq as u64)
}
