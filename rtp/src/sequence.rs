#[cfg(test)]
mod sequence_test;

use rand::Rng;

/// Outbound sequence-number source for one RTP stream. Starts at a random
/// value per RFC 3550 §5.1 and tracks the rollover count across u16 wraps.
#[derive(Debug)]
pub struct Sequencer {
    next: u16,
    roll_over_count: u64,
    started: bool,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self::with_initial(rand::thread_rng().gen::<u16>())
    }

    pub fn with_initial(initial: u16) -> Self {
        Sequencer {
            next: initial,
            roll_over_count: 0,
            started: false,
        }
    }

    pub fn next_sequence_number(&mut self) -> u16 {
        let seq = self.next;
        if self.started && seq == 0 {
            self.roll_over_count += 1;
        }
        self.started = true;
        self.next = self.next.wrapping_add(1);
        seq
    }

    /// How many times the 16-bit space has wrapped since start.
    pub fn roll_over_count(&self) -> u64 {
        self.roll_over_count
    }
}
