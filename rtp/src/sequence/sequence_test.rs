use super::*;

#[test]
fn test_monotonic() {
    let mut s = Sequencer::with_initial(100);
    assert_eq!(s.next_sequence_number(), 100);
    assert_eq!(s.next_sequence_number(), 101);
    assert_eq!(s.roll_over_count(), 0);
}

#[test]
fn test_rollover_counted() {
    let mut s = Sequencer::with_initial(u16::MAX);
    assert_eq!(s.next_sequence_number(), u16::MAX);
    assert_eq!(s.next_sequence_number(), 0);
    assert_eq!(s.roll_over_count(), 1);
}

#[test]
fn test_initial_zero_is_not_a_rollover() {
    let mut s = Sequencer::with_initial(0);
    assert_eq!(s.next_sequence_number(), 0);
    assert_eq!(s.roll_over_count(), 0);
}
