use super::*;

fn run(detector: &mut dyn ReplayDetector, input: &[u64]) -> Vec<u64> {
    let mut accepted = vec![];
    for &seq in input {
        if detector.check(seq) {
            detector.accept();
            accepted.push(seq);
        }
    }
    accepted
}

#[test]
fn test_in_order_sequence() {
    let mut d = SlidingWindowDetector::new(64, u64::MAX);
    assert_eq!(run(&mut d, &[0, 1, 2, 3, 4]), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_duplicate_rejected() {
    let mut d = SlidingWindowDetector::new(64, u64::MAX);
    assert_eq!(run(&mut d, &[10, 11, 11, 12, 10]), vec![10, 11, 12]);
}

#[test]
fn test_reorder_within_window() {
    let mut d = SlidingWindowDetector::new(64, u64::MAX);
    assert_eq!(run(&mut d, &[5, 8, 6, 7, 6]), vec![5, 8, 6, 7]);
}

#[test]
fn test_too_old_rejected() {
    let mut d = SlidingWindowDetector::new(8, u64::MAX);
    assert_eq!(run(&mut d, &[100, 92, 93]), vec![100, 93]);
}

#[test]
fn test_max_seq_bound() {
    let mut d = SlidingWindowDetector::new(64, 100);
    assert_eq!(run(&mut d, &[99, 100, 101]), vec![99, 100]);
}

#[test]
fn test_check_without_accept_does_not_advance() {
    let mut d = SlidingWindowDetector::new(64, u64::MAX);
    assert!(d.check(5));
    // Never accepted, so 5 is still fresh.
    assert!(d.check(5));
    d.accept();
    assert!(!d.check(5));
}

#[test]
fn test_large_jump_clears_window() {
    let mut d = SlidingWindowDetector::new(64, u64::MAX);
    assert_eq!(run(&mut d, &[1, 2, 1000, 999, 2]), vec![1, 2, 1000, 999]);
}
