use super::*;

#[test]
fn test_feedback_for_contiguous_arrivals() {
    let mut recorder = TwccRecorder::new(1, 2);
    let start = Instant::now();
    for i in 0..5u16 {
        recorder.record(i, start + Duration::from_millis(i as u64 * 10));
    }
    let fb = recorder
        .poll_feedback(start + Duration::from_millis(200))
        .unwrap();
    assert_eq!(fb.base_sequence_number, 0);
    assert_eq!(fb.packet_status_count, 5);
    assert_eq!(fb.recv_deltas.len(), 5);
    assert_eq!(fb.fb_pkt_count, 0);
    // Deltas after the first reflect the 10 ms spacing.
    for delta in &fb.recv_deltas[1..] {
        assert_eq!(delta.delta_us, 10_000);
    }
}

#[test]
fn test_feedback_marks_losses() {
    let mut recorder = TwccRecorder::new(1, 2);
    let start = Instant::now();
    recorder.record(0, start);
    recorder.record(3, start + Duration::from_millis(5));
    let fb = recorder
        .poll_feedback(start + Duration::from_millis(200))
        .unwrap();
    assert_eq!(fb.packet_status_count, 4);
    assert_eq!(fb.recv_deltas.len(), 2);

    let mut sender = TwccSender::new();
    sender.handle_feedback(&fb);
    assert_eq!(sender.stats().acked, 2);
    assert_eq!(sender.stats().lost, 2);
}

#[test]
fn test_feedback_counter_increments() {
    let mut recorder = TwccRecorder::new(1, 2);
    let start = Instant::now();
    recorder.record(0, start);
    let a = recorder.poll_feedback(start + Duration::from_millis(150)).unwrap();
    recorder.record(1, start + Duration::from_millis(200));
    let b = recorder.poll_feedback(start + Duration::from_millis(300)).unwrap();
    assert_eq!(a.fb_pkt_count, 0);
    assert_eq!(b.fb_pkt_count, 1);
    assert_eq!(b.base_sequence_number, 1);
}

#[test]
fn test_interval_respected() {
    let mut recorder = TwccRecorder::new(1, 2);
    let start = Instant::now();
    recorder.record(0, start);
    // Too early.
    assert!(recorder.poll_feedback(start + Duration::from_millis(10)).is_none());
    assert!(recorder.poll_feedback(start + Duration::from_millis(101)).is_some());
}

#[test]
fn test_feedback_survives_rtcp_round_trip() {
    let mut recorder = TwccRecorder::new(0xaaaa, 0xbbbb);
    let start = Instant::now();
    for i in 0..20u16 {
        if i % 4 != 3 {
            recorder.record(i, start + Duration::from_millis(i as u64 * 3));
        }
    }
    let fb = recorder
        .poll_feedback(start + Duration::from_millis(200))
        .unwrap();
    let raw = util::marshal::Marshal::marshal(&fb).unwrap();
    let mut buf = &raw[..];
    let parsed =
        <TransportLayerCc as util::marshal::Unmarshal>::unmarshal(&mut buf).unwrap();
    assert_eq!(parsed.packet_status_count, fb.packet_status_count);
    assert_eq!(parsed.recv_deltas.len(), fb.recv_deltas.len());
}

#[test]
fn test_wide_sequence_unrolls_across_wrap() {
    let mut recorder = TwccRecorder::new(1, 2);
    let start = Instant::now();
    recorder.record(65534, start);
    recorder.record(65535, start + Duration::from_millis(1));
    recorder.record(0, start + Duration::from_millis(2));
    let fb = recorder
        .poll_feedback(start + Duration::from_millis(200))
        .unwrap();
    assert_eq!(fb.base_sequence_number, 65534);
    assert_eq!(fb.packet_status_count, 3);
    assert_eq!(fb.recv_deltas.len(), 3);
}

#[test]
fn test_sender_sequence_monotonic() {
    let mut sender = TwccSender::new();
    assert_eq!(sender.next_sequence(), 0);
    assert_eq!(sender.next_sequence(), 1);
}
