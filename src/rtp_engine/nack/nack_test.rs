use super::*;

#[test]
fn test_nack_emitted_for_missing() {
    let mut g = NackGenerator::new(1, 2);
    g.on_missing(&[100, 101, 105]);
    let nack = g.poll(Instant::now()).unwrap();
    assert_eq!(nack.media_ssrc, 2);
    let lost: Vec<u16> = nack.nacks.iter().flat_map(|p| p.packet_list()).collect();
    assert_eq!(lost, vec![100, 101, 105]);
}

#[test]
fn test_rate_limited_per_packet() {
    let mut g = NackGenerator::new(1, 2);
    let now = Instant::now();
    g.on_missing(&[50]);
    assert!(g.poll(now).is_some());
    // Within the interval: nothing new to send.
    assert!(g.poll(now + Duration::from_millis(100)).is_none());
    // After the interval the retry fires.
    assert!(g.poll(now + Duration::from_millis(301)).is_some());
}

#[test]
fn test_recovered_stops_nacking() {
    let mut g = NackGenerator::new(1, 2);
    let now = Instant::now();
    g.on_missing(&[50]);
    g.on_recovered(50);
    assert!(g.poll(now).is_none());
    assert_eq!(g.pending(), 0);
}

#[test]
fn test_retry_budget_exhausted() {
    let mut g = NackGenerator::new(1, 2);
    let mut now = Instant::now();
    g.on_missing(&[50]);
    for _ in 0..10 {
        assert!(g.poll(now).is_some());
        now += Duration::from_millis(301);
    }
    // Eleventh attempt never happens.
    assert!(g.poll(now).is_none());
    assert_eq!(g.pending(), 0);
}
