use super::*;

#[test]
fn test_ntp_timestamp_epoch_offset() {
    let ntp = ntp_timestamp(UNIX_EPOCH + Duration::from_secs(1));
    assert_eq!(ntp >> 32, NTP_UNIX_OFFSET + 1);
    assert_eq!(ntp & 0xffff_ffff, 0);

    let half = ntp_timestamp(UNIX_EPOCH + Duration::from_millis(500));
    // Fraction field is ~0.5 * 2^32.
    let frac = half & 0xffff_ffff;
    assert!((frac as i64 - (1i64 << 31)).abs() < 1 << 20);
}

#[test]
fn test_no_loss_report() {
    let mut stats = ReceiverStats::new(7, 90000);
    let epoch = Instant::now();
    for i in 0..10u16 {
        stats.on_packet(i, i as u32 * 3000, epoch + Duration::from_millis(i as u64), epoch);
    }
    let report = stats.build_report(epoch + Duration::from_millis(20));
    assert_eq!(report.ssrc, 7);
    assert_eq!(report.fraction_lost, 0);
    assert_eq!(report.total_lost, 0);
    assert_eq!(report.last_sequence_number, 9);
}

#[test]
fn test_loss_fraction() {
    let mut stats = ReceiverStats::new(7, 90000);
    let epoch = Instant::now();
    // Half the packets of 0..=9 arrive.
    for i in [0u16, 2, 4, 6, 8, 9] {
        stats.on_packet(i, 0, epoch, epoch);
    }
    let report = stats.build_report(epoch);
    assert_eq!(report.total_lost, 4);
    // 4/10 lost -> fraction = 102/256.
    assert_eq!(report.fraction_lost, (4 * 256 / 10) as u8);

    // Second interval: everything arrives, fraction resets.
    for i in 10u16..20 {
        stats.on_packet(i, 0, epoch, epoch);
    }
    let report = stats.build_report(epoch);
    assert_eq!(report.fraction_lost, 0);
    assert_eq!(report.total_lost, 4);
}

#[test]
fn test_lsr_dlsr() {
    let mut stats = ReceiverStats::new(7, 90000);
    let epoch = Instant::now();
    stats.on_packet(0, 0, epoch, epoch);
    let ntp = 0x0123_4567_89ab_cdefu64;
    stats.on_sender_report(ntp, epoch);
    let report = stats.build_report(epoch + Duration::from_secs(1));
    assert_eq!(report.last_sender_report, 0x4567_89ab);
    // One second in 1/65536 units.
    assert!((report.delay as i64 - 65536).abs() < 256);
}

#[test]
fn test_sender_report_counters() {
    let mut stats = SenderStats::new(9, 48000);
    let now = Instant::now();
    stats.on_packet(1000, 120, now);
    stats.on_packet(1960, 120, now);
    let sr = stats.build_report(now, UNIX_EPOCH + Duration::from_secs(1_700_000_000));
    assert_eq!(sr.ssrc, 9);
    assert_eq!(sr.packet_count, 2);
    assert_eq!(sr.octet_count, 240);
    assert_eq!(sr.rtp_time, 1960);
}

#[test]
fn test_jitter_stable_for_constant_spacing() {
    let mut stats = ReceiverStats::new(7, 8000);
    let epoch = Instant::now();
    // Packets every 20 ms with matching timestamp advance: near-zero
    // jitter.
    for i in 0..50u16 {
        stats.on_packet(
            i,
            i as u32 * 160,
            epoch + Duration::from_millis(20 * i as u64),
            epoch,
        );
    }
    let report = stats.build_report(epoch + Duration::from_secs(2));
    assert!(report.jitter < 2, "jitter {} too high", report.jitter);
}
