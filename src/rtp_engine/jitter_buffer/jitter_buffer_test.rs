use super::*;

fn packet(seq: u16) -> rtp::packet::Packet {
    rtp::packet::Packet {
        header: rtp::header::Header {
            version: 2,
            payload_type: 96,
            sequence_number: seq,
            ssrc: 7,
            ..Default::default()
        },
        payload: bytes::Bytes::from(vec![seq as u8]),
    }
}

#[test]
fn test_in_order_release() {
    let mut jb = JitterBuffer::new(DEFAULT_VIDEO_HOLD);
    let now = Instant::now();
    let (out, missing) = jb.push(packet(10), true, false, now);
    assert_eq!(out.len(), 1);
    assert!(missing.is_empty());
    let (out, _) = jb.push(packet(11), false, false, now);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].packet.header.sequence_number, 11);
}

#[test]
fn test_reorder_held_until_gap_fills() {
    let mut jb = JitterBuffer::new(DEFAULT_VIDEO_HOLD);
    let now = Instant::now();
    jb.push(packet(10), false, false, now);
    let (out, missing) = jb.push(packet(12), false, false, now);
    assert!(out.is_empty());
    assert_eq!(missing, vec![11]);
    assert_eq!(jb.pending_gaps(), vec![11]);

    let (out, _) = jb.push(packet(11), false, false, now);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].packet.header.sequence_number, 11);
    assert_eq!(out[1].packet.header.sequence_number, 12);
}

#[test]
fn test_duplicate_counted() {
    let mut jb = JitterBuffer::new(DEFAULT_VIDEO_HOLD);
    let now = Instant::now();
    jb.push(packet(5), false, false, now);
    jb.push(packet(7), false, false, now);
    let (out, _) = jb.push(packet(7), false, false, now);
    assert!(out.is_empty());
    assert_eq!(jb.stats().duplicates, 1);
}

#[test]
fn test_gap_released_after_hold() {
    let mut jb = JitterBuffer::new(Duration::from_millis(100));
    let now = Instant::now();
    jb.push(packet(1), false, false, now);
    jb.push(packet(3), false, false, now);

    let due = jb.poll_timeout().unwrap();
    assert!(due <= now + Duration::from_millis(100));
    let out = jb.handle_timeout(due);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].packet.header.sequence_number, 3);
    assert_eq!(jb.stats().lost_skipped, 1);
}

#[test]
fn test_late_packet_dropped() {
    let mut jb = JitterBuffer::new(Duration::from_millis(100));
    let now = Instant::now();
    jb.push(packet(10), false, false, now);
    jb.push(packet(11), false, false, now);
    // 9 arrives after delivery has moved past it.
    let (out, _) = jb.push(packet(9), false, false, now);
    assert!(out.is_empty());
    assert_eq!(jb.stats().too_late, 1);
}

#[test]
fn test_sequence_wrap() {
    let mut jb = JitterBuffer::new(DEFAULT_VIDEO_HOLD);
    let now = Instant::now();
    jb.push(packet(65535), false, false, now);
    let (out, _) = jb.push(packet(0), false, false, now);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].extended_sequence, 65536);
}

#[test]
fn test_keyframe_flag_carried() {
    let mut jb = JitterBuffer::new(DEFAULT_VIDEO_HOLD);
    let (out, _) = jb.push(packet(1), true, false, Instant::now());
    assert!(out[0].keyframe);
    assert!(!out[0].dtx);
}
