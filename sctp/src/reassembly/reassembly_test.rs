use super::*;

fn chunk(tsn: u32, sid: u16, ssn: u16, b: bool, e: bool, data: &'static [u8]) -> ChunkPayloadData {
    ChunkPayloadData {
        unordered: false,
        beginning_fragment: b,
        ending_fragment: e,
        tsn,
        stream_identifier: sid,
        stream_sequence_number: ssn,
        payload_protocol_identifier: 51,
        user_data: Bytes::from_static(data),
    }
}

fn unordered(tsn: u32, b: bool, e: bool, data: &'static [u8]) -> ChunkPayloadData {
    let mut c = chunk(tsn, 0, 0, b, e, data);
    c.unordered = true;
    c
}

#[test]
fn test_single_chunk_message() {
    let mut q = ReassemblyQueue::default();
    let out = q.push(chunk(1, 0, 0, true, true, b"hello"));
    assert_eq!(out.len(), 1);
    assert_eq!(&out[0].data[..], b"hello");
}

#[test]
fn test_fragmented_message_in_order() {
    let mut q = ReassemblyQueue::default();
    assert!(q.push(chunk(1, 0, 0, true, false, b"he")).is_empty());
    assert!(q.push(chunk(2, 0, 0, false, false, b"ll")).is_empty());
    let out = q.push(chunk(3, 0, 0, false, true, b"o"));
    assert_eq!(out.len(), 1);
    assert_eq!(&out[0].data[..], b"hello");
}

#[test]
fn test_fragments_out_of_order() {
    let mut q = ReassemblyQueue::default();
    assert!(q.push(chunk(3, 0, 0, false, true, b"o")).is_empty());
    assert!(q.push(chunk(1, 0, 0, true, false, b"he")).is_empty());
    let out = q.push(chunk(2, 0, 0, false, false, b"ll"));
    assert_eq!(out.len(), 1);
    assert_eq!(&out[0].data[..], b"hello");
}

#[test]
fn test_ordered_delivery_waits_for_ssn() {
    let mut q = ReassemblyQueue::default();
    // SSN 1 arrives before SSN 0.
    assert!(q.push(chunk(2, 5, 1, true, true, b"second")).is_empty());
    let out = q.push(chunk(1, 5, 0, true, true, b"first"));
    assert_eq!(out.len(), 2);
    assert_eq!(&out[0].data[..], b"first");
    assert_eq!(&out[1].data[..], b"second");
}

#[test]
fn test_unordered_delivered_immediately() {
    let mut q = ReassemblyQueue::default();
    let out = q.push(unordered(9, true, true, b"now"));
    assert_eq!(out.len(), 1);
    assert!(out[0].unordered);
}

#[test]
fn test_streams_are_independent() {
    let mut q = ReassemblyQueue::default();
    assert!(q.push(chunk(1, 1, 1, true, true, b"s1-later")).is_empty());
    let out = q.push(chunk(2, 2, 0, true, true, b"s2-now"));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].stream_id, 2);
}

#[test]
fn test_advance_ordered_skips_lost_message() {
    let mut q = ReassemblyQueue::default();
    assert!(q.push(chunk(2, 3, 1, true, true, b"kept")).is_empty());
    // Message with SSN 0 was abandoned by the sender.
    let out = q.advance_ordered(3, 0);
    assert_eq!(out.len(), 1);
    assert_eq!(&out[0].data[..], b"kept");
}
