use super::*;
use crate::chunk::*;

#[test]
fn test_packet_round_trip() {
    let data = Chunk::PayloadData(ChunkPayloadData {
        unordered: false,
        beginning_fragment: true,
        ending_fragment: true,
        tsn: 42,
        stream_identifier: 1,
        stream_sequence_number: 0,
        payload_protocol_identifier: 51,
        user_data: bytes::Bytes::from_static(b"hello"),
    });
    let p = Packet::new(0xdeadbeef, vec![data.raw()]);
    let raw = p.marshal();
    assert_eq!(raw.len() % 4, 0);

    let parsed = Packet::unmarshal(&raw).unwrap();
    assert_eq!(parsed.verification_tag, 0xdeadbeef);
    assert_eq!(parsed.chunks.len(), 1);
    match Chunk::parse(&parsed.chunks[0]).unwrap() {
        Chunk::PayloadData(pd) => {
            assert_eq!(pd.tsn, 42);
            assert_eq!(&pd.user_data[..], b"hello");
            assert!(pd.beginning_fragment && pd.ending_fragment);
        }
        other => panic!("wrong chunk: {other:?}"),
    }
}

#[test]
fn test_checksum_detects_corruption() {
    let p = Packet::new(7, vec![Chunk::CookieAck.raw()]);
    let mut raw = p.marshal();
    raw[4] ^= 0x01;
    assert_eq!(Packet::unmarshal(&raw).unwrap_err(), Error::ChecksumMismatch);
}

#[test]
fn test_multiple_chunks() {
    let sack = Chunk::Sack(ChunkSelectiveAck {
        cumulative_tsn_ack: 10,
        advertised_receiver_window: 65536,
        gap_ack_blocks: vec![GapAckBlock { start: 2, end: 3 }],
        duplicate_tsns: vec![5],
    });
    let hb = Chunk::Heartbeat(ChunkHeartbeat {
        info: vec![1, 2, 3, 4, 5],
    });
    let p = Packet::new(1, vec![sack.raw(), hb.raw()]);
    let parsed = Packet::unmarshal(&p.marshal()).unwrap();
    assert_eq!(parsed.chunks.len(), 2);
    match Chunk::parse(&parsed.chunks[0]).unwrap() {
        Chunk::Sack(s) => {
            assert_eq!(s.cumulative_tsn_ack, 10);
            assert_eq!(s.gap_ack_blocks, vec![GapAckBlock { start: 2, end: 3 }]);
            assert_eq!(s.duplicate_tsns, vec![5]);
        }
        other => panic!("wrong chunk: {other:?}"),
    }
    match Chunk::parse(&parsed.chunks[1]).unwrap() {
        Chunk::Heartbeat(h) => assert_eq!(h.info, vec![1, 2, 3, 4, 5]),
        other => panic!("wrong chunk: {other:?}"),
    }
}
