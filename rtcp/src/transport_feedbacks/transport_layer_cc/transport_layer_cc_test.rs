use super::*;

#[test]
fn test_run_length_chunk_codec() {
    let chunk = PacketStatusChunk::RunLength {
        symbol: SymbolType::ReceivedSmallDelta,
        run_length: 3,
    };
    let raw = chunk.encode().unwrap();
    assert_eq!(raw, 0b0010_0000_0000_0011);
    assert_eq!(PacketStatusChunk::decode(raw), chunk);
}

#[test]
fn test_one_bit_vector_chunk_codec() {
    let mut symbols = vec![SymbolType::NotReceived; 14];
    symbols[0] = SymbolType::ReceivedSmallDelta;
    symbols[13] = SymbolType::ReceivedSmallDelta;
    let chunk = PacketStatusChunk::StatusVector { symbols };
    let raw = chunk.encode().unwrap();
    assert_eq!(raw, 0b1010_0000_0000_0001);
    assert_eq!(PacketStatusChunk::decode(raw), chunk);
}

#[test]
fn test_two_bit_vector_chunk_codec() {
    let symbols = vec![
        SymbolType::ReceivedLargeDelta,
        SymbolType::NotReceived,
        SymbolType::ReceivedSmallDelta,
        SymbolType::NotReceived,
        SymbolType::NotReceived,
        SymbolType::NotReceived,
        SymbolType::NotReceived,
    ];
    let chunk = PacketStatusChunk::StatusVector { symbols };
    let raw = chunk.encode().unwrap();
    assert_eq!(raw & 0xc000, 0xc000);
    assert_eq!(PacketStatusChunk::decode(raw), chunk);
}

#[test]
fn test_twcc_round_trip() {
    let cc = TransportLayerCc {
        sender_ssrc: 4195875351,
        media_ssrc: 1124282272,
        base_sequence_number: 153,
        packet_status_count: 1,
        reference_time: 4057090,
        fb_pkt_count: 23,
        packet_chunks: vec![PacketStatusChunk::RunLength {
            symbol: SymbolType::ReceivedSmallDelta,
            run_length: 1,
        }],
        recv_deltas: vec![RecvDelta {
            type_tcc: SymbolType::ReceivedSmallDelta,
            delta_us: 500,
        }],
    };
    let raw = cc.marshal().unwrap();
    assert_eq!(raw.len() % 4, 0);

    let mut buf = &raw[..];
    let parsed = TransportLayerCc::unmarshal(&mut buf).unwrap();
    assert_eq!(parsed.base_sequence_number, 153);
    assert_eq!(parsed.packet_status_count, 1);
    assert_eq!(parsed.reference_time, 4057090);
    assert_eq!(parsed.recv_deltas, cc.recv_deltas);
}

#[test]
fn test_twcc_mixed_deltas() {
    let cc = TransportLayerCc {
        sender_ssrc: 1,
        media_ssrc: 2,
        base_sequence_number: 10,
        packet_status_count: 7,
        reference_time: 1,
        fb_pkt_count: 0,
        packet_chunks: vec![PacketStatusChunk::StatusVector {
            symbols: vec![
                SymbolType::ReceivedSmallDelta,
                SymbolType::NotReceived,
                SymbolType::ReceivedLargeDelta,
                SymbolType::NotReceived,
                SymbolType::NotReceived,
                SymbolType::ReceivedSmallDelta,
                SymbolType::NotReceived,
            ],
        }],
        recv_deltas: vec![
            RecvDelta {
                type_tcc: SymbolType::ReceivedSmallDelta,
                delta_us: 1000,
            },
            RecvDelta {
                type_tcc: SymbolType::ReceivedLargeDelta,
                delta_us: -250,
            },
            RecvDelta {
                type_tcc: SymbolType::ReceivedSmallDelta,
                delta_us: 0,
            },
        ],
    };
    let raw = cc.marshal().unwrap();
    let mut buf = &raw[..];
    let parsed = TransportLayerCc::unmarshal(&mut buf).unwrap();
    assert_eq!(parsed.recv_deltas, cc.recv_deltas);
}

#[test]
fn test_small_delta_out_of_range() {
    let cc = TransportLayerCc {
        packet_status_count: 1,
        packet_chunks: vec![PacketStatusChunk::RunLength {
            symbol: SymbolType::ReceivedSmallDelta,
            run_length: 1,
        }],
        recv_deltas: vec![RecvDelta {
            type_tcc: SymbolType::ReceivedSmallDelta,
            delta_us: 64000,
        }],
        ..Default::default()
    };
    assert!(cc.marshal().is_err());
}
