use super::*;
use crate::extension::GROUP_P256;

#[test]
fn test_handshake_header_round_trip() {
    let h = HandshakeHeader {
        msg_type: MSG_CLIENT_HELLO,
        length: 0x012345,
        message_seq: 7,
        fragment_offset: 0x10,
        fragment_length: 0x0100,
    };
    let raw = h.marshal();
    assert_eq!(HandshakeHeader::unmarshal(&raw).unwrap(), h);
}

#[test]
fn test_client_hello_round_trip() {
    let ch = HandshakeMessage::ClientHello(ClientHello {
        random: Random([7u8; 32]),
        session_id: vec![],
        cookie: vec![1, 2, 3],
        cipher_suites: vec![CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256],
        extensions: vec![
            Extension::UseSrtp {
                profiles: vec![0x0001],
            },
            Extension::SupportedGroups {
                groups: vec![GROUP_P256],
            },
        ],
    });
    let body = ch.marshal_body();
    let parsed = HandshakeMessage::unmarshal_body(MSG_CLIENT_HELLO, &body).unwrap();
    assert_eq!(parsed, ch);
}

#[test]
fn test_server_hello_round_trip() {
    let sh = HandshakeMessage::ServerHello(ServerHello {
        random: Random([9u8; 32]),
        session_id: vec![5; 8],
        cipher_suite: CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256,
        extensions: vec![Extension::UseSrtp {
            profiles: vec![0x0007],
        }],
    });
    let body = sh.marshal_body();
    assert_eq!(
        HandshakeMessage::unmarshal_body(MSG_SERVER_HELLO, &body).unwrap(),
        sh
    );
}

#[test]
fn test_certificate_round_trip() {
    let msg = HandshakeMessage::Certificate(CertificateMsg {
        certificates: vec![vec![0xde; 300], vec![0xad; 5]],
    });
    let body = msg.marshal_body();
    assert_eq!(
        HandshakeMessage::unmarshal_body(MSG_CERTIFICATE, &body).unwrap(),
        msg
    );
}

#[test]
fn test_server_key_exchange_round_trip() {
    let msg = HandshakeMessage::ServerKeyExchange(ServerKeyExchange {
        named_curve: GROUP_P256,
        public_key: vec![0x04; 65],
        signature: vec![0x30, 0x06, 1, 2, 3, 4, 5, 6],
    });
    let body = msg.marshal_body();
    assert_eq!(
        HandshakeMessage::unmarshal_body(MSG_SERVER_KEY_EXCHANGE, &body).unwrap(),
        msg
    );
}

#[test]
fn test_finished_round_trip() {
    let msg = HandshakeMessage::Finished(Finished {
        verify_data: vec![0xab; 12],
    });
    let body = msg.marshal_body();
    assert_eq!(
        HandshakeMessage::unmarshal_body(MSG_FINISHED, &body).unwrap(),
        msg
    );
}

#[test]
fn test_canonical_bytes_header() {
    let msg = HandshakeMessage::ServerHelloDone;
    let raw = msg.canonical_bytes(5);
    assert_eq!(raw.len(), HANDSHAKE_HEADER_SIZE);
    let header = HandshakeHeader::unmarshal(&raw).unwrap();
    assert_eq!(header.msg_type, MSG_SERVER_HELLO_DONE);
    assert_eq!(header.message_seq, 5);
    assert_eq!(header.length, 0);
}
