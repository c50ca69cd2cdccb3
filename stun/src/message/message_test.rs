use super::*;
use crate::addr::XorMappedAddress;
use crate::error_code::{ErrorCodeAttribute, CODE_ROLE_CONFLICT};
use crate::fingerprint::Fingerprint;
use crate::integrity::MessageIntegrity;
use crate::textattrs::{Software, Username};

// Sample request from RFC 5769 §2.1.
const RFC5769_REQUEST: [u8; 108] = [
    0x00, 0x01, 0x00, 0x58, 0x21, 0x12, 0xa4, 0x42, 0xb7, 0xe7, 0xa7, 0x01, 0xbc, 0x34, 0xd6,
    0x86, 0xfa, 0x87, 0xdf, 0xae, 0x80, 0x22, 0x00, 0x10, 0x53, 0x54, 0x55, 0x4e, 0x20, 0x74,
    0x65, 0x73, 0x74, 0x20, 0x63, 0x6c, 0x69, 0x65, 0x6e, 0x74, 0x00, 0x24, 0x00, 0x04, 0x6e,
    0x00, 0x01, 0xff, 0x80, 0x29, 0x00, 0x08, 0x93, 0x2f, 0xf9, 0xb1, 0x51, 0x26, 0x3b, 0x36,
    0x00, 0x06, 0x00, 0x09, 0x65, 0x76, 0x74, 0x6a, 0x3a, 0x68, 0x36, 0x76, 0x59, 0x20, 0x20,
    0x20, 0x00, 0x08, 0x00, 0x14, 0x9a, 0xea, 0xa7, 0x0c, 0xbf, 0xd8, 0xcb, 0x56, 0x78, 0x1e,
    0xf2, 0xb5, 0xb2, 0xd3, 0xf2, 0x49, 0xc1, 0xb5, 0x71, 0xa2, 0x00, 0x28, 0x00, 0x04, 0xe5,
    0x7a, 0x3b, 0xcf,
];

// Sample IPv4 response from RFC 5769 §2.2.
const RFC5769_RESPONSE: [u8; 80] = [
    0x01, 0x01, 0x00, 0x3c, 0x21, 0x12, 0xa4, 0x42, 0xb7, 0xe7, 0xa7, 0x01, 0xbc, 0x34, 0xd6,
    0x86, 0xfa, 0x87, 0xdf, 0xae, 0x80, 0x22, 0x00, 0x0b, 0x74, 0x65, 0x73, 0x74, 0x20, 0x76,
    0x65, 0x63, 0x74, 0x6f, 0x72, 0x20, 0x00, 0x20, 0x00, 0x08, 0x00, 0x01, 0xa1, 0x47, 0xe1,
    0x12, 0xa6, 0x43, 0x00, 0x08, 0x00, 0x14, 0x2b, 0x91, 0xf5, 0x99, 0xfd, 0x9e, 0x90, 0xc3,
    0x8c, 0x74, 0x89, 0xf9, 0x2a, 0xf9, 0xba, 0x53, 0xf0, 0x6b, 0xe7, 0xd7, 0x00, 0x28, 0x00,
    0x04, 0xc0, 0x7d, 0x4c, 0x96,
];

const RFC5769_PASSWORD: &str = "VOkJxbRl1RmTxUk/WvJxBt";

#[test]
fn test_message_type_encode_decode() {
    let cases = [
        (BINDING_REQUEST, 0x0001u16),
        (BINDING_SUCCESS, 0x0101),
        (BINDING_ERROR, 0x0111),
        (
            MessageType::new(METHOD_ALLOCATE, MessageClass::Request),
            0x0003,
        ),
        (
            MessageType::new(METHOD_CREATE_PERMISSION, MessageClass::Request),
            0x0008,
        ),
    ];
    for (typ, wire) in cases {
        assert_eq!(typ.encode(), wire, "{typ}");
        assert_eq!(MessageType::decode(wire).unwrap(), typ);
    }
}

#[test]
fn test_decode_rfc5769_request() {
    let m = Message::decode(&RFC5769_REQUEST).unwrap();
    assert_eq!(m.typ, BINDING_REQUEST);
    assert_eq!(Username::get_from(&m).unwrap().0, "evtj:h6vY");
    assert_eq!(Software::get_from(&m).unwrap().0, "STUN test client");

    MessageIntegrity::new_short_term(RFC5769_PASSWORD)
        .check(&m)
        .unwrap();
    Fingerprint::check(&m).unwrap();
}

#[test]
fn test_decode_rfc5769_response() {
    let m = Message::decode(&RFC5769_RESPONSE).unwrap();
    assert_eq!(m.typ, BINDING_SUCCESS);
    let xored = XorMappedAddress::get_from(&m).unwrap();
    assert_eq!(xored.0, "192.0.2.1:32853".parse().unwrap());

    MessageIntegrity::new_short_term(RFC5769_PASSWORD)
        .check(&m)
        .unwrap();
    Fingerprint::check(&m).unwrap();
}

#[test]
fn test_build_verify_round_trip() {
    let mut m = Message::new(BINDING_REQUEST);
    Username("abcd:efgh".to_owned()).add_to(&mut m).unwrap();
    m.append(ATTR_PRIORITY, &1_845_501_695u32.to_be_bytes())
        .unwrap();
    let integrity = MessageIntegrity::new_short_term("swordfish");
    integrity.add_to(&mut m).unwrap();
    Fingerprint::add_to(&mut m).unwrap();

    let decoded = Message::decode(m.encode()).unwrap();
    assert_eq!(decoded.typ, BINDING_REQUEST);
    assert_eq!(decoded.transaction_id, m.transaction_id);
    assert_eq!(Username::get_from(&decoded).unwrap().0, "abcd:efgh");
    integrity.check(&decoded).unwrap();
    Fingerprint::check(&decoded).unwrap();

    assert_eq!(
        MessageIntegrity::new_short_term("wrong").check(&decoded),
        Err(Error::BadIntegrity)
    );
}

#[test]
fn test_tampered_integrity() {
    let mut m = Message::new(BINDING_REQUEST);
    Username("u:v".to_owned()).add_to(&mut m).unwrap();
    MessageIntegrity::new_short_term("pw").add_to(&mut m).unwrap();

    let mut raw = m.encode().to_vec();
    // Flip a bit inside the USERNAME value.
    raw[MESSAGE_HEADER_SIZE + ATTRIBUTE_HEADER_SIZE] ^= 0x01;
    let decoded = Message::decode(&raw).unwrap();
    assert_eq!(
        MessageIntegrity::new_short_term("pw").check(&decoded),
        Err(Error::BadIntegrity)
    );
}

#[test]
fn test_no_attribute_after_fingerprint() {
    let mut m = Message::new(BINDING_REQUEST);
    Fingerprint::add_to(&mut m).unwrap();
    assert_eq!(
        m.append(ATTR_PRIORITY, &0u32.to_be_bytes()),
        Err(Error::FingerprintBeforeIntegrity)
    );
}

#[test]
fn test_decode_rejects_unknown_required_attribute() {
    let mut m = Message::new(BINDING_REQUEST);
    // 0x7fff is comprehension-required and unassigned.
    m.append(AttrType(0x7fff), &[1, 2, 3, 4]).unwrap();
    assert_eq!(
        Message::decode(m.encode()).unwrap_err(),
        Error::UnknownRequiredAttr(0x7fff)
    );
}

#[test]
fn test_decode_accepts_unknown_optional_attribute() {
    let mut m = Message::new(BINDING_REQUEST);
    m.append(AttrType(0xbfff), &[1, 2, 3, 4]).unwrap();
    assert!(Message::decode(m.encode()).is_ok());
}

#[test]
fn test_decode_length_mismatch() {
    let mut raw = RFC5769_REQUEST.to_vec();
    raw.truncate(100);
    assert_eq!(Message::decode(&raw).unwrap_err(), Error::BadFormat);
}

#[test]
fn test_is_message() {
    assert!(is_message(&RFC5769_REQUEST));
    assert!(!is_message(&[0x80; 32]));
    assert!(!is_message(&RFC5769_REQUEST[..12]));
}

#[test]
fn test_error_response() {
    let req = Message::new(BINDING_REQUEST);
    let mut resp = req.response(MessageClass::ErrorResponse);
    ErrorCodeAttribute::new(CODE_ROLE_CONFLICT)
        .add_to(&mut resp)
        .unwrap();

    let decoded = Message::decode(resp.encode()).unwrap();
    assert_eq!(decoded.typ, BINDING_ERROR);
    assert_eq!(decoded.transaction_id, req.transaction_id);
    let ec = ErrorCodeAttribute::get_from(&decoded).unwrap();
    assert_eq!(ec.code, CODE_ROLE_CONFLICT);
    assert_eq!(ec.reason, "Role Conflict");
}
