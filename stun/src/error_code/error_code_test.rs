use super::*;
use crate::message::{Message, MessageClass, MessageType, METHOD_ALLOCATE};

#[test]
fn test_error_code_round_trip() {
    let mut m = Message::new(MessageType::new(
        METHOD_ALLOCATE,
        MessageClass::ErrorResponse,
    ));
    ErrorCodeAttribute::new(CODE_UNAUTHORIZED).add_to(&mut m).unwrap();

    let decoded = Message::decode(m.encode()).unwrap();
    let ec = ErrorCodeAttribute::get_from(&decoded).unwrap();
    assert_eq!(ec.code, CODE_UNAUTHORIZED);
    assert_eq!(ec.reason, "Unauthorized");
}

#[test]
fn test_error_code_wire_layout() {
    let mut m = Message::new(MessageType::new(
        METHOD_ALLOCATE,
        MessageClass::ErrorResponse,
    ));
    ErrorCodeAttribute {
        code: 438,
        reason: "Stale Nonce".to_owned(),
    }
    .add_to(&mut m)
    .unwrap();
    let attr = m.attributes.get(ATTR_ERROR_CODE).unwrap();
    // class = 4, number = 38
    assert_eq!(&attr.value[..4], &[0, 0, 4, 38]);
}
