use super::*;
use crate::message::{Message, BINDING_REQUEST};

#[test]
fn test_text_round_trip() {
    let mut m = Message::new(BINDING_REQUEST);
    Username("frag:ment".to_owned()).add_to(&mut m).unwrap();
    Realm("example.org".to_owned()).add_to(&mut m).unwrap();
    Nonce("dcd98b7102dd2f0e".to_owned()).add_to(&mut m).unwrap();
    Software("peerlink 0.1".to_owned()).add_to(&mut m).unwrap();

    let decoded = Message::decode(m.encode()).unwrap();
    assert_eq!(Username::get_from(&decoded).unwrap().0, "frag:ment");
    assert_eq!(Realm::get_from(&decoded).unwrap().0, "example.org");
    assert_eq!(Nonce::get_from(&decoded).unwrap().0, "dcd98b7102dd2f0e");
    assert_eq!(Software::get_from(&decoded).unwrap().0, "peerlink 0.1");
}

#[test]
fn test_username_too_long() {
    let mut m = Message::new(BINDING_REQUEST);
    let oversized = "x".repeat(MAX_USERNAME + 1);
    assert!(matches!(
        Username(oversized).add_to(&mut m).unwrap_err(),
        Error::AttributeTooLong { .. }
    ));
}
