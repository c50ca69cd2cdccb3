use super::*;
use crate::message::{Message, BINDING_REQUEST};
use crate::textattrs::Software;

#[test]
fn test_fingerprint_round_trip() {
    let mut m = Message::new(BINDING_REQUEST);
    Software("peerlink".to_owned()).add_to(&mut m).unwrap();
    Fingerprint::add_to(&mut m).unwrap();

    let decoded = Message::decode(m.encode()).unwrap();
    Fingerprint::check(&decoded).unwrap();
}

#[test]
fn test_fingerprint_detects_corruption() {
    let mut m = Message::new(BINDING_REQUEST);
    Software("peerlink".to_owned()).add_to(&mut m).unwrap();
    Fingerprint::add_to(&mut m).unwrap();

    let mut raw = m.encode().to_vec();
    raw[24] ^= 0xff;
    let decoded = Message::decode(&raw).unwrap();
    assert_eq!(
        Fingerprint::check(&decoded).unwrap_err(),
        Error::FingerprintMismatch
    );
}
