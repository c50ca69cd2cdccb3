use super::*;
use crate::message::{Message, BINDING_REQUEST};
use crate::textattrs::Username;

#[test]
fn test_short_term_round_trip() {
    let mut m = Message::new(BINDING_REQUEST);
    Username("a:b".to_owned()).add_to(&mut m).unwrap();
    let i = MessageIntegrity::new_short_term("secret");
    i.add_to(&mut m).unwrap();

    let decoded = Message::decode(m.encode()).unwrap();
    i.check(&decoded).unwrap();
}

#[test]
fn test_long_term_key_is_md5_of_credentials() {
    // RFC 5389 §15.4: key = MD5(username ":" realm ":" SASLprep(password)).
    let a = MessageIntegrity::new_long_term("user", "realm", "pass");
    let b = MessageIntegrity::new_long_term("user", "realm", "pass");
    let mut m = Message::new(BINDING_REQUEST);
    a.add_to(&mut m).unwrap();
    b.check(&m).unwrap();

    let other = MessageIntegrity::new_long_term("user", "other", "pass");
    assert_eq!(other.check(&m).unwrap_err(), Error::BadIntegrity);
}

#[test]
fn test_integrity_refused_after_fingerprint() {
    use crate::fingerprint::Fingerprint;
    let mut m = Message::new(BINDING_REQUEST);
    Fingerprint::add_to(&mut m).unwrap();
    assert_eq!(
        MessageIntegrity::new_short_term("x").add_to(&mut m).unwrap_err(),
        Error::FingerprintBeforeIntegrity
    );
}

#[test]
fn test_missing_integrity_attribute() {
    let m = Message::new(BINDING_REQUEST);
    assert_eq!(
        MessageIntegrity::new_short_term("x").check(&m).unwrap_err(),
        Error::AttributeNotFound
    );
}
