use super::*;
use crate::message::{Message, BINDING_SUCCESS};

#[test]
fn test_xor_mapped_address_v4() {
    let addr: SocketAddr = "203.0.113.5:4500".parse().unwrap();
    let mut m = Message::new(BINDING_SUCCESS);
    XorMappedAddress(addr).add_to(&mut m).unwrap();

    let decoded = Message::decode(m.encode()).unwrap();
    assert_eq!(XorMappedAddress::get_from(&decoded).unwrap().0, addr);
}

#[test]
fn test_xor_mapped_address_v6() {
    let addr: SocketAddr = "[2001:db8::7]:9".parse().unwrap();
    let mut m = Message::new(BINDING_SUCCESS);
    XorMappedAddress(addr).add_to(&mut m).unwrap();

    let decoded = Message::decode(m.encode()).unwrap();
    assert_eq!(XorMappedAddress::get_from(&decoded).unwrap().0, addr);
}

#[test]
fn test_mapped_address_plain() {
    let addr: SocketAddr = "10.1.2.3:7000".parse().unwrap();
    let mut m = Message::new(BINDING_SUCCESS);
    MappedAddress(addr).add_to(&mut m).unwrap();
    assert_eq!(MappedAddress::get_from(&m).unwrap().0, addr);
    // The non-XOR encoding carries the literal port bytes.
    let attr = m.attributes.get(ATTR_MAPPED_ADDRESS).unwrap();
    assert_eq!(&attr.value[2..4], &7000u16.to_be_bytes());
}

#[test]
fn test_bad_family_rejected() {
    let mut m = Message::new(BINDING_SUCCESS);
    m.append(ATTR_MAPPED_ADDRESS, &[0, 0x05, 0, 80, 1, 2, 3, 4])
        .unwrap();
    assert_eq!(
        MappedAddress::get_from(&m).unwrap_err(),
        Error::BadAddressFamily(0x05)
    );
}
