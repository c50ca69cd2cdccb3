use super::*;

#[test]
fn test_padding() {
    assert_eq!(nearest_padded_length(0), 0);
    assert_eq!(nearest_padded_length(1), 4);
    assert_eq!(nearest_padded_length(4), 4);
    assert_eq!(nearest_padded_length(9), 12);
}

#[test]
fn test_comprehension_required() {
    assert!(ATTR_USERNAME.comprehension_required());
    assert!(ATTR_XOR_MAPPED_ADDRESS.comprehension_required());
    assert!(!ATTR_FINGERPRINT.comprehension_required());
    assert!(!ATTR_ICE_CONTROLLING.comprehension_required());
}

#[test]
fn test_display_names() {
    assert_eq!(ATTR_XOR_MAPPED_ADDRESS.to_string(), "XOR-MAPPED-ADDRESS");
    assert_eq!(AttrType(0x7bad).to_string(), "0x7bad");
}
