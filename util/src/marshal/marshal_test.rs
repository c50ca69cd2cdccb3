use bytes::{Buf, BufMut};

use super::*;

struct Pair(u16, u16);

impl MarshalSize for Pair {
    fn marshal_size(&self) -> usize {
        4
    }
}

impl Marshal for Pair {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.len() < 4 {
            return Err(Error::UnexpectedEndOfBuffer {
                expected: 4,
                actual: buf.len(),
            });
        }
        buf.put_u16(self.0);
        buf.put_u16(self.1);
        Ok(4)
    }
}

impl Unmarshal for Pair {
    fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(Error::UnexpectedEndOfBuffer {
                expected: 4,
                actual: buf.remaining(),
            });
        }
        Ok(Pair(buf.get_u16(), buf.get_u16()))
    }
}

#[test]
fn test_marshal_round_trip() {
    let p = Pair(0xdead, 0xbeef);
    let raw = p.marshal().unwrap();
    assert_eq!(&raw[..], &[0xde, 0xad, 0xbe, 0xef]);

    let mut buf = &raw[..];
    let q = Pair::unmarshal(&mut buf).unwrap();
    assert_eq!((q.0, q.1), (0xdead, 0xbeef));
}

#[test]
fn test_unmarshal_short_buffer() {
    let mut buf = &[0u8, 1, 2][..];
    assert!(Pair::unmarshal(&mut buf).is_err());
}
