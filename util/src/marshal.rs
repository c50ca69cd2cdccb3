#[cfg(test)]
mod marshal_test;

use bytes::{Buf, Bytes, BytesMut};

use crate::{Error, Result};

pub trait MarshalSize {
    fn marshal_size(&self) -> usize;
}

/// A wire type that can serialize itself into a caller-provided buffer.
pub trait Marshal: MarshalSize {
    /// Writes the encoded form into `buf`, returning the number of bytes
    /// written. `buf` must hold at least `marshal_size()` bytes.
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize>;

    fn marshal(&self) -> Result<Bytes> {
        let size = self.marshal_size();
        let mut buf = BytesMut::with_capacity(size);
        buf.resize(size, 0);
        let n = self.marshal_to(&mut buf)?;
        if n != size {
            return Err(Error::Other(format!(
                "marshal_to wrote {n} bytes, marshal_size promised {size}"
            )));
        }
        Ok(buf.freeze())
    }
}

pub trait Unmarshal: MarshalSize {
    fn unmarshal<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf;
}
