//! Bounds-checked byte cursors
//!
//! Every codec in this crate reads through [`ByteReader`] and writes through
//! [`ByteWriter`], so bounds checking lives here and nowhere else. All
//! multi-byte integers are big-endian on the wire.

use bytes::{Buf, BufMut, BytesMut};
use pducraft_core::{Error, Result};

mod private {
    pub trait Sealed {}
}

/// Fixed-width integers that can be read from and written to the wire
pub trait WireInt: Copy + private::Sealed {
    /// Size on the wire in bytes
    const SIZE: usize;

    #[doc(hidden)]
    fn get(buf: &mut &[u8]) -> Self;

    #[doc(hidden)]
    fn put(self, buf: &mut BytesMut);
}

macro_rules! impl_wire_int {
    ($($ty:ty => $get:ident, $put:ident;)*) => {
        $(
            impl private::Sealed for $ty {}

            impl WireInt for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn get(buf: &mut &[u8]) -> Self {
                    buf.$get()
                }

                fn put(self, buf: &mut BytesMut) {
                    buf.$put(self)
                }
            }
        )*
    };
}

impl_wire_int! {
    u8 => get_u8, put_u8;
    u16 => get_u16, put_u16;
    u32 => get_u32, put_u32;
    u64 => get_u64, put_u64;
    u128 => get_u128, put_u128;
}

/// Forward reader over a borrowed byte slice
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    rest: &'a [u8],
}

impl<'a> ByteReader<'a> {
    /// Reader positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, rest: data }
    }

    /// Offset of the next unread byte from the start of the buffer
    pub fn position(&self) -> usize {
        self.data.len() - self.rest.len()
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }

    /// Whether every byte has been read
    pub fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    /// Unread bytes, without consuming them
    pub fn rest(&self) -> &'a [u8] {
        self.rest
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.rest.len() < needed {
            return Err(Error::OutOfBounds {
                needed,
                remaining: self.rest.len(),
            });
        }
        Ok(())
    }

    /// Inspect the next byte without consuming it
    pub fn peek_u8(&self) -> Result<u8> {
        self.rest.first().copied().ok_or(Error::OutOfBounds {
            needed: 1,
            remaining: 0,
        })
    }

    /// Read a big-endian integer
    pub fn read<T: WireInt>(&mut self) -> Result<T> {
        self.ensure(T::SIZE)?;
        Ok(T::get(&mut self.rest))
    }

    /// Read `n` raw bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        Ok(head)
    }

    /// Read exactly `N` bytes into an array
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Consume and return every unread byte
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = self.rest;
        self.rest = &[];
        rest
    }

    /// Advance past `n` bytes
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    /// Distance from the current position to the first `byte`, if any
    pub fn find(&self, byte: u8) -> Option<usize> {
        self.rest.iter().position(|&b| b == byte)
    }
}

/// Append-only writer with an optional capacity limit
#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    buf: BytesMut,
    limit: Option<usize>,
}

impl ByteWriter {
    /// Create a writer that grows as needed
    pub fn new() -> Self {
        ByteWriter {
            buf: BytesMut::new(),
            limit: None,
        }
    }

    /// Create a writer that refuses to grow beyond `limit` bytes
    pub fn with_limit(limit: usize) -> Self {
        ByteWriter {
            buf: BytesMut::with_capacity(limit),
            limit: Some(limit),
        }
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if let Some(limit) = self.limit {
            let remaining = limit - self.buf.len();
            if needed > remaining {
                return Err(Error::OutOfBounds { needed, remaining });
            }
        }
        Ok(())
    }

    /// Write a big-endian integer
    pub fn write<T: WireInt>(&mut self, value: T) -> Result<()> {
        self.ensure(T::SIZE)?;
        value.put(&mut self.buf);
        Ok(())
    }

    /// Append `bytes` verbatim
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Append `n` zero bytes
    pub fn write_zeros(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.buf.put_bytes(0, n);
        Ok(())
    }

    /// Overwrite an already written 16-bit field at offset `at`
    pub fn patch_u16(&mut self, at: usize, value: u16) -> Result<()> {
        let len = self.buf.len();
        match self.buf.get_mut(at..at + 2) {
            Some(field) => {
                field.copy_from_slice(&value.to_be_bytes());
                Ok(())
            }
            None => Err(Error::OutOfBounds {
                needed: 2,
                remaining: len.saturating_sub(at),
            }),
        }
    }

    /// Bytes written from offset `start` onwards
    pub fn written_since(&self, start: usize) -> &[u8] {
        self.buf.get(start..).unwrap_or(&[])
    }

    /// Everything written so far
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer, returning its buffer
    pub fn into_bytes(self) -> BytesMut {
        self.buf
    }

    /// Consume the writer, returning the written bytes
    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}
