#![forbid(unsafe_code)]
//! Big-endian integers, bounds-checked cursors and growable buffers shared by
//! the changegroup codec.

pub mod be {
    //! Big-endian fixed-width integers as used on the wire.

    use crate::error::{BridgeError, Result};

    const U32_LEN: usize = core::mem::size_of::<u32>();

    /// Appends a big-endian u32.
    pub fn put_u32(dst: &mut Vec<u8>, v: u32) {
        dst.extend_from_slice(&v.to_be_bytes());
    }

    /// Decodes a big-endian u32 at `off`.
    pub fn get_u32(src: &[u8], off: usize) -> Result<u32> {
        let end = off
            .checked_add(U32_LEN)
            .ok_or_else(|| BridgeError::malformed("u32 offset overflow"))?;
        let head = src
            .get(off..end)
            .ok_or_else(|| BridgeError::truncated("u32", end, src.len()))?;
        let mut bytes = [0u8; U32_LEN];
        bytes.copy_from_slice(head);
        Ok(u32::from_be_bytes(bytes))
    }

    /// Narrows a length or offset to the u32 the wire format carries.
    pub fn to_u32(v: usize, what: &str) -> Result<u32> {
        u32::try_from(v).map_err(|_| BridgeError::malformed(format!("{what} {v} exceeds u32")))
    }
}

pub mod buf {
    //! A slice-backed cursor for parsing plus growth-on-write helpers.

    use core::fmt;

    use crate::error::{BridgeError, Result};

    /// A cursor for reading bytes from a slice with offset tracking.
    pub struct Cursor<'a> {
        /// The underlying byte slice.
        pub buf: &'a [u8],
        /// Current read offset.
        pub off: usize,
    }

    impl<'a> Cursor<'a> {
        /// Creates a new cursor starting at offset 0.
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, off: 0 }
        }

        /// Takes the next `n` bytes from the cursor, advancing the offset.
        pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
            let end = self
                .off
                .checked_add(n)
                .ok_or_else(|| BridgeError::malformed("cursor offset overflow"))?;
            if end > self.buf.len() {
                return Err(BridgeError::truncated("cursor take", end, self.buf.len()));
            }
            let slice = &self.buf[self.off..end];
            self.off = end;
            Ok(slice)
        }

        /// Reads a big-endian u32.
        pub fn read_u32(&mut self) -> Result<u32> {
            let v = super::be::get_u32(self.buf, self.off)?;
            self.off += 4;
            Ok(v)
        }

        /// Returns the number of bytes remaining in the buffer.
        pub fn remaining(&self) -> usize {
            self.buf.len().saturating_sub(self.off)
        }

        /// Whether every byte has been consumed.
        pub fn is_empty(&self) -> bool {
            self.remaining() == 0
        }
    }

    impl<'a> fmt::Debug for Cursor<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Cursor")
                .field("off", &self.off)
                .field("remaining", &self.remaining())
                .finish()
        }
    }

    /// Zero-extends `buf` so that it is at least `len` bytes long. Never truncates.
    pub fn ensure_len(buf: &mut Vec<u8>, len: usize) {
        if len > buf.len() {
            buf.resize(len, 0);
        }
    }
}
