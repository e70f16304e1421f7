//! Wire primitives shared by the header and command codecs.
//!
//! Readers work over an explicit [`Cursor`] and never index past the end of
//! the buffer; writers append to a `BytesMut` and are infallible.

use bytes::{BufMut, BytesMut};

use crate::error::SmbError;

/// Largest character or byte count a u16 length field can describe.
const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Read position over a received message.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    #[cfg(test)]
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SmbError> {
        if n > self.remaining() {
            return Err(SmbError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], SmbError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, SmbError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, SmbError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16, SmbError> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, SmbError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, SmbError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read `chars` characters of text: two bytes each when `wide`
    /// (UTF-16LE), otherwise one byte each (Latin-1).
    pub fn read_text(&mut self, chars: u16, wide: bool) -> Result<String, SmbError> {
        let chars = chars as usize;
        if wide {
            let raw = self.take(chars * 2)?;
            let units = raw.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]]));
            char::decode_utf16(units)
                .collect::<Result<String, _>>()
                .map_err(|_| SmbError::InvalidEncoding)
        } else {
            Ok(self.take(chars)?.iter().map(|&b| char::from(b)).collect())
        }
    }

    /// Read a byte blob preceded by its two-byte byte count.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, SmbError> {
        let len = self.read_u16()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

/// Number of characters `s` occupies in the chosen encoding, as written
/// into a u16 length field.
pub fn text_len(s: &str, wide: bool) -> u16 {
    let n = if wide {
        s.encode_utf16().count()
    } else {
        s.chars().count()
    };
    n.min(MAX_FIELD_LEN) as u16
}

/// Write text in the chosen encoding. Characters outside Latin-1 become
/// `?` in single-byte mode. Writes exactly `text_len(s, wide)` characters.
pub fn put_text(buf: &mut BytesMut, s: &str, wide: bool) {
    if wide {
        for unit in s.encode_utf16().take(MAX_FIELD_LEN) {
            buf.put_u16_le(unit);
        }
    } else {
        for c in s.chars().take(MAX_FIELD_LEN) {
            buf.put_u8(u8::try_from(u32::from(c)).unwrap_or(b'?'));
        }
    }
}

/// Write a byte blob preceded by its two-byte byte count.
pub fn put_bytes(buf: &mut BytesMut, data: &[u8]) {
    let data = &data[..data.len().min(MAX_FIELD_LEN)];
    buf.put_u16_le(data.len() as u16);
    buf.put_slice(data);
}
