//! READ command.
//!
//! Request: Flags(2) + Fid(2) + Offset(8) + MaxCount(2) + MinCount(2) +
//! Remaining(4) + NameLength(2), then FileName and the context blob.
//! Response: Remaining(2), then the data blob.

use bytes::{BufMut, BytesMut};

use crate::error::SmbError;
use crate::smb::wire::{self, Cursor};
use crate::smb;

/// Parsed READ request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub flags: u16,
    pub fid: u16,
    pub offset: u64,
    pub max_count: u16,
    pub min_count: u16,
    pub remaining: u32,
    pub file_name: String,
    pub context: Vec<u8>,
}

impl ReadRequest {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        Self::parse_inner(&mut Cursor::new(input)).map_err(SmbError::in_body)
    }

    fn parse_inner(cur: &mut Cursor<'_>) -> Result<Self, SmbError> {
        let flags = cur.read_u16()?;
        let fid = cur.read_u16()?;
        let offset = cur.read_u64()?;
        let max_count = cur.read_u16()?;
        let min_count = cur.read_u16()?;
        let remaining = cur.read_u32()?;
        let name_len = cur.read_u16()?;

        let file_name = cur.read_text(name_len, smb::is_unicode(flags))?;
        let context = cur.read_bytes()?;

        Ok(ReadRequest {
            flags,
            fid,
            offset,
            max_count,
            min_count,
            remaining,
            file_name,
            context,
        })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        let wide = smb::is_unicode(self.flags);
        buf.put_u16_le(self.flags);
        buf.put_u16_le(self.fid);
        buf.put_u64_le(self.offset);
        buf.put_u16_le(self.max_count);
        buf.put_u16_le(self.min_count);
        buf.put_u32_le(self.remaining);
        buf.put_u16_le(wire::text_len(&self.file_name, wide));
        wire::put_text(buf, &self.file_name, wide);
        wire::put_bytes(buf, &self.context);
    }
}

/// READ response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    pub remaining: u16,
    pub data: Vec<u8>,
}

impl ReadResponse {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        let mut cur = Cursor::new(input);
        let remaining = cur.read_u16().map_err(SmbError::in_body)?;
        let data = cur.read_bytes().map_err(SmbError::in_body)?;
        Ok(ReadResponse { remaining, data })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.remaining);   // Remaining
        wire::put_bytes(buf, &self.data); // Data
    }
}
