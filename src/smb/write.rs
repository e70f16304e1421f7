//! WRITE command.
//!
//! Request: Flags(2) + Fid(2) + Offset(8) + Remaining(4) + WriteMode(2) +
//! NameLength(2), then FileName, the context blob and the data blob.
//! Response: Count(4).

use bytes::{BufMut, BytesMut};

use crate::error::SmbError;
use crate::smb::wire::{self, Cursor};
use crate::smb;

/// Parsed WRITE request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub flags: u16,
    pub fid: u16,
    pub offset: u64,
    pub remaining: u32,
    pub write_mode: u16,
    pub file_name: String,
    pub context: Vec<u8>,
    pub data: Vec<u8>,
}

impl WriteRequest {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        Self::parse_inner(&mut Cursor::new(input)).map_err(SmbError::in_body)
    }

    fn parse_inner(cur: &mut Cursor<'_>) -> Result<Self, SmbError> {
        let flags = cur.read_u16()?;
        let fid = cur.read_u16()?;
        let offset = cur.read_u64()?;
        let remaining = cur.read_u32()?;
        let write_mode = cur.read_u16()?;
        let name_len = cur.read_u16()?;

        let file_name = cur.read_text(name_len, smb::is_unicode(flags))?;
        let context = cur.read_bytes()?;
        let data = cur.read_bytes()?;

        Ok(WriteRequest {
            flags,
            fid,
            offset,
            remaining,
            write_mode,
            file_name,
            context,
            data,
        })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        let wide = smb::is_unicode(self.flags);
        buf.put_u16_le(self.flags);
        buf.put_u16_le(self.fid);
        buf.put_u64_le(self.offset);
        buf.put_u32_le(self.remaining);
        buf.put_u16_le(self.write_mode);
        buf.put_u16_le(wire::text_len(&self.file_name, wide));
        wire::put_text(buf, &self.file_name, wide);
        wire::put_bytes(buf, &self.context);
        wire::put_bytes(buf, &self.data);
    }
}

/// WRITE response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResponse {
    pub count: u32,
}

impl WriteResponse {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        let count = Cursor::new(input).read_u32().map_err(SmbError::in_body)?;
        Ok(WriteResponse { count })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.count); // Count
    }
}
