//! FLUSH command.
//!
//! Request: Flags(2) + Fid(2) + NameLength(2), then FileName and the context
//! blob. The response has no body.

use bytes::{BufMut, BytesMut};

use crate::error::SmbError;
use crate::smb::wire::{self, Cursor};
use crate::smb;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushRequest {
    pub flags: u16,
    pub fid: u16,
    pub file_name: String,
    pub context: Vec<u8>,
}

impl FlushRequest {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        Self::parse_inner(&mut Cursor::new(input)).map_err(SmbError::in_body)
    }

    fn parse_inner(cur: &mut Cursor<'_>) -> Result<Self, SmbError> {
        let flags = cur.read_u16()?;
        let fid = cur.read_u16()?;
        let name_len = cur.read_u16()?;
        let file_name = cur.read_text(name_len, smb::is_unicode(flags))?;
        let context = cur.read_bytes()?;
        Ok(FlushRequest { flags, fid, file_name, context })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        let wide = smb::is_unicode(self.flags);
        buf.put_u16_le(self.flags);
        buf.put_u16_le(self.fid);
        buf.put_u16_le(wire::text_len(&self.file_name, wide));
        wire::put_text(buf, &self.file_name, wide);
        wire::put_bytes(buf, &self.context);
    }
}
