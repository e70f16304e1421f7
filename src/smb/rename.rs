//! RENAME command.
//!
//! Request: Flags(2) + SearchAttributes(2) + OldNameLength(2) +
//! NewNameLength(2), then OldName, NewName and the context blob.
//! The response has no body.

use bytes::{BufMut, BytesMut};

use crate::error::SmbError;
use crate::smb::wire::{self, Cursor};
use crate::smb;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRequest {
    pub flags: u16,
    pub search_attributes: u16,
    pub old_name: String,
    pub new_name: String,
    pub context: Vec<u8>,
}

impl RenameRequest {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        Self::parse_inner(&mut Cursor::new(input)).map_err(SmbError::in_body)
    }

    fn parse_inner(cur: &mut Cursor<'_>) -> Result<Self, SmbError> {
        let flags = cur.read_u16()?;
        let search_attributes = cur.read_u16()?;
        let old_len = cur.read_u16()?;
        let new_len = cur.read_u16()?;

        let wide = smb::is_unicode(flags);
        let old_name = cur.read_text(old_len, wide)?;
        let new_name = cur.read_text(new_len, wide)?;
        let context = cur.read_bytes()?;

        Ok(RenameRequest { flags, search_attributes, old_name, new_name, context })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        let wide = smb::is_unicode(self.flags);
        buf.put_u16_le(self.flags);
        buf.put_u16_le(self.search_attributes);
        buf.put_u16_le(wire::text_len(&self.old_name, wide));
        buf.put_u16_le(wire::text_len(&self.new_name, wide));
        wire::put_text(buf, &self.old_name, wide);
        wire::put_text(buf, &self.new_name, wide);
        wire::put_bytes(buf, &self.context);
    }
}
