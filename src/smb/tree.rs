//! TREE_CONNECT and TREE_DISCONNECT commands.
//!
//! TREE_CONNECT request: Flags(2) + PathLength(2) + ServiceLength(2), then
//! Path (e.g. `\\server\share`), Service and the Password blob.
//! TREE_DISCONNECT has no body in either direction.

use bytes::{BufMut, BytesMut};

use crate::error::SmbError;
use crate::smb::wire::{self, Cursor};
use crate::smb;

/// Share type constants.
pub const SHARE_TYPE_DISK: u8 = 0x01;

/// Maximal access masks reported for a tree.
pub const FILE_ALL_ACCESS: u32 = 0x001F_01FF;
pub const FILE_GENERIC_READ: u32 = 0x0012_0089;

/// Parsed TREE_CONNECT request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConnectRequest {
    pub flags: u16,
    pub path: String,
    pub service: String,
    pub password: Vec<u8>,
}

impl TreeConnectRequest {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        Self::parse_inner(&mut Cursor::new(input)).map_err(SmbError::in_body)
    }

    fn parse_inner(cur: &mut Cursor<'_>) -> Result<Self, SmbError> {
        let flags = cur.read_u16()?;
        let path_len = cur.read_u16()?;
        let service_len = cur.read_u16()?;

        let wide = smb::is_unicode(flags);
        let path = cur.read_text(path_len, wide)?;
        let service = cur.read_text(service_len, wide)?;
        let password = cur.read_bytes()?;

        Ok(TreeConnectRequest { flags, path, service, password })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        let wide = smb::is_unicode(self.flags);
        buf.put_u16_le(self.flags);
        buf.put_u16_le(wire::text_len(&self.path, wide));
        buf.put_u16_le(wire::text_len(&self.service, wide));
        wire::put_text(buf, &self.path, wide);
        wire::put_text(buf, &self.service, wide);
        wire::put_bytes(buf, &self.password);
    }

    /// The share name: the last `\`-separated component of the path.
    pub fn share_name(&self) -> &str {
        self.path
            .trim_end_matches('\0')
            .rsplit('\\')
            .next()
            .unwrap_or(&self.path)
    }
}

/// TREE_CONNECT response. The tree id travels in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConnectResponse {
    pub optional_support: u16,
    pub maximal_access: u32,
    pub share_type: u8,
}

impl TreeConnectResponse {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        Self::parse_inner(&mut Cursor::new(input)).map_err(SmbError::in_body)
    }

    fn parse_inner(cur: &mut Cursor<'_>) -> Result<Self, SmbError> {
        Ok(TreeConnectResponse {
            optional_support: cur.read_u16()?,
            maximal_access: cur.read_u32()?,
            share_type: cur.read_u8()?,
        })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.optional_support); // OptionalSupport
        buf.put_u32_le(self.maximal_access);   // MaximalAccess
        buf.put_u8(self.share_type);           // ShareType
    }
}
