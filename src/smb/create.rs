//! CREATE command (open or create a file/directory).
//!
//! Request: Flags(2) + NameLength(2) + DesiredAccess(4) + AllocationSize(8) +
//! FileAttributes(4) + ShareAccess(4) + CreateDisposition(4) +
//! CreateOptions(4) + ImpersonationLevel(4) + SecurityFlags(1) = 37 bytes
//! fixed, then FileName and the context blob.
//! Response: Fid(2) + CreateAction(4) + file information record.

use bytes::{BufMut, BytesMut};

use crate::error::SmbError;
use crate::smb::query::FileInformation;
use crate::smb::wire::{self, Cursor};
use crate::smb;

// Create disposition values
pub const FILE_SUPERSEDE: u32 = 0;
pub const FILE_OPEN: u32 = 1;
pub const FILE_CREATE: u32 = 2;
pub const FILE_OPEN_IF: u32 = 3;
pub const FILE_OVERWRITE: u32 = 4;
pub const FILE_OVERWRITE_IF: u32 = 5;

// Create options flags
pub const FILE_DIRECTORY_FILE: u32 = 0x0000_0001;

// Create action values (response)
pub const FILE_OPENED: u32 = 1;
pub const FILE_CREATED: u32 = 2;

// Desired access flags
pub const FILE_READ_DATA: u32 = 0x0000_0001;
pub const FILE_WRITE_DATA: u32 = 0x0000_0002;
pub const FILE_APPEND_DATA: u32 = 0x0000_0004;
pub const FILE_WRITE_EA: u32 = 0x0000_0010;
pub const FILE_WRITE_ATTRIBUTES: u32 = 0x0000_0100;
pub const DELETE: u32 = 0x0001_0000;
pub const GENERIC_READ: u32 = 0x8000_0000;
pub const GENERIC_WRITE: u32 = 0x4000_0000;
pub const GENERIC_ALL: u32 = 0x1000_0000;
pub const MAXIMUM_ALLOWED: u32 = 0x0200_0000;

/// Any of these bits asks to modify the file or its metadata.
pub const WRITE_ACCESS_MASK: u32 = FILE_WRITE_DATA
    | FILE_APPEND_DATA
    | FILE_WRITE_EA
    | FILE_WRITE_ATTRIBUTES
    | DELETE
    | GENERIC_WRITE
    | GENERIC_ALL
    | MAXIMUM_ALLOWED;

// File attributes
pub const FILE_ATTRIBUTE_READONLY: u32 = 0x0000_0001;
pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x0000_0010;
pub const FILE_ATTRIBUTE_ARCHIVE: u32 = 0x0000_0020;
pub const FILE_ATTRIBUTE_NORMAL: u32 = 0x0000_0080;

/// Whether an access mask requests any form of write.
pub fn wants_write(access: u32) -> bool {
    access & WRITE_ACCESS_MASK != 0
}

/// Whether a disposition can create, truncate or replace the target.
pub fn disposition_modifies(disposition: u32) -> bool {
    disposition != FILE_OPEN
}

/// Parsed CREATE request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub flags: u16,
    pub desired_access: u32,
    pub allocation_size: u64,
    pub file_attributes: u32,
    pub share_access: u32,
    pub create_disposition: u32,
    pub create_options: u32,
    pub impersonation_level: u32,
    pub security_flags: u8,
    pub file_name: String,
    pub context: Vec<u8>,
}

impl CreateRequest {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        Self::parse_inner(&mut Cursor::new(input)).map_err(SmbError::in_body)
    }

    fn parse_inner(cur: &mut Cursor<'_>) -> Result<Self, SmbError> {
        let flags = cur.read_u16()?;
        let name_len = cur.read_u16()?;
        let desired_access = cur.read_u32()?;
        let allocation_size = cur.read_u64()?;
        let file_attributes = cur.read_u32()?;
        let share_access = cur.read_u32()?;
        let create_disposition = cur.read_u32()?;
        let create_options = cur.read_u32()?;
        let impersonation_level = cur.read_u32()?;
        let security_flags = cur.read_u8()?;

        let file_name = cur.read_text(name_len, smb::is_unicode(flags))?;
        let context = cur.read_bytes()?;

        Ok(CreateRequest {
            flags,
            desired_access,
            allocation_size,
            file_attributes,
            share_access,
            create_disposition,
            create_options,
            impersonation_level,
            security_flags,
            file_name,
            context,
        })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        let wide = smb::is_unicode(self.flags);
        buf.put_u16_le(self.flags);                                // 0..2
        buf.put_u16_le(wire::text_len(&self.file_name, wide));     // 2..4
        buf.put_u32_le(self.desired_access);                       // 4..8
        buf.put_u64_le(self.allocation_size);                      // 8..16
        buf.put_u32_le(self.file_attributes);                      // 16..20
        buf.put_u32_le(self.share_access);                         // 20..24
        buf.put_u32_le(self.create_disposition);                   // 24..28
        buf.put_u32_le(self.create_options);                       // 28..32
        buf.put_u32_le(self.impersonation_level);                  // 32..36
        buf.put_u8(self.security_flags);                           // 36
        wire::put_text(buf, &self.file_name, wide);
        wire::put_bytes(buf, &self.context);
    }

    pub fn is_directory(&self) -> bool {
        self.create_options & FILE_DIRECTORY_FILE != 0
    }
}

/// CREATE response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResponse {
    pub fid: u16,
    pub create_action: u32,
    pub info: FileInformation,
}

impl CreateResponse {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        Self::parse_inner(&mut Cursor::new(input)).map_err(SmbError::in_body)
    }

    fn parse_inner(cur: &mut Cursor<'_>) -> Result<Self, SmbError> {
        let fid = cur.read_u16()?;
        let create_action = cur.read_u32()?;
        let info = FileInformation::parse(cur)?;
        Ok(CreateResponse { fid, create_action, info })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.fid);           // Fid
        buf.put_u32_le(self.create_action); // CreateAction
        self.info.serialize(buf);           // FileInformation
    }
}
