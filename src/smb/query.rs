//! QUERY_INFO and SET_INFO commands, plus the file information records they
//! carry.
//!
//! Both requests: Flags(2) + InformationLevel(2) + Fid(2) + NameLength(2),
//! then FileName. QUERY_INFO ends with a context blob, SET_INFO with the
//! encoded information record. A FID of 0 addresses the file by name.

use bytes::{BufMut, BytesMut};

use crate::error::SmbError;
use crate::smb::wire::{self, Cursor};
use crate::smb;

/// Timestamps and attributes.
pub const INFO_BASIC: u16 = 0x0101;
/// Sizes and the directory flag.
pub const INFO_STANDARD: u16 = 0x0102;
/// New end-of-file position (SET_INFO only).
pub const INFO_END_OF_FILE: u16 = 0x0104;
/// Basic followed by standard (QUERY_INFO only).
pub const INFO_ALL: u16 = 0x0107;

/// Size of the record trailing a CREATE response.
pub const FILE_INFORMATION_SIZE: usize = 53;

/// Metadata for an open file or a named path, times as Windows FILETIME.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileInformation {
    pub creation_time: u64,
    pub last_access_time: u64,
    pub last_write_time: u64,
    pub change_time: u64,
    pub file_attributes: u32,
    pub allocation_size: u64,
    pub end_of_file: u64,
    pub directory: bool,
}

impl FileInformation {
    pub fn parse(cur: &mut Cursor<'_>) -> Result<Self, SmbError> {
        let (creation_time, last_access_time, last_write_time, change_time, file_attributes) =
            parse_basic(cur)?;
        let (allocation_size, end_of_file, directory) = parse_standard(cur)?;
        Ok(FileInformation {
            creation_time,
            last_access_time,
            last_write_time,
            change_time,
            file_attributes,
            allocation_size,
            end_of_file,
            directory,
        })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        self.put_basic(buf);
        self.put_standard(buf);
    }

    fn put_basic(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.creation_time);     // CreationTime
        buf.put_u64_le(self.last_access_time);  // LastAccessTime
        buf.put_u64_le(self.last_write_time);   // LastWriteTime
        buf.put_u64_le(self.change_time);       // ChangeTime
        buf.put_u32_le(self.file_attributes);   // FileAttributes
    }

    fn put_standard(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.allocation_size);   // AllocationSize
        buf.put_u64_le(self.end_of_file);       // EndOfFile
        buf.put_u8(self.directory as u8);       // Directory
    }

    /// Encode the record for a QUERY_INFO level.
    pub fn encode_level(&self, level: u16) -> Result<Vec<u8>, SmbError> {
        let mut buf = BytesMut::new();
        match level {
            INFO_BASIC => self.put_basic(&mut buf),
            INFO_STANDARD => self.put_standard(&mut buf),
            INFO_ALL => self.serialize(&mut buf),
            _ => return Err(SmbError::NotSupported),
        }
        Ok(buf.to_vec())
    }
}

fn parse_basic(cur: &mut Cursor<'_>) -> Result<(u64, u64, u64, u64, u32), SmbError> {
    Ok((
        cur.read_u64()?,
        cur.read_u64()?,
        cur.read_u64()?,
        cur.read_u64()?,
        cur.read_u32()?,
    ))
}

fn parse_standard(cur: &mut Cursor<'_>) -> Result<(u64, u64, bool), SmbError> {
    Ok((cur.read_u64()?, cur.read_u64()?, cur.read_u8()? != 0))
}

/// A change requested by SET_INFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoChange {
    /// Zero times and attributes mean "leave unchanged".
    Basic {
        creation_time: u64,
        last_access_time: u64,
        last_write_time: u64,
        change_time: u64,
        file_attributes: u32,
    },
    EndOfFile(u64),
}

impl InfoChange {
    /// Decode a SET_INFO record of the given level.
    pub fn decode(level: u16, info: &[u8]) -> Result<Self, SmbError> {
        let mut cur = Cursor::new(info);
        match level {
            INFO_BASIC => {
                let (creation_time, last_access_time, last_write_time, change_time, file_attributes) =
                    parse_basic(&mut cur).map_err(SmbError::in_body)?;
                Ok(InfoChange::Basic {
                    creation_time,
                    last_access_time,
                    last_write_time,
                    change_time,
                    file_attributes,
                })
            }
            INFO_END_OF_FILE => Ok(InfoChange::EndOfFile(
                cur.read_u64().map_err(SmbError::in_body)?,
            )),
            _ => Err(SmbError::NotSupported),
        }
    }

    pub fn encode(&self) -> (u16, Vec<u8>) {
        let mut buf = BytesMut::new();
        let level = match *self {
            InfoChange::Basic {
                creation_time,
                last_access_time,
                last_write_time,
                change_time,
                file_attributes,
            } => {
                buf.put_u64_le(creation_time);
                buf.put_u64_le(last_access_time);
                buf.put_u64_le(last_write_time);
                buf.put_u64_le(change_time);
                buf.put_u32_le(file_attributes);
                INFO_BASIC
            }
            InfoChange::EndOfFile(eof) => {
                buf.put_u64_le(eof);
                INFO_END_OF_FILE
            }
        };
        (level, buf.to_vec())
    }
}

/// Parsed QUERY_INFO request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInfoRequest {
    pub flags: u16,
    pub information_level: u16,
    pub fid: u16,
    pub file_name: String,
    pub context: Vec<u8>,
}

impl QueryInfoRequest {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        Self::parse_inner(&mut Cursor::new(input)).map_err(SmbError::in_body)
    }

    fn parse_inner(cur: &mut Cursor<'_>) -> Result<Self, SmbError> {
        let flags = cur.read_u16()?;
        let information_level = cur.read_u16()?;
        let fid = cur.read_u16()?;
        let name_len = cur.read_u16()?;

        let file_name = cur.read_text(name_len, smb::is_unicode(flags))?;
        let context = cur.read_bytes()?;

        Ok(QueryInfoRequest { flags, information_level, fid, file_name, context })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        let wide = smb::is_unicode(self.flags);
        buf.put_u16_le(self.flags);
        buf.put_u16_le(self.information_level);
        buf.put_u16_le(self.fid);
        buf.put_u16_le(wire::text_len(&self.file_name, wide));
        wire::put_text(buf, &self.file_name, wide);
        wire::put_bytes(buf, &self.context);
    }
}

/// QUERY_INFO response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInfoResponse {
    pub information_level: u16,
    pub info: Vec<u8>,
}

impl QueryInfoResponse {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        let mut cur = Cursor::new(input);
        let information_level = cur.read_u16().map_err(SmbError::in_body)?;
        let info = cur.read_bytes().map_err(SmbError::in_body)?;
        Ok(QueryInfoResponse { information_level, info })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.information_level); // InformationLevel
        wire::put_bytes(buf, &self.info);       // Info
    }
}

/// Parsed SET_INFO request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetInfoRequest {
    pub flags: u16,
    pub information_level: u16,
    pub fid: u16,
    pub file_name: String,
    pub info: Vec<u8>,
}

impl SetInfoRequest {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        Self::parse_inner(&mut Cursor::new(input)).map_err(SmbError::in_body)
    }

    fn parse_inner(cur: &mut Cursor<'_>) -> Result<Self, SmbError> {
        let flags = cur.read_u16()?;
        let information_level = cur.read_u16()?;
        let fid = cur.read_u16()?;
        let name_len = cur.read_u16()?;

        let file_name = cur.read_text(name_len, smb::is_unicode(flags))?;
        let info = cur.read_bytes()?;

        Ok(SetInfoRequest { flags, information_level, fid, file_name, info })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        let wide = smb::is_unicode(self.flags);
        buf.put_u16_le(self.flags);
        buf.put_u16_le(self.information_level);
        buf.put_u16_le(self.fid);
        buf.put_u16_le(wire::text_len(&self.file_name, wide));
        wire::put_text(buf, &self.file_name, wide);
        wire::put_bytes(buf, &self.info);
    }
}
