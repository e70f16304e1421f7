//! SMB protocol types: header, command codes, dialects, and per-command codecs.
//!
//! Every message is a 32-byte header followed by a command body. Bodies use a
//! fixed little-endian prefix followed by a variable region of length-prefixed
//! text and byte blobs; bit `FLAG_UNICODE` in each command's own flags word
//! selects UTF-16LE text over one byte per character.

pub mod wire;
pub mod header;
pub mod status;
pub mod message;
pub mod negotiate;
pub mod session;
pub mod tree;
pub mod create;
pub mod close;
pub mod flush;
pub mod read;
pub mod write;
pub mod delete;
pub mod rename;
pub mod query;

/// Per-command flag: text fields are UTF-16LE, two bytes per character.
pub const FLAG_UNICODE: u16 = 0x8000;

/// Whether a command's flags word selects wide text.
pub fn is_unicode(flags: u16) -> bool {
    (flags & FLAG_UNICODE) != 0
}

/// Command codes carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    Flush = 0x05,
    Delete = 0x06,
    Rename = 0x07,
    QueryInfo = 0x08,
    SetInfo = 0x09,
    Write = 0x2B,
    Read = 0x2E,
    Create = 0x6D,
    Close = 0x6E,
    TreeDisconnect = 0x71,
    Negotiate = 0x72,
    SessionSetup = 0x73,
    Logoff = 0x74,
    TreeConnect = 0x75,
}

impl Command {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x05 => Some(Self::Flush),
            0x06 => Some(Self::Delete),
            0x07 => Some(Self::Rename),
            0x08 => Some(Self::QueryInfo),
            0x09 => Some(Self::SetInfo),
            0x2B => Some(Self::Write),
            0x2E => Some(Self::Read),
            0x6D => Some(Self::Create),
            0x6E => Some(Self::Close),
            0x71 => Some(Self::TreeDisconnect),
            0x72 => Some(Self::Negotiate),
            0x73 => Some(Self::SessionSetup),
            0x74 => Some(Self::Logoff),
            0x75 => Some(Self::TreeConnect),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Protocol revisions the server knows how to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Dialect {
    Smb202 = 0x0202,
    Smb210 = 0x0210,
    Smb300 = 0x0300,
    Smb302 = 0x0302,
    Smb311 = 0x0311,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Dialect::Smb202,
        Dialect::Smb210,
        Dialect::Smb300,
        Dialect::Smb302,
        Dialect::Smb311,
    ];

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0202 => Some(Self::Smb202),
            0x0210 => Some(Self::Smb210),
            0x0300 => Some(Self::Smb300),
            0x0302 => Some(Self::Smb302),
            0x0311 => Some(Self::Smb311),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

// Security mode bits advertised in the NEGOTIATE response.
pub const SECURITY_MODE_USER_LEVEL: u8 = 0x01;
pub const SECURITY_MODE_ENCRYPT_PASSWORDS: u8 = 0x02;

// Server capability bits.
pub const CAP_NT_STATUS: u32 = 0x0000_0001;
pub const CAP_UNICODE: u32 = 0x0000_0004;
pub const CAP_LARGE_FILES: u32 = 0x0000_0008;
pub const CAP_EXTENDED_SECURITY: u32 = 0x8000_0000;
