//! Message header shared by every command.
//!
//! Layout (little-endian): Signature(4) + Command(2) + Status(4) + Flags(4) +
//! Flags2(4) + Reserved(4) + TreeId(4) + ProcessId(2) + UserId(2) +
//! MultiplexId(2) = 32 bytes.

use bytes::{BufMut, BytesMut};

use crate::error::SmbError;
use crate::smb::status::Status;
use crate::smb::wire::Cursor;

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Protocol signature: 0xFF 'S' 'M' 'B'
pub const PROTOCOL_SIGNATURE: [u8; 4] = [0xFF, b'S', b'M', b'B'];

/// Flags: message is a reply (server to client)
pub const FLAGS_REPLY: u32 = 0x0000_0080;

/// Parsed header. Routing identifiers are carried through unmodified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub command: u16,
    pub status: Status,
    pub flags: u32,
    pub flags2: u32,
    pub reserved: u32,
    pub tree_id: u32,
    pub process_id: u16,
    /// Session identifier assigned by SESSION_SETUP.
    pub user_id: u16,
    /// Client-chosen sequence id echoed in the reply.
    pub multiplex_id: u16,
}

impl Header {
    /// Parse a header from the start of a message.
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        if input.len() < HEADER_SIZE {
            return Err(SmbError::MalformedHeader);
        }
        let mut cur = Cursor::new(input);
        let signature: [u8; 4] = cur.read_array()?;
        if signature != PROTOCOL_SIGNATURE {
            return Err(SmbError::BadSignature);
        }
        Ok(Header {
            command: cur.read_u16()?,
            status: Status::from_u32(cur.read_u32()?),
            flags: cur.read_u32()?,
            flags2: cur.read_u32()?,
            reserved: cur.read_u32()?,
            tree_id: cur.read_u32()?,
            process_id: cur.read_u16()?,
            user_id: cur.read_u16()?,
            multiplex_id: cur.read_u16()?,
        })
    }

    /// Serialize this header into the buffer.
    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_slice(&PROTOCOL_SIGNATURE);     // 0..4
        buf.put_u16_le(self.command);           // 4..6
        buf.put_u32_le(self.status.as_u32());   // 6..10
        buf.put_u32_le(self.flags);             // 10..14
        buf.put_u32_le(self.flags2);            // 14..18
        buf.put_u32_le(self.reserved);          // 18..22
        buf.put_u32_le(self.tree_id);           // 22..26
        buf.put_u16_le(self.process_id);        // 26..28
        buf.put_u16_le(self.user_id);           // 28..30
        buf.put_u16_le(self.multiplex_id);      // 30..32
    }

    /// Create a reply header corresponding to a request header.
    pub fn reply(req: &Header, status: Status) -> Self {
        Header {
            command: req.command,
            status,
            flags: req.flags | FLAGS_REPLY,
            flags2: req.flags2,
            reserved: 0,
            tree_id: req.tree_id,
            process_id: req.process_id,
            user_id: req.user_id,
            multiplex_id: req.multiplex_id,
        }
    }
}
