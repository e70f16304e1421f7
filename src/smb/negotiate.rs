//! NEGOTIATE command.
//!
//! Request: DialectCount(2) + Dialects(2 each).
//! Response: Dialect(2) + SecurityMode(1) + MaxBufferSize(4) + MaxMpxCount(2) +
//! Capabilities(4) + SystemTime(8) + TimeZone(2) + DomainNameLength(2) +
//! ServerNameLength(2), then Challenge blob, DomainName and ServerName
//! (always UTF-16LE).

use bytes::{BufMut, BytesMut};
use std::time::SystemTime;

use crate::error::SmbError;
use crate::smb::wire::{self, Cursor};
use crate::smb::Dialect;
use crate::vfs::system_time_to_filetime;

/// Length of the authentication challenge issued with every negotiation.
pub const CHALLENGE_LEN: usize = 8;

/// Current time as a Windows FILETIME, for the NEGOTIATE response.
pub fn now_as_filetime() -> u64 {
    system_time_to_filetime(SystemTime::now())
}

/// Pick the first dialect in the client's order that the server supports.
/// Unknown values are skipped.
pub fn select_dialect(offered: &[u16], supported: &[Dialect]) -> Option<Dialect> {
    offered
        .iter()
        .filter_map(|&v| Dialect::from_u16(v))
        .find(|d| supported.contains(d))
}

/// Parsed NEGOTIATE request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiateRequest {
    /// Raw dialect values in client order, including ones we don't know.
    pub dialects: Vec<u16>,
}

impl NegotiateRequest {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        let mut cur = Cursor::new(input);
        let count = cur.read_u16().map_err(SmbError::in_body)? as usize;
        if count * 2 > cur.remaining() {
            return Err(SmbError::MalformedBody);
        }
        let mut dialects = Vec::with_capacity(count);
        for _ in 0..count {
            dialects.push(cur.read_u16().map_err(SmbError::in_body)?);
        }
        Ok(NegotiateRequest { dialects })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        let count = self.dialects.len().min(u16::MAX as usize);
        buf.put_u16_le(count as u16);
        for &d in &self.dialects[..count] {
            buf.put_u16_le(d);
        }
    }
}

/// NEGOTIATE response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiateResponse {
    pub dialect: u16,
    pub security_mode: u8,
    pub max_buffer_size: u32,
    pub max_mpx_count: u16,
    pub capabilities: u32,
    /// Server time as a Windows FILETIME.
    pub system_time: u64,
    /// Server offset from UTC in minutes.
    pub time_zone: i16,
    pub challenge: Vec<u8>,
    pub domain_name: String,
    pub server_name: String,
}

impl NegotiateResponse {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        Self::parse_inner(&mut Cursor::new(input)).map_err(SmbError::in_body)
    }

    fn parse_inner(cur: &mut Cursor<'_>) -> Result<Self, SmbError> {
        let dialect = cur.read_u16()?;
        let security_mode = cur.read_u8()?;
        let max_buffer_size = cur.read_u32()?;
        let max_mpx_count = cur.read_u16()?;
        let capabilities = cur.read_u32()?;
        let system_time = cur.read_u64()?;
        let time_zone = cur.read_i16()?;
        let domain_len = cur.read_u16()?;
        let server_len = cur.read_u16()?;

        let challenge = cur.read_bytes()?;
        let domain_name = cur.read_text(domain_len, true)?;
        let server_name = cur.read_text(server_len, true)?;

        Ok(NegotiateResponse {
            dialect,
            security_mode,
            max_buffer_size,
            max_mpx_count,
            capabilities,
            system_time,
            time_zone,
            challenge,
            domain_name,
            server_name,
        })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.dialect);                              // Dialect
        buf.put_u8(self.security_mode);                            // SecurityMode
        buf.put_u32_le(self.max_buffer_size);                      // MaxBufferSize
        buf.put_u16_le(self.max_mpx_count);                        // MaxMpxCount
        buf.put_u32_le(self.capabilities);                         // Capabilities
        buf.put_u64_le(self.system_time);                          // SystemTime
        buf.put_i16_le(self.time_zone);                            // TimeZone
        buf.put_u16_le(wire::text_len(&self.domain_name, true));   // DomainNameLength
        buf.put_u16_le(wire::text_len(&self.server_name, true));   // ServerNameLength
        wire::put_bytes(buf, &self.challenge);                     // Challenge
        wire::put_text(buf, &self.domain_name, true);              // DomainName
        wire::put_text(buf, &self.server_name, true);              // ServerName
    }
}
