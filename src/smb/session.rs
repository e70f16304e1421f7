//! SESSION_SETUP command. LOGOFF has no body in either direction.
//!
//! Request: Flags(2) + MaxBufferSize(2) + MaxMpxCount(2) + VcNumber(2) +
//! SessionKey(4) + Capabilities(4) + AccountNameLength(2), then AccountName
//! and the SecurityBlob.
//! Response: Action(2), then the SecurityBlob.

use bytes::{BufMut, BytesMut};

use crate::error::SmbError;
use crate::smb::wire::{self, Cursor};
use crate::smb;

/// Action flag: the session was established as guest.
pub const ACTION_GUEST: u16 = 0x0001;

/// Parsed SESSION_SETUP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetupRequest {
    pub flags: u16,
    pub max_buffer_size: u16,
    pub max_mpx_count: u16,
    pub vc_number: u16,
    pub session_key: u32,
    pub capabilities: u32,
    pub account_name: String,
    /// Opaque credential material handed to the authenticator.
    pub security_blob: Vec<u8>,
}

impl SessionSetupRequest {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        Self::parse_inner(&mut Cursor::new(input)).map_err(SmbError::in_body)
    }

    fn parse_inner(cur: &mut Cursor<'_>) -> Result<Self, SmbError> {
        let flags = cur.read_u16()?;
        let max_buffer_size = cur.read_u16()?;
        let max_mpx_count = cur.read_u16()?;
        let vc_number = cur.read_u16()?;
        let session_key = cur.read_u32()?;
        let capabilities = cur.read_u32()?;
        let account_len = cur.read_u16()?;

        let account_name = cur.read_text(account_len, smb::is_unicode(flags))?;
        let security_blob = cur.read_bytes()?;

        Ok(SessionSetupRequest {
            flags,
            max_buffer_size,
            max_mpx_count,
            vc_number,
            session_key,
            capabilities,
            account_name,
            security_blob,
        })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        let wide = smb::is_unicode(self.flags);
        buf.put_u16_le(self.flags);
        buf.put_u16_le(self.max_buffer_size);
        buf.put_u16_le(self.max_mpx_count);
        buf.put_u16_le(self.vc_number);
        buf.put_u32_le(self.session_key);
        buf.put_u32_le(self.capabilities);
        buf.put_u16_le(wire::text_len(&self.account_name, wide));
        wire::put_text(buf, &self.account_name, wide);
        wire::put_bytes(buf, &self.security_blob);
    }
}

/// SESSION_SETUP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetupResponse {
    pub action: u16,
    pub security_blob: Vec<u8>,
}

impl SessionSetupResponse {
    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        let mut cur = Cursor::new(input);
        let action = cur.read_u16().map_err(SmbError::in_body)?;
        let security_blob = cur.read_bytes().map_err(SmbError::in_body)?;
        Ok(SessionSetupResponse { action, security_blob })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.action);               // Action
        wire::put_bytes(buf, &self.security_blob); // SecurityBlob
    }
}
