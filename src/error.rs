//! Error types for the SMB server.
//!
//! `SmbError` is the outcome of handling a single message; every variant
//! maps to exactly one wire status. `ServerError` covers failures that end
//! a connection.

use bytes::{BufMut, BytesMut};
use std::fmt;

use crate::smb::status::{ErrorClass, Status};
use crate::smb::wire::Cursor;

/// Failure while handling a single message.
#[derive(Debug)]
pub enum SmbError {
    /// A primitive read ran past the end of the buffer.
    Truncated,
    /// The buffer is shorter than the fixed header.
    MalformedHeader,
    /// A command body's fixed prefix or declared lengths don't fit the buffer.
    MalformedBody,
    /// The protocol signature doesn't match.
    BadSignature,
    /// Wide text contained an unpaired surrogate.
    InvalidEncoding,
    /// No codec is registered for this command code.
    UnknownCommand(u16),
    /// The command isn't legal in the connection's current state.
    SequenceError,
    /// None of the client's offered dialects is supported.
    DialectNotSupported,
    /// The FID doesn't name an open handle in the current tree.
    InvalidHandle(u16),
    /// The share name doesn't resolve.
    BadShareName(String),
    /// The authenticator rejected the session.
    LogonFailure,
    /// The share or handle doesn't permit the requested access.
    AccessDenied,
    /// No identifier left to allocate.
    TooManyOpenFiles,
    /// The request is well-formed but asks for something not implemented.
    NotSupported,
    /// An error from the storage collaborator.
    Io(std::io::Error),
}

impl SmbError {
    /// Truncation inside a command body is reported as a malformed body.
    pub fn in_body(self) -> Self {
        match self {
            Self::Truncated => Self::MalformedBody,
            e => e,
        }
    }
}

impl fmt::Display for SmbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "Message truncated"),
            Self::MalformedHeader => write!(f, "Malformed header"),
            Self::MalformedBody => write!(f, "Malformed command body"),
            Self::BadSignature => write!(f, "Bad protocol signature"),
            Self::InvalidEncoding => write!(f, "Invalid text encoding"),
            Self::UnknownCommand(c) => write!(f, "Unknown command 0x{:02x}", c),
            Self::SequenceError => write!(f, "Command not valid in current state"),
            Self::DialectNotSupported => write!(f, "No supported dialect offered"),
            Self::InvalidHandle(fid) => write!(f, "Invalid file handle {}", fid),
            Self::BadShareName(name) => write!(f, "Unknown share '{}'", name),
            Self::LogonFailure => write!(f, "Logon failure"),
            Self::AccessDenied => write!(f, "Access denied"),
            Self::TooManyOpenFiles => write!(f, "Identifier space exhausted"),
            Self::NotSupported => write!(f, "Not supported"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for SmbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SmbError {
    fn from(e: std::io::Error) -> Self {
        SmbError::Io(e)
    }
}

/// Failure that terminates a connection.
#[derive(Debug)]
pub enum ServerError {
    /// Transport read or write failed.
    Io(std::io::Error),
    /// The client sent nothing within the configured idle timeout.
    IdleTimeout,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::IdleTimeout => write!(f, "Idle timeout"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Io(e)
    }
}

/// Map an `std::io::Error` from storage to the most appropriate status.
pub fn io_to_status(e: &std::io::Error) -> Status {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::NotFound => Status::ObjectNameNotFound,
        ErrorKind::PermissionDenied => Status::AccessDenied,
        ErrorKind::AlreadyExists => Status::ObjectNameCollision,
        ErrorKind::InvalidInput => Status::InvalidParameter,
        ErrorKind::UnexpectedEof
        | ErrorKind::WriteZero
        | ErrorKind::Interrupted
        | ErrorKind::TimedOut => Status::InvalidDevice,
        _ => Status::NotSupported,
    }
}

/// Map an `SmbError` to the status placed in the response header.
pub fn error_to_status(e: &SmbError) -> Status {
    match e {
        SmbError::Truncated | SmbError::MalformedHeader | SmbError::MalformedBody => {
            Status::InvalidParameter
        }
        SmbError::BadSignature => Status::InvalidNetworkResponse,
        SmbError::InvalidEncoding => Status::ObjectNameInvalid,
        SmbError::UnknownCommand(_) => Status::InvalidFunction,
        SmbError::SequenceError => Status::BadCommand,
        SmbError::DialectNotSupported | SmbError::NotSupported => Status::NotSupported,
        SmbError::InvalidHandle(_) => Status::InvalidHandle,
        SmbError::BadShareName(_) => Status::BadNetworkName,
        SmbError::LogonFailure => Status::IncorrectPassword,
        SmbError::AccessDenied => Status::AccessDenied,
        SmbError::TooManyOpenFiles => Status::TooManyOpenFiles,
        SmbError::Io(io_err) => io_to_status(io_err),
    }
}

/// Body of every error response.
///
/// ErrorClass(1) + Reserved(1) + ErrorCode(4) + Reserved(4) = 10 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error_class: ErrorClass,
    pub error_code: u32,
}

impl ErrorResponse {
    pub const SIZE: usize = 10;

    pub fn from_status(status: Status) -> Self {
        ErrorResponse {
            error_class: status.error_class(),
            error_code: status.as_u32(),
        }
    }

    pub fn parse(input: &[u8]) -> Result<Self, SmbError> {
        let mut cur = Cursor::new(input);
        let class = cur.read_u8().map_err(SmbError::in_body)?;
        let _reserved = cur.read_u8().map_err(SmbError::in_body)?;
        let error_code = cur.read_u32().map_err(SmbError::in_body)?;
        let error_class = ErrorClass::from_u8(class).ok_or(SmbError::MalformedBody)?;
        Ok(ErrorResponse { error_class, error_code })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u8(self.error_class as u8); // ErrorClass
        buf.put_u8(0);                      // Reserved
        buf.put_u32_le(self.error_code);    // ErrorCode
        buf.put_u32_le(0);                  // Reserved
    }
}
