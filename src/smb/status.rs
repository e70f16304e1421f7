//! Status codes returned in every response header, and the error class
//! byte carried in error envelopes.

/// Status codes used by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Success,
    MoreProcessingRequired,
    InvalidFunction,
    TooManyOpenFiles,
    AccessDenied,
    InvalidHandle,
    BadCommand,
    NotSupported,
    ObjectNameInvalid,
    ObjectNameNotFound,
    ObjectNameCollision,
    InvalidDevice,
    IncorrectPassword,
    InvalidParameter,
    InvalidNetworkResponse,
    BadNetworkName,
    Other(u32),
}

impl Status {
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Success => 0x0000_0000,
            Self::MoreProcessingRequired => 0xC000_0016,
            Self::InvalidFunction => 0x0000_0001,
            Self::TooManyOpenFiles => 0x0000_0004,
            Self::AccessDenied => 0x0000_0005,
            Self::InvalidHandle => 0x0000_0006,
            Self::BadCommand => 0x0000_0016,
            Self::NotSupported => 0x0000_0032,
            Self::ObjectNameInvalid => 0x0000_0033,
            Self::ObjectNameNotFound => 0x0000_0034,
            Self::ObjectNameCollision => 0x0000_0035,
            Self::InvalidDevice => 0x0000_0047,
            Self::IncorrectPassword => 0x0000_0056,
            Self::InvalidParameter => 0x0000_0057,
            Self::InvalidNetworkResponse => 0x0000_04B2,
            Self::BadNetworkName => 0x0000_04B3,
            Self::Other(v) => *v,
        }
    }

    pub fn from_u32(v: u32) -> Self {
        match v {
            0x0000_0000 => Self::Success,
            0xC000_0016 => Self::MoreProcessingRequired,
            0x0000_0001 => Self::InvalidFunction,
            0x0000_0004 => Self::TooManyOpenFiles,
            0x0000_0005 => Self::AccessDenied,
            0x0000_0006 => Self::InvalidHandle,
            0x0000_0016 => Self::BadCommand,
            0x0000_0032 => Self::NotSupported,
            0x0000_0033 => Self::ObjectNameInvalid,
            0x0000_0034 => Self::ObjectNameNotFound,
            0x0000_0035 => Self::ObjectNameCollision,
            0x0000_0047 => Self::InvalidDevice,
            0x0000_0056 => Self::IncorrectPassword,
            0x0000_0057 => Self::InvalidParameter,
            0x0000_04B2 => Self::InvalidNetworkResponse,
            0x0000_04B3 => Self::BadNetworkName,
            v => Self::Other(v),
        }
    }

    /// Whether a response with this status carries an error envelope
    /// instead of a command body.
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Success | Self::MoreProcessingRequired)
    }

    /// Error class reported alongside the code in the error envelope.
    pub fn error_class(&self) -> ErrorClass {
        match self {
            Self::Success | Self::MoreProcessingRequired => ErrorClass::Success,
            Self::TooManyOpenFiles
            | Self::AccessDenied
            | Self::InvalidHandle
            | Self::ObjectNameInvalid
            | Self::ObjectNameNotFound
            | Self::ObjectNameCollision => ErrorClass::Dos,
            Self::InvalidDevice => ErrorClass::Hardware,
            Self::InvalidParameter | Self::InvalidNetworkResponse => ErrorClass::Protocol,
            Self::InvalidFunction
            | Self::BadCommand
            | Self::NotSupported
            | Self::IncorrectPassword
            | Self::BadNetworkName
            | Self::Other(_) => ErrorClass::Server,
        }
    }
}

/// Error class byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorClass {
    Success = 0x00,
    Dos = 0x01,
    Server = 0x02,
    Hardware = 0x03,
    Protocol = 0x04,
}

impl ErrorClass {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(Self::Success),
            0x01 => Some(Self::Dos),
            0x02 => Some(Self::Server),
            0x03 => Some(Self::Hardware),
            0x04 => Some(Self::Protocol),
            _ => None,
        }
    }
}
