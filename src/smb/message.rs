//! Command-level dispatch: one `Request` and one `Response` variant per
//! command, decoded by the header's command code.

use bytes::BytesMut;

use crate::error::SmbError;
use crate::smb::close::CloseRequest;
use crate::smb::create::{CreateRequest, CreateResponse};
use crate::smb::delete::DeleteRequest;
use crate::smb::flush::FlushRequest;
use crate::smb::negotiate::{NegotiateRequest, NegotiateResponse};
use crate::smb::query::{QueryInfoRequest, QueryInfoResponse, SetInfoRequest};
use crate::smb::read::{ReadRequest, ReadResponse};
use crate::smb::rename::RenameRequest;
use crate::smb::session::{SessionSetupRequest, SessionSetupResponse};
use crate::smb::tree::{TreeConnectRequest, TreeConnectResponse};
use crate::smb::write::{WriteRequest, WriteResponse};
use crate::smb::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Negotiate(NegotiateRequest),
    SessionSetup(SessionSetupRequest),
    Logoff,
    TreeConnect(TreeConnectRequest),
    TreeDisconnect,
    Create(CreateRequest),
    Close(CloseRequest),
    Flush(FlushRequest),
    Read(ReadRequest),
    Write(WriteRequest),
    Delete(DeleteRequest),
    Rename(RenameRequest),
    QueryInfo(QueryInfoRequest),
    SetInfo(SetInfoRequest),
}

impl Request {
    /// Decode a body for the given command code.
    pub fn parse(command: u16, body: &[u8]) -> Result<Self, SmbError> {
        let cmd = Command::from_u16(command).ok_or(SmbError::UnknownCommand(command))?;
        Ok(match cmd {
            Command::Negotiate => Request::Negotiate(NegotiateRequest::parse(body)?),
            Command::SessionSetup => Request::SessionSetup(SessionSetupRequest::parse(body)?),
            Command::Logoff => Request::Logoff,
            Command::TreeConnect => Request::TreeConnect(TreeConnectRequest::parse(body)?),
            Command::TreeDisconnect => Request::TreeDisconnect,
            Command::Create => Request::Create(CreateRequest::parse(body)?),
            Command::Close => Request::Close(CloseRequest::parse(body)?),
            Command::Flush => Request::Flush(FlushRequest::parse(body)?),
            Command::Read => Request::Read(ReadRequest::parse(body)?),
            Command::Write => Request::Write(WriteRequest::parse(body)?),
            Command::Delete => Request::Delete(DeleteRequest::parse(body)?),
            Command::Rename => Request::Rename(RenameRequest::parse(body)?),
            Command::QueryInfo => Request::QueryInfo(QueryInfoRequest::parse(body)?),
            Command::SetInfo => Request::SetInfo(SetInfoRequest::parse(body)?),
        })
    }

    pub fn command(&self) -> Command {
        match self {
            Request::Negotiate(_) => Command::Negotiate,
            Request::SessionSetup(_) => Command::SessionSetup,
            Request::Logoff => Command::Logoff,
            Request::TreeConnect(_) => Command::TreeConnect,
            Request::TreeDisconnect => Command::TreeDisconnect,
            Request::Create(_) => Command::Create,
            Request::Close(_) => Command::Close,
            Request::Flush(_) => Command::Flush,
            Request::Read(_) => Command::Read,
            Request::Write(_) => Command::Write,
            Request::Delete(_) => Command::Delete,
            Request::Rename(_) => Command::Rename,
            Request::QueryInfo(_) => Command::QueryInfo,
            Request::SetInfo(_) => Command::SetInfo,
        }
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        match self {
            Request::Negotiate(r) => r.serialize(buf),
            Request::SessionSetup(r) => r.serialize(buf),
            Request::Logoff | Request::TreeDisconnect => {}
            Request::TreeConnect(r) => r.serialize(buf),
            Request::Create(r) => r.serialize(buf),
            Request::Close(r) => r.serialize(buf),
            Request::Flush(r) => r.serialize(buf),
            Request::Read(r) => r.serialize(buf),
            Request::Write(r) => r.serialize(buf),
            Request::Delete(r) => r.serialize(buf),
            Request::Rename(r) => r.serialize(buf),
            Request::QueryInfo(r) => r.serialize(buf),
            Request::SetInfo(r) => r.serialize(buf),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Negotiate(NegotiateResponse),
    SessionSetup(SessionSetupResponse),
    Logoff,
    TreeConnect(TreeConnectResponse),
    TreeDisconnect,
    Create(CreateResponse),
    Close,
    Flush,
    Read(ReadResponse),
    Write(WriteResponse),
    Delete,
    Rename,
    QueryInfo(QueryInfoResponse),
    SetInfo,
}

impl Response {
    /// Decode a successful response body for the given command code.
    pub fn parse(command: u16, body: &[u8]) -> Result<Self, SmbError> {
        let cmd = Command::from_u16(command).ok_or(SmbError::UnknownCommand(command))?;
        Ok(match cmd {
            Command::Negotiate => Response::Negotiate(NegotiateResponse::parse(body)?),
            Command::SessionSetup => Response::SessionSetup(SessionSetupResponse::parse(body)?),
            Command::Logoff => Response::Logoff,
            Command::TreeConnect => Response::TreeConnect(TreeConnectResponse::parse(body)?),
            Command::TreeDisconnect => Response::TreeDisconnect,
            Command::Create => Response::Create(CreateResponse::parse(body)?),
            Command::Close => Response::Close,
            Command::Flush => Response::Flush,
            Command::Read => Response::Read(ReadResponse::parse(body)?),
            Command::Write => Response::Write(WriteResponse::parse(body)?),
            Command::Delete => Response::Delete,
            Command::Rename => Response::Rename,
            Command::QueryInfo => Response::QueryInfo(QueryInfoResponse::parse(body)?),
            Command::SetInfo => Response::SetInfo,
        })
    }

    pub fn command(&self) -> Command {
        match self {
            Response::Negotiate(_) => Command::Negotiate,
            Response::SessionSetup(_) => Command::SessionSetup,
            Response::Logoff => Command::Logoff,
            Response::TreeConnect(_) => Command::TreeConnect,
            Response::TreeDisconnect => Command::TreeDisconnect,
            Response::Create(_) => Command::Create,
            Response::Close => Command::Close,
            Response::Flush => Command::Flush,
            Response::Read(_) => Command::Read,
            Response::Write(_) => Command::Write,
            Response::Delete => Command::Delete,
            Response::Rename => Command::Rename,
            Response::QueryInfo(_) => Command::QueryInfo,
            Response::SetInfo => Command::SetInfo,
        }
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        match self {
            Response::Negotiate(r) => r.serialize(buf),
            Response::SessionSetup(r) => r.serialize(buf),
            Response::TreeConnect(r) => r.serialize(buf),
            Response::Create(r) => r.serialize(buf),
            Response::Read(r) => r.serialize(buf),
            Response::Write(r) => r.serialize(buf),
            Response::QueryInfo(r) => r.serialize(buf),
            Response::Logoff
            | Response::TreeDisconnect
            | Response::Close
            | Response::Flush
            | Response::Delete
            | Response::Rename
            | Response::SetInfo => {}
        }
    }
}
