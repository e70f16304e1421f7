#![forbid(unsafe_code)]

//! Protocol engine for an early-dialect SMB file server: the wire codec,
//! the per-connection state machine and the collaborators it drives.

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod server;
pub mod session;
pub mod share;
pub mod smb;
pub mod transport;
pub mod vfs;
