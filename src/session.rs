//! Per-connection protocol state: negotiated dialect, sessions, tree
//! attachments and open handles.
//!
//! Identifiers are allocated in two steps. `peek_*` reports the id the next
//! insertion will use (or `TooManyOpenFiles` once the space is spent), the
//! caller consults its collaborators, and only a successful outcome is
//! committed. Counters only move forward, so an id is never handed out
//! twice on one connection.

use std::collections::HashMap;

use crate::error::SmbError;
use crate::share::Share;
use crate::smb::create::wants_write;
use crate::smb::Dialect;

/// Authentication progress of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// The authenticator asked for another leg.
    Pending,
    Established { user: String, guest: bool },
}

/// A file opened through CREATE.
#[derive(Debug)]
pub struct OpenHandle<H> {
    pub handle: H,
    /// Name as the client sent it.
    pub path: String,
    /// Access mask granted at open.
    pub access: u32,
}

impl<H> OpenHandle<H> {
    pub fn can_write(&self) -> bool {
        wants_write(self.access)
    }
}

/// A share attached by TREE_CONNECT.
#[derive(Debug)]
pub struct Tree<H> {
    pub share: Share,
    handles: HashMap<u16, OpenHandle<H>>,
    next_fid: u32,
}

impl<H> Tree<H> {
    pub fn new(share: Share) -> Self {
        Tree {
            share,
            handles: HashMap::new(),
            next_fid: 1,
        }
    }

    /// The FID the next `insert_handle` will use.
    pub fn peek_fid(&self) -> Result<u16, SmbError> {
        u16::try_from(self.next_fid).map_err(|_| SmbError::TooManyOpenFiles)
    }

    pub fn insert_handle(&mut self, fid: u16, open: OpenHandle<H>) {
        self.handles.insert(fid, open);
        self.next_fid = self.next_fid.max(fid as u32 + 1);
    }

    pub fn handle(&self, fid: u16) -> Result<&OpenHandle<H>, SmbError> {
        self.handles.get(&fid).ok_or(SmbError::InvalidHandle(fid))
    }

    pub fn take_handle(&mut self, fid: u16) -> Result<OpenHandle<H>, SmbError> {
        self.handles.remove(&fid).ok_or(SmbError::InvalidHandle(fid))
    }

    pub fn open_count(&self) -> usize {
        self.handles.len()
    }

    pub fn into_handles(self) -> Vec<OpenHandle<H>> {
        self.handles.into_values().collect()
    }
}

/// An authenticated (or authenticating) user on this connection.
#[derive(Debug)]
pub struct Session<H> {
    pub auth: AuthState,
    trees: HashMap<u32, Tree<H>>,
}

impl<H> Session<H> {
    pub fn new(auth: AuthState) -> Self {
        Session {
            auth,
            trees: HashMap::new(),
        }
    }

    pub fn is_established(&self) -> bool {
        matches!(self.auth, AuthState::Established { .. })
    }

    pub fn tree_mut(&mut self, tree_id: u32) -> Option<&mut Tree<H>> {
        self.trees.get_mut(&tree_id)
    }

    pub fn remove_tree(&mut self, tree_id: u32) -> Option<Tree<H>> {
        self.trees.remove(&tree_id)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn into_handles(self) -> Vec<OpenHandle<H>> {
        self.trees.into_values().flat_map(Tree::into_handles).collect()
    }
}

/// Everything a connection remembers between messages.
#[derive(Debug)]
pub struct ConnectionState<H> {
    dialect: Option<Dialect>,
    challenge: [u8; 8],
    sessions: HashMap<u16, Session<H>>,
    next_session_id: u32,
    next_tree_id: u64,
}

impl<H> Default for ConnectionState<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> ConnectionState<H> {
    pub fn new() -> Self {
        ConnectionState {
            dialect: None,
            challenge: [0; 8],
            sessions: HashMap::new(),
            next_session_id: 1,
            next_tree_id: 1,
        }
    }

    pub fn dialect(&self) -> Option<Dialect> {
        self.dialect
    }

    /// The challenge issued at negotiation, once there has been one.
    pub fn challenge(&self) -> Option<[u8; 8]> {
        self.dialect.map(|_| self.challenge)
    }

    pub fn set_negotiated(&mut self, dialect: Dialect, challenge: [u8; 8]) {
        self.dialect = Some(dialect);
        self.challenge = challenge;
    }

    pub fn has_session(&self, user_id: u16) -> bool {
        self.sessions.contains_key(&user_id)
    }

    pub fn session(&self, user_id: u16) -> Option<&Session<H>> {
        self.sessions.get(&user_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// The session id the next `commit_session` will use.
    pub fn peek_session_id(&self) -> Result<u16, SmbError> {
        u16::try_from(self.next_session_id).map_err(|_| SmbError::TooManyOpenFiles)
    }

    pub fn commit_session(&mut self, user_id: u16, session: Session<H>) {
        self.sessions.insert(user_id, session);
        self.next_session_id = self.next_session_id.max(user_id as u32 + 1);
    }

    /// Record the outcome of an authentication leg, creating the session if
    /// it doesn't exist yet.
    pub fn set_auth(&mut self, user_id: u16, auth: AuthState) {
        match self.sessions.get_mut(&user_id) {
            Some(session) => session.auth = auth,
            None => self.commit_session(user_id, Session::new(auth)),
        }
    }

    pub fn remove_session(&mut self, user_id: u16) -> Option<Session<H>> {
        self.sessions.remove(&user_id)
    }

    /// An established session, or `SequenceError`.
    pub fn established_mut(&mut self, user_id: u16) -> Result<&mut Session<H>, SmbError> {
        self.sessions
            .get_mut(&user_id)
            .filter(|s| s.is_established())
            .ok_or(SmbError::SequenceError)
    }

    /// The tree named by a request's routing ids, or `SequenceError`.
    pub fn tree_mut(&mut self, user_id: u16, tree_id: u32) -> Result<&mut Tree<H>, SmbError> {
        self.established_mut(user_id)?
            .tree_mut(tree_id)
            .ok_or(SmbError::SequenceError)
    }

    /// The tree id the next `commit_tree` will use.
    pub fn peek_tree_id(&self) -> Result<u32, SmbError> {
        u32::try_from(self.next_tree_id).map_err(|_| SmbError::TooManyOpenFiles)
    }

    pub fn commit_tree(&mut self, user_id: u16, tree_id: u32, tree: Tree<H>) -> Result<(), SmbError> {
        let session = self.established_mut(user_id)?;
        session.trees.insert(tree_id, tree);
        self.next_tree_id = self.next_tree_id.max(tree_id as u64 + 1);
        Ok(())
    }

    /// Forget every session, returning all handles still open.
    pub fn drain_handles(&mut self) -> Vec<OpenHandle<H>> {
        self.sessions
            .drain()
            .flat_map(|(_, session)| session.into_handles())
            .collect()
    }
}
