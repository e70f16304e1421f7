//! SMB server: connection handling and command dispatch.
//!
//! Each TCP connection runs as an independent async task owning one
//! `Connection`. Messages are handled strictly in order: parse the header,
//! decode the body for its command, check the command against the
//! connection state, then call the share, authentication and storage
//! collaborators. Every message gets exactly one reply; wire and sequence
//! errors become error replies and the connection stays open.

use bytes::BytesMut;
use rand::rngs::OsRng;
use rand::RngCore;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::auth::{AccountTable, AuthOutcome, Authenticator};
use crate::config::Config;
use crate::error::{error_to_status, ErrorResponse, ServerError, SmbError};
use crate::session::{AuthState, ConnectionState, OpenHandle, Tree};
use crate::share::{ShareResolver, ShareTable};
use crate::smb::close::CloseRequest;
use crate::smb::create::{self, CreateRequest, CreateResponse};
use crate::smb::delete::DeleteRequest;
use crate::smb::flush::FlushRequest;
use crate::smb::header::{Header, HEADER_SIZE};
use crate::smb::message::{Request, Response};
use crate::smb::negotiate::{self, NegotiateRequest, NegotiateResponse, CHALLENGE_LEN};
use crate::smb::query::{
    FileInformation, InfoChange, QueryInfoRequest, QueryInfoResponse, SetInfoRequest,
    INFO_ALL, INFO_BASIC, INFO_STANDARD,
};
use crate::smb::read::{ReadRequest, ReadResponse};
use crate::smb::rename::RenameRequest;
use crate::smb::session::{SessionSetupRequest, SessionSetupResponse, ACTION_GUEST};
use crate::smb::status::Status;
use crate::smb::tree::{self, TreeConnectRequest, TreeConnectResponse};
use crate::smb::write::{WriteRequest, WriteResponse};
use crate::smb::{self, Dialect};
use crate::transport;
use crate::vfs::{OpenParams, Storage, Target};

// ---- Public types ----

/// Shared, immutable server state (one per server process).
pub struct ServerState<S: Storage> {
    pub config: Config,
    pub dialects: Vec<Dialect>,
    pub shares: Arc<dyn ShareResolver>,
    pub authenticator: Arc<dyn Authenticator>,
    pub storage: S,
}

impl<S: Storage> ServerState<S> {
    pub fn new(
        config: Config,
        shares: Arc<dyn ShareResolver>,
        authenticator: Arc<dyn Authenticator>,
        storage: S,
    ) -> Self {
        let dialects = config.supported_dialects();
        ServerState {
            config,
            dialects,
            shares,
            authenticator,
            storage,
        }
    }

    /// Shares and accounts straight from the configuration file.
    pub fn from_config(config: Config, storage: S) -> Self {
        let shares = Arc::new(ShareTable::new(&config.shares));
        let accounts = Arc::new(AccountTable::from_config(&config));
        Self::new(config, shares, accounts, storage)
    }
}

/// The bytes to send back for one request.
#[derive(Debug)]
pub struct Reply {
    pub frame: BytesMut,
    /// Close the transport once `frame` is written.
    pub close: bool,
}

/// Successful result of a command handler.
struct Outcome {
    status: Status,
    response: Response,
    user_id: Option<u16>,
    tree_id: Option<u32>,
    close: bool,
}

impl Outcome {
    fn ok(response: Response) -> Self {
        Outcome {
            status: Status::Success,
            response,
            user_id: None,
            tree_id: None,
            close: false,
        }
    }
}

type HandlerResult = Result<Outcome, SmbError>;

// ---- Connection ----

/// One client connection: protocol state plus the collaborators it uses.
pub struct Connection<S: Storage> {
    server: Arc<ServerState<S>>,
    state: ConnectionState<S::Handle>,
}

impl<S: Storage> Connection<S> {
    pub fn new(server: Arc<ServerState<S>>) -> Self {
        Connection {
            server,
            state: ConnectionState::new(),
        }
    }

    pub fn state(&self) -> &ConnectionState<S::Handle> {
        &self.state
    }

    /// Handle one framed message and build its reply.
    pub async fn process(&mut self, frame: &[u8]) -> Reply {
        let header = match Header::parse(frame) {
            Ok(h) => h,
            Err(e) => {
                warn!(len = frame.len(), error = %e, "Unparseable header");
                return error_reply(&Header::default(), &e);
            }
        };
        let body = &frame[HEADER_SIZE..];

        debug!(
            command = ?smb::Command::from_u16(header.command),
            multiplex_id = header.multiplex_id,
            user_id = header.user_id,
            tree_id = header.tree_id,
            "Received request"
        );

        let result = match Request::parse(header.command, body) {
            Ok(request) => self.dispatch(&header, request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => success_reply(&header, outcome),
            Err(e) => {
                debug!(command = header.command, error = %e, "Request failed");
                error_reply(&header, &e)
            }
        }
    }

    /// Release every handle still open. Called when the transport closes.
    pub async fn shutdown(&mut self) {
        let handles = self.state.drain_handles();
        if !handles.is_empty() {
            info!(count = handles.len(), "Releasing open handles");
        }
        self.close_all(handles).await;
    }

    async fn close_all(&self, handles: Vec<OpenHandle<S::Handle>>) {
        for open in handles {
            if let Err(e) = self.server.storage.close(open.handle).await {
                warn!(path = %open.path, error = %e, "Close failed");
            }
        }
    }

    // ---- Dispatch ----

    async fn dispatch(&mut self, header: &Header, request: Request) -> HandlerResult {
        match request {
            Request::Negotiate(req) => self.handle_negotiate(req),
            Request::SessionSetup(req) => self.handle_session_setup(header, req),
            Request::Logoff => self.handle_logoff(header).await,
            Request::TreeConnect(req) => self.handle_tree_connect(header, req),
            Request::TreeDisconnect => self.handle_tree_disconnect(header).await,
            Request::Create(req) => self.handle_create(header, req).await,
            Request::Close(req) => self.handle_close(header, req).await,
            Request::Flush(req) => self.handle_flush(header, req).await,
            Request::Read(req) => self.handle_read(header, req).await,
            Request::Write(req) => self.handle_write(header, req).await,
            Request::Delete(req) => self.handle_delete(header, req).await,
            Request::Rename(req) => self.handle_rename(header, req).await,
            Request::QueryInfo(req) => self.handle_query_info(header, req).await,
            Request::SetInfo(req) => self.handle_set_info(header, req).await,
        }
    }

    // ---- Command handlers ----

    fn handle_negotiate(&mut self, req: NegotiateRequest) -> HandlerResult {
        if self.state.dialect().is_some() {
            return Err(SmbError::SequenceError);
        }
        let dialect = negotiate::select_dialect(&req.dialects, &self.server.dialects)
            .ok_or(SmbError::DialectNotSupported)?;

        let mut challenge = [0u8; CHALLENGE_LEN];
        OsRng.fill_bytes(&mut challenge);
        self.state.set_negotiated(dialect, challenge);

        let config = &self.server.config;
        let resp = NegotiateResponse {
            dialect: dialect.as_u16(),
            security_mode: smb::SECURITY_MODE_USER_LEVEL | smb::SECURITY_MODE_ENCRYPT_PASSWORDS,
            max_buffer_size: config.max_buffer_size,
            max_mpx_count: config.max_mpx_count,
            capabilities: smb::CAP_UNICODE
                | smb::CAP_NT_STATUS
                | smb::CAP_LARGE_FILES
                | smb::CAP_EXTENDED_SECURITY,
            system_time: negotiate::now_as_filetime(),
            time_zone: config.time_zone_offset_minutes,
            challenge: challenge.to_vec(),
            domain_name: config.domain_name.clone(),
            server_name: config.server_name.clone(),
        };

        info!(dialect = ?dialect, "Negotiated");
        Ok(Outcome::ok(Response::Negotiate(resp)))
    }

    fn handle_session_setup(&mut self, header: &Header, req: SessionSetupRequest) -> HandlerResult {
        let challenge = self.state.challenge().ok_or(SmbError::SequenceError)?;

        let existing = header.user_id != 0 && self.state.has_session(header.user_id);
        let user_id = if existing {
            header.user_id
        } else {
            self.state.peek_session_id()?
        };

        let (status, action, blob) = match self.server.authenticator.authenticate(&req, &challenge) {
            AuthOutcome::Established { user, guest } => {
                info!(user = %user, user_id, guest, "Session established");
                self.state.set_auth(user_id, AuthState::Established { user, guest });
                let action = if guest { ACTION_GUEST } else { 0 };
                (Status::Success, action, Vec::new())
            }
            AuthOutcome::Continue(blob) => {
                debug!(user_id, "Session setup needs another leg");
                self.state.set_auth(user_id, AuthState::Pending);
                (Status::MoreProcessingRequired, 0, blob)
            }
            AuthOutcome::Rejected => {
                warn!(account = %req.account_name, "Logon failure");
                return Err(SmbError::LogonFailure);
            }
        };

        Ok(Outcome {
            status,
            user_id: Some(user_id),
            ..Outcome::ok(Response::SessionSetup(SessionSetupResponse {
                action,
                security_blob: blob,
            }))
        })
    }

    async fn handle_logoff(&mut self, header: &Header) -> HandlerResult {
        let session = self
            .state
            .remove_session(header.user_id)
            .ok_or(SmbError::SequenceError)?;
        info!(user_id = header.user_id, trees = session.tree_count(), "Logoff");
        self.close_all(session.into_handles()).await;

        Ok(Outcome {
            close: self.state.session_count() == 0,
            ..Outcome::ok(Response::Logoff)
        })
    }

    fn handle_tree_connect(&mut self, header: &Header, req: TreeConnectRequest) -> HandlerResult {
        let guest = matches!(
            self.state.established_mut(header.user_id)?.auth,
            AuthState::Established { guest: true, .. }
        );

        let share_name = req.share_name();
        let share = self
            .server
            .shares
            .resolve(share_name)
            .ok_or_else(|| SmbError::BadShareName(share_name.to_string()))?;
        if guest && !share.guest_ok {
            warn!(share = %share.name, user_id = header.user_id, "Guest refused");
            return Err(SmbError::AccessDenied);
        }

        let tree_id = self.state.peek_tree_id()?;
        let maximal_access = if share.read_only {
            tree::FILE_GENERIC_READ
        } else {
            tree::FILE_ALL_ACCESS
        };
        info!(share = %share.name, tree_id, "Tree connected");
        self.state.commit_tree(header.user_id, tree_id, Tree::new(share))?;

        Ok(Outcome {
            tree_id: Some(tree_id),
            ..Outcome::ok(Response::TreeConnect(TreeConnectResponse {
                optional_support: 0,
                maximal_access,
                share_type: tree::SHARE_TYPE_DISK,
            }))
        })
    }

    async fn handle_tree_disconnect(&mut self, header: &Header) -> HandlerResult {
        let tree = self
            .state
            .established_mut(header.user_id)?
            .remove_tree(header.tree_id)
            .ok_or(SmbError::SequenceError)?;
        info!(tree_id = header.tree_id, open = tree.open_count(), "Tree disconnected");
        self.close_all(tree.into_handles()).await;
        Ok(Outcome::ok(Response::TreeDisconnect))
    }

    async fn handle_create(&mut self, header: &Header, req: CreateRequest) -> HandlerResult {
        let tree = self.state.tree_mut(header.user_id, header.tree_id)?;

        let modifies = create::wants_write(req.desired_access)
            || create::disposition_modifies(req.create_disposition);
        if tree.share.read_only && modifies {
            return Err(SmbError::AccessDenied);
        }

        let fid = tree.peek_fid()?;
        let params = OpenParams {
            access: req.desired_access,
            disposition: req.create_disposition,
            directory: req.is_directory(),
        };
        let opened = self
            .server
            .storage
            .open(&tree.share.root, &req.file_name, params)
            .await?;

        let create_action = if opened.created {
            create::FILE_CREATED
        } else {
            create::FILE_OPENED
        };
        debug!(fid, path = %req.file_name, action = create_action, "File opened");

        tree.insert_handle(
            fid,
            OpenHandle {
                handle: opened.handle,
                path: req.file_name,
                access: req.desired_access,
            },
        );

        Ok(Outcome::ok(Response::Create(CreateResponse {
            fid,
            create_action,
            info: FileInformation::from(&opened.info),
        })))
    }

    async fn handle_close(&mut self, header: &Header, req: CloseRequest) -> HandlerResult {
        let tree = self.state.tree_mut(header.user_id, header.tree_id)?;
        let read_only = tree.share.read_only;
        let open = tree.take_handle(req.fid)?;
        let storage = &self.server.storage;

        if req.last_write_time != 0 && !read_only {
            let change = InfoChange::Basic {
                creation_time: 0,
                last_access_time: 0,
                last_write_time: req.last_write_time,
                change_time: 0,
                file_attributes: 0,
            };
            if let Err(e) = storage.set_info(Target::Handle(&open.handle), change).await {
                warn!(fid = req.fid, error = %e, "Setting last write time failed");
            }
        }
        if let Err(e) = storage.close(open.handle).await {
            warn!(fid = req.fid, error = %e, "Close failed");
        }

        debug!(fid = req.fid, "File closed");
        Ok(Outcome::ok(Response::Close))
    }

    async fn handle_flush(&mut self, header: &Header, req: FlushRequest) -> HandlerResult {
        let tree = self.state.tree_mut(header.user_id, header.tree_id)?;
        let open = tree.handle(req.fid)?;
        self.server.storage.flush(&open.handle).await?;
        Ok(Outcome::ok(Response::Flush))
    }

    async fn handle_read(&mut self, header: &Header, req: ReadRequest) -> HandlerResult {
        let tree = self.state.tree_mut(header.user_id, header.tree_id)?;
        let open = tree.handle(req.fid)?;

        let limit = self.server.config.max_buffer_size.min(u16::MAX as u32);
        let length = (req.max_count as u32).min(limit);
        let data = self.server.storage.read(&open.handle, req.offset, length).await?;

        debug!(fid = req.fid, offset = req.offset, len = data.len(), "Read");
        Ok(Outcome::ok(Response::Read(ReadResponse { remaining: 0, data })))
    }

    async fn handle_write(&mut self, header: &Header, req: WriteRequest) -> HandlerResult {
        let tree = self.state.tree_mut(header.user_id, header.tree_id)?;
        let open = tree.handle(req.fid)?;
        if tree.share.read_only || !open.can_write() {
            return Err(SmbError::AccessDenied);
        }

        let count = self
            .server
            .storage
            .write(&open.handle, req.offset, &req.data)
            .await?;

        debug!(fid = req.fid, offset = req.offset, count, "Write");
        Ok(Outcome::ok(Response::Write(WriteResponse { count })))
    }

    async fn handle_delete(&mut self, header: &Header, req: DeleteRequest) -> HandlerResult {
        let tree = self.state.tree_mut(header.user_id, header.tree_id)?;
        if tree.share.read_only {
            return Err(SmbError::AccessDenied);
        }
        self.server.storage.delete(&tree.share.root, &req.file_name).await?;
        info!(path = %req.file_name, "Deleted");
        Ok(Outcome::ok(Response::Delete))
    }

    async fn handle_rename(&mut self, header: &Header, req: RenameRequest) -> HandlerResult {
        let tree = self.state.tree_mut(header.user_id, header.tree_id)?;
        if tree.share.read_only {
            return Err(SmbError::AccessDenied);
        }
        self.server
            .storage
            .rename(&tree.share.root, &req.old_name, &req.new_name)
            .await?;
        info!(from = %req.old_name, to = %req.new_name, "Renamed");
        Ok(Outcome::ok(Response::Rename))
    }

    async fn handle_query_info(&mut self, header: &Header, req: QueryInfoRequest) -> HandlerResult {
        let tree = self.state.tree_mut(header.user_id, header.tree_id)?;
        let target = if req.fid == 0 {
            Target::Path {
                root: &tree.share.root,
                path: &req.file_name,
            }
        } else {
            Target::Handle(&tree.handle(req.fid)?.handle)
        };

        if !matches!(req.information_level, INFO_BASIC | INFO_STANDARD | INFO_ALL) {
            debug!(level = req.information_level, "Unsupported QueryInfo level");
            return Err(SmbError::NotSupported);
        }

        let info = self.server.storage.query_info(target).await?;
        let data = FileInformation::from(&info).encode_level(req.information_level)?;

        Ok(Outcome::ok(Response::QueryInfo(QueryInfoResponse {
            information_level: req.information_level,
            info: data,
        })))
    }

    async fn handle_set_info(&mut self, header: &Header, req: SetInfoRequest) -> HandlerResult {
        let tree = self.state.tree_mut(header.user_id, header.tree_id)?;
        let target = if req.fid == 0 {
            Target::Path {
                root: &tree.share.root,
                path: &req.file_name,
            }
        } else {
            let open = tree.handle(req.fid)?;
            if !open.can_write() {
                return Err(SmbError::AccessDenied);
            }
            Target::Handle(&open.handle)
        };
        if tree.share.read_only {
            return Err(SmbError::AccessDenied);
        }

        let change = InfoChange::decode(req.information_level, &req.info)?;
        self.server.storage.set_info(target, change).await?;
        debug!(fid = req.fid, level = req.information_level, "Info set");
        Ok(Outcome::ok(Response::SetInfo))
    }
}

// ---- Reply construction ----

fn success_reply(req: &Header, outcome: Outcome) -> Reply {
    let mut header = Header::reply(req, outcome.status);
    if let Some(user_id) = outcome.user_id {
        header.user_id = user_id;
    }
    if let Some(tree_id) = outcome.tree_id {
        header.tree_id = tree_id;
    }

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + 64);
    header.serialize(&mut frame);
    outcome.response.serialize(&mut frame);
    Reply {
        frame,
        close: outcome.close,
    }
}

fn error_reply(req: &Header, error: &SmbError) -> Reply {
    let status = error_to_status(error);
    let mut frame = BytesMut::with_capacity(HEADER_SIZE + ErrorResponse::SIZE);
    Header::reply(req, status).serialize(&mut frame);
    ErrorResponse::from_status(status).serialize(&mut frame);
    Reply { frame, close: false }
}

// ---- Connection entrypoint ----

/// Serve one client until it disconnects, logs off its last session, goes
/// idle, the transport fails, or `shutdown` completes. A request already
/// being handled is answered before shutdown takes effect. Open handles are
/// always released.
pub async fn handle_connection<S, T, F>(
    mut stream: T,
    server: Arc<ServerState<S>>,
    shutdown: F,
) -> Result<(), ServerError>
where
    S: Storage,
    T: AsyncRead + AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    let idle = server.config.idle_timeout_secs.map(Duration::from_secs);
    let mut conn = Connection::new(server);
    tokio::pin!(shutdown);
    let result = serve(&mut conn, &mut stream, idle, shutdown).await;
    conn.shutdown().await;
    result
}

async fn serve<S, T, F>(
    conn: &mut Connection<S>,
    stream: &mut T,
    idle: Option<Duration>,
    mut shutdown: Pin<&mut F>,
) -> Result<(), ServerError>
where
    S: Storage,
    T: AsyncRead + AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.as_mut() => {
                info!("Server shutting down, closing connection");
                return Ok(());
            }
            next = next_frame(stream, idle) => match next? {
                Some(frame) => frame,
                None => {
                    debug!("Client disconnected");
                    return Ok(());
                }
            },
        };

        let reply = conn.process(&frame).await;
        transport::write_frame(stream, &reply.frame).await?;

        if reply.close {
            info!("Last session logged off, closing connection");
            return Ok(());
        }
    }
}

/// The next frame, or `None` once the client has closed its side.
async fn next_frame<T>(stream: &mut T, idle: Option<Duration>) -> Result<Option<Vec<u8>>, ServerError>
where
    T: AsyncRead + Unpin,
{
    let read = match idle {
        Some(limit) => tokio::time::timeout(limit, transport::read_frame(stream))
            .await
            .map_err(|_| ServerError::IdleTimeout)?,
        None => transport::read_frame(stream).await,
    };
    match read {
        Ok(frame) => Ok(Some(frame)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(ServerError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ShareConfig, UserConfig};
    use crate::smb::header::FLAGS_REPLY;
    use crate::smb::query::INFO_END_OF_FILE;
    use crate::smb::status::ErrorClass;
    use crate::smb::{Command, FLAG_UNICODE};
    use crate::vfs::memory::MemoryFs;
    use crate::vfs::LocalFs;
    use std::path::{Path, PathBuf};

    const ROOT: &str = "/mem/public";

    fn config(root: &Path, users: Vec<UserConfig>) -> Config {
        Config {
            port: 0,
            server_name: "TESTSRV".into(),
            domain_name: "WORKGROUP".into(),
            max_buffer_size: 4096,
            max_mpx_count: 10,
            time_zone_offset_minutes: 0,
            dialects: vec![],
            idle_timeout_secs: None,
            shares: vec![
                ShareConfig {
                    name: "Public".into(),
                    path: root.to_path_buf(),
                    read_only: false,
                    guest_ok: true,
                },
                ShareConfig {
                    name: "Archive".into(),
                    path: root.join("archive"),
                    read_only: true,
                    guest_ok: true,
                },
                ShareConfig {
                    name: "Private".into(),
                    path: root.join("private"),
                    read_only: false,
                    guest_ok: false,
                },
            ],
            users,
        }
    }

    fn memory_conn() -> Connection<MemoryFs> {
        let server = ServerState::from_config(config(Path::new(ROOT), vec![]), MemoryFs::new());
        Connection::new(Arc::new(server))
    }

    struct Answer {
        header: Header,
        body: Vec<u8>,
        close: bool,
    }

    impl Answer {
        fn ok(&self) -> Response {
            assert!(
                !self.header.status.is_error(),
                "unexpected status {:?}",
                self.header.status
            );
            Response::parse(self.header.command, &self.body).unwrap()
        }

        fn status(&self) -> Status {
            self.header.status
        }
    }

    async fn send<S: Storage>(conn: &mut Connection<S>, req: Request, user_id: u16, tree_id: u32) -> Answer {
        let header = Header {
            command: req.command().as_u16(),
            user_id,
            tree_id,
            process_id: 99,
            multiplex_id: 5,
            ..Header::default()
        };
        let mut buf = BytesMut::new();
        header.serialize(&mut buf);
        req.serialize(&mut buf);
        let reply = conn.process(&buf).await;
        Answer {
            header: Header::parse(&reply.frame).unwrap(),
            body: reply.frame[HEADER_SIZE..].to_vec(),
            close: reply.close,
        }
    }

    fn negotiate_req(dialects: &[u16]) -> Request {
        Request::Negotiate(NegotiateRequest {
            dialects: dialects.to_vec(),
        })
    }

    fn setup_req(account: &str, blob: &[u8]) -> Request {
        Request::SessionSetup(SessionSetupRequest {
            flags: FLAG_UNICODE,
            max_buffer_size: 4096,
            max_mpx_count: 1,
            vc_number: 0,
            session_key: 0,
            capabilities: 0,
            account_name: account.into(),
            security_blob: blob.to_vec(),
        })
    }

    fn tree_req(path: &str) -> Request {
        Request::TreeConnect(TreeConnectRequest {
            flags: FLAG_UNICODE,
            path: path.into(),
            service: "A:".into(),
            password: vec![],
        })
    }

    fn create_req(name: &str, access: u32, disposition: u32) -> Request {
        Request::Create(CreateRequest {
            flags: FLAG_UNICODE,
            desired_access: access,
            allocation_size: 0,
            file_attributes: create::FILE_ATTRIBUTE_NORMAL,
            share_access: 0x7,
            create_disposition: disposition,
            create_options: 0,
            impersonation_level: 2,
            security_flags: 0,
            file_name: name.into(),
            context: vec![],
        })
    }

    fn read_req(fid: u16, offset: u64, max_count: u16) -> Request {
        Request::Read(ReadRequest {
            flags: 0,
            fid,
            offset,
            max_count,
            min_count: 0,
            remaining: 0,
            file_name: String::new(),
            context: vec![],
        })
    }

    fn write_req(fid: u16, offset: u64, data: &[u8]) -> Request {
        Request::Write(WriteRequest {
            flags: 0,
            fid,
            offset,
            remaining: 0,
            write_mode: 0,
            file_name: String::new(),
            context: vec![],
            data: data.to_vec(),
        })
    }

    fn close_req(fid: u16) -> Request {
        Request::Close(CloseRequest {
            flags: 0,
            fid,
            last_write_time: 0,
            file_name: String::new(),
            context: vec![],
        })
    }

    const RW: u32 = create::FILE_READ_DATA | create::FILE_WRITE_DATA;

    /// Negotiate, guest session setup and attach `share`; returns (uid, tid).
    async fn attach<S: Storage>(conn: &mut Connection<S>, share: &str) -> (u16, u32) {
        send(conn, negotiate_req(&[0x0202]), 0, 0).await.ok();
        let setup = send(conn, setup_req("", b""), 0, 0).await;
        setup.ok();
        let uid = setup.header.user_id;
        let tc = send(conn, tree_req(&format!("\\\\TESTSRV\\{}", share)), uid, 0).await;
        tc.ok();
        (uid, tc.header.tree_id)
    }

    fn fid_of(answer: &Answer) -> u16 {
        match answer.ok() {
            Response::Create(resp) => resp.fid,
            other => panic!("expected create response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_negotiate_picks_first_supported_in_client_order() {
        let mut conn = memory_conn();
        let answer = send(&mut conn, negotiate_req(&[0x0202, 0x0300]), 0, 0).await;
        match answer.ok() {
            Response::Negotiate(resp) => {
                assert_eq!(resp.dialect, 0x0202);
                assert_eq!(resp.challenge.len(), 8);
                assert_eq!(resp.server_name, "TESTSRV");
                assert_eq!(resp.max_buffer_size, 4096);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(answer.header.flags & FLAGS_REPLY, FLAGS_REPLY);
        assert_eq!(answer.header.multiplex_id, 5);
        assert_eq!(answer.header.process_id, 99);
        assert_eq!(conn.state().dialect(), Some(Dialect::Smb202));
    }

    #[tokio::test]
    async fn test_negotiate_without_common_dialect() {
        let mut conn = memory_conn();
        let answer = send(&mut conn, negotiate_req(&[0x0001, 0x0999]), 0, 0).await;
        assert_eq!(answer.status(), Status::NotSupported);
        assert_eq!(conn.state().dialect(), None);

        // still fresh, so a retry may succeed
        let answer = send(&mut conn, negotiate_req(&[0x0210]), 0, 0).await;
        assert_eq!(answer.status(), Status::Success);
    }

    #[tokio::test]
    async fn test_second_negotiate_is_sequence_error() {
        let mut conn = memory_conn();
        send(&mut conn, negotiate_req(&[0x0202]), 0, 0).await.ok();
        let answer = send(&mut conn, negotiate_req(&[0x0202]), 0, 0).await;
        assert_eq!(answer.status(), Status::BadCommand);
    }

    #[tokio::test]
    async fn test_sequence_law() {
        let mut conn = memory_conn();
        let answer = send(&mut conn, setup_req("", b""), 0, 0).await;
        assert_eq!(answer.status(), Status::BadCommand);

        send(&mut conn, negotiate_req(&[0x0202]), 0, 0).await.ok();
        let answer = send(&mut conn, tree_req("\\\\srv\\Public"), 0, 0).await;
        assert_eq!(answer.status(), Status::BadCommand);

        let setup = send(&mut conn, setup_req("", b""), 0, 0).await;
        let uid = setup.header.user_id;
        let answer = send(&mut conn, create_req("a.txt", RW, create::FILE_OPEN_IF), uid, 1).await;
        assert_eq!(answer.status(), Status::BadCommand);
        assert_eq!(conn.server.storage.open_count(), 0);
    }

    #[tokio::test]
    async fn test_unmapped_share_before_session_is_sequence_error() {
        let mut conn = memory_conn();
        send(&mut conn, negotiate_req(&[0x0202]), 0, 0).await.ok();
        let answer = send(&mut conn, tree_req("\\\\srv\\nowhere"), 0, 0).await;
        assert_eq!(answer.status(), Status::BadCommand);
    }

    #[tokio::test]
    async fn test_unknown_share_after_session() {
        let mut conn = memory_conn();
        send(&mut conn, negotiate_req(&[0x0202]), 0, 0).await.ok();
        let uid = send(&mut conn, setup_req("", b""), 0, 0).await.header.user_id;
        let answer = send(&mut conn, tree_req("\\\\srv\\nowhere"), uid, 0).await;
        assert_eq!(answer.status(), Status::BadNetworkName);
        assert_eq!(conn.state().session(uid).unwrap().tree_count(), 0);
    }

    #[tokio::test]
    async fn test_session_ids_and_tree_ids_are_distinct() {
        let mut conn = memory_conn();
        send(&mut conn, negotiate_req(&[0x0202]), 0, 0).await.ok();
        let a = send(&mut conn, setup_req("", b""), 0, 0).await.header.user_id;
        let b = send(&mut conn, setup_req("", b""), 0, 0).await.header.user_id;
        assert_ne!(a, 0);
        assert_ne!(a, b);

        let t1 = send(&mut conn, tree_req("\\\\s\\Public"), a, 0).await.header.tree_id;
        let t2 = send(&mut conn, tree_req("\\\\s\\Public"), b, 0).await.header.tree_id;
        assert_ne!(t1, t2);
    }

    #[tokio::test]
    async fn test_create_write_read_close_cycle() {
        let mut conn = memory_conn();
        let (uid, tid) = attach(&mut conn, "Public").await;

        let created = send(&mut conn, create_req("notes.txt", RW, create::FILE_CREATE), uid, tid).await;
        let fid = fid_of(&created);
        assert_eq!(fid, 1);

        let answer = send(&mut conn, write_req(fid, 0, b"0123456789"), uid, tid).await;
        assert_eq!(answer.ok(), Response::Write(WriteResponse { count: 10 }));

        let answer = send(&mut conn, read_req(fid, 0, 10), uid, tid).await;
        match answer.ok() {
            Response::Read(resp) => assert_eq!(resp.data, b"0123456789"),
            other => panic!("unexpected {:?}", other),
        }

        send(&mut conn, close_req(fid), uid, tid).await.ok();
        let answer = send(&mut conn, read_req(fid, 0, 10), uid, tid).await;
        assert_eq!(answer.status(), Status::InvalidHandle);

        let answer = send(&mut conn, close_req(fid), uid, tid).await;
        assert_eq!(answer.status(), Status::InvalidHandle);
        assert_eq!(conn.server.storage.closed().len(), 1);
    }

    #[tokio::test]
    async fn test_fids_not_reused_after_close() {
        let mut conn = memory_conn();
        let (uid, tid) = attach(&mut conn, "Public").await;
        let first = fid_of(&send(&mut conn, create_req("a", RW, create::FILE_OPEN_IF), uid, tid).await);
        send(&mut conn, close_req(first), uid, tid).await.ok();
        let second = fid_of(&send(&mut conn, create_req("a", RW, create::FILE_OPEN_IF), uid, tid).await);
        assert_ne!(first, 0);
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_read_clamped_to_max_buffer_size() {
        let mut conn = memory_conn();
        conn.server.storage.insert(Path::new(ROOT), "big.bin", &[7u8; 10_000]);
        let (uid, tid) = attach(&mut conn, "Public").await;
        let fid = fid_of(
            &send(&mut conn, create_req("big.bin", create::FILE_READ_DATA, create::FILE_OPEN), uid, tid).await,
        );
        match send(&mut conn, read_req(fid, 0, u16::MAX), uid, tid).await.ok() {
            Response::Read(resp) => assert_eq!(resp.data.len(), 4096),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_storage_error_allocates_no_handle() {
        let mut conn = memory_conn();
        let (uid, tid) = attach(&mut conn, "Public").await;
        let answer = send(
            &mut conn,
            create_req("missing.txt", create::FILE_READ_DATA, create::FILE_OPEN),
            uid,
            tid,
        )
        .await;
        assert_eq!(answer.status(), Status::ObjectNameNotFound);

        let fid = fid_of(&send(&mut conn, create_req("new.txt", RW, create::FILE_CREATE), uid, tid).await);
        assert_eq!(fid, 1);
    }

    #[tokio::test]
    async fn test_write_through_read_only_handle_denied() {
        let mut conn = memory_conn();
        conn.server.storage.insert(Path::new(ROOT), "r.txt", b"abc");
        let (uid, tid) = attach(&mut conn, "Public").await;
        let fid = fid_of(
            &send(&mut conn, create_req("r.txt", create::FILE_READ_DATA, create::FILE_OPEN), uid, tid).await,
        );
        let answer = send(&mut conn, write_req(fid, 0, b"x"), uid, tid).await;
        assert_eq!(answer.status(), Status::AccessDenied);
        assert_eq!(conn.server.storage.contents(Path::new(ROOT), "r.txt").unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_read_only_share_refuses_modification() {
        let mut conn = memory_conn();
        let archive = PathBuf::from(ROOT).join("archive");
        conn.server.storage.insert(&archive, "old.txt", b"keep");
        let (uid, tid) = attach(&mut conn, "Archive").await;

        let answer = send(&mut conn, create_req("old.txt", RW, create::FILE_OPEN), uid, tid).await;
        assert_eq!(answer.status(), Status::AccessDenied);

        let delete = Request::Delete(DeleteRequest {
            flags: 0,
            search_attributes: 0,
            file_name: "old.txt".into(),
            context: vec![],
        });
        assert_eq!(send(&mut conn, delete, uid, tid).await.status(), Status::AccessDenied);

        let rename = Request::Rename(RenameRequest {
            flags: 0,
            search_attributes: 0,
            old_name: "old.txt".into(),
            new_name: "new.txt".into(),
            context: vec![],
        });
        assert_eq!(send(&mut conn, rename, uid, tid).await.status(), Status::AccessDenied);
        assert_eq!(conn.server.storage.contents(&archive, "old.txt").unwrap(), b"keep");

        let fid = fid_of(
            &send(&mut conn, create_req("old.txt", create::FILE_READ_DATA, create::FILE_OPEN), uid, tid).await,
        );
        match send(&mut conn, read_req(fid, 0, 100), uid, tid).await.ok() {
            Response::Read(resp) => assert_eq!(resp.data, b"keep"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tree_disconnect_invalidates_handles() {
        let mut conn = memory_conn();
        let (uid, tid) = attach(&mut conn, "Public").await;
        let fid = fid_of(&send(&mut conn, create_req("a", RW, create::FILE_OPEN_IF), uid, tid).await);

        send(&mut conn, Request::TreeDisconnect, uid, tid).await.ok();
        assert_eq!(conn.server.storage.closed().len(), 1);

        let answer = send(&mut conn, read_req(fid, 0, 1), uid, tid).await;
        assert_eq!(answer.status(), Status::BadCommand);
        let answer = send(&mut conn, Request::TreeDisconnect, uid, tid).await;
        assert_eq!(answer.status(), Status::BadCommand);
    }

    #[tokio::test]
    async fn test_logoff_of_last_session_closes_connection() {
        let mut conn = memory_conn();
        let (uid, tid) = attach(&mut conn, "Public").await;
        send(&mut conn, create_req("a", RW, create::FILE_OPEN_IF), uid, tid).await.ok();

        let answer = send(&mut conn, Request::Logoff, uid, 0).await;
        answer.ok();
        assert!(answer.close);
        assert_eq!(conn.server.storage.closed().len(), 1);

        let answer = send(&mut conn, Request::Logoff, uid, 0).await;
        assert_eq!(answer.status(), Status::BadCommand);
    }

    #[tokio::test]
    async fn test_logoff_with_sessions_remaining_keeps_connection() {
        let mut conn = memory_conn();
        send(&mut conn, negotiate_req(&[0x0202]), 0, 0).await.ok();
        let a = send(&mut conn, setup_req("", b""), 0, 0).await.header.user_id;
        send(&mut conn, setup_req("", b""), 0, 0).await.ok();
        let answer = send(&mut conn, Request::Logoff, a, 0).await;
        assert!(!answer.close);
    }

    #[tokio::test]
    async fn test_shutdown_releases_every_handle() {
        let mut conn = memory_conn();
        let (uid, tid) = attach(&mut conn, "Public").await;
        for name in ["a", "b", "c"] {
            send(&mut conn, create_req(name, RW, create::FILE_OPEN_IF), uid, tid).await.ok();
        }
        conn.shutdown().await;
        let mut closed = conn.server.storage.closed();
        closed.sort();
        assert_eq!(closed, vec![1, 2, 3]);
        assert_eq!(conn.state().session_count(), 0);
    }

    #[tokio::test]
    async fn test_multi_leg_authentication() {
        let users = vec![UserConfig {
            username: "alice".into(),
            password: "secret".into(),
        }];
        let server = ServerState::from_config(config(Path::new(ROOT), users), MemoryFs::new());
        let mut conn = Connection::new(Arc::new(server));
        send(&mut conn, negotiate_req(&[0x0202]), 0, 0).await.ok();

        let first = send(&mut conn, setup_req("alice", b""), 0, 0).await;
        assert_eq!(first.status(), Status::MoreProcessingRequired);
        let uid = first.header.user_id;
        assert_ne!(uid, 0);
        match first.ok() {
            Response::SessionSetup(resp) => assert_eq!(resp.security_blob.len(), 8),
            other => panic!("unexpected {:?}", other),
        }

        // pending sessions can't attach trees
        let answer = send(&mut conn, tree_req("\\\\s\\Public"), uid, 0).await;
        assert_eq!(answer.status(), Status::BadCommand);

        let second = send(&mut conn, setup_req("alice", b"secret"), uid, 0).await;
        assert_eq!(second.status(), Status::Success);
        assert_eq!(second.header.user_id, uid);
        assert_eq!(
            second.ok(),
            Response::SessionSetup(SessionSetupResponse {
                action: 0,
                security_blob: vec![]
            })
        );
        send(&mut conn, tree_req("\\\\s\\Public"), uid, 0).await.ok();
    }

    #[tokio::test]
    async fn test_guest_refused_on_share_without_guest_access() {
        let users = vec![UserConfig {
            username: "alice".into(),
            password: "secret".into(),
        }];
        let server = ServerState::from_config(config(Path::new(ROOT), users), MemoryFs::new());
        let mut conn = Connection::new(Arc::new(server));
        send(&mut conn, negotiate_req(&[0x0202]), 0, 0).await.ok();

        let guest = send(&mut conn, setup_req("", b""), 0, 0).await;
        assert_eq!(
            guest.ok(),
            Response::SessionSetup(SessionSetupResponse {
                action: ACTION_GUEST,
                security_blob: vec![]
            })
        );
        let guest_uid = guest.header.user_id;

        let answer = send(&mut conn, tree_req("\\\\TESTSRV\\Private"), guest_uid, 0).await;
        assert_eq!(answer.status(), Status::AccessDenied);
        assert_eq!(answer.header.tree_id, 0);
        assert_eq!(conn.state().session(guest_uid).unwrap().tree_count(), 0);

        // guest shares stay open to the guest
        send(&mut conn, tree_req("\\\\TESTSRV\\Public"), guest_uid, 0).await.ok();

        let alice = send(&mut conn, setup_req("alice", b"secret"), 0, 0).await;
        alice.ok();
        let tc = send(&mut conn, tree_req("\\\\TESTSRV\\Private"), alice.header.user_id, 0).await;
        tc.ok();
        assert_ne!(tc.header.tree_id, 0);
    }

    #[tokio::test]
    async fn test_rejected_logon_stores_no_session() {
        let users = vec![UserConfig {
            username: "alice".into(),
            password: "secret".into(),
        }];
        let server = ServerState::from_config(config(Path::new(ROOT), users), MemoryFs::new());
        let mut conn = Connection::new(Arc::new(server));
        send(&mut conn, negotiate_req(&[0x0202]), 0, 0).await.ok();

        let answer = send(&mut conn, setup_req("alice", b"wrong"), 0, 0).await;
        assert_eq!(answer.status(), Status::IncorrectPassword);
        assert_eq!(conn.state().session_count(), 0);
    }

    #[tokio::test]
    async fn test_query_and_set_info() {
        let mut conn = memory_conn();
        conn.server.storage.insert(Path::new(ROOT), "f.txt", b"0123456789");
        let (uid, tid) = attach(&mut conn, "Public").await;

        let by_name = Request::QueryInfo(QueryInfoRequest {
            flags: 0,
            information_level: INFO_STANDARD,
            fid: 0,
            file_name: "f.txt".into(),
            context: vec![],
        });
        match send(&mut conn, by_name, uid, tid).await.ok() {
            Response::QueryInfo(resp) => {
                assert_eq!(resp.information_level, INFO_STANDARD);
                assert_eq!(u64::from_le_bytes(resp.info[8..16].try_into().unwrap()), 10);
            }
            other => panic!("unexpected {:?}", other),
        }

        let fid = fid_of(&send(&mut conn, create_req("f.txt", RW, create::FILE_OPEN), uid, tid).await);
        let (level, info) = InfoChange::EndOfFile(4).encode();
        let set = Request::SetInfo(SetInfoRequest {
            flags: 0,
            information_level: level,
            fid,
            file_name: String::new(),
            info,
        });
        send(&mut conn, set, uid, tid).await.ok();
        assert_eq!(conn.server.storage.contents(Path::new(ROOT), "f.txt").unwrap(), b"0123");

        let unsupported = Request::QueryInfo(QueryInfoRequest {
            flags: 0,
            information_level: INFO_END_OF_FILE,
            fid,
            file_name: String::new(),
            context: vec![],
        });
        assert_eq!(send(&mut conn, unsupported, uid, tid).await.status(), Status::NotSupported);

        let stale = Request::QueryInfo(QueryInfoRequest {
            flags: 0,
            information_level: INFO_ALL,
            fid: 42,
            file_name: String::new(),
            context: vec![],
        });
        assert_eq!(send(&mut conn, stale, uid, tid).await.status(), Status::InvalidHandle);
    }

    #[tokio::test]
    async fn test_oversized_unicode_name_is_malformed() {
        let mut conn = memory_conn();
        let (uid, tid) = attach(&mut conn, "Public").await;

        let mut body = BytesMut::new();
        if let Request::Create(req) = create_req("abc", RW, create::FILE_OPEN_IF) {
            req.serialize(&mut body);
        }
        body[2..4].copy_from_slice(&500u16.to_le_bytes());

        let header = Header {
            command: Command::Create.as_u16(),
            user_id: uid,
            tree_id: tid,
            ..Header::default()
        };
        let mut frame = BytesMut::new();
        header.serialize(&mut frame);
        frame.extend_from_slice(&body);

        let reply = conn.process(&frame).await;
        let resp_header = Header::parse(&reply.frame).unwrap();
        assert_eq!(resp_header.status, Status::InvalidParameter);
        let envelope = ErrorResponse::parse(&reply.frame[HEADER_SIZE..]).unwrap();
        assert_eq!(envelope.error_class, ErrorClass::Protocol);
        assert_eq!(conn.server.storage.open_count(), 0);
    }

    #[tokio::test]
    async fn test_garbage_frames_get_error_replies() {
        let mut conn = memory_conn();
        let reply = conn.process(&[1, 2, 3]).await;
        let header = Header::parse(&reply.frame).unwrap();
        assert_eq!(header.status, Status::InvalidParameter);
        assert_eq!(header.user_id, 0);
        assert_eq!(header.tree_id, 0);

        let mut frame = vec![0u8; HEADER_SIZE];
        frame[0..4].copy_from_slice(b"\xfeSMB");
        let reply = conn.process(&frame).await;
        assert_eq!(Header::parse(&reply.frame).unwrap().status, Status::InvalidNetworkResponse);

        let header = Header {
            command: 0xA0,
            ..Header::default()
        };
        let mut frame = BytesMut::new();
        header.serialize(&mut frame);
        let reply = conn.process(&frame).await;
        assert_eq!(Header::parse(&reply.frame).unwrap().status, Status::InvalidFunction);
    }

    #[tokio::test]
    async fn test_local_fs_session_over_transport() {
        let tmp = tempfile::tempdir().unwrap();
        let server = Arc::new(ServerState::from_config(config(tmp.path(), vec![]), LocalFs::new()));
        let (mut client, server_side) = tokio::io::duplex(1 << 16);
        let task = tokio::spawn(handle_connection(server_side, server, std::future::pending()));

        async fn call(client: &mut tokio::io::DuplexStream, req: Request, uid: u16, tid: u32) -> Answer {
            let header = Header {
                command: req.command().as_u16(),
                user_id: uid,
                tree_id: tid,
                ..Header::default()
            };
            let mut buf = BytesMut::new();
            header.serialize(&mut buf);
            req.serialize(&mut buf);
            transport::write_frame(client, &buf).await.unwrap();
            let frame = transport::read_frame(client).await.unwrap();
            Answer {
                header: Header::parse(&frame).unwrap(),
                body: frame[HEADER_SIZE..].to_vec(),
                close: false,
            }
        }

        call(&mut client, negotiate_req(&[0x0300, 0x0202]), 0, 0).await.ok();
        let uid = call(&mut client, setup_req("", b""), 0, 0).await.header.user_id;
        let tid = call(&mut client, tree_req("\\\\TESTSRV\\public"), uid, 0).await.header.tree_id;

        let created = call(&mut client, create_req("hello.txt", RW, create::FILE_CREATE), uid, tid).await;
        let fid = fid_of(&created);
        call(&mut client, write_req(fid, 0, b"hello"), uid, tid).await.ok();
        call(&mut client, close_req(fid), uid, tid).await.ok();
        assert_eq!(std::fs::read(tmp.path().join("hello.txt")).unwrap(), b"hello");

        call(&mut client, Request::Logoff, uid, 0).await.ok();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_client_eof_ends_connection_cleanly() {
        let server = Arc::new(ServerState::from_config(config(Path::new(ROOT), vec![]), MemoryFs::new()));
        let (client, server_side) = tokio::io::duplex(1024);
        drop(client);
        assert!(handle_connection(server_side, server, std::future::pending()).await.is_ok());
    }

    #[tokio::test]
    async fn test_idle_connection_times_out() {
        let mut cfg = config(Path::new(ROOT), vec![]);
        cfg.idle_timeout_secs = Some(1);
        let server = Arc::new(ServerState::from_config(cfg, MemoryFs::new()));
        let (_client, server_side) = tokio::io::duplex(1024);
        let result = handle_connection(server_side, server, std::future::pending()).await;
        assert!(matches!(result, Err(ServerError::IdleTimeout)));
    }

    #[tokio::test]
    async fn test_server_shutdown_releases_open_handles() {
        let storage = MemoryFs::new();
        storage.insert(Path::new(ROOT), "notes.txt", b"abc");
        let server = Arc::new(ServerState::from_config(config(Path::new(ROOT), vec![]), storage));
        let (mut client, server_side) = tokio::io::duplex(1 << 16);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let stop = async move {
            let _ = stop_rx.await;
        };
        let task = tokio::spawn(handle_connection(server_side, server.clone(), stop));

        async fn call(client: &mut tokio::io::DuplexStream, req: Request, uid: u16, tid: u32) -> Header {
            let header = Header {
                command: req.command().as_u16(),
                user_id: uid,
                tree_id: tid,
                ..Header::default()
            };
            let mut buf = BytesMut::new();
            header.serialize(&mut buf);
            req.serialize(&mut buf);
            transport::write_frame(client, &buf).await.unwrap();
            Header::parse(&transport::read_frame(client).await.unwrap()).unwrap()
        }

        call(&mut client, negotiate_req(&[0x0300]), 0, 0).await;
        let uid = call(&mut client, setup_req("", b""), 0, 0).await.user_id;
        let tid = call(&mut client, tree_req("\\\\TESTSRV\\public"), uid, 0).await.tree_id;
        let opened = call(&mut client, create_req("notes.txt", RW, create::FILE_OPEN), uid, tid).await;
        assert_eq!(opened.status, Status::Success);
        assert!(server.storage.closed().is_empty());

        stop_tx.send(()).unwrap();
        assert!(task.await.unwrap().is_ok());
        assert_eq!(server.storage.closed().len(), 1);
    }
}
