//! Virtual Filesystem layer.
//!
//! The connection performs every file operation through the `Storage`
//! trait, so the protocol engine never touches the host filesystem
//! directly. Paths arrive exactly as the client sent them (backslash
//! separated, relative to the share root); each backend is responsible for
//! keeping them inside that root.
//!
//! Timestamps are Windows FILETIME values (100-nanosecond intervals since
//! January 1, 1601).

use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::smb::query::FileInformation;

pub use crate::smb::query::InfoChange;

pub mod local;
#[cfg(test)]
pub mod memory;

pub use local::LocalFs;

/// Windows FILETIME epoch offset from Unix epoch (100-ns intervals).
const FILETIME_UNIX_DIFF: u64 = 116_444_736_000_000_000;

/// Metadata about a file or directory, using Windows FILETIME timestamps
/// and NT file attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub end_of_file: u64,
    pub allocation_size: u64,
    pub creation_time: u64,
    pub last_access_time: u64,
    pub last_write_time: u64,
    pub change_time: u64,
    pub file_attributes: u32,
    pub is_directory: bool,
}

impl From<&FileInfo> for FileInformation {
    fn from(info: &FileInfo) -> Self {
        FileInformation {
            creation_time: info.creation_time,
            last_access_time: info.last_access_time,
            last_write_time: info.last_write_time,
            change_time: info.change_time,
            file_attributes: info.file_attributes,
            allocation_size: info.allocation_size,
            end_of_file: info.end_of_file,
            directory: info.is_directory,
        }
    }
}

/// Convert a `SystemTime` to a Windows FILETIME value.
pub fn system_time_to_filetime(t: SystemTime) -> u64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as u64 / 100 + FILETIME_UNIX_DIFF,
        Err(_) => FILETIME_UNIX_DIFF,
    }
}

/// Convert a Windows FILETIME to a `SystemTime`, clamping pre-1970 values
/// to the Unix epoch.
pub fn filetime_to_system_time(ft: u64) -> SystemTime {
    let intervals = ft.saturating_sub(FILETIME_UNIX_DIFF);
    UNIX_EPOCH + Duration::from_nanos(intervals.saturating_mul(100))
}

/// How CREATE wants a file opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenParams {
    pub access: u32,
    pub disposition: u32,
    pub directory: bool,
}

/// A successfully opened file.
#[derive(Debug)]
pub struct Opened<H> {
    pub handle: H,
    pub info: FileInfo,
    /// Whether the open created the file rather than finding it.
    pub created: bool,
}

/// What QUERY_INFO and SET_INFO address: an open handle or a name.
#[derive(Debug)]
pub enum Target<'a, H> {
    Handle(&'a H),
    Path { root: &'a Path, path: &'a str },
}

/// File storage behind a share.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Per-open state owned by the connection until it is closed.
    type Handle: Send + Sync + 'static;

    async fn open(
        &self,
        root: &Path,
        path: &str,
        params: OpenParams,
    ) -> io::Result<Opened<Self::Handle>>;

    /// Read up to `length` bytes at `offset`; short only at end of file.
    async fn read(&self, handle: &Self::Handle, offset: u64, length: u32) -> io::Result<Vec<u8>>;

    async fn write(&self, handle: &Self::Handle, offset: u64, data: &[u8]) -> io::Result<u32>;

    async fn flush(&self, handle: &Self::Handle) -> io::Result<()>;

    async fn close(&self, handle: Self::Handle) -> io::Result<()>;

    async fn delete(&self, root: &Path, path: &str) -> io::Result<()>;

    async fn rename(&self, root: &Path, from: &str, to: &str) -> io::Result<()>;

    async fn query_info(&self, target: Target<'_, Self::Handle>) -> io::Result<FileInfo>;

    async fn set_info(&self, target: Target<'_, Self::Handle>, change: InfoChange)
        -> io::Result<()>;
}
