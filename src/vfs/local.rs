//! `Storage` over the host filesystem via `tokio::fs`.
//!
//! All path resolution includes traversal protection: resolved paths
//! must remain within the share root.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::smb::create::{self, wants_write};
use crate::vfs::{
    filetime_to_system_time, system_time_to_filetime, FileInfo, InfoChange, OpenParams, Opened,
    Storage, Target,
};

/// Largest single read served from disk (1 MB).
const MAX_READ: u32 = 1_048_576;

/// An open file or directory.
#[derive(Debug)]
pub struct LocalHandle {
    file: fs::File,
    path: PathBuf,
}

/// Serves shares straight from local directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        LocalFs
    }
}

fn traversal(candidate: &Path) -> io::Error {
    warn!("Path traversal detected: {:?}", candidate);
    io::Error::new(io::ErrorKind::PermissionDenied, "path escapes share root")
}

/// Safely resolve a relative client path within a share root.
///
/// Converts backslashes to forward slashes, strips leading separators,
/// canonicalizes via the filesystem, and verifies the result is inside `root`.
/// A path that escapes the root fails with `PermissionDenied`; a path whose
/// parent doesn't exist fails with `NotFound`.
pub fn safe_resolve(root: &Path, relative: &str) -> io::Result<PathBuf> {
    let cleaned = relative.trim_end_matches('\0').replace('\\', "/");
    let cleaned = cleaned.trim_start_matches('/');

    let candidate = if cleaned.is_empty() {
        root.to_path_buf()
    } else {
        root.join(cleaned)
    };

    // Reject `..` components before touching the filesystem
    if cleaned.split('/').any(|c| c == "..") {
        return Err(traversal(&candidate));
    }

    let root_canon = root.canonicalize()?;

    if candidate.exists() {
        let canon = candidate.canonicalize()?;
        if canon.starts_with(&root_canon) {
            Ok(canon)
        } else {
            Err(traversal(&candidate))
        }
    } else {
        // Not there yet (create case): canonicalize the parent
        let parent = candidate
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no parent"))?;
        let name = candidate
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no file name"))?;
        let parent_canon = parent.canonicalize()?;
        if parent_canon.starts_with(&root_canon) {
            Ok(parent_canon.join(name))
        } else {
            Err(traversal(&candidate))
        }
    }
}

fn info_from_metadata(path: &Path, meta: &std::fs::Metadata) -> FileInfo {
    let name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let is_dir = meta.is_dir();
    let size = if is_dir { 0 } else { meta.len() };
    let modified = meta.modified().unwrap_or(UNIX_EPOCH);
    let accessed = meta.accessed().unwrap_or(UNIX_EPOCH);
    let created = meta.created().unwrap_or(modified);

    let mut attributes = if is_dir {
        create::FILE_ATTRIBUTE_DIRECTORY
    } else {
        create::FILE_ATTRIBUTE_ARCHIVE
    };
    if meta.permissions().readonly() {
        attributes |= create::FILE_ATTRIBUTE_READONLY;
    }

    FileInfo {
        name,
        end_of_file: size,
        allocation_size: (size + 4095) & !4095, // round up to 4K block
        creation_time: system_time_to_filetime(created),
        last_access_time: system_time_to_filetime(accessed),
        last_write_time: system_time_to_filetime(modified),
        change_time: system_time_to_filetime(modified),
        file_attributes: attributes,
        is_directory: is_dir,
    }
}

/// Query metadata for a file or directory.
pub async fn stat(path: &Path) -> io::Result<FileInfo> {
    let meta = fs::metadata(path).await?;
    Ok(info_from_metadata(path, &meta))
}

/// Open or create a file based on the CREATE disposition.
///
/// Returns `(file_handle, was_created)`. The file is opened for writing only
/// when the access mask or disposition needs it.
async fn open_file(path: &Path, params: OpenParams) -> io::Result<(fs::File, bool)> {
    let exists = path.exists();

    if params.directory || (exists && path.is_dir()) {
        let created = match params.disposition {
            create::FILE_OPEN | create::FILE_OVERWRITE => false,
            create::FILE_CREATE => {
                fs::create_dir(path).await?;
                true
            }
            create::FILE_OPEN_IF | create::FILE_SUPERSEDE | create::FILE_OVERWRITE_IF => {
                if !exists {
                    fs::create_dir(path).await?;
                }
                !exists
            }
            _ => return Err(bad_disposition()),
        };
        let f = fs::File::open(path).await?;
        if !f.metadata().await?.is_dir() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a directory"));
        }
        return Ok((f, created));
    }

    let mut options = fs::OpenOptions::new();
    options.read(true);
    let writable = wants_write(params.access) || create::disposition_modifies(params.disposition);
    options.write(writable);

    let created = match params.disposition {
        // Open existing only
        create::FILE_OPEN => false,
        // Create new; fail if exists
        create::FILE_CREATE => {
            options.create_new(true);
            true
        }
        // Open if exists, else create
        create::FILE_OPEN_IF => {
            options.create(true);
            !exists
        }
        // Create or truncate
        create::FILE_SUPERSEDE | create::FILE_OVERWRITE_IF => {
            options.create(true).truncate(true);
            !exists
        }
        // Truncate existing; fail if missing
        create::FILE_OVERWRITE => {
            options.truncate(true);
            false
        }
        _ => return Err(bad_disposition()),
    };

    let f = options.open(path).await?;
    Ok((f, created))
}

fn bad_disposition() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "unknown create disposition")
}

/// Delete a file or empty directory.
async fn delete_path(path: &Path) -> io::Result<()> {
    let meta = fs::metadata(path).await?;
    if meta.is_dir() {
        fs::remove_dir(path).await
    } else {
        fs::remove_file(path).await
    }
}

fn apply_times(path: &Path, change: InfoChange) -> io::Result<()> {
    let InfoChange::Basic {
        last_access_time,
        last_write_time,
        file_attributes,
        ..
    } = change
    else {
        return Ok(());
    };

    let mut times = std::fs::FileTimes::new();
    if last_access_time != 0 {
        times = times.set_accessed(filetime_to_system_time(last_access_time));
    }
    if last_write_time != 0 {
        times = times.set_modified(filetime_to_system_time(last_write_time));
    }
    let file = std::fs::File::open(path)?;
    file.set_times(times)?;

    if file_attributes != 0 {
        let mut perms = file.metadata()?.permissions();
        let readonly = file_attributes & create::FILE_ATTRIBUTE_READONLY != 0;
        if perms.readonly() != readonly {
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(readonly);
            std::fs::set_permissions(path, perms)?;
        }
    }
    Ok(())
}

#[async_trait]
impl Storage for LocalFs {
    type Handle = LocalHandle;

    async fn open(&self, root: &Path, path: &str, params: OpenParams) -> io::Result<Opened<LocalHandle>> {
        let full = safe_resolve(root, path)?;
        let (file, created) = open_file(&full, params).await?;
        let info = info_from_metadata(&full, &file.metadata().await?);
        debug!(path = %full.display(), created, "opened");
        Ok(Opened {
            handle: LocalHandle { file, path: full },
            info,
            created,
        })
    }

    async fn read(&self, handle: &LocalHandle, offset: u64, length: u32) -> io::Result<Vec<u8>> {
        let length = length.min(MAX_READ) as u64;
        let mut file = handle.file.try_clone().await?;
        file.seek(io::SeekFrom::Start(offset)).await?;
        let mut buf = Vec::with_capacity(length as usize);
        file.take(length).read_to_end(&mut buf).await?;
        Ok(buf)
    }

    async fn write(&self, handle: &LocalHandle, offset: u64, data: &[u8]) -> io::Result<u32> {
        let mut file = handle.file.try_clone().await?;
        file.seek(io::SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(data.len() as u32)
    }

    async fn flush(&self, handle: &LocalHandle) -> io::Result<()> {
        handle.file.sync_all().await
    }

    async fn close(&self, handle: LocalHandle) -> io::Result<()> {
        let mut file = handle.file;
        file.flush().await?;
        debug!(path = %handle.path.display(), "closed");
        Ok(())
    }

    async fn delete(&self, root: &Path, path: &str) -> io::Result<()> {
        let full = safe_resolve(root, path)?;
        delete_path(&full).await
    }

    async fn rename(&self, root: &Path, from: &str, to: &str) -> io::Result<()> {
        let src = safe_resolve(root, from)?;
        let dst = safe_resolve(root, to)?;
        if !src.exists() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "rename source missing"));
        }
        if dst.exists() {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "rename target exists"));
        }
        fs::rename(&src, &dst).await
    }

    async fn query_info(&self, target: Target<'_, LocalHandle>) -> io::Result<FileInfo> {
        match target {
            Target::Handle(h) => Ok(info_from_metadata(&h.path, &h.file.metadata().await?)),
            Target::Path { root, path } => stat(&safe_resolve(root, path)?).await,
        }
    }

    async fn set_info(&self, target: Target<'_, LocalHandle>, change: InfoChange) -> io::Result<()> {
        let path = match target {
            Target::Handle(h) => {
                if let InfoChange::EndOfFile(len) = change {
                    return h.file.set_len(len).await;
                }
                h.path.clone()
            }
            Target::Path { root, path } => safe_resolve(root, path)?,
        };
        match change {
            InfoChange::EndOfFile(len) => {
                let file = fs::OpenOptions::new().write(true).open(&path).await?;
                file.set_len(len).await
            }
            InfoChange::Basic { .. } => {
                tokio::task::spawn_blocking(move || apply_times(&path, change))
                    .await
                    .map_err(io::Error::other)?
            }
        }
    }
}
