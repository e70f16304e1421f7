//! In-memory `Storage` that records every close, for connection tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::vfs::{FileInfo, InfoChange, OpenParams, Opened, Storage, Target};
use crate::smb::create;

#[derive(Debug)]
pub struct MemHandle {
    pub id: u64,
    key: String,
}

#[derive(Debug, Default)]
pub struct MemoryFs {
    files: Mutex<HashMap<String, Vec<u8>>>,
    next_id: AtomicU64,
    closed: Mutex<Vec<u64>>,
    opened: AtomicU64,
}

fn key(root: &Path, path: &str) -> String {
    format!("{}/{}", root.display(), path.replace('\\', "/").trim_start_matches('/'))
}

fn not_found() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "no such file")
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, root: &Path, path: &str, data: &[u8]) {
        self.files.lock().unwrap().insert(key(root, path), data.to_vec());
    }

    pub fn contents(&self, root: &Path, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(&key(root, path)).cloned()
    }

    pub fn closed(&self) -> Vec<u64> {
        self.closed.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    fn info(&self, key: &str) -> io::Result<FileInfo> {
        let files = self.files.lock().unwrap();
        let data = files.get(key).ok_or_else(not_found)?;
        Ok(FileInfo {
            name: key.rsplit('/').next().unwrap_or_default().to_string(),
            end_of_file: data.len() as u64,
            allocation_size: data.len() as u64,
            file_attributes: create::FILE_ATTRIBUTE_ARCHIVE,
            ..FileInfo::default()
        })
    }

    fn target_key(target: &Target<'_, MemHandle>) -> String {
        match target {
            Target::Handle(h) => h.key.clone(),
            Target::Path { root, path } => key(root, path),
        }
    }
}

#[async_trait]
impl Storage for MemoryFs {
    type Handle = MemHandle;

    async fn open(&self, root: &Path, path: &str, params: OpenParams) -> io::Result<Opened<MemHandle>> {
        let key = key(root, path);
        let created = {
            let mut files = self.files.lock().unwrap();
            let exists = files.contains_key(&key);
            match params.disposition {
                create::FILE_OPEN if !exists => return Err(not_found()),
                create::FILE_CREATE if exists => {
                    return Err(io::Error::new(io::ErrorKind::AlreadyExists, "exists"))
                }
                create::FILE_OPEN | create::FILE_OPEN_IF => {}
                _ => {
                    files.insert(key.clone(), Vec::new());
                }
            }
            files.entry(key.clone()).or_default();
            !exists
        };
        let info = self.info(&key)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Opened {
            handle: MemHandle { id, key },
            info,
            created,
        })
    }

    async fn read(&self, handle: &MemHandle, offset: u64, length: u32) -> io::Result<Vec<u8>> {
        let files = self.files.lock().unwrap();
        let data = files.get(&handle.key).ok_or_else(not_found)?;
        let start = (offset as usize).min(data.len());
        let end = (start + length as usize).min(data.len());
        Ok(data[start..end].to_vec())
    }

    async fn write(&self, handle: &MemHandle, offset: u64, data: &[u8]) -> io::Result<u32> {
        let mut files = self.files.lock().unwrap();
        let file = files.get_mut(&handle.key).ok_or_else(not_found)?;
        let end = offset as usize + data.len();
        if file.len() < end {
            file.resize(end, 0);
        }
        file[offset as usize..end].copy_from_slice(data);
        Ok(data.len() as u32)
    }

    async fn flush(&self, _handle: &MemHandle) -> io::Result<()> {
        Ok(())
    }

    async fn close(&self, handle: MemHandle) -> io::Result<()> {
        self.closed.lock().unwrap().push(handle.id);
        Ok(())
    }

    async fn delete(&self, root: &Path, path: &str) -> io::Result<()> {
        self.files
            .lock()
            .unwrap()
            .remove(&key(root, path))
            .map(|_| ())
            .ok_or_else(not_found)
    }

    async fn rename(&self, root: &Path, from: &str, to: &str) -> io::Result<()> {
        let mut files = self.files.lock().unwrap();
        let to = key(root, to);
        if files.contains_key(&to) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "exists"));
        }
        let data = files.remove(&key(root, from)).ok_or_else(not_found)?;
        files.insert(to, data);
        Ok(())
    }

    async fn query_info(&self, target: Target<'_, MemHandle>) -> io::Result<FileInfo> {
        self.info(&Self::target_key(&target))
    }

    async fn set_info(&self, target: Target<'_, MemHandle>, change: InfoChange) -> io::Result<()> {
        let mut files = self.files.lock().unwrap();
        let file = files.get_mut(&Self::target_key(&target)).ok_or_else(not_found)?;
        if let InfoChange::EndOfFile(len) = change {
            file.resize(len as usize, 0);
        }
        Ok(())
    }
}
