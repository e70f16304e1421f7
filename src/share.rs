//! Share name resolution.
//!
//! The connection only sees the `ShareResolver` trait; `ShareTable` is the
//! config-backed implementation used by the binary.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::ShareConfig;

/// A resolved share: the root all paths in a tree are relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    pub name: String,
    pub root: PathBuf,
    pub read_only: bool,
    /// Guest sessions may attach.
    pub guest_ok: bool,
}

/// Maps a client-supplied share name to a share.
pub trait ShareResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Share>;
}

/// Shares from the configuration file, looked up case-insensitively.
#[derive(Debug, Default)]
pub struct ShareTable {
    shares: HashMap<String, Share>,
}

impl ShareTable {
    pub fn new(configs: &[ShareConfig]) -> Self {
        let shares = configs
            .iter()
            .map(|c| {
                (
                    c.name.to_lowercase(),
                    Share {
                        name: c.name.clone(),
                        root: c.path.clone(),
                        read_only: c.read_only,
                        guest_ok: c.guest_ok,
                    },
                )
            })
            .collect();
        ShareTable { shares }
    }
}

impl ShareResolver for ShareTable {
    fn resolve(&self, name: &str) -> Option<Share> {
        self.shares.get(&name.to_lowercase()).cloned()
    }
}
