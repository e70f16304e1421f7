//! Session authentication.
//!
//! The connection hands each SESSION_SETUP to an `Authenticator` together
//! with the challenge issued at negotiation. `AccountTable` is the
//! config-backed implementation: the security blob carries the account's
//! password. A named account that sends an empty blob gets one more leg,
//! answered with the connection challenge, before it must present the
//! password.

use tracing::{debug, warn};

use crate::config::{Config, UserConfig};
use crate::smb::session::SessionSetupRequest;

/// Result of one authentication leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The session is usable.
    Established { user: String, guest: bool },
    /// Another leg is required; the blob goes back to the client.
    Continue(Vec<u8>),
    /// The credentials are wrong.
    Rejected,
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, request: &SessionSetupRequest, challenge: &[u8; 8]) -> AuthOutcome;
}

/// Configured accounts plus optional guest access.
#[derive(Debug, Clone, Default)]
pub struct AccountTable {
    users: Vec<UserConfig>,
    guest_ok: bool,
}

impl AccountTable {
    pub fn new(users: Vec<UserConfig>, guest_ok: bool) -> Self {
        AccountTable { users, guest_ok }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.users.clone(), config.guest_allowed())
    }

    fn find(&self, name: &str) -> Option<&UserConfig> {
        self.users.iter().find(|u| u.username.eq_ignore_ascii_case(name))
    }

    fn guest(&self, account: &str) -> AuthOutcome {
        if self.guest_ok {
            debug!(account, "guest session");
            AuthOutcome::Established {
                user: account.to_string(),
                guest: true,
            }
        } else {
            warn!(account, "guest access refused");
            AuthOutcome::Rejected
        }
    }
}

impl Authenticator for AccountTable {
    fn authenticate(&self, request: &SessionSetupRequest, challenge: &[u8; 8]) -> AuthOutcome {
        let account = request.account_name.trim_end_matches('\0');

        if account.is_empty() || (self.users.is_empty() && self.guest_ok) {
            return self.guest(account);
        }

        match self.find(account) {
            Some(_) if request.security_blob.is_empty() => {
                debug!(account, "requesting credentials");
                AuthOutcome::Continue(challenge.to_vec())
            }
            Some(user) if user.password.as_bytes() == request.security_blob.as_slice() => {
                debug!(account, "authenticated");
                AuthOutcome::Established {
                    user: user.username.clone(),
                    guest: false,
                }
            }
            Some(_) => {
                warn!(account, "wrong password");
                AuthOutcome::Rejected
            }
            None => {
                warn!(account, "unknown account");
                AuthOutcome::Rejected
            }
        }
    }
}
