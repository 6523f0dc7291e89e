//! Local mirror of GitHub repository trees plus the credential broker that
//! decides which token a caller may use to fetch them.

pub mod broker;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod remote;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

use std::time::{SystemTime, UNIX_EPOCH};

pub use broker::{BrokerError, CredentialBroker, RequestScope, Session, StaticSession};
pub use cache::{ChangeSet, ReconcileReport, TreeCache, TreeError};
pub use config::Config;
pub use store::SqliteStore;
pub use types::{Branch, Namespace, RepoKey};

/// Current time in unix seconds.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
