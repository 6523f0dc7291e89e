//! Persistence seams for the tree cache and the credential broker.
//!
//! The core only talks to the [`TreeStore`] and [`CredentialStore`] traits;
//! [`SqliteStore`] is the shipped implementation of both.

mod sqlite;

pub use sqlite::SqliteStore;

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::crypto::Sealed;
use crate::types::Namespace;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The SQLite layer rejected a statement.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// An IO operation around the database file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A thread panicked while holding the connection.
    #[error("database connection lock poisoned")]
    Poisoned,
}

/// Node type of a cached tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Blob,
    Tree,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Blob => "blob",
            EntryKind::Tree => "tree",
        }
    }

    /// Maps a git object type name; anything else (e.g. submodule `commit`) is `None`.
    pub fn from_git_type(kind: &str) -> Option<Self> {
        match kind {
            "blob" => Some(EntryKind::Blob),
            "tree" => Some(EntryKind::Tree),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One row per tree node known to the local mirror.
///
/// `content` and `sha` are only present for blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub path: String,
    pub parent_path: String,
    pub name: String,
    pub kind: EntryKind,
    pub content: Option<String>,
    pub sha: Option<String>,
    pub last_updated: i64,
}

/// Number of rows touched by [`TreeStore::write_blobs`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub updated: usize,
    pub inserted: usize,
}

/// Stored installation token, encrypted at rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationTokenRecord {
    pub installation_id: u64,
    pub sealed: Sealed,
    /// Unix seconds.
    pub expires_at: i64,
}

/// Cached tree entries, keyed by `(owner, repo, branch, path)`.
pub trait TreeStore {
    /// Entries whose `parent_path` is `dir`, sorted by path.
    fn list_directory(&self, ns: &Namespace, dir: &str) -> Result<Vec<CachedEntry>, StoreError>;

    /// Whether `dir` has a materialized listing (a marker row or any child entry).
    fn is_directory_cached(&self, ns: &Namespace, dir: &str) -> Result<bool, StoreError>;

    /// The subset of `dirs` that have a materialized listing.
    fn cached_directories(
        &self,
        ns: &Namespace,
        dirs: &[String],
    ) -> Result<HashSet<String>, StoreError>;

    /// Inserts a full directory listing plus its marker in one batch.
    ///
    /// Rows that already exist are left alone, so two racing populates of the
    /// same directory both succeed.
    fn insert_directory(
        &self,
        ns: &Namespace,
        dir: &str,
        entries: &[CachedEntry],
        fetched_at: i64,
    ) -> Result<(), StoreError>;

    /// Deletes entries by exact path, returning how many rows went away.
    fn delete_entries(&self, ns: &Namespace, paths: &[String]) -> Result<usize, StoreError>;

    /// Rewrites content/sha/last_updated of `modified` in place and upserts `added`,
    /// all in one transaction.
    ///
    /// A modified path with no existing row is inserted instead, so a listing
    /// never loses a file the remote still has.
    fn write_blobs(
        &self,
        ns: &Namespace,
        modified: &[CachedEntry],
        added: &[CachedEntry],
    ) -> Result<WriteCounts, StoreError>;
}

/// Token rows plus the read-only authorization tables.
pub trait CredentialStore {
    fn user_token(&self, user_id: &str) -> Result<Option<Sealed>, StoreError>;

    fn installation_token(
        &self,
        installation_id: u64,
    ) -> Result<Option<InstallationTokenRecord>, StoreError>;

    fn insert_installation_token(&self, record: &InstallationTokenRecord)
    -> Result<(), StoreError>;

    /// Full-row overwrite keyed by installation id.
    fn update_installation_token(&self, record: &InstallationTokenRecord)
    -> Result<(), StoreError>;

    fn has_active_subscription(&self, owner: &str) -> Result<bool, StoreError>;

    fn has_collaborator_grant(
        &self,
        user_id: &str,
        owner: &str,
        repo: &str,
    ) -> Result<bool, StoreError>;
}

impl<T: TreeStore + ?Sized> TreeStore for &T {
    fn list_directory(&self, ns: &Namespace, dir: &str) -> Result<Vec<CachedEntry>, StoreError> {
        (**self).list_directory(ns, dir)
    }

    fn is_directory_cached(&self, ns: &Namespace, dir: &str) -> Result<bool, StoreError> {
        (**self).is_directory_cached(ns, dir)
    }

    fn cached_directories(
        &self,
        ns: &Namespace,
        dirs: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        (**self).cached_directories(ns, dirs)
    }

    fn insert_directory(
        &self,
        ns: &Namespace,
        dir: &str,
        entries: &[CachedEntry],
        fetched_at: i64,
    ) -> Result<(), StoreError> {
        (**self).insert_directory(ns, dir, entries, fetched_at)
    }

    fn delete_entries(&self, ns: &Namespace, paths: &[String]) -> Result<usize, StoreError> {
        (**self).delete_entries(ns, paths)
    }

    fn write_blobs(
        &self,
        ns: &Namespace,
        modified: &[CachedEntry],
        added: &[CachedEntry],
    ) -> Result<WriteCounts, StoreError> {
        (**self).write_blobs(ns, modified, added)
    }
}

impl<T: CredentialStore + ?Sized> CredentialStore for &T {
    fn user_token(&self, user_id: &str) -> Result<Option<Sealed>, StoreError> {
        (**self).user_token(user_id)
    }

    fn installation_token(
        &self,
        installation_id: u64,
    ) -> Result<Option<InstallationTokenRecord>, StoreError> {
        (**self).installation_token(installation_id)
    }

    fn insert_installation_token(
        &self,
        record: &InstallationTokenRecord,
    ) -> Result<(), StoreError> {
        (**self).insert_installation_token(record)
    }

    fn update_installation_token(
        &self,
        record: &InstallationTokenRecord,
    ) -> Result<(), StoreError> {
        (**self).update_installation_token(record)
    }

    fn has_active_subscription(&self, owner: &str) -> Result<bool, StoreError> {
        (**self).has_active_subscription(owner)
    }

    fn has_collaborator_grant(
        &self,
        user_id: &str,
        owner: &str,
        repo: &str,
    ) -> Result<bool, StoreError> {
        (**self).has_collaborator_grant(user_id, owner, repo)
    }
}
