//! SQLite-backed store for cached tree entries and credential rows.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::{
    CachedEntry, CredentialStore, EntryKind, InstallationTokenRecord, StoreError, TreeStore,
    WriteCounts,
};
use crate::crypto::Sealed;
use crate::types::Namespace;

/// Upper bound on directories per `IN (...)` query, well below SQLite's
/// host parameter limit.
const DIR_QUERY_CHUNK: usize = 500;

const ENTRY_COLUMNS: &str =
    "owner, repo, branch, path, parent_path, name, kind, content, sha, last_updated";

impl ToSql for EntryKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EntryKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        EntryKind::from_git_type(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CachedEntry> {
    Ok(CachedEntry {
        owner: row.get(0)?,
        repo: row.get(1)?,
        branch: row.get(2)?,
        path: row.get(3)?,
        parent_path: row.get(4)?,
        name: row.get(5)?,
        kind: row.get(6)?,
        content: row.get(7)?,
        sha: row.get(8)?,
        last_updated: row.get(9)?,
    })
}

/// Persistent store for the mirror.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Initialize the database schema. This is idempotent.
    pub fn init(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entries (
                owner TEXT NOT NULL,
                repo TEXT NOT NULL,
                branch TEXT NOT NULL,
                path TEXT NOT NULL,
                parent_path TEXT NOT NULL,
                name TEXT NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('blob', 'tree')),
                content TEXT,
                sha TEXT,
                last_updated INTEGER NOT NULL,
                PRIMARY KEY (owner, repo, branch, path)
            );

            CREATE TABLE IF NOT EXISTS directories (
                owner TEXT NOT NULL,
                repo TEXT NOT NULL,
                branch TEXT NOT NULL,
                path TEXT NOT NULL,
                fetched_at INTEGER NOT NULL,
                PRIMARY KEY (owner, repo, branch, path)
            );

            CREATE TABLE IF NOT EXISTS installation_tokens (
                installation_id INTEGER PRIMARY KEY,
                ciphertext BLOB NOT NULL,
                iv BLOB NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_tokens (
                user_id TEXT PRIMARY KEY,
                ciphertext BLOB NOT NULL,
                iv BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS subscriptions (
                owner TEXT PRIMARY KEY,
                status TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS collaborator_grants (
                user_id TEXT NOT NULL,
                owner TEXT NOT NULL,
                repo TEXT NOT NULL,
                PRIMARY KEY (user_id, owner, repo)
            );

            CREATE INDEX IF NOT EXISTS idx_entries_parent
                ON entries(owner, repo, branch, parent_path);
            ",
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Store (or replace) a user's encrypted personal token.
    pub fn put_user_token(&self, user_id: &str, sealed: &Sealed) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user_tokens (user_id, ciphertext, iv) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                ciphertext = excluded.ciphertext,
                iv = excluded.iv",
            params![user_id, sealed.ciphertext, sealed.iv],
        )?;
        Ok(())
    }

    /// Record the subscription status for an owner.
    pub fn put_subscription(&self, owner: &str, status: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO subscriptions (owner, status) VALUES (?1, ?2)
             ON CONFLICT(owner) DO UPDATE SET status = excluded.status",
            params![owner, status],
        )?;
        Ok(())
    }

    /// Grant a user access to a repository.
    pub fn put_collaborator_grant(
        &self,
        user_id: &str,
        owner: &str,
        repo: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO collaborator_grants (user_id, owner, repo) VALUES (?1, ?2, ?3)",
            params![user_id, owner, repo],
        )?;
        Ok(())
    }

    /// Count of installation token rows for an installation (always 0 or 1).
    pub fn installation_token_rows(&self, installation_id: u64) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM installation_tokens WHERE installation_id = ?1",
            params![installation_id as i64],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Total cached entries in a namespace.
    pub fn entry_count(&self, ns: &Namespace) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE owner = ?1 AND repo = ?2 AND branch = ?3",
            params![ns.owner(), ns.repo(), ns.branch()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl TreeStore for SqliteStore {
    fn list_directory(&self, ns: &Namespace, dir: &str) -> Result<Vec<CachedEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries
             WHERE owner = ?1 AND repo = ?2 AND branch = ?3 AND parent_path = ?4
             ORDER BY path"
        ))?;
        let rows = stmt.query_map(
            params![ns.owner(), ns.repo(), ns.branch(), dir],
            entry_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn is_directory_cached(&self, ns: &Namespace, dir: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM directories
                 WHERE owner = ?1 AND repo = ?2 AND branch = ?3 AND path = ?4
                 UNION ALL
                 SELECT 1 FROM entries
                 WHERE owner = ?1 AND repo = ?2 AND branch = ?3 AND parent_path = ?4
                 LIMIT 1",
                params![ns.owner(), ns.repo(), ns.branch(), dir],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn cached_directories(
        &self,
        ns: &Namespace,
        dirs: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        let conn = self.conn()?;
        let mut cached = HashSet::new();

        for chunk in dirs.chunks(DIR_QUERY_CHUNK) {
            let placeholders = (0..chunk.len())
                .map(|i| format!("?{}", i + 4))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT path FROM directories
                 WHERE owner = ?1 AND repo = ?2 AND branch = ?3 AND path IN ({placeholders})
                 UNION
                 SELECT DISTINCT parent_path FROM entries
                 WHERE owner = ?1 AND repo = ?2 AND branch = ?3 AND parent_path IN ({placeholders})"
            );

            let values = [ns.owner(), ns.repo(), ns.branch()]
                .into_iter()
                .chain(chunk.iter().map(String::as_str));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), |row| row.get::<_, String>(0))?;
            for row in rows {
                cached.insert(row?);
            }
        }

        Ok(cached)
    }

    fn insert_directory(
        &self,
        ns: &Namespace,
        dir: &str,
        entries: &[CachedEntry],
        fetched_at: i64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO entries ({ENTRY_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ))?;
            for entry in entries {
                stmt.execute(params![
                    entry.owner,
                    entry.repo,
                    entry.branch,
                    entry.path,
                    entry.parent_path,
                    entry.name,
                    entry.kind,
                    entry.content,
                    entry.sha,
                    entry.last_updated,
                ])?;
            }
            tx.execute(
                "INSERT OR IGNORE INTO directories (owner, repo, branch, path, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![ns.owner(), ns.repo(), ns.branch(), dir, fetched_at],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_entries(&self, ns: &Namespace, paths: &[String]) -> Result<usize, StoreError> {
        if paths.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare(
                "DELETE FROM entries WHERE owner = ?1 AND repo = ?2 AND branch = ?3 AND path = ?4",
            )?;
            for path in paths {
                deleted += stmt.execute(params![ns.owner(), ns.repo(), ns.branch(), path])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn write_blobs(
        &self,
        ns: &Namespace,
        modified: &[CachedEntry],
        added: &[CachedEntry],
    ) -> Result<WriteCounts, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut counts = WriteCounts::default();
        {
            let mut update = tx.prepare(
                "UPDATE entries SET content = ?1, sha = ?2, last_updated = ?3
                 WHERE owner = ?4 AND repo = ?5 AND branch = ?6 AND path = ?7",
            )?;
            let mut missing = Vec::new();
            for entry in modified {
                let changed = update.execute(params![
                    entry.content,
                    entry.sha,
                    entry.last_updated,
                    ns.owner(),
                    ns.repo(),
                    ns.branch(),
                    entry.path,
                ])?;
                if changed == 0 {
                    missing.push(entry);
                }
                counts.updated += changed;
            }

            // An add may race with another reconcile that already inserted
            // the same path; the newer fetch wins.
            let mut upsert = tx.prepare(&format!(
                "INSERT INTO entries ({ENTRY_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(owner, repo, branch, path) DO UPDATE SET
                    content = excluded.content,
                    sha = excluded.sha,
                    last_updated = excluded.last_updated"
            ))?;
            for entry in added.iter().chain(missing) {
                counts.inserted += upsert.execute(params![
                    ns.owner(),
                    ns.repo(),
                    ns.branch(),
                    entry.path,
                    entry.parent_path,
                    entry.name,
                    entry.kind,
                    entry.content,
                    entry.sha,
                    entry.last_updated,
                ])?;
            }
        }
        tx.commit()?;
        Ok(counts)
    }
}

impl CredentialStore for SqliteStore {
    fn user_token(&self, user_id: &str) -> Result<Option<Sealed>, StoreError> {
        let conn = self.conn()?;
        let sealed = conn
            .query_row(
                "SELECT ciphertext, iv FROM user_tokens WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(Sealed {
                        ciphertext: row.get(0)?,
                        iv: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(sealed)
    }

    fn installation_token(
        &self,
        installation_id: u64,
    ) -> Result<Option<InstallationTokenRecord>, StoreError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT ciphertext, iv, expires_at FROM installation_tokens
                 WHERE installation_id = ?1",
                params![installation_id as i64],
                |row| {
                    Ok(InstallationTokenRecord {
                        installation_id,
                        sealed: Sealed {
                            ciphertext: row.get(0)?,
                            iv: row.get(1)?,
                        },
                        expires_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn insert_installation_token(
        &self,
        record: &InstallationTokenRecord,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        // Two callers minting the first token for an installation both land
        // here; the second overwrites the first.
        conn.execute(
            "INSERT INTO installation_tokens (installation_id, ciphertext, iv, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(installation_id) DO UPDATE SET
                ciphertext = excluded.ciphertext,
                iv = excluded.iv,
                expires_at = excluded.expires_at",
            params![
                record.installation_id as i64,
                record.sealed.ciphertext,
                record.sealed.iv,
                record.expires_at,
            ],
        )?;
        Ok(())
    }

    fn update_installation_token(
        &self,
        record: &InstallationTokenRecord,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE installation_tokens SET ciphertext = ?1, iv = ?2, expires_at = ?3
             WHERE installation_id = ?4",
            params![
                record.sealed.ciphertext,
                record.sealed.iv,
                record.expires_at,
                record.installation_id as i64,
            ],
        )?;
        Ok(())
    }

    fn has_active_subscription(&self, owner: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM subscriptions WHERE owner = ?1 AND status = 'active'",
                params![owner],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn has_collaborator_grant(
        &self,
        user_id: &str,
        owner: &str,
        repo: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM collaborator_grants
                 WHERE user_id = ?1 AND owner = ?2 AND repo = ?3",
                params![user_id, owner, repo],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}
