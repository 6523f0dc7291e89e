//! Remote collaborators: the batched tree query service and the hosting API.

mod github;
mod graphql;

pub use github::GithubClient;

use thiserror::Error;

use crate::store::EntryKind;
use crate::types::{Namespace, RepoKey};

/// Errors from GitHub (or any other remote implementation).
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("query errors: {}", .0.join("; "))]
    Query(Vec<String>),

    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("GitHub App credentials are not configured")]
    MissingAppCredentials,

    #[error("failed to sign app JWT: {0}")]
    Jwt(String),
}

impl From<ureq::Error> for RemoteError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let url = response.get_url().to_string();
                let body = response
                    .into_string()
                    .unwrap_or_else(|_| "<unreadable body>".to_string());
                RemoteError::Status { status, url, body }
            }
            ureq::Error::Transport(transport) => RemoteError::Transport(transport.to_string()),
        }
    }
}

/// What an expression is expected to resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// A directory listing, with inline content for blob children.
    Tree,
    /// A single file's text and checksum.
    Blob,
}

/// One `<branch>:<path>` lookup inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchQuery {
    pub index: usize,
    pub expression: String,
    pub kind: QueryKind,
}

/// Blob content as returned by the remote. `text` is `None` for binary files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBlob {
    pub text: Option<String>,
    pub oid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTreeEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    /// Present for blob children.
    pub blob: Option<RemoteBlob>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteObject {
    Tree(Vec<RemoteTreeEntry>),
    Blob(RemoteBlob),
}

/// Result for the query with the same `index`. `object` is `None` when the
/// expression did not resolve (missing path, or the wrong object type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub index: usize,
    pub object: Option<RemoteObject>,
}

/// Batched "fetch by expression" service.
pub trait TreeClient {
    /// Resolve every query in one round trip. Results come back one per
    /// query, matched by `index`.
    fn fetch_batch(
        &self,
        ns: &Namespace,
        queries: &[BatchQuery],
        credential: &str,
    ) -> Result<Vec<BatchResult>, RemoteError>;
}

/// A freshly minted installation token.
#[derive(Clone, PartialEq, Eq)]
pub struct MintedToken {
    pub token: String,
    /// Unix seconds.
    pub expires_at: i64,
}

impl std::fmt::Debug for MintedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MintedToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The hosting API surface the credential broker needs.
pub trait InstallationApi {
    /// Installation id of the app on `key`, or `None` if the app is not installed.
    fn find_installation(&self, key: &RepoKey) -> Result<Option<u64>, RemoteError>;

    fn mint_installation_token(&self, installation_id: u64) -> Result<MintedToken, RemoteError>;
}

impl<T: TreeClient + ?Sized> TreeClient for &T {
    fn fetch_batch(
        &self,
        ns: &Namespace,
        queries: &[BatchQuery],
        credential: &str,
    ) -> Result<Vec<BatchResult>, RemoteError> {
        (**self).fetch_batch(ns, queries, credential)
    }
}

impl<T: InstallationApi + ?Sized> InstallationApi for &T {
    fn find_installation(&self, key: &RepoKey) -> Result<Option<u64>, RemoteError> {
        (**self).find_installation(key)
    }

    fn mint_installation_token(&self, installation_id: u64) -> Result<MintedToken, RemoteError> {
        (**self).mint_installation_token(installation_id)
    }
}
