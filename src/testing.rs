//! In-memory fakes for the remote collaborators, shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::now_unix;
use crate::remote::{
    BatchQuery, BatchResult, InstallationApi, MintedToken, RemoteBlob, RemoteError, RemoteObject,
    RemoteTreeEntry, TreeClient,
};
use crate::store::EntryKind;
use crate::types::{Namespace, RepoKey};

pub fn blob(text: &str, oid: &str) -> RemoteBlob {
    RemoteBlob {
        text: Some(text.to_string()),
        oid: oid.to_string(),
    }
}

/// A tree child; `Some(blob)` makes it a file, `None` a subdirectory.
pub fn tree_entry(path: &str, blob: Option<RemoteBlob>) -> RemoteTreeEntry {
    let name = path.rsplit('/').next().unwrap_or(path).to_string();
    RemoteTreeEntry {
        name,
        path: path.to_string(),
        kind: if blob.is_some() {
            EntryKind::Blob
        } else {
            EntryKind::Tree
        },
        blob,
    }
}

/// Serves objects by expression and records every batch it receives.
#[derive(Default)]
pub struct FakeTreeClient {
    objects: Mutex<HashMap<String, RemoteObject>>,
    calls: Mutex<Vec<Vec<BatchQuery>>>,
    fail_next: AtomicBool,
    failing: Mutex<HashSet<String>>,
}

impl FakeTreeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tree(&self, expression: &str, entries: Vec<RemoteTreeEntry>) {
        self.objects
            .lock()
            .unwrap()
            .insert(expression.to_string(), RemoteObject::Tree(entries));
    }

    pub fn set_blob(&self, expression: &str, blob: RemoteBlob) {
        self.objects
            .lock()
            .unwrap()
            .insert(expression.to_string(), RemoteObject::Blob(blob));
    }

    /// Makes the next `fetch_batch` fail with a transport error.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Any batch containing `expression` fails the way a partially
    /// resolved GraphQL response does.
    pub fn fail_expression(&self, expression: &str) {
        self.failing.lock().unwrap().insert(expression.to_string());
    }

    pub fn calls(&self) -> Vec<Vec<BatchQuery>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl TreeClient for FakeTreeClient {
    fn fetch_batch(
        &self,
        _ns: &Namespace,
        queries: &[BatchQuery],
        _credential: &str,
    ) -> Result<Vec<BatchResult>, RemoteError> {
        self.calls.lock().unwrap().push(queries.to_vec());
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(RemoteError::Transport("injected failure".to_string()));
        }

        let failing = self.failing.lock().unwrap();
        let failed: Vec<String> = queries
            .iter()
            .filter(|query| failing.contains(&query.expression))
            .map(|query| format!("{}: timeout", query.expression))
            .collect();
        if !failed.is_empty() {
            return Err(RemoteError::Query(failed));
        }

        let objects = self.objects.lock().unwrap();
        Ok(queries
            .iter()
            .map(|query| BatchResult {
                index: query.index,
                object: objects.get(&query.expression).cloned(),
            })
            .collect())
    }
}

fn bad_gateway(url: &str) -> RemoteError {
    RemoteError::Status {
        status: 502,
        url: url.to_string(),
        body: "Bad Gateway".to_string(),
    }
}

/// Hosting API fake with call counters.
pub struct FakeInstallationApi {
    installations: Mutex<HashMap<String, u64>>,
    /// Lifetime, in seconds from now, of the next minted token.
    token_ttl: Mutex<i64>,
    lookups: AtomicUsize,
    mints: AtomicUsize,
    fail_next_lookup: AtomicBool,
    fail_next_mint: AtomicBool,
}

impl Default for FakeInstallationApi {
    fn default() -> Self {
        Self {
            installations: Mutex::new(HashMap::new()),
            token_ttl: Mutex::new(3600),
            lookups: AtomicUsize::new(0),
            mints: AtomicUsize::new(0),
            fail_next_lookup: AtomicBool::new(false),
            fail_next_mint: AtomicBool::new(false),
        }
    }
}

impl FakeInstallationApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, repo: &str, installation_id: u64) {
        self.installations
            .lock()
            .unwrap()
            .insert(repo.to_string(), installation_id);
    }

    pub fn set_token_ttl(&self, secs: i64) {
        *self.token_ttl.lock().unwrap() = secs;
    }

    /// Makes the next `find_installation` fail with an HTTP 502.
    pub fn fail_next_lookup(&self) {
        self.fail_next_lookup.store(true, Ordering::SeqCst);
    }

    /// Makes the next `mint_installation_token` fail with an HTTP 502.
    pub fn fail_next_mint(&self) {
        self.fail_next_mint.store(true, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn mints(&self) -> usize {
        self.mints.load(Ordering::SeqCst)
    }
}

impl InstallationApi for FakeInstallationApi {
    fn find_installation(&self, key: &RepoKey) -> Result<Option<u64>, RemoteError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_lookup.swap(false, Ordering::SeqCst) {
            return Err(bad_gateway("/repos/installation"));
        }
        Ok(self
            .installations
            .lock()
            .unwrap()
            .get(&key.to_string())
            .copied())
    }

    fn mint_installation_token(&self, installation_id: u64) -> Result<MintedToken, RemoteError> {
        if self.fail_next_mint.swap(false, Ordering::SeqCst) {
            return Err(bad_gateway("/app/installations/access_tokens"));
        }
        let n = self.mints.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MintedToken {
            token: format!("ghs_{}_{}", installation_id, n),
            expires_at: now_unix() + *self.token_ttl.lock().unwrap(),
        })
    }
}
