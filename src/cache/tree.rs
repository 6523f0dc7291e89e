//! Directory-scoped tree cache
//!
//! A directory is the unit of completeness: once any listing of it has been
//! stored, the stored rows are the whole listing. Reconciliation leans on
//! that to decide relevance with one existence query for all touched
//! directories, then refetches every relevant file in a single batch.

use std::collections::{BTreeSet, HashMap, HashSet};

use thiserror::Error;

use super::paths;
use crate::now_unix;
use crate::remote::{BatchQuery, QueryKind, RemoteBlob, RemoteError, RemoteObject, TreeClient};
use crate::store::{CachedEntry, EntryKind, StoreError, TreeStore};
use crate::types::Namespace;

/// Errors returned by tree cache operations.
#[derive(Error, Debug)]
pub enum TreeError {
    /// The batched remote query failed; nothing from the fetch step was written.
    #[error("remote query failed: {0}")]
    RemoteQueryFailed(#[from] RemoteError),
    /// The local store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// A file deleted by the change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedFile {
    pub path: String,
}

/// A file added or modified by the change set, with its new checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub path: String,
    /// Checksum the change set expects. The fetched blob is stored either
    /// way; a mismatch is only logged.
    pub sha: String,
}

/// Delta between two tree states. The three lists are expected to be disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub removed: Vec<RemovedFile>,
    pub modified: Vec<ChangedFile>,
    pub added: Vec<ChangedFile>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.modified.is_empty() && self.added.is_empty()
    }
}

/// What a reconcile call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub deleted: usize,
    pub updated: usize,
    pub inserted: usize,
    /// Relevant paths the remote no longer resolves to a blob.
    pub skipped: usize,
    pub remote_queries: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Modified,
    Added,
}

/// Cache of remote tree listings backed by a [`TreeStore`].
pub struct TreeCache<S, C> {
    store: S,
    client: C,
}

fn blob_entry(ns: &Namespace, path: &str, blob: RemoteBlob, now: i64) -> CachedEntry {
    CachedEntry {
        owner: ns.owner().to_string(),
        repo: ns.repo().to_string(),
        branch: ns.branch().to_string(),
        path: path.to_string(),
        parent_path: paths::parent_dir(path).to_string(),
        name: paths::base_name(path).to_string(),
        kind: EntryKind::Blob,
        content: blob.text,
        sha: Some(blob.oid),
        last_updated: now,
    }
}

impl<S: TreeStore, C: TreeClient> TreeCache<S, C> {
    pub fn new(store: S, client: C) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the listing of `path`, fetching and storing it on first access.
    ///
    /// Blob children come back with content and checksum from the same
    /// request. A path that does not resolve to a directory yields an empty
    /// listing and writes nothing; a genuinely empty directory is remembered
    /// so it is not fetched again.
    pub fn populate_directory(
        &self,
        ns: &Namespace,
        path: &str,
        credential: &str,
    ) -> Result<Vec<CachedEntry>, TreeError> {
        let dir = paths::normalize(path);

        if self.store.is_directory_cached(ns, &dir)? {
            log::debug!("cache hit for {}:{}", ns, dir);
            return Ok(self.store.list_directory(ns, &dir)?);
        }

        log::debug!("cache miss for {}:{}, fetching listing", ns, dir);
        let query = BatchQuery {
            index: 0,
            expression: paths::expression(ns.branch(), &dir),
            kind: QueryKind::Tree,
        };
        let results = self.client.fetch_batch(ns, &[query], credential)?;
        let object = results
            .into_iter()
            .find(|result| result.index == 0)
            .and_then(|result| result.object);

        let children = match object {
            Some(RemoteObject::Tree(children)) => children,
            Some(RemoteObject::Blob(_)) => {
                log::debug!("{}:{} is a file, not a directory", ns, dir);
                return Ok(Vec::new());
            }
            None => {
                log::debug!("{}:{} does not exist", ns, dir);
                return Ok(Vec::new());
            }
        };

        let now = now_unix();
        let mut entries: Vec<CachedEntry> = children
            .into_iter()
            .map(|child| {
                let (content, sha) = match child.blob {
                    Some(blob) => (blob.text, Some(blob.oid)),
                    None => (None, None),
                };
                CachedEntry {
                    owner: ns.owner().to_string(),
                    repo: ns.repo().to_string(),
                    branch: ns.branch().to_string(),
                    parent_path: dir.clone(),
                    name: child.name,
                    path: child.path,
                    kind: child.kind,
                    content,
                    sha,
                    last_updated: now,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        self.store.insert_directory(ns, &dir, &entries, now)?;
        log::debug!("cached {} entries for {}:{}", entries.len(), ns, dir);

        Ok(entries)
    }

    /// Applies a change set to the directories that are already cached.
    ///
    /// Removals are applied first and need no remote call, so they stick
    /// even if the refetch fails. Modified and added files are refetched in
    /// one batched query and only written once that query has succeeded.
    pub fn reconcile(
        &self,
        ns: &Namespace,
        changes: &ChangeSet,
        credential: &str,
    ) -> Result<ReconcileReport, TreeError> {
        let mut report = ReconcileReport::default();

        let removed: Vec<String> = changes
            .removed
            .iter()
            .map(|file| paths::normalize(&file.path))
            .collect();
        let changed: Vec<(String, Change, &str)> = changes
            .modified
            .iter()
            .map(|file| (file, Change::Modified))
            .chain(changes.added.iter().map(|file| (file, Change::Added)))
            .map(|(file, change)| (paths::normalize(&file.path), change, file.sha.as_str()))
            .collect();

        let parents: Vec<String> = removed
            .iter()
            .chain(changed.iter().map(|(path, _, _)| path))
            .map(|path| paths::parent_dir(path).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if parents.is_empty() {
            return Ok(report);
        }

        let cached = self.store.cached_directories(ns, &parents)?;
        let is_relevant = |path: &str| cached.contains(paths::parent_dir(path));

        let removable: Vec<String> = removed
            .into_iter()
            .filter(|path| is_relevant(path.as_str()))
            .collect();
        if !removable.is_empty() {
            report.deleted = self.store.delete_entries(ns, &removable)?;
        }

        let mut seen = HashSet::new();
        let fetch: Vec<(String, Change, &str)> = changed
            .into_iter()
            .filter(|(path, _, _)| is_relevant(path.as_str()) && seen.insert(path.clone()))
            .collect();
        if fetch.is_empty() {
            log::debug!(
                "reconcile {}: {} deleted, nothing to refetch",
                ns,
                report.deleted
            );
            return Ok(report);
        }

        let queries: Vec<BatchQuery> = fetch
            .iter()
            .enumerate()
            .map(|(index, (path, _, _))| BatchQuery {
                index,
                expression: paths::expression(ns.branch(), path),
                kind: QueryKind::Blob,
            })
            .collect();

        log::debug!("reconcile {}: refetching {} files", ns, queries.len());
        let results = self.client.fetch_batch(ns, &queries, credential)?;
        report.remote_queries = 1;

        let mut by_index: HashMap<usize, RemoteObject> = results
            .into_iter()
            .filter_map(|result| result.object.map(|object| (result.index, object)))
            .collect();

        let now = now_unix();
        let mut modified = Vec::new();
        let mut added = Vec::new();
        for (index, (path, change, expected_sha)) in fetch.iter().enumerate() {
            let blob = match by_index.remove(&index) {
                Some(RemoteObject::Blob(blob)) => blob,
                Some(RemoteObject::Tree(_)) | None => {
                    log::warn!("reconcile {}: {} is not a file on the remote", ns, path);
                    report.skipped += 1;
                    continue;
                }
            };

            if blob.oid != *expected_sha {
                // The branch moved past the change set; the fetched content wins.
                log::warn!(
                    "reconcile {}: {} expected {} but the remote has {}",
                    ns,
                    path,
                    expected_sha,
                    blob.oid
                );
            }

            let entry = blob_entry(ns, path, blob, now);
            match change {
                Change::Modified => modified.push(entry),
                Change::Added => added.push(entry),
            }
        }

        let counts = self.store.write_blobs(ns, &modified, &added)?;
        report.updated = counts.updated;
        report.inserted = counts.inserted;

        log::info!(
            "reconcile {}: {} deleted, {} updated, {} inserted, {} skipped",
            ns,
            report.deleted,
            report.updated,
            report.inserted,
            report.skipped
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::testing::{FakeTreeClient, blob, tree_entry};
    use tempfile::tempdir;

    fn make_ns() -> Namespace {
        Namespace::new("octocat/hello-world".parse().unwrap(), "main".parse().unwrap())
    }

    fn create_test_cache() -> (TreeCache<SqliteStore, FakeTreeClient>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("test.db")).unwrap();
        store.init().unwrap();
        (TreeCache::new(store, FakeTreeClient::new()), dir)
    }

    fn removed(path: &str) -> RemovedFile {
        RemovedFile {
            path: path.to_string(),
        }
    }

    fn changed(path: &str, sha: &str) -> ChangedFile {
        ChangedFile {
            path: path.to_string(),
            sha: sha.to_string(),
        }
    }

    /// Remote tree: `a/b.txt`, `a/c.txt`, `a/sub/` at the top of `a`.
    fn seed_remote(client: &FakeTreeClient) {
        client.set_tree(
            "main:a",
            vec![
                tree_entry("a/b.txt", Some(blob("b", "sha-b"))),
                tree_entry("a/c.txt", Some(blob("c", "sha-c"))),
                tree_entry("a/sub", None),
            ],
        );
        client.set_blob("main:a/b.txt", blob("b", "sha-b"));
        client.set_blob("main:a/c.txt", blob("c", "sha-c"));
    }

    #[test]
    fn populate_fetches_once_then_serves_from_store() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        seed_remote(cache.client());

        let first = cache.populate_directory(&ns, "a", "tok").unwrap();
        assert_eq!(cache.client().call_count(), 1);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].path, "a/b.txt");
        assert_eq!(first[0].content.as_deref(), Some("b"));
        assert_eq!(first[0].sha.as_deref(), Some("sha-b"));
        assert_eq!(first[2].kind, EntryKind::Tree);
        assert_eq!(first[2].content, None);
        assert!(first.iter().all(|e| e.parent_path == "a"));

        let second = cache.populate_directory(&ns, "a/", "tok").unwrap();
        assert_eq!(cache.client().call_count(), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn populate_sends_a_single_tree_query() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        seed_remote(cache.client());

        cache.populate_directory(&ns, "a", "tok").unwrap();

        let calls = cache.client().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 1);
        assert_eq!(calls[0][0].expression, "main:a");
        assert_eq!(calls[0][0].kind, QueryKind::Tree);
    }

    #[test]
    fn populate_missing_path_writes_nothing() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();

        assert!(cache.populate_directory(&ns, "nope", "tok").unwrap().is_empty());
        assert!(cache.populate_directory(&ns, "nope", "tok").unwrap().is_empty());

        assert_eq!(cache.client().call_count(), 2);
        assert!(!cache.store().is_directory_cached(&ns, "nope").unwrap());
    }

    #[test]
    fn populate_empty_directory_is_remembered() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        cache.client().set_tree("main:empty", vec![]);

        assert!(cache.populate_directory(&ns, "empty", "tok").unwrap().is_empty());
        assert!(cache.populate_directory(&ns, "empty", "tok").unwrap().is_empty());

        assert_eq!(cache.client().call_count(), 1);
    }

    #[test]
    fn populate_root_directory() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        cache.client().set_tree(
            "main:",
            vec![tree_entry("README.md", Some(blob("hi", "sha-r")))],
        );

        let entries = cache.populate_directory(&ns, "/", "tok").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].parent_path, "");
        assert_eq!(entries[0].name, "README.md");
    }

    #[test]
    fn populate_remote_failure_writes_nothing() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        seed_remote(cache.client());
        cache.client().fail_next();

        let result = cache.populate_directory(&ns, "a", "tok");
        assert!(matches!(result, Err(TreeError::RemoteQueryFailed(_))));
        assert!(!cache.store().is_directory_cached(&ns, "a").unwrap());
    }

    #[test]
    fn populate_query_error_is_not_an_empty_listing() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        seed_remote(cache.client());
        cache.client().fail_expression("main:a");

        let result = cache.populate_directory(&ns, "a", "tok");
        assert!(matches!(
            result,
            Err(TreeError::RemoteQueryFailed(RemoteError::Query(_)))
        ));
        assert!(!cache.store().is_directory_cached(&ns, "a").unwrap());
    }

    #[test]
    fn reconcile_removal_in_cached_directory_needs_no_remote_call() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        seed_remote(cache.client());
        cache.populate_directory(&ns, "a", "tok").unwrap();
        let calls_before = cache.client().call_count();

        let report = cache
            .reconcile(
                &ns,
                &ChangeSet {
                    removed: vec![removed("a/b.txt")],
                    ..ChangeSet::default()
                },
                "tok",
            )
            .unwrap();

        assert_eq!(report.deleted, 1);
        assert_eq!(report.remote_queries, 0);
        assert_eq!(cache.client().call_count(), calls_before);
        let listing = cache.store().list_directory(&ns, "a").unwrap();
        assert!(listing.iter().all(|e| e.path != "a/b.txt"));
        assert_eq!(listing.len(), 2);
    }

    #[test]
    fn reconcile_ignores_uncached_directories() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        seed_remote(cache.client());

        let report = cache
            .reconcile(
                &ns,
                &ChangeSet {
                    removed: vec![removed("x/old.txt")],
                    modified: vec![changed("a/b.txt", "sha-b2")],
                    added: vec![changed("y/new.txt", "sha-n")],
                },
                "tok",
            )
            .unwrap();

        assert_eq!(report, ReconcileReport::default());
        assert_eq!(cache.client().call_count(), 0);
        assert_eq!(cache.store().entry_count(&ns).unwrap(), 0);
    }

    #[test]
    fn reconcile_batches_all_relevant_files_into_one_query() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        seed_remote(cache.client());
        cache.client().set_tree("main:", vec![tree_entry("a", None)]);
        cache.populate_directory(&ns, "a", "tok").unwrap();
        cache.populate_directory(&ns, "", "tok").unwrap();
        cache.client().clear_calls();

        cache.client().set_blob("main:a/b.txt", blob("b2", "sha-b2"));
        cache.client().set_blob("main:a/c.txt", blob("c2", "sha-c2"));
        cache.client().set_blob("main:a/d.txt", blob("d", "sha-d"));
        cache.client().set_blob("main:top.txt", blob("t", "sha-t"));

        let report = cache
            .reconcile(
                &ns,
                &ChangeSet {
                    removed: vec![],
                    modified: vec![changed("a/b.txt", "sha-b2"), changed("a/c.txt", "sha-c2")],
                    added: vec![
                        changed("a/d.txt", "sha-d"),
                        changed("top.txt", "sha-t"),
                        changed("uncached/z.txt", "sha-z"),
                    ],
                },
                "tok",
            )
            .unwrap();

        let calls = cache.client().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 4);
        assert!(calls[0].iter().all(|q| q.kind == QueryKind::Blob));
        assert_eq!(
            report,
            ReconcileReport {
                deleted: 0,
                updated: 2,
                inserted: 2,
                skipped: 0,
                remote_queries: 1,
            }
        );

        let listing = cache.store().list_directory(&ns, "a").unwrap();
        let names: Vec<&str> = listing.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b.txt", "c.txt", "d.txt", "sub"]);
        assert_eq!(listing[0].content.as_deref(), Some("b2"));
        assert_eq!(listing[0].sha.as_deref(), Some("sha-b2"));
        assert_eq!(listing[2].parent_path, "a");
        assert_eq!(listing[2].kind, EntryKind::Blob);

        let root = cache.store().list_directory(&ns, "").unwrap();
        assert!(root.iter().any(|e| e.path == "top.txt"));
        assert!(!cache.store().is_directory_cached(&ns, "uncached").unwrap());
    }

    #[test]
    fn reconcile_adds_into_confirmed_empty_directory() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        cache.client().set_tree("main:empty", vec![]);
        cache.populate_directory(&ns, "empty", "tok").unwrap();
        cache.client().set_blob("main:empty/new.txt", blob("n", "sha-n"));

        let report = cache
            .reconcile(
                &ns,
                &ChangeSet {
                    added: vec![changed("empty/new.txt", "sha-n")],
                    ..ChangeSet::default()
                },
                "tok",
            )
            .unwrap();

        assert_eq!(report.inserted, 1);
        let listing = cache.store().list_directory(&ns, "empty").unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "new.txt");
    }

    #[test]
    fn reconcile_remote_failure_keeps_deletions_only() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        seed_remote(cache.client());
        cache.populate_directory(&ns, "a", "tok").unwrap();
        cache.client().fail_next();

        let result = cache.reconcile(
            &ns,
            &ChangeSet {
                removed: vec![removed("a/b.txt")],
                modified: vec![changed("a/c.txt", "sha-c2")],
                added: vec![changed("a/d.txt", "sha-d")],
            },
            "tok",
        );

        assert!(matches!(result, Err(TreeError::RemoteQueryFailed(_))));
        let listing = cache.store().list_directory(&ns, "a").unwrap();
        let paths: Vec<&str> = listing.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a/c.txt", "a/sub"]);
        assert_eq!(listing[0].content.as_deref(), Some("c"));
    }

    #[test]
    fn reconcile_partial_remote_failure_writes_no_fetched_content() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        seed_remote(cache.client());
        cache.populate_directory(&ns, "a", "tok").unwrap();

        // c.txt would resolve, d.txt fails inside the same batch.
        cache.client().set_blob("main:a/c.txt", blob("c2", "sha-c2"));
        cache.client().set_blob("main:a/d.txt", blob("d", "sha-d"));
        cache.client().fail_expression("main:a/d.txt");

        let result = cache.reconcile(
            &ns,
            &ChangeSet {
                removed: vec![],
                modified: vec![changed("a/c.txt", "sha-c2")],
                added: vec![changed("a/d.txt", "sha-d")],
            },
            "tok",
        );

        assert!(matches!(result, Err(TreeError::RemoteQueryFailed(_))));
        let listing = cache.store().list_directory(&ns, "a").unwrap();
        let paths: Vec<&str> = listing.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a/b.txt", "a/c.txt", "a/sub"]);
        assert_eq!(listing[1].content.as_deref(), Some("c"));
        assert_eq!(listing[1].sha.as_deref(), Some("sha-c"));
    }

    #[test]
    fn reconcile_only_touches_the_direct_parent() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        seed_remote(cache.client());
        cache.populate_directory(&ns, "a", "tok").unwrap();
        cache.client().clear_calls();

        // a/new/ is not cached, so the cached listing of a is left alone.
        let report = cache
            .reconcile(
                &ns,
                &ChangeSet {
                    added: vec![changed("a/new/x.txt", "sha-x")],
                    ..ChangeSet::default()
                },
                "tok",
            )
            .unwrap();

        assert_eq!(report, ReconcileReport::default());
        assert_eq!(cache.client().call_count(), 0);
        let listing = cache.store().list_directory(&ns, "a").unwrap();
        assert!(listing.iter().all(|e| e.path != "a/new"));
    }

    #[test]
    fn reconcile_stores_fetched_blob_when_checksum_differs() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        seed_remote(cache.client());
        cache.populate_directory(&ns, "a", "tok").unwrap();
        cache.client().set_blob("main:a/c.txt", blob("c3", "sha-c3"));

        let report = cache
            .reconcile(
                &ns,
                &ChangeSet {
                    modified: vec![changed("a/c.txt", "sha-c2")],
                    ..ChangeSet::default()
                },
                "tok",
            )
            .unwrap();

        assert_eq!(report.updated, 1);
        let listing = cache.store().list_directory(&ns, "a").unwrap();
        assert_eq!(listing[1].path, "a/c.txt");
        assert_eq!(listing[1].sha.as_deref(), Some("sha-c3"));
    }

    #[test]
    fn reconcile_skips_paths_the_remote_cannot_resolve() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        seed_remote(cache.client());
        cache.populate_directory(&ns, "a", "tok").unwrap();

        let report = cache
            .reconcile(
                &ns,
                &ChangeSet {
                    added: vec![changed("a/vanished.txt", "sha-v")],
                    ..ChangeSet::default()
                },
                "tok",
            )
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.inserted, 0);
        assert_eq!(report.remote_queries, 1);
        assert_eq!(cache.store().list_directory(&ns, "a").unwrap().len(), 3);
    }

    #[test]
    fn reconcile_empty_change_set_is_a_no_op() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();

        let report = cache.reconcile(&ns, &ChangeSet::default(), "tok").unwrap();

        assert_eq!(report, ReconcileReport::default());
        assert_eq!(cache.client().call_count(), 0);
    }

    #[test]
    fn completeness_holds_after_populate_and_reconcile() {
        let (cache, _dir) = create_test_cache();
        let ns = make_ns();
        seed_remote(cache.client());
        cache.populate_directory(&ns, "a", "tok").unwrap();

        // Remote moves on: b removed, c modified, e added.
        cache.client().set_tree(
            "main:a",
            vec![
                tree_entry("a/c.txt", Some(blob("c2", "sha-c2"))),
                tree_entry("a/e.txt", Some(blob("e", "sha-e"))),
                tree_entry("a/sub", None),
            ],
        );
        cache.client().set_blob("main:a/c.txt", blob("c2", "sha-c2"));
        cache.client().set_blob("main:a/e.txt", blob("e", "sha-e"));

        cache
            .reconcile(
                &ns,
                &ChangeSet {
                    removed: vec![removed("a/b.txt")],
                    modified: vec![changed("a/c.txt", "sha-c2")],
                    added: vec![changed("a/e.txt", "sha-e")],
                },
                "tok",
            )
            .unwrap();

        let (fresh, _fresh_dir) = create_test_cache();
        fresh.client().set_tree(
            "main:a",
            vec![
                tree_entry("a/c.txt", Some(blob("c2", "sha-c2"))),
                tree_entry("a/e.txt", Some(blob("e", "sha-e"))),
                tree_entry("a/sub", None),
            ],
        );
        let expected = fresh.populate_directory(&ns, "a", "tok").unwrap();
        let actual = cache.store().list_directory(&ns, "a").unwrap();

        let strip = |entries: Vec<CachedEntry>| {
            entries
                .into_iter()
                .map(|e| (e.path, e.name, e.kind, e.content, e.sha))
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(actual), strip(expected));
    }
}
