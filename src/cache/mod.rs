//! Directory-scoped cache of remote trees

pub mod paths;
mod tree;

pub use tree::{ChangeSet, ChangedFile, ReconcileReport, RemovedFile, TreeCache, TreeError};
