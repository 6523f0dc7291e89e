//! Path arithmetic for remote tree paths
//!
//! Paths here name nodes in a remote git tree, never local files, so every
//! helper is a plain string operation using `/` as the only separator. The
//! repository root is the empty path `""`.

/// Strip leading/trailing slashes and collapse empty segments.
///
/// `"/src//lib/"` becomes `"src/lib"`, and `"/"` becomes `""`.
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Returns the directory containing `path`, or `""` for top-level entries.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Returns the final component of `path`.
pub fn base_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Builds a `<branch>:<path>` object expression.
pub fn expression(branch: &str, path: &str) -> String {
    format!("{}:{}", branch, path)
}
