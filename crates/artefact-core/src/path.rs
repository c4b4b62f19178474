//! Directory path helpers shared by listings and links.
//!
//! Backends report entry directories inconsistently (`""`, `"dist"`,
//! `"/dist/"`). Everything here normalizes to an absolute path without a
//! trailing slash, with `/` as the root.

/// Normalize a directory path to `/a/b` form; empty input is the root.
pub fn normalize_dir(dir: &str) -> String {
    let segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return "/".to_string();
    }
    format!("/{}", segments.join("/"))
}

/// Join a directory and an entry name into a normalized absolute path.
pub fn join(dir: &str, name: &str) -> String {
    let dir = normalize_dir(dir);
    let name = name.trim_matches('/');
    if name.is_empty() {
        return dir;
    }
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// True if an entry whose parent is `entry_dir` is a direct child of `dir`.
///
/// ```
/// use artefact_core::path::is_direct_child;
/// assert!(is_direct_child("/dist", "dist"));
/// assert!(!is_direct_child("/dist", "/dist/firmware"));
/// ```
pub fn is_direct_child(dir: &str, entry_dir: &str) -> bool {
    normalize_dir(dir) == normalize_dir(entry_dir)
}

/// Path relative to the root, without the leading slash; empty for the root.
pub fn relative(dir: &str) -> String {
    normalize_dir(dir).trim_start_matches('/').to_string()
}
