//! Linear views over git branches
//!
//! A [`Branch`] numbers the first-parent history of one git branch and
//! answers revision-numbered queries through the shared revision cache.
//! [`RepositoryMapping`] routes `svn://` URLs to branches.

mod branch;
mod changes;
mod mapping;

pub use branch::Branch;
pub use changes::Changes;
pub use mapping::{Repository, RepositoryMapping, Resolved};

/// Join two repository-relative paths
pub fn join_path(base: &str, path: &str) -> String {
    let path = path.trim_matches('/');
    let base = base.trim_matches('/');
    match (base.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{}/{}", base, path),
    }
}

/// Parent directory and last component of a path
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}
