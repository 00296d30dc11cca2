//! Git object access
//!
//! The revision cache only needs four things from the underlying DAG: branch
//! tips, commit metadata, flattened trees and blob contents. They are exposed
//! through the [`ObjectStore`] trait. [`GitRepository`] implements it with
//! subprocess calls to git for maximum compatibility; [`MemoryObjectStore`]
//! keeps a DAG in memory for tests and embedding.

mod memory;
mod object;
mod repository;

pub use memory::{CommitBuilder, MemoryObjectStore};
pub use object::{BlobId, CommitId, CommitMeta, DirEntry, EntryKind, NodeKind, ObjectId, Tree, TreeEntry};
pub use repository::GitRepository;

use std::path::Path;
use std::process::Command;

use crate::error::{Result, SvnError};

/// Read access to a content-addressed commit graph
pub trait ObjectStore: Send + Sync {
    /// Tip of a branch, `None` when the branch does not exist yet
    fn resolve_branch(&self, branch: &str) -> Result<Option<CommitId>>;

    fn commit(&self, id: &CommitId) -> Result<CommitMeta>;

    fn tree_at(&self, id: &CommitId) -> Result<Tree>;

    fn read_blob(&self, id: &BlobId) -> Result<Vec<u8>>;
}

/// Run a git command and return raw stdout
pub fn git_command_bytes(args: &[&str], cwd: Option<&Path>) -> Result<Vec<u8>> {
    let mut cmd = Command::new("git");
    cmd.args(args);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd.output().map_err(|e| SvnError::Git {
        message: format!("Failed to execute git: {}", e),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SvnError::Git {
            message: format!("git {} failed: {}", args.join(" "), stderr.trim()),
        });
    }

    Ok(output.stdout)
}

/// Run a git command and return stdout as trimmed string
pub fn git_command(args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let stdout = git_command_bytes(args, cwd)?;
    Ok(String::from_utf8_lossy(&stdout).trim().to_string())
}

/// Run a git command, returning None if it fails (for optional queries)
pub fn git_command_optional(args: &[&str], cwd: Option<&Path>) -> Option<String> {
    git_command(args, cwd).ok()
}
