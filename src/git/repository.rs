//! Object store backed by an on-disk git repository

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::object::{BlobId, CommitId, CommitMeta, EntryKind, Tree, TreeEntry};
use super::{git_command, git_command_bytes, git_command_optional, ObjectStore};
use crate::error::{Result, SvnError};

/// Git repository accessed through the `git` executable
#[derive(Debug, Clone)]
pub struct GitRepository {
    path: PathBuf,
}

impl GitRepository {
    /// Open a repository (bare or with a work tree)
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        git_command(&["rev-parse", "--git-dir"], Some(&path)).map_err(|_| SvnError::Git {
            message: format!("Not a git repository: {}", path.display()),
        })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ObjectStore for GitRepository {
    fn resolve_branch(&self, branch: &str) -> Result<Option<CommitId>> {
        if branch.starts_with('-') || branch.contains("..") {
            return Err(SvnError::Git {
                message: format!("Invalid branch name: {}", branch),
            });
        }
        let spec = format!("refs/heads/{}^{{commit}}", branch);
        match git_command_optional(&["rev-parse", "--verify", "--quiet", &spec], Some(&self.path)) {
            Some(hex) if !hex.is_empty() => Ok(Some(hex.parse()?)),
            _ => Ok(None),
        }
    }

    fn commit(&self, id: &CommitId) -> Result<CommitMeta> {
        let raw = git_command_bytes(&["cat-file", "commit", &id.to_hex()], Some(&self.path))?;
        parse_commit(*id, &String::from_utf8_lossy(&raw))
    }

    fn tree_at(&self, id: &CommitId) -> Result<Tree> {
        let raw = git_command_bytes(
            &["ls-tree", "-r", "-z", "--long", &id.to_hex()],
            Some(&self.path),
        )?;
        parse_ls_tree(&raw)
    }

    fn read_blob(&self, id: &BlobId) -> Result<Vec<u8>> {
        git_command_bytes(&["cat-file", "blob", &id.to_hex()], Some(&self.path))
    }
}

/// Parse the raw output of `git cat-file commit`
fn parse_commit(id: CommitId, raw: &str) -> Result<CommitMeta> {
    let (header, message) = raw.split_once("\n\n").unwrap_or((raw, ""));
    let mut parents = Vec::new();
    let mut author = String::new();
    let mut email = String::new();
    let mut time = 0;

    for line in header.lines() {
        if let Some(parent) = line.strip_prefix("parent ") {
            parents.push(parent.trim().parse()?);
        } else if let Some(ident) = line.strip_prefix("author ") {
            let (name, mail, ts) = parse_ident(ident).ok_or_else(|| SvnError::Git {
                message: format!("Malformed author line in commit {}: {}", id, line),
            })?;
            author = name;
            email = mail;
            time = ts;
        }
    }

    Ok(CommitMeta {
        id,
        parents,
        author,
        email,
        time,
        message: message.trim_end_matches('\n').to_string(),
    })
}

/// `Name <email> 1700000000 +0100` -> (name, email, seconds)
fn parse_ident(ident: &str) -> Option<(String, String, i64)> {
    let open = ident.find('<')?;
    let close = ident[open..].find('>')? + open;
    let name = ident[..open].trim().to_string();
    let email = ident[open + 1..close].to_string();
    let time = ident[close + 1..].split_whitespace().next()?.parse().ok()?;
    Some((name, email, time))
}

/// Parse `git ls-tree -r -z --long` output; submodules are skipped
fn parse_ls_tree(raw: &[u8]) -> Result<Tree> {
    let mut entries = BTreeMap::new();
    for record in raw.split(|b| *b == 0) {
        if record.is_empty() {
            continue;
        }
        let record = String::from_utf8_lossy(record);
        let (meta, path) = record.split_once('\t').ok_or_else(|| SvnError::Git {
            message: format!("Invalid ls-tree line: {}", record),
        })?;
        let fields: Vec<&str> = meta.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(SvnError::Git {
                message: format!("Invalid ls-tree line: {}", record),
            });
        }
        if fields[1] != "blob" {
            continue;
        }
        let Some(kind) = EntryKind::from_mode(fields[0]) else {
            continue;
        };
        entries.insert(
            path.to_string(),
            TreeEntry {
                kind,
                blob: fields[2].parse()?,
                size: fields[3].parse().unwrap_or(0),
            },
        );
    }
    Ok(Tree::new(entries))
}
