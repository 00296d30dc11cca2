//! Git object model as seen by the revision cache

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SvnError;

/// 20-byte object name (SHA-1 for git repositories)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId([u8; 20]);

/// Identifier of a commit in the underlying DAG
pub type CommitId = ObjectId;

/// Identifier of file content
pub type BlobId = ObjectId;

impl ObjectId {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut hex = String::with_capacity(40);
        for byte in self.0 {
            hex.push_str(&format!("{:02x}", byte));
        }
        hex
    }
}

impl FromStr for ObjectId {
    type Err = SvnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SvnError::Git {
            message: format!("Invalid object id: {}", s),
        };
        if s.len() != 40 || !s.is_ascii() {
            return Err(invalid());
        }
        let mut bytes = [0u8; 20];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..12])
    }
}

/// Kind of a file entry in a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Executable,
    Symlink,
}

impl EntryKind {
    /// Parse a git tree mode such as `100644`
    pub fn from_mode(mode: &str) -> Option<Self> {
        match mode {
            "100644" | "100664" => Some(Self::File),
            "100755" => Some(Self::Executable),
            "120000" => Some(Self::Symlink),
            _ => None,
        }
    }
}

/// A file in a commit snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeEntry {
    pub kind: EntryKind,
    pub blob: BlobId,
    pub size: u64,
}

/// Node kind as reported to svn clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    None,
    File,
    Dir,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::File => "file",
            Self::Dir => "dir",
        }
    }
}

/// Child of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
    pub size: u64,
}

/// Flattened snapshot of a commit: every file keyed by its full path.
///
/// Directories are implicit, as in git.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: BTreeMap<String, TreeEntry>,
}

impl Tree {
    pub fn new(entries: BTreeMap<String, TreeEntry>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&TreeEntry> {
        self.entries.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = (&String, &TreeEntry)> {
        self.entries.iter()
    }

    /// Files at or below `dir` (the empty path is the root)
    pub fn files_under<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = (&'a String, &'a TreeEntry)> {
        let prefix = dir_prefix(dir);
        self.entries
            .range(prefix.clone()..)
            .take_while(move |(path, _)| path.starts_with(&prefix))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        path.is_empty() || self.files_under(path).next().is_some()
    }

    pub fn node_kind(&self, path: &str) -> NodeKind {
        if self.entries.contains_key(path) {
            NodeKind::File
        } else if self.is_dir(path) {
            NodeKind::Dir
        } else {
            NodeKind::None
        }
    }

    /// Immediate children of a directory
    pub fn list_dir(&self, dir: &str) -> Vec<DirEntry> {
        let prefix = dir_prefix(dir);
        let mut children: BTreeMap<String, DirEntry> = BTreeMap::new();
        for (path, entry) in self.files_under(dir) {
            let rest = &path[prefix.len()..];
            match rest.split_once('/') {
                Some((name, _)) => {
                    children.entry(name.to_string()).or_insert_with(|| DirEntry {
                        name: name.to_string(),
                        kind: NodeKind::Dir,
                        size: 0,
                    });
                }
                None => {
                    children.insert(
                        rest.to_string(),
                        DirEntry {
                            name: rest.to_string(),
                            kind: NodeKind::File,
                            size: entry.size,
                        },
                    );
                }
            }
        }
        children.into_values().collect()
    }
}

/// `"a/b"` -> `"a/b/"`, `""` -> `""`
fn dir_prefix(dir: &str) -> String {
    if dir.is_empty() {
        String::new()
    } else {
        format!("{}/", dir.trim_end_matches('/'))
    }
}

/// Commit metadata needed for revision properties and ancestry walks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMeta {
    pub id: CommitId,
    pub parents: Vec<CommitId>,
    pub author: String,
    pub email: String,
    /// Commit time, seconds since the Unix epoch
    pub time: i64,
    pub message: String,
}

impl CommitMeta {
    pub fn first_parent(&self) -> Option<&CommitId> {
        self.parents.first()
    }
}
