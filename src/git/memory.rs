//! In-memory commit graph
//!
//! Object ids are derived from content with FNV-1a, so they are stable
//! within a process but are not git-compatible hashes.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use super::object::{BlobId, CommitId, CommitMeta, EntryKind, ObjectId, Tree, TreeEntry};
use super::ObjectStore;
use crate::error::{Result, SvnError};

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

fn fnv1a(seed: u64, data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET ^ seed;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// 20-byte id from three independently seeded FNV-1a passes
fn content_id(kind: &str, data: &[u8]) -> ObjectId {
    let mut input = kind.as_bytes().to_vec();
    input.push(0);
    input.extend_from_slice(data);
    let mut bytes = [0u8; 20];
    let a = fnv1a(1, &input).to_be_bytes();
    let b = fnv1a(2, &input).to_be_bytes();
    let c = fnv1a(3, &input).to_be_bytes();
    bytes[..8].copy_from_slice(&a);
    bytes[8..16].copy_from_slice(&b);
    bytes[16..].copy_from_slice(&c[..4]);
    ObjectId::from_bytes(bytes)
}

#[derive(Default)]
struct Inner {
    commits: HashMap<CommitId, (CommitMeta, Tree)>,
    blobs: HashMap<BlobId, Vec<u8>>,
    branches: HashMap<String, CommitId>,
    sequence: u64,
}

/// Commit graph held in memory
#[derive(Default)]
pub struct MemoryObjectStore {
    inner: RwLock<Inner>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a commit on `branch`, based on the branch tip's files
    pub fn commit_on(&self, branch: &str) -> CommitBuilder<'_> {
        let inner = self.inner.read();
        let parent = inner.branches.get(branch).copied();
        let files = parent
            .and_then(|id| inner.commits.get(&id))
            .map(|(_, tree)| {
                tree.files()
                    .map(|(path, entry)| {
                        let content = inner.blobs.get(&entry.blob).cloned().unwrap_or_default();
                        (path.clone(), (entry.kind, content))
                    })
                    .collect()
            })
            .unwrap_or_default();
        CommitBuilder {
            store: self,
            branch: branch.to_string(),
            parents: parent.into_iter().collect(),
            files,
            author: "author".to_string(),
            email: "author@example.com".to_string(),
            time: None,
            message: String::new(),
        }
    }

    /// Point a branch at an arbitrary commit
    pub fn set_branch(&self, branch: &str, commit: CommitId) {
        self.inner.write().branches.insert(branch.to_string(), commit);
    }

    fn store(&self, builder: CommitBuilder<'_>) -> CommitId {
        let mut inner = self.inner.write();
        inner.sequence += 1;
        let sequence = inner.sequence;

        let mut entries = BTreeMap::new();
        for (path, (kind, content)) in builder.files {
            let blob = content_id("blob", &content);
            entries.insert(
                path,
                TreeEntry {
                    kind,
                    blob,
                    size: content.len() as u64,
                },
            );
            inner.blobs.entry(blob).or_insert(content);
        }

        let mut seed = format!("{}\0{}\0{}", sequence, builder.branch, builder.message).into_bytes();
        for parent in &builder.parents {
            seed.extend_from_slice(parent.as_bytes());
        }
        let id = content_id("commit", &seed);
        let meta = CommitMeta {
            id,
            parents: builder.parents,
            author: builder.author,
            email: builder.email,
            time: builder.time.unwrap_or(1_600_000_000 + sequence as i64 * 60),
            message: builder.message,
        };
        inner.commits.insert(id, (meta, Tree::new(entries)));
        inner.branches.insert(builder.branch, id);
        id
    }
}

impl ObjectStore for MemoryObjectStore {
    fn resolve_branch(&self, branch: &str) -> Result<Option<CommitId>> {
        Ok(self.inner.read().branches.get(branch).copied())
    }

    fn commit(&self, id: &CommitId) -> Result<CommitMeta> {
        self.inner
            .read()
            .commits
            .get(id)
            .map(|(meta, _)| meta.clone())
            .ok_or_else(|| SvnError::Git {
                message: format!("Unknown commit {}", id),
            })
    }

    fn tree_at(&self, id: &CommitId) -> Result<Tree> {
        self.inner
            .read()
            .commits
            .get(id)
            .map(|(_, tree)| tree.clone())
            .ok_or_else(|| SvnError::Git {
                message: format!("Unknown commit {}", id),
            })
    }

    fn read_blob(&self, id: &BlobId) -> Result<Vec<u8>> {
        self.inner
            .read()
            .blobs
            .get(id)
            .cloned()
            .ok_or_else(|| SvnError::Git {
                message: format!("Unknown blob {}", id),
            })
    }
}

/// Staged commit for [`MemoryObjectStore`]
pub struct CommitBuilder<'a> {
    store: &'a MemoryObjectStore,
    branch: String,
    parents: Vec<CommitId>,
    files: BTreeMap<String, (EntryKind, Vec<u8>)>,
    author: String,
    email: String,
    time: Option<i64>,
    message: String,
}

impl CommitBuilder<'_> {
    pub fn write(mut self, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.files
            .insert(path.to_string(), (EntryKind::File, content.as_ref().to_vec()));
        self
    }

    pub fn write_executable(mut self, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.files
            .insert(path.to_string(), (EntryKind::Executable, content.as_ref().to_vec()));
        self
    }

    pub fn remove(mut self, path: &str) -> Self {
        self.files.remove(path);
        self
    }

    pub fn rename(mut self, from: &str, to: &str) -> Self {
        if let Some(file) = self.files.remove(from) {
            self.files.insert(to.to_string(), file);
        }
        self
    }

    /// Add a second parent (merge commit)
    pub fn merge(mut self, parent: CommitId) -> Self {
        self.parents.push(parent);
        self
    }

    pub fn author(mut self, name: &str) -> Self {
        self.author = name.to_string();
        self.email = format!("{}@example.com", name);
        self
    }

    pub fn time(mut self, seconds: i64) -> Self {
        self.time = Some(seconds);
        self
    }

    pub fn message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }

    pub fn create(self) -> CommitId {
        let store = self.store;
        store.store(self)
    }
}
