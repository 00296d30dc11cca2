//! Per-commit change records

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SvnError};
use crate::git::{CommitId, ObjectStore, Tree, TreeEntry};

/// Files larger than this are never compared line by line
const SIMILARITY_MAX_BYTES: u64 = 1024 * 1024;

/// How a path changed relative to the parent commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl ChangeKind {
    /// Action letter used in log output
    pub fn action(&self) -> &'static str {
        match self {
            Self::Added => "A",
            Self::Modified => "M",
            Self::Deleted => "D",
        }
    }
}

/// Renames and change kinds of one commit against its first parent.
///
/// A pure move appears only in `renames`; a move with edits also appears as
/// `Modified` at the destination. A rename destination is never `Added`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRevision {
    commit: Option<CommitId>,
    parent_commit: Option<CommitId>,
    renames: BTreeMap<String, String>,
    file_changes: BTreeMap<String, ChangeKind>,
}

impl CachedRevision {
    pub fn new(
        commit: Option<CommitId>,
        parent_commit: Option<CommitId>,
        renames: BTreeMap<String, String>,
        file_changes: BTreeMap<String, ChangeKind>,
    ) -> Result<Self> {
        if let Some(path) = renames
            .keys()
            .find(|path| file_changes.get(*path) == Some(&ChangeKind::Added))
        {
            return Err(SvnError::Cache {
                message: format!("rename destination {} is also recorded as added", path),
            });
        }
        Ok(Self {
            commit,
            parent_commit,
            renames,
            file_changes,
        })
    }

    /// Synthetic revision 0
    pub fn empty() -> Self {
        Self {
            commit: None,
            parent_commit: None,
            renames: BTreeMap::new(),
            file_changes: BTreeMap::new(),
        }
    }

    pub fn commit(&self) -> Option<&CommitId> {
        self.commit.as_ref()
    }

    pub fn parent_commit(&self) -> Option<&CommitId> {
        self.parent_commit.as_ref()
    }

    /// New path -> old path
    pub fn renames(&self) -> &BTreeMap<String, String> {
        &self.renames
    }

    pub fn file_changes(&self) -> &BTreeMap<String, ChangeKind> {
        &self.file_changes
    }

    /// True if `path` or anything below it changed in this revision
    pub fn touches(&self, path: &str) -> bool {
        let touched = |candidate: &String| is_same_or_below(candidate, path);
        self.file_changes.keys().any(touched)
            || self.renames.keys().any(touched)
            || self.renames.values().any(touched)
    }

    /// Diff `commit` against its first parent.
    ///
    /// `similarity` enables inexact rename detection: a deleted and an added
    /// file whose common lines make up at least that percentage of the longer
    /// file are recorded as a move with modifications.
    pub fn compute(store: &dyn ObjectStore, commit: &CommitId, similarity: Option<u8>) -> Result<Self> {
        let meta = store.commit(commit)?;
        let parent = meta.first_parent().copied();
        let new_tree = store.tree_at(commit)?;
        let old_tree = match &parent {
            Some(parent) => store.tree_at(parent)?,
            None => Tree::empty(),
        };

        let mut file_changes = BTreeMap::new();
        let mut added: Vec<(String, TreeEntry)> = Vec::new();
        let mut deleted: Vec<(String, TreeEntry)> = Vec::new();

        for (path, old) in old_tree.files() {
            match new_tree.get(path) {
                None => deleted.push((path.clone(), *old)),
                Some(new) if new != old => {
                    file_changes.insert(path.clone(), ChangeKind::Modified);
                }
                Some(_) => {}
            }
        }
        for (path, new) in new_tree.files() {
            if old_tree.get(path).is_none() {
                added.push((path.clone(), *new));
            }
        }

        let mut renames = BTreeMap::new();
        pair_exact_renames(&mut added, &mut deleted, &mut renames);
        if let Some(threshold) = similarity {
            pair_similar_renames(store, threshold, &mut added, &mut deleted, &mut renames, &mut file_changes)?;
        }

        for (path, _) in added {
            file_changes.insert(path, ChangeKind::Added);
        }
        for (path, _) in deleted {
            file_changes.insert(path, ChangeKind::Deleted);
        }

        Self::new(Some(*commit), parent, renames, file_changes)
    }
}

/// Match deleted and added files with identical content.
///
/// Deleted paths are visited in sorted order and each takes the first
/// unclaimed added path (also sorted) with the same blob.
fn pair_exact_renames(
    added: &mut Vec<(String, TreeEntry)>,
    deleted: &mut Vec<(String, TreeEntry)>,
    renames: &mut BTreeMap<String, String>,
) {
    let mut by_blob: HashMap<_, Vec<usize>> = HashMap::new();
    for (index, (_, entry)) in added.iter().enumerate() {
        by_blob.entry(entry.blob).or_default().push(index);
    }

    let mut claimed = vec![false; added.len()];
    deleted.retain(|(old_path, entry)| {
        let Some(candidates) = by_blob.get_mut(&entry.blob) else {
            return true;
        };
        if candidates.is_empty() {
            return true;
        }
        let index = candidates.remove(0);
        claimed[index] = true;
        renames.insert(added[index].0.clone(), old_path.clone());
        false
    });

    let mut index = 0;
    added.retain(|_| {
        let keep = !claimed[index];
        index += 1;
        keep
    });
}

fn pair_similar_renames(
    store: &dyn ObjectStore,
    threshold: u8,
    added: &mut Vec<(String, TreeEntry)>,
    deleted: &mut Vec<(String, TreeEntry)>,
    renames: &mut BTreeMap<String, String>,
    file_changes: &mut BTreeMap<String, ChangeKind>,
) -> Result<()> {
    if added.is_empty() || deleted.is_empty() {
        return Ok(());
    }

    let mut added_contents = Vec::with_capacity(added.len());
    for (_, entry) in added.iter() {
        added_contents.push(if entry.size <= SIMILARITY_MAX_BYTES {
            Some(store.read_blob(&entry.blob)?)
        } else {
            None
        });
    }

    let mut claimed = vec![false; added.len()];
    let mut unmatched = Vec::new();
    for (old_path, old_entry) in deleted.drain(..) {
        if old_entry.size > SIMILARITY_MAX_BYTES {
            unmatched.push((old_path, old_entry));
            continue;
        }
        let old_content = store.read_blob(&old_entry.blob)?;
        let mut best: Option<(usize, u32)> = None;
        for (index, content) in added_contents.iter().enumerate() {
            let Some(content) = content else { continue };
            if claimed[index] {
                continue;
            }
            let score = line_similarity(&old_content, content);
            if score >= u32::from(threshold) && best.map_or(true, |(_, s)| score > s) {
                best = Some((index, score));
            }
        }
        match best {
            Some((index, _)) => {
                claimed[index] = true;
                let new_path = added[index].0.clone();
                file_changes.insert(new_path.clone(), ChangeKind::Modified);
                renames.insert(new_path, old_path);
            }
            None => unmatched.push((old_path, old_entry)),
        }
    }
    *deleted = unmatched;

    let mut index = 0;
    added.retain(|_| {
        let keep = !claimed[index];
        index += 1;
        keep
    });
    Ok(())
}

/// Percentage of lines shared between two texts, relative to the longer one
pub fn line_similarity(a: &[u8], b: &[u8]) -> u32 {
    let a_lines: Vec<&[u8]> = a.split(|c| *c == b'\n').filter(|l| !l.is_empty()).collect();
    let b_lines: Vec<&[u8]> = b.split(|c| *c == b'\n').filter(|l| !l.is_empty()).collect();
    let longest = a_lines.len().max(b_lines.len());
    if longest == 0 {
        return 0;
    }

    let mut counts: HashMap<&[u8], usize> = HashMap::new();
    for line in &a_lines {
        *counts.entry(*line).or_default() += 1;
    }
    let mut common = 0;
    for line in &b_lines {
        if let Some(count) = counts.get_mut(line) {
            if *count > 0 {
                *count -= 1;
                common += 1;
            }
        }
    }
    (common * 100 / longest) as u32
}

/// `a/b` is below `a`; every path is below the root `""`
pub fn is_same_or_below(path: &str, dir: &str) -> bool {
    dir.is_empty()
        || path == dir
        || (path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/')
}
