//! Composition of consecutive revision records

use std::collections::{BTreeMap, BTreeSet};

use crate::cache::{CachedRevision, ChangeKind};

/// Net effect of a range of revisions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    /// Path at the end of the range -> path at the start
    pub renames: BTreeMap<String, String>,
    pub file_changes: BTreeMap<String, ChangeKind>,
    /// Paths present at the start that a rename has moved away
    vacated: BTreeSet<String>,
    /// Vacated paths since taken over by a rename destination
    reoccupied: BTreeSet<String>,
}

impl Changes {
    /// Fold revisions, oldest first, into one change set.
    ///
    /// Renames of a revision are applied before its file changes. A file
    /// added and then renamed inside the range is reported as added at its
    /// final path; a file renamed and then deleted is reported as deleted at
    /// its original path. A path re-created after being renamed away existed
    /// at the start, so it is reported as modified.
    pub fn compose<'a>(revisions: impl IntoIterator<Item = &'a CachedRevision>) -> Self {
        let mut changes = Self::default();
        for revision in revisions {
            changes.apply_renames(revision.renames());
            for (path, kind) in revision.file_changes() {
                changes.apply_change(path, *kind);
            }
        }
        changes
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty() && self.file_changes.is_empty()
    }

    fn apply_renames(&mut self, renames: &BTreeMap<String, String>) {
        // collect first so swaps inside one revision see the old state
        let moved: Vec<(String, Option<String>, Option<ChangeKind>)> = renames
            .iter()
            .map(|(new, old)| {
                let origin = self.renames.remove(old);
                let change = self.file_changes.remove(old);
                let existed = match (&origin, change) {
                    (None, Some(ChangeKind::Added)) => false,
                    (None, _) => true,
                    (Some(_), _) => self.reoccupied.remove(old),
                };
                if existed {
                    self.vacated.insert(old.clone());
                }
                let source = match change {
                    Some(ChangeKind::Added) => None,
                    _ => Some(origin.unwrap_or_else(|| old.clone())),
                };
                (new.clone(), source, change)
            })
            .collect();

        for (new, source, change) in moved {
            match source {
                None => {
                    let kind = if self.replaces(&new) {
                        ChangeKind::Modified
                    } else {
                        ChangeKind::Added
                    };
                    self.file_changes.insert(new, kind);
                }
                Some(source) => {
                    if self.vacated.remove(&new) && source != new {
                        self.reoccupied.insert(new.clone());
                    }
                    if change == Some(ChangeKind::Modified) {
                        self.file_changes.insert(new.clone(), ChangeKind::Modified);
                    } else if self.file_changes.get(&new) == Some(&ChangeKind::Deleted) {
                        // moved onto a path deleted earlier in the range
                        self.file_changes.insert(new.clone(), ChangeKind::Modified);
                    }
                    if source != new {
                        self.renames.insert(new, source);
                    }
                }
            }
        }
    }

    fn apply_change(&mut self, path: &str, kind: ChangeKind) {
        let previous = self.file_changes.get(path).copied();
        match kind {
            ChangeKind::Added => {
                let merged = if self.replaces(path) {
                    ChangeKind::Modified
                } else {
                    ChangeKind::Added
                };
                self.file_changes.insert(path.to_string(), merged);
            }
            ChangeKind::Modified => {
                if previous != Some(ChangeKind::Added) {
                    self.file_changes.insert(path.to_string(), ChangeKind::Modified);
                }
            }
            ChangeKind::Deleted => {
                if previous == Some(ChangeKind::Added) {
                    self.file_changes.remove(path);
                } else if let Some(origin) = self.renames.remove(path) {
                    self.file_changes.remove(path);
                    self.vacated.remove(&origin);
                    self.file_changes.insert(origin, ChangeKind::Deleted);
                } else {
                    self.file_changes.insert(path.to_string(), ChangeKind::Deleted);
                }
            }
        }
    }

    /// Whether a file created at `path` takes the place of one present at the start
    fn replaces(&mut self, path: &str) -> bool {
        let vacated = self.vacated.remove(path);
        vacated || self.file_changes.get(path) == Some(&ChangeKind::Deleted)
    }
}
