//! Linear revision view of one git branch

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use super::changes::Changes;
use super::split_path;
use crate::cache::{is_same_or_below, CachedRevision, KeyValueStore, RevisionCache};
use crate::error::{Result, SvnError};
use crate::git::{CommitId, CommitMeta, NodeKind, ObjectStore, Tree, TreeEntry};

/// Append-only revision number -> commit table for one branch.
///
/// Revision 0 is the empty tree; revision `n` is `revisions[n - 1]`. The
/// table only grows, and readers see new revisions only after they have been
/// cached and persisted.
pub struct Branch {
    repository: String,
    branch: String,
    uuid: String,
    cache: Arc<RevisionCache>,
    revisions: RwLock<Vec<CommitId>>,
    metas: RwLock<HashMap<CommitId, Arc<CommitMeta>>>,
    writer: Mutex<()>,
}

impl Branch {
    /// Open the view, restoring any revision table persisted earlier
    pub fn open(repository: &str, branch: &str, cache: Arc<RevisionCache>) -> Result<Self> {
        let store = cache.store().clone();
        let prefix = table_prefix(repository, branch);

        let count: u64 = match store.get(&format!("{}count", prefix))? {
            Some(bytes) => decode_value(&bytes)?,
            None => 0,
        };
        // `count` is untrusted until every entry has been read
        let mut revisions = Vec::new();
        for n in 1..=count {
            let bytes = store
                .get(&format!("{}{}", prefix, n))?
                .ok_or_else(|| SvnError::Cache {
                    message: format!("Revision table of {} is missing r{}", repository, n),
                })?;
            revisions.push(decode_value(&bytes)?);
        }

        let uuid_key = format!("uuid/{}", repository);
        let uuid = match store.get(&uuid_key)? {
            Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            None => {
                let uuid = uuid::Uuid::new_v4().to_string();
                store.put(&uuid_key, uuid.as_bytes())?;
                uuid
            }
        };

        if count > 0 {
            tracing::info!("Restored {} revisions of {}:{}", count, repository, branch);
        }
        Ok(Self {
            repository: repository.to_string(),
            branch: branch.to_string(),
            uuid,
            cache,
            revisions: RwLock::new(revisions),
            metas: RwLock::new(HashMap::new()),
            writer: Mutex::new(()),
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Repository UUID, stable across restarts
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn cache(&self) -> &Arc<RevisionCache> {
        &self.cache
    }

    fn objects(&self) -> Arc<dyn ObjectStore> {
        self.cache.objects().clone()
    }

    /// Latest revision number (0 for an empty branch)
    pub fn revision_count(&self) -> u64 {
        self.revisions.read().len() as u64
    }

    /// Assign revision numbers to commits reachable from the branch tip.
    ///
    /// Walks first parents from the tip back to the last known commit, fills
    /// the revision cache oldest-first, persists the new entries and only
    /// then makes them visible. Returns the latest revision number.
    pub async fn update_revisions(&self) -> Result<u64> {
        let _writer = self.writer.lock().await;

        let objects = self.objects();
        let branch = self.branch.clone();
        let tip = blocking(move || objects.resolve_branch(&branch)).await?;
        let Some(tip) = tip else {
            return Ok(self.revision_count());
        };

        let known_tip = self.revisions.read().last().copied();
        if known_tip == Some(tip) {
            return Ok(self.revision_count());
        }

        let objects = self.objects();
        let known: HashSet<CommitId> = self.revisions.read().iter().copied().collect();
        let branch = self.branch.clone();
        let walked = blocking(move || {
            let mut walked = Vec::new();
            let mut cursor = Some(tip);
            while let Some(commit) = cursor {
                if Some(commit) == known_tip {
                    break;
                }
                if known.contains(&commit) {
                    return Err(SvnError::HistoryRewritten {
                        branch,
                        message: format!("tip moved back to {}", commit),
                    });
                }
                let meta = objects.commit(&commit)?;
                cursor = meta.first_parent().copied();
                walked.push(Arc::new(meta));
                if cursor.is_none() && known_tip.is_some() {
                    return Err(SvnError::HistoryRewritten {
                        branch,
                        message: format!("r{} is not an ancestor of the new tip", known.len()),
                    });
                }
            }
            walked.reverse();
            Ok(walked)
        })
        .await?;

        for meta in &walked {
            self.cache.get(&meta.id).await?;
        }

        let store = self.cache.store().clone();
        let prefix = table_prefix(&self.repository, &self.branch);
        let first = self.revision_count() + 1;
        let ids: Vec<CommitId> = walked.iter().map(|meta| meta.id).collect();
        let persisted = ids.clone();
        blocking(move || persist(store.as_ref(), &prefix, first, &persisted)).await?;

        {
            let mut metas = self.metas.write();
            for meta in walked {
                metas.insert(meta.id, meta);
            }
        }
        let latest = {
            let mut revisions = self.revisions.write();
            revisions.extend(ids);
            revisions.len() as u64
        };
        tracing::info!(
            "{}:{} now at r{} ({} new)",
            self.repository,
            self.branch,
            latest,
            latest + 1 - first
        );
        Ok(latest)
    }

    /// Commit of revision `n`; `None` for revision 0
    pub fn commit_at(&self, n: u64) -> Result<Option<CommitId>> {
        if n == 0 {
            return Ok(None);
        }
        self.revisions
            .read()
            .get(n as usize - 1)
            .copied()
            .map(Some)
            .ok_or_else(|| no_such_revision(n))
    }

    pub async fn cached_revision(&self, n: u64) -> Result<Arc<CachedRevision>> {
        match self.commit_at(n)? {
            Some(commit) => self.cache.get(&commit).await,
            None => Ok(Arc::new(CachedRevision::empty())),
        }
    }

    /// Net changes from revision `from` to revision `to`
    pub async fn changes_between(&self, from: u64, to: u64) -> Result<Changes> {
        if from > to {
            return Err(SvnError::not_found(format!(
                "Invalid revision range r{}:r{}",
                from, to
            )));
        }
        self.commit_at(to)?;

        let mut revisions = Vec::with_capacity((to - from) as usize);
        for n in from + 1..=to {
            revisions.push(self.cached_revision(n).await?);
        }
        Ok(Changes::compose(revisions.iter().map(Arc::as_ref)))
    }

    /// Flattened tree of revision `n`
    pub async fn tree_at(&self, n: u64) -> Result<Tree> {
        match self.commit_at(n)? {
            Some(commit) => {
                let objects = self.objects();
                blocking(move || objects.tree_at(&commit)).await
            }
            None => Ok(Tree::empty()),
        }
    }

    /// Kind of `path` in revision `n`, with the file entry when it is one
    pub async fn entry_at(&self, path: &str, n: u64) -> Result<(NodeKind, Option<TreeEntry>)> {
        let tree = self.tree_at(n).await?;
        let kind = tree.node_kind(path);
        Ok((kind, tree.get(path).copied()))
    }

    /// Newest revision at or before `n` that touched `path` or anything below it
    pub async fn last_change(&self, path: &str, n: u64) -> Result<u64> {
        let wanted = BTreeSet::from([path.to_string()]);
        Ok(self.last_changes(&wanted, n).await?.get(path).copied().unwrap_or(0))
    }

    /// [`last_change`](Self::last_change) for many paths in one backward walk.
    ///
    /// A change to a file counts for every directory above it. Paths that
    /// were never touched map to 0; the root maps to `n`.
    pub async fn last_changes(&self, paths: &BTreeSet<String>, n: u64) -> Result<HashMap<String, u64>> {
        self.commit_at(n)?;
        let mut found: HashMap<String, u64> = HashMap::with_capacity(paths.len());
        // every revision changes the root
        if paths.contains("") {
            found.insert(String::new(), n);
        }
        for r in (1..=n).rev() {
            if found.len() == paths.len() {
                break;
            }
            let revision = self.cached_revision(r).await?;
            let touched = revision
                .file_changes()
                .keys()
                .chain(revision.renames().keys())
                .chain(revision.renames().values());
            for path in touched {
                let mut current = path.as_str();
                loop {
                    if paths.contains(current) && !found.contains_key(current) {
                        found.insert(current.to_string(), r);
                    }
                    if current.is_empty() {
                        break;
                    }
                    current = split_path(current).0;
                }
            }
        }
        for path in paths {
            found.entry(path.clone()).or_insert(0);
        }
        Ok(found)
    }

    /// Commit metadata of revision `n`; `None` for revision 0
    pub async fn commit_meta(&self, n: u64) -> Result<Option<Arc<CommitMeta>>> {
        let Some(commit) = self.commit_at(n)? else {
            return Ok(None);
        };
        if let Some(meta) = self.metas.read().get(&commit) {
            return Ok(Some(meta.clone()));
        }
        let objects = self.objects();
        let meta = Arc::new(blocking(move || objects.commit(&commit)).await?);
        self.metas.write().insert(commit, meta.clone());
        Ok(Some(meta))
    }

    /// Latest revision whose commit time is not after `timestamp`
    pub async fn revision_at_date(&self, timestamp: i64) -> Result<u64> {
        for n in (1..=self.revision_count()).rev() {
            if let Some(meta) = self.commit_meta(n).await? {
                if meta.time <= timestamp {
                    return Ok(n);
                }
            }
        }
        Ok(0)
    }

    /// Revisions in `start..=end` (either order) that touched `path`
    pub async fn revisions_touching(&self, path: &str, start: u64, end: u64) -> Result<Vec<u64>> {
        let (low, high) = if start <= end { (start, end) } else { (end, start) };
        self.commit_at(high)?;
        let mut touching = Vec::new();
        for n in low.max(1)..=high {
            if path.is_empty() || self.cached_revision(n).await?.touches(path) {
                touching.push(n);
            }
        }
        if start > end {
            touching.reverse();
        }
        Ok(touching)
    }

    /// True if `path` exists in revision `n`
    pub async fn exists(&self, path: &str, n: u64) -> Result<bool> {
        Ok(self.tree_at(n).await?.node_kind(path) != NodeKind::None)
    }

    /// Files below `dir` in revision `n`, keyed by full path
    pub async fn files_under(&self, dir: &str, n: u64) -> Result<Vec<(String, TreeEntry)>> {
        let tree = self.tree_at(n).await?;
        Ok(tree
            .files()
            .filter(|(path, _)| is_same_or_below(path, dir))
            .map(|(path, entry)| (path.clone(), *entry))
            .collect())
    }

    pub async fn read_blob(&self, entry: &TreeEntry) -> Result<Vec<u8>> {
        let objects = self.objects();
        let blob = entry.blob;
        blocking(move || objects.read_blob(&blob)).await
    }
}

fn table_prefix(repository: &str, branch: &str) -> String {
    format!("revision/{}@{}/", repository, branch)
}

fn persist(store: &dyn KeyValueStore, prefix: &str, first: u64, commits: &[CommitId]) -> Result<()> {
    for (offset, commit) in commits.iter().enumerate() {
        store.put(&format!("{}{}", prefix, first + offset as u64), &encode_value(commit)?)?;
    }
    let count = first - 1 + commits.len() as u64;
    store.put(&format!("{}count", prefix), &encode_value(&count)?)
}

fn encode_value<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| SvnError::Cache {
        message: format!("Failed to encode revision table: {}", e),
    })
}

fn decode_value<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| SvnError::Cache {
        message: format!("Corrupt revision table: {}", e),
    })
}

fn no_such_revision(n: u64) -> SvnError {
    SvnError::NotFound {
        message: format!("No such revision {}", n),
    }
}

/// Run blocking object-store work off the async workers
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SvnError::internal(format!("Blocking task failed: {}", e)))?
}
