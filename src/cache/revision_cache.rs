//! Shared, single-flight revision cache

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;

use super::revision::CachedRevision;
use super::store::KeyValueStore;
use crate::error::{Result, SvnError};
use crate::git::{CommitId, ObjectStore};

/// Key prefix of persisted revision records
pub const REVISION_PREFIX: &str = "cache/revision/";

type InFlight = Arc<OnceCell<Arc<CachedRevision>>>;

/// Commit id -> [`CachedRevision`], shared by every branch of one repository.
///
/// Lookups go arena, then durable store, then computation. At most one
/// computation per commit is in flight; concurrent callers await the same
/// cell.
pub struct RevisionCache {
    objects: Arc<dyn ObjectStore>,
    store: Arc<dyn KeyValueStore>,
    arena: RwLock<HashMap<CommitId, Arc<CachedRevision>>>,
    in_flight: Mutex<HashMap<CommitId, InFlight>>,
    similarity: Option<u8>,
    computed: Arc<AtomicU64>,
}

impl RevisionCache {
    pub fn new(objects: Arc<dyn ObjectStore>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            objects,
            store,
            arena: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            similarity: None,
            computed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enable inexact rename detection at `percent` common lines
    pub fn with_rename_similarity(mut self, percent: Option<u8>) -> Self {
        self.similarity = percent.map(|p| p.min(100));
        self
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Number of revisions diffed by this instance (not loaded from disk)
    pub fn computed(&self) -> u64 {
        self.computed.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.arena.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.read().is_empty()
    }

    pub async fn get(&self, commit: &CommitId) -> Result<Arc<CachedRevision>> {
        if let Some(hit) = self.arena.read().get(commit) {
            return Ok(hit.clone());
        }

        let cell = {
            let mut in_flight = self.in_flight.lock();
            // a finished computation lands in the arena before its cell is removed
            if let Some(hit) = self.arena.read().get(commit) {
                return Ok(hit.clone());
            }
            in_flight
                .entry(*commit)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_try_init(|| self.load_or_compute(*commit))
            .await
            .map(Arc::clone);

        let mut in_flight = self.in_flight.lock();
        if in_flight.get(commit).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
            in_flight.remove(commit);
        }
        result
    }

    async fn load_or_compute(&self, commit: CommitId) -> Result<Arc<CachedRevision>> {
        let objects = self.objects.clone();
        let store = self.store.clone();
        let similarity = self.similarity;
        let computed = self.computed.clone();

        let revision = tokio::task::spawn_blocking(move || -> Result<CachedRevision> {
            let key = revision_key(&commit);
            if let Some(bytes) = store.get(&key)? {
                tracing::debug!("Loaded revision record for {}", commit);
                return decode(&bytes);
            }
            let revision = CachedRevision::compute(objects.as_ref(), &commit, similarity)?;
            computed.fetch_add(1, Ordering::Relaxed);
            store.put(&key, &encode(&revision)?)?;
            tracing::debug!(
                "Computed revision record for {} ({} changes, {} renames)",
                commit,
                revision.file_changes().len(),
                revision.renames().len()
            );
            Ok(revision)
        })
        .await
        .map_err(|e| SvnError::internal(format!("Revision cache worker failed: {}", e)))??;

        let revision = Arc::new(revision);
        self.arena.write().insert(commit, revision.clone());
        Ok(revision)
    }

    /// Drop every cached record, in memory and on disk
    pub fn rebuild(&self) -> Result<usize> {
        self.arena.write().clear();
        let removed = self.store.delete_prefix(REVISION_PREFIX)?;
        tracing::info!("Dropped {} persisted revision records", removed);
        Ok(removed)
    }
}

pub fn revision_key(commit: &CommitId) -> String {
    format!("{}{}", REVISION_PREFIX, commit)
}

pub fn encode(revision: &CachedRevision) -> Result<Vec<u8>> {
    bincode::serialize(revision).map_err(|e| SvnError::Cache {
        message: format!("Failed to encode revision record: {}", e),
    })
}

pub fn decode(bytes: &[u8]) -> Result<CachedRevision> {
    bincode::deserialize(bytes).map_err(|e| SvnError::Cache {
        message: format!("Corrupt revision record: {}", e),
    })
}
