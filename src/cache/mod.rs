//! Revision cache
//!
//! Converts commits into [`CachedRevision`] records (renames plus per-path
//! change kinds against the first parent). Records are a pure function of the
//! commit graph, so they are computed once, persisted through a
//! [`KeyValueStore`] and never invalidated except by [`RevisionCache::rebuild`].

mod revision;
mod revision_cache;
mod store;

pub use revision::{is_same_or_below, line_similarity, CachedRevision, ChangeKind};
pub use revision_cache::{decode, encode, revision_key, RevisionCache, REVISION_PREFIX};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
