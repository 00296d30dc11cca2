//! gitsvn: Subversion protocol server backed by git
//!
//! Clients speak `svn://` (ra_svn) to this server; every exported git branch
//! appears as a Subversion repository whose revision `n` is the `n`-th
//! commit on the branch's first-parent history.
//!
//! # Layers
//!
//! - [`wire`]: token codec for the ra_svn protocol
//! - [`auth`]: authentication methods and user directories
//! - [`git`]: commit graph access through an [`ObjectStore`](git::ObjectStore)
//! - [`cache`]: per-commit change records, memoised and persisted
//! - [`repository`]: branch views numbering revisions and URL mapping
//! - [`server`]: listener, sessions and command handlers
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gitsvn::{Config, LocalUserDirectory, RepositoryMapping, SharedContextBuilder, SqliteStore};
//! use gitsvn::server::{ServerSettings, SvnServer};
//!
//! let config = Config::load_from(path)?;
//! let store = Arc::new(SqliteStore::open(&config.cache_path())?);
//! let mut builder = SharedContextBuilder::new();
//! builder.add(store.clone())?;
//! builder.add(Arc::new(LocalUserDirectory::from_config(&config.users)))?;
//! builder.add(Arc::new(RepositoryMapping::from_config(&config, store)?))?;
//! let shared = builder.ready().await?;
//!
//! let server = SvnServer::bind(&config.listen_address(), ServerSettings::from_config(&config), shared).await?;
//! tokio::signal::ctrl_c().await?;
//! server.shutdown().await?;
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod delta;
pub mod error;
pub mod git;
pub mod repository;
pub mod server;
pub mod wire;

// Re-export commonly used types
pub use auth::{Authenticator, AuthenticatorSet, LocalUserDirectory, User, UserDirectory};
pub use cache::{CachedRevision, ChangeKind, KeyValueStore, MemoryStore, RevisionCache, SqliteStore};
pub use config::Config;
pub use context::{Shared, SharedContext, SharedContextBuilder};
pub use error::{Result, SvnError};
pub use git::{GitRepository, MemoryObjectStore, ObjectStore};
pub use repository::{Branch, Repository, RepositoryMapping};
pub use server::{ServerSettings, ServerState, Session, SvnServer};
