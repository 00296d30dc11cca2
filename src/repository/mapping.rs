//! URL to repository resolution

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use super::branch::Branch;
use crate::auth::User;
use crate::cache::{KeyValueStore, RevisionCache};
use crate::config::Config;
use crate::context::{Shared, SharedContext};
use crate::error::{Result, SvnError};
use crate::git::GitRepository;

/// One exported branch plus its access list
pub struct Repository {
    name: String,
    branch: Arc<Branch>,
    readers: Option<HashSet<String>>,
}

impl Repository {
    pub fn new(name: &str, branch: Arc<Branch>, readers: Option<Vec<String>>) -> Self {
        Self {
            name: name.to_string(),
            branch,
            readers: readers.map(|r| r.into_iter().collect()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn branch(&self) -> &Arc<Branch> {
        &self.branch
    }

    pub fn check_read(&self, user: &User) -> Result<()> {
        match &self.readers {
            Some(readers) if !readers.contains(user.username()) => Err(SvnError::AccessDenied {
                message: format!("{} may not read {}", user.username(), self.name),
            }),
            _ => Ok(()),
        }
    }
}

/// A resolved `svn://` URL
#[derive(Clone)]
pub struct Resolved {
    pub repository: Arc<Repository>,
    /// URL of the repository root
    pub base_url: String,
    /// Path inside the repository, without leading or trailing slashes
    pub path: String,
}

/// Repository name -> repository; the longest matching URL prefix wins
#[derive(Default)]
pub struct RepositoryMapping {
    repositories: BTreeMap<String, Arc<Repository>>,
}

impl RepositoryMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every configured repository against the shared store
    pub fn from_config(config: &Config, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let mut mapping = Self::new();
        for (name, settings) in &config.repositories {
            let git = GitRepository::open(&settings.path)?;
            let cache = RevisionCache::new(Arc::new(git), store.clone())
                .with_rename_similarity(config.rename_similarity);
            let branch = Branch::open(name, &settings.branch, Arc::new(cache))?;
            mapping.add(Arc::new(Repository::new(
                name,
                Arc::new(branch),
                settings.readers.clone(),
            )))?;
            tracing::info!(
                "Serving {} ({}) as /{}",
                settings.path.display(),
                settings.branch,
                name
            );
        }
        Ok(mapping)
    }

    pub fn add(&mut self, repository: Arc<Repository>) -> Result<()> {
        let name = repository.name().to_string();
        if self.repositories.contains_key(&name) {
            return Err(SvnError::Config {
                message: format!("Repository {} is mapped twice", name),
            });
        }
        self.repositories.insert(name, repository);
        Ok(())
    }

    pub fn repositories(&self) -> impl Iterator<Item = &Arc<Repository>> {
        self.repositories.values()
    }

    pub fn resolve(&self, url: &str) -> Result<Resolved> {
        let not_found = || SvnError::RepositoryNotFound { url: url.to_string() };
        let (prefix, segments) = split_url(url).ok_or_else(not_found)?;

        for split in (1..=segments.len()).rev() {
            let name = segments[..split].join("/");
            if let Some(repository) = self.repositories.get(&name) {
                return Ok(Resolved {
                    repository: repository.clone(),
                    base_url: format!("{}/{}", prefix, encode_segments(&segments[..split])),
                    path: segments[split..].join("/"),
                });
            }
        }
        Err(not_found())
    }
}

#[async_trait]
impl Shared for RepositoryMapping {
    fn name(&self) -> &'static str {
        "repositories"
    }

    /// Initial revision scan of every repository
    async fn ready(&self, _context: &SharedContext) -> Result<()> {
        for repository in self.repositories.values() {
            repository.branch().update_revisions().await?;
        }
        Ok(())
    }
}

/// `svn://host:port/a/b%20c` -> (`svn://host:port`, [a, b c])
fn split_url(url: &str) -> Option<(String, Vec<String>)> {
    let (scheme, rest) = url.split_once("://")?;
    let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            _ => segments.push(percent_decode(segment)?),
        }
    }
    Some((format!("{}://{}", scheme, authority), segments))
}

fn percent_decode(segment: &str) -> Option<String> {
    let bytes = segment.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = segment.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

fn encode_segments(segments: &[String]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push('/');
        }
        for byte in segment.bytes() {
            if byte.is_ascii_alphanumeric() || b"-_.~".contains(&byte) {
                out.push(byte as char);
            } else {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    out
}
