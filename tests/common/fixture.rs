//! In-memory repository served by a [`ServerState`]

use std::sync::Arc;
use std::time::Duration;

use gitsvn::auth::{Authenticator, AuthenticatorSet};
use gitsvn::server::{ServerSettings, ServerState};
use gitsvn::{Branch, LocalUserDirectory, MemoryObjectStore, MemoryStore, Repository, RepositoryMapping, RevisionCache};

pub const URL: &str = "svn://localhost/project";
pub const REALM: &str = "test-realm";
pub const USER: &str = "jane";
pub const PASSWORD: &str = "secret";

pub struct Fixture {
    pub objects: Arc<MemoryObjectStore>,
    pub branch: Arc<Branch>,
    pub state: Arc<ServerState>,
}

/// Builder for a single-repository server named `project`, branch `main`
pub struct FixtureBuilder {
    allow_anonymous: bool,
    allow_plain: bool,
    readers: Option<Vec<String>>,
    shutdown_grace: Duration,
    objects: Arc<MemoryObjectStore>,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self {
            allow_anonymous: true,
            allow_plain: false,
            readers: None,
            shutdown_grace: Duration::from_secs(5),
            objects: Arc::new(MemoryObjectStore::new()),
        }
    }

    pub fn anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }

    pub fn plain(mut self, allow: bool) -> Self {
        self.allow_plain = allow;
        self
    }

    pub fn readers(mut self, readers: &[&str]) -> Self {
        self.readers = Some(readers.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn objects(&self) -> &MemoryObjectStore {
        &self.objects
    }

    pub fn build(self) -> Fixture {
        let cache = RevisionCache::new(self.objects.clone(), Arc::new(MemoryStore::new()));
        let branch = Arc::new(Branch::open("project", "main", Arc::new(cache)).expect("Failed to open branch"));

        let mut mapping = RepositoryMapping::new();
        mapping
            .add(Arc::new(Repository::new("project", branch.clone(), self.readers)))
            .expect("Failed to add repository");

        let users = Arc::new(LocalUserDirectory::new());
        users.add(USER, PASSWORD, "Jane Doe", Some("jane@example.com".to_string()));

        let settings = ServerSettings {
            realm: REALM.to_string(),
            allow_anonymous: self.allow_anonymous,
            allow_plain: self.allow_plain,
            shutdown_grace: self.shutdown_grace,
            ..ServerSettings::default()
        };
        let mut authenticators = AuthenticatorSet::new(self.allow_anonymous, users.clone());
        if self.allow_plain {
            authenticators.offer(Authenticator::ClearText(users));
        }
        let state = ServerState::with_parts(settings, authenticators, Arc::new(mapping));

        Fixture {
            objects: self.objects,
            branch,
            state: Arc::new(state),
        }
    }
}

impl Default for FixtureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Three revisions:
///
/// - r1 adds `README` and `src/main.rs`
/// - r2 edits `src/main.rs` and adds an executable `build.sh`
/// - r3 renames `README` to `docs/README.md`
pub fn project() -> Fixture {
    let builder = FixtureBuilder::new();
    populate(builder.objects());
    builder.build()
}

pub fn populate(objects: &MemoryObjectStore) {
    objects
        .commit_on("main")
        .write("README", "hello\n")
        .write("src/main.rs", "fn main() {}\n")
        .author("alice")
        .message("initial import")
        .create();
    objects
        .commit_on("main")
        .write("src/main.rs", "fn main() {\n    println!(\"hi\");\n}\n")
        .write_executable("build.sh", "#!/bin/sh\ncargo build\n")
        .author("bob")
        .message("say hi")
        .create();
    objects
        .commit_on("main")
        .rename("README", "docs/README.md")
        .author("alice")
        .message("move docs")
        .create();
}
