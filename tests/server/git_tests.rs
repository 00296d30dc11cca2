//! Repositories read through the git executable

use std::sync::Arc;

use tempfile::TempDir;

use gitsvn::server::{ServerSettings, SvnServer};
use gitsvn::{
    Branch, Config, GitRepository, LocalUserDirectory, RepositoryMapping, RevisionCache, SharedContextBuilder,
    SqliteStore, SvnError,
};

use crate::common::*;

fn two_commit_repo() -> TestRepo {
    let repo = TestRepo::new();
    repo.init_git()
        .add_file("README", "hello\n")
        .add_file("src/lib.rs", "pub fn answer() -> u32 { 42 }\n")
        .commit("initial");
    repo.rename_file("README", "README.md");
    repo.commit("rename readme");
    repo
}

fn open_branch(repo: &TestRepo, store: Arc<SqliteStore>) -> (Branch, Arc<RevisionCache>) {
    let git = GitRepository::open(repo.path()).unwrap();
    let cache = Arc::new(RevisionCache::new(Arc::new(git), store));
    let branch = Branch::open("project", "main", cache.clone()).unwrap();
    (branch, cache)
}

#[tokio::test]
async fn test_git_repository_served_from_config() {
    let repo = two_commit_repo();
    let cache_dir = TempDir::new().unwrap();
    let config = Config::parse(&format!(
        r#"
host = "127.0.0.1"
port = 0
allow_anonymous = true
cache_path = '{}'

[repositories.project]
path = '{}'
branch = "main"
"#,
        cache_dir.path().join("cache.db").display(),
        repo.path().display()
    ))
    .unwrap();
    config.validate().unwrap();

    let store = Arc::new(SqliteStore::open(&config.cache_path()).unwrap());
    let users = Arc::new(LocalUserDirectory::from_config(&config.users));
    let mapping = Arc::new(RepositoryMapping::from_config(&config, store.clone()).unwrap());
    let mut builder = SharedContextBuilder::new();
    builder.add(store).unwrap();
    builder.add(users).unwrap();
    builder.add(mapping).unwrap();
    let shared = builder.ready().await.unwrap();

    let server = SvnServer::bind(&config.listen_address(), ServerSettings::from_config(&config), shared)
        .await
        .unwrap();
    let mut client = TestClient::connect_tcp(server.local_addr()).await;
    client.login(URL).await;

    client.command("( get-latest-rev ( ) ) ").await;
    assert_eq!(client.read_success().await[0].number(), 2);

    client.command("( rev-proplist ( 2 ) ) ").await;
    let response = client.read_success().await;
    let props: Vec<(String, String)> = response[0]
        .list()
        .iter()
        .map(|prop| (prop.list()[0].text(), prop.list()[1].text()))
        .collect();
    assert!(props.contains(&("svn:author".to_string(), "Test User".to_string())));
    assert!(props.contains(&("svn:log".to_string(), "rename readme".to_string())));

    client
        .command(&format!(
            "( log ( ( {} ) ( 2 ) ( 2 ) true false 0 false ) ) ",
            s("")
        ))
        .await;
    let entry = client.read().await;
    let changes = entry.list()[0].list();
    assert_eq!(changes.len(), 2);
    let added = changes[1].list();
    assert_eq!(added[0].text(), "/README.md");
    assert_eq!(added[1].word(), "A");
    assert_eq!(added[2].list()[0].text(), "/README");
    assert_eq!(added[2].list()[1].number(), 1);
    assert_eq!(client.read().await, Item::Word("done".to_string()));
    client.read_success().await;

    client
        .command(&format!("( get-file ( {} ( ) false true ) ) ", s("src/lib.rs")))
        .await;
    client.read_success().await;
    assert_eq!(client.read().await.text(), "pub fn answer() -> u32 { 42 }\n");
    assert!(client.read().await.bytes().is_empty());
    client.read_success().await;

    client.close().await.unwrap();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_revision_table_survives_restart() {
    let repo = two_commit_repo();
    let cache_dir = TempDir::new().unwrap();
    let db = cache_dir.path().join("cache.db");

    let uuid = {
        let store = Arc::new(SqliteStore::open(&db).unwrap());
        let (branch, cache) = open_branch(&repo, store);
        assert_eq!(branch.update_revisions().await.unwrap(), 2);
        assert_eq!(cache.computed(), 2);
        branch.uuid().to_string()
    };

    let store = Arc::new(SqliteStore::open(&db).unwrap());
    let (branch, cache) = open_branch(&repo, store);
    assert_eq!(branch.revision_count(), 2);
    assert_eq!(branch.uuid(), uuid);
    assert_eq!(branch.update_revisions().await.unwrap(), 2);

    let changes = branch.changes_between(0, 2).await.unwrap();
    assert!(changes.file_changes.contains_key("README.md"));
    assert!(changes.file_changes.contains_key("src/lib.rs"));
    assert_eq!(cache.computed(), 0);

    repo.add_file("NEWS", "news\n").commit("news");
    assert_eq!(branch.update_revisions().await.unwrap(), 3);
    assert_eq!(cache.computed(), 1);
}

#[tokio::test]
async fn test_rewritten_history_is_rejected() {
    let repo = two_commit_repo();
    let (branch, _) = open_branch(&repo, Arc::new(SqliteStore::open_in_memory().unwrap()));
    assert_eq!(branch.update_revisions().await.unwrap(), 2);

    repo.git(&["reset", "--hard", "HEAD~1"]);
    repo.add_file("OTHER", "other\n").commit("diverge");

    let result = branch.update_revisions().await;
    assert!(matches!(result, Err(SvnError::HistoryRewritten { .. })));
    assert_eq!(branch.revision_count(), 2);
}
