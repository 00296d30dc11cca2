//! `log` streaming

use gitsvn::error::codes;

use crate::common::*;

/// One log entry as (revision, changed paths, author, message)
struct Entry {
    revision: u64,
    changes: Vec<(String, String, Option<(String, u64)>)>,
    author: Option<String>,
    message: Option<String>,
}

async fn read_log(client: &mut TestClient) -> Vec<Entry> {
    let mut entries = Vec::new();
    loop {
        let item = client.read().await;
        if let Item::Word(word) = &item {
            assert_eq!(word, "done");
            break;
        }
        let fields = item.list();
        let changes = fields[0]
            .list()
            .iter()
            .map(|change| {
                let parts = change.list();
                let copy_from = parts[2]
                    .list()
                    .first()
                    .map(|from| (from.text(), parts[2].list()[1].number()));
                (parts[0].text(), parts[1].word().to_string(), copy_from)
            })
            .collect();
        entries.push(Entry {
            revision: fields[1].number(),
            changes,
            author: fields[2].list().first().map(Item::text),
            message: fields[4].list().first().map(Item::text),
        });
    }
    client.read_success().await;
    entries
}

fn log_command(path: &str, start: u64, end: u64, changed_paths: bool, limit: u64, revprops: Option<&[&str]>) -> String {
    let revprops = match revprops {
        Some(names) => {
            let names: Vec<String> = names.iter().map(|name| s(name)).collect();
            format!(" revprops ( {} )", names.join(" "))
        }
        None => " all-revprops ( )".to_string(),
    };
    format!(
        "( log ( ( {} ) ( {} ) ( {} ) {} false {} false{} ) ) ",
        s(path),
        start,
        end,
        changed_paths,
        limit,
        revprops
    )
}

#[tokio::test]
async fn test_log_newest_first_with_changed_paths() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    client.command(&log_command("", 3, 1, true, 0, None)).await;
    let entries = read_log(&mut client).await;

    let revisions: Vec<u64> = entries.iter().map(|e| e.revision).collect();
    assert_eq!(revisions, vec![3, 2, 1]);

    let rename = &entries[0];
    assert_eq!(rename.author.as_deref(), Some("alice"));
    assert_eq!(rename.message.as_deref(), Some("move docs"));
    assert_eq!(
        rename.changes,
        vec![
            ("/README".to_string(), "D".to_string(), None),
            (
                "/docs/README.md".to_string(),
                "A".to_string(),
                Some(("/README".to_string(), 2))
            ),
        ]
    );

    let edit = &entries[1];
    assert_eq!(
        edit.changes,
        vec![
            ("/build.sh".to_string(), "A".to_string(), None),
            ("/src/main.rs".to_string(), "M".to_string(), None),
        ]
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_log_oldest_first_for_single_file() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    client.command(&log_command("src/main.rs", 1, 3, false, 0, None)).await;
    let entries = read_log(&mut client).await;

    let revisions: Vec<u64> = entries.iter().map(|e| e.revision).collect();
    assert_eq!(revisions, vec![1, 2]);
    assert!(entries.iter().all(|e| e.changes.is_empty()));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_log_limit_and_revprops() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    client
        .command(&log_command("", 3, 1, false, 1, Some(&["svn:author"])))
        .await;
    let entries = read_log(&mut client).await;

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].revision, 3);
    assert_eq!(entries[0].author.as_deref(), Some("alice"));
    assert_eq!(entries[0].message, None);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_log_spanning_many_batches() {
    let builder = FixtureBuilder::new();
    for i in 0..150 {
        builder
            .objects()
            .commit_on("main")
            .write("counter", format!("{}\n", i))
            .message(&format!("count {}", i))
            .create();
    }
    let fixture = builder.build();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    client.command(&log_command("counter", 150, 1, true, 0, None)).await;
    let entries = read_log(&mut client).await;

    assert_eq!(entries.len(), 150);
    assert_eq!(entries[0].revision, 150);
    assert_eq!(entries[149].revision, 1);
    assert_eq!(entries[149].changes[0].1, "A");

    client.command("( get-latest-rev ( ) ) ").await;
    assert_eq!(client.read_success().await[0].number(), 150);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_log_of_missing_path_fails() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    client.command(&log_command("README", 3, 1, false, 0, None)).await;
    let (code, _) = client.read_failure().await;
    assert_eq!(code, codes::FS_NOT_FOUND);

    client.command(&log_command("README", 2, 1, false, 0, None)).await;
    let entries = read_log(&mut client).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].revision, 1);

    client.close().await.unwrap();
}
