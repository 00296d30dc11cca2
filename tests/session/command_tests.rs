//! Revision, node and session commands

use md5::{Digest, Md5};

use gitsvn::error::codes;

use crate::common::*;

fn md5_hex(data: &[u8]) -> String {
    Md5::digest(data).iter().map(|b| format!("{:02x}", b)).collect()
}

/// `( ( name value )... )` as pairs
fn props(item: &Item) -> Vec<(String, String)> {
    item.list()
        .iter()
        .map(|prop| (prop.list()[0].text(), prop.list()[1].text()))
        .collect()
}

fn prop<'a>(props: &'a [(String, String)], name: &str) -> Option<&'a str> {
    props
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

#[tokio::test]
async fn test_unknown_command_keeps_session_alive() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    client.send("( frobnicate ( 1 ( nested 3:abc ) ) ) ").await;
    let (code, message) = client.read_failure().await;
    assert_eq!(code, codes::RA_SVN_UNKNOWN_CMD);
    assert!(message.contains("frobnicate"));

    client.command("( get-latest-rev ( ) ) ").await;
    assert_eq!(client.read_success().await[0].number(), 3);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_get_latest_rev_picks_up_new_commits() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    fixture
        .objects
        .commit_on("main")
        .write("NEWS", "released\n")
        .message("news")
        .create();

    client.command("( get-latest-rev ( ) ) ").await;
    assert_eq!(client.read_success().await[0].number(), 4);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_get_dated_rev() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    // r1 at 12:27:40, r2 at 12:28:40, r3 at 12:29:40
    for (date, expected) in [
        ("2020-09-13T12:29:00.000000Z", 2),
        ("2020-09-13T12:27:40.000000Z", 1),
        ("2020-01-01T00:00:00.000000Z", 0),
        ("2030-01-01T00:00:00.000000Z", 3),
    ] {
        client.command(&format!("( get-dated-rev ( {} ) ) ", s(date))).await;
        assert_eq!(client.read_success().await[0].number(), expected, "{}", date);
    }

    client.command(&format!("( get-dated-rev ( {} ) ) ", s("yesterday"))).await;
    let (code, _) = client.read_failure().await;
    assert_eq!(code, codes::BAD_DATE);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_rev_proplist_and_rev_prop() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    client.command("( rev-proplist ( 2 ) ) ").await;
    let response = client.read_success().await;
    let list = props(&response[0]);
    assert_eq!(prop(&list, "svn:author"), Some("bob"));
    assert_eq!(prop(&list, "svn:log"), Some("say hi"));
    assert_eq!(prop(&list, "svn:date"), Some("2020-09-13T12:28:40.000000Z"));

    client.command(&format!("( rev-prop ( 3 {} ) ) ", s("svn:log"))).await;
    let response = client.read_success().await;
    assert_eq!(response[0].list()[0].text(), "move docs");

    client.command(&format!("( rev-prop ( 3 {} ) ) ", s("svn:missing"))).await;
    let response = client.read_success().await;
    assert!(response[0].list().is_empty());

    client.command("( rev-proplist ( 0 ) ) ").await;
    let response = client.read_success().await;
    let list = props(&response[0]);
    assert_eq!(list, vec![("svn:date".to_string(), "1970-01-01T00:00:00.000000Z".to_string())]);

    client.command("( rev-proplist ( 9 ) ) ").await;
    let (code, _) = client.read_failure().await;
    assert_eq!(code, codes::FS_NOT_FOUND);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_get_file_contents_and_props() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    client
        .command(&format!("( get-file ( {} ( 2 ) true true ) ) ", s("build.sh")))
        .await;
    let response = client.read_success().await;
    let content = b"#!/bin/sh\ncargo build\n";
    assert_eq!(response[0].list()[0].text(), md5_hex(content));
    assert_eq!(response[1].number(), 2);
    let list = props(&response[2]);
    assert_eq!(prop(&list, "svn:executable"), Some("*"));
    assert_eq!(prop(&list, "svn:entry:committed-rev"), Some("2"));
    assert_eq!(prop(&list, "svn:entry:last-author"), Some("bob"));
    assert_eq!(prop(&list, "svn:entry:uuid"), Some(fixture.branch.uuid()));

    let mut received = Vec::new();
    loop {
        let chunk = client.read().await;
        if chunk.bytes().is_empty() {
            break;
        }
        received.extend_from_slice(chunk.bytes());
    }
    assert_eq!(received, content);
    client.read_success().await;

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_get_file_at_older_revision_without_contents() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    client
        .command(&format!("( get-file ( {} ( 1 ) false false ) ) ", s("src/main.rs")))
        .await;
    let response = client.read_success().await;
    assert_eq!(response[0].list()[0].text(), md5_hex(b"fn main() {}\n"));
    assert_eq!(response[1].number(), 1);
    assert!(response[2].list().is_empty());

    // nothing follows when contents were not requested
    client.command("( get-latest-rev ( ) ) ").await;
    assert_eq!(client.read_success().await[0].number(), 3);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_get_file_errors_do_not_end_session() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    client.command(&format!("( get-file ( {} ( ) true true ) ) ", s("README"))).await;
    let (code, _) = client.read_failure().await;
    assert_eq!(code, codes::FS_NOT_FOUND);

    client.command(&format!("( get-file ( {} ( ) true true ) ) ", s("src"))).await;
    let (code, message) = client.read_failure().await;
    assert_eq!(code, codes::FS_NOT_FOUND);
    assert!(message.contains("is not a file"));

    client.command("( get-latest-rev ( ) ) ").await;
    client.read_success().await;
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_get_dir_lists_entries() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    client
        .command(&format!("( get-dir ( {} ( 3 ) true true ( kind size ) ) ) ", s("")))
        .await;
    let response = client.read_success().await;
    assert_eq!(response[0].number(), 3);
    let dir_props = props(&response[1]);
    assert_eq!(prop(&dir_props, "svn:entry:committed-rev"), Some("3"));

    let entries: Vec<(String, String, u64, u64)> = response[2]
        .list()
        .iter()
        .map(|entry| {
            let fields = entry.list();
            (
                fields[0].text(),
                fields[1].word().to_string(),
                fields[2].number(),
                fields[4].number(),
            )
        })
        .collect();
    assert_eq!(
        entries,
        vec![
            ("build.sh".to_string(), "file".to_string(), 22, 2),
            ("docs".to_string(), "dir".to_string(), 0, 3),
            ("src".to_string(), "dir".to_string(), 0, 2),
        ]
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_check_path_and_stat() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    for (path, revision, expected) in [
        ("README", 2, "file"),
        ("README", 3, "none"),
        ("docs", 3, "dir"),
        ("", 0, "dir"),
    ] {
        client
            .command(&format!("( check-path ( {} ( {} ) ) ) ", s(path), revision))
            .await;
        let response = client.read_success().await;
        assert_eq!(response[0].word(), expected, "{}@{}", path, revision);
    }

    client.command(&format!("( stat ( {} ( ) ) ) ", s("src/main.rs"))).await;
    let response = client.read_success().await;
    let dirent = response[0].list()[0].list();
    assert_eq!(dirent[0].word(), "file");
    assert_eq!(dirent[1].number(), 34);
    assert_eq!(dirent[3].number(), 2);
    assert_eq!(dirent[5].list()[0].text(), "bob");

    client.command(&format!("( stat ( {} ( 3 ) ) ) ", s("missing"))).await;
    let response = client.read_success().await;
    assert!(response[0].list().is_empty());

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_reparent_within_repository() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    client.command(&format!("( reparent ( {} ) ) ", s("svn://localhost/project/src"))).await;
    client.read_success().await;

    client.command(&format!("( check-path ( {} ( ) ) ) ", s("main.rs"))).await;
    assert_eq!(client.read_success().await[0].word(), "file");

    client.command(&format!("( reparent ( {} ) ) ", s("svn://localhost/other"))).await;
    let (code, _) = client.read_failure().await;
    assert_eq!(code, codes::RA_SVN_REPOS_NOT_FOUND);

    client.close().await.unwrap();
}
