//! Greeting, authentication and repository announcement

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use gitsvn::auth::cram_md5_response;
use gitsvn::error::codes;
use gitsvn::SvnError;

use crate::common::*;

fn words(items: &[Item]) -> Vec<&str> {
    items.iter().map(Item::word).collect()
}

#[tokio::test]
async fn test_greeting_advertises_version_and_capabilities() {
    let fixture = project();
    let mut client = TestClient::connect(fixture.state.clone());

    let greeting = client.read_success().await;
    assert_eq!(greeting[0].number(), 2);
    assert_eq!(greeting[1].number(), 2);
    assert!(greeting[2].list().is_empty());
    let capabilities = words(greeting[3].list());
    for capability in ["edit-pipeline", "depth", "log-revprops", "absent-entries"] {
        assert!(capabilities.contains(&capability), "missing {}", capability);
    }

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_anonymous_login_announces_repository() {
    let fixture = project();
    let (client, announce) = TestClient::open(fixture.state.clone(), URL).await;

    assert_eq!(announce[0].text(), fixture.branch.uuid());
    assert_eq!(announce[1].text(), URL);
    assert!(announce[2].list().is_empty());
    assert_eq!(fixture.branch.revision_count(), 3);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_announce_strips_path_inside_repository() {
    let fixture = project();
    let (client, announce) = TestClient::open(fixture.state.clone(), "svn://localhost/project/src").await;

    assert_eq!(announce[1].text(), URL);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_auth_request_lists_methods_and_realm() {
    let fixture = project();
    let mut client = TestClient::connect(fixture.state.clone());
    client.read_success().await;
    client.send_client_info(2, URL).await;

    let request = client.read_success().await;
    assert_eq!(words(request[0].list()), vec!["ANONYMOUS", "CRAM-MD5"]);
    assert_eq!(request[1].text(), REALM);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_version_mismatch_is_rejected() {
    let fixture = project();
    let mut client = TestClient::connect(fixture.state.clone());
    client.read_success().await;
    client.send_client_info(3, URL).await;

    let (code, message) = client.read_failure().await;
    assert_eq!(code, codes::RA_SVN_BAD_VERSION);
    assert!(message.contains('3'));

    let result = client.close().await;
    assert!(matches!(result, Err(SvnError::VersionMismatch { version: 3 })));
}

#[tokio::test]
async fn test_cram_md5_login() {
    let builder = FixtureBuilder::new().anonymous(false);
    fixture::populate(builder.objects());
    let fixture = builder.build();

    let mut client = TestClient::connect(fixture.state.clone());
    client.read_success().await;
    client.send_client_info(2, URL).await;
    let request = client.read_success().await;
    assert_eq!(words(request[0].list()), vec!["CRAM-MD5"]);

    client.send("( CRAM-MD5 ( ) ) ").await;
    let step = client.read().await;
    assert_eq!(step.list()[0].word(), "step");
    let challenge = step.list()[1].list()[0].text();

    client.send(&format!("{} ", s(&cram_md5_response(USER, PASSWORD, &challenge)))).await;
    client.read_success().await;
    let announce = client.read_success().await;
    assert_eq!(announce[1].text(), URL);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_plain_login_when_enabled() {
    let builder = FixtureBuilder::new().anonymous(false).plain(true);
    fixture::populate(builder.objects());
    let fixture = builder.build();

    let mut client = TestClient::connect(fixture.state.clone());
    client.read_success().await;
    client.send_client_info(2, URL).await;
    let request = client.read_success().await;
    assert_eq!(words(request[0].list()), vec!["CRAM-MD5", "PLAIN"]);

    let wrong = STANDARD.encode(format!("\0{}\0nope", USER));
    client.send(&format!("( PLAIN ( {} ) ) ", s(&wrong))).await;
    assert_eq!(client.read_failure_message().await, "incorrect credentials");

    let token = STANDARD.encode(format!("\0{}\0{}", USER, PASSWORD));
    client.send(&format!("( PLAIN ( {} ) ) ", s(&token))).await;
    client.read_success().await;
    let announce = client.read_success().await;
    assert_eq!(announce[1].text(), URL);

    client.command("( get-latest-rev ( ) ) ").await;
    assert_eq!(client.read_success().await[0].number(), 3);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_failed_attempts_can_be_retried() {
    let fixture = project();
    let mut client = TestClient::connect(fixture.state.clone());
    client.read_success().await;
    client.send_client_info(2, URL).await;
    client.read_success().await;

    client.send("( KERBEROS ( ) ) ").await;
    assert_eq!(client.read_failure_message().await, "unknown auth type: KERBEROS");

    client.send("( CRAM-MD5 ( ) ) ").await;
    let step = client.read().await;
    let challenge = step.list()[1].list()[0].text();
    client.send(&format!("{} ", s(&cram_md5_response(USER, "wrong", &challenge)))).await;
    assert_eq!(client.read_failure_message().await, "incorrect credentials");

    client.send("( CRAM-MD5 ( ) ) ").await;
    let step = client.read().await;
    let challenge = step.list()[1].list()[0].text();
    client.send(&format!("{} ", s(&cram_md5_response(USER, PASSWORD, &challenge)))).await;
    client.read_success().await;
    client.read_success().await;

    client.command("( get-latest-rev ( ) ) ").await;
    assert_eq!(client.read_success().await[0].number(), 3);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_unknown_repository_ends_session() {
    let fixture = project();
    let mut client = TestClient::connect(fixture.state.clone());
    client.read_success().await;
    client.send_client_info(2, "svn://localhost/missing").await;
    client.read_success().await;
    client.send("( ANONYMOUS ( 0: ) ) ").await;
    client.read_success().await;

    let (code, _) = client.read_failure().await;
    assert_eq!(code, codes::RA_SVN_REPOS_NOT_FOUND);

    let result = client.close().await;
    assert!(matches!(result, Err(SvnError::RepositoryNotFound { .. })));
}

#[tokio::test]
async fn test_readers_restrict_access() {
    let builder = FixtureBuilder::new().readers(&[USER]);
    fixture::populate(builder.objects());
    let fixture = builder.build();

    let mut client = TestClient::connect(fixture.state.clone());
    client.read_success().await;
    client.send_client_info(2, URL).await;
    client.read_success().await;
    client.send("( ANONYMOUS ( 0: ) ) ").await;
    client.read_success().await;

    let (code, _) = client.read_failure().await;
    assert_eq!(code, codes::RA_NOT_AUTHORIZED);
    assert!(client.close().await.is_err());
}

#[tokio::test]
async fn test_truncated_frame_ends_session_with_syntax_error() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    client.send("( get-latest-rev ( ").await;
    let result = client.close().await;
    assert!(matches!(result, Err(SvnError::ProtocolSyntax { .. })));
}

#[tokio::test]
async fn test_hang_up_between_commands_is_a_clean_close() {
    let fixture = project();
    let (mut client, _) = TestClient::open(fixture.state.clone(), URL).await;

    client.command("( get-latest-rev ( ) ) ").await;
    client.read_success().await;
    client.close().await.unwrap();
}
