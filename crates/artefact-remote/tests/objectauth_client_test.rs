//! Contract tests for the authorization oracle and source-control clients.

use artefact_core::RepositoryId;
use artefact_remote::gitserver::{HttpGitServerClient, SourceRepoDirectory};
use artefact_remote::objectauth::{AuthorizationOracle, HttpObjectAuthClient, ObjectType};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn ask_object_access_sends_user_and_object() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/objectauth/v1/access"))
        .and(body_json(serde_json::json!({
            "user_id": "u-1",
            "object_type": "ARTEFACT",
            "object_id": 42
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"view": true, "read": false})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = HttpObjectAuthClient::new(reqwest::Client::new(), mock_server.uri().parse().unwrap());
    let perms = client
        .ask_object_access("u-1", ObjectType::Artefact, 42)
        .await
        .unwrap();
    assert!(perms.view);
    assert!(!perms.can_view_and_read());
}

#[tokio::test]
async fn service_access_reads_flag() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/objectauth/v1/service-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"read_access": true})))
        .mount(&mock_server)
        .await;

    let client = HttpObjectAuthClient::new(reqwest::Client::new(), mock_server.uri().parse().unwrap());
    assert!(client
        .allow_all_service_access("900", ObjectType::Artefact)
        .await
        .unwrap());
}

#[tokio::test]
async fn repo_by_id_returns_urls() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gitserver/v1/repos/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 7,
            "urls": [{"host": "git.example.com", "path": "tools/firmware.git"}]
        })))
        .mount(&mock_server)
        .await;

    let client = HttpGitServerClient::new(reqwest::Client::new(), mock_server.uri().parse().unwrap());
    let repo = client.repo_by_id(RepositoryId::new(7)).await.unwrap();
    assert_eq!(repo.urls.len(), 1);
    assert_eq!(
        repo.urls[0].to_clone_url(),
        "https://git.example.com/git/tools/firmware.git"
    );
}
