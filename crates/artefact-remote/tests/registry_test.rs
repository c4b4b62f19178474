//! BackendRegistry against mock backends: discovery, federated listing,
//! domain routing and live version resolution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use artefact_core::{BackendId, Reference};
use artefact_remote::buildrepo::{BuildRepoClient, HttpBuildRepoClient};
use artefact_remote::types::{
    BackendRepoEntry, FileEntry, FileMeta, FileRequest, LatestVersion, ListFilesRequest,
    ManagerInfo, RepositoryMeta, VersionRequest,
};
use artefact_remote::{BackendRegistry, RemoteError};
use async_trait::async_trait;
use tokio::io::AsyncWrite;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn backend(domain: &str, repos: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manager-info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"domain": domain})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"entries": repos})))
        .mount(&server)
        .await;
    server
}

fn client(server: &MockServer) -> (String, Arc<dyn BuildRepoClient>) {
    let address = server.address().to_string();
    let client = HttpBuildRepoClient::new(reqwest::Client::new(), server.uri().parse().unwrap());
    (address, Arc::new(client))
}

#[tokio::test]
async fn list_repos_merges_all_backends_and_fills_domains() {
    let a = backend(
        "a.example",
        serde_json::json!([
            {"name": "zeta", "domain": "a.example"},
            {"name": "alpha"},
            {"name": "mid", "domain": "a.example"}
        ]),
    )
    .await;
    let b = backend(
        "b.example",
        serde_json::json!([{"name": "beta", "domain": "b.example"}, {"name": "gamma"}]),
    )
    .await;

    let registry = BackendRegistry::discover(vec![client(&a), client(&b)])
        .await
        .unwrap();
    let entries = registry.list_repos().await.unwrap();

    assert_eq!(entries.len(), 5);
    assert!(entries.iter().all(|e| !e.domain.is_empty()));
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["alpha", "beta", "gamma", "mid", "zeta"]);

    let alpha = &entries[0];
    assert_eq!(alpha.domain, "a.example");
    assert_eq!(alpha.origin, BackendId::for_address(&a.address().to_string()));
    assert_eq!(entries[2].domain, "b.example");
}

#[tokio::test]
async fn list_repos_fails_if_any_backend_fails() {
    let good = backend("a.example", serde_json::json!([{"name": "alpha"}])).await;
    let bad = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manager-info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"domain": "b.example"})))
        .mount(&bad)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&bad)
        .await;

    let registry = BackendRegistry::discover(vec![client(&good), client(&bad)])
        .await
        .unwrap();
    let err = registry.list_repos().await.unwrap_err();
    assert!(matches!(err, RemoteError::Api { status: 503, .. }));
}

#[tokio::test]
async fn discovery_failure_is_fatal() {
    let good = backend("a.example", serde_json::json!([])).await;
    let down = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manager-info"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&down)
        .await;

    let result = BackendRegistry::discover(vec![client(&good), client(&down)]).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn routing_requires_a_mapped_domain() {
    let a = backend("a.example", serde_json::json!([])).await;
    let registry = BackendRegistry::discover(vec![client(&a)]).await.unwrap();

    let err = registry.list_versions("", "firmware").await.unwrap_err();
    assert!(matches!(err, RemoteError::MissingDomain { .. }));

    let err = registry.list_versions("c.example", "firmware").await.unwrap_err();
    assert!(matches!(err, RemoteError::NoBackend { ref domain, .. } if domain == "c.example"));

    assert!(registry.backend_id_for_domain("a.example").is_some());
    assert!(registry.backend_id_for_domain("c.example").is_none());
}

#[tokio::test]
async fn latest_version_is_resolved_live_every_time() {
    let a = backend("a.example", serde_json::json!([])).await;
    Mock::given(method("POST"))
        .and(path("/versions/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"build_id": 41})))
        .expect(2)
        .mount(&a)
        .await;

    let registry = BackendRegistry::discover(vec![client(&a)]).await.unwrap();
    let backend_id = registry.backend_id_for_domain("a.example").unwrap().clone();
    let latest = Reference::artefact("a.example", backend_id.clone(), 0, "firmware").unwrap();
    let pinned = Reference::artefact("a.example", backend_id, 17, "firmware").unwrap();

    assert_eq!(registry.resolve_version(&latest).await.unwrap(), 41);
    assert_eq!(registry.resolve_version(&latest).await.unwrap(), 41);
    // Pinned versions never reach the backend.
    assert_eq!(registry.resolve_version(&pinned).await.unwrap(), 17);
}

/// Sets its flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A backend whose repository listing never answers.
struct StalledBackend {
    aborted: Arc<AtomicBool>,
}

#[async_trait]
impl BuildRepoClient for StalledBackend {
    async fn manager_info(&self) -> Result<ManagerInfo, RemoteError> {
        unimplemented!()
    }

    async fn list_repos(&self) -> Result<Vec<BackendRepoEntry>, RemoteError> {
        let _flag = DropFlag(Arc::clone(&self.aborted));
        std::future::pending().await
    }

    async fn list_files(&self, _: &ListFilesRequest) -> Result<Vec<FileEntry>, RemoteError> {
        unimplemented!()
    }

    async fn get_file(
        &self,
        _: &FileRequest,
        _: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, RemoteError> {
        unimplemented!()
    }

    async fn file_meta(&self, _: &FileRequest) -> Result<FileMeta, RemoteError> {
        unimplemented!()
    }

    async fn file_exists(&self, _: &FileRequest) -> Result<bool, RemoteError> {
        unimplemented!()
    }

    async fn latest_version(&self, _: &VersionRequest) -> Result<LatestVersion, RemoteError> {
        unimplemented!()
    }

    async fn list_versions(&self, _: &VersionRequest) -> Result<Vec<String>, RemoteError> {
        unimplemented!()
    }

    async fn repository_meta(&self, _: &str) -> Result<RepositoryMeta, RemoteError> {
        unimplemented!()
    }
}

fn stalled(address: &str, domain: &str) -> (Arc<AtomicBool>, (String, String, Arc<dyn BuildRepoClient>)) {
    let aborted = Arc::new(AtomicBool::new(false));
    let client = StalledBackend {
        aborted: Arc::clone(&aborted),
    };
    (aborted, (address.to_string(), domain.to_string(), Arc::new(client)))
}

async fn wait_for(flag: &AtomicBool) -> bool {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !flag.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .is_ok()
}

#[tokio::test]
async fn dropping_list_repos_aborts_every_backend_call() {
    let (first, a) = stalled("a:5005", "a.example");
    let (second, b) = stalled("b:5005", "b.example");
    let registry = BackendRegistry::from_backends(vec![a, b]).unwrap();

    let deadline = tokio::time::timeout(Duration::from_millis(50), registry.list_repos()).await;
    assert!(deadline.is_err());
    assert!(wait_for(&first).await);
    assert!(wait_for(&second).await);
}

#[tokio::test]
async fn list_repos_returns_the_first_failure_without_waiting() {
    let bad = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&bad)
        .await;
    let (address, client) = client(&bad);
    let (aborted, hanging) = stalled("c:5005", "c.example");
    let registry =
        BackendRegistry::from_backends(vec![(address, "b.example".into(), client), hanging])
            .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), registry.list_repos())
        .await
        .expect("a failing backend ends the listing");
    assert!(matches!(result, Err(RemoteError::Api { status: 503, .. })));
    assert!(wait_for(&aborted).await);
}
