//! In-memory collaborators for artefact-api tests: a build-repo backend, an
//! authorization oracle and a source-control directory, each counting the
//! calls made to it.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use artefact_api::config::ServiceConfig;
use artefact_api::state::AppState;
use artefact_core::path;
use artefact_remote::buildrepo::BuildRepoClient;
use artefact_remote::gitserver::{SourceRepo, SourceRepoDirectory, SourceRepoUrl};
use artefact_remote::objectauth::{AuthorizationOracle, ObjectType, Permissions};
use artefact_remote::types::{
    BackendRepoEntry, BuildMeta, EntryType, FileEntry, FileMeta, FileRequest, LatestVersion,
    ListFilesRequest, ManagerInfo, RepositoryMeta, VersionRequest,
};
use artefact_remote::{BackendRegistry, RemoteClients, RemoteError};
use artefact_store::{IdentityStore, MemoryIdentityStore};
use artefact_core::RepositoryId;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub const DOMAIN: &str = "a.example";
pub const OTHER_DOMAIN: &str = "b.example";

fn not_found(endpoint: &str) -> RemoteError {
    RemoteError::Api {
        endpoint: endpoint.to_string(),
        status: 404,
        body: "no such thing".to_string(),
    }
}

/// Sets its flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

// ── Build-repo backend ──────────────────────────────────────────────────────

/// A backend holding a few repositories and their builds in memory.
#[derive(Default)]
pub struct FakeBackend {
    pub domain: String,
    repos: Mutex<Vec<BackendRepoEntry>>,
    /// Every entry of a build, keyed by (repository, build).
    entries: Mutex<HashMap<(String, u64), Vec<FileEntry>>>,
    /// File content, keyed by (repository, build, relative path).
    contents: Mutex<HashMap<(String, u64, String), Vec<u8>>>,
    latest: Mutex<HashMap<String, LatestVersion>>,
    versions: Mutex<HashMap<String, Vec<String>>>,
    repository_meta: Mutex<HashMap<String, u64>>,
    failing_latest: Mutex<HashSet<String>>,
    /// Latest-build calls that never answer; the flag is set when one is dropped.
    stalled_latest: Mutex<HashMap<String, Arc<AtomicBool>>>,
    /// Bytes written before a stream breaks, if streams should break.
    break_streams_after: Mutex<Option<usize>>,
    pub list_repos_calls: AtomicUsize,
    pub latest_calls: AtomicUsize,
    pub list_files_calls: AtomicUsize,
    pub repository_meta_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            ..Self::default()
        }
    }

    /// List `name` under this backend's domain.
    pub fn repo(self, name: &str) -> Self {
        let domain = self.domain.clone();
        self.repo_in(name, &domain)
    }

    /// List `name` with an explicit (possibly empty) domain.
    pub fn repo_in(self, name: &str, domain: &str) -> Self {
        self.repos.lock().push(BackendRepoEntry {
            name: name.to_string(),
            domain: domain.to_string(),
        });
        self
    }

    /// Make `build` the latest build of `name`, with optional build metadata.
    pub fn latest(self, name: &str, build: u64, repository_id: Option<u64>) -> Self {
        self.latest.lock().insert(
            name.to_string(),
            LatestVersion {
                build_id: build,
                build_meta: repository_id.map(|id| BuildMeta {
                    repository_id: id,
                    commit_id: "abc123".to_string(),
                }),
            },
        );
        self
    }

    pub fn latest_fails(self, name: &str) -> Self {
        self.failing_latest.lock().insert(name.to_string());
        self
    }

    /// Never answer latest-build calls for `name`. `aborted` is set once a
    /// pending call is dropped.
    pub fn latest_stalls(self, name: &str, aborted: Arc<AtomicBool>) -> Self {
        self.stalled_latest.lock().insert(name.to_string(), aborted);
        self
    }

    pub fn versions(self, name: &str, builds: &[&str]) -> Self {
        self.versions.lock().insert(
            name.to_string(),
            builds.iter().map(|b| b.to_string()).collect(),
        );
        self
    }

    pub fn repository_meta(self, name: &str, repository_id: u64) -> Self {
        self.repository_meta
            .lock()
            .insert(name.to_string(), repository_id);
        self
    }

    /// Add a directory at absolute path `dir_path` to a build.
    pub fn dir(self, name: &str, build: u64, dir_path: &str) -> Self {
        self.entry(name, build, dir_path, EntryType::Directory)
    }

    /// Add a file at absolute path `file_path` with `content` to a build.
    pub fn file(self, name: &str, build: u64, file_path: &str, content: &[u8]) -> Self {
        self.contents.lock().insert(
            (name.to_string(), build, path::relative(file_path)),
            content.to_vec(),
        );
        self.entry(name, build, file_path, EntryType::File)
    }

    /// Add an entry of a type the catalog does not know.
    pub fn special(self, name: &str, build: u64, entry_path: &str) -> Self {
        self.entry(name, build, entry_path, EntryType::Other(9))
    }

    pub fn break_streams_after(self, bytes: usize) -> Self {
        *self.break_streams_after.lock() = Some(bytes);
        self
    }

    fn entry(self, name: &str, build: u64, entry_path: &str, entry_type: EntryType) -> Self {
        let normalized = path::normalize_dir(entry_path);
        let (parent, base) = normalized
            .rsplit_once('/')
            .map(|(p, b)| (p.to_string(), b.to_string()))
            .unwrap_or_default();
        self.entries
            .lock()
            .entry((name.to_string(), build))
            .or_default()
            .push(FileEntry {
                name: base,
                // Backends report parents without the leading slash.
                dir: parent.trim_start_matches('/').to_string(),
                entry_type,
            });
        self
    }

    fn dir_exists(&self, entries: &[FileEntry], dir: &str) -> bool {
        dir == "/"
            || entries.iter().any(|e| {
                e.entry_type == EntryType::Directory && path::join(&e.dir, &e.name) == dir
            })
    }
}

#[async_trait]
impl BuildRepoClient for FakeBackend {
    async fn manager_info(&self) -> Result<ManagerInfo, RemoteError> {
        Ok(ManagerInfo {
            domain: self.domain.clone(),
        })
    }

    async fn list_repos(&self) -> Result<Vec<BackendRepoEntry>, RemoteError> {
        self.list_repos_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.repos.lock().clone())
    }

    async fn list_files(&self, req: &ListFilesRequest) -> Result<Vec<FileEntry>, RemoteError> {
        self.list_files_calls.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.lock();
        let build = entries
            .get(&(req.repository.clone(), req.version))
            .ok_or_else(|| not_found("POST files/list"))?;
        let dir = path::normalize_dir(&req.dir);
        if !self.dir_exists(build, &dir) {
            return Err(not_found("POST files/list"));
        }
        if req.recursive {
            return Ok(build.clone());
        }
        // Include one nested entry to prove callers filter to direct children.
        Ok(build
            .iter()
            .filter(|e| path::is_direct_child(&dir, &e.dir) || path::normalize_dir(&e.dir).starts_with(&dir))
            .cloned()
            .collect())
    }

    async fn get_file(
        &self,
        req: &FileRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, RemoteError> {
        let content = self
            .contents
            .lock()
            .get(&(req.repository.clone(), req.version, req.filename.clone()))
            .cloned()
            .ok_or_else(|| not_found("POST files/stream"))?;
        let limit = *self.break_streams_after.lock();
        let cut = limit.map_or(content.len(), |l| l.min(content.len()));
        let block = req.blocksize.unwrap_or(1024).max(1) as usize;
        for chunk in content[..cut].chunks(block) {
            sink.write_all(chunk).await.map_err(|source| RemoteError::Sink {
                file: req.filename.clone(),
                source,
            })?;
        }
        if limit.is_some() {
            return Err(RemoteError::Api {
                endpoint: "POST files/stream".into(),
                status: 500,
                body: "stream broke".into(),
            });
        }
        Ok(cut as u64)
    }

    async fn file_meta(&self, req: &FileRequest) -> Result<FileMeta, RemoteError> {
        self.contents
            .lock()
            .get(&(req.repository.clone(), req.version, req.filename.clone()))
            .map(|c| FileMeta {
                size: c.len() as u64,
            })
            .ok_or_else(|| not_found("POST files/meta"))
    }

    async fn file_exists(&self, req: &FileRequest) -> Result<bool, RemoteError> {
        Ok(self.contents.lock().contains_key(&(
            req.repository.clone(),
            req.version,
            req.filename.clone(),
        )))
    }

    async fn latest_version(&self, req: &VersionRequest) -> Result<LatestVersion, RemoteError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        let stalled = self.stalled_latest.lock().get(&req.repository).cloned();
        if let Some(aborted) = stalled {
            let _flag = DropFlag(aborted);
            return std::future::pending().await;
        }
        if self.failing_latest.lock().contains(&req.repository) {
            return Err(RemoteError::Api {
                endpoint: "POST versions/latest".into(),
                status: 500,
                body: "backend broke".into(),
            });
        }
        self.latest
            .lock()
            .get(&req.repository)
            .cloned()
            .ok_or_else(|| not_found("POST versions/latest"))
    }

    async fn list_versions(&self, req: &VersionRequest) -> Result<Vec<String>, RemoteError> {
        self.versions
            .lock()
            .get(&req.repository)
            .cloned()
            .ok_or_else(|| not_found("POST versions/list"))
    }

    async fn repository_meta(&self, path: &str) -> Result<RepositoryMeta, RemoteError> {
        self.repository_meta_calls.fetch_add(1, Ordering::SeqCst);
        self.repository_meta
            .lock()
            .get(path)
            .map(|&repository_id| RepositoryMeta { repository_id })
            .ok_or_else(|| not_found("POST repository/meta"))
    }
}

// ── Authorization oracle ────────────────────────────────────────────────────

/// Grants read access to listed (user, artefact id) pairs only.
#[derive(Default)]
pub struct FakeOracle {
    grants: Mutex<HashSet<(String, u64)>>,
    blanket_services: Mutex<HashSet<String>>,
    unavailable: Mutex<bool>,
    pub object_calls: AtomicUsize,
    pub service_calls: AtomicUsize,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, user: &str, artefact_id: u64) {
        self.grants.lock().insert((user.to_string(), artefact_id));
    }

    pub fn revoke(&self, user: &str, artefact_id: u64) {
        self.grants.lock().remove(&(user.to_string(), artefact_id));
    }

    pub fn grant_service(&self, service: &str) {
        self.blanket_services.lock().insert(service.to_string());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    pub fn calls(&self) -> usize {
        self.object_calls.load(Ordering::SeqCst) + self.service_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self, endpoint: &str) -> Result<(), RemoteError> {
        if *self.unavailable.lock() {
            return Err(RemoteError::Api {
                endpoint: endpoint.to_string(),
                status: 503,
                body: String::new(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AuthorizationOracle for FakeOracle {
    async fn ask_object_access(
        &self,
        user_id: &str,
        _object_type: ObjectType,
        object_id: u64,
    ) -> Result<Permissions, RemoteError> {
        self.object_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available("POST objectauth/v1/access")?;
        let granted = self
            .grants
            .lock()
            .contains(&(user_id.to_string(), object_id));
        Ok(Permissions {
            view: granted,
            read: granted,
            ..Permissions::default()
        })
    }

    async fn allow_all_service_access(
        &self,
        service_id: &str,
        _object_type: ObjectType,
    ) -> Result<bool, RemoteError> {
        self.service_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available("POST objectauth/v1/service-access")?;
        Ok(self.blanket_services.lock().contains(service_id))
    }
}

// ── Source-control directory ────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSourceRepos {
    repos: Mutex<HashMap<u64, SourceRepo>>,
    pub calls: AtomicUsize,
}

impl FakeSourceRepos {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register repository `id`, cloneable from `https://{host}/git/{path}`.
    pub fn add(&self, id: u64, host: &str, path: &str) {
        self.repos
            .lock()
            .entry(id)
            .or_insert_with(|| SourceRepo {
                id,
                urls: Vec::new(),
            })
            .urls
            .push(SourceRepoUrl {
                host: host.to_string(),
                path: path.to_string(),
            });
    }
}

#[async_trait]
impl SourceRepoDirectory for FakeSourceRepos {
    async fn repo_by_id(&self, id: RepositoryId) -> Result<SourceRepo, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.repos
            .lock()
            .get(&id.get())
            .cloned()
            .ok_or_else(|| not_found("GET gitserver/v1/repos"))
    }
}

// ── Wiring ──────────────────────────────────────────────────────────────────

/// Everything a test may want to poke at after building state.
pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryIdentityStore>,
    pub oracle: Arc<FakeOracle>,
    pub source_repos: Arc<FakeSourceRepos>,
    pub backends: Vec<Arc<FakeBackend>>,
}

impl Harness {
    pub fn new(backends: Vec<FakeBackend>) -> Self {
        Self::with_config(backends, ServiceConfig::default())
    }

    pub fn with_config(backends: Vec<FakeBackend>, config: ServiceConfig) -> Self {
        let backends: Vec<Arc<FakeBackend>> = backends.into_iter().map(Arc::new).collect();
        let registry = BackendRegistry::from_backends(
            backends
                .iter()
                .enumerate()
                .map(|(i, b)| {
                    (
                        format!("buildrepo-{i}.internal:5005"),
                        b.domain.clone(),
                        Arc::clone(b) as Arc<dyn BuildRepoClient>,
                    )
                })
                .collect(),
        )
        .expect("at least one backend");

        let oracle = Arc::new(FakeOracle::new());
        let source_repos = Arc::new(FakeSourceRepos::new());
        let store = Arc::new(MemoryIdentityStore::new());
        let remote = RemoteClients::from_parts(
            Arc::new(registry),
            Arc::clone(&oracle) as Arc<dyn AuthorizationOracle>,
            Some(Arc::clone(&source_repos) as Arc<dyn SourceRepoDirectory>),
        );
        let state = AppState::new(
            config,
            remote,
            Arc::clone(&store) as Arc<dyn IdentityStore>,
        );

        Self {
            state,
            store,
            oracle,
            source_repos,
            backends,
        }
    }

    pub fn backend(&self, index: usize) -> &FakeBackend {
        &self.backends[index]
    }
}

/// The standard catalog: `firmware` with two builds and a small tree,
/// `bootloader` without build metadata, both on [`DOMAIN`].
pub fn catalog_backend() -> FakeBackend {
    FakeBackend::new(DOMAIN)
        .repo("firmware")
        .repo("bootloader")
        .latest("firmware", 42, Some(7))
        .versions("firmware", &["41", "42", "latest"])
        .dir("firmware", 42, "/dist")
        .dir("firmware", 42, "/dist/debug")
        .file("firmware", 42, "/README.md", b"read me")
        .file("firmware", 42, "/dist/image.bin", b"\x7fELF-image-bytes")
        .file("firmware", 42, "/dist/debug/symbols.map", b"symbols")
        .special("firmware", 42, "/current")
        .file("firmware", 41, "/README.md", b"old")
        .latest("bootloader", 3, None)
        .file("bootloader", 3, "/boot.img", b"boot")
}
