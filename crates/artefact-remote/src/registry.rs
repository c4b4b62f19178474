//! # Backend Registry
//!
//! Owns one client per configured build-repo backend and the immutable
//! domain→backend routing table, discovered once at startup by asking each
//! backend which domain it serves. A backend added later is invisible until
//! restart.
//!
//! Per-artefact calls take an explicit domain and go to exactly one backend.
//! [`BackendRegistry::list_repos`] is the only federated call: it fans out to
//! every backend concurrently and fails as a whole if any backend fails.

use std::collections::HashMap;
use std::sync::Arc;

use artefact_core::{BackendId, Reference};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::AsyncWrite;
use tokio::task::JoinSet;

use crate::buildrepo::{BuildRepoClient, HttpBuildRepoClient};
use crate::config::{ConfigError, RemoteConfig};
use crate::error::RemoteError;
use crate::types::{
    FileEntry, FileMeta, FileRequest, LatestVersion, ListFilesRequest, RepositoryMeta,
    VersionRequest,
};

/// A connected backend as discovered at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    /// Address the backend was reached at. Operator-facing only.
    pub address: String,
    /// Domain the backend reported serving.
    pub served_domain: String,
    /// Opaque id derived from the address, safe to embed in tokens.
    pub id: BackendId,
}

/// One repository from the federated listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoEntry {
    pub name: String,
    /// Never empty: filled from the owning backend when the backend omits it.
    pub domain: String,
    pub origin: BackendId,
}

struct Backend {
    descriptor: BackendDescriptor,
    client: Arc<dyn BuildRepoClient>,
}

/// Immutable set of backends plus the domain routing table.
pub struct BackendRegistry {
    backends: Vec<Backend>,
    by_domain: HashMap<String, usize>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field(
                "backends",
                &self.backends.iter().map(|b| &b.descriptor).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl BackendRegistry {
    /// Connect to every configured backend over HTTP.
    ///
    /// Any backend that cannot be reached or will not report its domain is
    /// fatal: the registry is never built from a partial set.
    pub async fn connect(
        config: &RemoteConfig,
        http: reqwest::Client,
    ) -> Result<Self, RemoteError> {
        let mut clients: Vec<(String, Arc<dyn BuildRepoClient>)> = Vec::new();
        for target in &config.buildrepos {
            let base_url = target.base_url(config.buildrepo_port)?;
            let address = format!("{}:{}", target.host, config.buildrepo_port);
            let client = HttpBuildRepoClient::new(http.clone(), base_url);
            clients.push((address, Arc::new(client)));
        }
        let registry = Self::discover(clients).await?;

        for target in &config.buildrepos {
            let (Some(expected), Some(actual)) = (
                target.expected_domain.as_deref(),
                registry.domain_of_host(&target.host),
            ) else {
                continue;
            };
            if expected != actual {
                tracing::warn!(
                    host = %target.host,
                    expected,
                    actual,
                    "backend serves a different domain than configured"
                );
            }
        }
        Ok(registry)
    }

    /// Build a registry from ready clients, asking each for its domain.
    pub async fn discover(
        clients: Vec<(String, Arc<dyn BuildRepoClient>)>,
    ) -> Result<Self, RemoteError> {
        let mut discovered = Vec::with_capacity(clients.len());
        for (address, client) in clients {
            let info = client.manager_info().await.map_err(|e| {
                tracing::error!(backend = %address, error = %e, "backend unreachable at startup");
                e
            })?;
            tracing::info!(backend = %address, domain = %info.domain, "connected to backend");
            discovered.push((address, info.domain, client));
        }
        Self::from_backends(discovered)
    }

    /// Build a registry from backends whose domains are already known.
    pub fn from_backends(
        backends: Vec<(String, String, Arc<dyn BuildRepoClient>)>,
    ) -> Result<Self, RemoteError> {
        if backends.is_empty() {
            return Err(ConfigError::NoBackends.into());
        }
        let mut registry = Self {
            backends: Vec::with_capacity(backends.len()),
            by_domain: HashMap::new(),
        };
        for (address, served_domain, client) in backends {
            let index = registry.backends.len();
            if served_domain.is_empty() {
                tracing::warn!(backend = %address, "backend reports no domain; it will not be routed to");
            } else if let Some(&existing) = registry.by_domain.get(&served_domain) {
                tracing::warn!(
                    domain = %served_domain,
                    backend = %address,
                    kept = %registry.backends[existing].descriptor.address,
                    "domain served by more than one backend; keeping the first"
                );
            } else {
                registry.by_domain.insert(served_domain.clone(), index);
            }
            registry.backends.push(Backend {
                descriptor: BackendDescriptor {
                    id: BackendId::for_address(&address),
                    address,
                    served_domain,
                },
                client,
            });
        }
        Ok(registry)
    }

    /// All connected backends, in configuration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.backends.iter().map(|b| &b.descriptor)
    }

    /// Opaque id of the backend serving `domain`.
    pub fn backend_id_for_domain(&self, domain: &str) -> Option<&BackendId> {
        self.by_domain
            .get(domain)
            .map(|&i| &self.backends[i].descriptor.id)
    }

    fn domain_of_host(&self, host: &str) -> Option<&str> {
        self.backends
            .iter()
            .find(|b| b.descriptor.address.split(':').next() == Some(host))
            .map(|b| b.descriptor.served_domain.as_str())
    }

    fn route(&self, domain: &str, artefact: &str) -> Result<&dyn BuildRepoClient, RemoteError> {
        if domain.is_empty() {
            return Err(RemoteError::MissingDomain {
                artefact: artefact.to_string(),
            });
        }
        self.by_domain
            .get(domain)
            .map(|&i| self.backends[i].client.as_ref())
            .ok_or_else(|| RemoteError::NoBackend {
                domain: domain.to_string(),
                artefact: artefact.to_string(),
            })
    }

    /// List repositories on every backend concurrently.
    ///
    /// Entries are tagged with their origin backend, entries without a
    /// domain get the backend's domain, and the merged list is sorted by
    /// (name, domain). The first backend failure is returned at once: the
    /// remaining calls are aborted and whatever was merged is dropped.
    /// Dropping the returned future aborts every outstanding call too.
    pub async fn list_repos(&self) -> Result<Vec<RepoEntry>, RemoteError> {
        let merged: Arc<Mutex<Vec<RepoEntry>>> = Arc::new(Mutex::new(Vec::new()));

        let mut tasks = JoinSet::new();
        for backend in &self.backends {
            let client = Arc::clone(&backend.client);
            let descriptor = backend.descriptor.clone();
            let merged = Arc::clone(&merged);
            tasks.spawn(async move {
                let entries = client.list_repos().await.inspect_err(|e| {
                    tracing::warn!(backend = %descriptor.address, error = %e, "listing repos failed");
                })?;
                let mut merged = merged.lock();
                for entry in entries {
                    let domain = if entry.domain.is_empty() {
                        tracing::warn!(
                            artefact = %entry.name,
                            backend = %descriptor.address,
                            default_domain = %descriptor.served_domain,
                            "backend listed artefact without domain"
                        );
                        descriptor.served_domain.clone()
                    } else {
                        entry.domain
                    };
                    merged.push(RepoEntry {
                        name: entry.name,
                        domain,
                        origin: descriptor.id.clone(),
                    });
                }
                Ok::<(), RemoteError>(())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => {
                    return Err(RemoteError::Task {
                        endpoint: "GET repos".into(),
                        reason: e.to_string(),
                    })
                }
            }
        }

        let mut entries = std::mem::take(&mut *merged.lock());
        entries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.domain.cmp(&b.domain)));
        Ok(entries)
    }

    pub async fn list_files(
        &self,
        domain: &str,
        req: &ListFilesRequest,
    ) -> Result<Vec<FileEntry>, RemoteError> {
        self.route(domain, &req.repository)?.list_files(req).await
    }

    /// Stream a file into `sink`. A mid-stream error aborts the copy and is
    /// returned as is; the sink may have received a prefix of the file.
    pub async fn get_file(
        &self,
        domain: &str,
        req: &FileRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, RemoteError> {
        self.route(domain, &req.repository)?.get_file(req, sink).await
    }

    pub async fn file_meta(&self, domain: &str, req: &FileRequest) -> Result<FileMeta, RemoteError> {
        self.route(domain, &req.repository)?.file_meta(req).await
    }

    pub async fn file_exists(&self, domain: &str, req: &FileRequest) -> Result<bool, RemoteError> {
        self.route(domain, &req.repository)?.file_exists(req).await
    }

    pub async fn latest_version(
        &self,
        domain: &str,
        repository: &str,
    ) -> Result<LatestVersion, RemoteError> {
        self.route(domain, repository)?
            .latest_version(&VersionRequest::new(repository))
            .await
    }

    pub async fn list_versions(
        &self,
        domain: &str,
        repository: &str,
    ) -> Result<Vec<String>, RemoteError> {
        self.route(domain, repository)?
            .list_versions(&VersionRequest::new(repository))
            .await
    }

    pub async fn repository_meta(
        &self,
        domain: &str,
        repository: &str,
    ) -> Result<RepositoryMeta, RemoteError> {
        self.route(domain, repository)?
            .repository_meta(repository)
            .await
    }

    /// Concrete build number a reference points at. Version 0 is asked of
    /// the backend on every call; nothing is cached.
    pub async fn resolve_version(&self, reference: &Reference) -> Result<u64, RemoteError> {
        self.resolve_version_of(reference.domain(), reference.artefact_name(), reference.version())
            .await
    }

    /// [`BackendRegistry::resolve_version`] for a bare (domain, repository, version).
    pub async fn resolve_version_of(
        &self,
        domain: &str,
        repository: &str,
        version: u64,
    ) -> Result<u64, RemoteError> {
        if version != artefact_core::LATEST_VERSION {
            return Ok(version);
        }
        Ok(self.latest_version(domain, repository).await?.build_id)
    }
}
