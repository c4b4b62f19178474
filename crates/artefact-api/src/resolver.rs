//! # Artefact Resolver
//!
//! Maps human-readable `(domain, name)` pairs to durable numeric identities
//! and artefacts to the source-control repositories they are built from.
//!
//! ## Caches
//!
//! | Cache | Key | Default TTL |
//! |-------|-----|-------------|
//! | identities | `(domain, name)` | 4h |
//! | repository of artefact | artefact id | 30m |
//! | artefact of repository | repository id | 30m |
//!
//! Caches and the [`ResolutionLock`] are handed in by the caller, so tests
//! can use short TTLs and observe the lock.
//!
//! ## Find-or-create
//!
//! Identity creation happens under the resolution lock after a second cache
//! check, so two concurrent first resolutions of the same pair create one
//! identity. The store itself enforces no uniqueness.

use std::sync::Arc;
use std::time::Duration;

use artefact_core::{ArtefactId, ArtefactIdentity, NewArtefactIdentity, RepositoryId};
use artefact_remote::gitserver::SourceRepoDirectory;
use artefact_remote::{BackendRegistry, RemoteError};
use artefact_store::{IdentityFilter, IdentityStore, StoreError};

use crate::cache::{ResolvingCache, TtlCache};
use crate::lock::ResolutionLock;

/// Resolver failures.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("missing domain for artefact {name:?}")]
    MissingDomain { name: String },

    #[error("missing artefact name")]
    MissingName,

    /// A required field of a create request was empty.
    #[error("{0} required")]
    MissingField(&'static str),

    /// The domain/URL combination is known to be a cross-tenant mistake.
    #[error("invalid domain/url combination for artefact {name:?} in domain {domain:?}")]
    InvalidCombination { name: String, domain: String },

    #[error("no artefact for repository {0}")]
    NoArtefactForRepository(RepositoryId),

    /// Neither repository metadata nor build metadata named a repository.
    #[error("build-repo information unavailable for artefact {artefact} ({name})")]
    RepositoryUnavailable { artefact: ArtefactId, name: String },

    #[error("multiple artefacts match repository {repository}: {first} and {second}")]
    Ambiguous {
        repository: RepositoryId,
        first: ArtefactId,
        second: ArtefactId,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// A rule rejecting an origin URL for a domain it cannot belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainGuard {
    /// Substring of the origin URL.
    pub url_contains: String,
    /// Substring of the domain that must not be paired with such a URL.
    pub domain_contains: String,
}

impl DomainGuard {
    pub fn new(url_contains: impl Into<String>, domain_contains: impl Into<String>) -> Self {
        Self {
            url_contains: url_contains.into(),
            domain_contains: domain_contains.into(),
        }
    }

    /// True if `(url, domain)` is a combination this guard rejects.
    pub fn rejects(&self, url: &str, domain: &str) -> bool {
        url.contains(&self.url_contains) && domain.contains(&self.domain_contains)
    }

    /// The guard set used when none is configured.
    pub fn defaults() -> Vec<Self> {
        vec![Self::new("git.singingcat.net", "conradwood")]
    }
}

/// The caches a resolver owns.
#[derive(Debug)]
pub struct ResolverCaches {
    pub identities: ResolvingCache<(String, String), ArtefactIdentity>,
    pub repository_of_artefact: TtlCache<ArtefactId, RepositoryId>,
    pub artefact_of_repository: TtlCache<RepositoryId, ArtefactId>,
}

impl ResolverCaches {
    pub fn new(
        identity_ttl: Duration,
        identity_capacity: usize,
        repository_ttl: Duration,
        repository_capacity: usize,
    ) -> Self {
        Self {
            identities: ResolvingCache::new("identities", identity_ttl, identity_capacity),
            repository_of_artefact: TtlCache::new(
                "repository_of_artefact",
                repository_ttl,
                repository_capacity,
            ),
            artefact_of_repository: TtlCache::new(
                "artefact_of_repository",
                repository_ttl,
                repository_capacity,
            ),
        }
    }
}

impl Default for ResolverCaches {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(4 * 60 * 60),
            10_000,
            Duration::from_secs(30 * 60),
            5_000,
        )
    }
}

/// Result of [`ArtefactResolver::create_if_required`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutcome {
    pub created: bool,
    pub identity: ArtefactIdentity,
    /// Best effort; `None` if the backends could not say.
    pub repository: Option<RepositoryId>,
}

/// Resolves artefact identities and repository mappings.
pub struct ArtefactResolver {
    store: Arc<dyn IdentityStore>,
    registry: Arc<BackendRegistry>,
    source_repos: Option<Arc<dyn SourceRepoDirectory>>,
    caches: ResolverCaches,
    lock: ResolutionLock,
    guards: Vec<DomainGuard>,
}

impl std::fmt::Debug for ArtefactResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtefactResolver")
            .field("caches", &self.caches)
            .field("lock", &self.lock.granularity())
            .field("guards", &self.guards)
            .field("source_repos", &self.source_repos.is_some())
            .finish()
    }
}

impl ArtefactResolver {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        registry: Arc<BackendRegistry>,
        source_repos: Option<Arc<dyn SourceRepoDirectory>>,
        caches: ResolverCaches,
        lock: ResolutionLock,
        guards: Vec<DomainGuard>,
    ) -> Self {
        Self {
            store,
            registry,
            source_repos,
            caches,
            lock,
            guards,
        }
    }

    /// Numeric id of `(domain, name)`, creating the identity on first use.
    pub async fn resolve_id(&self, name: &str, domain: &str) -> Result<ArtefactId, ResolveError> {
        Ok(self.resolve(name, domain).await?.id)
    }

    /// The identity of `(domain, name)`, creating it on first use.
    pub async fn resolve(
        &self,
        name: &str,
        domain: &str,
    ) -> Result<ArtefactIdentity, ResolveError> {
        if domain.is_empty() {
            return Err(ResolveError::MissingDomain {
                name: name.to_string(),
            });
        }
        if name.is_empty() {
            return Err(ResolveError::MissingName);
        }
        let key = (domain.to_string(), name.to_string());
        if let Some(identity) = self.caches.identities.get(&key) {
            return Ok(identity);
        }

        let _guard = self.lock.acquire(domain, name).await;
        self.caches
            .identities
            .get_or_resolve(key, || self.find_or_create(name, domain))
            .await
    }

    async fn find_or_create(
        &self,
        name: &str,
        domain: &str,
    ) -> Result<ArtefactIdentity, ResolveError> {
        if let Some(existing) = self.find_existing(name, domain).await? {
            return Ok(existing);
        }
        let identity = self
            .store
            .save(&NewArtefactIdentity::new(domain, name))
            .await?;
        tracing::info!(
            artefact_id = %identity.id,
            artefact = %name,
            domain = %domain,
            "created artefact identity"
        );
        Ok(identity)
    }

    async fn find_existing(
        &self,
        name: &str,
        domain: &str,
    ) -> Result<Option<ArtefactIdentity>, ResolveError> {
        let candidates = self.store.by_name(name).await?;
        Ok(candidates.into_iter().find(|i| i.is(domain, name)))
    }

    /// The identity stored under `id`.
    pub async fn identity(&self, id: ArtefactId) -> Result<ArtefactIdentity, ResolveError> {
        Ok(self.store.by_id(id).await?)
    }

    /// Create the identity for `(domain, name)` if it does not exist yet.
    ///
    /// An existing identity gets its URL replaced when `url` is non-empty and
    /// differs. `org_id` is required but not stored.
    pub async fn create_if_required(
        &self,
        name: &str,
        domain: &str,
        url: &str,
        org_id: &str,
    ) -> Result<CreateOutcome, ResolveError> {
        if name.is_empty() {
            return Err(ResolveError::MissingField("artefact name"));
        }
        if domain.is_empty() {
            return Err(ResolveError::MissingField("build-repo domain"));
        }
        if org_id.is_empty() {
            return Err(ResolveError::MissingField("organisation id"));
        }
        if self.guards.iter().any(|g| g.rejects(url, domain)) {
            tracing::warn!(artefact = %name, domain = %domain, url = %url, "rejected domain/url combination");
            return Err(ResolveError::InvalidCombination {
                name: name.to_string(),
                domain: domain.to_string(),
            });
        }

        let key = (domain.to_string(), name.to_string());
        let (created, identity) = {
            let _guard = self.lock.acquire(domain, name).await;
            match self.find_existing(name, domain).await? {
                Some(mut existing) => {
                    if !url.is_empty() && existing.url.as_deref() != Some(url) {
                        existing.url = Some(url.to_string());
                        self.store.update(&existing).await?;
                        tracing::info!(artefact_id = %existing.id, url = %url, "updated artefact url");
                    }
                    (false, existing)
                }
                None => {
                    let identity = self
                        .store
                        .save(&NewArtefactIdentity::new(domain, name).with_url(url))
                        .await?;
                    tracing::info!(
                        artefact_id = %identity.id,
                        artefact = %name,
                        domain = %domain,
                        "created artefact identity on request"
                    );
                    (true, identity)
                }
            }
        };
        self.caches.identities.put(key, identity.clone());

        let repository = self.repository_best_effort(identity.id).await;
        Ok(CreateOutcome {
            created,
            identity,
            repository,
        })
    }

    /// Identity of `id` plus its repository, if known.
    pub async fn meta(
        &self,
        id: ArtefactId,
    ) -> Result<(ArtefactIdentity, Option<RepositoryId>), ResolveError> {
        let identity = self.identity(id).await?;
        let repository = self.repository_best_effort(id).await;
        Ok((identity, repository))
    }

    async fn repository_best_effort(&self, id: ArtefactId) -> Option<RepositoryId> {
        match self.repository_for_artefact(id).await {
            Ok(repository) => Some(repository),
            Err(e) => {
                tracing::debug!(artefact_id = %id, error = %e, "no repository for artefact");
                None
            }
        }
    }

    /// Source repository artefact `id` is built from.
    ///
    /// Asks the backend for repository metadata first and falls back to the
    /// metadata of the latest build.
    pub async fn repository_for_artefact(
        &self,
        id: ArtefactId,
    ) -> Result<RepositoryId, ResolveError> {
        if let Some(repository) = self.caches.repository_of_artefact.get(&id) {
            return Ok(repository);
        }
        let identity = self.identity(id).await?;

        match self
            .registry
            .repository_meta(&identity.domain, &identity.name)
            .await
        {
            Ok(meta) => {
                if let Some(repository) = meta.repository() {
                    self.caches.repository_of_artefact.put(id, repository);
                    return Ok(repository);
                }
            }
            Err(e) => {
                tracing::debug!(artefact_id = %id, error = %e, "repository metadata unavailable, trying latest build");
            }
        }

        let latest = self
            .registry
            .latest_version(&identity.domain, &identity.name)
            .await?;
        match latest.build_meta.as_ref().and_then(|m| m.repository()) {
            Some(repository) => {
                self.caches.repository_of_artefact.put(id, repository);
                Ok(repository)
            }
            None => Err(ResolveError::RepositoryUnavailable {
                artefact: id,
                name: identity.name,
            }),
        }
    }

    /// Artefact built from source repository `repository`.
    ///
    /// Tries the identities' stored URLs first. If that yields nothing, scans
    /// the latest build of every listed repository for a matching repository
    /// id; the first match in listing order wins.
    pub async fn artefact_for_repository(
        &self,
        repository: RepositoryId,
    ) -> Result<ArtefactId, ResolveError> {
        if let Some(id) = self.caches.artefact_of_repository.get(&repository) {
            return Ok(id);
        }

        match self.artefact_by_url(repository).await {
            Ok(Some(id)) => {
                self.caches.artefact_of_repository.put(repository, id);
                return Ok(id);
            }
            Ok(None) => {}
            Err(e @ ResolveError::Ambiguous { .. }) => return Err(e),
            Err(e) => {
                tracing::debug!(repository = %repository, error = %e, "url lookup failed, scanning builds");
            }
        }

        for entry in self.registry.list_repos().await? {
            let latest = self
                .registry
                .latest_version(&entry.domain, &entry.name)
                .await?;
            if latest.build_meta.as_ref().and_then(|m| m.repository()) == Some(repository) {
                let id = self.resolve_id(&entry.name, &entry.domain).await?;
                self.caches.artefact_of_repository.put(repository, id);
                return Ok(id);
            }
        }
        Err(ResolveError::NoArtefactForRepository(repository))
    }

    async fn artefact_by_url(
        &self,
        repository: RepositoryId,
    ) -> Result<Option<ArtefactId>, ResolveError> {
        let Some(directory) = &self.source_repos else {
            return Ok(None);
        };
        let source = directory.repo_by_id(repository).await?;

        let mut found: Option<ArtefactId> = None;
        for url in &source.urls {
            let candidates = self
                .store
                .find(&IdentityFilter::url(url.to_clone_url()))
                .await?;
            for candidate in candidates {
                if format!("git.{}", candidate.domain) != url.host {
                    continue;
                }
                match found {
                    Some(first) if first != candidate.id => {
                        return Err(ResolveError::Ambiguous {
                            repository,
                            first,
                            second: candidate.id,
                        });
                    }
                    _ => found = Some(candidate.id),
                }
            }
        }
        Ok(found)
    }
}
