//! # artefact-remote -- Typed clients for the catalog's remote collaborators
//!
//! - **Build-repo backends** via [`BackendRegistry`], which owns one
//!   [`buildrepo::BuildRepoClient`] per backend and routes by domain.
//! - **Authorization oracle** via [`objectauth::AuthorizationOracle`].
//! - **Source-control directory** via [`gitserver::SourceRepoDirectory`],
//!   optional.
//!
//! Each collaborator is a trait with an HTTP implementation, so the service
//! can be tested against in-memory fakes. No call is ever retried.

pub mod buildrepo;
pub mod config;
pub mod error;
pub mod gitserver;
mod http;
pub mod objectauth;
pub mod registry;
pub mod types;

pub use config::{BuildRepoTarget, ConfigError, RemoteConfig};
pub use error::RemoteError;
pub use registry::{BackendDescriptor, BackendRegistry, RepoEntry};

use std::sync::Arc;

/// Every remote collaborator, connected.
#[derive(Clone)]
pub struct RemoteClients {
    registry: Arc<BackendRegistry>,
    oracle: Arc<dyn objectauth::AuthorizationOracle>,
    source_repos: Option<Arc<dyn gitserver::SourceRepoDirectory>>,
}

impl std::fmt::Debug for RemoteClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClients")
            .field("registry", &self.registry)
            .field("source_repos", &self.source_repos.is_some())
            .finish()
    }
}

impl RemoteClients {
    /// Connect to every collaborator described by `config`.
    ///
    /// Fails if any build-repo backend cannot be reached.
    pub async fn connect(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let http = http::build_client(
            config.timeout_secs,
            config.service_token.as_ref().map(|t| t.as_str()),
        )?;

        let registry = BackendRegistry::connect(config, http.clone()).await?;
        let oracle =
            objectauth::HttpObjectAuthClient::new(http.clone(), config.objectauth_url.clone());
        let source_repos = config.gitserver_url.clone().map(|url| {
            Arc::new(gitserver::HttpGitServerClient::new(http.clone(), url))
                as Arc<dyn gitserver::SourceRepoDirectory>
        });

        Ok(Self {
            registry: Arc::new(registry),
            oracle: Arc::new(oracle),
            source_repos,
        })
    }

    /// Assemble from already-built parts (fakes in tests).
    pub fn from_parts(
        registry: Arc<BackendRegistry>,
        oracle: Arc<dyn objectauth::AuthorizationOracle>,
        source_repos: Option<Arc<dyn gitserver::SourceRepoDirectory>>,
    ) -> Self {
        Self {
            registry,
            oracle,
            source_repos,
        }
    }

    /// The backend registry.
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// The authorization oracle.
    pub fn oracle(&self) -> &Arc<dyn objectauth::AuthorizationOracle> {
        &self.oracle
    }

    /// The source-control directory, if configured.
    pub fn source_repos(&self) -> Option<&Arc<dyn gitserver::SourceRepoDirectory>> {
        self.source_repos.as_ref()
    }
}

/// Build an HTTP client with the shared timeout and token settings, for
/// callers that construct individual clients themselves.
pub fn http_client(config: &RemoteConfig) -> Result<reqwest::Client, RemoteError> {
    http::build_client(
        config.timeout_secs,
        config.service_token.as_ref().map(|t| t.as_str()),
    )
}
