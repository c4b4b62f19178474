//! Remote collaborator configuration.
//!
//! The backend table is fixed per deployment: a list of hosts, each serving
//! exactly one domain, all listening on the same port. Override via
//! environment variables or explicit construction for testing.

use url::Url;
use zeroize::Zeroizing;

/// Backends used when `BUILDREPOS` is not set, as `(domain, host)`.
pub const DEFAULT_BUILDREPOS: &[(&str, &str)] = &[
    ("conradwood.net", "buildrepo.vpn.conrad.localdomain"),
    ("singingcat.net", "scbuildrepo.singingcat.localdomain"),
];

/// Port every build-repo backend listens on unless overridden.
pub const DEFAULT_BUILDREPO_PORT: u16 = 5005;

/// One configured build-repo backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRepoTarget {
    /// Domain the operator expects this backend to serve. The backend's
    /// own manager info is authoritative; a mismatch is only logged.
    pub expected_domain: Option<String>,
    /// Host name or address.
    pub host: String,
}

impl BuildRepoTarget {
    /// Base URL of the backend for a given port.
    pub fn base_url(&self, port: u16) -> Result<Url, ConfigError> {
        Url::parse(&format!("http://{}:{port}/", self.host))
            .map_err(|e| ConfigError::InvalidUrl(self.host.clone(), e.to_string()))
    }
}

/// Configuration for connecting to backends, the authorization oracle and
/// the source-control directory.
///
/// Custom `Debug` implementation redacts the `service_token` field.
#[derive(Clone)]
pub struct RemoteConfig {
    /// Build-repo backends.
    pub buildrepos: Vec<BuildRepoTarget>,
    /// Port shared by all backends.
    pub buildrepo_port: u16,
    /// Base URL of the authorization oracle.
    pub objectauth_url: Url,
    /// Base URL of the source-control directory. `None` disables the
    /// repository-URL shortcut in the resolver.
    pub gitserver_url: Option<Url>,
    /// Bearer token presented to remote services, if they require one.
    pub service_token: Option<Zeroizing<String>>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("buildrepos", &self.buildrepos)
            .field("buildrepo_port", &self.buildrepo_port)
            .field("objectauth_url", &self.objectauth_url)
            .field("gitserver_url", &self.gitserver_url)
            .field(
                "service_token",
                &self.service_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl RemoteConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `BUILDREPOS` (comma list of `domain:host` or `host`; default: [`DEFAULT_BUILDREPOS`])
    /// - `BUILDREPO_PORT` (default: 5005)
    /// - `OBJECTAUTH_URL` (required)
    /// - `GITSERVER_URL` (optional)
    /// - `REMOTE_SERVICE_TOKEN` (optional)
    /// - `REMOTE_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let buildrepos = match std::env::var("BUILDREPOS") {
            Ok(raw) => parse_buildrepos(&raw)?,
            Err(_) => default_buildrepos(),
        };
        let buildrepo_port = match std::env::var("BUILDREPO_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidPort(raw.clone()))?,
            Err(_) => DEFAULT_BUILDREPO_PORT,
        };
        let objectauth_url = std::env::var("OBJECTAUTH_URL")
            .map_err(|_| ConfigError::MissingOracleUrl)
            .and_then(|raw| parse_url("OBJECTAUTH_URL", &raw))?;
        let gitserver_url = std::env::var("GITSERVER_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|raw| parse_url("GITSERVER_URL", &raw))
            .transpose()?;

        Ok(Self {
            buildrepos,
            buildrepo_port,
            objectauth_url,
            gitserver_url,
            service_token: std::env::var("REMOTE_SERVICE_TOKEN")
                .ok()
                .filter(|s| !s.is_empty())
                .map(Zeroizing::new),
            timeout_secs: std::env::var("REMOTE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        })
    }

    /// Configuration pointing at local mock servers (for testing).
    pub fn local_mock(objectauth_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            buildrepos: Vec::new(),
            buildrepo_port: DEFAULT_BUILDREPO_PORT,
            objectauth_url: parse_url("objectauth", objectauth_url)?,
            gitserver_url: None,
            service_token: None,
            timeout_secs: 5,
        })
    }
}

/// The built-in backend table.
pub fn default_buildrepos() -> Vec<BuildRepoTarget> {
    DEFAULT_BUILDREPOS
        .iter()
        .map(|(domain, host)| BuildRepoTarget {
            expected_domain: Some((*domain).to_string()),
            host: (*host).to_string(),
        })
        .collect()
}

/// Parse a `BUILDREPOS` value: `domain:host` or bare `host`, comma separated.
pub fn parse_buildrepos(raw: &str) -> Result<Vec<BuildRepoTarget>, ConfigError> {
    let mut targets = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let target = match entry.split_once(':') {
            Some((domain, host)) => {
                let (domain, host) = (domain.trim(), host.trim());
                if domain.is_empty() || host.is_empty() {
                    return Err(ConfigError::InvalidBackend(entry.to_string()));
                }
                BuildRepoTarget {
                    expected_domain: Some(domain.to_string()),
                    host: host.to_string(),
                }
            }
            None => BuildRepoTarget {
                expected_domain: None,
                host: entry.to_string(),
            },
        };
        targets.push(target);
    }
    if targets.is_empty() {
        return Err(ConfigError::NoBackends);
    }
    Ok(targets)
}

fn parse_url(var: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("OBJECTAUTH_URL environment variable is required")]
    MissingOracleUrl,
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid BUILDREPOS entry: {0:?}")]
    InvalidBackend(String),
    #[error("invalid BUILDREPO_PORT: {0:?}")]
    InvalidPort(String),
    #[error("REMOTE_SERVICE_TOKEN is not a valid header value")]
    InvalidToken,
    #[error("no build-repo backends configured")]
    NoBackends,
}
