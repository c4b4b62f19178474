//! Service configuration.
//!
//! Everything the catalog needs besides remote endpoints (those live in
//! [`artefact_remote::RemoteConfig`]): listen port, proxy secret, identity
//! store location, access policy, resolution lock granularity, cache TTLs
//! and the domain/URL guards applied on create.

use std::time::Duration;

use zeroize::Zeroizing;

use crate::access::AccessPolicy;
use crate::auth::SecretToken;
use crate::lock::LockGranularity;
use crate::resolver::DomainGuard;

/// TTLs and capacities of every cache in the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub identity_ttl: Duration,
    pub identity_capacity: usize,
    pub repository_ttl: Duration,
    pub repository_capacity: usize,
    pub permission_ttl: Duration,
    pub permission_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            identity_ttl: Duration::from_secs(14_400),
            identity_capacity: 10_000,
            repository_ttl: Duration::from_secs(1_800),
            repository_capacity: 5_000,
            permission_ttl: Duration::from_secs(120),
            permission_capacity: 1_000,
        }
    }
}

/// Top-level service configuration.
///
/// Custom `Debug` redacts the proxy token and the database URL.
#[derive(Clone)]
pub struct ServiceConfig {
    pub port: u16,
    /// Shared secret the fronting proxy presents. `None` disables the check.
    pub auth_token: Option<SecretToken>,
    /// PostgreSQL URL. `None` selects the in-memory identity store.
    pub database_url: Option<Zeroizing<String>>,
    pub access: AccessPolicy,
    pub lock: LockGranularity,
    pub caches: CacheSettings,
    pub domain_guards: Vec<DomainGuard>,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("access", &self.access)
            .field("lock", &self.lock)
            .field("caches", &self.caches)
            .field("domain_guards", &self.domain_guards)
            .finish()
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            database_url: None,
            access: AccessPolicy::default(),
            lock: LockGranularity::default(),
            caches: CacheSettings::default(),
            domain_guards: DomainGuard::defaults(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `PORT` (default: 8080)
    /// - `AUTH_TOKEN` (optional)
    /// - `DATABASE_URL` (optional; in-memory store when unset)
    /// - `ALWAYS_ALLOW_ROOT` (default: true)
    /// - `PRIVILEGED_SERVICES`, `TRUSTED_SERVICES` (comma lists)
    /// - `RESOLUTION_LOCK` (`global` or `per-name`)
    /// - `ID_CACHE_TTL_SECS`, `REPO_CACHE_TTL_SECS`, `PERMISSION_CACHE_TTL_SECS`
    /// - `DOMAIN_GUARDS` (comma list of `url-fragment=domain-fragment`)
    pub fn from_env() -> Result<Self, ServiceConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`ServiceConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ServiceConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let port = match var("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ServiceConfigError::Invalid("PORT", raw))?,
            None => defaults.port,
        };

        let always_allow_root = match var("ALWAYS_ALLOW_ROOT") {
            Some(raw) => parse_bool(&raw)
                .ok_or(ServiceConfigError::Invalid("ALWAYS_ALLOW_ROOT", raw))?,
            None => defaults.access.always_allow_root,
        };
        let access = AccessPolicy {
            privileged_services: var("PRIVILEGED_SERVICES")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.access.privileged_services),
            trusted_services: var("TRUSTED_SERVICES")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.access.trusted_services),
            always_allow_root,
        };

        let lock = match var("RESOLUTION_LOCK") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ServiceConfigError::Invalid("RESOLUTION_LOCK", raw))?,
            None => defaults.lock,
        };

        let ttl = |key: &'static str, default: Duration| -> Result<Duration, ServiceConfigError> {
            match var(key) {
                Some(raw) => raw
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ServiceConfigError::Invalid(key, raw)),
                None => Ok(default),
            }
        };
        let caches = CacheSettings {
            identity_ttl: ttl("ID_CACHE_TTL_SECS", defaults.caches.identity_ttl)?,
            repository_ttl: ttl("REPO_CACHE_TTL_SECS", defaults.caches.repository_ttl)?,
            permission_ttl: ttl("PERMISSION_CACHE_TTL_SECS", defaults.caches.permission_ttl)?,
            ..defaults.caches
        };

        let domain_guards = match var("DOMAIN_GUARDS") {
            Some(raw) => parse_guards(&raw)?,
            None => defaults.domain_guards,
        };

        Ok(Self {
            port,
            auth_token: var("AUTH_TOKEN").map(SecretToken::new),
            database_url: var("DATABASE_URL").map(Zeroizing::new),
            access,
            lock,
            caches,
            domain_guards,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_guards(raw: &str) -> Result<Vec<DomainGuard>, ServiceConfigError> {
    split_list(raw)
        .into_iter()
        .map(|entry| match entry.split_once('=') {
            Some((url, domain)) if !url.trim().is_empty() && !domain.trim().is_empty() => {
                Ok(DomainGuard::new(url.trim(), domain.trim()))
            }
            _ => Err(ServiceConfigError::Invalid("DOMAIN_GUARDS", entry.clone())),
        })
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ServiceConfigError {
    #[error("invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
