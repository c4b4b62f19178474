//! # Access Control
//!
//! [`AccessControl::authorize`] decides whether a caller may read an
//! artefact and returns the artefact's numeric id when it may. The first
//! matching rule wins:
//!
//! 1. an empty domain is an invalid argument;
//! 2. a service with a blanket read grant from the oracle is allowed;
//! 3. a privileged service is allowed;
//! 4. anything else needs an authenticated user;
//! 5. root-equivalent users are allowed when the policy says so;
//! 6. a trusted service is allowed;
//! 7. a cached per-(user, artefact) decision is returned as is;
//! 8. otherwise the oracle is asked for view and read, and the answer is
//!    cached whichever way it went.
//!
//! Cached denials expire with the permission cache TTL, so a grant made in
//! the oracle takes effect within that window.

use std::sync::Arc;
use std::time::Duration;

use artefact_core::ArtefactId;
use artefact_remote::objectauth::{AuthorizationOracle, ObjectType};
use artefact_remote::RemoteError;

use crate::auth::CallerIdentity;
use crate::cache::TtlCache;
use crate::resolver::{ArtefactResolver, ResolveError};

/// Service ids with unconditional read access.
pub const DEFAULT_PRIVILEGED_SERVICES: &[&str] = &["833"];

/// Service ids allowed once the artefact is known to exist.
pub const DEFAULT_TRUSTED_SERVICES: &[&str] = &["3539"];

/// Authorization failures.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("missing domain for artefact {name:?}")]
    MissingDomain { name: String },

    #[error("access to artefact {name} denied: no authenticated user")]
    Unauthenticated { name: String },

    /// The oracle said no, now or within the permission cache TTL.
    #[error("access to artefact {name} (#{id}) denied")]
    Denied {
        name: String,
        id: ArtefactId,
        /// True if the decision came from the permission cache.
        cached: bool,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("authorization oracle failed: {0}")]
    Oracle(#[source] RemoteError),
}

impl AccessError {
    /// True for the outcomes that mean "not allowed" rather than "could not
    /// decide".
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::Unauthenticated { .. } | Self::Denied { .. })
    }
}

/// Which services and users bypass the per-artefact oracle check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    pub privileged_services: Vec<String>,
    pub trusted_services: Vec<String>,
    pub always_allow_root: bool,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            privileged_services: DEFAULT_PRIVILEGED_SERVICES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            trusted_services: DEFAULT_TRUSTED_SERVICES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            always_allow_root: true,
        }
    }
}

/// Authorizes callers against artefacts.
pub struct AccessControl {
    resolver: Arc<ArtefactResolver>,
    oracle: Arc<dyn AuthorizationOracle>,
    policy: AccessPolicy,
    permissions: TtlCache<(String, ArtefactId), bool>,
    service_grants: TtlCache<String, bool>,
}

impl std::fmt::Debug for AccessControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessControl")
            .field("policy", &self.policy)
            .field("permissions", &self.permissions)
            .field("service_grants", &self.service_grants)
            .finish()
    }
}

impl AccessControl {
    /// `permission_ttl` bounds how long any oracle answer, allow or deny, is
    /// reused.
    pub fn new(
        resolver: Arc<ArtefactResolver>,
        oracle: Arc<dyn AuthorizationOracle>,
        policy: AccessPolicy,
        permission_ttl: Duration,
        permission_capacity: usize,
    ) -> Self {
        Self {
            resolver,
            oracle,
            policy,
            permissions: TtlCache::new("permissions", permission_ttl, permission_capacity),
            service_grants: TtlCache::new("service_grants", permission_ttl, 64),
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Authorize `caller` to read artefact `name` in `domain`.
    pub async fn authorize(
        &self,
        caller: &CallerIdentity,
        name: &str,
        domain: &str,
    ) -> Result<ArtefactId, AccessError> {
        if domain.is_empty() {
            return Err(AccessError::MissingDomain {
                name: name.to_string(),
            });
        }

        if let Some(service) = caller.service_id.as_deref() {
            if self.service_has_blanket_access(service).await? {
                return Ok(self.resolver.resolve_id(name, domain).await?);
            }
            if self.policy.privileged_services.iter().any(|s| s == service) {
                return Ok(self.resolver.resolve_id(name, domain).await?);
            }
        }

        let Some(user) = caller.user.as_ref() else {
            tracing::debug!(artefact = %name, domain = %domain, "access without user denied");
            return Err(AccessError::Unauthenticated {
                name: name.to_string(),
            });
        };

        let id = self.resolver.resolve_id(name, domain).await?;
        if self.policy.always_allow_root && user.root {
            return Ok(id);
        }
        if let Some(service) = caller.service_id.as_deref() {
            if self.policy.trusted_services.iter().any(|s| s == service) {
                return Ok(id);
            }
        }

        let key = (user.id.clone(), id);
        if let Some(allowed) = self.permissions.get(&key) {
            return if allowed {
                Ok(id)
            } else {
                Err(AccessError::Denied {
                    name: name.to_string(),
                    id,
                    cached: true,
                })
            };
        }

        let permissions = self
            .oracle
            .ask_object_access(&user.id, ObjectType::Artefact, id.get())
            .await
            .map_err(AccessError::Oracle)?;
        let allowed = permissions.can_view_and_read();
        self.permissions.put(key, allowed);
        if allowed {
            Ok(id)
        } else {
            tracing::debug!(user = %user.id, artefact = %name, artefact_id = %id, "oracle denied access");
            Err(AccessError::Denied {
                name: name.to_string(),
                id,
                cached: false,
            })
        }
    }

    async fn service_has_blanket_access(&self, service: &str) -> Result<bool, AccessError> {
        let key = service.to_string();
        if let Some(granted) = self.service_grants.get(&key) {
            return Ok(granted);
        }
        let granted = self
            .oracle
            .allow_all_service_access(service, ObjectType::Artefact)
            .await
            .map_err(AccessError::Oracle)?;
        self.service_grants.put(key, granted);
        Ok(granted)
    }
}
