//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! Wiring, leaves first:
//! - **BackendRegistry**: built by `artefact-remote`, immutable after startup
//! - **ArtefactResolver**: identity store, registry, caches, resolution lock
//! - **AccessControl**: resolver, authorization oracle, permission cache
//! - **ContentAssembler**: registry, resolver, access control
//!
//! Every cache and the lock are created here from [`ServiceConfig`], once
//! per process.

use std::sync::Arc;

use artefact_remote::{BackendRegistry, RemoteClients};
use artefact_store::IdentityStore;

use crate::access::AccessControl;
use crate::assembler::ContentAssembler;
use crate::config::ServiceConfig;
use crate::lock::ResolutionLock;
use crate::resolver::{ArtefactResolver, ResolverCaches};

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub registry: Arc<BackendRegistry>,
    pub resolver: Arc<ArtefactResolver>,
    pub access: Arc<AccessControl>,
    pub assembler: ContentAssembler,
}

impl AppState {
    /// Wire every component from configuration, connected remotes and an
    /// identity store.
    pub fn new(
        config: ServiceConfig,
        remote: RemoteClients,
        store: Arc<dyn IdentityStore>,
    ) -> Self {
        let caches = ResolverCaches::new(
            config.caches.identity_ttl,
            config.caches.identity_capacity,
            config.caches.repository_ttl,
            config.caches.repository_capacity,
        );
        let registry = Arc::clone(remote.registry());
        let resolver = Arc::new(ArtefactResolver::new(
            store,
            Arc::clone(&registry),
            remote.source_repos().cloned(),
            caches,
            ResolutionLock::new(config.lock),
            config.domain_guards.clone(),
        ));
        let access = Arc::new(AccessControl::new(
            Arc::clone(&resolver),
            Arc::clone(remote.oracle()),
            config.access.clone(),
            config.caches.permission_ttl,
            config.caches.permission_capacity,
        ));
        let assembler = ContentAssembler::new(
            Arc::clone(&registry),
            Arc::clone(&resolver),
            Arc::clone(&access),
        );

        Self {
            config: Arc::new(config),
            registry,
            resolver,
            access,
            assembler,
        }
    }
}
