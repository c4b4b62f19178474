//! # Service Bootstrap
//!
//! ## Sequence
//!
//! 1. **Identity store**: PostgreSQL when `DATABASE_URL` is set (migrations
//!    run on connect), otherwise the in-memory store.
//! 2. **Remote collaborators**: connect every build-repo backend and ask
//!    each which domain it serves. Any unreachable backend is fatal.
//! 3. **Wire state**: caches, resolution lock, resolver, access control and
//!    assembler.
//! 4. **Log the routing table**: one line per backend.

use std::sync::Arc;

use artefact_remote::{RemoteClients, RemoteConfig, RemoteError};
use artefact_store::{IdentityStore, MemoryIdentityStore, PgIdentityStore, StoreError};

use crate::config::ServiceConfig;
use crate::state::AppState;

/// Errors during bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The identity store could not be opened or migrated.
    #[error("identity store: {0}")]
    Store(#[from] StoreError),

    /// A backend, the oracle or the source-control directory could not be
    /// set up.
    #[error("remote collaborators: {0}")]
    Remote(#[from] RemoteError),
}

/// Open the identity store named by `config`.
pub async fn open_store(config: &ServiceConfig) -> Result<Arc<dyn IdentityStore>, StoreError> {
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PgIdentityStore::connect(url).await?;
            tracing::info!("identity store: postgres");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; identities are kept in memory and lost on restart");
            Ok(Arc::new(MemoryIdentityStore::new()))
        }
    }
}

/// Build the application state from configuration.
pub async fn bootstrap(
    config: ServiceConfig,
    remote_config: RemoteConfig,
) -> Result<AppState, BootstrapError> {
    let store = open_store(&config).await?;
    let remote = RemoteClients::connect(&remote_config).await?;
    Ok(from_parts(config, remote, store))
}

/// Build the application state from already-connected parts.
pub fn from_parts(
    config: ServiceConfig,
    remote: RemoteClients,
    store: Arc<dyn IdentityStore>,
) -> AppState {
    for backend in remote.registry().descriptors() {
        tracing::info!(
            backend = %backend.address,
            backend_id = %backend.id,
            domain = %backend.served_domain,
            "routing domain"
        );
    }
    tracing::info!(
        lock = ?config.lock,
        privileged = ?config.access.privileged_services,
        trusted = ?config.access.trusted_services,
        always_allow_root = config.access.always_allow_root,
        "access policy"
    );
    AppState::new(config, remote, store)
}
