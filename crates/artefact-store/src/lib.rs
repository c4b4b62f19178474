//! # artefact-store -- Durable artefact identities
//!
//! [`IdentityStore`] is a thin adapter over wherever identities live:
//! point lookup by id, lookup by name, equality queries on one column,
//! create, and update. It enforces no uniqueness; callers that need one
//! identity per `(domain, name)` must find before they create.
//!
//! - [`PgIdentityStore`] persists to PostgreSQL via SQLx.
//! - [`MemoryIdentityStore`] keeps everything in process, for development
//!   and tests. Nothing survives a restart.

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::StoreError;
pub use memory::MemoryIdentityStore;
pub use postgres::PgIdentityStore;

use artefact_core::{ArtefactId, ArtefactIdentity, NewArtefactIdentity};
use async_trait::async_trait;

/// Columns that can be matched by [`IdentityStore::find`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityColumn {
    Domain,
    Name,
    Url,
}

impl IdentityColumn {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Name => "name",
            Self::Url => "url",
        }
    }
}

/// Exact-match predicate on one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityFilter {
    pub column: IdentityColumn,
    pub value: String,
}

impl IdentityFilter {
    pub fn url(value: impl Into<String>) -> Self {
        Self {
            column: IdentityColumn::Url,
            value: value.into(),
        }
    }

    pub fn domain(value: impl Into<String>) -> Self {
        Self {
            column: IdentityColumn::Domain,
            value: value.into(),
        }
    }

    pub(crate) fn matches(&self, identity: &ArtefactIdentity) -> bool {
        match self.column {
            IdentityColumn::Domain => identity.domain == self.value,
            IdentityColumn::Name => identity.name == self.value,
            IdentityColumn::Url => identity.url.as_deref().unwrap_or("") == self.value,
        }
    }
}

/// Storage of artefact identities.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Every identity with this name, in any domain.
    async fn by_name(&self, name: &str) -> Result<Vec<ArtefactIdentity>, StoreError>;

    /// The identity with this id, or [`StoreError::NotFound`].
    async fn by_id(&self, id: ArtefactId) -> Result<ArtefactIdentity, StoreError>;

    /// Persist a new identity and return it with its assigned id.
    async fn save(&self, identity: &NewArtefactIdentity) -> Result<ArtefactIdentity, StoreError>;

    /// Store the URL of an existing identity. Domain and name never change.
    async fn update(&self, identity: &ArtefactIdentity) -> Result<(), StoreError>;

    /// Every identity whose column equals the filter value.
    async fn find(&self, filter: &IdentityFilter) -> Result<Vec<ArtefactIdentity>, StoreError>;
}
