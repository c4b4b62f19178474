//! # API Route Modules
//!
//! - [`artefacts`]: catalog listing, identity lifecycle, builds and files
//!   by numeric artefact id.
//! - [`repositories`]: reverse lookup from source repository to artefact.
//! - [`contents`]: browsing by opaque token or legacy browse link.
//! - [`downloads`]: file downloads by opaque token or legacy download link.

pub mod artefacts;
pub mod contents;
pub mod downloads;
pub mod repositories;

use artefact_core::ArtefactIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A persisted artefact identity as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArtefactInfo {
    pub id: u64,
    pub domain: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ArtefactIdentity> for ArtefactInfo {
    fn from(identity: ArtefactIdentity) -> Self {
        Self {
            id: identity.id.get(),
            domain: identity.domain,
            name: identity.name,
            url: identity.url,
            created_at: identity.created_at,
        }
    }
}
