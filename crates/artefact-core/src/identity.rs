//! # Identity Types
//!
//! Numeric identifiers and the durable artefact identity record.
//!
//! [`ArtefactId`] values are assigned by the identity store and never reused.
//! [`RepositoryId`] values belong to the source-control system and are only
//! ever read here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned numeric identity of an artefact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtefactId(u64);

impl ArtefactId {
    /// Wrap a raw store id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ArtefactId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ArtefactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric id of the source-control repository an artefact is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(u64);

impl RepositoryId {
    /// Wrap a raw repository id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for RepositoryId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The durable record naming an artefact.
///
/// At most one identity exists per `(domain, name)` pair. The store does not
/// enforce this; the resolver does, by finding before creating under a lock.
/// `url` is the only field ever changed after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtefactIdentity {
    /// Store-assigned id.
    pub id: ArtefactId,
    /// Organizational domain the artefact belongs to.
    pub domain: String,
    /// Artefact (repository) name as the backends know it.
    pub name: String,
    /// Origin source-control URL, if one was registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// When the identity was first persisted.
    pub created_at: DateTime<Utc>,
}

impl ArtefactIdentity {
    /// True if this identity names `name` inside `domain`.
    pub fn is(&self, domain: &str, name: &str) -> bool {
        self.domain == domain && self.name == name
    }
}

/// An identity that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArtefactIdentity {
    /// Organizational domain.
    pub domain: String,
    /// Artefact name.
    pub name: String,
    /// Optional origin source-control URL.
    pub url: Option<String>,
}

impl NewArtefactIdentity {
    /// Identity for `(domain, name)` with no URL.
    pub fn new(domain: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
            url: None,
        }
    }

    /// Attach an origin URL. Empty strings are treated as "no URL".
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.url = if url.is_empty() { None } else { Some(url) };
        self
    }
}
