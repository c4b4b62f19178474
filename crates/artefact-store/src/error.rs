//! Identity store errors.

use artefact_core::ArtefactId;

/// Errors from the identity store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No identity with this id.
    #[error("artefact {0} not found")]
    NotFound(ArtefactId),
    /// The database rejected or failed the query.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A stored row cannot be represented as an identity.
    #[error("corrupt identity row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}
