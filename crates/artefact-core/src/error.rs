//! # Codec Errors
//!
//! Every variant here is an InvalidArgument-class failure: the caller handed
//! us a reference or link that does not decode. None of them panic.

use thiserror::Error;

use crate::reference::ReferenceKind;

/// Errors produced while building, encoding or decoding references and links.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// An empty string was supplied where a reference is required.
    #[error("reference missing but required")]
    Missing,

    /// The token is not valid base64 or does not contain a serialized reference.
    #[error("malformed reference token: {0}")]
    Malformed(String),

    /// The number of text parts does not match the reference kind.
    #[error("invalid {kind} reference: has {found} parts, expected {expected}")]
    Arity {
        /// The kind named by the reference.
        kind: ReferenceKind,
        /// Number of parts present.
        found: usize,
        /// Number of parts the kind requires.
        expected: usize,
    },

    /// The kind tag is not one of artefact, directory or file.
    #[error("invalid reference: unknown kind tag {0}")]
    UnknownKind(u8),

    /// The reference carries no domain.
    #[error("reference for \"{name}\" is missing a domain")]
    MissingDomain {
        /// Artefact name found in the reference, if any.
        name: String,
    },

    /// The link path matches none of the accepted shapes.
    #[error("invalid path in link reference: '{0}'")]
    InvalidLink(String),

    /// The link path names artefact id 0.
    #[error("no artefact id in link reference: '{0}'")]
    MissingArtefactId(String),
}
