#![deny(missing_docs)]

//! # artefact-core - Foundational Types for the Artefact Catalog
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It performs no I/O and has no internal crate dependencies.
//!
//! ## Contents
//!
//! 1. **Numeric identities.** [`ArtefactId`] and [`RepositoryId`] are distinct
//!    newtypes; you cannot pass one where the other is expected.
//!
//! 2. **[`ArtefactIdentity`].** The durable `(id, domain, name, url)` record.
//!
//! 3. **[`Reference`].** The abstract address of an artefact, directory or
//!    file at a version. Arity of [`Reference::texts`] is validated at
//!    construction, so a `Reference` value is always well-formed.
//!
//! 4. **Two reference encodings.** Opaque tokens ([`codec`]) and legacy path
//!    links ([`link`]). [`parse_reference`] decides which one a string is.

pub mod codec;
pub mod error;
pub mod identity;
pub mod link;
pub mod path;
pub mod reference;

pub use codec::{
    decode_token, encode_token, encode_token_pair, parse_reference, ParsedReference, TokenPair,
};
pub use error::CodecError;
pub use identity::{ArtefactId, ArtefactIdentity, NewArtefactIdentity, RepositoryId};
pub use link::{
    browse_links, download_links, LegacyLink, LinkKind, LinkPair, BROWSE_PREFIX, DOWNLOAD_PREFIX,
};
pub use reference::{BackendId, Reference, ReferenceKind, LATEST_VERSION};

/// The only branch artefacts are built from.
pub const DEFAULT_BRANCH: &str = "master";
