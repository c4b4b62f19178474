//! # References
//!
//! A [`Reference`] addresses an artefact, a directory inside an artefact, or a
//! file inside an artefact, at a version. Version 0 means "latest" and is
//! re-resolved against the backend on every use.
//!
//! ## Text parts
//!
//! | Kind | `texts` |
//! |------|---------|
//! | Artefact | `[name]` |
//! | Directory | `[name, artefact_name, path]` |
//! | File | `[name, artefact_name, path]` |
//!
//! Constructors reject any other arity, so code holding a `Reference` can
//! index `texts` without checking.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CodecError;
use crate::path;

/// Version number meaning "whatever the backend reports as latest".
pub const LATEST_VERSION: u64 = 0;

/// What a reference points at.
///
/// The declaration order is the listing order: directories sort before files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// The top level of an artefact.
    Artefact,
    /// A directory inside an artefact.
    Directory,
    /// A file inside an artefact.
    File,
}

impl ReferenceKind {
    /// Wire tag used inside opaque tokens.
    pub fn tag(self) -> u8 {
        match self {
            Self::Artefact => 1,
            Self::Directory => 2,
            Self::File => 3,
        }
    }

    /// Inverse of [`ReferenceKind::tag`].
    pub fn from_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            1 => Ok(Self::Artefact),
            2 => Ok(Self::Directory),
            3 => Ok(Self::File),
            other => Err(CodecError::UnknownKind(other)),
        }
    }

    /// Number of text parts a reference of this kind carries.
    pub fn arity(self) -> usize {
        match self {
            Self::Artefact => 1,
            Self::Directory | Self::File => 3,
        }
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Artefact => write!(f, "artefact"),
            Self::Directory => write!(f, "directory"),
            Self::File => write!(f, "file"),
        }
    }
}

/// Opaque, stable identifier of a backend.
///
/// Derived from the backend address with SHA-256 so tokens do not reveal
/// where backends live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    /// Derive the id for a backend address.
    pub fn for_address(address: &str) -> Self {
        let digest = Sha256::digest(address.as_bytes());
        let hex: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
        Self(hex)
    }

    /// Wrap an id read back from a token.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated address of an artefact, directory or file at a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    kind: ReferenceKind,
    domain: String,
    backend: BackendId,
    version: u64,
    texts: Vec<String>,
}

impl Reference {
    /// Build a reference from raw parts, enforcing arity and a non-empty domain.
    pub fn from_parts(
        kind: ReferenceKind,
        domain: impl Into<String>,
        backend: BackendId,
        version: u64,
        texts: Vec<String>,
    ) -> Result<Self, CodecError> {
        if texts.len() != kind.arity() {
            return Err(CodecError::Arity {
                kind,
                found: texts.len(),
                expected: kind.arity(),
            });
        }
        let domain = domain.into();
        let reference = Self {
            kind,
            domain,
            backend,
            version,
            texts,
        };
        if reference.domain.is_empty() {
            return Err(CodecError::MissingDomain {
                name: reference.artefact_name().to_string(),
            });
        }
        Ok(reference)
    }

    /// Reference to the top level of artefact `name`.
    pub fn artefact(
        domain: impl Into<String>,
        backend: BackendId,
        version: u64,
        name: impl Into<String>,
    ) -> Result<Self, CodecError> {
        Self::from_parts(
            ReferenceKind::Artefact,
            domain,
            backend,
            version,
            vec![name.into()],
        )
    }

    /// Reference to entry `name` located in directory `path` of `artefact`.
    pub fn entry(
        kind: ReferenceKind,
        domain: impl Into<String>,
        backend: BackendId,
        version: u64,
        name: impl Into<String>,
        artefact: impl Into<String>,
        path: impl Into<String>,
    ) -> Result<Self, CodecError> {
        Self::from_parts(
            kind,
            domain,
            backend,
            version,
            vec![name.into(), artefact.into(), path.into()],
        )
    }

    /// What this reference points at.
    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    /// Domain of the referenced artefact.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Backend that served the listing this reference was made from.
    pub fn backend(&self) -> &BackendId {
        &self.backend
    }

    /// Version as encoded; 0 means latest.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// True if the version must be resolved against the backend.
    pub fn is_latest(&self) -> bool {
        self.version == LATEST_VERSION
    }

    /// The raw text parts.
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// Name of the artefact (repository) this reference lives in.
    pub fn artefact_name(&self) -> &str {
        match self.kind {
            ReferenceKind::Artefact => &self.texts[0],
            ReferenceKind::Directory | ReferenceKind::File => &self.texts[1],
        }
    }

    /// Entry name, for directory and file references.
    pub fn entry_name(&self) -> Option<&str> {
        match self.kind {
            ReferenceKind::Artefact => None,
            ReferenceKind::Directory | ReferenceKind::File => Some(&self.texts[0]),
        }
    }

    /// Parent directory of the entry, for directory and file references.
    pub fn parent(&self) -> Option<&str> {
        match self.kind {
            ReferenceKind::Artefact => None,
            ReferenceKind::Directory | ReferenceKind::File => Some(&self.texts[2]),
        }
    }

    /// Absolute path of the referenced entry; `/` for an artefact.
    pub fn full_path(&self) -> String {
        match (self.parent(), self.entry_name()) {
            (Some(parent), Some(name)) => path::join(parent, name),
            _ => "/".to_string(),
        }
    }

    /// The same reference with a different version.
    pub fn with_version(&self, version: u64) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} in {} at {}",
            self.kind,
            self.full_path(),
            self.artefact_name(),
            if self.is_latest() {
                "latest".to_string()
            } else {
                self.version.to_string()
            }
        )
    }
}
