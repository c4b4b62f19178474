//! # Legacy Path Links
//!
//! Human-readable links that address content by numeric artefact id:
//!
//! ```text
//! /artefacts/artefactid/<id>/version/latest/<path>
//! /artefacts/artefactid/<id>/version/latest
//! /artefacts/artefactid/<id>/version/<n>/<path>
//! ```
//!
//! The same shapes are accepted under `/builds/downloads/`, which is the
//! prefix for direct file downloads. Anything else is a decode error.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CodecError;
use crate::identity::ArtefactId;
use crate::path;
use crate::reference::LATEST_VERSION;

/// Path prefix for browsing links.
pub const BROWSE_PREFIX: &str = "/artefacts/";

/// Path prefix for download links.
pub const DOWNLOAD_PREFIX: &str = "/builds/downloads/";

static LATEST_WITH_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"artefactid/(\d+)/version/latest/(.*)").expect("static regex")
});
static LATEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"artefactid/(\d+)/version/latest").expect("static regex"));
static PINNED_WITH_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"artefactid/(\d+)/version/(\d+)/(.*)").expect("static regex")
});

/// Which prefix a link was found under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// `/artefacts/...`
    Browse,
    /// `/builds/downloads/...`
    Download,
}

/// A decoded legacy link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyLink {
    kind: LinkKind,
    artefact_id: ArtefactId,
    version: u64,
    path: String,
}

impl LegacyLink {
    /// Parse a link path. Text before the prefix (scheme, host) is ignored.
    pub fn parse(link: &str) -> Result<Self, CodecError> {
        let (kind, rest) = [(LinkKind::Browse, BROWSE_PREFIX), (LinkKind::Download, DOWNLOAD_PREFIX)]
            .into_iter()
            .find_map(|(kind, prefix)| link.find(prefix).map(|idx| (kind, &link[idx + prefix.len()..])))
            .ok_or_else(|| CodecError::InvalidLink(link.to_string()))?;

        let (id, version, path) = if let Some(c) = LATEST_WITH_PATH.captures(rest) {
            (c.get(1).map_or("", |m| m.as_str()), LATEST_VERSION, c[2].to_string())
        } else if let Some(c) = LATEST.captures(rest) {
            (c.get(1).map_or("", |m| m.as_str()), LATEST_VERSION, String::new())
        } else if let Some(c) = PINNED_WITH_PATH.captures(rest) {
            let version = c[2]
                .parse::<u64>()
                .map_err(|_| CodecError::InvalidLink(link.to_string()))?;
            (c.get(1).map_or("", |m| m.as_str()), version, c[3].to_string())
        } else {
            return Err(CodecError::InvalidLink(link.to_string()));
        };

        let artefact_id = id
            .parse::<u64>()
            .map_err(|_| CodecError::InvalidLink(link.to_string()))?;
        if artefact_id == 0 {
            return Err(CodecError::MissingArtefactId(link.to_string()));
        }

        Ok(Self {
            kind,
            artefact_id: ArtefactId::new(artefact_id),
            version,
            path,
        })
    }

    /// Browse or download.
    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    /// Artefact the link points into.
    pub fn artefact_id(&self) -> ArtefactId {
        self.artefact_id
    }

    /// Version as written; 0 means latest.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// True if the version must be resolved against the backend.
    pub fn is_latest(&self) -> bool {
        self.version == LATEST_VERSION
    }

    /// The path exactly as it appeared after the version segment.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The path as an absolute, normalized directory or file path.
    pub fn absolute_path(&self) -> String {
        path::normalize_dir(&self.path)
    }
}

/// Pinned and latest link for one content item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPair {
    /// Link carrying the concrete version.
    pub to_version: String,
    /// Link that always follows the latest version.
    pub to_latest: String,
}

fn links(prefix: &str, id: ArtefactId, version: u64, target: &str) -> LinkPair {
    let rel = path::relative(target);
    LinkPair {
        to_version: format!("{prefix}artefactid/{id}/version/{version}/{rel}"),
        to_latest: format!("{prefix}artefactid/{id}/version/latest/{rel}"),
    }
}

/// Browsing links for an artefact or directory at `target`.
pub fn browse_links(id: ArtefactId, version: u64, target: &str) -> LinkPair {
    links(BROWSE_PREFIX, id, version, target)
}

/// Download links for the file at `target`.
pub fn download_links(id: ArtefactId, version: u64, target: &str) -> LinkPair {
    links(DOWNLOAD_PREFIX, id, version, target)
}
