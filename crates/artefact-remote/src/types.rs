//! Build-repo backend wire types.
//!
//! Fields use `#[serde(default)]` so that backends adding fields, or
//! omitting optional ones, do not break deserialization.

use artefact_core::{RepositoryId, DEFAULT_BRANCH};
use serde::{Deserialize, Serialize};

/// Identity a backend reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerInfo {
    /// The domain this backend serves.
    pub domain: String,
}

/// One repository as listed by a backend. Older backends omit the domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRepoEntry {
    pub name: String,
    #[serde(default)]
    pub domain: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct RepoList {
    #[serde(default)]
    pub entries: Vec<BackendRepoEntry>,
}

/// Kind of a file-listing entry, as numbered on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum EntryType {
    File,
    Directory,
    /// Anything else a backend may report (links, special files).
    Other(u32),
}

impl From<u32> for EntryType {
    fn from(raw: u32) -> Self {
        match raw {
            1 => Self::File,
            2 => Self::Directory,
            other => Self::Other(other),
        }
    }
}

impl From<EntryType> for u32 {
    fn from(kind: EntryType) -> Self {
        match kind {
            EntryType::File => 1,
            EntryType::Directory => 2,
            EntryType::Other(raw) => raw,
        }
    }
}

/// One entry of a file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    /// Parent directory, in whatever form the backend uses.
    #[serde(default)]
    pub dir: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct FileList {
    #[serde(default)]
    pub entries: Vec<FileEntry>,
}

/// Request for a file listing of one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilesRequest {
    pub repository: String,
    pub branch: String,
    pub version: u64,
    pub dir: String,
    pub recursive: bool,
}

impl ListFilesRequest {
    /// Recursive listing of `dir` in `repository` at `version`.
    pub fn recursive(repository: impl Into<String>, version: u64, dir: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            branch: DEFAULT_BRANCH.to_string(),
            version,
            dir: dir.into(),
            recursive: true,
        }
    }

    /// Listing of `dir` only.
    pub fn flat(repository: impl Into<String>, version: u64, dir: impl Into<String>) -> Self {
        Self {
            recursive: false,
            ..Self::recursive(repository, version, dir)
        }
    }
}

/// Address of one file in one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequest {
    pub repository: String,
    pub branch: String,
    pub version: u64,
    /// Path of the file relative to the build root.
    pub filename: String,
    /// Block size for streamed reads; `None` lets the backend choose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocksize: Option<u32>,
}

impl FileRequest {
    pub fn new(repository: impl Into<String>, version: u64, filename: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            branch: DEFAULT_BRANCH.to_string(),
            version,
            filename: filename.into(),
            blocksize: None,
        }
    }

    pub fn with_blocksize(mut self, blocksize: u32) -> Self {
        self.blocksize = Some(blocksize);
        self
    }
}

/// File metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub(crate) struct FileExists {
    #[serde(default)]
    pub exists: bool,
}

/// Request addressing the builds of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRequest {
    pub repository: String,
    pub branch: String,
}

impl VersionRequest {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            branch: DEFAULT_BRANCH.to_string(),
        }
    }
}

/// Build metadata recorded with a build.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildMeta {
    /// Source repository the build came from; 0 if unknown.
    #[serde(default)]
    pub repository_id: u64,
    #[serde(default)]
    pub commit_id: String,
}

impl BuildMeta {
    /// The repository id, if the backend recorded one.
    pub fn repository(&self) -> Option<RepositoryId> {
        (self.repository_id != 0).then(|| RepositoryId::new(self.repository_id))
    }
}

/// Latest build of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestVersion {
    pub build_id: u64,
    #[serde(default)]
    pub build_meta: Option<BuildMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct VersionList {
    #[serde(default)]
    pub versions: Vec<String>,
}

/// Repository metadata kept by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepositoryMeta {
    /// 0 if the backend has no record.
    #[serde(default)]
    pub repository_id: u64,
}

impl RepositoryMeta {
    pub fn repository(&self) -> Option<RepositoryId> {
        (self.repository_id != 0).then(|| RepositoryId::new(self.repository_id))
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RepositoryMetaRequest<'a> {
    pub path: &'a str,
}
