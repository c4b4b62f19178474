//! # Content Assembler
//!
//! Builds the listings the HTTP surface returns: the catalog of artefacts,
//! the top level of an artefact, a directory inside it, and the plan for
//! streaming one file. Every item carries a pinned and a latest opaque
//! token plus the matching legacy links.
//!
//! Listings keep only the direct children of the requested directory and
//! are sorted by kind, then name, so directories come before files. Every
//! operation authorizes the caller before touching a backend listing.

use std::sync::Arc;

use artefact_core::codec::{encode_token_pair, parse_reference, ParsedReference};
use artefact_core::link::{browse_links, download_links};
use artefact_core::{
    path, ArtefactId, BackendId, CodecError, LegacyLink, Reference, ReferenceKind, RepositoryId,
};
use artefact_remote::types::{EntryType, FileEntry, FileRequest, ListFilesRequest};
use artefact_remote::{BackendRegistry, RemoteError, RepoEntry};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use utoipa::ToSchema;

use crate::access::{AccessControl, AccessError};
use crate::auth::CallerIdentity;
use crate::resolver::{ArtefactResolver, ResolveError};

/// Block size for downloads by reference.
pub const DOWNLOAD_BLOCKSIZE: u32 = 8192;

/// Block size for streams by artefact id.
pub const STREAM_BLOCKSIZE: u32 = 4096;

/// Failures while assembling content.
#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("file references cannot be browsed, download them instead")]
    NotBrowsable,

    #[error("only file references can be downloaded, got a {0} reference")]
    NotDownloadable(ReferenceKind),

    #[error("user account required to {0}")]
    UserRequired(&'static str),

    /// Top-level listings need the latest build's metadata.
    #[error("build metadata unavailable for artefact {name:?}")]
    MissingBuildMeta { name: String },

    #[error("directory {dir:?} in artefact {name:?} not found")]
    DirectoryNotFound {
        name: String,
        dir: String,
        #[source]
        source: RemoteError,
    },

    /// The backend listed a build that is not a number.
    #[error("backend reported non-numeric build {build:?} for artefact {name:?}")]
    InvalidBuildName { name: String, build: String },

    #[error("listing task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

// ── Response types ──────────────────────────────────────────────────────────

/// What a content item is. Listings sort in declaration order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Artefact,
    Directory,
    File,
}

impl From<ReferenceKind> for ContentKind {
    fn from(kind: ReferenceKind) -> Self {
        match kind {
            ReferenceKind::Artefact => Self::Artefact,
            ReferenceKind::Directory => Self::Directory,
            ReferenceKind::File => Self::File,
        }
    }
}

/// An artefact, directory or file, with the references that address it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Contents {
    pub name: String,
    pub kind: ContentKind,
    pub domain: String,
    /// Artefact this item belongs to.
    pub artefact_name: String,
    pub artefact_id: u64,
    /// Concrete build the item was listed at; 0 if unknown.
    pub version: u64,
    /// Absolute path inside the artefact; `/` for the top level.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<u64>,
    /// Opaque token pinned to `version`.
    pub reference: String,
    /// Opaque token that always follows the latest build.
    pub reference_latest: String,
    pub link: String,
    pub link_latest: String,
    pub downloadable: bool,
    /// Set on top-level items for root-equivalent callers.
    #[serde(default)]
    pub admin_access: bool,
    /// Direct children, for artefact and directory listings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<Contents>,
}

/// One entry of a directory listing by artefact id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ListingEntry {
    pub name: String,
    pub dir: String,
}

/// Direct children of one directory, split by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DirListing {
    pub path: String,
    pub artefact_id: u64,
    pub artefact_name: String,
    pub dirs: Vec<ListingEntry>,
    pub files: Vec<ListingEntry>,
}

/// Everything needed to stream one file to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDownload {
    /// Base name, for `Content-Disposition`.
    pub filename: String,
    /// Known only for downloads by reference.
    pub size: Option<u64>,
    pub mime_type: &'static str,
    pub domain: String,
    pub request: FileRequest,
}

/// MIME type for a download, by extension.
pub fn mime_type(filename: &str) -> &'static str {
    let extension = filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        _ => "binary/octet-stream",
    }
}

/// Lowercased alphanumeric characters of `s`, for fuzzy name matching.
fn chars_only(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn split_dir(dir: &str) -> (String, String) {
    let dir = path::normalize_dir(dir);
    match dir.rsplit_once('/') {
        Some((parent, name)) => (path::normalize_dir(parent), name.to_string()),
        None => ("/".to_string(), dir),
    }
}

/// The artefact and build a listing is made for.
#[derive(Debug, Clone)]
struct Origin {
    domain: String,
    backend: BackendId,
    artefact: String,
    id: ArtefactId,
    version: u64,
}

impl Origin {
    fn top_level(
        &self,
        repository: Option<RepositoryId>,
        admin_access: bool,
    ) -> Result<Contents, AssembleError> {
        let reference = Reference::artefact(
            self.domain.clone(),
            self.backend.clone(),
            self.version,
            self.artefact.clone(),
        )?;
        let tokens = encode_token_pair(&reference)?;
        let links = browse_links(self.id, self.version, "/");
        Ok(Contents {
            name: self.artefact.clone(),
            kind: ContentKind::Artefact,
            domain: self.domain.clone(),
            artefact_name: self.artefact.clone(),
            artefact_id: self.id.get(),
            version: self.version,
            path: "/".to_string(),
            repository_id: repository.map(RepositoryId::get),
            reference: tokens.pinned,
            reference_latest: tokens.latest,
            link: links.to_version,
            link_latest: links.to_latest,
            downloadable: false,
            admin_access,
            entries: Vec::new(),
        })
    }

    fn item(&self, kind: ReferenceKind, parent: &str, name: &str) -> Result<Contents, AssembleError> {
        let parent = path::normalize_dir(parent);
        let reference = Reference::entry(
            kind,
            self.domain.clone(),
            self.backend.clone(),
            self.version,
            name,
            self.artefact.clone(),
            parent.clone(),
        )?;
        let full_path = reference.full_path();
        let tokens = encode_token_pair(&reference)?;
        let links = match kind {
            ReferenceKind::File => download_links(self.id, self.version, &full_path),
            _ => browse_links(self.id, self.version, &full_path),
        };
        Ok(Contents {
            name: name.to_string(),
            kind: kind.into(),
            domain: self.domain.clone(),
            artefact_name: self.artefact.clone(),
            artefact_id: self.id.get(),
            version: self.version,
            path: full_path,
            repository_id: None,
            reference: tokens.pinned,
            reference_latest: tokens.latest,
            link: links.to_version,
            link_latest: links.to_latest,
            downloadable: kind == ReferenceKind::File,
            admin_access: false,
            entries: Vec::new(),
        })
    }

    /// Direct children of `dir`, sorted by kind then name.
    fn children(&self, dir: &str, listing: &[FileEntry]) -> Result<Vec<Contents>, AssembleError> {
        let mut children = Vec::new();
        for entry in listing.iter().filter(|e| path::is_direct_child(dir, &e.dir)) {
            let kind = match entry.entry_type {
                EntryType::File => ReferenceKind::File,
                EntryType::Directory => ReferenceKind::Directory,
                EntryType::Other(raw) => {
                    tracing::debug!(artefact = %self.artefact, entry = %entry.name, raw, "skipping entry of unknown type");
                    continue;
                }
            };
            children.push(self.item(kind, dir, &entry.name)?);
        }
        sort_listing(&mut children);
        Ok(children)
    }
}

fn sort_listing(items: &mut [Contents]) {
    items.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
}

// ── Assembler ───────────────────────────────────────────────────────────────

/// Builds listings and download plans. Cheap to clone.
#[derive(Clone)]
pub struct ContentAssembler {
    registry: Arc<BackendRegistry>,
    resolver: Arc<ArtefactResolver>,
    access: Arc<AccessControl>,
}

impl std::fmt::Debug for ContentAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentAssembler").finish_non_exhaustive()
    }
}

impl ContentAssembler {
    pub fn new(
        registry: Arc<BackendRegistry>,
        resolver: Arc<ArtefactResolver>,
        access: Arc<AccessControl>,
    ) -> Self {
        Self {
            registry,
            resolver,
            access,
        }
    }

    fn backend_for(&self, domain: &str, artefact: &str) -> Result<BackendId, AssembleError> {
        self.registry
            .backend_id_for_domain(domain)
            .cloned()
            .ok_or_else(|| {
                RemoteError::NoBackend {
                    domain: domain.to_string(),
                    artefact: artefact.to_string(),
                }
                .into()
            })
    }

    async fn list_dir(
        &self,
        origin: &Origin,
        dir: &str,
    ) -> Result<Vec<FileEntry>, AssembleError> {
        let request = ListFilesRequest::flat(origin.artefact.clone(), origin.version, dir);
        self.registry
            .list_files(&origin.domain, &request)
            .await
            .map_err(|source| {
                if source.is_not_found() {
                    AssembleError::DirectoryNotFound {
                        name: origin.artefact.clone(),
                        dir: dir.to_string(),
                        source,
                    }
                } else {
                    source.into()
                }
            })
    }

    /// Top level of build `version` of `(domain, name)`, 0 meaning latest.
    pub async fn repo_version(
        &self,
        caller: &CallerIdentity,
        name: &str,
        domain: &str,
        version: u64,
    ) -> Result<Contents, AssembleError> {
        let id = self.access.authorize(caller, name, domain).await?;
        let version = self.registry.resolve_version_of(domain, name, version).await?;
        let origin = Origin {
            domain: domain.to_string(),
            backend: self.backend_for(domain, name)?,
            artefact: name.to_string(),
            id,
            version,
        };
        let listing = self.list_dir(&origin, "/").await?;
        let mut top = origin.top_level(None, is_root(caller))?;
        top.entries = origin.children("/", &listing)?;
        Ok(top)
    }

    /// Browse whatever `reference` addresses: an opaque token or a legacy
    /// browse link.
    pub async fn contents(
        &self,
        caller: &CallerIdentity,
        reference: &str,
    ) -> Result<Contents, AssembleError> {
        match parse_reference(reference)? {
            ParsedReference::Link(link) => self.browse_link(caller, &link).await,
            ParsedReference::Token(reference) => match reference.kind() {
                ReferenceKind::Artefact => self.browse_artefact(caller, &reference).await,
                ReferenceKind::Directory => self.browse_directory(caller, &reference).await,
                ReferenceKind::File => Err(AssembleError::NotBrowsable),
            },
        }
    }

    async fn browse_artefact(
        &self,
        caller: &CallerIdentity,
        reference: &Reference,
    ) -> Result<Contents, AssembleError> {
        let (name, domain) = (reference.artefact_name(), reference.domain());
        let id = self.access.authorize(caller, name, domain).await?;

        let latest = self.registry.latest_version(domain, name).await?;
        let meta = latest
            .build_meta
            .as_ref()
            .ok_or_else(|| AssembleError::MissingBuildMeta {
                name: name.to_string(),
            })?;
        let version = if reference.is_latest() {
            latest.build_id
        } else {
            reference.version()
        };

        let origin = Origin {
            domain: domain.to_string(),
            backend: self.backend_for(domain, name)?,
            artefact: name.to_string(),
            id,
            version,
        };
        let listing = self.list_dir(&origin, "/").await?;
        let mut top = origin.top_level(meta.repository(), is_root(caller))?;
        top.entries = origin.children("/", &listing)?;
        Ok(top)
    }

    async fn browse_directory(
        &self,
        caller: &CallerIdentity,
        reference: &Reference,
    ) -> Result<Contents, AssembleError> {
        let (name, domain) = (reference.artefact_name(), reference.domain());
        let id = self.access.authorize(caller, name, domain).await?;
        let version = self.registry.resolve_version(reference).await?;

        let origin = Origin {
            domain: domain.to_string(),
            backend: self.backend_for(domain, name)?,
            artefact: name.to_string(),
            id,
            version,
        };
        self.render_dir(&origin, &reference.full_path()).await
    }

    async fn browse_link(
        &self,
        caller: &CallerIdentity,
        link: &LegacyLink,
    ) -> Result<Contents, AssembleError> {
        let identity = self.resolver.identity(link.artefact_id()).await?;
        let id = self
            .access
            .authorize(caller, &identity.name, &identity.domain)
            .await?;

        let latest = self
            .registry
            .latest_version(&identity.domain, &identity.name)
            .await?;
        let meta = latest
            .build_meta
            .as_ref()
            .ok_or_else(|| AssembleError::MissingBuildMeta {
                name: identity.name.clone(),
            })?;
        let version = if link.is_latest() {
            latest.build_id
        } else {
            link.version()
        };

        let origin = Origin {
            backend: self.backend_for(&identity.domain, &identity.name)?,
            domain: identity.domain,
            artefact: identity.name,
            id,
            version,
        };
        let dir = link.absolute_path();
        if dir == "/" {
            let listing = self.list_dir(&origin, "/").await?;
            let mut top = origin.top_level(meta.repository(), is_root(caller))?;
            top.entries = origin.children("/", &listing)?;
            return Ok(top);
        }
        self.render_dir(&origin, &dir).await
    }

    async fn render_dir(&self, origin: &Origin, dir: &str) -> Result<Contents, AssembleError> {
        let dir = path::normalize_dir(dir);
        let listing = self.list_dir(origin, &dir).await?;
        let (parent, name) = split_dir(&dir);
        let mut contents = origin.item(ReferenceKind::Directory, &parent, &name)?;
        contents.entries = origin.children(&dir, &listing)?;
        Ok(contents)
    }

    /// Every artefact the caller may read, with its latest build. A failure
    /// to read any latest build fails the whole listing.
    pub async fn list(&self, caller: &CallerIdentity) -> Result<Vec<Contents>, AssembleError> {
        if caller.user.is_none() {
            return Err(AssembleError::UserRequired("list artefacts"));
        }
        let started = std::time::Instant::now();
        let repos = self.registry.list_repos().await?;
        let total = repos.len();
        let listed = self.fill_all(caller, repos, false).await?;
        tracing::info!(
            total,
            visible = listed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "listed artefacts"
        );
        Ok(listed)
    }

    /// Artefacts whose name contains `query`, ignoring case and anything
    /// but letters and digits. Latest-build failures are tolerated.
    pub async fn find(
        &self,
        caller: &CallerIdentity,
        query: &str,
    ) -> Result<Vec<Contents>, AssembleError> {
        if caller.user.is_none() {
            return Err(AssembleError::UserRequired("find artefacts"));
        }
        let query = chars_only(query);
        let matching: Vec<RepoEntry> = self
            .registry
            .list_repos()
            .await?
            .into_iter()
            .filter(|e| chars_only(&e.name).contains(&query))
            .collect();
        self.fill_all(caller, matching, true).await
    }

    async fn fill_all(
        &self,
        caller: &CallerIdentity,
        repos: Vec<RepoEntry>,
        tolerate_version_errors: bool,
    ) -> Result<Vec<Contents>, AssembleError> {
        let mut tasks = JoinSet::new();
        for entry in repos {
            let this = self.clone();
            let caller = caller.clone();
            tasks.spawn(async move { this.fill(&caller, entry, tolerate_version_errors).await });
        }

        let mut filled = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let item = joined.map_err(|e| AssembleError::Task(e.to_string()))??;
            filled.extend(item);
        }
        filled.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.domain.cmp(&b.domain)));
        Ok(filled)
    }

    async fn fill(
        &self,
        caller: &CallerIdentity,
        entry: RepoEntry,
        tolerate_version_errors: bool,
    ) -> Result<Option<Contents>, AssembleError> {
        let id = match self.access.authorize(caller, &entry.name, &entry.domain).await {
            Ok(id) => id,
            Err(e) if e.is_denial() => {
                tracing::debug!(artefact = %entry.name, domain = %entry.domain, error = %e, "skipping artefact");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let latest = match self.registry.latest_version(&entry.domain, &entry.name).await {
            Ok(latest) => Some(latest),
            Err(e) if tolerate_version_errors => {
                tracing::debug!(artefact = %entry.name, error = %e, "latest build unavailable");
                None
            }
            Err(e) => return Err(e.into()),
        };
        let version = latest.as_ref().map_or(0, |l| l.build_id);
        let repository = latest
            .as_ref()
            .and_then(|l| l.build_meta.as_ref())
            .and_then(|m| m.repository());

        let origin = Origin {
            domain: entry.domain,
            backend: entry.origin,
            artefact: entry.name,
            id,
            version,
        };
        origin.top_level(repository, is_root(caller)).map(Some)
    }

    /// Numeric build names of artefact `id`, ascending.
    pub async fn builds(
        &self,
        caller: &CallerIdentity,
        id: ArtefactId,
    ) -> Result<Vec<u64>, AssembleError> {
        let identity = self.resolver.identity(id).await?;
        self.access
            .authorize(caller, &identity.name, &identity.domain)
            .await?;
        let names = self
            .registry
            .list_versions(&identity.domain, &identity.name)
            .await?;

        let mut builds = Vec::with_capacity(names.len());
        for build in names.into_iter().filter(|b| b != "latest") {
            let number = build
                .parse::<u64>()
                .map_err(|_| AssembleError::InvalidBuildName {
                    name: identity.name.clone(),
                    build: build.clone(),
                })?;
            builds.push(number);
        }
        builds.sort_unstable();
        Ok(builds)
    }

    /// Directories and files directly inside `dir` of build `build`.
    pub async fn dir_listing(
        &self,
        caller: &CallerIdentity,
        id: ArtefactId,
        build: u64,
        dir: &str,
    ) -> Result<DirListing, AssembleError> {
        let identity = self.resolver.identity(id).await?;
        self.access
            .authorize(caller, &identity.name, &identity.domain)
            .await?;
        let version = self
            .registry
            .resolve_version_of(&identity.domain, &identity.name, build)
            .await?;

        let dir = path::normalize_dir(dir);
        let listing = self
            .registry
            .list_files(
                &identity.domain,
                &ListFilesRequest::flat(identity.name.clone(), version, dir.clone()),
            )
            .await?;

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in listing.into_iter().filter(|e| path::is_direct_child(&dir, &e.dir)) {
            let item = ListingEntry {
                name: entry.name,
                dir: dir.clone(),
            };
            match entry.entry_type {
                EntryType::Directory => dirs.push(item),
                EntryType::File => files.push(item),
                EntryType::Other(_) => {}
            }
        }
        dirs.sort_by(|a, b| a.name.cmp(&b.name));
        files.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(DirListing {
            path: dir,
            artefact_id: identity.id.get(),
            artefact_name: identity.name,
            dirs,
            files,
        })
    }

    /// Whether `filename` exists in build `build` of artefact `id`.
    pub async fn file_exists(
        &self,
        caller: &CallerIdentity,
        id: ArtefactId,
        build: u64,
        filename: &str,
    ) -> Result<bool, AssembleError> {
        let (domain, request) = self.file_request(caller, id, build, filename).await?;
        Ok(self.registry.file_exists(&domain, &request).await?)
    }

    /// Plan a stream of `filename` from build `build` of artefact `id`.
    pub async fn file_stream(
        &self,
        caller: &CallerIdentity,
        id: ArtefactId,
        build: u64,
        filename: &str,
    ) -> Result<FileDownload, AssembleError> {
        let (domain, request) = self.file_request(caller, id, build, filename).await?;
        Ok(FileDownload {
            filename: base_name(&request.filename),
            size: None,
            mime_type: mime_type(&request.filename),
            domain,
            request: request.with_blocksize(STREAM_BLOCKSIZE),
        })
    }

    async fn file_request(
        &self,
        caller: &CallerIdentity,
        id: ArtefactId,
        build: u64,
        filename: &str,
    ) -> Result<(String, FileRequest), AssembleError> {
        let identity = self.resolver.identity(id).await?;
        self.access
            .authorize(caller, &identity.name, &identity.domain)
            .await?;
        let version = self
            .registry
            .resolve_version_of(&identity.domain, &identity.name, build)
            .await?;
        let request = FileRequest::new(identity.name, version, path::relative(filename));
        Ok((identity.domain, request))
    }

    /// Plan a download of the file a File token or legacy download link
    /// addresses. The file size is fetched up front.
    pub async fn download(
        &self,
        caller: &CallerIdentity,
        reference: &str,
    ) -> Result<FileDownload, AssembleError> {
        if caller.user.is_none() {
            return Err(AssembleError::UserRequired("download build-repo files"));
        }

        let (name, domain, version, file) = match parse_reference(reference)? {
            ParsedReference::Token(reference) => {
                if reference.kind() != ReferenceKind::File {
                    return Err(AssembleError::NotDownloadable(reference.kind()));
                }
                self.access
                    .authorize(caller, reference.artefact_name(), reference.domain())
                    .await?;
                let version = self.registry.resolve_version(&reference).await?;
                (
                    reference.artefact_name().to_string(),
                    reference.domain().to_string(),
                    version,
                    reference.full_path(),
                )
            }
            ParsedReference::Link(link) => {
                let file = link.absolute_path();
                if file == "/" {
                    return Err(AssembleError::NotDownloadable(ReferenceKind::Artefact));
                }
                let identity = self.resolver.identity(link.artefact_id()).await?;
                self.access
                    .authorize(caller, &identity.name, &identity.domain)
                    .await?;
                let version = self
                    .registry
                    .resolve_version_of(&identity.domain, &identity.name, link.version())
                    .await?;
                (identity.name, identity.domain, version, file)
            }
        };

        let request = FileRequest::new(name, version, path::relative(&file))
            .with_blocksize(DOWNLOAD_BLOCKSIZE);
        let meta = self.registry.file_meta(&domain, &request).await?;
        Ok(FileDownload {
            filename: base_name(&file),
            size: Some(meta.size),
            mime_type: mime_type(&file),
            domain,
            request,
        })
    }
}

fn is_root(caller: &CallerIdentity) -> bool {
    caller.user.as_ref().is_some_and(|u| u.root)
}

fn base_name(file: &str) -> String {
    file.rsplit('/').next().unwrap_or(file).to_string()
}
