//! Client for a single build-repo backend.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET    | `manager-info` | Domain served by the backend |
//! | GET    | `repos` | Repositories on the backend |
//! | POST   | `files/list` | File listing of a build |
//! | POST   | `files/stream` | Raw file content |
//! | POST   | `files/meta` | File size |
//! | POST   | `files/exists` | File existence |
//! | POST   | `versions/latest` | Latest build and its metadata |
//! | POST   | `versions/list` | Build names |
//! | POST   | `repository/meta` | Source repository of an artefact |
//!
//! Callers normally go through [`crate::BackendRegistry`], which routes each
//! call to the backend serving the artefact's domain.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

use crate::error::RemoteError;
use crate::http::{send, send_json};
use crate::types::{
    BackendRepoEntry, FileEntry, FileExists, FileList, FileMeta, FileRequest, LatestVersion,
    ListFilesRequest, ManagerInfo, RepoList, RepositoryMeta, RepositoryMetaRequest,
    VersionList, VersionRequest,
};

/// Operations offered by a build-repo backend.
#[async_trait]
pub trait BuildRepoClient: Send + Sync {
    async fn manager_info(&self) -> Result<ManagerInfo, RemoteError>;

    async fn list_repos(&self) -> Result<Vec<BackendRepoEntry>, RemoteError>;

    async fn list_files(&self, req: &ListFilesRequest) -> Result<Vec<FileEntry>, RemoteError>;

    /// Copy a file into `sink` until the backend ends the stream. Returns the
    /// number of bytes written.
    async fn get_file(
        &self,
        req: &FileRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, RemoteError>;

    async fn file_meta(&self, req: &FileRequest) -> Result<FileMeta, RemoteError>;

    async fn file_exists(&self, req: &FileRequest) -> Result<bool, RemoteError>;

    async fn latest_version(&self, req: &VersionRequest) -> Result<LatestVersion, RemoteError>;

    /// Build names of a repository, as the backend stores them. Includes
    /// the `latest` alias.
    async fn list_versions(&self, req: &VersionRequest) -> Result<Vec<String>, RemoteError>;

    async fn repository_meta(&self, path: &str) -> Result<RepositoryMeta, RemoteError>;
}

/// [`BuildRepoClient`] over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpBuildRepoClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpBuildRepoClient {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl BuildRepoClient for HttpBuildRepoClient {
    async fn manager_info(&self) -> Result<ManagerInfo, RemoteError> {
        send_json("GET manager-info", self.http.get(self.url("manager-info"))).await
    }

    async fn list_repos(&self) -> Result<Vec<BackendRepoEntry>, RemoteError> {
        let list: RepoList = send_json("GET repos", self.http.get(self.url("repos"))).await?;
        Ok(list.entries)
    }

    async fn list_files(&self, req: &ListFilesRequest) -> Result<Vec<FileEntry>, RemoteError> {
        let list: FileList = send_json(
            "POST files/list",
            self.http.post(self.url("files/list")).json(req),
        )
        .await?;
        Ok(list.entries)
    }

    async fn get_file(
        &self,
        req: &FileRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, RemoteError> {
        let endpoint = "POST files/stream";
        let mut resp = send(endpoint, self.http.post(self.url("files/stream")).json(req)).await?;

        let mut written = 0u64;
        while let Some(block) = resp
            .chunk()
            .await
            .map_err(|e| RemoteError::http(endpoint, e))?
        {
            sink.write_all(&block).await.map_err(|source| RemoteError::Sink {
                file: req.filename.clone(),
                source,
            })?;
            written += block.len() as u64;
        }
        sink.flush().await.map_err(|source| RemoteError::Sink {
            file: req.filename.clone(),
            source,
        })?;
        Ok(written)
    }

    async fn file_meta(&self, req: &FileRequest) -> Result<FileMeta, RemoteError> {
        send_json(
            "POST files/meta",
            self.http.post(self.url("files/meta")).json(req),
        )
        .await
    }

    async fn file_exists(&self, req: &FileRequest) -> Result<bool, RemoteError> {
        let exists: FileExists = send_json(
            "POST files/exists",
            self.http.post(self.url("files/exists")).json(req),
        )
        .await?;
        Ok(exists.exists)
    }

    async fn latest_version(&self, req: &VersionRequest) -> Result<LatestVersion, RemoteError> {
        send_json(
            "POST versions/latest",
            self.http.post(self.url("versions/latest")).json(req),
        )
        .await
    }

    async fn list_versions(&self, req: &VersionRequest) -> Result<Vec<String>, RemoteError> {
        let list: VersionList = send_json(
            "POST versions/list",
            self.http.post(self.url("versions/list")).json(req),
        )
        .await?;
        Ok(list.versions)
    }

    async fn repository_meta(&self, path: &str) -> Result<RepositoryMeta, RemoteError> {
        send_json(
            "POST repository/meta",
            self.http
                .post(self.url("repository/meta"))
                .json(&RepositoryMetaRequest { path }),
        )
        .await
    }
}
