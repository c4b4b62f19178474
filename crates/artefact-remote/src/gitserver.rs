//! Client for the source-control directory.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET    | `gitserver/v1/repos/{id}` | A source repository and its clone URLs |

use artefact_core::RepositoryId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RemoteError;
use crate::http::send_json;

/// One clone URL of a source repository, split into host and path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRepoUrl {
    pub host: String,
    pub path: String,
}

impl SourceRepoUrl {
    /// The URL as artefact identities store it.
    pub fn to_clone_url(&self) -> String {
        format!(
            "https://{}/git/{}",
            self.host,
            self.path.trim_start_matches('/')
        )
    }
}

/// A source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRepo {
    pub id: u64,
    #[serde(default)]
    pub urls: Vec<SourceRepoUrl>,
}

/// Lookup of source repositories by id.
#[async_trait]
pub trait SourceRepoDirectory: Send + Sync {
    async fn repo_by_id(&self, id: RepositoryId) -> Result<SourceRepo, RemoteError>;
}

/// [`SourceRepoDirectory`] over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpGitServerClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpGitServerClient {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl SourceRepoDirectory for HttpGitServerClient {
    async fn repo_by_id(&self, id: RepositoryId) -> Result<SourceRepo, RemoteError> {
        let url = format!("{}gitserver/v1/repos/{id}", self.base_url);
        send_json(&format!("GET gitserver/repos/{id}"), self.http.get(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_url_has_git_prefix() {
        let url = SourceRepoUrl {
            host: "git.example.com".into(),
            path: "/tools/firmware.git".into(),
        };
        assert_eq!(url.to_clone_url(), "https://git.example.com/git/tools/firmware.git");
    }
}
