//! Client for the authorization oracle.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `objectauth/v1/access` | Permissions of a user on one object |
//! | POST   | `objectauth/v1/service-access` | Blanket access of a service to an object type |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RemoteError;
use crate::http::send_json;

const API_PREFIX: &str = "objectauth/v1";

/// Object types the oracle knows about. Only artefacts are used here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    Artefact,
}

/// Permissions a user holds on one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub view: bool,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub execute: bool,
    #[serde(default)]
    pub submit: bool,
}

impl Permissions {
    /// Reading artefact content needs both view and read.
    pub fn can_view_and_read(&self) -> bool {
        self.view && self.read
    }
}

#[derive(Debug, Serialize)]
struct ObjectAccessRequest<'a> {
    user_id: &'a str,
    object_type: ObjectType,
    object_id: u64,
}

#[derive(Debug, Serialize)]
struct ServiceAccessRequest<'a> {
    service_id: &'a str,
    object_type: ObjectType,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceAccess {
    #[serde(default)]
    read_access: bool,
}

/// The questions access control asks the oracle.
#[async_trait]
pub trait AuthorizationOracle: Send + Sync {
    /// Permissions of `user_id` on object `object_id`.
    async fn ask_object_access(
        &self,
        user_id: &str,
        object_type: ObjectType,
        object_id: u64,
    ) -> Result<Permissions, RemoteError>;

    /// Whether `service_id` may read every object of `object_type`.
    async fn allow_all_service_access(
        &self,
        service_id: &str,
        object_type: ObjectType,
    ) -> Result<bool, RemoteError>;
}

/// [`AuthorizationOracle`] over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpObjectAuthClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpObjectAuthClient {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl AuthorizationOracle for HttpObjectAuthClient {
    async fn ask_object_access(
        &self,
        user_id: &str,
        object_type: ObjectType,
        object_id: u64,
    ) -> Result<Permissions, RemoteError> {
        let url = format!("{}{API_PREFIX}/access", self.base_url);
        send_json(
            "POST objectauth/access",
            self.http.post(url).json(&ObjectAccessRequest {
                user_id,
                object_type,
                object_id,
            }),
        )
        .await
    }

    async fn allow_all_service_access(
        &self,
        service_id: &str,
        object_type: ObjectType,
    ) -> Result<bool, RemoteError> {
        let url = format!("{}{API_PREFIX}/service-access", self.base_url);
        let access: ServiceAccess = send_json(
            "POST objectauth/service-access",
            self.http.post(url).json(&ServiceAccessRequest {
                service_id,
                object_type,
            }),
        )
        .await?;
        Ok(access.read_access)
    }
}
