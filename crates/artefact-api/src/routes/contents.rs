//! # Content Browsing API
//!
//! Browsing by `(name, domain, version)`, by opaque Artefact or Directory
//! token, and by legacy browse link (`/artefacts/artefactid/...`).

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::IntoParams;

use artefact_core::BROWSE_PREFIX;

use crate::assembler::Contents;
use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::extract_query;
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VersionParams {
    pub name: String,
    pub domain: String,
    /// Build number, 0 for the latest build.
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ContentsParams {
    /// Opaque Artefact or Directory token, or a legacy browse link.
    #[serde(rename = "ref")]
    pub reference: String,
}

/// Build the contents router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/versions", get(repo_version))
        .route("/v1/contents", get(contents))
        .route("/artefacts/*path", get(legacy_browse))
}

/// GET /v1/versions: top level of one build of a named artefact.
#[utoipa::path(
    get,
    path = "/v1/versions",
    params(VersionParams),
    responses(
        (status = 200, description = "Top-level contents of the build", body = Contents),
        (status = 400, description = "Missing domain", body = crate::error::ErrorBody),
        (status = 403, description = "Access denied", body = crate::error::ErrorBody),
    ),
    tag = "contents"
)]
pub(crate) async fn repo_version(
    State(state): State<AppState>,
    caller: CallerIdentity,
    params: Result<Query<VersionParams>, QueryRejection>,
) -> Result<Json<Contents>, AppError> {
    let params = extract_query(params)?;
    let contents = state
        .assembler
        .repo_version(&caller, &params.name, &params.domain, params.version)
        .await?;
    Ok(Json(contents))
}

/// GET /v1/contents: whatever a token or legacy browse link addresses.
#[utoipa::path(
    get,
    path = "/v1/contents",
    params(ContentsParams),
    responses(
        (status = 200, description = "Artefact or directory contents", body = Contents),
        (status = 400, description = "Malformed reference or a file token", body = crate::error::ErrorBody),
        (status = 403, description = "Access denied", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown directory", body = crate::error::ErrorBody),
        (status = 412, description = "Build metadata missing", body = crate::error::ErrorBody),
    ),
    tag = "contents"
)]
pub(crate) async fn contents(
    State(state): State<AppState>,
    caller: CallerIdentity,
    params: Result<Query<ContentsParams>, QueryRejection>,
) -> Result<Json<Contents>, AppError> {
    let params = extract_query(params)?;
    let contents = state.assembler.contents(&caller, &params.reference).await?;
    Ok(Json(contents))
}

/// GET /artefacts/artefactid/{id}/version/{n}/{path}: legacy browse link.
#[utoipa::path(
    get,
    path = "/artefacts/{path}",
    params(("path" = String, Path, description = "`artefactid/{id}/version/{n or latest}/{directory}`")),
    responses(
        (status = 200, description = "Artefact or directory contents", body = Contents),
        (status = 400, description = "Malformed link", body = crate::error::ErrorBody),
        (status = 403, description = "Access denied", body = crate::error::ErrorBody),
    ),
    tag = "contents"
)]
pub(crate) async fn legacy_browse(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(path): Path<String>,
) -> Result<Json<Contents>, AppError> {
    let link = format!("{BROWSE_PREFIX}{path}");
    let contents = state.assembler.contents(&caller, &link).await?;
    Ok(Json(contents))
}
