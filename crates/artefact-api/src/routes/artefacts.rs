//! # Artefact Operations API
//!
//! Catalog-wide listing and search, identity creation, and per-artefact
//! lookups keyed by the numeric artefact id: metadata, builds, directory
//! listings, file existence and file streaming.

use artefact_core::ArtefactId;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::assembler::{Contents, DirListing};
use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query};
use crate::routes::downloads::stream_file;
use crate::routes::ArtefactInfo;
use crate::state::AppState;

/// Every artefact visible to the caller.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ArtefactList {
    pub artefacts: Vec<Contents>,
}

/// Request to register an artefact identity.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateArtefactRequest {
    pub name: String,
    pub domain: String,
    /// Source-control clone URL of the artefact's repository.
    #[serde(default)]
    pub url: String,
    /// Owning organisation. Required, not stored.
    #[serde(default)]
    pub org_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateArtefactResponse {
    /// False when the identity already existed.
    pub created: bool,
    pub artefact_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<u64>,
}

/// Identity plus source repository.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ArtefactMeta {
    pub artefact: ArtefactInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BuildList {
    pub builds: Vec<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileExists {
    pub exists: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RepositoryOfArtefact {
    pub artefact_id: u64,
    pub repository_id: u64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FindParams {
    /// Fragment of the artefact name; case and punctuation are ignored.
    pub name: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DirParams {
    /// Build number, 0 for the latest build.
    #[serde(default)]
    pub build: u64,
    /// Directory inside the build; defaults to the root.
    #[serde(default)]
    pub dir: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FileParams {
    /// Build number, 0 for the latest build.
    #[serde(default)]
    pub build: u64,
    pub filename: String,
}

/// Build the artefacts router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/artefacts", get(list_artefacts).post(create_artefact))
        .route("/v1/artefacts/find", get(find_artefacts))
        .route("/v1/artefacts/:id", get(get_artefact))
        .route("/v1/artefacts/:id/meta", get(get_meta))
        .route("/v1/artefacts/:id/builds", get(list_builds))
        .route("/v1/artefacts/:id/dir", get(dir_listing))
        .route("/v1/artefacts/:id/files/exists", get(file_exists))
        .route("/v1/artefacts/:id/files/stream", get(file_stream))
        .route("/v1/artefacts/:id/repository", get(repository_of_artefact))
}

/// GET /v1/artefacts: every artefact the caller may read.
#[utoipa::path(
    get,
    path = "/v1/artefacts",
    responses(
        (status = 200, description = "Visible artefacts with their latest build", body = ArtefactList),
        (status = 401, description = "No user account", body = crate::error::ErrorBody),
    ),
    tag = "artefacts"
)]
pub(crate) async fn list_artefacts(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<ArtefactList>, AppError> {
    let artefacts = state.assembler.list(&caller).await?;
    Ok(Json(ArtefactList { artefacts }))
}

/// POST /v1/artefacts: register an artefact identity if it does not exist.
#[utoipa::path(
    post,
    path = "/v1/artefacts",
    request_body = CreateArtefactRequest,
    responses(
        (status = 201, description = "Identity created", body = CreateArtefactResponse),
        (status = 200, description = "Identity already existed", body = CreateArtefactResponse),
        (status = 400, description = "Missing field or rejected domain/url", body = crate::error::ErrorBody),
        (status = 401, description = "Anonymous caller", body = crate::error::ErrorBody),
    ),
    tag = "artefacts"
)]
pub(crate) async fn create_artefact(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateArtefactRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateArtefactResponse>), AppError> {
    if caller.is_anonymous() {
        return Err(AppError::Unauthorized(
            "a user or service identity is required to create artefacts".into(),
        ));
    }
    let req = extract_json(body)?;
    let outcome = state
        .resolver
        .create_if_required(req.name.trim(), req.domain.trim(), req.url.trim(), req.org_id.trim())
        .await?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(CreateArtefactResponse {
            created: outcome.created,
            artefact_id: outcome.identity.id.get(),
            repository_id: outcome.repository.map(|r| r.get()),
        }),
    ))
}

/// GET /v1/artefacts/find: artefacts whose name contains a fragment.
#[utoipa::path(
    get,
    path = "/v1/artefacts/find",
    params(FindParams),
    responses(
        (status = 200, description = "Matching artefacts", body = ArtefactList),
        (status = 401, description = "No user account", body = crate::error::ErrorBody),
    ),
    tag = "artefacts"
)]
pub(crate) async fn find_artefacts(
    State(state): State<AppState>,
    caller: CallerIdentity,
    params: Result<Query<FindParams>, QueryRejection>,
) -> Result<Json<ArtefactList>, AppError> {
    let params = extract_query(params)?;
    let artefacts = state.assembler.find(&caller, &params.name).await?;
    Ok(Json(ArtefactList { artefacts }))
}

/// GET /v1/artefacts/:id: the stored identity.
#[utoipa::path(
    get,
    path = "/v1/artefacts/{id}",
    params(("id" = u64, Path, description = "Artefact ID")),
    responses(
        (status = 200, description = "Artefact identity", body = ArtefactInfo),
        (status = 404, description = "Unknown artefact", body = crate::error::ErrorBody),
    ),
    tag = "artefacts"
)]
pub(crate) async fn get_artefact(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ArtefactInfo>, AppError> {
    let identity = state.resolver.identity(ArtefactId::new(id)).await?;
    Ok(Json(identity.into()))
}

/// GET /v1/artefacts/:id/meta: identity plus source repository.
#[utoipa::path(
    get,
    path = "/v1/artefacts/{id}/meta",
    params(("id" = u64, Path, description = "Artefact ID")),
    responses(
        (status = 200, description = "Artefact metadata", body = ArtefactMeta),
        (status = 404, description = "Unknown artefact", body = crate::error::ErrorBody),
    ),
    tag = "artefacts"
)]
pub(crate) async fn get_meta(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ArtefactMeta>, AppError> {
    let (identity, repository) = state.resolver.meta(ArtefactId::new(id)).await?;
    Ok(Json(ArtefactMeta {
        artefact: identity.into(),
        repository_id: repository.map(|r| r.get()),
    }))
}

/// GET /v1/artefacts/:id/builds: build numbers, ascending.
#[utoipa::path(
    get,
    path = "/v1/artefacts/{id}/builds",
    params(("id" = u64, Path, description = "Artefact ID")),
    responses(
        (status = 200, description = "Build numbers", body = BuildList),
        (status = 403, description = "Access denied", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown artefact", body = crate::error::ErrorBody),
    ),
    tag = "artefacts"
)]
pub(crate) async fn list_builds(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<u64>,
) -> Result<Json<BuildList>, AppError> {
    let builds = state.assembler.builds(&caller, ArtefactId::new(id)).await?;
    Ok(Json(BuildList { builds }))
}

/// GET /v1/artefacts/:id/dir: one directory of one build.
#[utoipa::path(
    get,
    path = "/v1/artefacts/{id}/dir",
    params(("id" = u64, Path, description = "Artefact ID"), DirParams),
    responses(
        (status = 200, description = "Directory listing", body = DirListing),
        (status = 403, description = "Access denied", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown artefact or directory", body = crate::error::ErrorBody),
    ),
    tag = "artefacts"
)]
pub(crate) async fn dir_listing(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<u64>,
    params: Result<Query<DirParams>, QueryRejection>,
) -> Result<Json<DirListing>, AppError> {
    let params = extract_query(params)?;
    let listing = state
        .assembler
        .dir_listing(&caller, ArtefactId::new(id), params.build, &params.dir)
        .await?;
    Ok(Json(listing))
}

/// GET /v1/artefacts/:id/files/exists: whether a file is part of a build.
#[utoipa::path(
    get,
    path = "/v1/artefacts/{id}/files/exists",
    params(("id" = u64, Path, description = "Artefact ID"), FileParams),
    responses(
        (status = 200, description = "Existence flag", body = FileExists),
        (status = 403, description = "Access denied", body = crate::error::ErrorBody),
    ),
    tag = "artefacts"
)]
pub(crate) async fn file_exists(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<u64>,
    params: Result<Query<FileParams>, QueryRejection>,
) -> Result<Json<FileExists>, AppError> {
    let params = extract_query(params)?;
    let exists = state
        .assembler
        .file_exists(&caller, ArtefactId::new(id), params.build, &params.filename)
        .await?;
    Ok(Json(FileExists { exists }))
}

/// GET /v1/artefacts/:id/files/stream: raw file content.
#[utoipa::path(
    get,
    path = "/v1/artefacts/{id}/files/stream",
    params(("id" = u64, Path, description = "Artefact ID"), FileParams),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 403, description = "Access denied", body = crate::error::ErrorBody),
    ),
    tag = "artefacts"
)]
pub(crate) async fn file_stream(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<u64>,
    params: Result<Query<FileParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let params = extract_query(params)?;
    let download = state
        .assembler
        .file_stream(&caller, ArtefactId::new(id), params.build, &params.filename)
        .await?;
    stream_file(&state, download)
}

/// GET /v1/artefacts/:id/repository: source repository of an artefact.
#[utoipa::path(
    get,
    path = "/v1/artefacts/{id}/repository",
    params(("id" = u64, Path, description = "Artefact ID")),
    responses(
        (status = 200, description = "Repository of the artefact", body = RepositoryOfArtefact),
        (status = 404, description = "Unknown artefact", body = crate::error::ErrorBody),
        (status = 503, description = "Repository not determinable", body = crate::error::ErrorBody),
    ),
    tag = "artefacts"
)]
pub(crate) async fn repository_of_artefact(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<RepositoryOfArtefact>, AppError> {
    let repository = state
        .resolver
        .repository_for_artefact(ArtefactId::new(id))
        .await?;
    Ok(Json(RepositoryOfArtefact {
        artefact_id: id,
        repository_id: repository.get(),
    }))
}
