//! # Repository Lookups
//!
//! Reverse mapping from a source repository id to the artefact built from it.

use artefact_core::RepositoryId;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::routes::ArtefactInfo;
use crate::state::AppState;

/// The artefact built from a repository.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ArtefactOfRepository {
    pub repository_id: u64,
    pub artefact_id: u64,
    pub artefact: ArtefactInfo,
}

/// Build the repositories router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/repositories/:id/artefact", get(artefact_of_repository))
}

/// GET /v1/repositories/:id/artefact
#[utoipa::path(
    get,
    path = "/v1/repositories/{id}/artefact",
    params(("id" = u64, Path, description = "Source repository ID")),
    responses(
        (status = 200, description = "Artefact built from the repository", body = ArtefactOfRepository),
        (status = 404, description = "No artefact is built from the repository", body = crate::error::ErrorBody),
        (status = 500, description = "More than one artefact matches", body = crate::error::ErrorBody),
    ),
    tag = "repositories"
)]
pub(crate) async fn artefact_of_repository(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ArtefactOfRepository>, AppError> {
    let artefact_id = state
        .resolver
        .artefact_for_repository(RepositoryId::new(id))
        .await?;
    let identity = state.resolver.identity(artefact_id).await?;
    Ok(Json(ArtefactOfRepository {
        repository_id: id,
        artefact_id: artefact_id.get(),
        artefact: identity.into(),
    }))
}
