//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Artefact Catalog API",
        version = "0.1.0",
        description = "Catalog of build artefacts held by federated build-repo backends: stable identities, access-checked browsing by opaque reference or legacy link, and file downloads.",
        license(name = "AGPL-3.0-or-later")
    ),
    paths(
        // Artefacts
        crate::routes::artefacts::list_artefacts,
        crate::routes::artefacts::create_artefact,
        crate::routes::artefacts::find_artefacts,
        crate::routes::artefacts::get_artefact,
        crate::routes::artefacts::get_meta,
        crate::routes::artefacts::list_builds,
        crate::routes::artefacts::dir_listing,
        crate::routes::artefacts::file_exists,
        crate::routes::artefacts::file_stream,
        crate::routes::artefacts::repository_of_artefact,
        // Repositories
        crate::routes::repositories::artefact_of_repository,
        // Contents
        crate::routes::contents::repo_version,
        crate::routes::contents::contents,
        crate::routes::contents::legacy_browse,
        // Downloads
        crate::routes::downloads::download,
        crate::routes::downloads::legacy_download,
    ),
    components(schemas(
        crate::assembler::Contents,
        crate::assembler::ContentKind,
        crate::assembler::DirListing,
        crate::assembler::ListingEntry,
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::ArtefactInfo,
        crate::routes::artefacts::ArtefactList,
        crate::routes::artefacts::CreateArtefactRequest,
        crate::routes::artefacts::CreateArtefactResponse,
        crate::routes::artefacts::ArtefactMeta,
        crate::routes::artefacts::BuildList,
        crate::routes::artefacts::FileExists,
        crate::routes::artefacts::RepositoryOfArtefact,
        crate::routes::repositories::ArtefactOfRepository,
    )),
    tags(
        (name = "artefacts", description = "Catalog listing, identities, builds and files by artefact id"),
        (name = "repositories", description = "Source repository to artefact mapping"),
        (name = "contents", description = "Browsing by reference or legacy link"),
        (name = "downloads", description = "File downloads by reference or legacy link"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
///
/// Serves the OpenAPI JSON spec at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
