//! # artefact-api - Artefact Catalog Service
//!
//! Gives every build artefact held by the build-repo backends a stable
//! numeric identity, decides who may see it, and assembles listings and
//! downloads addressed by opaque reference tokens or legacy links.
//!
//! ## Components
//!
//! | Module          | Role                                                    |
//! |-----------------|---------------------------------------------------------|
//! | [`resolver`]    | `(domain, name)` ↔ artefact id ↔ repository id, cached  |
//! | [`access`]      | layered authorization with a permission cache           |
//! | [`assembler`]   | listings, directory trees and download plans            |
//! | [`cache`]       | bounded TTL caches                                      |
//! | [`lock`]        | resolution lock, global or per name                     |
//!
//! ## API Surface
//!
//! | Prefix                  | Module                       |
//! |-------------------------|------------------------------|
//! | `/v1/artefacts/*`       | [`routes::artefacts`]        |
//! | `/v1/repositories/*`    | [`routes::repositories`]     |
//! | `/v1/versions`, `/v1/contents`, `/artefacts/*` | [`routes::contents`] |
//! | `/v1/download`, `/builds/downloads/*` | [`routes::downloads`] |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → AuthMiddleware → Handler
//! ```
//!
//! ## OpenAPI
//!
//! Generated via utoipa derive macros, served at `/openapi.json`.

pub mod access;
pub mod assembler;
pub mod auth;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod error;
pub mod extractors;
pub mod lock;
pub mod openapi;
pub mod resolver;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) are mounted outside the auth middleware
/// so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    let api = Router::new()
        .merge(routes::artefacts::router())
        .merge(routes::repositories::router())
        .merge(routes::contents::router())
        .merge(routes::downloads::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state);

    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    Router::new().merge(health).merge(api)
}

/// Liveness probe: 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 once state is built, which happens before binding.
async fn readiness() -> &'static str {
    "ready"
}
