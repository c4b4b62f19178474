//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps resolver, access, assembly, remote and store errors to HTTP status
//! codes and JSON bodies of the form `{"error": {"code", "message"}}`.
//!
//! Internal errors are logged and replaced with a generic message. Backend
//! failures are rendered by endpoint and status only, so response bodies
//! never carry backend addresses or backend-supplied text.

use artefact_core::CodecError;
use artefact_remote::RemoteError;
use artefact_store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::access::AccessError;
use crate::assembler::AssembleError;
use crate::resolver::ResolveError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "FORBIDDEN").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed reference or missing required field (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No authenticated caller where one is required (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Access denied, cached or live (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Unknown artefact, repository, directory or domain mapping (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Backend metadata needed for the request is missing (412).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Internal error or ambiguity (500). Message is logged, not returned.
    #[error("internal error: {0}")]
    Internal(String),

    /// A backend or the oracle answered with an error (502).
    #[error("bad gateway: {0}")]
    BadGateway(String),

    /// A backend or the oracle could not be reached (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::PreconditionFailed(_) => {
                (StatusCode::PRECONDITION_FAILED, "PRECONDITION_FAILED")
            }
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::BadGateway(_) => (StatusCode::BAD_GATEWAY, "BAD_GATEWAY"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<CodecError> for AppError {
    fn from(err: CodecError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        match &err {
            RemoteError::Api {
                endpoint, status, ..
            } => {
                tracing::warn!(error = %err, "remote call failed");
                if *status == 404 {
                    Self::NotFound(format!("{endpoint}: not found"))
                } else {
                    Self::BadGateway(format!("{endpoint} returned {status}"))
                }
            }
            RemoteError::Http { endpoint, .. } | RemoteError::Task { endpoint, .. } => {
                tracing::warn!(error = %err, "remote unreachable");
                Self::ServiceUnavailable(format!("{endpoint} did not answer"))
            }
            RemoteError::Deserialization { endpoint, .. } => {
                tracing::warn!(error = %err, "remote sent an unreadable response");
                Self::BadGateway(format!("{endpoint} returned an unreadable response"))
            }
            RemoteError::MissingDomain { .. } => Self::BadRequest(err.to_string()),
            RemoteError::NoBackend { .. } => Self::NotFound(err.to_string()),
            RemoteError::Sink { .. } | RemoteError::Config(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound(err.to_string()),
            StoreError::Database(_) | StoreError::Corrupt { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::MissingDomain { .. }
            | ResolveError::MissingName
            | ResolveError::MissingField(_)
            | ResolveError::InvalidCombination { .. } => Self::BadRequest(err.to_string()),
            ResolveError::NoArtefactForRepository(_) => Self::NotFound(err.to_string()),
            ResolveError::RepositoryUnavailable { .. } => {
                Self::ServiceUnavailable(err.to_string())
            }
            ResolveError::Ambiguous { .. } => Self::Internal(err.to_string()),
            ResolveError::Store(e) => e.into(),
            ResolveError::Remote(e) => e.into(),
        }
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::MissingDomain { .. } => Self::BadRequest(err.to_string()),
            AccessError::Unauthenticated { .. } => Self::Unauthorized(err.to_string()),
            AccessError::Denied { .. } => Self::Forbidden(err.to_string()),
            AccessError::Resolve(e) => e.into(),
            AccessError::Oracle(e) => e.into(),
        }
    }
}

impl From<AssembleError> for AppError {
    fn from(err: AssembleError) -> Self {
        match err {
            AssembleError::Codec(e) => e.into(),
            AssembleError::NotBrowsable | AssembleError::NotDownloadable(_) => {
                Self::BadRequest(err.to_string())
            }
            AssembleError::UserRequired(_) => Self::Unauthorized(err.to_string()),
            AssembleError::MissingBuildMeta { .. } => Self::PreconditionFailed(err.to_string()),
            AssembleError::DirectoryNotFound { .. } => Self::NotFound(err.to_string()),
            AssembleError::InvalidBuildName { .. } => Self::BadGateway(err.to_string()),
            AssembleError::Task(_) => Self::Internal(err.to_string()),
            AssembleError::Access(e) => e.into(),
            AssembleError::Resolve(e) => e.into(),
            AssembleError::Remote(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artefact_core::{ArtefactId, RepositoryId};
    use http_body_util::BodyExt;

    async fn response_parts(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (
                AppError::PreconditionFailed("x".into()),
                StatusCode::PRECONDITION_FAILED,
                "PRECONDITION_FAILED",
            ),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            (AppError::BadGateway("x".into()), StatusCode::BAD_GATEWAY, "BAD_GATEWAY"),
            (
                AppError::ServiceUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_and_code(), (status, code));
        }
    }

    #[tokio::test]
    async fn internal_message_is_hidden() {
        let (status, body) = response_parts(AppError::Internal("db password wrong".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "An internal error occurred");
        assert!(body["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn backend_error_body_is_not_forwarded() {
        let err = RemoteError::Api {
            endpoint: "POST files/list".into(),
            status: 500,
            body: "panic at buildrepo.internal:5005".into(),
        };
        let (status, body) = response_parts(err.into()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("POST files/list returned 500"));
        assert!(!message.contains("buildrepo.internal"));
    }

    #[test]
    fn remote_not_found_maps_to_404() {
        let err = RemoteError::Api {
            endpoint: "POST files/list".into(),
            status: 404,
            body: String::new(),
        };
        assert_eq!(AppError::from(err).status_and_code().0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn access_errors_map_by_class() {
        let denied = AccessError::Denied {
            name: "firmware".into(),
            id: ArtefactId::new(4),
            cached: true,
        };
        let app = AppError::from(denied);
        assert_eq!(app.status_and_code().0, StatusCode::FORBIDDEN);
        assert!(app.to_string().contains("firmware (#4)"));

        let unauthenticated = AccessError::Unauthenticated {
            name: "firmware".into(),
        };
        assert_eq!(
            AppError::from(unauthenticated).status_and_code().0,
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn ambiguity_is_internal() {
        let err = ResolveError::Ambiguous {
            repository: RepositoryId::new(3),
            first: ArtefactId::new(1),
            second: ArtefactId::new(2),
        };
        assert_eq!(
            AppError::from(err).status_and_code().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_build_meta_is_a_failed_precondition() {
        let err = AssembleError::MissingBuildMeta {
            name: "firmware".into(),
        };
        assert_eq!(
            AppError::from(err).status_and_code().0,
            StatusCode::PRECONDITION_FAILED
        );
    }

    #[test]
    fn codec_errors_are_bad_requests() {
        let err = AssembleError::Codec(CodecError::Missing);
        assert_eq!(AppError::from(err).status_and_code().0, StatusCode::BAD_REQUEST);
    }
}
