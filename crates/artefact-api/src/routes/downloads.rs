//! # File Downloads
//!
//! Downloads by opaque File token (`/v1/download?ref=`) and by legacy
//! download link (`/builds/downloads/...`), plus the streaming plumbing
//! shared with `/v1/artefacts/:id/files/stream`.
//!
//! The backend copy runs in its own task and writes into an in-memory pipe
//! whose read half becomes the response body. If the backend fails after
//! the headers went out, the body ends with an I/O error so the client
//! sees an aborted transfer, never a silently short file.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::io::{AsyncRead, DuplexStream, ReadBuf};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use utoipa::IntoParams;

use artefact_core::DOWNLOAD_PREFIX;

use crate::assembler::FileDownload;
use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::extract_query;
use crate::state::AppState;

/// Capacity of the pipe between the backend copy and the response body.
const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DownloadParams {
    /// Opaque File token.
    #[serde(rename = "ref")]
    pub reference: String,
}

/// Build the downloads router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/download", get(download))
        .route("/builds/downloads/*path", get(legacy_download))
}

/// GET /v1/download: download the file an opaque token addresses.
#[utoipa::path(
    get,
    path = "/v1/download",
    params(DownloadParams),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 400, description = "Malformed token or not a file", body = crate::error::ErrorBody),
        (status = 401, description = "No user account", body = crate::error::ErrorBody),
        (status = 403, description = "Access denied", body = crate::error::ErrorBody),
    ),
    tag = "downloads"
)]
pub(crate) async fn download(
    State(state): State<AppState>,
    caller: CallerIdentity,
    params: Result<Query<DownloadParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let params = extract_query(params)?;
    let plan = state.assembler.download(&caller, &params.reference).await?;
    stream_file(&state, plan)
}

/// GET /builds/downloads/artefactid/{id}/version/{n}/{path}: legacy download link.
#[utoipa::path(
    get,
    path = "/builds/downloads/{path}",
    params(("path" = String, Path, description = "`artefactid/{id}/version/{n or latest}/{file path}`")),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 400, description = "Malformed link", body = crate::error::ErrorBody),
        (status = 403, description = "Access denied", body = crate::error::ErrorBody),
    ),
    tag = "downloads"
)]
pub(crate) async fn legacy_download(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let link = format!("{DOWNLOAD_PREFIX}{path}");
    let plan = state.assembler.download(&caller, &link).await?;
    stream_file(&state, plan)
}

/// Start copying the planned file from its backend and return a response
/// whose body follows the copy.
pub(crate) fn stream_file(state: &AppState, plan: FileDownload) -> Result<Response, AppError> {
    let FileDownload {
        filename,
        size,
        mime_type,
        domain,
        request,
    } = plan;

    let (mut writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let registry = Arc::clone(&state.registry);
    tokio::spawn(async move {
        let outcome = registry.get_file(&domain, &request, &mut writer).await;
        match &outcome {
            Ok(bytes) => tracing::debug!(
                artefact = %request.repository,
                file = %request.filename,
                bytes,
                "file streamed"
            ),
            Err(e) => tracing::warn!(
                artefact = %request.repository,
                file = %request.filename,
                error = %e,
                "file stream aborted"
            ),
        }
        // Dropping the writer lets the reader drain before the outcome is read.
        drop(writer);
        let _ = outcome_tx.send(outcome.map_err(|e| e.to_string()));
    });

    let body = Body::from_stream(ReaderStream::new(CheckedReader {
        inner: reader,
        outcome: Some(outcome_rx),
    }));

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, mime_type)
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename.replace('"', "")),
        );
    if let Some(size) = size {
        response = response.header(CONTENT_LENGTH, size);
    }
    response
        .body(body)
        .map_err(|e| AppError::Internal(format!("building download response: {e}")))
}

/// Read half of the download pipe. At end of data it reports the copy
/// task's outcome, turning a backend failure into a read error.
struct CheckedReader {
    inner: DuplexStream,
    outcome: Option<oneshot::Receiver<Result<u64, String>>>,
}

impl AsyncRead for CheckedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        match Pin::new(&mut self.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) if buf.filled().len() == before => {}
            other => return other,
        }

        let Some(outcome) = self.outcome.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let result = match Pin::new(outcome).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(Ok(_))) => Ok(()),
            Poll::Ready(Ok(Err(message))) => Err(io::Error::other(message)),
            Poll::Ready(Err(_)) => Err(io::Error::other("file stream task ended unexpectedly")),
        };
        self.outcome = None;
        Poll::Ready(result)
    }
}
