//! Remote client error types.
//!
//! Transport errors are stored with their URL removed. Endpoint labels name
//! the operation only, so an error rendered to a client never reveals where
//! a backend lives.

/// Errors from calls to backends, the oracle or the source-control directory.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The remote returned a non-2xx status.
    #[error("{endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: reqwest::Error,
    },
    /// A backend-routed call was made without a domain.
    #[error("missing domain for artefact {artefact:?}")]
    MissingDomain { artefact: String },
    /// No backend serves the requested domain.
    #[error("no backend for domain {domain:?} (artefact {artefact:?})")]
    NoBackend { domain: String, artefact: String },
    /// Writing streamed file content to the caller's sink failed.
    #[error("failed to write {file} to sink: {source}")]
    Sink {
        file: String,
        source: std::io::Error,
    },
    /// A fan-out task panicked or was cancelled.
    #[error("{endpoint} task failed: {reason}")]
    Task { endpoint: String, reason: String },
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl RemoteError {
    pub(crate) fn http(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            endpoint: endpoint.into(),
            source: source.without_url(),
        }
    }

    pub(crate) fn deserialization(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Deserialization {
            endpoint: endpoint.into(),
            source: source.without_url(),
        }
    }

    /// True if the remote reported that the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// True if the error came from reaching the remote at all (transport
    /// failure or 5xx), as opposed to the remote rejecting the request.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Task { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
