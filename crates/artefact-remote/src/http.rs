//! Request plumbing shared by the HTTP clients. No retries: every call is
//! attempted exactly once and failures propagate to the caller.

use serde::de::DeserializeOwned;

use crate::error::RemoteError;

/// Send a request and turn non-2xx responses into [`RemoteError::Api`].
pub(crate) async fn send(
    endpoint: &str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, RemoteError> {
    let resp = request
        .send()
        .await
        .map_err(|e| RemoteError::http(endpoint, e))?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(RemoteError::Api {
            endpoint: endpoint.to_string(),
            status,
            body,
        });
    }
    Ok(resp)
}

/// Send a request and deserialize a JSON response.
pub(crate) async fn send_json<T: DeserializeOwned>(
    endpoint: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, RemoteError> {
    send(endpoint, request)
        .await?
        .json()
        .await
        .map_err(|e| RemoteError::deserialization(endpoint, e))
}

/// Shared HTTP client for all remote collaborators.
pub(crate) fn build_client(
    timeout_secs: u64,
    token: Option<&str>,
) -> Result<reqwest::Client, RemoteError> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(token) = token {
        let mut value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| crate::config::ConfigError::InvalidToken)?;
        value.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, value);
    }
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .default_headers(headers)
        .build()
        .map_err(|e| RemoteError::http("client_init", e))
}
