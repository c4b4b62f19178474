//! # Caller Identity & Proxy Authentication
//!
//! The service sits behind a fronting proxy that has already authenticated
//! the end user and the calling service. The proxy passes that identity in
//! headers:
//!
//! | Header | Meaning |
//! |--------|---------|
//! | `x-user-id` | authenticated user id |
//! | `x-user-email` | the user's email, informational |
//! | `x-user-root` | `true` if the user is root-equivalent |
//! | `x-service-id` | id of the calling service |
//!
//! When `AUTH_TOKEN` is configured the proxy must also present it as a
//! Bearer token; requests without it never reach a handler. Without a
//! token configured the headers are trusted as-is (development mode).
//!
//! Every request that passes gets a [`CallerIdentity`] in its extensions,
//! possibly anonymous. Handlers and [`crate::access::AccessControl`] decide
//! what an anonymous caller may do.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{AppError, ErrorBody, ErrorDetail};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROOT_HEADER: &str = "x-user-root";
pub const SERVICE_ID_HEADER: &str = "x-service-id";

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// An authenticated end user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    pub email: Option<String>,
    /// Root-equivalent users may bypass per-artefact checks.
    pub root: bool,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            root: false,
        }
    }

    pub fn root(mut self) -> Self {
        self.root = true;
        self
    }
}

/// Who is calling: an end user, a service acting on its own behalf, both,
/// or neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user: Option<UserIdentity>,
    pub service_id: Option<String>,
}

impl CallerIdentity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user: UserIdentity) -> Self {
        Self {
            user: Some(user),
            service_id: None,
        }
    }

    pub fn service(service_id: impl Into<String>) -> Self {
        Self {
            user: None,
            service_id: Some(service_id.into()),
        }
    }

    pub fn with_service(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }

    /// Read the identity headers set by the fronting proxy.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let user = text(USER_ID_HEADER).map(|id| UserIdentity {
            id,
            email: text(USER_EMAIL_HEADER),
            root: text(USER_ROOT_HEADER)
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
        });
        Self {
            user,
            service_id: text(SERVICE_ID_HEADER),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user.is_none() && self.service_id.is_none()
    }

    /// The authenticated user, or 401.
    pub fn require_user(&self, operation: &str) -> Result<&UserIdentity, AppError> {
        self.user
            .as_ref()
            .ok_or_else(|| AppError::Unauthorized(format!("user account required for {operation}")))
    }
}

/// Axum `FromRequestParts` implementation for `CallerIdentity`.
///
/// Returns 401 if the auth middleware did not run.
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// A shared secret, wiped from memory on drop.
#[derive(Clone)]
pub struct SecretToken(Zeroizing<String>);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Zeroizing::new(token.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Auth configuration injected into request extensions.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token: Option<SecretToken>,
}

/// Constant-time comparison of bearer tokens.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Check the proxy's Bearer token, if one is configured, and inject the
/// caller identity read from the proxy headers.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let config = request.extensions().get::<AuthConfig>().cloned();

    if let Some(AuthConfig {
        token: Some(expected),
    }) = config
    {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        match auth_header {
            Some(value) if value.starts_with("Bearer ") => {
                if !constant_time_token_eq(&value[7..], expected.expose()) {
                    tracing::warn!("authentication failed: invalid bearer token");
                    return unauthorized_response("invalid bearer token");
                }
            }
            Some(_) => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                return unauthorized_response("authorization header must use Bearer scheme");
            }
            None => {
                tracing::warn!("authentication failed: missing authorization header");
                return unauthorized_response("missing authorization header");
            }
        }
    }

    let identity = CallerIdentity::from_headers(request.headers());
    request.extensions_mut().insert(identity);
    next.run(request).await
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn whoami(caller: CallerIdentity) -> String {
        format!(
            "user={} root={} service={}",
            caller.user.as_ref().map_or("-", |u| u.id.as_str()),
            caller.user.as_ref().is_some_and(|u| u.root),
            caller.service_id.as_deref().unwrap_or("-"),
        )
    }

    fn test_app(token: Option<&str>) -> Router {
        let auth_config = AuthConfig {
            token: token.map(SecretToken::new),
        };
        Router::new()
            .route("/test", get(whoami))
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(auth_config))
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn identity_headers_are_injected() {
        let request = Request::builder()
            .uri("/test")
            .header(USER_ID_HEADER, "u-17")
            .header(USER_ROOT_HEADER, "true")
            .header(SERVICE_ID_HEADER, "3539")
            .body(Body::empty())
            .unwrap();

        let response = test_app(None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "user=u-17 root=true service=3539");
    }

    #[tokio::test]
    async fn missing_headers_yield_anonymous_caller() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = test_app(None).oneshot(request).await.unwrap();
        assert_eq!(body_text(response).await, "user=- root=false service=-");
    }

    #[tokio::test]
    async fn valid_bearer_token_accepted() {
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer proxy-secret")
            .header(USER_ID_HEADER, "u-1")
            .body(Body::empty())
            .unwrap();

        let response = test_app(Some("proxy-secret")).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_authorization_header_rejected() {
        let request = Request::builder()
            .uri("/test")
            .header(USER_ID_HEADER, "u-1")
            .body(Body::empty())
            .unwrap();

        let response = test_app(Some("proxy-secret")).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let err: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(err["error"]["code"], "UNAUTHORIZED");
        assert!(err["error"]["message"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn invalid_token_rejected() {
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap();

        let response = test_app(Some("proxy-secret")).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();

        let response = test_app(Some("proxy-secret")).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("Bearer scheme"));
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        assert!(constant_time_token_eq("abc", "abc"));
        assert!(!constant_time_token_eq("abc", "abcd"));
        assert!(!constant_time_token_eq("abd", "abc"));
    }

    #[test]
    fn secret_token_debug_is_redacted() {
        let config = AuthConfig {
            token: Some(SecretToken::new("s3cret")),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn blank_headers_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, " ".parse().unwrap());
        headers.insert(SERVICE_ID_HEADER, "833".parse().unwrap());
        let caller = CallerIdentity::from_headers(&headers);
        assert_eq!(caller, CallerIdentity::service("833"));
    }
}
