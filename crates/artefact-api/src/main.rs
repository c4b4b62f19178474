//! # artefact-api - Binary Entry Point
//!
//! Starts the Axum HTTP server for the artefact catalog.
//! Binds to configurable port (default 8080).

use artefact_api::config::ServiceConfig;
use artefact_remote::RemoteConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured tracing. LOG_FORMAT=json switches to JSON lines.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = ServiceConfig::from_env().map_err(|e| {
        tracing::error!("Invalid service configuration: {e}");
        e
    })?;
    let remote_config = RemoteConfig::from_env().map_err(|e| {
        tracing::error!("Invalid remote configuration: {e}");
        e
    })?;
    let port = config.port;

    let state = artefact_api::bootstrap::bootstrap(config, remote_config)
        .await
        .map_err(|e| {
            tracing::error!("Bootstrap failed: {e}");
            e
        })?;

    let app = artefact_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("artefact catalog listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
