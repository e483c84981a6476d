use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState};
use super::identity;
use super::ws;
use crate::config::TriageToml;
use crate::workflow::{DbHandle, EventBus, TicketDb, WorkflowService};

/// Configuration for the HTTP server, resolved from triage.toml plus
/// environment and CLI overrides.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub cors_permissive: bool,
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_toml(&TriageToml::default())
    }
}

impl ServerConfig {
    pub fn from_toml(toml: &TriageToml) -> Self {
        Self {
            host: toml.server.host.clone(),
            port: toml.server.port,
            db_path: toml.server.db_path.clone(),
            cors_permissive: toml.server.cors_permissive,
            event_capacity: toml.events.capacity,
        }
    }
}

/// Build the full application router: REST API, event stream and request
/// tracing.
pub fn build_router(state: Arc<AppState>, cors_permissive: bool) -> Router {
    let mut app = api::api_router()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if cors_permissive {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Open the store and start serving until Ctrl+C.
pub async fn start_server(config: ServerConfig, toml: &TriageToml) -> Result<()> {
    if let Some(parent) = config.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let db = TicketDb::new(&config.db_path).context("Failed to initialize ticket database")?;
    let identity = identity::from_config(&toml.auth)?;
    let service = WorkflowService::new(DbHandle::new(db), EventBus::new(config.event_capacity));
    let state = Arc::new(AppState { service, identity });

    let app = build_router(state, config.cors_permissive);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        %local_addr,
        db = %config.db_path.display(),
        auth = %toml.auth.mode,
        "Triage server listening"
    );
    println!("Triage running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::api::tests::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_via_full_router() {
        let app = build_router(test_state(), false);
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_routes_mounted() {
        let app = build_router(test_state(), true);
        let req = Request::builder()
            .uri("/api/tickets")
            .header("authorization", "Bearer t-alice")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    fn ws_request(uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .uri(uri)
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "13")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
    }

    #[tokio::test]
    async fn test_ws_requires_credential() {
        let app = build_router(test_state(), false);
        let req = ws_request("/ws").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let app = build_router(test_state(), false);
        let req = ws_request("/ws?token=bogus").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_ws_authenticated_request_reaches_upgrade() {
        // No underlying connection, so the upgrade step itself fails.
        let app = build_router(test_state(), false);
        let req = ws_request("/ws?token=t-alice").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_ne!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_ne!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = build_router(test_state(), false);
        let req = Request::builder()
            .uri("/nowhere")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_server_config_from_toml() {
        let mut toml = TriageToml::default();
        toml.server.port = 4321;
        toml.events.capacity = 8;
        let config = ServerConfig::from_toml(&toml);
        assert_eq!(config.port, 4321);
        assert_eq!(config.event_capacity, 8);
        assert_eq!(config.host, "127.0.0.1");
    }
}
