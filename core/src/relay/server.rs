//! Relay Server - Axum HTTP/WebSocket server

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, WechatConfig};
use crate::relay::session::RelayContext;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: RelayContext,
    pub wechat: Arc<WechatConfig>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            relay: RelayContext::from_config(config),
            wechat: Arc::new(config.wechat.clone()),
        }
    }
}

/// Build the router with all relay routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/healthz", get(health_check_handler))
        .route("/health", get(health_check_handler))
        .route("/ws/:openid", get(crate::relay::handlers::ws::handle_ws))
        .route("/jscode2session", get(crate::relay::handlers::auth::handle_jscode2session))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Relay server instance
pub struct RelayServer {
    host: String,
    port: u16,
    state: AppState,
}

impl RelayServer {
    pub fn new(host: String, port: u16, state: AppState) -> Self {
        Self { host, port, state }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.server.host.clone(),
            config.server.port,
            AppState::from_config(config),
        )
    }

    /// Run the relay server (blocking)
    pub async fn run(self) -> anyhow::Result<()> {
        let app = create_router(self.state);

        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!("Relay server listening on {}", addr);

        // Handle graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Relay server stopped");
        Ok(())
    }
}

async fn root_handler() -> &'static str {
    "Hello world from chat-relay!"
}

/// Health check handler
async fn health_check_handler() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
