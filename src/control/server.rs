//! Control server implementation
//!
//! Wraps the API router with CORS and request tracing and serves it until
//! the shutdown future resolves.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::scheduler::MonitorController;

use super::api::create_router;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Monitor lifecycle and event queue access
    pub controller: Arc<MonitorController>,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(controller: Arc<MonitorController>) -> Self {
        Self {
            controller,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// Control Server
// ============================================================================

pub struct ControlServer {
    bind_addr: SocketAddr,
    state: AppState,
}

impl ControlServer {
    pub fn new(bind_addr: &str, controller: Arc<MonitorController>) -> Result<Self, ServerError> {
        let bind_addr = bind_addr
            .parse()
            .map_err(|e| ServerError::ConfigError(format!("bind address '{bind_addr}': {e}")))?;

        Ok(Self {
            bind_addr,
            state: AppState::new(controller),
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Build the router with all routes and layers
    pub fn build_router(&self) -> Router {
        create_router(self.state.clone())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown_signal` resolves
    pub async fn serve(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        tracing::info!(addr = %self.bind_addr, "Control server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        tracing::info!("Control server shutdown complete");
        Ok(())
    }
}

// ============================================================================
// Server Errors
// ============================================================================

#[derive(Debug, Clone)]
pub enum ServerError {
    /// Configuration error
    ConfigError(String),

    /// Failed to bind to address
    BindError(String),

    /// Server error
    ServeError(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::BindError(msg) => write!(f, "Failed to bind: {}", msg),
            Self::ServeError(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {}
