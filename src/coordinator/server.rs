//! Coordination server implementation
//!
//! Wraps any [`CoordinationStorage`](crate::storage::CoordinationStorage)
//! (normally a [`MemoryStorage`]) behind the HTTP endpoints in [`super::api`].
//! Each request is one storage call, so the per-call atomicity of the wrapped
//! store carries over to remote callers unchanged.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ConfigError;
use crate::storage::{FileStorage, MemoryStorage, SharedStorage, StorageError};

use super::api::create_router;
use super::config::ServerConfig;
use super::health::{create_health_router, HealthChecker};

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The wrapped coordination store
    pub storage: SharedStorage,

    /// Readiness flag
    pub health: HealthChecker,

    /// Configuration
    pub config: ServerConfig,
}

// ============================================================================
// Coordination Server
// ============================================================================

/// HTTP front end of a coordination store
pub struct CoordinationServer {
    config: ServerConfig,
    state: AppState,
}

impl CoordinationServer {
    /// Serve an existing store
    pub fn new(config: ServerConfig, storage: SharedStorage) -> Result<Self, ServerError> {
        config.validate()?;

        let state = AppState {
            storage,
            health: HealthChecker::new(),
            config: config.clone(),
        };

        Ok(Self { config, state })
    }

    /// Build the store the config asks for, then the server around it
    ///
    /// With a bootstrap directory the store starts with every matching
    /// topology registered and enabled; otherwise it starts empty.
    pub async fn from_config(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let storage: SharedStorage = match &config.bootstrap_dir {
            Some(dir) => Arc::new(FileStorage::open(dir.clone(), &config.patterns()?).await?),
            None => Arc::new(MemoryStorage::new()),
        };

        Self::new(config, storage)
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone())
            .merge(create_health_router(self.state.clone()))
            .route("/metrics", get(metrics_endpoint))
            .route_layer(middleware::from_fn(track_requests));

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Bind the configured address and serve until the process ends
    pub async fn start(&self) -> Result<(), ServerError> {
        self.start_with_shutdown(std::future::pending()).await
    }

    /// Bind the configured address and serve until `shutdown_signal` resolves
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = self.config.bind_address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("{addr}: {e}")))?;

        self.serve(listener, shutdown_signal).await
    }

    /// Serve on an already bound listener
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let local = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        tracing::info!(address = %local, "Coordination server listening");
        self.state.health.mark_ready();

        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()));

        self.state.health.mark_not_ready();
        tracing::info!("Coordination server shutdown complete");
        result
    }

    /// Get server info
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            bind_address: self.config.bind_address,
            cors_enabled: self.config.enable_cors,
            request_logging_enabled: self.config.enable_request_logging,
            bootstrap_dir: self
                .config
                .bootstrap_dir
                .as_ref()
                .map(|d| d.display().to_string()),
        }
    }
}

/// Count and time every routed request
async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    crate::metrics::record_api_request(
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

async fn metrics_endpoint() -> Response {
    match crate::metrics::encode_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
    pub bootstrap_dir: Option<String>,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "Coordination Server\n\
             {:-<40}\n\
             Bind Address: {}\n\
             CORS: {}\n\
             Request Logging: {}\n\
             Bootstrap: {}",
            "",
            self.bind_address,
            if self.cors_enabled { "enabled" } else { "disabled" },
            if self.request_logging_enabled { "enabled" } else { "disabled" },
            self.bootstrap_dir.as_deref().unwrap_or("none")
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage initialization failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to bind: {0}")]
    Bind(String),

    #[error("Server error: {0}")]
    Serve(String),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TopologyStatus;
    use tempfile::TempDir;

    #[test]
    fn test_server_creation() {
        let server =
            CoordinationServer::new(ServerConfig::default(), Arc::new(MemoryStorage::new()));
        assert!(server.is_ok());
    }

    #[test]
    fn test_server_info() {
        let config = ServerConfig::builder().enable_cors(false).build().unwrap();
        let server = CoordinationServer::new(config, Arc::new(MemoryStorage::new())).unwrap();
        let info = server.info();

        assert!(!info.cors_enabled);
        assert!(info.display().contains("Bootstrap: none"));
    }

    #[tokio::test]
    async fn test_from_config_bootstraps_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("t1.json"), r#"{"general": {"name": "t1"}}"#).unwrap();

        let config = ServerConfig::builder()
            .bootstrap_dir(dir.path())
            .build()
            .unwrap();
        let server = CoordinationServer::from_config(config).await.unwrap();

        let topologies = server.state().storage.get_topology_status().await.unwrap();
        assert_eq!(topologies.len(), 1);
        assert_eq!(topologies[0].status, TopologyStatus::Unassigned);
    }

    #[tokio::test]
    async fn test_from_config_missing_directory_fails() {
        let config = ServerConfig::builder()
            .bootstrap_dir("/definitely/not/here")
            .build()
            .unwrap();
        let result = CoordinationServer::from_config(config).await;
        assert!(matches!(result, Err(ServerError::Storage(_))));
    }

    #[tokio::test]
    async fn test_serve_with_graceful_shutdown() {
        let server =
            CoordinationServer::new(ServerConfig::default(), Arc::new(MemoryStorage::new()))
                .unwrap();
        let state = server.state();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(state.health.is_ready());

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert!(!state.health.is_ready());
    }
}
