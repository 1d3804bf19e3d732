//! HTTP front end for sandboxed code execution
//!
//! An editor widget posts the user's source to `/run` and renders the returned
//! `ExecutionResult`. Each request gets its own workspace and container; the
//! server keeps no state between them.

pub mod error;

pub use error::{Result, ServerError};

use axum::extract::{DefaultBodyLimit, Json as AxumJson, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, options, post};
use axum::{middleware, Router};
use codebox_core::{CodeRunner, CodeboxError, ExecutionResult, ServerSettings};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub engine: String,
}

/// Body of `POST /run`.
#[derive(Debug, Deserialize)]
pub struct RunRequestBody {
    #[serde(alias = "code")]
    pub source: String,
}

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Enable permissive CORS, for editor widgets served from another origin
    pub enable_cors: bool,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            enable_cors: true,
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Build from the `server` section of the codebox configuration.
    pub fn from_settings(settings: &ServerSettings) -> Result<Self> {
        Ok(Self::default()
            .with_bind_addr_str(&settings.bind_addr)?
            .with_cors(settings.enable_cors)
            .with_max_body_size(settings.max_body_bytes))
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address '{}': {}", addr, e)))?;
        Ok(self)
    }

    /// Enable or disable CORS.
    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    /// Set maximum request body size.
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }
}

type ErrorResponse = (StatusCode, Json<serde_json::Value>);

fn error_response(status: StatusCode, error: &str, details: String) -> ErrorResponse {
    (
        status,
        Json(json!({
            "error": error,
            "details": details,
            "timestamp": chrono::Utc::now()
        })),
    )
}

/// The server itself is up either way; `degraded` means runs will come back
/// as infrastructure errors until the engine is reachable again.
async fn health_handler(State(runner): State<CodeRunner>) -> Json<HealthResponse> {
    let (status, engine) = match runner.sandbox().health_check().await {
        Ok(()) => ("healthy", "reachable"),
        Err(e) => {
            log::warn!("Health check: engine unreachable: {}", e);
            ("degraded", "unreachable")
        }
    };
    Json(HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: engine.to_string(),
    })
}

/// Handler for the /run POST endpoint.
async fn run_handler(
    State(runner): State<CodeRunner>,
    AxumJson(body): AxumJson<RunRequestBody>,
) -> std::result::Result<Json<ExecutionResult>, ErrorResponse> {
    // Detached so a client disconnect cannot abandon a running sandbox half way.
    let task = tokio::spawn(async move { runner.run_request(&body.source).await });

    match task.await {
        Ok(Ok(result)) => Ok(Json(result)),
        Ok(Err(CodeboxError::Validation(msg))) => {
            log::debug!("Rejected request: {}", msg);
            Err(error_response(StatusCode::BAD_REQUEST, "Invalid input", msg))
        }
        Ok(Err(e)) => {
            log::error!("Request failed before execution: {}", e);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Execution could not be prepared",
                e.to_string(),
            ))
        }
        Err(e) => {
            log::error!("Execution task failed: {}", e);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Execution task failed",
                e.to_string(),
            ))
        }
    }
}

/// The codebox HTTP server.
pub struct CodeboxServer {
    runner: CodeRunner,
    config: ServerConfig,
}

impl CodeboxServer {
    /// Create a new server with the given runner and default configuration.
    pub fn new(runner: CodeRunner) -> Self {
        Self {
            runner,
            config: ServerConfig::default(),
        }
    }

    /// Create a new server with custom configuration.
    pub fn with_config(runner: CodeRunner, config: ServerConfig) -> Self {
        Self { runner, config }
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/run", post(run_handler))
            // CORS preflight
            .route("/run", options(|| async { StatusCode::OK }))
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(self.runner.clone());

        router = router.layer(middleware::from_fn(
            |request: axum::http::Request<axum::body::Body>,
             next: axum::middleware::Next| async move {
                let request_id = uuid::Uuid::new_v4().to_string();
                let method = request.method().clone();
                let uri = request.uri().clone();

                if uri.path() == "/health" {
                    log::debug!("Request {} {} {}", request_id, method, uri);
                } else {
                    log::info!("Request {} {} {}", request_id, method, uri);
                }

                let start = std::time::Instant::now();
                let response = next.run(request).await;
                log::debug!(
                    "Response {} {} in {:?}",
                    request_id,
                    response.status(),
                    start.elapsed()
                );
                response
            },
        ));

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }

    /// Start the server and run until `shutdown_signal` resolves.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!("codebox server starting on {}", self.config.bind_addr);
        log::info!("Health check: http://{}/health", self.config.bind_addr);
        log::info!("Run endpoint: http://{}/run", self.config.bind_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("codebox server shut down gracefully");
        Ok(())
    }
}

/// Utility function to create a shutdown signal from Ctrl+C.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
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
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
