//! HTTP API server
//!
//! Serves the control page and the JSON endpoints that drive a session.

mod health;
mod page;
mod session;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

pub use session::{MessagesResponse, SessionError, StartRequest, StatusResponse};

use crate::Result;
use crate::config::DEFAULT_PORT;
use crate::session::SessionController;

/// Shared state for API handlers
pub struct ApiState {
    pub sessions: Arc<SessionController>,
}

/// Build the application router
///
/// With `static_dir` set, files from that directory replace the embedded
/// control page.
pub fn router(state: Arc<ApiState>, static_dir: Option<&std::path::Path>) -> Router {
    let mut router = Router::new()
        .merge(session::router(Arc::clone(&state)))
        .merge(health::router())
        .merge(health::status_router(state));

    if let Some(static_dir) = static_dir {
        let index_file = static_dir.join("index.html");
        let serve_dir = ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));

        router = router.fallback_service(serve_dir);
        tracing::info!(path = %static_dir.display(), "serving static files");
    } else {
        router = router.merge(page::router());
    }

    // The control page may be opened from another origin during development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router.layer(cors).layer(TraceLayer::new_for_http())
}

/// Builder for the API server
pub struct ApiServerBuilder {
    sessions: Arc<SessionController>,
    host: String,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServerBuilder {
    /// Create a builder with required fields
    #[must_use]
    pub fn new(sessions: Arc<SessionController>) -> Self {
        Self {
            sessions,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            static_dir: None,
        }
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    #[must_use]
    pub fn build(self) -> ApiServer {
        ApiServer {
            state: Arc::new(ApiState {
                sessions: self.sessions,
            }),
            host: self.host,
            port: self.port,
            static_dir: self.static_dir,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    host: String,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    fn router(&self) -> Router {
        router(Arc::clone(&self.state), self.static_dir.as_deref())
    }

    /// Run the API server until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server on {addr}: {e}")))?;

        tracing::info!(addr = %addr, "API server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}
