//! HTTP surface for the msm session registry.
//!
//! Every route except `/health` runs behind [`session_middleware`], which
//! binds the request to a session and sets the session cookie on the
//! response.

pub mod config;
pub mod convert;
pub mod error;
pub mod logging;
pub mod routes;
pub mod session;
pub mod state;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use logging::request_logging_middleware;
pub use session::{CurrentSession, session_middleware};
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, middleware};
use msm_session::SessionRegistry;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The HTTP server.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(registry: Arc<SessionRegistry>, config: ServerConfig) -> Self {
        Self {
            state: AppState::new(registry, config),
        }
    }

    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        let session_routes = routes::session_routes().route_layer(
            middleware::from_fn_with_state(self.state.clone(), session::session_middleware),
        );

        Router::new()
            .merge(routes::health_routes())
            .merge(session_routes)
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                logging::request_logging_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve on `listener` until `signal` resolves, then drain in-flight requests.
    pub async fn run_with_shutdown<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();

        if let Ok(addr) = listener.local_addr() {
            info!("Starting server on {}", addr);
        }

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        info!("Server stopped");
        Ok(())
    }

    /// Bind `addr` and serve until the process ends.
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind: {}", e)))?;
        self.run_with_shutdown(listener, std::future::pending()).await
    }

    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}
