//! Liveness endpoint. Sits outside the session middleware, so probing it
//! never mints a session.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Sessions currently held in the cache.
    pub active_sessions: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions: state.registry.len().await,
    })
}

/// Create health check routes.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use msm_session::{InMemoryStore, RegistryConfig, SessionRegistry};
    use tower::ServiceExt;

    use crate::config::ServerConfig;

    #[tokio::test]
    async fn test_health_reports_cache_size() {
        let registry = SessionRegistry::new(
            RegistryConfig::for_app("health"),
            Arc::new(InMemoryStore::new()),
        )
        .unwrap();
        let state = AppState::new(Arc::new(registry), ServerConfig::new());
        let app = health_routes().with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: HealthResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.status, "ok");
        assert_eq!(body.active_sessions, 0);
    }
}
