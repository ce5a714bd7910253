//! Health check endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::AppState;
use crate::error::{ApiError, Result};
use crate::storage::PageRequest;

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

impl HealthResponse {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse),
    ),
    tag = "Health"
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// Readiness probe; fails while the topology store is unreachable
#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Service not ready"),
    ),
    tag = "Health"
)]
pub async fn readiness(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    state
        .repos
        .networks
        .find_all(PageRequest::first(1))
        .await
        .map_err(|e| ApiError::ServiceUnavailable(format!("storage unavailable: {}", e)))?;
    Ok(Json(HealthResponse::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness() {
        let response = liveness().await;
        assert_eq!(response.status, "ok");
        assert!(!response.version.is_empty());
    }
}
