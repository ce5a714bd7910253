//! Agent synchronization endpoints
//!
//! Authenticated with a host token; the host is always the token subject.

use axum::{extract::State, Json};
use wiremesh_types::{HostSettings, HostState};

use super::AppState;
use crate::auth::AuthHost;
use crate::error::Result;

/// Report local state and receive the desired settings
#[utoipa::path(
    post,
    path = "/hosts/self/sync",
    request_body = HostState,
    responses(
        (status = 200, description = "Desired host settings", body = HostSettings),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Host not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Sync"
)]
pub async fn sync_host(
    host: AuthHost,
    State(state): State<AppState>,
    Json(report): Json<HostState>,
) -> Result<Json<HostSettings>> {
    tracing::debug!(host = %host.host_id, interfaces = report.interfaces.len(), "Host sync");
    Ok(Json(
        state.assembler.synchronize_host(host.host_id, &report).await?,
    ))
}

/// Desired settings without a state report
#[utoipa::path(
    get,
    path = "/hosts/self/settings",
    responses(
        (status = 200, description = "Desired host settings", body = HostSettings),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Host not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Sync"
)]
pub async fn get_settings(host: AuthHost, State(state): State<AppState>) -> Result<Json<HostSettings>> {
    Ok(Json(state.assembler.get_host_settings(host.host_id).await?))
}

/// Report local state only
#[utoipa::path(
    post,
    path = "/hosts/self/state",
    request_body = HostState,
    responses(
        (status = 200, description = "Accepted state", body = HostState),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Host not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Sync"
)]
pub async fn update_state(
    host: AuthHost,
    State(state): State<AppState>,
    Json(report): Json<HostState>,
) -> Result<Json<HostState>> {
    Ok(Json(
        state.assembler.update_host_state(host.host_id, &report).await?,
    ))
}
