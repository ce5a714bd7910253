//! Host endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use wiremesh_types::{Host, HostSettings};

use super::{AppState, ListQuery};
use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::storage::{PageInfo, PageRequest};

/// Create host request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateHostRequest {
    pub name: String,
    /// Public endpoint: bare IP, hostname or `host:port`
    #[serde(default)]
    #[schema(example = "203.0.113.5")]
    pub advertise_address: String,
    #[serde(default)]
    pub network_id: Option<Uuid>,
}

/// One page of hosts
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HostList {
    pub items: Vec<Host>,
    pub page_info: PageInfo,
}

/// List hosts
#[utoipa::path(
    get,
    path = "/api/v1/hosts",
    params(ListQuery),
    responses(
        (status = 200, description = "Page of hosts", body = HostList),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Hosts"
)]
pub async fn list_hosts(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<HostList>> {
    let page = state.repos.hosts.find_all(query.into()).await?;
    Ok(Json(HostList {
        items: page.items,
        page_info: page.page_info,
    }))
}

/// Register a host
#[utoipa::path(
    post,
    path = "/api/v1/hosts",
    request_body = CreateHostRequest,
    responses(
        (status = 201, description = "Host created", body = Host),
        (status = 422, description = "Invalid request"),
    ),
    security(("bearer_auth" = [])),
    tag = "Hosts"
)]
pub async fn create_host(
    user: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<CreateHostRequest>,
) -> Result<(StatusCode, Json<Host>)> {
    if request.name.trim().is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }

    let mut host = Host::new(request.name.trim(), request.advertise_address.trim());
    if let Some(network_id) = request.network_id {
        if state.repos.networks.get_by_id(network_id).await?.is_none() {
            return Err(ApiError::Validation(format!(
                "Network '{}' does not exist",
                network_id
            )));
        }
        host = host.with_network(network_id);
    }

    state.repos.hosts.create(&host).await?;
    info!(host = %host.id, name = %host.name, by = %user.id(), "Registered host");
    Ok((StatusCode::CREATED, Json(host)))
}

/// Get a host
#[utoipa::path(
    get,
    path = "/api/v1/hosts/{id}",
    params(("id" = Uuid, Path, description = "Host ID")),
    responses(
        (status = 200, description = "Host", body = Host),
        (status = 404, description = "Host not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Hosts"
)]
pub async fn get_host(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Host>> {
    let host = state
        .repos
        .hosts
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Host '{}' not found", id)))?;
    Ok(Json(host))
}

/// Delete a host
///
/// Refused while the host still owns interfaces.
#[utoipa::path(
    delete,
    path = "/api/v1/hosts/{id}",
    params(("id" = Uuid, Path, description = "Host ID")),
    responses(
        (status = 204, description = "Host deleted"),
        (status = 404, description = "Host not found"),
        (status = 409, description = "Host still has interfaces"),
    ),
    security(("bearer_auth" = [])),
    tag = "Hosts"
)]
pub async fn delete_host(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let owned = state
        .repos
        .interfaces
        .find_all_by_host_id(id, PageRequest::first(1))
        .await?;
    if owned.page_info.total_count > 0 {
        return Err(ApiError::Conflict(format!(
            "Host '{}' still has {} interface(s)",
            id, owned.page_info.total_count
        )));
    }

    if !state.repos.hosts.delete(id).await? {
        return Err(ApiError::NotFound(format!("Host '{}' not found", id)));
    }

    info!(host = %id, by = %user.id(), "Deleted host");
    Ok(StatusCode::NO_CONTENT)
}

/// The settings document the host's agent would receive
#[utoipa::path(
    get,
    path = "/api/v1/hosts/{id}/settings",
    params(("id" = Uuid, Path, description = "Host ID")),
    responses(
        (status = 200, description = "Host settings", body = HostSettings),
        (status = 404, description = "Host not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Hosts"
)]
pub async fn get_host_settings(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HostSettings>> {
    Ok(Json(state.assembler.get_host_settings(id).await?))
}
