//! Network endpoints
//!
//! Creating a network registers its address pool, deleting it drops the pool.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use wiremesh_types::Network;

use super::{AppState, ListQuery};
use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::lease::PoolStats;
use crate::storage::{PageInfo, PageRequest};

/// Create network request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateNetworkRequest {
    /// Human readable name
    pub name: String,
    /// Address range in CIDR notation
    #[schema(example = "10.0.0.0/24")]
    pub ip_address_range: String,
}

/// One page of networks
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NetworkList {
    pub items: Vec<Network>,
    pub page_info: PageInfo,
}

/// List networks
#[utoipa::path(
    get,
    path = "/api/v1/networks",
    params(ListQuery),
    responses(
        (status = 200, description = "Page of networks", body = NetworkList),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Networks"
)]
pub async fn list_networks(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<NetworkList>> {
    let page = state.repos.networks.find_all(query.into()).await?;
    Ok(Json(NetworkList {
        items: page.items,
        page_info: page.page_info,
    }))
}

/// Create a network
#[utoipa::path(
    post,
    path = "/api/v1/networks",
    request_body = CreateNetworkRequest,
    responses(
        (status = 201, description = "Network created", body = Network),
        (status = 422, description = "Invalid CIDR"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Networks"
)]
pub async fn create_network(
    user: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<CreateNetworkRequest>,
) -> Result<(StatusCode, Json<Network>)> {
    if request.name.trim().is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }

    let network = Network::new(request.name.trim(), request.ip_address_range.trim());
    state.leases.put_network(&network).await?;

    if let Err(e) = state.repos.networks.create(&network).await {
        let _ = state.leases.pop_network(&network).await;
        return Err(e.into());
    }

    info!(network = %network.id, cidr = %network.ip_address_range, by = %user.id(), "Created network");
    Ok((StatusCode::CREATED, Json(network)))
}

/// Get a network
#[utoipa::path(
    get,
    path = "/api/v1/networks/{id}",
    params(("id" = Uuid, Path, description = "Network ID")),
    responses(
        (status = 200, description = "Network", body = Network),
        (status = 404, description = "Network not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Networks"
)]
pub async fn get_network(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Network>> {
    let network = state
        .repos
        .networks
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Network '{}' not found", id)))?;
    Ok(Json(network))
}

/// Delete a network
///
/// Refused while interfaces are still attached to it.
#[utoipa::path(
    delete,
    path = "/api/v1/networks/{id}",
    params(("id" = Uuid, Path, description = "Network ID")),
    responses(
        (status = 204, description = "Network deleted"),
        (status = 404, description = "Network not found"),
        (status = 409, description = "Network still has interfaces"),
    ),
    security(("bearer_auth" = [])),
    tag = "Networks"
)]
pub async fn delete_network(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let network = state
        .repos
        .networks
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Network '{}' not found", id)))?;

    let attached = state
        .repos
        .interfaces
        .find_all_by_network_id(id, PageRequest::first(1))
        .await?;
    if attached.page_info.total_count > 0 {
        return Err(ApiError::Conflict(format!(
            "Network '{}' still has {} interface(s)",
            id, attached.page_info.total_count
        )));
    }

    state.leases.pop_network(&network).await?;
    state.repos.networks.delete(id).await?;

    info!(network = %id, by = %user.id(), "Deleted network");
    Ok(StatusCode::NO_CONTENT)
}

/// Address allocation of a network
#[utoipa::path(
    get,
    path = "/api/v1/networks/{id}/allocation",
    params(("id" = Uuid, Path, description = "Network ID")),
    responses(
        (status = 200, description = "Pool statistics", body = PoolStats),
        (status = 404, description = "Network not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Networks"
)]
pub async fn get_allocation(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PoolStats>> {
    Ok(Json(state.leases.stats(id).await?))
}
