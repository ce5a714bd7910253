//! Link endpoints
//!
//! A link makes its target interface a peer of its source interface. Operators
//! create one link per direction.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use wiremesh_overlay::parse_address;
use wiremesh_types::{Interface, Link};

use super::{AppState, ListQuery};
use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::storage::PageInfo;

/// Create link request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLinkRequest {
    pub network_id: Uuid,
    pub from_interface_id: Uuid,
    pub to_interface_id: Uuid,
    /// CIDRs routed to the peer; defaults to the peer's address as a /32
    #[serde(default)]
    #[schema(example = json!(["10.0.0.3/32"]))]
    pub allowed_ips: Vec<String>,
    /// Keepalive in seconds, 0 disables it
    #[serde(default)]
    pub persistent_keepalive: u16,
}

/// One page of links
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LinkList {
    pub items: Vec<Link>,
    pub page_info: PageInfo,
}

/// List links
#[utoipa::path(
    get,
    path = "/api/v1/links",
    params(ListQuery),
    responses(
        (status = 200, description = "Page of links", body = LinkList),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Links"
)]
pub async fn list_links(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<LinkList>> {
    let page = state.repos.links.find_all(query.into()).await?;
    Ok(Json(LinkList {
        items: page.items,
        page_info: page.page_info,
    }))
}

/// Create a link
#[utoipa::path(
    post,
    path = "/api/v1/links",
    request_body = CreateLinkRequest,
    responses(
        (status = 201, description = "Link created", body = Link),
        (status = 422, description = "Invalid interfaces or allowed IPs"),
    ),
    security(("bearer_auth" = [])),
    tag = "Links"
)]
pub async fn create_link(
    user: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<CreateLinkRequest>,
) -> Result<(StatusCode, Json<Link>)> {
    if request.from_interface_id == request.to_interface_id {
        return Err(ApiError::Validation(
            "A link needs two different interfaces".to_string(),
        ));
    }
    if state.repos.networks.get_by_id(request.network_id).await?.is_none() {
        return Err(ApiError::Validation(format!(
            "Network '{}' does not exist",
            request.network_id
        )));
    }
    let _source = existing_interface(&state, request.from_interface_id).await?;
    let target = existing_interface(&state, request.to_interface_id).await?;

    let allowed_ips = if request.allowed_ips.is_empty() {
        default_allowed_ips(&target)?
    } else {
        for cidr in &request.allowed_ips {
            cidr.trim()
                .parse::<IpNet>()
                .map_err(|e| ApiError::Validation(format!("Invalid allowed IP '{}': {}", cidr, e)))?;
        }
        request.allowed_ips.iter().map(|c| c.trim().to_string()).collect()
    };

    let link = Link::new(request.network_id, request.from_interface_id, request.to_interface_id)
        .with_allowed_ips(allowed_ips)
        .with_keepalive(request.persistent_keepalive);
    state.repos.links.create(&link).await?;

    info!(link = %link.id, from = %link.from_interface_id, to = %link.to_interface_id, by = %user.id(), "Created link");
    Ok((StatusCode::CREATED, Json(link)))
}

/// Delete a link
#[utoipa::path(
    delete,
    path = "/api/v1/links/{id}",
    params(("id" = Uuid, Path, description = "Link ID")),
    responses(
        (status = 204, description = "Link deleted"),
        (status = 404, description = "Link not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Links"
)]
pub async fn delete_link(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    if !state.repos.links.delete(id).await? {
        return Err(ApiError::NotFound(format!("Link '{}' not found", id)));
    }
    info!(link = %id, by = %user.id(), "Deleted link");
    Ok(StatusCode::NO_CONTENT)
}

async fn existing_interface(state: &AppState, id: Uuid) -> Result<Interface> {
    state
        .repos
        .interfaces
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::Validation(format!("Interface '{}' does not exist", id)))
}

fn default_allowed_ips(target: &Interface) -> Result<Vec<String>> {
    let addr = target.assigned_address().ok_or_else(|| {
        ApiError::Validation(format!(
            "Interface '{}' has no address; allowed_ips must be given",
            target.id
        ))
    })?;
    let ip = parse_address(addr).map_err(|e| ApiError::Validation(e.to_string()))?;
    Ok(vec![format!("{}/32", ip)])
}
