//! Interface endpoints
//!
//! An interface attached to a network always holds an address of that
//! network's pool: one is leased on create unless the request names one, in
//! which case it is reserved. Address changes move the reservation and delete
//! releases it.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use wiremesh_overlay::{config::validate_interface_name, parse_address, DEFAULT_WG_PORT};
use wiremesh_types::{Interface, WireGuardExtras};

use super::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, Result};
use crate::storage::{PageInfo, PageRequest};

/// Create interface request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateInterfaceRequest {
    pub host_id: Uuid,
    #[serde(default)]
    pub network_id: Option<Uuid>,
    /// Interface name on the host (at most 15 characters)
    #[schema(example = "wg0")]
    pub name: String,
    /// Explicit address; leased from the network when omitted
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub listen_port: Option<u16>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(flatten)]
    pub extras: WireGuardExtras,
}

/// Update interface request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateInterfaceRequest {
    pub name: Option<String>,
    /// New address; an empty string releases the current one
    pub ip_address: Option<String>,
    pub listen_port: Option<u16>,
    pub public_key: Option<String>,
    pub extras: Option<WireGuardExtras>,
}

/// Interface list filters
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
pub struct InterfaceQuery {
    /// Only interfaces of this host
    pub host_id: Option<Uuid>,
    /// Only interfaces attached to this network
    pub network_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// One page of interfaces
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InterfaceList {
    pub items: Vec<Interface>,
    pub page_info: PageInfo,
}

/// List interfaces
#[utoipa::path(
    get,
    path = "/api/v1/interfaces",
    params(InterfaceQuery),
    responses(
        (status = 200, description = "Page of interfaces", body = InterfaceList),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Interfaces"
)]
pub async fn list_interfaces(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<InterfaceQuery>,
) -> Result<Json<InterfaceList>> {
    let request = PageRequest::new(query.page.unwrap_or(1), query.per_page.unwrap_or(50).min(500));
    let interfaces = &state.repos.interfaces;
    let page = match (query.host_id, query.network_id) {
        (Some(host_id), _) => interfaces.find_all_by_host_id(host_id, request).await?,
        (None, Some(network_id)) => interfaces.find_all_by_network_id(network_id, request).await?,
        (None, None) => interfaces.find_all(request).await?,
    };
    Ok(Json(InterfaceList {
        items: page.items,
        page_info: page.page_info,
    }))
}

/// Create an interface
#[utoipa::path(
    post,
    path = "/api/v1/interfaces",
    request_body = CreateInterfaceRequest,
    responses(
        (status = 201, description = "Interface created", body = Interface),
        (status = 409, description = "Name or address already taken"),
        (status = 422, description = "Invalid request or address outside the network range"),
        (status = 503, description = "Network has no free addresses"),
    ),
    security(("bearer_auth" = [])),
    tag = "Interfaces"
)]
pub async fn create_interface(
    user: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<CreateInterfaceRequest>,
) -> Result<(StatusCode, Json<Interface>)> {
    let name = request.name.trim();
    if !validate_interface_name(name) {
        return Err(ApiError::Validation(format!("Invalid interface name '{}'", name)));
    }
    if state.repos.hosts.get_by_id(request.host_id).await?.is_none() {
        return Err(ApiError::Validation(format!(
            "Host '{}' does not exist",
            request.host_id
        )));
    }
    ensure_name_free(&state, request.host_id, name, None).await?;

    let mut interface = Interface::new(request.host_id, name)
        .with_listen_port(request.listen_port.unwrap_or(DEFAULT_WG_PORT));
    interface.public_key = request.public_key.unwrap_or_default();
    interface.extras = request.extras;

    let explicit = request
        .ip_address
        .as_deref()
        .map(str::trim)
        .filter(|addr| !addr.is_empty());

    match request.network_id {
        Some(network_id) => {
            if state.repos.networks.get_by_id(network_id).await?.is_none() {
                return Err(ApiError::Validation(format!(
                    "Network '{}' does not exist",
                    network_id
                )));
            }
            interface.network_id = Some(network_id);

            let ip = match explicit {
                Some(addr) => {
                    let ip = parse_address(addr).map_err(|e| ApiError::Validation(e.to_string()))?;
                    interface.ip_address = Some(ip.to_string());
                    state.leases.put_ip_address(&interface).await?;
                    ip
                }
                None => state.leases.lease(&interface).await?,
            };
            interface.ip_address = Some(state.leases.format_address(network_id, ip).await?);
        }
        None => {
            if let Some(addr) = explicit {
                parse_address(addr).map_err(|e| ApiError::Validation(e.to_string()))?;
                interface.ip_address = Some(addr.to_string());
            }
        }
    }

    if let Err(e) = state.repos.interfaces.create(&interface).await {
        release_address(&state, &interface).await;
        return Err(e.into());
    }

    info!(
        interface = %interface.id,
        host = %interface.host_id,
        address = interface.assigned_address().unwrap_or_default(),
        by = %user.id(),
        "Created interface"
    );
    Ok((StatusCode::CREATED, Json(interface)))
}

/// Get an interface
#[utoipa::path(
    get,
    path = "/api/v1/interfaces/{id}",
    params(("id" = Uuid, Path, description = "Interface ID")),
    responses(
        (status = 200, description = "Interface", body = Interface),
        (status = 404, description = "Interface not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Interfaces"
)]
pub async fn get_interface(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Interface>> {
    Ok(Json(load_interface(&state, id).await?))
}

/// Update an interface
#[utoipa::path(
    put,
    path = "/api/v1/interfaces/{id}",
    params(("id" = Uuid, Path, description = "Interface ID")),
    request_body = UpdateInterfaceRequest,
    responses(
        (status = 200, description = "Interface updated", body = Interface),
        (status = 404, description = "Interface not found"),
        (status = 409, description = "Name or address already taken"),
        (status = 422, description = "Invalid request or address outside the network range"),
    ),
    security(("bearer_auth" = [])),
    tag = "Interfaces"
)]
pub async fn update_interface(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateInterfaceRequest>,
) -> Result<Json<Interface>> {
    let current = load_interface(&state, id).await?;
    let mut updated = current.clone();

    if let Some(name) = request.name.as_deref().map(str::trim) {
        if !validate_interface_name(name) {
            return Err(ApiError::Validation(format!("Invalid interface name '{}'", name)));
        }
        if name != current.name {
            ensure_name_free(&state, current.host_id, name, Some(id)).await?;
            updated.name = name.to_string();
        }
    }
    if let Some(port) = request.listen_port {
        updated.listen_port = port;
    }
    if let Some(public_key) = request.public_key {
        updated.public_key = public_key;
    }
    if let Some(extras) = request.extras {
        updated.extras = extras;
    }

    let mut reserved = false;
    if let Some(addr) = request.ip_address.as_deref().map(str::trim) {
        updated.ip_address = normalize_address(&state, &current, addr).await?;
        if updated.assigned_address() != current.assigned_address() {
            if current.network_id.is_some() && updated.assigned_address().is_some() {
                state.leases.put_ip_address(&updated).await?;
                reserved = true;
            }
            release_address(&state, &current).await;
        }
    }

    updated.touch();
    if let Err(e) = state.repos.interfaces.update(&updated).await {
        if reserved {
            release_address(&state, &updated).await;
        }
        if updated.assigned_address() != current.assigned_address() {
            restore_address(&state, &current).await;
        }
        return Err(e.into());
    }

    info!(interface = %id, by = %user.id(), "Updated interface");
    Ok(Json(updated))
}

/// Delete an interface
///
/// Releases its address and removes every link that references it.
#[utoipa::path(
    delete,
    path = "/api/v1/interfaces/{id}",
    params(("id" = Uuid, Path, description = "Interface ID")),
    responses(
        (status = 204, description = "Interface deleted"),
        (status = 404, description = "Interface not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Interfaces"
)]
pub async fn delete_interface(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let interface = load_interface(&state, id).await?;

    let mut stale_links = Vec::new();
    let mut request = PageRequest::first(100);
    loop {
        let page = state.repos.links.find_all(request).await?;
        stale_links.extend(
            page.items
                .iter()
                .filter(|l| l.from_interface_id == id || l.to_interface_id == id)
                .map(|l| l.id),
        );
        if !page.page_info.has_next() {
            break;
        }
        request = request.next();
    }
    for link_id in &stale_links {
        state.repos.links.delete(*link_id).await?;
    }

    state.repos.interfaces.delete(id).await?;
    release_address(&state, &interface).await;

    info!(interface = %id, links = stale_links.len(), by = %user.id(), "Deleted interface");
    Ok(StatusCode::NO_CONTENT)
}

async fn load_interface(state: &AppState, id: Uuid) -> Result<Interface> {
    state
        .repos
        .interfaces
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Interface '{}' not found", id)))
}

/// Interface names are unique per host
async fn ensure_name_free(state: &AppState, host_id: Uuid, name: &str, except: Option<Uuid>) -> Result<()> {
    let mut request = PageRequest::first(100);
    loop {
        let page = state
            .repos
            .interfaces
            .find_all_by_host_id(host_id, request)
            .await?;
        if page
            .items
            .iter()
            .any(|i| i.name == name && Some(i.id) != except)
        {
            return Err(ApiError::Conflict(format!(
                "Host '{}' already has an interface named '{}'",
                host_id, name
            )));
        }
        if !page.page_info.has_next() {
            return Ok(());
        }
        request = request.next();
    }
}

/// Validate a requested address and render it the way it is stored
async fn normalize_address(state: &AppState, interface: &Interface, addr: &str) -> Result<Option<String>> {
    if addr.is_empty() {
        return Ok(None);
    }
    let ip = parse_address(addr).map_err(|e| ApiError::Validation(e.to_string()))?;
    match interface.network_id {
        Some(network_id) => Ok(Some(state.leases.format_address(network_id, ip).await?)),
        None => Ok(Some(addr.to_string())),
    }
}

/// Re-reserve an interface's previous address after a failed update
async fn restore_address(state: &AppState, interface: &Interface) {
    if interface.network_id.is_none() || interface.assigned_address().is_none() {
        return;
    }
    if let Err(e) = state.leases.put_ip_address(interface).await {
        warn!(interface = %interface.id, error = %e, "Failed to restore interface address");
    }
}

/// Return an interface's address to its pool
///
/// Failures are logged; the next pool rebuild clears stale reservations.
async fn release_address(state: &AppState, interface: &Interface) {
    if interface.network_id.is_none() || interface.assigned_address().is_none() {
        return;
    }
    if let Err(e) = state.leases.pop_ip_address(interface).await {
        warn!(interface = %interface.id, error = %e, "Failed to release interface address");
    }
}
