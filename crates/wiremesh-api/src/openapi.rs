//! OpenAPI documentation generation

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use wiremesh_types::{
    Host, HostSettings, HostState, Interface, InterfaceSettings, InterfaceState, Link, Network,
    PeerSettings, WireGuardExtras,
};

use crate::error::ErrorResponse;
use crate::handlers::health::HealthResponse;
use crate::handlers::hosts::{CreateHostRequest, HostList};
use crate::handlers::interfaces::{CreateInterfaceRequest, InterfaceList, UpdateInterfaceRequest};
use crate::handlers::links::{CreateLinkRequest, LinkList};
use crate::handlers::networks::{CreateNetworkRequest, NetworkList};
use crate::lease::PoolStats;
use crate::storage::PageInfo;

use crate::handlers::health::{__path_liveness, __path_readiness};
use crate::handlers::hosts::{
    __path_create_host, __path_delete_host, __path_get_host, __path_get_host_settings,
    __path_list_hosts,
};
use crate::handlers::interfaces::{
    __path_create_interface, __path_delete_interface, __path_get_interface,
    __path_list_interfaces, __path_update_interface,
};
use crate::handlers::links::{__path_create_link, __path_delete_link, __path_list_links};
use crate::handlers::networks::{
    __path_create_network, __path_delete_network, __path_get_allocation, __path_get_network,
    __path_list_networks,
};
use crate::handlers::sync::{__path_get_settings, __path_sync_host, __path_update_state};

/// Security addon for adding Bearer JWT authentication
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// wiremesh coordinator OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "wiremesh API",
        description = "Mesh overlay coordinator: address leasing, topology and host synchronization",
        version = "0.1.0",
        license(name = "MIT OR Apache-2.0")
    ),
    paths(
        // Health
        liveness,
        readiness,
        // Networks
        list_networks,
        create_network,
        get_network,
        delete_network,
        get_allocation,
        // Hosts
        list_hosts,
        create_host,
        get_host,
        delete_host,
        get_host_settings,
        // Interfaces
        list_interfaces,
        create_interface,
        get_interface,
        update_interface,
        delete_interface,
        // Links
        list_links,
        create_link,
        delete_link,
        // Sync
        sync_host,
        get_settings,
        update_state,
    ),
    components(schemas(
        ErrorResponse,
        HealthResponse,
        PageInfo,
        PoolStats,
        Network,
        NetworkList,
        CreateNetworkRequest,
        Host,
        HostList,
        CreateHostRequest,
        Interface,
        InterfaceList,
        WireGuardExtras,
        CreateInterfaceRequest,
        UpdateInterfaceRequest,
        Link,
        LinkList,
        CreateLinkRequest,
        HostSettings,
        InterfaceSettings,
        PeerSettings,
        HostState,
        InterfaceState,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Networks", description = "Overlay networks and their address pools"),
        (name = "Hosts", description = "Managed hosts"),
        (name = "Interfaces", description = "Host interfaces and address assignment"),
        (name = "Links", description = "Peer relationships between interfaces"),
        (name = "Sync", description = "Agent synchronization"),
    )
)]
pub struct ApiDoc;
