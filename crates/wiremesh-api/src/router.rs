//! API router construction

use axum::{
    routing::{delete, get, post},
    Extension, Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::auth::AuthState;
use crate::config::ApiConfig;
use crate::handlers::{self, AppState};
use crate::lease::LeaseService;
use crate::openapi::ApiDoc;
use crate::storage::Repositories;
use crate::sync::SyncAssembler;

impl AppState {
    /// Wire the lease service and assembler over one set of repositories
    pub fn new(config: &ApiConfig, repos: Repositories, leases: Arc<LeaseService>) -> Self {
        let assembler = SyncAssembler::new(&repos).with_page_size(config.sync_page_size);
        Self {
            repos,
            leases,
            assembler: Arc::new(assembler),
        }
    }
}

/// Build the API router with in-memory storage and a fresh lease service
pub fn build_router(config: &ApiConfig) -> Router {
    let repos = Repositories::in_memory();
    let leases = Arc::new(LeaseService::new(
        repos.networks.clone(),
        repos.interfaces.clone(),
    ));
    build_router_with_state(config, AppState::new(config, repos, leases))
}

/// Build the API router around existing state
pub fn build_router_with_state(config: &ApiConfig, state: AppState) -> Router {
    let auth_state = AuthState {
        jwt_secret: config.jwt_secret.clone(),
    };

    // Health routes (no auth required)
    let health_routes = Router::new()
        .route("/live", get(handlers::health::liveness))
        .route("/ready", get(handlers::health::readiness));

    let network_routes = Router::new()
        .route(
            "/",
            get(handlers::networks::list_networks).post(handlers::networks::create_network),
        )
        .route(
            "/{id}",
            get(handlers::networks::get_network).delete(handlers::networks::delete_network),
        )
        .route("/{id}/allocation", get(handlers::networks::get_allocation));

    let host_routes = Router::new()
        .route(
            "/",
            get(handlers::hosts::list_hosts).post(handlers::hosts::create_host),
        )
        .route(
            "/{id}",
            get(handlers::hosts::get_host).delete(handlers::hosts::delete_host),
        )
        .route("/{id}/settings", get(handlers::hosts::get_host_settings));

    let interface_routes = Router::new()
        .route(
            "/",
            get(handlers::interfaces::list_interfaces).post(handlers::interfaces::create_interface),
        )
        .route(
            "/{id}",
            get(handlers::interfaces::get_interface)
                .put(handlers::interfaces::update_interface)
                .delete(handlers::interfaces::delete_interface),
        );

    let link_routes = Router::new()
        .route(
            "/",
            get(handlers::links::list_links).post(handlers::links::create_link),
        )
        .route("/{id}", delete(handlers::links::delete_link));

    // Agent routes (host token required)
    let sync_routes = Router::new()
        .route("/sync", post(handlers::sync::sync_host))
        .route("/settings", get(handlers::sync::get_settings))
        .route("/state", post(handlers::sync::update_state));

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1/networks", network_routes)
        .nest("/api/v1/hosts", host_routes)
        .nest("/api/v1/interfaces", interface_routes)
        .nest("/api/v1/links", link_routes)
        .nest("/hosts/self", sync_routes)
        .route("/api-docs/openapi.json", get(openapi_json))
        .with_state(state)
        .layer(Extension(auth_state))
        .layer(TraceLayer::new_for_http())
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
