//! wiremesh coordinator API
//!
//! Provides:
//! - Address leasing with a self-healing pool cache ([`lease`])
//! - Host settings assembly for agents ([`sync`])
//! - REST endpoints for networks, hosts, interfaces and links
//! - JWT authentication for operators and agents
//! - OpenAPI documentation
//!
//! # Quick Start
//!
//! ```no_run
//! use wiremesh_api::{ApiConfig, ApiServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = ApiServer::new(ApiConfig::default());
//!     server.run_with_shutdown(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod lease;
pub mod openapi;
pub mod router;
pub mod server;
pub mod storage;
pub mod sync;

pub use auth::{create_host_token, create_token, verify_token, AuthHost, AuthState, AuthUser, Claims};
pub use config::{ApiConfig, StorageConfig};
pub use error::{ApiError, Result};
pub use handlers::AppState;
pub use lease::{LeaseError, LeaseService, PoolStats};
pub use openapi::ApiDoc;
pub use router::{build_router, build_router_with_state};
pub use server::ApiServer;
pub use storage::{InMemoryStore, RedbStore, Repositories, StorageError};
pub use sync::{SyncAssembler, SyncError};
