//! API server

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::config::{ApiConfig, StorageConfig};
use crate::handlers::AppState;
use crate::lease::{self, LeaseService};
use crate::router::build_router_with_state;
use crate::storage::Repositories;

/// Coordinator server: HTTP API plus the address pool reconcile loop
pub struct ApiServer {
    config: ApiConfig,
}

impl ApiServer {
    pub fn new(config: ApiConfig) -> Self {
        Self { config }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind
    }

    fn open_repositories(&self) -> anyhow::Result<Repositories> {
        Ok(match &self.config.storage {
            StorageConfig::Memory => {
                warn!("Using in-memory storage; topology is lost on restart");
                Repositories::in_memory()
            }
            StorageConfig::Redb { path } => {
                info!(path = %path.display(), "Opening redb storage");
                Repositories::redb(path)?
            }
        })
    }

    /// Run until `shutdown` resolves
    pub async fn run_with_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let addr = self.config.bind;
        let repos = self.open_repositories()?;

        let leases = lease::init_global(Arc::new(LeaseService::new(
            repos.networks.clone(),
            repos.interfaces.clone(),
        )))?;
        if let Err(e) = leases.reconcile().await {
            warn!(error = %e, "Initial address pool reconcile failed");
        }

        let stop_reconcile = Arc::new(Notify::new());
        let reconcile_task = tokio::spawn(
            leases
                .clone()
                .run_reconcile_loop(self.config.reconcile_interval, stop_reconcile.clone()),
        );

        let state = AppState::new(&self.config, repos, leases);
        let router = build_router_with_state(&self.config, state);

        info!(
            bind = %addr,
            reconcile_interval_secs = self.config.reconcile_interval.as_secs(),
            "Starting API server"
        );

        let listener = TcpListener::bind(addr).await?;
        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        stop_reconcile.notify_one();
        if let Err(e) = reconcile_task.await {
            warn!(error = %e, "Reconcile task ended abnormally");
        }

        served?;
        info!("API server shut down");
        Ok(())
    }
}
