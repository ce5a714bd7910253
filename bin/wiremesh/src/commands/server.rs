use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use wiremesh_api::{ApiConfig, ApiServer, StorageConfig};

use super::{jwt_secret_or_default, shutdown_signal};

pub(crate) async fn serve(
    bind: SocketAddr,
    jwt_secret: Option<String>,
    db: Option<PathBuf>,
    reconcile_interval: u64,
    sync_page_size: u32,
) -> Result<()> {
    let config = ApiConfig {
        bind,
        jwt_secret: jwt_secret_or_default(jwt_secret, false),
        storage: match db {
            Some(path) => StorageConfig::Redb { path },
            None => StorageConfig::Memory,
        },
        reconcile_interval: Duration::from_secs(reconcile_interval.max(1)),
        sync_page_size: sync_page_size.max(1),
    };

    ApiServer::new(config).run_with_shutdown(shutdown_signal()).await
}
