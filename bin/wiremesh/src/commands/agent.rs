use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::info;
use wiremesh_agent::{AgentConfig, AgentReconciler};
use wiremesh_overlay::WireGuardController;

use super::shutdown_signal;

pub(crate) async fn run_agent(
    server: String,
    token: String,
    data_dir: PathBuf,
    sync_interval: u64,
    request_timeout: u64,
) -> Result<()> {
    let mut config = AgentConfig::new(server, token)
        .with_data_dir(data_dir)
        .with_sync_interval(Duration::from_secs(sync_interval));
    config.request_timeout = Duration::from_secs(request_timeout.max(1));

    let controller = Arc::new(WireGuardController::new());
    let reconciler = AgentReconciler::from_config(&config, controller)
        .await
        .context("Failed to start agent")?;

    info!(
        server = %config.server_url,
        data_dir = %config.data_dir.display(),
        "Starting agent"
    );

    let shutdown = Arc::new(Notify::new());
    let mut task = tokio::spawn(reconciler.run_loop(shutdown.clone()));

    tokio::select! {
        result = &mut task => {
            return result
                .context("Agent task panicked")?
                .context("Agent stopped");
        }
        _ = shutdown_signal() => {}
    }

    shutdown.notify_one();
    task.await
        .context("Agent task panicked")?
        .context("Agent stopped")?;
    info!("Agent shut down");
    Ok(())
}
