//! Host reconcile loop
//!
//! Each tick reports the host's public keys, receives the desired
//! [`HostSettings`] and, when it differs from what was last applied, persists
//! it and pushes every changed interface through the
//! [`NetworkInterfaceController`]. An interface that fails to apply is left out
//! of the baseline so the next tick retries it.

use ipnet::IpNet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use wiremesh_overlay::{
    InterfaceConfig, InterfaceHooks, NetworkInterfaceController, PeerConfig,
};
use wiremesh_types::{HostSettings, InterfaceSettings, PeerSettings};

use crate::client::{HttpSyncClient, SyncClient};
use crate::config::AgentConfig;
use crate::endpoint::resolve_endpoint;
use crate::error::{AgentError, Result};
use crate::keys::KeyStore;
use crate::state::SettingsStore;

/// Where the reconciler is within a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    Idle,
    Reporting,
    Awaiting,
    Applying,
}

/// What applying one document did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: Vec<String>,
    pub unchanged: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of a single tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Document matched the baseline; nothing touched
    Unchanged,
    Applied(ApplyReport),
}

pub struct AgentReconciler {
    client: Arc<dyn SyncClient>,
    controller: Arc<dyn NetworkInterfaceController>,
    keys: KeyStore,
    settings: SettingsStore,
    /// Last document minus the interfaces that failed to apply
    baseline: HostSettings,
    interval: Duration,
    phase: ReconcilePhase,
}

impl AgentReconciler {
    pub fn new(
        client: Arc<dyn SyncClient>,
        controller: Arc<dyn NetworkInterfaceController>,
        keys: KeyStore,
        settings: SettingsStore,
    ) -> Self {
        Self {
            client,
            controller,
            keys,
            settings,
            baseline: HostSettings::default(),
            interval: Duration::from_secs(30),
            phase: ReconcilePhase::Idle,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Build a reconciler talking HTTP to the configured coordinator
    pub async fn from_config(
        config: &AgentConfig,
        controller: Arc<dyn NetworkInterfaceController>,
    ) -> Result<Self> {
        config.validate()?;
        let client = HttpSyncClient::new(config)?;
        let keys = KeyStore::open(config.keys_path()).await?;
        let settings = SettingsStore::new(config.settings_path());

        Ok(Self::new(Arc::new(client), controller, keys, settings)
            .with_interval(config.sync_interval))
    }

    pub fn phase(&self) -> ReconcilePhase {
        self.phase
    }

    /// Settings currently known to be applied
    pub fn baseline(&self) -> &HostSettings {
        &self.baseline
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Re-apply the persisted document, if any
    ///
    /// Runs before the first tick so a restarted host converges without the
    /// coordinator. A corrupt settings file is fatal.
    pub async fn recover(&mut self) -> Result<Option<ApplyReport>> {
        let Some(document) = self.settings.load().await? else {
            debug!("No persisted settings to recover");
            return Ok(None);
        };

        info!(
            interfaces = document.interfaces.len(),
            "Re-applying persisted settings"
        );
        self.phase = ReconcilePhase::Applying;
        let report = self.apply(&document).await;
        self.phase = ReconcilePhase::Idle;
        Ok(Some(report))
    }

    /// One report / fetch / apply cycle
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let outcome = self.run_tick().await;
        self.phase = ReconcilePhase::Idle;
        outcome
    }

    async fn run_tick(&mut self) -> Result<TickOutcome> {
        self.phase = ReconcilePhase::Reporting;
        let report = self.keys.report();

        self.phase = ReconcilePhase::Awaiting;
        let document = self.client.synchronize(&report).await?;

        if document == self.baseline {
            debug!("Host settings unchanged");
            return Ok(TickOutcome::Unchanged);
        }

        self.settings.save(&document).await?;

        self.phase = ReconcilePhase::Applying;
        Ok(TickOutcome::Applied(self.apply(&document).await))
    }

    /// Apply the interfaces of `document` that differ from the baseline and
    /// remove the ones it no longer names
    async fn apply(&mut self, document: &HostSettings) -> ApplyReport {
        let mut report = ApplyReport::default();

        for iface in &document.interfaces {
            let peers: Vec<&PeerSettings> = document.peers_for(&iface.name).collect();
            if self.is_applied(iface, &peers) {
                report.unchanged.push(iface.name.clone());
                continue;
            }

            match self.apply_interface(iface, &peers).await {
                Ok(()) => {
                    info!(interface = %iface.name, peers = peers.len(), "Applied interface");
                    report.applied.push(iface.name.clone());
                }
                Err(e) => {
                    warn!(interface = %iface.name, error = %e, "Failed to apply interface, will retry");
                    report.failed.push(iface.name.clone());
                }
            }
        }

        let mut next = document.without_interfaces(&report.failed);

        let stale: Vec<InterfaceSettings> = self
            .baseline
            .interfaces
            .iter()
            .filter(|old| document.interface(&old.name).is_none())
            .cloned()
            .collect();
        for old in stale {
            match self.controller.remove_interface(&old.name).await {
                Ok(()) => {
                    info!(interface = %old.name, "Removed interface");
                    report.removed.push(old.name);
                }
                Err(e) => {
                    // Keep it in the baseline so the removal is retried
                    warn!(interface = %old.name, error = %e, "Failed to remove interface, will retry");
                    next.peers
                        .extend(self.baseline.peers_for(&old.name).cloned());
                    next.interfaces.push(old.clone());
                    report.failed.push(old.name);
                }
            }
        }

        self.baseline = next;
        report
    }

    fn is_applied(&self, iface: &InterfaceSettings, peers: &[&PeerSettings]) -> bool {
        self.baseline.interface(&iface.name) == Some(iface)
            && self.baseline.peers_for(&iface.name).eq(peers.iter().copied())
    }

    async fn apply_interface(
        &mut self,
        iface: &InterfaceSettings,
        peers: &[&PeerSettings],
    ) -> Result<()> {
        let private_key = self.keys.ensure(&iface.name).await?;
        let config = compose_interface(iface, peers, private_key).await?;
        self.controller.apply_configuration(&config).await?;
        Ok(())
    }

    /// Recover, then tick every interval until `shutdown` is notified
    ///
    /// Returns early only for fatal errors; everything else is logged and
    /// retried on the next tick.
    pub async fn run_loop(mut self, shutdown: Arc<Notify>) -> Result<()> {
        if let Err(e) = self.recover().await {
            error!(error = %e, "Cannot recover persisted settings");
            return Err(e);
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs(), "Agent reconcile loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => match self.tick().await {
                    Ok(TickOutcome::Unchanged) => {}
                    Ok(TickOutcome::Applied(report)) => debug!(
                        applied = report.applied.len(),
                        removed = report.removed.len(),
                        failed = report.failed.len(),
                        "Reconcile tick finished"
                    ),
                    Err(e) if e.is_fatal() => {
                        error!(error = %e, "Stopping agent");
                        return Err(e);
                    }
                    Err(e) => warn!(error = %e, "Reconcile tick failed"),
                },
                _ = shutdown.notified() => {
                    info!("Agent reconcile loop stopping");
                    return Ok(());
                }
            }
        }
    }
}

/// Turn one settings entry and its peers into a controller configuration
async fn compose_interface(
    iface: &InterfaceSettings,
    peers: &[&PeerSettings],
    private_key: String,
) -> Result<InterfaceConfig> {
    let invalid = |reason: String| AgentError::InvalidSettings {
        interface: iface.name.clone(),
        reason,
    };

    let address = match iface.address.trim() {
        "" => None,
        addr => Some(
            addr.parse::<IpNet>()
                .map_err(|e| invalid(format!("address '{}': {}", addr, e)))?,
        ),
    };

    let mut peer_configs = Vec::with_capacity(peers.len());
    for peer in peers {
        // The peer's agent has not reported a key yet
        if peer.public_key.trim().is_empty() {
            debug!(
                interface = %iface.name,
                peer = %peer.address,
                "Skipping peer without a public key"
            );
            continue;
        }

        let allowed_ips = peer
            .allowed_ips
            .iter()
            .map(|cidr| {
                cidr.trim()
                    .parse::<IpNet>()
                    .map_err(|e| invalid(format!("allowed IP '{}': {}", cidr, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut config = PeerConfig::new(peer.public_key.clone())
            .with_allowed_ips(allowed_ips)
            .with_keepalive_secs(peer.persistent_keepalive);
        if let Some(endpoint) = resolve_endpoint(&peer.address, peer.port).await? {
            config = config.with_endpoint(endpoint);
        }
        peer_configs.push(config);
    }

    let mut config = InterfaceConfig::new(iface.name.clone(), private_key);
    config.address = address;
    config.listen_port = iface.listen_port;
    config.peers = peer_configs;
    config.table = iface.table.clone();
    config.dns = iface.dns.clone();
    config.mtu = iface.mtu;
    config.hooks = InterfaceHooks {
        pre_up: iface.pre_up.clone(),
        post_up: iface.post_up.clone(),
        pre_down: iface.pre_down.clone(),
        post_down: iface.post_down.clone(),
    };
    Ok(config)
}
