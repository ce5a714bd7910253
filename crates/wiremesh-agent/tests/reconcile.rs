//! Reconcile loop tests against a scripted coordinator and a recording
//! interface controller

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

use wiremesh_agent::{
    AgentError, AgentReconciler, KeyStore, ReconcilePhase, SettingsStore, SyncClient, TickOutcome,
};
use wiremesh_overlay::{InterfaceConfig, NetworkInterfaceController, OverlayError};
use wiremesh_types::{HostSettings, HostState, InterfaceSettings, PeerSettings};

/// Hands out scripted documents; the last one repeats
#[derive(Default)]
struct ScriptedClient {
    responses: Mutex<VecDeque<Result<HostSettings, String>>>,
    last: Mutex<Option<HostSettings>>,
    reports: Mutex<Vec<HostState>>,
}

impl ScriptedClient {
    fn push(&self, document: HostSettings) {
        self.responses.lock().unwrap().push_back(Ok(document));
    }

    fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    fn reports(&self) -> Vec<HostState> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncClient for ScriptedClient {
    async fn synchronize(&self, report: &HostState) -> wiremesh_agent::Result<HostSettings> {
        self.reports.lock().unwrap().push(report.clone());

        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(document)) => {
                *self.last.lock().unwrap() = Some(document.clone());
                Ok(document)
            }
            Some(Err(message)) => Err(AgentError::Server {
                status: 503,
                message,
            }),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| AgentError::Server {
                    status: 503,
                    message: "no document scripted".into(),
                }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Apply(InterfaceConfig),
    Remove(String),
}

/// Records calls; interfaces in `failing` error until cleared
#[derive(Default)]
struct RecordingController {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<String>>,
    /// When set, every apply records whether this file existed at the time
    watch: Mutex<Option<PathBuf>>,
    watched: Mutex<Vec<bool>>,
}

impl RecordingController {
    fn fail(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    fn heal(&self, name: &str) {
        self.failing.lock().unwrap().remove(name);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn applied_names(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Apply(config) => Some(config.name),
                Call::Remove(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl NetworkInterfaceController for RecordingController {
    async fn apply_configuration(&self, config: &InterfaceConfig) -> wiremesh_overlay::Result<()> {
        if let Some(path) = self.watch.lock().unwrap().as_ref() {
            self.watched.lock().unwrap().push(path.exists());
        }
        self.calls.lock().unwrap().push(Call::Apply(config.clone()));

        if self.failing.lock().unwrap().contains(&config.name) {
            return Err(OverlayError::Transport(format!("{} is broken", config.name)));
        }
        Ok(())
    }

    async fn remove_interface(&self, name: &str) -> wiremesh_overlay::Result<()> {
        self.calls.lock().unwrap().push(Call::Remove(name.to_string()));
        if self.failing.lock().unwrap().contains(name) {
            return Err(OverlayError::Transport(format!("{} is stuck", name)));
        }
        Ok(())
    }
}

struct Harness {
    dir: TempDir,
    client: Arc<ScriptedClient>,
    controller: Arc<RecordingController>,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            client: Arc::new(ScriptedClient::default()),
            controller: Arc::new(RecordingController::default()),
        }
    }

    fn settings_path(&self) -> PathBuf {
        self.dir.path().join("settings.json")
    }

    async fn reconciler(&self) -> AgentReconciler {
        let keys = KeyStore::open(self.dir.path().join("keys.json"))
            .await
            .unwrap();
        AgentReconciler::new(
            self.client.clone(),
            self.controller.clone(),
            keys,
            SettingsStore::new(self.settings_path()),
        )
        .with_interval(Duration::from_millis(10))
    }
}

fn interface(name: &str, address: &str) -> InterfaceSettings {
    InterfaceSettings {
        name: name.into(),
        address: address.into(),
        listen_port: 51820,
        ..Default::default()
    }
}

fn peer(interface: &str, key: &str, address: &str) -> PeerSettings {
    PeerSettings {
        interface: interface.into(),
        public_key: key.into(),
        address: address.into(),
        port: 51820,
        allowed_ips: vec!["10.0.0.3/32".into()],
        persistent_keepalive: 25,
    }
}

fn two_interfaces() -> HostSettings {
    HostSettings {
        interfaces: vec![interface("wg0", "10.0.0.2/24"), interface("wg1", "10.1.0.2/24")],
        peers: vec![
            peer("wg0", "peer-a", "203.0.113.5"),
            peer("wg1", "peer-b", "203.0.113.6:60000"),
        ],
    }
}

#[tokio::test]
async fn test_identical_documents_apply_once() {
    let h = Harness::new();
    h.client.push(two_interfaces());
    h.client.push(two_interfaces());
    let mut reconciler = h.reconciler().await;

    let first = reconciler.tick().await.unwrap();
    let second = reconciler.tick().await.unwrap();

    assert!(matches!(first, TickOutcome::Applied(ref r) if r.applied == vec!["wg0", "wg1"]));
    assert_eq!(second, TickOutcome::Unchanged);
    assert_eq!(h.controller.applied_names(), vec!["wg0", "wg1"]);
    assert_eq!(reconciler.baseline(), &two_interfaces());
    assert_eq!(reconciler.phase(), ReconcilePhase::Idle);
}

#[tokio::test]
async fn test_peer_configuration_reaches_controller() {
    let h = Harness::new();
    h.client.push(two_interfaces());
    let mut reconciler = h.reconciler().await;
    reconciler.tick().await.unwrap();

    let calls = h.controller.calls();
    let Call::Apply(wg1) = &calls[1] else {
        panic!("expected apply, got {:?}", calls[1]);
    };
    assert_eq!(wg1.name, "wg1");
    assert_eq!(wg1.address, Some("10.1.0.2/24".parse().unwrap()));
    assert_eq!(wg1.peers.len(), 1);
    assert_eq!(wg1.peers[0].public_key, "peer-b");
    // Explicit endpoint port wins over the advertised listen port
    assert_eq!(
        wg1.peers[0].endpoint,
        Some("203.0.113.6:60000".parse().unwrap())
    );
    assert_eq!(
        wg1.private_key,
        reconciler.keys().private_key("wg1").unwrap()
    );
}

#[tokio::test]
async fn test_failed_interface_is_retried_alone() {
    let h = Harness::new();
    h.client.push(two_interfaces());
    h.controller.fail("wg1");
    let mut reconciler = h.reconciler().await;

    let TickOutcome::Applied(report) = reconciler.tick().await.unwrap() else {
        panic!("expected an apply");
    };
    assert_eq!(report.applied, vec!["wg0"]);
    assert_eq!(report.failed, vec!["wg1"]);
    assert!(reconciler.baseline().interface("wg1").is_none());

    h.controller.heal("wg1");
    let TickOutcome::Applied(report) = reconciler.tick().await.unwrap() else {
        panic!("expected a retry");
    };
    assert_eq!(report.applied, vec!["wg1"]);
    assert_eq!(report.unchanged, vec!["wg0"]);
    assert!(report.is_clean());

    assert_eq!(h.controller.applied_names(), vec!["wg0", "wg1", "wg1"]);
    assert_eq!(reconciler.tick().await.unwrap(), TickOutcome::Unchanged);
}

#[tokio::test]
async fn test_document_persisted_before_apply() {
    let h = Harness::new();
    *h.controller.watch.lock().unwrap() = Some(h.settings_path());
    h.client.push(two_interfaces());
    let mut reconciler = h.reconciler().await;

    reconciler.tick().await.unwrap();

    assert_eq!(*h.controller.watched.lock().unwrap(), vec![true, true]);
    let persisted = SettingsStore::new(h.settings_path()).load().await.unwrap();
    assert_eq!(persisted, Some(two_interfaces()));
}

#[tokio::test]
async fn test_changed_peer_reapplies_only_its_interface() {
    let h = Harness::new();
    h.client.push(two_interfaces());
    let mut changed = two_interfaces();
    changed.peers[0].persistent_keepalive = 0;
    h.client.push(changed);
    let mut reconciler = h.reconciler().await;

    reconciler.tick().await.unwrap();
    let TickOutcome::Applied(report) = reconciler.tick().await.unwrap() else {
        panic!("expected an apply");
    };

    assert_eq!(report.applied, vec!["wg0"]);
    assert_eq!(report.unchanged, vec!["wg1"]);
    let calls = h.controller.calls();
    let Call::Apply(last) = calls.last().unwrap() else {
        panic!("expected apply");
    };
    assert_eq!(last.peers[0].persistent_keepalive, None);
}

#[tokio::test]
async fn test_dropped_interface_is_removed() {
    let h = Harness::new();
    h.client.push(two_interfaces());
    let mut only_wg0 = two_interfaces();
    only_wg0.interfaces.truncate(1);
    only_wg0.peers.truncate(1);
    h.client.push(only_wg0.clone());
    let mut reconciler = h.reconciler().await;

    reconciler.tick().await.unwrap();
    let TickOutcome::Applied(report) = reconciler.tick().await.unwrap() else {
        panic!("expected an apply");
    };

    assert_eq!(report.removed, vec!["wg1"]);
    assert_eq!(h.controller.calls().last(), Some(&Call::Remove("wg1".into())));
    assert_eq!(reconciler.baseline(), &only_wg0);
}

#[tokio::test]
async fn test_failed_removal_is_retried() {
    let h = Harness::new();
    h.client.push(two_interfaces());
    let mut only_wg0 = two_interfaces();
    only_wg0.interfaces.truncate(1);
    only_wg0.peers.truncate(1);
    h.client.push(only_wg0.clone());
    let mut reconciler = h.reconciler().await;

    reconciler.tick().await.unwrap();
    h.controller.fail("wg1");
    reconciler.tick().await.unwrap();
    assert!(reconciler.baseline().interface("wg1").is_some());

    h.controller.heal("wg1");
    let TickOutcome::Applied(report) = reconciler.tick().await.unwrap() else {
        panic!("expected the removal to be retried");
    };
    assert_eq!(report.removed, vec!["wg1"]);
    assert!(report.applied.is_empty());
    assert_eq!(reconciler.baseline(), &only_wg0);
}

#[tokio::test]
async fn test_report_carries_generated_public_keys() {
    let h = Harness::new();
    h.client.push(two_interfaces());
    let mut reconciler = h.reconciler().await;

    reconciler.tick().await.unwrap();
    reconciler.tick().await.unwrap();

    let reports = h.client.reports();
    assert!(reports[0].interfaces.is_empty());
    let names: Vec<_> = reports[1].interfaces.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["wg0", "wg1"]);
    assert_eq!(
        reports[1].interfaces[0].public_key,
        reconciler.keys().public_key("wg0").unwrap()
    );
}

#[tokio::test]
async fn test_server_error_touches_nothing() {
    let h = Harness::new();
    h.client.push_error("coordinator restarting");
    let mut reconciler = h.reconciler().await;

    let err = reconciler.tick().await.unwrap_err();
    assert!(!err.is_fatal());
    assert!(h.controller.calls().is_empty());
    assert!(!h.settings_path().exists());
    assert_eq!(reconciler.phase(), ReconcilePhase::Idle);
}

#[tokio::test]
async fn test_invalid_entry_fails_only_that_interface() {
    let h = Harness::new();
    let mut document = two_interfaces();
    document.peers[1].allowed_ips = vec!["not-a-cidr".into()];
    h.client.push(document);
    let mut reconciler = h.reconciler().await;

    let TickOutcome::Applied(report) = reconciler.tick().await.unwrap() else {
        panic!("expected an apply");
    };
    assert_eq!(report.applied, vec!["wg0"]);
    assert_eq!(report.failed, vec!["wg1"]);
    assert_eq!(h.controller.applied_names(), vec!["wg0"]);
}

#[tokio::test]
async fn test_recover_reapplies_persisted_document() {
    let h = Harness::new();
    SettingsStore::new(h.settings_path())
        .save(&two_interfaces())
        .await
        .unwrap();
    let mut reconciler = h.reconciler().await;

    let report = reconciler.recover().await.unwrap().unwrap();
    assert_eq!(report.applied, vec!["wg0", "wg1"]);

    // Coordinator sends the same document: nothing left to do
    h.client.push(two_interfaces());
    assert_eq!(reconciler.tick().await.unwrap(), TickOutcome::Unchanged);
    assert_eq!(h.controller.applied_names().len(), 2);
}

#[tokio::test]
async fn test_corrupt_settings_stop_the_loop() {
    let h = Harness::new();
    std::fs::write(h.settings_path(), b"not json").unwrap();
    let reconciler = h.reconciler().await;

    let err = reconciler
        .run_loop(Arc::new(Notify::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::CorruptState { .. }));
    assert!(h.controller.calls().is_empty());
}

#[tokio::test]
async fn test_run_loop_applies_and_stops() {
    let h = Harness::new();
    h.client.push(two_interfaces());
    let reconciler = h.reconciler().await;
    let shutdown = Arc::new(Notify::new());

    let task = tokio::spawn(reconciler.run_loop(shutdown.clone()));
    for _ in 0..100 {
        if h.controller.applied_names().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.notify_one();

    task.await.unwrap().unwrap();
    // Later ticks saw the same document and applied nothing
    assert_eq!(h.controller.applied_names(), vec!["wg0", "wg1"]);
    assert!(h.client.reports().len() >= 2);
}

#[tokio::test]
async fn test_peer_without_key_does_not_block_interface() {
    let h = Harness::new();
    let mut document = two_interfaces();
    document.peers.push(peer("wg0", "", "198.51.100.9"));
    h.client.push(document.clone());
    let mut reconciler = h.reconciler().await;

    let TickOutcome::Applied(report) = reconciler.tick().await.unwrap() else {
        panic!("expected an apply");
    };
    assert_eq!(report.applied, vec!["wg0", "wg1"]);
    assert!(report.is_clean());

    let calls = h.controller.calls();
    let Call::Apply(wg0) = &calls[0] else {
        panic!("expected apply, got {:?}", calls[0]);
    };
    assert_eq!(wg0.name, "wg0");
    let keys: Vec<_> = wg0.peers.iter().map(|p| p.public_key.as_str()).collect();
    assert_eq!(keys, vec!["peer-a"]);

    // Once the peer reports its key, only wg0 is re-applied with both peers
    let mut keyed = document;
    keyed.peers[2].public_key = "peer-c".into();
    h.client.push(keyed);
    let TickOutcome::Applied(report) = reconciler.tick().await.unwrap() else {
        panic!("expected an apply");
    };
    assert_eq!(report.applied, vec!["wg0"]);
    let calls = h.controller.calls();
    let Call::Apply(wg0) = calls.last().unwrap() else {
        panic!("expected apply");
    };
    assert_eq!(wg0.peers.len(), 2);
}
