//! boringtun-backed interface controller
//!
//! Creates userspace WireGuard TUN devices with boringtun and programs them
//! over the UAPI socket. Addressing, MTU and routes go through `ip`. No kernel
//! module or `wg` binary is required.

use crate::config::{validate_interface_name, InterfaceConfig, InterfaceHooks};
use crate::controller::NetworkInterfaceController;
use crate::error::{OverlayError, Result};
use crate::keys::key_to_hex;
use async_trait::async_trait;
use boringtun::device::{DeviceConfig, DeviceHandle};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::process::Command;
use tokio::sync::Mutex;

/// Directory boringtun places UAPI sockets in
pub const UAPI_SOCKET_DIR: &str = "/var/run/wireguard";

// ---------------------------------------------------------------------------
// UAPI helpers
// ---------------------------------------------------------------------------

/// Build the body of a UAPI `set` operation for `config`
///
/// `replace_peers=true` makes the peer list a full replacement.
pub fn uapi_set_body(config: &InterfaceConfig) -> Result<String> {
    let mut body = format!(
        "private_key={}\nlisten_port={}\nreplace_peers=true\n",
        key_to_hex(&config.private_key)?,
        config.listen_port,
    );

    for peer in &config.peers {
        let _ = writeln!(body, "public_key={}", key_to_hex(&peer.public_key)?);
        body.push_str("replace_allowed_ips=true\n");
        if let Some(endpoint) = peer.endpoint {
            let _ = writeln!(body, "endpoint={}", endpoint);
        }
        let keepalive = peer
            .persistent_keepalive
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let _ = writeln!(body, "persistent_keepalive_interval={}", keepalive);
        for allowed in &peer.allowed_ips {
            let _ = writeln!(body, "allowed_ip={}", allowed);
        }
    }

    Ok(body)
}

/// Send a UAPI `set` command to the boringtun device.
async fn uapi_set(sock_path: &Path, body: &str) -> Result<()> {
    let mut stream = UnixStream::connect(sock_path).await?;
    let msg = format!("set=1\n{}\n", body);
    stream.write_all(msg.as_bytes()).await?;
    stream.shutdown().await?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    if response.contains("errno=0") {
        Ok(())
    } else {
        Err(OverlayError::Transport(format!(
            "UAPI set failed: {}",
            response.trim()
        )))
    }
}

async fn run_ip(args: &[&str]) -> Result<()> {
    let output = Command::new("ip").args(args).output().await?;
    if !output.status.success() {
        return Err(OverlayError::Transport(format!(
            "ip {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Run a wg-quick style hook; `%i` expands to the interface name
async fn run_hook(hook: Option<&str>, interface: &str) -> Result<()> {
    let Some(hook) = hook.filter(|h| !h.trim().is_empty()) else {
        return Ok(());
    };
    let command = hook.replace("%i", interface);
    let output = Command::new("sh").arg("-c").arg(&command).output().await?;
    if !output.status.success() {
        return Err(OverlayError::Transport(format!(
            "hook '{}' failed: {}",
            command,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// WireGuardController
// ---------------------------------------------------------------------------

struct ManagedDevice {
    /// Dropping the handle destroys the TUN device
    _handle: DeviceHandle,
    hooks: InterfaceHooks,
}

/// Production [`NetworkInterfaceController`] backed by boringtun.
///
/// Devices live as long as this controller; keep it alive for the lifetime of
/// the agent.
pub struct WireGuardController {
    socket_dir: PathBuf,
    devices: Mutex<HashMap<String, ManagedDevice>>,
}

impl Default for WireGuardController {
    fn default() -> Self {
        Self::new()
    }
}

impl WireGuardController {
    pub fn new() -> Self {
        Self {
            socket_dir: PathBuf::from(UAPI_SOCKET_DIR),
            devices: Mutex::new(HashMap::new()),
        }
    }

    fn uapi_sock_path(&self, interface: &str) -> PathBuf {
        self.socket_dir.join(format!("{}.sock", interface))
    }

    /// Create the TUN interface via boringtun, clearing leftovers from a crash.
    async fn create_device(&self, name: &str) -> Result<DeviceHandle> {
        tokio::fs::create_dir_all(&self.socket_dir).await?;

        // A SIGKILLed agent leaves the TUN device behind and DeviceHandle::new()
        // would fail on re-create.
        let exists = Command::new("ip")
            .args(["link", "show", name])
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false);
        if exists {
            tracing::warn!(interface = %name, "stale network interface found, cleaning up before re-create");
            let _ = Command::new("ip").args(["link", "delete", name]).output().await;
        }

        let sock_path = self.uapi_sock_path(name);
        if tokio::fs::try_exists(&sock_path).await.unwrap_or(false) {
            tracing::warn!(path = %sock_path.display(), "removing stale UAPI socket");
            let _ = tokio::fs::remove_file(&sock_path).await;
        }

        let device_name = name.to_string();
        let cfg = DeviceConfig {
            n_threads: 2,
            use_connected_socket: true,
            #[cfg(target_os = "linux")]
            use_multi_queue: false,
            #[cfg(target_os = "linux")]
            uapi_fd: -1,
        };

        // DeviceHandle::new() blocks while spawning worker threads
        let handle = tokio::task::spawn_blocking(move || DeviceHandle::new(&device_name, cfg))
            .await
            .map_err(|e| OverlayError::Transport(format!("spawn_blocking join error: {e}")))?
            .map_err(|e| {
                OverlayError::Transport(format!(
                    "Failed to create boringtun device '{}': {e}. \
                     Ensure CAP_NET_ADMIN capability is available.",
                    name
                ))
            })?;

        tracing::info!(interface = %name, "Created boringtun device");
        Ok(handle)
    }

    async fn configure_addressing(&self, config: &InterfaceConfig) -> Result<()> {
        let name = config.name.as_str();

        if let Some(mtu) = config.mtu {
            run_ip(&["link", "set", "dev", name, "mtu", &mtu.to_string()]).await?;
        }

        if let Some(address) = config.address {
            // Flush first so an address change does not leave the old one behind
            run_ip(&["addr", "flush", "dev", name]).await?;
            run_ip(&["addr", "add", &address.to_string(), "dev", name]).await?;
        }

        run_ip(&["link", "set", "dev", name, "up"]).await?;

        if config.manages_routes() {
            for peer in &config.peers {
                for allowed in &peer.allowed_ips {
                    if config.address.is_some_and(|addr| addr.trunc().contains(allowed)) {
                        continue;
                    }
                    let cidr = allowed.to_string();
                    let mut args = vec!["route", "replace", cidr.as_str(), "dev", name];
                    if let Some(table) = config.route_table() {
                        args.extend(["table", table]);
                    }
                    run_ip(&args).await?;
                }
            }
        }

        if !config.dns.is_empty() {
            let output = Command::new("resolvectl")
                .arg("dns")
                .arg(name)
                .args(&config.dns)
                .output()
                .await;
            match output {
                Ok(output) if output.status.success() => {}
                Ok(output) => tracing::warn!(
                    interface = %name,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Failed to configure interface DNS"
                ),
                Err(e) => tracing::warn!(interface = %name, error = %e, "resolvectl unavailable"),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl NetworkInterfaceController for WireGuardController {
    async fn apply_configuration(&self, config: &InterfaceConfig) -> Result<()> {
        if !validate_interface_name(&config.name) {
            return Err(OverlayError::InvalidInterfaceName(config.name.clone()));
        }

        let mut devices = self.devices.lock().await;
        let created = !devices.contains_key(&config.name);
        if created {
            run_hook(config.hooks.pre_up.as_deref(), &config.name).await?;
            let handle = self.create_device(&config.name).await?;
            devices.insert(
                config.name.clone(),
                ManagedDevice {
                    _handle: handle,
                    hooks: config.hooks.clone(),
                },
            );
        } else if let Some(device) = devices.get_mut(&config.name) {
            device.hooks = config.hooks.clone();
        }

        let body = uapi_set_body(config)?;
        uapi_set(&self.uapi_sock_path(&config.name), &body).await?;
        tracing::debug!(interface = %config.name, peers = config.peers.len(), "Applied UAPI configuration");

        self.configure_addressing(config).await?;

        if created {
            run_hook(config.hooks.post_up.as_deref(), &config.name).await?;
        }

        tracing::info!(interface = %config.name, "Interface configured and up");
        Ok(())
    }

    async fn remove_interface(&self, name: &str) -> Result<()> {
        let removed = self.devices.lock().await.remove(name);

        match removed {
            Some(device) => {
                run_hook(device.hooks.pre_down.as_deref(), name).await?;
                drop(device._handle);
                run_hook(device.hooks.post_down.as_deref(), name).await?;
            }
            None => {
                let output = Command::new("ip")
                    .args(["link", "delete", "dev", name])
                    .output()
                    .await?;
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    if !stderr.contains("Cannot find device") {
                        return Err(OverlayError::Transport(stderr.trim().to_string()));
                    }
                }
            }
        }

        tracing::info!(interface = %name, "Removed interface");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerConfig;
    use crate::keys::generate_keypair;

    #[test]
    fn test_uapi_set_body_replaces_peers() {
        let (private_key, _) = generate_keypair();
        let (_, peer_key) = generate_keypair();

        let mut config = InterfaceConfig::new("wg0", private_key.clone());
        config.listen_port = 51820;
        config.peers.push(
            PeerConfig::new(peer_key.clone())
                .with_endpoint("203.0.113.5:51820".parse().unwrap())
                .with_allowed_ips(vec!["10.0.0.3/32".parse().unwrap(), "10.8.0.0/16".parse().unwrap()])
                .with_keepalive_secs(25),
        );

        let body = uapi_set_body(&config).unwrap();
        assert!(body.starts_with(&format!("private_key={}\n", key_to_hex(&private_key).unwrap())));
        assert!(body.contains("listen_port=51820\n"));
        assert!(body.contains("replace_peers=true\n"));
        assert!(body.contains(&format!("public_key={}\n", key_to_hex(&peer_key).unwrap())));
        assert!(body.contains("endpoint=203.0.113.5:51820\n"));
        assert!(body.contains("persistent_keepalive_interval=25\n"));
        assert!(body.contains("allowed_ip=10.0.0.3/32\n"));
        assert!(body.contains("allowed_ip=10.8.0.0/16\n"));
    }

    #[test]
    fn test_uapi_set_body_without_peers() {
        let (private_key, _) = generate_keypair();
        let body = uapi_set_body(&InterfaceConfig::new("wg0", private_key)).unwrap();
        assert!(body.contains("replace_peers=true"));
        assert!(!body.contains("public_key="));
    }

    #[test]
    fn test_uapi_set_body_rejects_bad_key() {
        let config = InterfaceConfig::new("wg0", "short");
        assert!(matches!(uapi_set_body(&config), Err(OverlayError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_apply_rejects_invalid_name() {
        let controller = WireGuardController::new();
        let (private_key, _) = generate_keypair();
        let config = InterfaceConfig::new("name-that-is-far-too-long", private_key);
        assert!(matches!(
            controller.apply_configuration(&config).await,
            Err(OverlayError::InvalidInterfaceName(_))
        ));
    }

    #[tokio::test]
    async fn test_hook_expands_interface_name() {
        run_hook(Some("test %i = wm-test0"), "wm-test0").await.unwrap();
        assert!(run_hook(Some("false"), "wm-test0").await.is_err());
        run_hook(None, "wm-test0").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "Requires CAP_NET_ADMIN capability"]
    async fn test_apply_and_remove_boringtun() {
        let controller = WireGuardController::new();
        let (private_key, _) = generate_keypair();
        let mut config = InterfaceConfig::new("wm-bt-test0", private_key);
        config.address = Some("10.42.0.1/24".parse().unwrap());

        controller.apply_configuration(&config).await.unwrap();
        controller.remove_interface("wm-bt-test0").await.unwrap();
    }
}
