//! wiremesh host agent
//!
//! Keeps the WireGuard interfaces of one host in line with the settings the
//! coordinator assembles for it:
//!
//! - [`KeyStore`] holds per-interface private keys and produces state reports
//! - [`SyncClient`] exchanges reports for settings documents
//! - [`SettingsStore`] persists each new document before it is applied
//! - [`AgentReconciler`] drives the loop and applies changed interfaces
//!   through a [`wiremesh_overlay::NetworkInterfaceController`]

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod keys;
pub mod reconciler;
pub mod state;

pub use client::{HttpSyncClient, SyncClient};
pub use config::AgentConfig;
pub use endpoint::{parse_endpoint, resolve_endpoint, Endpoint};
pub use error::{AgentError, Result};
pub use keys::KeyStore;
pub use reconciler::{AgentReconciler, ApplyReport, ReconcilePhase, TickOutcome};
pub use state::SettingsStore;
