//! WiFi Warden
//!
//! Connectivity-driven fallback access point management for headless
//! devices with two wireless radios: one radio keeps the client (uplink)
//! connection, the other serves a local access point for configuration
//! access whenever the uplink is down. A background monitor probes
//! connectivity and reconciles AP state against it; an HTTP API exposes
//! the same operations for manual control.
//!
//! # Modules
//!
//! - [`adapter`] - Declarative NetworkManager command interface (nmcli)
//! - [`config`] - Persisted AP settings with merge-on-load semantics
//! - [`connection`] - Client-radio connect/disconnect/status wrappers
//! - [`controller`] - AP lifecycle state machine and monitor loop
//! - [`error`] - Error taxonomy for the crate
//! - [`inventory`] - Wireless radio discovery and role assignment
//! - [`probe`] - Uplink connectivity probing
//! - [`scan`] - Client-radio network scanning
//! - [`server`] - HTTP API for the portal front end
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use wifi_warden::{ApController, ConfigStore, NmcliAdapter, PingProber, inventory};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let adapter: Arc<dyn wifi_warden::NetworkAdapter> = Arc::new(NmcliAdapter::new());
//! let store = ConfigStore::new(ConfigStore::default_path()?);
//! let config = store.load();
//!
//! // Resolve which radio serves the AP and which keeps the uplink
//! let assignment = inventory::discover(adapter.as_ref(), &config).await?;
//!
//! let prober = Arc::new(PingProber::new(Arc::clone(&adapter)));
//! let controller = Arc::new(ApController::new(adapter, prober, store, config, assignment));
//!
//! controller.start_monitoring().await;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod inventory;
pub mod probe;
pub mod scan;
pub mod server;

// Re-export the types most callers need
pub use adapter::{ApProfileSpec, NetworkAdapter, NmcliAdapter};
pub use config::{ApConfig, ApConfigUpdate, ConfigStore, SECRET_PLACEHOLDER};
pub use controller::{AP_PROFILE_NAME, ApController, ApStatus, OpOutcome};
pub use error::{AdapterError, WardenError};
pub use inventory::RadioAssignment;
pub use probe::{ConnectivityResult, PingProber, Prober};
