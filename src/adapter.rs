//! Network control adapter.
//!
//! This module defines the declarative contract the warden core uses to talk
//! to the host's network management subsystem, plus the production
//! implementation that drives NetworkManager's `nmcli` command-line tool.
//! Every operation carries an explicit timeout; exceeding it surfaces
//! [`AdapterError::Timeout`]. The core never shells out directly; it only
//! sees this trait, so the state machine is testable against an in-memory
//! fake.
//!
//! # Requirements (production adapter)
//!
//! - NetworkManager must be installed and running
//! - The `nmcli` command must be available in PATH
//! - User must have permission to manage network connections

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::AdapterError;

/// Timeout for short profile operations (modify/delete/add).
pub const SHORT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for listing/query operations.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for profile activation, the heaviest operation (DHCP-shared
/// setup, radio mode switch).
pub const ACTIVATE_TIMEOUT: Duration = Duration::from_secs(20);

/// A wireless radio as reported by the network subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirelessDevice {
    /// Interface name (e.g., "wlan0").
    pub name: String,
    /// Device state string (e.g., "connected", "disconnected", "unavailable").
    pub state: String,
}

/// An active connection entry from the network subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConnection {
    /// Connection type (e.g., "802-3-ethernet", "802-11-wireless").
    pub conn_type: String,
    /// Connection state (e.g., "activated", "activating").
    pub state: String,
}

/// Everything needed to create an access point connection profile.
#[derive(Debug, Clone)]
pub struct ApProfileSpec {
    /// Reserved profile name, owned by the controller.
    pub name: String,
    /// Interface the AP radio is bound to.
    pub interface: String,
    pub ssid: String,
    /// Empty string means an open network (no security block).
    pub passphrase: String,
    pub channel: u8,
    /// Host address the AP serves from (e.g., "192.168.4.1").
    pub ip_address: String,
    /// Dotted-quad netmask (e.g., "255.255.255.0").
    pub netmask: String,
}

/// Converts a dotted-quad netmask into a CIDR prefix length.
///
/// Returns `None` for unparseable or non-contiguous masks.
pub fn netmask_prefix_len(netmask: &str) -> Option<u8> {
    let addr: Ipv4Addr = netmask.parse().ok()?;
    let bits = u32::from(addr);
    let prefix = bits.leading_ones();
    if bits.count_ones() != prefix {
        return None;
    }
    Some(prefix as u8)
}

/// Declarative command interface to the host network manager.
///
/// The warden core owns the decisions; implementations own the mechanism.
/// All methods are potentially slow blocking I/O against an external system
/// service and must enforce their own per-call timeout.
#[async_trait]
pub trait NetworkAdapter: Send + Sync {
    /// List wireless devices in the subsystem's reported order.
    async fn list_wireless_devices(&self) -> Result<Vec<WirelessDevice>, AdapterError>;

    /// Create (but do not activate) an AP-mode connection profile.
    async fn create_ap_profile(&self, spec: &ApProfileSpec) -> Result<(), AdapterError>;

    /// Bring a connection profile up.
    async fn activate_profile(&self, name: &str) -> Result<(), AdapterError>;

    /// Bring a connection profile down.
    async fn deactivate_profile(&self, name: &str) -> Result<(), AdapterError>;

    /// Delete a connection profile. Idempotent: absence of the profile is
    /// not an error.
    async fn delete_profile(&self, name: &str) -> Result<(), AdapterError>;

    /// Query currently active connections (any type, not just wireless).
    async fn active_connections(&self) -> Result<Vec<ActiveConnection>, AdapterError>;

    /// Single-packet reachability check against `addr`, bounded by
    /// `deadline`. Returns `false` on any failure, never an error.
    async fn check_reachability(&self, addr: IpAddr, deadline: Duration) -> bool;
}

/// Runs `nmcli` with the given arguments under a timeout and returns stdout.
///
/// Non-zero exit becomes [`AdapterError::CommandFailed`] carrying stderr
/// (or stdout when stderr is empty, matching nmcli's habit of printing some
/// errors there).
pub(crate) async fn run_nmcli(args: &[&str], timeout: Duration) -> Result<String, AdapterError> {
    let command = format!("nmcli {}", args.join(" "));
    debug!(%command, "running");

    let result = tokio::time::timeout(timeout, Command::new("nmcli").args(args).output()).await;

    let output = match result {
        Err(_) => {
            return Err(AdapterError::Timeout {
                command,
                timeout_secs: timeout.as_secs(),
            });
        }
        Ok(Err(source)) => return Err(AdapterError::Spawn { command, source }),
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let message = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(AdapterError::CommandFailed { command, message });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Production adapter backed by NetworkManager's `nmcli`.
#[derive(Debug, Default)]
pub struct NmcliAdapter;

impl NmcliAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn parse_wireless_devices(stdout: &str) -> Vec<WirelessDevice> {
    let mut devices = Vec::new();
    for line in stdout.lines() {
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() >= 3 && parts[1] == "wifi" {
            devices.push(WirelessDevice {
                name: parts[0].to_string(),
                state: parts[2].to_string(),
            });
        }
    }
    devices
}

fn parse_active_connections(stdout: &str) -> Vec<ActiveConnection> {
    let mut connections = Vec::new();
    for line in stdout.lines() {
        // Split on first colon only; TYPE never contains one but be safe
        let parts: Vec<&str> = line.splitn(2, ':').collect();
        if parts.len() == 2 {
            connections.push(ActiveConnection {
                conn_type: parts[0].to_string(),
                state: parts[1].to_string(),
            });
        }
    }
    connections
}

#[async_trait]
impl NetworkAdapter for NmcliAdapter {
    /// # Command Executed
    /// ```bash
    /// nmcli -t -f DEVICE,TYPE,STATE device
    /// ```
    async fn list_wireless_devices(&self) -> Result<Vec<WirelessDevice>, AdapterError> {
        let stdout = run_nmcli(&["-t", "-f", "DEVICE,TYPE,STATE", "device"], QUERY_TIMEOUT).await?;
        Ok(parse_wireless_devices(&stdout))
    }

    /// Creates the profile in three steps, mirroring how NetworkManager
    /// models a hotspot: add a bare wifi connection, switch it to AP mode
    /// with a shared IPv4 method, then attach WPA-PSK security when a
    /// passphrase is set.
    ///
    /// # Commands Executed
    /// ```bash
    /// nmcli connection add type wifi ifname <iface> con-name <name> autoconnect no ssid <ssid>
    /// nmcli connection modify <name> 802-11-wireless.mode ap 802-11-wireless.band bg \
    ///     802-11-wireless.channel <ch> ipv4.method shared ipv4.addresses <ip>/<prefix>
    /// nmcli connection modify <name> 802-11-wireless-security.key-mgmt wpa-psk \
    ///     802-11-wireless-security.psk <passphrase>   # only when passphrase non-empty
    /// ```
    async fn create_ap_profile(&self, spec: &ApProfileSpec) -> Result<(), AdapterError> {
        let prefix = netmask_prefix_len(&spec.netmask).ok_or_else(|| {
            AdapterError::Parse(format!("invalid netmask '{}'", spec.netmask))
        })?;

        run_nmcli(
            &[
                "connection",
                "add",
                "type",
                "wifi",
                "ifname",
                &spec.interface,
                "con-name",
                &spec.name,
                "autoconnect",
                "no",
                "ssid",
                &spec.ssid,
            ],
            SHORT_OP_TIMEOUT,
        )
        .await?;

        let channel = spec.channel.to_string();
        let address = format!("{}/{}", spec.ip_address, prefix);
        run_nmcli(
            &[
                "connection",
                "modify",
                &spec.name,
                "802-11-wireless.mode",
                "ap",
                "802-11-wireless.band",
                "bg",
                "802-11-wireless.channel",
                &channel,
                "ipv4.method",
                "shared",
                "ipv4.addresses",
                &address,
            ],
            SHORT_OP_TIMEOUT,
        )
        .await?;

        if !spec.passphrase.is_empty() {
            run_nmcli(
                &[
                    "connection",
                    "modify",
                    &spec.name,
                    "802-11-wireless-security.key-mgmt",
                    "wpa-psk",
                    "802-11-wireless-security.psk",
                    &spec.passphrase,
                ],
                SHORT_OP_TIMEOUT,
            )
            .await?;
        }

        Ok(())
    }

    /// # Command Executed
    /// ```bash
    /// nmcli connection up <name>
    /// ```
    async fn activate_profile(&self, name: &str) -> Result<(), AdapterError> {
        run_nmcli(&["connection", "up", name], ACTIVATE_TIMEOUT).await?;
        Ok(())
    }

    /// # Command Executed
    /// ```bash
    /// nmcli connection down <name>
    /// ```
    async fn deactivate_profile(&self, name: &str) -> Result<(), AdapterError> {
        run_nmcli(&["connection", "down", name], SHORT_OP_TIMEOUT).await?;
        Ok(())
    }

    /// # Command Executed
    /// ```bash
    /// nmcli connection delete <name>
    /// ```
    ///
    /// nmcli exits non-zero for a profile that does not exist; that case is
    /// treated as success so cleanup can always run before setup.
    async fn delete_profile(&self, name: &str) -> Result<(), AdapterError> {
        match run_nmcli(&["connection", "delete", name], SHORT_OP_TIMEOUT).await {
            Ok(_) => Ok(()),
            Err(AdapterError::CommandFailed { message, .. })
                if message.contains("unknown connection") =>
            {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// # Command Executed
    /// ```bash
    /// nmcli -t -f TYPE,STATE connection show --active
    /// ```
    async fn active_connections(&self) -> Result<Vec<ActiveConnection>, AdapterError> {
        let stdout = run_nmcli(
            &["-t", "-f", "TYPE,STATE", "connection", "show", "--active"],
            QUERY_TIMEOUT,
        )
        .await?;
        Ok(parse_active_connections(&stdout))
    }

    /// # Command Executed
    /// ```bash
    /// ping -c 1 -W <deadline> <addr>
    /// ```
    ///
    /// The outer timeout adds a 2 second margin over ping's own deadline so
    /// a wedged ping process cannot stall the caller.
    async fn check_reachability(&self, addr: IpAddr, deadline: Duration) -> bool {
        let deadline_secs = deadline.as_secs().max(1).to_string();
        let target = addr.to_string();
        let result = tokio::time::timeout(
            deadline + Duration::from_secs(2),
            Command::new("ping")
                .args(["-c", "1", "-W", &deadline_secs, &target])
                .output(),
        )
        .await;

        matches!(result, Ok(Ok(output)) if output.status.success())
    }
}


#[cfg(test)]
pub(crate) mod mock {
    //! Scriptable in-memory adapter used across the crate's tests.

    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[derive(Default)]
    pub(crate) struct MockAdapter {
        pub devices: Mutex<Vec<WirelessDevice>>,
        pub active: Mutex<Vec<ActiveConnection>>,
        pub reachable: AtomicBool,
        /// When set, `activate_profile` fails with a timeout.
        pub fail_activate: AtomicBool,
        /// When set, `deactivate_profile` fails.
        pub fail_deactivate: AtomicBool,
        /// When set, `active_connections` fails with a timeout.
        pub fail_active_query: AtomicBool,
        /// Existing profile names.
        pub profiles: Mutex<HashSet<String>>,
        /// The profile currently up, if any.
        pub activated: Mutex<Option<String>>,
        /// Chronological log of every adapter call.
        pub calls: Mutex<Vec<String>>,
    }

    impl MockAdapter {
        pub fn with_devices(devices: &[(&str, &str)]) -> Self {
            let adapter = Self::default();
            *adapter.devices.lock().unwrap() = devices
                .iter()
                .map(|(name, state)| WirelessDevice {
                    name: (*name).to_string(),
                    state: (*state).to_string(),
                })
                .collect();
            adapter
        }

        pub fn log(&self, entry: impl Into<String>) {
            self.calls.lock().unwrap().push(entry.into());
        }

        pub fn call_count(&self, prefix: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|call| call.starts_with(prefix))
                .count()
        }

        pub fn is_activated(&self) -> bool {
            self.activated.lock().unwrap().is_some()
        }
    }

    #[async_trait]
    impl NetworkAdapter for MockAdapter {
        async fn list_wireless_devices(&self) -> Result<Vec<WirelessDevice>, AdapterError> {
            self.log("list");
            Ok(self.devices.lock().unwrap().clone())
        }

        async fn create_ap_profile(&self, spec: &ApProfileSpec) -> Result<(), AdapterError> {
            self.log(format!("create:{}", spec.name));
            self.profiles.lock().unwrap().insert(spec.name.clone());
            Ok(())
        }

        async fn activate_profile(&self, name: &str) -> Result<(), AdapterError> {
            self.log(format!("activate:{name}"));
            if self.fail_activate.load(Ordering::SeqCst) {
                return Err(AdapterError::Timeout {
                    command: format!("nmcli connection up {name}"),
                    timeout_secs: ACTIVATE_TIMEOUT.as_secs(),
                });
            }
            if !self.profiles.lock().unwrap().contains(name) {
                return Err(AdapterError::CommandFailed {
                    command: format!("nmcli connection up {name}"),
                    message: format!("unknown connection '{name}'"),
                });
            }
            *self.activated.lock().unwrap() = Some(name.to_string());
            Ok(())
        }

        async fn deactivate_profile(&self, name: &str) -> Result<(), AdapterError> {
            self.log(format!("deactivate:{name}"));
            if self.fail_deactivate.load(Ordering::SeqCst) {
                return Err(AdapterError::CommandFailed {
                    command: format!("nmcli connection down {name}"),
                    message: "device busy".into(),
                });
            }
            let mut activated = self.activated.lock().unwrap();
            if activated.as_deref() == Some(name) {
                *activated = None;
            }
            Ok(())
        }

        async fn delete_profile(&self, name: &str) -> Result<(), AdapterError> {
            self.log(format!("delete:{name}"));
            self.profiles.lock().unwrap().remove(name);
            let mut activated = self.activated.lock().unwrap();
            if activated.as_deref() == Some(name) {
                *activated = None;
            }
            Ok(())
        }

        async fn active_connections(&self) -> Result<Vec<ActiveConnection>, AdapterError> {
            self.log("active");
            if self.fail_active_query.load(Ordering::SeqCst) {
                return Err(AdapterError::Timeout {
                    command: "nmcli connection show --active".into(),
                    timeout_secs: QUERY_TIMEOUT.as_secs(),
                });
            }
            Ok(self.active.lock().unwrap().clone())
        }

        async fn check_reachability(&self, _addr: IpAddr, _deadline: Duration) -> bool {
            self.log("ping");
            self.reachable.load(Ordering::SeqCst)
        }
    }
}
