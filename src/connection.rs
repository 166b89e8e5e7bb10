//! Client-radio connection management.
//!
//! Command wrappers for connecting the uplink radio to a network,
//! disconnecting it, and querying its status through NetworkManager.
//! These never touch the AP radio; the lifecycle controller owns that.

use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::adapter::{QUERY_TIMEOUT, run_nmcli};

/// Timeout for connection establishment (association + DHCP).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Current connection status of the client interface.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub interface: String,
    /// Raw state string from nmcli (e.g., "100 (connected)").
    pub state: String,
    /// Active connection profile name, if connected.
    pub connection: Option<String>,
    /// IPv4 address with CIDR notation (e.g., "10.0.0.17/24").
    pub ip_address: Option<String>,
    pub gateway: Option<String>,
}

/// Connects the interface to a WiFi network. An empty password means an
/// open network: the password arguments are omitted entirely.
///
/// # Command Executed
/// ```bash
/// nmcli device wifi connect <ssid> [password <password>] ifname <interface>
/// ```
pub async fn connect(interface: &str, ssid: &str, password: &str) -> Result<()> {
    let mut args = vec!["device", "wifi", "connect", ssid];
    if !password.is_empty() {
        args.extend(["password", password]);
    }
    args.extend(["ifname", interface]);

    run_nmcli(&args, CONNECT_TIMEOUT).await?;
    Ok(())
}

/// Disconnects the interface from its current network. The connection
/// profile is preserved for later reconnection.
///
/// # Command Executed
/// ```bash
/// nmcli device disconnect <interface>
/// ```
pub async fn disconnect(interface: &str) -> Result<()> {
    run_nmcli(&["device", "disconnect", interface], QUERY_TIMEOUT).await?;
    Ok(())
}

/// Queries NetworkManager for the interface's state, active connection,
/// IP address and gateway.
///
/// # Command Executed
/// ```bash
/// nmcli -t device show <interface>
/// ```
pub async fn status(interface: &str) -> Result<ConnectionStatus> {
    let stdout = run_nmcli(&["-t", "device", "show", interface], QUERY_TIMEOUT).await?;
    Ok(parse_status(interface, &stdout))
}

fn parse_status(interface: &str, stdout: &str) -> ConnectionStatus {
    let mut status = ConnectionStatus {
        interface: interface.to_string(),
        state: "unknown".to_string(),
        connection: None,
        ip_address: None,
        gateway: None,
    };

    for line in stdout.lines() {
        // Split on first colon only; values may contain colons
        let parts: Vec<&str> = line.splitn(2, ':').collect();
        if parts.len() != 2 {
            continue;
        }

        let value = parts[1].to_string();
        match parts[0] {
            "GENERAL.STATE" => status.state = value,
            "GENERAL.CONNECTION" => {
                if !value.is_empty() && value != "--" {
                    status.connection = Some(value);
                }
            }
            "IP4.ADDRESS[1]" => status.ip_address = Some(value),
            "IP4.GATEWAY" => {
                if !value.is_empty() && value != "--" {
                    status.gateway = Some(value);
                }
            }
            _ => {}
        }
    }

    status
}

/// Prints connection status in a human-readable layout.
pub fn display_status(status: &ConnectionStatus) {
    println!("Interface: {}", status.interface);
    println!("State:     {}", status.state);

    if let Some(ref conn) = status.connection {
        println!("Connected: {}", conn);
    } else {
        println!("Connected: (none)");
    }

    if let Some(ref ip) = status.ip_address {
        println!("IP:        {}", ip);
    }
    if let Some(ref gw) = status.gateway {
        println!("Gateway:   {}", gw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connected_device_output() {
        let out = "GENERAL.DEVICE:wlan0\nGENERAL.STATE:100 (connected)\nGENERAL.CONNECTION:HomeNet\nIP4.ADDRESS[1]:10.0.0.17/24\nIP4.GATEWAY:10.0.0.1\n";
        let status = parse_status("wlan0", out);

        assert_eq!(status.state, "100 (connected)");
        assert_eq!(status.connection.as_deref(), Some("HomeNet"));
        assert_eq!(status.ip_address.as_deref(), Some("10.0.0.17/24"));
        assert_eq!(status.gateway.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn treats_dashes_as_absent() {
        let out = "GENERAL.STATE:30 (disconnected)\nGENERAL.CONNECTION:--\nIP4.GATEWAY:--\n";
        let status = parse_status("wlan0", out);

        assert_eq!(status.state, "30 (disconnected)");
        assert!(status.connection.is_none());
        assert!(status.gateway.is_none());
        assert!(status.ip_address.is_none());
    }
}
