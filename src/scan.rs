//! WiFi network scanning for the client radio.
//!
//! Simple command wrappers around NetworkManager's scan interface:
//!
//! 1. Trigger a rescan on the client interface
//! 2. Wait briefly for the scan to complete
//! 3. List discovered networks, deduplicate, sort by signal strength
//!
//! The rescan may fail silently when the interface is busy; the list call
//! then returns cached results from the last successful scan.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::process::Command;

use crate::adapter::{QUERY_TIMEOUT, run_nmcli};

/// Settle time between triggering a rescan and reading results.
const SCAN_SETTLE: Duration = Duration::from_millis(500);

/// A discovered WiFi network.
#[derive(Debug, Clone, Serialize)]
pub struct Network {
    /// Network name. Hidden networks are filtered out before this point.
    pub ssid: String,
    /// Signal strength as a percentage (0-100).
    pub signal: u8,
    /// Security descriptor (e.g., "WPA2", "WPA1 WPA2"). Empty for open
    /// networks.
    pub security: String,
}

/// Scans for WiFi networks visible to the given interface.
///
/// Duplicate SSIDs keep their first (strongest-AP) occurrence; hidden
/// networks are dropped; results are sorted by signal, strongest first.
///
/// # Commands Executed
/// ```bash
/// nmcli device wifi rescan ifname <interface>
/// nmcli -t -f SSID,SIGNAL,SECURITY device wifi list ifname <interface>
/// ```
pub async fn scan_networks(interface: &str) -> Result<Vec<Network>> {
    // Rescan failures are expected when a scan is already in flight
    let _ = Command::new("nmcli")
        .args(["device", "wifi", "rescan", "ifname", interface])
        .output()
        .await;

    tokio::time::sleep(SCAN_SETTLE).await;

    let stdout = run_nmcli(
        &[
            "-t",
            "-f",
            "SSID,SIGNAL,SECURITY",
            "device",
            "wifi",
            "list",
            "ifname",
            interface,
        ],
        QUERY_TIMEOUT,
    )
    .await?;

    Ok(parse_scan_results(&stdout))
}

fn parse_scan_results(stdout: &str) -> Vec<Network> {
    let mut networks = Vec::new();
    let mut seen_ssids = HashSet::new();

    for line in stdout.lines() {
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() < 3 {
            continue;
        }

        let ssid = parts[0].to_string();
        if ssid.is_empty() || seen_ssids.contains(&ssid) {
            continue;
        }
        seen_ssids.insert(ssid.clone());

        let signal: u8 = parts[1].parse().unwrap_or(0);
        // Security may itself contain colons (e.g., "WPA1 WPA2:802.1X")
        let security = parts[2..].join(":");

        networks.push(Network {
            ssid,
            signal,
            security,
        });
    }

    networks.sort_by(|a, b| b.signal.cmp(&a.signal));
    networks
}

/// Prints networks as a table with a visual signal indicator.
pub fn display_networks(networks: &[Network]) {
    if networks.is_empty() {
        println!("No networks found.");
        return;
    }

    println!("{:<32} {:>6} {}", "SSID", "SIGNAL", "SECURITY");
    println!("{}", "-".repeat(60));

    for network in networks {
        println!(
            "{:<32} {:>3}% {} {}",
            truncate_ssid(&network.ssid, 32),
            network.signal,
            signal_to_bar(network.signal),
            network.security
        );
    }
}

fn truncate_ssid(ssid: &str, max_len: usize) -> String {
    if ssid.len() > max_len {
        format!("{}...", &ssid[..max_len - 3])
    } else {
        ssid.to_string()
    }
}

fn signal_to_bar(signal: u8) -> &'static str {
    match signal {
        80..=100 => "████",
        60..=79 => "███░",
        40..=59 => "██░░",
        20..=39 => "█░░░",
        _ => "░░░░",
    }
}
