//! Wireless radio discovery and role assignment.
//!
//! Resolved once at startup: one radio serves the fallback access point,
//! the other keeps the client (uplink) connection. The assignment can only
//! change afterwards through a validated configuration update.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use crate::adapter::{NetworkAdapter, WirelessDevice};
use crate::config::ApConfig;
use crate::error::WardenError;

/// Physical radio-to-role mapping.
///
/// Invariant: `ap_interface != client_interface`, and both are members of
/// `available_interfaces`.
#[derive(Debug, Clone, Serialize)]
pub struct RadioAssignment {
    pub ap_interface: String,
    pub client_interface: String,
    pub available_interfaces: BTreeSet<String>,
}

/// Resolves the radio assignment from the detected hardware.
///
/// Fails with [`WardenError::Hardware`] when fewer than two wireless radios
/// are present; isolated AP and client operation is impossible on one.
/// The last-known assignment from `config` wins when those interfaces still
/// exist; otherwise disconnected radios are preferred for the AP role so
/// the uplink radio keeps its connection. If both roles name the same
/// radio, the client keeps it and the AP is reassigned to any other radio.
pub async fn discover(
    adapter: &dyn NetworkAdapter,
    config: &ApConfig,
) -> Result<RadioAssignment, WardenError> {
    let devices = adapter.list_wireless_devices().await?;
    if devices.len() < 2 {
        return Err(WardenError::Hardware(format!(
            "isolated AP and client operation needs at least two wireless radios, found {}",
            devices.len()
        )));
    }

    let available: BTreeSet<String> = devices.iter().map(|d| d.name.clone()).collect();

    let known_ap = available
        .contains(&config.ap_interface)
        .then(|| config.ap_interface.clone());
    let known_client = available
        .contains(&config.client_interface)
        .then(|| config.client_interface.clone());

    let (ap_interface, client_interface) = match (known_ap, known_client) {
        (Some(ap), Some(client)) if ap == client => {
            // Same radio requested for both roles: the client keeps it,
            // the AP moves to any other radio.
            let ap = pick_ap_radio(&devices, Some(&client)).ok_or_else(|| {
                WardenError::Hardware(format!(
                    "no wireless radio left for the AP role besides '{client}'"
                ))
            })?;
            (ap, client)
        }
        (Some(ap), Some(client)) => (ap, client),
        (Some(ap), None) => {
            let client = first_other(&devices, &ap).ok_or_else(|| {
                WardenError::Hardware(format!(
                    "no wireless radio left for the client role besides '{ap}'"
                ))
            })?;
            (ap, client)
        }
        (None, known_client) => {
            let ap = pick_ap_radio(&devices, known_client.as_deref()).ok_or_else(|| {
                WardenError::Hardware("no wireless radio available for the AP role".into())
            })?;
            let client = match known_client {
                Some(client) => client,
                None => first_other(&devices, &ap).ok_or_else(|| {
                    WardenError::Hardware(format!(
                        "no wireless radio left for the client role besides '{ap}'"
                    ))
                })?,
            };
            (ap, client)
        }
    };

    info!(%ap_interface, %client_interface, "resolved radio assignment");
    Ok(RadioAssignment {
        ap_interface,
        client_interface,
        available_interfaces: available,
    })
}

/// Preference order for the AP role: disconnected or unavailable radios
/// first (they are not carrying the uplink), then any radio.
fn pick_ap_radio(devices: &[WirelessDevice], exclude: Option<&str>) -> Option<String> {
    devices
        .iter()
        .filter(|d| Some(d.name.as_str()) != exclude)
        .find(|d| matches!(d.state.as_str(), "disconnected" | "unavailable"))
        .or_else(|| devices.iter().find(|d| Some(d.name.as_str()) != exclude))
        .map(|d| d.name.clone())
}

fn first_other(devices: &[WirelessDevice], taken: &str) -> Option<String> {
    devices
        .iter()
        .map(|d| d.name.clone())
        .find(|name| name != taken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mock::MockAdapter;

    #[tokio::test]
    async fn disconnected_radio_takes_the_ap_role() {
        let adapter =
            MockAdapter::with_devices(&[("radioA", "disconnected"), ("radioB", "connected")]);

        let assignment = discover(&adapter, &ApConfig::default()).await.unwrap();
        assert_eq!(assignment.ap_interface, "radioA");
        assert_eq!(assignment.client_interface, "radioB");
        assert!(assignment.available_interfaces.contains("radioA"));
        assert!(assignment.available_interfaces.contains("radioB"));
    }

    #[tokio::test]
    async fn single_radio_is_a_hardware_error() {
        let adapter = MockAdapter::with_devices(&[("wlan0", "connected")]);

        let err = discover(&adapter, &ApConfig::default()).await.unwrap_err();
        assert!(matches!(err, WardenError::Hardware(_)));
    }

    #[tokio::test]
    async fn last_known_assignment_wins() {
        // Both radios connected, so state-based preference would be
        // ambiguous; the persisted assignment decides.
        let adapter =
            MockAdapter::with_devices(&[("wlan0", "connected"), ("wlan1", "connected")]);

        let config = ApConfig::default(); // ap=wlan1, client=wlan0
        let assignment = discover(&adapter, &config).await.unwrap();
        assert_eq!(assignment.ap_interface, "wlan1");
        assert_eq!(assignment.client_interface, "wlan0");
    }

    #[tokio::test]
    async fn same_radio_for_both_roles_reassigns_the_ap() {
        let adapter =
            MockAdapter::with_devices(&[("wlan0", "connected"), ("wlan1", "disconnected")]);

        let mut config = ApConfig::default();
        config.ap_interface = "wlan0".into();
        config.client_interface = "wlan0".into();

        let assignment = discover(&adapter, &config).await.unwrap();
        assert_eq!(assignment.client_interface, "wlan0");
        assert_eq!(assignment.ap_interface, "wlan1");
    }

    #[tokio::test]
    async fn known_ap_with_unknown_client_picks_another_radio() {
        let adapter =
            MockAdapter::with_devices(&[("radioA", "disconnected"), ("radioB", "connected")]);

        let mut config = ApConfig::default();
        config.ap_interface = "radioB".into();
        config.client_interface = "missing0".into();

        let assignment = discover(&adapter, &config).await.unwrap();
        assert_eq!(assignment.ap_interface, "radioB");
        assert_eq!(assignment.client_interface, "radioA");
    }
}
