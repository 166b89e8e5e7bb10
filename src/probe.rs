//! Uplink connectivity probing.
//!
//! A probe is two steps: a link-state check against the network subsystem's
//! active connections, then (only when a link exists) a single bounded
//! reachability ping against a well-known external address. Link state
//! alone never counts as internet connectivity; a captive portal that
//! blocks ping therefore keeps the fallback AP up, which is the only
//! remaining management path on a headless device.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::adapter::NetworkAdapter;

/// Well-known external address used for the reachability check.
pub const PROBE_TARGET: IpAddr = IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8));

/// Deadline for the single-packet reachability check.
const PING_DEADLINE: Duration = Duration::from_secs(3);

/// Outcome of one connectivity probe. Ephemeral, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectivityResult {
    /// Any ethernet or wifi connection reports state "activated".
    pub has_link: bool,
    /// The reachability check succeeded.
    pub has_internet: bool,
}

/// Produces a fresh [`ConnectivityResult`] per call.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probes connectivity, never blocking much longer than `timeout` plus
    /// a small fixed margin. Failure to even query the subsystem reports
    /// `{false, false}`; absence of connectivity is the conservative
    /// default on uncertainty.
    async fn probe(&self, timeout: Duration) -> ConnectivityResult;
}

/// Production prober: NetworkManager's active-connection list plus one
/// bounded ping.
pub struct PingProber {
    adapter: Arc<dyn NetworkAdapter>,
    target: IpAddr,
}

impl PingProber {
    pub fn new(adapter: Arc<dyn NetworkAdapter>) -> Self {
        Self {
            adapter,
            target: PROBE_TARGET,
        }
    }

    pub fn with_target(adapter: Arc<dyn NetworkAdapter>, target: IpAddr) -> Self {
        Self { adapter, target }
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, timeout: Duration) -> ConnectivityResult {
        let query = tokio::time::timeout(timeout, self.adapter.active_connections()).await;
        let connections = match query {
            Ok(Ok(connections)) => connections,
            Ok(Err(err)) => {
                warn!(%err, "connectivity check failed, assuming offline");
                return ConnectivityResult::default();
            }
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "connectivity check timed out, assuming offline"
                );
                return ConnectivityResult::default();
            }
        };

        let has_link = connections.iter().any(|conn| {
            matches!(
                conn.conn_type.as_str(),
                "802-3-ethernet" | "802-11-wireless"
            ) && conn.state == "activated"
        });

        if !has_link {
            return ConnectivityResult::default();
        }

        let has_internet = self
            .adapter
            .check_reachability(self.target, PING_DEADLINE)
            .await;

        ConnectivityResult {
            has_link,
            has_internet,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::adapter::ActiveConnection;
    use crate::adapter::mock::MockAdapter;

    fn active(conn_type: &str, state: &str) -> ActiveConnection {
        ActiveConnection {
            conn_type: conn_type.into(),
            state: state.into(),
        }
    }

    fn prober_over(adapter: Arc<MockAdapter>) -> PingProber {
        PingProber::new(adapter)
    }

    #[tokio::test]
    async fn link_and_reachable_means_internet() {
        let adapter = Arc::new(MockAdapter::default());
        *adapter.active.lock().unwrap() = vec![active("802-11-wireless", "activated")];
        adapter.reachable.store(true, Ordering::SeqCst);

        let result = prober_over(adapter).probe(Duration::from_secs(5)).await;
        assert_eq!(
            result,
            ConnectivityResult {
                has_link: true,
                has_internet: true
            }
        );
    }

    #[tokio::test]
    async fn link_without_reachability_is_not_internet() {
        let adapter = Arc::new(MockAdapter::default());
        *adapter.active.lock().unwrap() = vec![active("802-3-ethernet", "activated")];

        let result = prober_over(adapter).probe(Duration::from_secs(5)).await;
        assert_eq!(
            result,
            ConnectivityResult {
                has_link: true,
                has_internet: false
            }
        );
    }

    #[tokio::test]
    async fn no_activated_connection_skips_the_ping() {
        let adapter = Arc::new(MockAdapter::default());
        *adapter.active.lock().unwrap() = vec![
            active("802-11-wireless", "activating"),
            active("loopback", "activated"),
        ];

        let result = prober_over(Arc::clone(&adapter))
            .probe(Duration::from_secs(5))
            .await;
        assert_eq!(result, ConnectivityResult::default());
        assert_eq!(adapter.call_count("ping"), 0);
    }

    #[tokio::test]
    async fn query_failure_reports_offline() {
        let adapter = Arc::new(MockAdapter::default());
        adapter.fail_active_query.store(true, Ordering::SeqCst);

        let result = prober_over(adapter).probe(Duration::from_secs(5)).await;
        assert_eq!(result, ConnectivityResult::default());
    }
}
