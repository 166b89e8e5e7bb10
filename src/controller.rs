//! Access point lifecycle controller.
//!
//! Owns the AP activation state machine (`Inactive`/`Active`) and the
//! background monitor loop that reconciles AP state against uplink
//! connectivity: internet present ⇒ AP down, internet absent ⇒ AP up.
//! HTTP handlers and the monitor loop invoke the same operations against
//! one shared instance; a single write lock serializes every state-mutating
//! operation and the reconciliation step, so at most one AP transition is
//! ever in flight and concurrent requests block instead of racing.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapter::{ApProfileSpec, NetworkAdapter};
use crate::config::{ApConfig, ApConfigUpdate, ConfigStore};
use crate::inventory::RadioAssignment;
use crate::probe::{ConnectivityResult, Prober};

/// Reserved connection profile name owned by the controller.
pub const AP_PROFILE_NAME: &str = "wifi-warden-ap";

/// Settle time between teardown and setup when applying changed AP
/// parameters live.
const RESTART_DELAY: Duration = Duration::from_secs(2);

/// How long `stop_monitoring` waits for the loop to observe cancellation.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Result of a controller operation: success flag plus human-readable
/// message. Adapter and probe failures never escape as errors; they are
/// converted into a failed outcome at the operation boundary.
#[derive(Debug, Clone)]
pub struct OpOutcome {
    pub success: bool,
    pub message: String,
}

impl OpOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Consistent snapshot of controller state, plus a fresh connectivity
/// probe taken outside the state lock.
#[derive(Debug, Clone, Serialize)]
pub struct ApStatus {
    pub active: bool,
    pub monitoring: bool,
    pub ssid: String,
    pub ap_interface: String,
    pub client_interface: String,
    pub connectivity: ConnectivityResult,
}

struct RuntimeState {
    active: bool,
    monitoring: bool,
    config: ApConfig,
    assignment: RadioAssignment,
}

struct MonitorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct ApController {
    adapter: Arc<dyn NetworkAdapter>,
    prober: Arc<dyn Prober>,
    store: ConfigStore,
    state: RwLock<RuntimeState>,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl ApController {
    /// Builds a controller around an already-resolved radio assignment.
    /// The in-memory config adopts the resolved interfaces, which may
    /// differ from the persisted ones when hardware changed between runs.
    pub fn new(
        adapter: Arc<dyn NetworkAdapter>,
        prober: Arc<dyn Prober>,
        store: ConfigStore,
        mut config: ApConfig,
        assignment: RadioAssignment,
    ) -> Self {
        config.ap_interface = assignment.ap_interface.clone();
        config.client_interface = assignment.client_interface.clone();
        Self {
            adapter,
            prober,
            store,
            state: RwLock::new(RuntimeState {
                active: false,
                monitoring: false,
                config,
                assignment,
            }),
            monitor: Mutex::new(None),
        }
    }

    /// Brings the access point up. No-op success when already active.
    pub async fn setup(&self) -> OpOutcome {
        let mut state = self.state.write().await;
        self.setup_locked(&mut state).await
    }

    /// Takes the access point down. No-op success when already inactive.
    pub async fn teardown(&self) -> OpOutcome {
        let mut state = self.state.write().await;
        self.teardown_locked(&mut state).await
    }

    /// Current status snapshot plus a fresh connectivity probe.
    pub async fn status(&self) -> ApStatus {
        let (active, monitoring, ssid, assignment, timeout) = {
            let state = self.state.read().await;
            (
                state.active,
                state.monitoring,
                state.config.ssid.clone(),
                state.assignment.clone(),
                Duration::from_secs(state.config.probe_timeout_seconds),
            )
        };

        let connectivity = self.prober.probe(timeout).await;
        ApStatus {
            active,
            monitoring,
            ssid,
            ap_interface: assignment.ap_interface,
            client_interface: assignment.client_interface,
            connectivity,
        }
    }

    /// Copy of the current in-memory configuration.
    pub async fn current_config(&self) -> ApConfig {
        self.state.read().await.config.clone()
    }

    /// Copy of the resolved radio assignment.
    pub async fn radio_assignment(&self) -> RadioAssignment {
        self.state.read().await.assignment.clone()
    }

    /// Validates and applies a configuration update.
    ///
    /// Rejection leaves both the persisted file and the in-memory config
    /// untouched. On success the merged config is persisted (a write
    /// failure is logged, the in-memory update still holds) and, when the
    /// AP is active and its ssid, passphrase or interface changed, the AP
    /// is restarted to apply the new parameters live.
    pub async fn update_config(&self, update: ApConfigUpdate) -> OpOutcome {
        let mut state = self.state.write().await;

        let merged = state.config.merged(&update);
        if let Err(err) = merged.validate() {
            return OpOutcome::fail(err.to_string());
        }
        for interface in [&merged.ap_interface, &merged.client_interface] {
            if !state.assignment.available_interfaces.contains(interface) {
                return OpOutcome::fail(format!(
                    "interface '{interface}' is not an available wireless radio"
                ));
            }
        }

        let restart_needed = state.active
            && (merged.ssid != state.config.ssid
                || merged.passphrase != state.config.passphrase
                || merged.ap_interface != state.config.ap_interface);

        if let Err(err) = self.store.save(&merged) {
            warn!(%err, "failed to persist configuration, keeping in-memory update");
        }
        state.config = merged;
        state.assignment.ap_interface = state.config.ap_interface.clone();
        state.assignment.client_interface = state.config.client_interface.clone();

        if restart_needed {
            info!("access point parameters changed, restarting");
            let down = self.teardown_locked(&mut state).await;
            if !down.success {
                warn!(message = %down.message, "teardown during restart failed");
            }
            tokio::time::sleep(RESTART_DELAY).await;
            let up = self.setup_locked(&mut state).await;
            if !up.success {
                return OpOutcome::fail(format!(
                    "configuration saved but access point restart failed: {}",
                    up.message
                ));
            }
        }

        OpOutcome::ok("configuration updated")
    }

    /// Starts the connectivity monitor loop. Idempotent.
    pub async fn start_monitoring(self: &Arc<Self>) -> OpOutcome {
        let mut slot = self.monitor.lock().await;
        if slot.is_some() {
            warn!("monitoring is already running");
            return OpOutcome::ok("monitoring is already running");
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(self).monitor_loop(cancel.clone()));
        *slot = Some(MonitorHandle { cancel, task });
        drop(slot);

        self.state.write().await.monitoring = true;
        info!("started connectivity monitoring");
        OpOutcome::ok("monitoring started")
    }

    /// Stops the monitor loop and, if the AP is active, tears it down:
    /// no AP outlives the control loop that manages it.
    pub async fn stop_monitoring(&self) -> OpOutcome {
        let handle = self.monitor.lock().await.take();

        let Some(MonitorHandle { cancel, task }) = handle else {
            self.state.write().await.monitoring = false;
            return OpOutcome::ok("monitoring is not running");
        };

        cancel.cancel();
        if tokio::time::timeout(STOP_GRACE, task).await.is_err() {
            warn!("monitor loop did not exit within the grace period");
        }

        let mut state = self.state.write().await;
        state.monitoring = false;
        if state.active {
            let outcome = self.teardown_locked(&mut state).await;
            if !outcome.success {
                error!(message = %outcome.message, "failed to tear down AP while stopping monitor");
            }
        }
        info!("stopped connectivity monitoring");
        OpOutcome::ok("monitoring stopped")
    }

    /// One reconciliation pass: probe connectivity and correct AP drift.
    /// Internet present while the AP is up ⇒ teardown; internet absent
    /// while the AP is down ⇒ setup; anything else is left alone. Failures
    /// are logged, never raised; the monitor simply retries next tick.
    pub async fn reconcile(&self) {
        let mut state = self.state.write().await;
        let timeout = Duration::from_secs(state.config.probe_timeout_seconds);
        let connectivity = self.prober.probe(timeout).await;

        if connectivity.has_internet && state.active {
            info!("uplink connectivity restored, taking down access point");
            let outcome = self.teardown_locked(&mut state).await;
            if !outcome.success {
                error!(message = %outcome.message, "reconcile teardown failed");
            }
        } else if !connectivity.has_internet && !state.active {
            info!("no uplink connectivity, bringing up access point");
            let outcome = self.setup_locked(&mut state).await;
            if !outcome.success {
                error!(message = %outcome.message, "reconcile setup failed");
            }
        }
    }

    async fn monitor_loop(self: Arc<Self>, cancel: CancellationToken) {
        {
            let interval = self.state.read().await.config.poll_interval_seconds;
            info!(interval_secs = interval, "monitor loop started");
        }

        loop {
            self.reconcile().await;

            // Interval is re-read each tick so config updates take effect;
            // cancellation is only observed here, never mid-transition.
            let interval = {
                Duration::from_secs(self.state.read().await.config.poll_interval_seconds)
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("monitor loop stopped");
    }

    async fn setup_locked(&self, state: &mut RuntimeState) -> OpOutcome {
        if state.active {
            return OpOutcome::ok("access point is already active");
        }

        // Stale profile from a previous run or a failed transition
        if let Err(err) = self.adapter.delete_profile(AP_PROFILE_NAME).await {
            return OpOutcome::fail(format!("failed to clean up stale profile: {err}"));
        }

        let spec = ApProfileSpec {
            name: AP_PROFILE_NAME.to_string(),
            interface: state.assignment.ap_interface.clone(),
            ssid: state.config.ssid.clone(),
            passphrase: state.config.passphrase.clone(),
            channel: state.config.channel,
            ip_address: state.config.ip_address.clone(),
            netmask: state.config.netmask.clone(),
        };
        if let Err(err) = self.adapter.create_ap_profile(&spec).await {
            return OpOutcome::fail(format!("failed to create access point profile: {err}"));
        }

        if let Err(err) = self.adapter.activate_profile(AP_PROFILE_NAME).await {
            return OpOutcome::fail(format!("failed to start access point: {err}"));
        }

        state.active = true;
        info!(
            ssid = %state.config.ssid,
            interface = %state.assignment.ap_interface,
            "access point is now active"
        );
        OpOutcome::ok(format!("access point '{}' started", state.config.ssid))
    }

    /// Best-effort teardown: adapter errors are logged but the state flips
    /// to inactive unconditionally. A broken profile must never be
    /// treated as a running AP.
    async fn teardown_locked(&self, state: &mut RuntimeState) -> OpOutcome {
        if !state.active {
            return OpOutcome::ok("access point is not active");
        }

        if let Err(err) = self.adapter.deactivate_profile(AP_PROFILE_NAME).await {
            warn!(%err, "failed to deactivate access point profile");
        }
        if let Err(err) = self.adapter.delete_profile(AP_PROFILE_NAME).await {
            warn!(%err, "failed to delete access point profile");
        }

        state.active = false;
        info!("access point has been taken down");
        OpOutcome::ok("access point stopped")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::adapter::mock::MockAdapter;

    /// Prober returning a fixed, externally settable result.
    struct StaticProber {
        result: StdMutex<ConnectivityResult>,
    }

    impl StaticProber {
        fn new(has_link: bool, has_internet: bool) -> Arc<Self> {
            Arc::new(Self {
                result: StdMutex::new(ConnectivityResult {
                    has_link,
                    has_internet,
                }),
            })
        }

        fn set(&self, has_link: bool, has_internet: bool) {
            *self.result.lock().unwrap() = ConnectivityResult {
                has_link,
                has_internet,
            };
        }
    }

    #[async_trait]
    impl Prober for StaticProber {
        async fn probe(&self, _timeout: Duration) -> ConnectivityResult {
            *self.result.lock().unwrap()
        }
    }

    fn assignment() -> RadioAssignment {
        RadioAssignment {
            ap_interface: "wlan1".into(),
            client_interface: "wlan0".into(),
            available_interfaces: ["wlan0", "wlan1"].iter().map(|s| s.to_string()).collect(),
        }
    }

    fn controller_with(
        adapter: Arc<MockAdapter>,
        prober: Arc<StaticProber>,
        dir: &TempDir,
    ) -> Arc<ApController> {
        let store = ConfigStore::new(dir.path().join("ap_config.json"));
        Arc::new(ApController::new(
            adapter,
            prober,
            store,
            ApConfig::default(),
            assignment(),
        ))
    }

    #[tokio::test]
    async fn setup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MockAdapter::default());
        let controller = controller_with(Arc::clone(&adapter), StaticProber::new(false, false), &dir);

        let first = controller.setup().await;
        assert!(first.success, "{}", first.message);
        assert_eq!(adapter.call_count("create"), 1);
        assert_eq!(adapter.call_count("activate"), 1);

        let second = controller.setup().await;
        assert!(second.success);
        // No additional adapter traffic for the no-op
        assert_eq!(adapter.call_count("create"), 1);
        assert_eq!(adapter.call_count("activate"), 1);
    }

    #[tokio::test]
    async fn teardown_when_inactive_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MockAdapter::default());
        let controller = controller_with(Arc::clone(&adapter), StaticProber::new(false, false), &dir);

        let outcome = controller.teardown().await;
        assert!(outcome.success);
        assert_eq!(adapter.call_count("deactivate"), 0);
        assert_eq!(adapter.call_count("delete"), 0);
    }

    #[tokio::test]
    async fn activation_timeout_leaves_state_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MockAdapter::default());
        adapter.fail_activate.store(true, Ordering::SeqCst);
        let controller = controller_with(Arc::clone(&adapter), StaticProber::new(true, false), &dir);

        let outcome = controller.setup().await;
        assert!(!outcome.success);
        assert!(
            outcome.message.contains("timed out"),
            "unexpected message: {}",
            outcome.message
        );
        assert!(!controller.status().await.active);

        // The next attempt cleans up the stale profile before recreating it
        adapter.fail_activate.store(false, Ordering::SeqCst);
        let retry = controller.setup().await;
        assert!(retry.success);
        let calls = adapter.calls.lock().unwrap().clone();
        let retry_calls: Vec<&String> = calls.iter().skip(3).collect();
        assert_eq!(
            retry_calls,
            vec![
                &format!("delete:{AP_PROFILE_NAME}"),
                &format!("create:{AP_PROFILE_NAME}"),
                &format!("activate:{AP_PROFILE_NAME}"),
            ]
        );
    }

    #[tokio::test]
    async fn teardown_is_best_effort_on_adapter_errors() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MockAdapter::default());
        let controller = controller_with(Arc::clone(&adapter), StaticProber::new(false, false), &dir);

        assert!(controller.setup().await.success);
        adapter.fail_deactivate.store(true, Ordering::SeqCst);

        let outcome = controller.teardown().await;
        assert!(outcome.success);
        assert!(!controller.status().await.active);
    }

    #[tokio::test]
    async fn reconcile_tears_down_when_internet_returns() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MockAdapter::default());
        let prober = StaticProber::new(true, true);
        let controller = controller_with(Arc::clone(&adapter), Arc::clone(&prober), &dir);

        assert!(controller.setup().await.success);
        controller.reconcile().await;
        assert!(!controller.status().await.active);
        assert!(!adapter.is_activated());
    }

    #[tokio::test]
    async fn reconcile_brings_up_ap_when_offline() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MockAdapter::default());
        let controller = controller_with(Arc::clone(&adapter), StaticProber::new(false, false), &dir);

        controller.reconcile().await;
        assert!(controller.status().await.active);
        assert!(adapter.is_activated());
    }

    #[tokio::test]
    async fn reconcile_leaves_settled_states_alone() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MockAdapter::default());
        let prober = StaticProber::new(true, true);
        let controller = controller_with(Arc::clone(&adapter), Arc::clone(&prober), &dir);

        // Internet up, AP down: nothing to do
        controller.reconcile().await;
        assert!(!controller.status().await.active);
        assert_eq!(adapter.call_count("create"), 0);

        // Internet down, AP up: nothing to do
        prober.set(false, false);
        assert!(controller.setup().await.success);
        let creates_before = adapter.call_count("create");
        controller.reconcile().await;
        assert!(controller.status().await.active);
        assert_eq!(adapter.call_count("create"), creates_before);
        assert_eq!(adapter.call_count("deactivate"), 0);
    }

    #[tokio::test]
    async fn update_rejects_shared_interface_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MockAdapter::default());
        let controller = controller_with(adapter, StaticProber::new(false, false), &dir);

        let before = controller.current_config().await;
        let update = ApConfigUpdate {
            ap_interface: Some("wlan0".into()),
            ..Default::default()
        };

        let outcome = controller.update_config(update).await;
        assert!(!outcome.success);
        assert_eq!(controller.current_config().await, before);
        assert!(
            !dir.path().join("ap_config.json").exists(),
            "rejected update must not touch the store"
        );
    }

    #[tokio::test]
    async fn update_rejects_unknown_interface() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MockAdapter::default());
        let controller = controller_with(adapter, StaticProber::new(false, false), &dir);

        let update = ApConfigUpdate {
            ap_interface: Some("wlan9".into()),
            ..Default::default()
        };

        let outcome = controller.update_config(update).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("wlan9"));
        assert_eq!(controller.current_config().await.ap_interface, "wlan1");
    }

    #[tokio::test]
    async fn update_persists_and_applies_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MockAdapter::default());
        let controller = controller_with(adapter, StaticProber::new(false, false), &dir);

        let update = ApConfigUpdate {
            channel: Some(3),
            poll_interval_seconds: Some(15),
            ..Default::default()
        };

        let outcome = controller.update_config(update).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(controller.current_config().await.channel, 3);

        let persisted: ApConfig = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("ap_config.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(persisted.channel, 3);
        assert_eq!(persisted.poll_interval_seconds, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn ssid_change_restarts_an_active_ap() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MockAdapter::default());
        let controller = controller_with(Arc::clone(&adapter), StaticProber::new(false, false), &dir);

        assert!(controller.setup().await.success);
        let update = ApConfigUpdate {
            ssid: Some("Renamed".into()),
            ..Default::default()
        };

        let outcome = controller.update_config(update).await;
        assert!(outcome.success, "{}", outcome.message);
        assert!(controller.status().await.active);
        // Second create/activate pair comes from the restart
        assert_eq!(adapter.call_count("create"), 2);
        assert_eq!(adapter.call_count("activate"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn channel_change_alone_does_not_restart() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MockAdapter::default());
        let controller = controller_with(Arc::clone(&adapter), StaticProber::new(false, false), &dir);

        assert!(controller.setup().await.success);
        let update = ApConfigUpdate {
            channel: Some(3),
            ..Default::default()
        };

        assert!(controller.update_config(update).await.success);
        assert_eq!(adapter.call_count("create"), 1);
    }

    #[tokio::test]
    async fn concurrent_setup_and_teardown_stay_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MockAdapter::default());
        let controller = controller_with(Arc::clone(&adapter), StaticProber::new(false, false), &dir);

        let up = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.setup().await }
        });
        let down = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.teardown().await }
        });

        assert!(up.await.unwrap().success);
        assert!(down.await.unwrap().success);

        // Whatever the interleaving, the flag and the adapter agree
        let active = controller.status().await.active;
        assert_eq!(active, adapter.is_activated());
    }

    #[tokio::test]
    async fn start_monitoring_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MockAdapter::default());
        // Link up with internet: the loop's first pass takes no action
        let controller = controller_with(adapter, StaticProber::new(true, true), &dir);

        assert!(controller.start_monitoring().await.success);
        let again = controller.start_monitoring().await;
        assert!(again.success);
        assert!(again.message.contains("already"));

        controller.stop_monitoring().await;
    }

    #[tokio::test]
    async fn stop_monitoring_tears_down_an_active_ap() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(MockAdapter::default());
        let prober = StaticProber::new(false, false);
        let controller = controller_with(Arc::clone(&adapter), prober, &dir);

        assert!(controller.start_monitoring().await.success);
        assert!(controller.setup().await.success);
        assert!(controller.status().await.monitoring);

        let outcome = controller.stop_monitoring().await;
        assert!(outcome.success);

        let status = controller.status().await;
        assert!(!status.monitoring);
        assert!(!status.active, "no AP may outlive its control loop");
        assert!(!adapter.is_activated());
    }
}
