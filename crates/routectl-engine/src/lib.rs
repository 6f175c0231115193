//! Transaction Engine (spec §4.6): the state machine that turns a staged
//! set of config changes into system state, with snapshot-backed rollback
//! and a confirm-or-revert safety window.
//!
//! The engine is an explicit value, not a process-wide singleton (spec §9
//! design note): callers construct one per active-directory root and clone
//! the cheap handle to share it across tasks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use routectl_appliers::{ApplierRegistry, DEFAULT_APPLY_ORDER};
use routectl_process::{ApplyContext, CancellationToken};
use routectl_snapshot::SnapshotStore;
use routectl_store::ConfigStore;
use routectl_types::{ConfigBundle, EventKind, RouterConfError, RouterEvent, Snapshot};

/// Engine-owned defaults, mirroring the teacher's `RuntimeOptions`/config-file
/// merge: callers of `commit` may go through [`Engine::commit_with_defaults`]
/// to skip specifying timeouts every call.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub apply_order: Vec<String>,
    pub default_confirm_timeout: Duration,
    pub default_overall_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            apply_order: DEFAULT_APPLY_ORDER.iter().map(|s| s.to_string()).collect(),
            default_confirm_timeout: Duration::ZERO,
            default_overall_timeout: Duration::ZERO,
        }
    }
}

/// The transaction state machine's externally observable states (spec §4.6).
/// `Completed` and `Failed` are not held as distinct states here: both
/// resolve immediately back to `Idle` once their terminal event is
/// published, since neither blocks a subsequent `commit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    InProgress,
    Pending,
}

struct Shared {
    state: EngineState,
    pending_snapshot_id: Option<String>,
    pending_cancel: Option<oneshot::Sender<()>>,
}

impl Default for Shared {
    fn default() -> Self {
        Self { state: EngineState::Idle, pending_snapshot_id: None, pending_cancel: None }
    }
}

struct Inner {
    store: ConfigStore,
    snapshots: SnapshotStore,
    appliers: ApplierRegistry,
    events: routectl_events::EventBus,
    settings: EngineSettings,
    shared: Mutex<Shared>,
    handle: Handle,
}

/// A cheaply-cloneable handle to one transaction engine instance.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Must be called from within a running Tokio runtime: the confirm-timer
    /// task and the event bus dispatcher are spawned onto it.
    pub fn new(store: ConfigStore, snapshots: SnapshotStore, appliers: ApplierRegistry, settings: EngineSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                snapshots,
                appliers,
                events: routectl_events::EventBus::default(),
                settings,
                shared: Mutex::new(Shared::default()),
                handle: Handle::current(),
            }),
        }
    }

    pub fn state(&self) -> EngineState {
        self.inner.shared.lock().unwrap().state
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&RouterEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(callback);
    }

    // ---- §6.5 passthrough operations -------------------------------------

    pub fn show(&self, name: &str) -> Result<String, RouterConfError> {
        self.inner.store.show(name)
    }

    pub fn get(&self, path: &str) -> Result<String, RouterConfError> {
        self.inner.store.get(path)
    }

    pub fn set(&self, path: &str, value: &str) -> Result<(), RouterConfError> {
        self.inner.store.set(path, value)?;
        if let Some(config) = path.split('.').next() {
            self.publish(EventKind::ConfigChanged { name: config.to_string() });
        }
        Ok(())
    }

    pub fn changes(&self) -> Vec<String> {
        self.inner.store.staged_names()
    }

    pub fn snapshot_list(&self) -> Result<Vec<Snapshot>, RouterConfError> {
        self.inner.snapshots.list()
    }

    pub fn snapshot_restore(&self, id: &str) -> Result<Snapshot, RouterConfError> {
        self.inner.snapshots.restore(id)
    }

    pub fn snapshot_prune(&self, keep: usize) -> Result<Vec<String>, RouterConfError> {
        self.inner.snapshots.prune(keep)
    }

    /// The applier-only entry point used by service-manager integration
    /// (spec §6.5): runs one applier against the current on-disk documents,
    /// outside any transaction, snapshot, or rollback semantics.
    pub fn apply(&self, name: &str) -> Result<(), RouterConfError> {
        let applier = self
            .inner
            .appliers
            .get(name)
            .ok_or_else(|| RouterConfError::NotFound(format!("applier {name}")))?;
        let bundle = self.load_bundle(&self.inner.settings.apply_order)?;
        let ctx = ApplyContext::unbounded();
        applier.apply(&ctx, &bundle)?;
        applier.validate(&ctx)
    }

    // ---- the state machine -------------------------------------------------

    pub fn commit_with_defaults(&self, message: &str) -> Result<(), RouterConfError> {
        let confirm_t = self.inner.settings.default_confirm_timeout;
        let overall_t = self.inner.settings.default_overall_timeout;
        self.commit(message, confirm_t, overall_t)
    }

    pub fn commit(&self, message: &str, confirm_t: Duration, overall_t: Duration) -> Result<(), RouterConfError> {
        self.begin()?;

        if !self.inner.store.has_changes() {
            self.end();
            return Err(RouterConfError::NoChanges);
        }

        self.publish(EventKind::TransactionStarted { message: message.to_string() });

        let config_names = self.inner.settings.apply_order.clone();
        let snapshot = match self.inner.snapshots.create(message, &config_names) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.end();
                return Err(e);
            }
        };
        self.publish(EventKind::SnapshotCreated { snapshot_id: snapshot.metadata.id.clone() });

        let committed_names = match self.inner.store.commit() {
            Ok(names) => names,
            Err(e) => {
                self.end();
                return Err(e);
            }
        };
        self.publish(EventKind::ConfigCommitted { names: committed_names, snapshot_id: snapshot.metadata.id.clone() });

        let bundle = match self.load_bundle(&config_names) {
            Ok(bundle) => bundle,
            Err(e) => return Err(self.fail_with_rollback(&snapshot.metadata.id, e)),
        };

        let ctx = if overall_t.is_zero() {
            ApplyContext::unbounded()
        } else {
            ApplyContext::new(CancellationToken::new(), Some(overall_t))
        };

        for applier in self.inner.appliers.ordered(&self.order_refs()) {
            if let Err(e) = applier.apply(&ctx, &bundle) {
                return Err(self.fail_with_rollback(&snapshot.metadata.id, e));
            }
            if let Err(e) = applier.validate(&ctx) {
                return Err(self.fail_with_rollback(&snapshot.metadata.id, e));
            }
        }

        if confirm_t.is_zero() {
            self.end();
            self.publish(EventKind::TransactionCompleted);
            return Ok(());
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        {
            let mut shared = self.inner.shared.lock().unwrap();
            shared.state = EngineState::Pending;
            shared.pending_snapshot_id = Some(snapshot.metadata.id.clone());
            shared.pending_cancel = Some(cancel_tx);
        }

        let engine = self.clone();
        let snapshot_id = snapshot.metadata.id.clone();
        self.inner.handle.spawn(async move {
            engine.wait_for_confirm_or_revert(confirm_t, cancel_rx, snapshot_id).await;
        });

        Ok(())
    }

    pub fn confirm(&self) -> Result<(), RouterConfError> {
        let cancel_tx = {
            let mut shared = self.inner.shared.lock().unwrap();
            if !matches!(shared.state, EngineState::Pending) {
                return Err(RouterConfError::NotFound("no pending transaction to confirm".to_string()));
            }
            shared.state = EngineState::Idle;
            shared.pending_snapshot_id = None;
            shared.pending_cancel.take()
        };
        if let Some(tx) = cancel_tx {
            let _ = tx.send(());
        }
        self.publish(EventKind::TransactionCompleted);
        Ok(())
    }

    pub fn rollback(&self) -> Result<(), RouterConfError> {
        let (cancel_tx, snapshot_id) = {
            let mut shared = self.inner.shared.lock().unwrap();
            if !matches!(shared.state, EngineState::Pending) {
                return Err(RouterConfError::NotFound("no snapshot to roll back to".to_string()));
            }
            let snapshot_id = shared.pending_snapshot_id.take().expect("pending state always carries a snapshot id");
            let cancel_tx = shared.pending_cancel.take();
            shared.state = EngineState::InProgress;
            (cancel_tx, snapshot_id)
        };
        // Stop the confirm-timer task; we are performing the rollback here.
        if let Some(tx) = cancel_tx {
            let _ = tx.send(());
        }
        self.publish(EventKind::RollbackStarted { reason: "operator requested rollback".to_string() });
        self.perform_rollback(&snapshot_id)
    }

    // ---- internals -----------------------------------------------------------

    fn begin(&self) -> Result<(), RouterConfError> {
        let mut shared = self.inner.shared.lock().unwrap();
        if !matches!(shared.state, EngineState::Idle) {
            return Err(RouterConfError::Busy);
        }
        shared.state = EngineState::InProgress;
        Ok(())
    }

    fn end(&self) {
        self.inner.shared.lock().unwrap().state = EngineState::Idle;
    }

    fn publish(&self, kind: EventKind) {
        self.inner.events.publish(RouterEvent::now(kind));
    }

    fn order_refs(&self) -> Vec<&str> {
        self.inner.settings.apply_order.iter().map(String::as_str).collect()
    }

    fn load_bundle(&self, names: &[String]) -> Result<ConfigBundle, RouterConfError> {
        let mut bundle = ConfigBundle::new();
        for name in names {
            bundle.insert(name.clone(), self.inner.store.load(name)?);
        }
        Ok(bundle)
    }

    /// The confirm-timer task body: whichever of "the window elapsed" or
    /// "`confirm` closed the cancel channel" resolves first under the
    /// engine's own mutex wins (spec §4.6 confirm-timer discipline) — the
    /// `select!` here only decides which side *tries*; [`Self::fire_confirm_timeout`]
    /// and [`Self::confirm`] each re-check state under the lock before acting.
    async fn wait_for_confirm_or_revert(&self, confirm_t: Duration, cancel: oneshot::Receiver<()>, snapshot_id: String) {
        tokio::select! {
            _ = tokio::time::sleep(confirm_t) => {
                self.fire_confirm_timeout(snapshot_id);
            }
            _ = cancel => {}
        }
    }

    fn fire_confirm_timeout(&self, snapshot_id: String) {
        let should_rollback = {
            let mut shared = self.inner.shared.lock().unwrap();
            if matches!(shared.state, EngineState::Pending) {
                shared.state = EngineState::InProgress;
                shared.pending_cancel = None;
                shared.pending_snapshot_id = None;
                true
            } else {
                false
            }
        };
        if should_rollback {
            self.publish(EventKind::RollbackStarted { reason: "confirm window expired".to_string() });
            let _ = self.perform_rollback(&snapshot_id);
        }
    }

    /// Restore the snapshot and re-apply every config it holds. Leaves the
    /// engine `Idle` regardless of outcome (spec §7: a `RollbackError`
    /// leaves configs in a possibly-mixed state but does not block further
    /// commits — operator inspection is required, not an engine restart).
    fn perform_rollback(&self, snapshot_id: &str) -> Result<(), RouterConfError> {
        let result = self.inner.snapshots.restore(snapshot_id).and_then(|_| self.reapply_current_state());
        self.end();
        match &result {
            Ok(()) => {
                self.publish(EventKind::ConfigReverted {
                    names: self.inner.settings.apply_order.clone(),
                    restored_snapshot_id: snapshot_id.to_string(),
                });
            }
            Err(e) => {
                self.publish(EventKind::TransactionFailed { detail: e.to_string() });
            }
        }
        result
    }

    /// Re-applies every applier against whatever is now on disk — called
    /// right after [`routectl_snapshot::SnapshotStore::restore`] has copied
    /// the snapshot's files back over the active directory, so `store.load`
    /// already sees the restored documents.
    fn reapply_current_state(&self) -> Result<(), RouterConfError> {
        let bundle = self.load_bundle(&self.inner.settings.apply_order)?;
        let ctx = ApplyContext::unbounded();
        let mut errors = Vec::new();
        for applier in self.inner.appliers.ordered(&self.order_refs()) {
            if let Err(e) = applier.apply(&ctx, &bundle) {
                errors.push(format!("{}: {e}", applier.name()));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RouterConfError::RollbackError(errors))
        }
    }

    /// Wraps an apply/validate failure in a rollback, returning the
    /// composite error a caller should see: the original failure if
    /// rollback succeeded, or a `RollbackError` with both messages if
    /// rollback itself failed (spec §7: "applied-and-rollback-failed").
    fn fail_with_rollback(&self, snapshot_id: &str, original: RouterConfError) -> RouterConfError {
        self.publish(EventKind::RollbackStarted { reason: original.to_string() });
        match self.perform_rollback(snapshot_id) {
            Ok(()) => original,
            Err(RouterConfError::RollbackError(mut details)) => {
                details.insert(0, original.to_string());
                RouterConfError::RollbackError(details)
            }
            Err(other) => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use tempfile::tempdir;

    use routectl_types::{ConfigDocument, RouterConfError, Section};

    use super::*;

    struct RecordingApplier {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: Arc<AtomicBool>,
    }

    impl routectl_appliers::Applier for RecordingApplier {
        fn name(&self) -> &'static str {
            self.name
        }

        fn apply(&self, _ctx: &ApplyContext, _configs: &ConfigBundle) -> Result<(), RouterConfError> {
            self.log.lock().unwrap().push(format!("{}:apply", self.name));
            if self.fail.load(Ordering::SeqCst) {
                return Err(RouterConfError::apply(self.name, "forced failure"));
            }
            Ok(())
        }

        fn validate(&self, _ctx: &ApplyContext) -> Result<(), RouterConfError> {
            self.log.lock().unwrap().push(format!("{}:validate", self.name));
            Ok(())
        }

        fn rollback(&self, _ctx: &ApplyContext) -> Result<(), RouterConfError> {
            self.log.lock().unwrap().push(format!("{}:rollback", self.name));
            Ok(())
        }
    }

    struct Harness {
        engine: Engine,
        log: Arc<Mutex<Vec<String>>>,
        fail: Arc<AtomicBool>,
        events: Arc<Mutex<Vec<EventKind>>>,
        _active: tempfile::TempDir,
        _snapshots: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let active = tempdir().unwrap();
        let snapshots = tempdir().unwrap();
        std::fs::write(
            active.path().join("network"),
            "config interface 'wan'\n\toption proto 'static'\n\toption ipaddr '192.168.1.1'\n\toption netmask '255.255.255.0'\n",
        )
        .unwrap();

        let store = ConfigStore::new(active.path());
        let snapshot_store = SnapshotStore::new(snapshots.path(), active.path());

        let log = Arc::new(Mutex::new(Vec::new()));
        let fail = Arc::new(AtomicBool::new(false));
        let mut registry = ApplierRegistry::new();
        for name in ["network", "firewall", "dhcp"] {
            registry.register(Box::new(RecordingApplier {
                name: Box::leak(name.to_string().into_boxed_str()),
                log: log.clone(),
                fail: fail.clone(),
            }));
        }

        let engine = Engine::new(store, snapshot_store, registry, EngineSettings::default());

        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        engine.subscribe(move |event| events_clone.lock().unwrap().push(event.kind.clone()));

        Harness { engine, log, fail, events, _active: active, _snapshots: snapshots }
    }

    fn event_names(events: &[EventKind]) -> Vec<&'static str> {
        events
            .iter()
            .map(|e| match e {
                EventKind::ConfigChanged { .. } => "config.changed",
                EventKind::ConfigCommitted { .. } => "config.committed",
                EventKind::ConfigReverted { .. } => "config.reverted",
                EventKind::SnapshotCreated { .. } => "snapshot.created",
                EventKind::TransactionStarted { .. } => "transaction.started",
                EventKind::TransactionCompleted => "transaction.completed",
                EventKind::TransactionFailed { .. } => "transaction.failed",
                EventKind::RollbackStarted { .. } => "rollback.started",
            })
            .collect()
    }

    #[tokio::test]
    async fn commit_with_no_confirm_window_completes_immediately() {
        let h = harness();
        h.engine.set("network.wan.ipaddr", "192.168.1.100").unwrap();

        h.engine.commit("change wan ip", Duration::ZERO, Duration::ZERO).unwrap();
        tokio::task::yield_now().await;

        assert_eq!(h.engine.state(), EngineState::Idle);
        assert_eq!(h.engine.get("network.wan.ipaddr").unwrap(), "192.168.1.100");
        assert_eq!(h.engine.snapshot_list().unwrap().len(), 1);

        let names = event_names(&h.events.lock().unwrap());
        assert_eq!(names.first(), Some(&"transaction.started"));
        assert_eq!(names.last(), Some(&"transaction.completed"));
        assert_eq!(names.iter().filter(|n| **n == "snapshot.created").count(), 1);
        assert!(!names.contains(&"rollback.started"));
    }

    #[tokio::test]
    async fn commit_with_no_staged_changes_fails_and_stays_idle() {
        let h = harness();
        let err = h.engine.commit("no-op", Duration::ZERO, Duration::ZERO).unwrap_err();
        assert!(matches!(err, RouterConfError::NoChanges));
        assert_eq!(h.engine.state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn pending_transaction_times_out_and_reverts() {
        let h = harness();
        h.engine.set("network.wan.ipaddr", "10.0.0.1").unwrap();
        h.engine.commit("t", Duration::from_millis(30), Duration::ZERO).unwrap();

        assert_eq!(h.engine.state(), EngineState::Pending);
        assert_eq!(h.engine.get("network.wan.ipaddr").unwrap(), "10.0.0.1");

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(h.engine.state(), EngineState::Idle);
        assert_eq!(h.engine.get("network.wan.ipaddr").unwrap(), "192.168.1.1");
        let names = event_names(&h.events.lock().unwrap());
        assert!(names.contains(&"rollback.started"));
        assert!(names.contains(&"config.reverted"));
        assert!(!names.contains(&"transaction.completed"));
    }

    #[tokio::test]
    async fn confirm_within_window_keeps_the_change() {
        let h = harness();
        h.engine.set("network.wan.ipaddr", "10.0.0.2").unwrap();
        h.engine.commit("t", Duration::from_millis(200), Duration::ZERO).unwrap();

        h.engine.confirm().unwrap();
        assert_eq!(h.engine.state(), EngineState::Idle);

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(h.engine.get("network.wan.ipaddr").unwrap(), "10.0.0.2");
        let names = event_names(&h.events.lock().unwrap());
        assert!(!names.contains(&"rollback.started"));
        assert_eq!(names.iter().filter(|n| **n == "transaction.completed").count(), 1);
    }

    #[tokio::test]
    async fn confirm_without_a_pending_transaction_is_not_found() {
        let h = harness();
        assert!(matches!(h.engine.confirm(), Err(RouterConfError::NotFound(_))));
    }

    #[tokio::test]
    async fn operator_rollback_reverts_a_pending_transaction() {
        let h = harness();
        h.engine.set("network.wan.ipaddr", "10.0.0.3").unwrap();
        h.engine.commit("t", Duration::from_millis(500), Duration::ZERO).unwrap();

        h.engine.rollback().unwrap();

        assert_eq!(h.engine.state(), EngineState::Idle);
        assert_eq!(h.engine.get("network.wan.ipaddr").unwrap(), "192.168.1.1");

        // The timer's own fire must not run after an operator rollback already won.
        tokio::time::sleep(Duration::from_millis(600)).await;
        let names = event_names(&h.events.lock().unwrap());
        assert_eq!(names.iter().filter(|n| **n == "rollback.started").count(), 1);
    }

    #[tokio::test]
    async fn applier_failure_rolls_back_and_reports_original_error() {
        let h = harness();
        h.fail.store(true, Ordering::SeqCst);
        h.engine.set("network.wan.ipaddr", "10.0.0.4").unwrap();

        let err = h.engine.commit("t", Duration::ZERO, Duration::ZERO).unwrap_err();
        assert!(matches!(err, RouterConfError::ApplyError { .. }));
        assert_eq!(h.engine.state(), EngineState::Idle);
        assert_eq!(h.engine.get("network.wan.ipaddr").unwrap(), "192.168.1.1");

        let log = h.log.lock().unwrap();
        assert_eq!(log.first().map(String::as_str), Some("network:apply"));
        assert!(!log.contains(&"firewall:apply".to_string()));
    }

    #[tokio::test]
    async fn concurrent_commit_is_rejected_with_busy() {
        let h = harness();
        h.engine.set("network.wan.ipaddr", "10.0.0.5").unwrap();
        h.engine.commit("t", Duration::from_millis(500), Duration::ZERO).unwrap();

        h.engine.set("network.wan.ipaddr", "10.0.0.6").unwrap();
        let err = h.engine.commit("t2", Duration::ZERO, Duration::ZERO).unwrap_err();
        assert!(matches!(err, RouterConfError::Busy));
    }

    #[tokio::test]
    async fn apply_runs_a_single_applier_outside_a_transaction() {
        let h = harness();
        h.engine.apply("network").unwrap();
        let log = h.log.lock().unwrap();
        assert_eq!(*log, vec!["network:apply".to_string(), "network:validate".to_string()]);
    }

    #[tokio::test]
    async fn apply_rejects_an_unknown_applier_name() {
        let h = harness();
        assert!(matches!(h.engine.apply("bogus"), Err(RouterConfError::NotFound(_))));
    }

    #[tokio::test]
    async fn snapshot_prune_keeps_the_most_recent_n() {
        let h = harness();
        for i in 0..5 {
            h.engine.set("network.wan.ipaddr", &format!("10.0.0.{i}")).unwrap();
            h.engine.commit("t", Duration::ZERO, Duration::ZERO).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let deleted = h.engine.snapshot_prune(2).unwrap();
        assert_eq!(deleted.len(), 3);
        assert_eq!(h.engine.snapshot_list().unwrap().len(), 2);
    }

    #[test]
    fn section_helper_is_exercised_in_seed_fixture() {
        // guards the harness's hand-written seed text against drifting out of
        // sync with the parser's grammar
        let mut doc = ConfigDocument::new();
        let mut section = Section::new("interface", Some("wan".into()));
        section.set_option("proto", "static");
        doc.push(section);
        assert!(doc.named("wan").is_some());
    }
}
