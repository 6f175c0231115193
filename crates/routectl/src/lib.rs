//! `routectl`: a transactional configuration manager for a Linux-based
//! router.
//!
//! This crate wires the format codec, config store, snapshot store, event
//! bus, appliers, and transaction engine into the operations an external
//! surface (HTTP API, CLI, web UI — all out of scope here) would expose to
//! an operator. [`RouterConf::open`] builds one from [`RouterConfSettings`];
//! every operation takes a [`Reporter`] for progress/diagnostic logging,
//! exactly as the teacher's `engine::run_publish` takes one from its CLI.

mod reporter;
mod settings;

pub use reporter::{EprintlnReporter, Reporter};
pub use routectl_engine::{Engine, EngineSettings, EngineState};
pub use routectl_types::{ConfigBundle, ConfigDocument, RouterConfError, RouterEvent, Snapshot};
pub use settings::RouterConfSettings;

use anyhow::Result;
use routectl_appliers::ApplierRegistry;
use routectl_snapshot::SnapshotStore;
use routectl_store::ConfigStore;

/// The facade a caller builds once per active-directory root and shares
/// across requests — a thin, logging wrapper over [`Engine`] (spec §9: the
/// engine itself is an explicit instance, never a global).
pub struct RouterConf {
    engine: Engine,
    snapshot_retention: usize,
}

impl RouterConf {
    /// Must be called from within a running Tokio runtime (the engine's
    /// confirm-timer and the event bus's dispatcher are spawned onto it).
    pub fn open(settings: RouterConfSettings) -> Result<Self> {
        let store = ConfigStore::new(settings.active_dir.clone());
        let snapshots = SnapshotStore::new(settings.snapshot_dir.clone(), settings.active_dir.clone())
            .with_min_free_bytes(settings.min_free_bytes);
        let appliers = ApplierRegistry::with_defaults();

        let engine_settings = EngineSettings {
            apply_order: settings.apply_order(),
            default_confirm_timeout: settings.confirm_timeout_duration()?,
            default_overall_timeout: settings.overall_timeout_duration()?,
        };

        Ok(Self { engine: Engine::new(store, snapshots, appliers, engine_settings), snapshot_retention: settings.snapshot_retention })
    }

    /// The underlying engine handle, for callers that want to subscribe to
    /// the event bus directly or inspect `state()`.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn show(&self, name: &str) -> Result<String, RouterConfError> {
        self.engine.show(name)
    }

    pub fn get(&self, path: &str) -> Result<String, RouterConfError> {
        self.engine.get(path)
    }

    pub fn set(&self, reporter: &mut dyn Reporter, path: &str, value: &str) -> Result<(), RouterConfError> {
        self.engine.set(path, value)?;
        reporter.info(&format!("staged {path} = {value}"));
        Ok(())
    }

    pub fn changes(&self) -> Vec<String> {
        self.engine.changes()
    }

    /// Commits staged changes, using the engine's configured default
    /// confirm/overall timeouts (spec §6.5: `commit` without explicit
    /// timeouts falls back to configuration, mirroring the teacher's
    /// CLI-args-then-config-then-hardcoded-default merge order).
    pub fn commit(&self, reporter: &mut dyn Reporter, message: &str) -> Result<(), RouterConfError> {
        reporter.info(&format!("committing: {message}"));
        match self.engine.commit_with_defaults(message) {
            Ok(()) => {
                match self.engine.state() {
                    EngineState::Pending => reporter.info("commit applied, awaiting confirm"),
                    _ => reporter.info("commit applied and completed"),
                }
                Ok(())
            }
            Err(e) => {
                reporter.error(&format!("commit failed: {e}"));
                Err(e)
            }
        }
    }

    pub fn confirm(&self, reporter: &mut dyn Reporter) -> Result<(), RouterConfError> {
        self.engine.confirm().inspect(|()| reporter.info("transaction confirmed")).inspect_err(|e| reporter.error(&format!("confirm failed: {e}")))
    }

    pub fn rollback(&self, reporter: &mut dyn Reporter) -> Result<(), RouterConfError> {
        reporter.warn("rolling back the pending transaction");
        self.engine.rollback().inspect_err(|e| reporter.error(&format!("rollback failed: {e}")))
    }

    pub fn snapshot_list(&self) -> Result<Vec<Snapshot>, RouterConfError> {
        self.engine.snapshot_list()
    }

    pub fn snapshot_restore(&self, reporter: &mut dyn Reporter, id: &str) -> Result<Snapshot, RouterConfError> {
        reporter.warn(&format!("restoring snapshot {id}"));
        self.engine.snapshot_restore(id)
    }

    /// Prunes down to the configured retention count (spec §4.3 step 8
    /// covers the auto-prune-beyond-100 safety net; this is the
    /// operator-driven, configured-retention variant).
    pub fn snapshot_prune(&self, reporter: &mut dyn Reporter) -> Result<Vec<String>, RouterConfError> {
        let deleted = self.engine.snapshot_prune(self.snapshot_retention)?;
        if !deleted.is_empty() {
            reporter.info(&format!("pruned {} snapshot(s)", deleted.len()));
        }
        Ok(deleted)
    }

    /// The single externally-called entry point (spec §6.5): run one
    /// applier's apply+validate outside any transaction, for service
    /// manager integration. See the `routectl-applyd` binary.
    pub fn apply(&self, reporter: &mut dyn Reporter, name: &str) -> Result<(), RouterConfError> {
        reporter.info(&format!("applying {name}"));
        self.engine.apply(name).inspect_err(|e| reporter.error(&format!("apply {name} failed: {e}")))
    }
}
