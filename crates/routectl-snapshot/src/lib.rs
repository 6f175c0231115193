//! Snapshot Store (spec §4.3): creates, lists, loads, validates, restores,
//! and prunes checksummed, timestamped snapshots of the active config
//! directory.

mod atomic;
mod id;
mod metadata;
mod space;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use routectl_types::{RouterConfError, Snapshot, SnapshotMetadata, SNAPSHOT_FORMAT_VERSION};
use sha2::{Digest, Sha256};

use crate::atomic::atomic_copy;
use crate::metadata::{metadata_path, read_metadata, write_metadata};
use crate::space::{available_bytes, DEFAULT_MIN_FREE_BYTES};

pub use id::generate_id;

/// Snapshots beyond this count are pruned automatically after `create`
/// (spec §4.3 step 8).
pub const AUTO_PRUNE_THRESHOLD: usize = 100;

pub struct SnapshotStore {
    root: PathBuf,
    active_dir: PathBuf,
    min_free_bytes: u64,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>, active_dir: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), active_dir: active_dir.into(), min_free_bytes: DEFAULT_MIN_FREE_BYTES }
    }

    pub fn with_min_free_bytes(mut self, min_free_bytes: u64) -> Self {
        self.min_free_bytes = min_free_bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Create a snapshot of `configs` that currently exist under the active
    /// directory. Missing source files are silently skipped.
    pub fn create(&self, message: &str, configs: &[String]) -> Result<Snapshot, RouterConfError> {
        fs::create_dir_all(&self.root).map_err(|e| RouterConfError::io(self.root.display().to_string(), e))?;

        if let Some(available) = available_bytes(&self.root)
            && available < self.min_free_bytes
        {
            return Err(RouterConfError::NoSpace);
        }

        let (id, dir) = self.reserve_snapshot_dir()?;

        match self.populate_snapshot(&dir, message, configs) {
            Ok(metadata) => {
                if self.list()?.len() > AUTO_PRUNE_THRESHOLD {
                    // Pruning failure is logged by the caller via the returned
                    // error shape, never fatal to the snapshot just created.
                    let _ = self.prune(AUTO_PRUNE_THRESHOLD);
                }
                Ok(Snapshot { metadata, dir })
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&dir);
                let _ = id; // dir already carries the id; kept for clarity at the call site
                Err(e)
            }
        }
    }

    /// Reserve a snapshot directory under a fresh id, retrying on the rare
    /// filesystem-level collision (spec §9: the 4-hex suffix alone cannot
    /// guarantee uniqueness once many creations land in the same
    /// millisecond; `fs::create_dir`'s atomicity is the real uniqueness
    /// guarantee).
    fn reserve_snapshot_dir(&self) -> Result<(String, PathBuf), RouterConfError> {
        for _ in 0..8 {
            let id = generate_id();
            let dir = self.snapshot_dir(&id);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    set_owner_only(&dir);
                    return Ok((id, dir));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(RouterConfError::io(dir.display().to_string(), e)),
            }
        }
        Err(RouterConfError::io(self.root.display().to_string(), "could not allocate a unique snapshot id"))
    }

    fn populate_snapshot(
        &self,
        dir: &Path,
        message: &str,
        configs: &[String],
    ) -> Result<SnapshotMetadata, RouterConfError> {
        let mut kept = Vec::new();
        let mut checksums = BTreeMap::new();

        for name in configs {
            let src = self.active_dir.join(name);
            if !src.exists() {
                continue;
            }
            let dest = dir.join(name);
            atomic_copy(&src, &dest).map_err(|e| RouterConfError::io(dest.display().to_string(), e))?;

            let bytes = fs::read(&dest).map_err(|e| RouterConfError::io(dest.display().to_string(), e))?;
            checksums.insert(name.clone(), hex::encode(Sha256::digest(&bytes)));
            kept.push(name.clone());
        }

        let metadata = SnapshotMetadata {
            id: dir.file_name().unwrap().to_string_lossy().to_string(),
            timestamp: Utc::now(),
            message: message.to_string(),
            configs: kept,
            version: SNAPSHOT_FORMAT_VERSION.to_string(),
            checksums,
        };
        write_metadata(dir, &metadata).map_err(|e| RouterConfError::io(metadata_path(dir).display().to_string(), e))?;
        Ok(metadata)
    }

    /// Enumerate subdirectories with a valid metadata file, sorted by
    /// metadata timestamp descending. Malformed entries are skipped.
    pub fn list(&self) -> Result<Vec<Snapshot>, RouterConfError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut snapshots = Vec::new();
        let entries = fs::read_dir(&self.root).map_err(|e| RouterConfError::io(self.root.display().to_string(), e))?;
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            if let Ok(metadata) = read_metadata(&dir) {
                snapshots.push(Snapshot { metadata, dir });
            }
        }
        snapshots.sort_by(|a, b| b.metadata.timestamp.cmp(&a.metadata.timestamp));
        Ok(snapshots)
    }

    pub fn load(&self, id: &str) -> Result<Snapshot, RouterConfError> {
        let dir = self.snapshot_dir(id);
        let metadata = read_metadata(&dir).map_err(|_| RouterConfError::NotFound(format!("snapshot {id}")))?;
        Ok(Snapshot { metadata, dir })
    }

    /// Every file in `metadata.configs` must exist, checksum, and parse.
    pub fn validate(&self, snapshot: &Snapshot) -> Result<(), RouterConfError> {
        for name in &snapshot.metadata.configs {
            let path = snapshot.config_path(name);
            let bytes = fs::read(&path).map_err(|_| RouterConfError::Corrupt(format!("{name} missing from snapshot")))?;

            if let Some(expected) = snapshot.metadata.checksums.get(name) {
                let actual = hex::encode(Sha256::digest(&bytes));
                if &actual != expected {
                    return Err(RouterConfError::Corrupt(format!("{name} checksum mismatch")));
                }
            }

            let text = String::from_utf8_lossy(&bytes);
            routectl_codec::parse(&text).map_err(|_| RouterConfError::Corrupt(format!("{name} fails to parse")))?;
        }
        Ok(())
    }

    /// Validate, then copy every snapshot config file back over the active
    /// directory. A per-file copy failure fails the whole restore, leaving
    /// earlier successful copies in place (spec §4.3, §9 partial-restore note).
    pub fn restore(&self, id: &str) -> Result<Snapshot, RouterConfError> {
        let snapshot = self.load(id)?;
        self.validate(&snapshot)?;

        fs::create_dir_all(&self.active_dir).map_err(|e| RouterConfError::io(self.active_dir.display().to_string(), e))?;

        for name in &snapshot.metadata.configs {
            let src = snapshot.config_path(name);
            let dest = self.active_dir.join(name);
            atomic_copy(&src, &dest).map_err(|e| RouterConfError::io(dest.display().to_string(), e))?;
        }

        Ok(snapshot)
    }

    pub fn delete(&self, id: &str) -> Result<(), RouterConfError> {
        let dir = self.snapshot_dir(id);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| RouterConfError::io(dir.display().to_string(), e))?;
        }
        Ok(())
    }

    /// Remove the oldest snapshots beyond `keep`, returning the deleted ids.
    pub fn prune(&self, keep: usize) -> Result<Vec<String>, RouterConfError> {
        let snapshots = self.list()?;
        let mut deleted = Vec::new();
        for snapshot in snapshots.into_iter().skip(keep) {
            self.delete(&snapshot.metadata.id)?;
            deleted.push(snapshot.metadata.id);
        }
        Ok(deleted)
    }

    pub fn latest(&self) -> Result<Option<Snapshot>, RouterConfError> {
        Ok(self.list()?.into_iter().next())
    }
}

fn set_owner_only(dir: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o700));
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
}

/// Sort key used by `list`: metadata timestamp, never the id string —
/// a backwards clock jump can produce an id that sorts before existing
/// ones (spec §9).
pub fn timestamp_of(snapshot: &Snapshot) -> DateTime<Utc> {
    snapshot.metadata.timestamp
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn seed_active(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("network"), "config interface 'wan'\n\toption ipaddr '1.1.1.1'\n").unwrap();
    }

    #[test]
    fn create_copies_existing_configs_and_skips_missing() {
        let td = tempdir().unwrap();
        let active = td.path().join("active");
        seed_active(&active);
        let store = SnapshotStore::new(td.path().join("snapshots"), active);

        let snap = store.create("seed", &["network".to_string(), "firewall".to_string()]).expect("create");
        assert_eq!(snap.metadata.configs, vec!["network".to_string()]);
        assert!(snap.metadata.checksums.contains_key("network"));
        assert!(snap.config_path("network").exists());
    }

    #[test]
    fn list_sorts_by_timestamp_descending() {
        let td = tempdir().unwrap();
        let active = td.path().join("active");
        seed_active(&active);
        let store = SnapshotStore::new(td.path().join("snapshots"), active);

        let first = store.create("one", &["network".to_string()]).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store.create("two", &["network".to_string()]).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed[0].metadata.id, second.metadata.id);
        assert_eq!(listed[1].metadata.id, first.metadata.id);
    }

    #[test]
    fn validate_detects_tampered_checksum() {
        let td = tempdir().unwrap();
        let active = td.path().join("active");
        seed_active(&active);
        let store = SnapshotStore::new(td.path().join("snapshots"), active);
        let snap = store.create("seed", &["network".to_string()]).unwrap();

        fs::write(snap.config_path("network"), "config interface 'wan'\n\toption ipaddr 'TAMPERED'\n").unwrap();

        assert!(matches!(store.validate(&snap), Err(RouterConfError::Corrupt(_))));
    }

    #[test]
    fn restore_fails_on_corrupt_snapshot_without_touching_active_dir() {
        let td = tempdir().unwrap();
        let active = td.path().join("active");
        seed_active(&active);
        let store = SnapshotStore::new(td.path().join("snapshots"), active.clone());
        let snap = store.create("seed", &["network".to_string()]).unwrap();

        fs::write(snap.config_path("network"), "TAMPERED").unwrap();
        let before = fs::read_to_string(active.join("network")).unwrap();

        assert!(matches!(store.restore(&snap.metadata.id), Err(RouterConfError::Corrupt(_))));
        let after = fs::read_to_string(active.join("network")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn prune_keeps_most_recent_n() {
        let td = tempdir().unwrap();
        let active = td.path().join("active");
        seed_active(&active);
        let store = SnapshotStore::new(td.path().join("snapshots"), active);

        for _ in 0..12 {
            store.create("s", &["network".to_string()]).unwrap();
        }
        let deleted = store.prune(5).unwrap();
        assert_eq!(deleted.len(), 7);
        assert_eq!(store.list().unwrap().len(), 5);
    }

    #[test]
    fn ten_thousand_snapshots_are_distinct() {
        let td = tempdir().unwrap();
        let active = td.path().join("active");
        seed_active(&active);
        let store = SnapshotStore::new(td.path().join("snapshots"), active);

        let mut ids = std::collections::HashSet::new();
        for _ in 0..10_000 {
            let snap = store.create("s", &["network".to_string()]).unwrap();
            assert!(ids.insert(snap.metadata.id), "snapshot id collided");
        }
    }

    #[test]
    fn delete_removes_snapshot_directory() {
        let td = tempdir().unwrap();
        let active = td.path().join("active");
        seed_active(&active);
        let store = SnapshotStore::new(td.path().join("snapshots"), active);
        let snap = store.create("seed", &["network".to_string()]).unwrap();

        store.delete(&snap.metadata.id).unwrap();
        assert!(store.load(&snap.metadata.id).is_err());
    }
}
