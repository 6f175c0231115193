//! Snapshot metadata shape — see spec §6.2 for the on-disk schema.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, informational — recorded at create time, not interpreted.
pub const SNAPSHOT_FORMAT_VERSION: &str = "routectl.snapshot.v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub configs: Vec<String>,
    pub version: String,
    /// config name -> lowercase hex SHA-256 of the copied file's bytes.
    pub checksums: BTreeMap<String, String>,
}

/// A loaded snapshot: its metadata plus the directory it lives in.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub dir: std::path::PathBuf,
}

impl Snapshot {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn config_path(&self, name: &str) -> std::path::PathBuf {
        self.dir.join(name)
    }
}
