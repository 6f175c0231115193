use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use routectl_types::SnapshotMetadata;

use crate::atomic::atomic_write;

pub(crate) const METADATA_FILE: &str = "metadata.json";

pub(crate) fn metadata_path(snapshot_dir: &Path) -> std::path::PathBuf {
    snapshot_dir.join(METADATA_FILE)
}

pub(crate) fn write_metadata(snapshot_dir: &Path, metadata: &SnapshotMetadata) -> Result<()> {
    let path = metadata_path(snapshot_dir);
    let data = serde_json::to_vec_pretty(metadata).context("failed to serialize snapshot metadata")?;
    atomic_write(&path, &data)
}

pub(crate) fn read_metadata(snapshot_dir: &Path) -> Result<SnapshotMetadata> {
    let path = metadata_path(snapshot_dir);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read metadata {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse metadata {}", path.display()))
}
