use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

pub(crate) fn fsync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = fs::File::open(parent)
    {
        let _ = dir.sync_all();
    }
}

/// Write `content` to `path` via a sibling temp file, fsync it, then rename
/// over the destination. Leaves no temp file behind on any error path.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create dir {}", parent.display()))?;
    }

    let tmp = path.with_extension("tmp");
    let write_result = (|| -> Result<()> {
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("failed to create tmp file {}", tmp.display()))?;
        f.write_all(content)
            .with_context(|| format!("failed to write tmp file {}", tmp.display()))?;
        f.sync_all().context("failed to fsync tmp file")?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    fs::rename(&tmp, path).with_context(|| {
        format!("failed to rename {} to {}", tmp.display(), path.display())
    })?;
    fsync_parent_dir(path);

    Ok(())
}
