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

pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
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

    fs::rename(&tmp, path)
        .with_context(|| format!("failed to rename {} to {}", tmp.display(), path.display()))?;
    fsync_parent_dir(path);
    Ok(())
}

/// Copy `src` to `dest` via a temp file in `dest`'s directory, preserving
/// the source file's mode, then fsync + rename into place.
pub(crate) fn atomic_copy(src: &Path, dest: &Path) -> Result<()> {
    let content = fs::read(src).with_context(|| format!("failed to read {}", src.display()))?;
    atomic_write(dest, &content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = fs::metadata(src) {
            let _ = fs::set_permissions(dest, fs::Permissions::from_mode(meta.permissions().mode()));
        }
    }

    Ok(())
}
