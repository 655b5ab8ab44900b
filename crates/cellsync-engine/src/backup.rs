use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::SyncError;

/// `<dir>/<prefix><stem>/<stem>_<yyyyMMdd_HHmmss><ext>`
pub fn backup_path(doc: &Path, prefix: &str, at: DateTime<Local>) -> PathBuf {
    let dir = doc.parent().unwrap_or_else(|| Path::new("."));
    let stem = doc
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = doc
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stamp = at.format("%Y%m%d_%H%M%S");
    dir.join(format!("{prefix}{stem}"))
        .join(format!("{stem}_{stamp}{ext}"))
}

/// Copy `doc` to its backup location, creating the backup directory.
pub fn create_backup(doc: &Path, prefix: &str, at: DateTime<Local>) -> Result<PathBuf, SyncError> {
    let dest = backup_path(doc, prefix, at);
    if let Some(dir) = dest.parent() {
        fs::create_dir_all(dir).map_err(|e| cellsync_io::IoError::from_io(dir, e))?;
    }
    fs::copy(doc, &dest).map_err(|e| cellsync_io::IoError::from_io(doc, e))?;
    tracing::info!(from = %doc.display(), to = %dest.display(), "created backup");
    Ok(dest)
}
