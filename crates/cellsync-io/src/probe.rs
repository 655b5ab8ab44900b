//! Accessibility probe: is the document held by a live application?

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{IoError, is_sharing_violation};
use crate::target::DocumentRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    /// Another process holds the document; edits must go through the live
    /// backend.
    Locked,
    /// Direct file access is possible.
    Free,
}

/// Decides which backend a request must use.
///
/// The verdict is advisory: the document can be opened or closed right after
/// probing, so callers re-probe on every attempt.
pub trait AccessProbe: Send + Sync {
    fn probe(&self, doc: &DocumentRef) -> Result<Accessibility, IoError>;
}

/// Probe that tries to open the file for exclusive read-write access.
///
/// On Windows the open uses share mode 0 and a sharing violation means
/// `Locked`. Elsewhere there are no mandatory locks, so the probe also looks
/// for the owner files office suites drop next to an open document
/// (`~$book.xlsx`, `.~lock.book.xlsx#`).
#[derive(Debug, Clone)]
pub struct FsProbe {
    owner_files: bool,
}

impl Default for FsProbe {
    fn default() -> Self {
        Self { owner_files: true }
    }
}

impl FsProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable owner-file detection; only the exclusive open decides.
    pub fn without_owner_files(mut self) -> Self {
        self.owner_files = false;
        self
    }

    fn owner_file_present(path: &Path) -> bool {
        let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
            return false;
        };
        let name = name.to_string_lossy();
        owner_file_names(&name)
            .into_iter()
            .any(|candidate| dir.join(candidate).exists())
    }
}

fn owner_file_names(name: &str) -> Vec<PathBuf> {
    vec![
        PathBuf::from(format!("~${name}")),
        PathBuf::from(format!(".~lock.{name}#")),
    ]
}

#[cfg(windows)]
fn open_exclusive(path: &Path) -> io::Result<std::fs::File> {
    use std::os::windows::fs::OpenOptionsExt;
    OpenOptions::new()
        .read(true)
        .write(true)
        .share_mode(0)
        .open(path)
}

#[cfg(not(windows))]
fn open_exclusive(path: &Path) -> io::Result<std::fs::File> {
    OpenOptions::new().read(true).write(true).open(path)
}

impl AccessProbe for FsProbe {
    fn probe(&self, doc: &DocumentRef) -> Result<Accessibility, IoError> {
        let path = doc.path();
        let verdict = match open_exclusive(path) {
            Ok(file) => {
                drop(file);
                if self.owner_files && Self::owner_file_present(path) {
                    Accessibility::Locked
                } else {
                    Accessibility::Free
                }
            }
            Err(err) if is_sharing_violation(&err) => Accessibility::Locked,
            Err(err) => return Err(IoError::from_io(path, err)),
        };
        tracing::debug!(path = %path.display(), ?verdict, "probed document");
        Ok(verdict)
    }
}
