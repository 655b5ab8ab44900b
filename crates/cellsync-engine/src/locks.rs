use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Per-document request locks.
///
/// Requests for the same path issued through one engine run one at a time;
/// different paths proceed in parallel. Other processes are not covered.
#[derive(Debug, Default)]
pub struct PathLocks {
    entries: Mutex<FxHashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `path`.
    pub fn with<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let entry = self
            .entries
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .clone();
        let out = {
            let _guard = entry.lock();
            f()
        };
        let mut entries = self.entries.lock();
        // Map plus this call: nobody else is waiting on the entry. Clones are
        // only taken and dropped under the map lock, so the count is exact.
        if Arc::strong_count(&entry) == 2 {
            entries.remove(path);
        }
        drop(entry);
        out
    }

    /// Number of paths currently locked or waited on.
    pub fn active(&self) -> usize {
        self.entries.lock().len()
    }
}
