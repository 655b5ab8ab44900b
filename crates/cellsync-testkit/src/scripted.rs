use std::collections::VecDeque;
use std::sync::Arc;

use cellsync_io::{AccessProbe, Accessibility, DocumentCodec, DocumentRef, IoError, OfflineStore};
use parking_lot::Mutex;

/// Probe that replays a fixed sequence of verdicts; the last one repeats.
#[derive(Debug)]
pub struct ScriptedProbe {
    verdicts: Mutex<VecDeque<Accessibility>>,
    last: Accessibility,
    probes: Mutex<u32>,
}

impl ScriptedProbe {
    pub fn new(verdicts: impl IntoIterator<Item = Accessibility>) -> Self {
        let verdicts: VecDeque<_> = verdicts.into_iter().collect();
        let last = verdicts.back().copied().unwrap_or(Accessibility::Free);
        Self {
            verdicts: Mutex::new(verdicts),
            last,
            probes: Mutex::new(0),
        }
    }

    pub fn always(verdict: Accessibility) -> Self {
        Self::new([verdict])
    }

    pub fn probes(&self) -> u32 {
        *self.probes.lock()
    }
}

impl AccessProbe for ScriptedProbe {
    fn probe(&self, doc: &DocumentRef) -> Result<Accessibility, IoError> {
        *self.probes.lock() += 1;
        if !doc.path().exists() {
            return Err(IoError::NotFound {
                path: doc.path().to_path_buf(),
            });
        }
        Ok(self.verdicts.lock().pop_front().unwrap_or(self.last))
    }
}

/// Offline store whose first `failures` opens report the document busy,
/// then delegates to `inner`.
pub struct FlakyStore {
    inner: Arc<dyn OfflineStore>,
    remaining: Mutex<Option<u32>>,
    opens: Mutex<u32>,
}

impl FlakyStore {
    pub fn failing(inner: Arc<dyn OfflineStore>, failures: u32) -> Self {
        Self {
            inner,
            remaining: Mutex::new(Some(failures)),
            opens: Mutex::new(0),
        }
    }

    /// Never opens anything.
    pub fn always_busy(inner: Arc<dyn OfflineStore>) -> Self {
        Self {
            inner,
            remaining: Mutex::new(None),
            opens: Mutex::new(0),
        }
    }

    pub fn opens(&self) -> u32 {
        *self.opens.lock()
    }
}

impl OfflineStore for FlakyStore {
    fn open(&self, doc: &DocumentRef) -> Result<Box<dyn DocumentCodec>, IoError> {
        *self.opens.lock() += 1;
        let busy = {
            let mut remaining = self.remaining.lock();
            match remaining.as_mut() {
                None => true,
                Some(0) => false,
                Some(n) => {
                    *n -= 1;
                    true
                }
            }
        };
        if busy {
            return Err(IoError::Busy {
                message: format!("{doc} is in use"),
            });
        }
        self.inner.open(doc)
    }
}
