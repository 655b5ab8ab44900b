use std::path::{Path, PathBuf};

use cellsync_common::{Dataset, Patch};
use cellsync_io::{
    BackendReply, CloseOptions, DocumentRef, IoError, LiveBackend, LiveDocument, OpenDocument,
    SheetChange, SheetSelector, SheetSnapshot, SheetTarget,
};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct State {
    sheets: Vec<(String, Dataset)>,
    responsive: bool,
    reject_batches: u32,
    batch_reply: Option<BackendReply>,
    calls: Vec<String>,
    saves: u32,
    open: Vec<PathBuf>,
    dirty: bool,
    quit: bool,
}

/// In-memory stand-in for a running spreadsheet application.
///
/// Holds one workbook, listed as open under every path it was attached or
/// opened at. Every call is logged by name; failures are scripted up front.
#[derive(Debug)]
pub struct FakeLive {
    state: Mutex<State>,
}

impl Default for FakeLive {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeLive {
    /// One empty `Sheet1`, responsive.
    pub fn new() -> Self {
        Self::with_sheets(vec![("Sheet1".to_string(), Dataset::new())])
    }

    pub fn with_sheets(sheets: Vec<(String, Dataset)>) -> Self {
        Self {
            state: Mutex::new(State {
                sheets,
                responsive: true,
                ..Default::default()
            }),
        }
    }

    /// Reject the next `n` batches.
    pub fn reject_batches(self, n: u32) -> Self {
        self.state.lock().reject_batches = n;
        self
    }

    /// Answer every batch with `reply` without touching the workbook.
    pub fn always_reply(self, reply: BackendReply) -> Self {
        self.state.lock().batch_reply = Some(reply);
        self
    }

    pub fn unresponsive(self) -> Self {
        self.state.lock().responsive = false;
        self
    }

    pub fn set_responsive(&self, responsive: bool) {
        self.state.lock().responsive = responsive;
    }

    pub fn sheet(&self, name: &str) -> Option<Dataset> {
        self.state
            .lock()
            .sheets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.state.lock().sheets.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == name).count()
    }

    pub fn saves(&self) -> u32 {
        self.state.lock().saves
    }

    /// List the workbook as open at `path` without attaching to it.
    pub fn with_open(self, path: impl AsRef<Path>) -> Self {
        self.state.lock().open.push(path.as_ref().to_path_buf());
        self
    }

    pub fn open_paths(&self) -> Vec<PathBuf> {
        self.state.lock().open.clone()
    }

    /// Whether the last close asked the application to quit.
    pub fn has_quit(&self) -> bool {
        self.state.lock().quit
    }

    fn describe_open(st: &State, path: &Path) -> OpenDocument {
        OpenDocument {
            path: path.to_path_buf(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            saved: !st.dirty,
            active_sheet: st.sheets.first().map(|(n, _)| n.clone()),
            sheets: st.sheets.iter().map(|(n, _)| n.clone()).collect(),
        }
    }

    fn log(state: &mut State, call: &str) {
        state.calls.push(call.to_string());
    }
}

impl LiveBackend for FakeLive {
    fn backend_name(&self) -> &'static str {
        "fake-live"
    }

    fn is_responsive(&self) -> bool {
        let mut st = self.state.lock();
        Self::log(&mut st, "is_responsive");
        st.responsive
    }

    fn attach(&self, doc: &DocumentRef) -> Result<LiveDocument, IoError> {
        let mut st = self.state.lock();
        Self::log(&mut st, "attach");
        if !st.open.iter().any(|p| p == doc.path()) {
            st.open.push(doc.path().to_path_buf());
        }
        Ok(LiveDocument {
            path: doc.path().to_path_buf(),
            workbook: doc.file_name(),
        })
    }

    fn sheet_names(&self, _doc: &LiveDocument) -> Result<Vec<String>, IoError> {
        let mut st = self.state.lock();
        Self::log(&mut st, "sheet_names");
        Ok(st.sheets.iter().map(|(n, _)| n.clone()).collect())
    }

    fn read_sheet(
        &self,
        _doc: &LiveDocument,
        sheet: &SheetSelector,
    ) -> Result<SheetSnapshot, IoError> {
        let mut st = self.state.lock();
        Self::log(&mut st, "read_sheet");
        let found = sheet
            .name()
            .and_then(|name| st.sheets.iter().find(|(n, _)| n == name))
            .or_else(|| st.sheets.first())
            .cloned();
        let (name, dataset) =
            found.ok_or_else(|| IoError::Script("workbook has no sheets".to_string()))?;
        Ok(SheetSnapshot {
            sheet: name,
            sheets: st.sheets.iter().map(|(n, _)| n.clone()).collect(),
            dataset,
        })
    }

    fn set_cells_batch(
        &self,
        _doc: &LiveDocument,
        target: &SheetTarget,
        patch: &Patch,
    ) -> Result<BackendReply, IoError> {
        let mut st = self.state.lock();
        Self::log(&mut st, "set_cells_batch");
        if let Some(reply) = &st.batch_reply {
            return Ok(reply.clone());
        }
        if st.reject_batches > 0 {
            st.reject_batches -= 1;
            return Ok(BackendReply::Rejected("batch rejected".to_string()));
        }
        let idx = match st.sheets.iter().position(|(n, _)| *n == target.name) {
            Some(i) => i,
            None if target.create => {
                st.sheets.push((target.name.clone(), Dataset::new()));
                st.sheets.len() - 1
            }
            None => {
                return Ok(BackendReply::Rejected(format!(
                    "sheet '{}' not found",
                    target.name
                )));
            }
        };
        let updated = patch.apply_to(&st.sheets[idx].1);
        st.sheets[idx].1 = updated;
        st.dirty = true;
        Ok(BackendReply::Acknowledged(format!(
            "{} operations applied",
            patch.len()
        )))
    }

    fn change_sheets(
        &self,
        _doc: &LiveDocument,
        change: &SheetChange,
    ) -> Result<BackendReply, IoError> {
        let mut st = self.state.lock();
        Self::log(&mut st, "change_sheets");
        let position = |st: &State, name: &str| st.sheets.iter().position(|(n, _)| n == name);
        let reply = match change {
            SheetChange::Add { name, rows } => {
                if position(&*st, name).is_some() {
                    BackendReply::Rejected(format!("sheet '{name}' already exists"))
                } else {
                    let seeded = rows
                        .as_ref()
                        .map(|r| Patch::from_dataset(r).apply_to(&Dataset::new()))
                        .unwrap_or_default();
                    st.sheets.push((name.clone(), seeded));
                    BackendReply::Acknowledged(change.describe())
                }
            }
            SheetChange::Rename { from, to } => match position(&*st, from) {
                Some(i) => {
                    st.sheets[i].0 = to.clone();
                    BackendReply::Acknowledged(change.describe())
                }
                None => BackendReply::Rejected(format!("sheet '{from}' not found")),
            },
            SheetChange::Delete { name } => match position(&*st, name) {
                Some(_) if st.sheets.len() == 1 => {
                    BackendReply::Rejected("cannot delete the last sheet".to_string())
                }
                Some(i) => {
                    st.sheets.remove(i);
                    BackendReply::Acknowledged(change.describe())
                }
                None => BackendReply::Rejected(format!("sheet '{name}' not found")),
            },
        };
        if reply.is_acknowledged() {
            st.dirty = true;
        }
        Ok(reply)
    }

    fn save(&self, _doc: &LiveDocument) -> Result<BackendReply, IoError> {
        let mut st = self.state.lock();
        Self::log(&mut st, "save");
        st.saves += 1;
        st.dirty = false;
        Ok(BackendReply::Acknowledged("saved".to_string()))
    }

    fn list_open_documents(&self) -> Result<Vec<OpenDocument>, IoError> {
        let mut st = self.state.lock();
        Self::log(&mut st, "list_open_documents");
        if st.quit {
            return Ok(Vec::new());
        }
        Ok(st.open.iter().map(|p| Self::describe_open(&st, p)).collect())
    }

    fn close(
        &self,
        doc: Option<&DocumentRef>,
        options: CloseOptions,
    ) -> Result<BackendReply, IoError> {
        let mut st = self.state.lock();
        Self::log(&mut st, "close");
        let closing: Vec<PathBuf> = match doc {
            Some(doc) => {
                let found = st
                    .open
                    .iter()
                    .find(|p| Self::describe_open(&st, p).matches(doc))
                    .cloned();
                match found {
                    Some(path) => vec![path],
                    None => {
                        return Ok(BackendReply::Rejected(format!(
                            "workbook not open: {}",
                            doc.path().display()
                        )));
                    }
                }
            }
            None => st.open.clone(),
        };
        if options.save_changes && st.dirty && !closing.is_empty() {
            st.saves += 1;
            st.dirty = false;
        }
        st.open.retain(|p| !closing.contains(p));
        if options.quit_application {
            st.quit = true;
            st.responsive = false;
        }
        Ok(BackendReply::Acknowledged(format!(
            "closed {} workbook(s)",
            closing.len()
        )))
    }
}
