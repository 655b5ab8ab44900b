//! The live automation seam: a running desktop application that currently
//! holds the document open.

use std::path::PathBuf;

use cellsync_common::{Dataset, Patch};
use serde::{Deserialize, Serialize};

use crate::error::IoError;
use crate::target::{DocumentRef, SheetSelector, SheetTarget};
use crate::traits::SheetSnapshot;

/// A document attached inside the live application. Only valid for the
/// request that attached it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveDocument {
    pub path: PathBuf,
    /// Workbook name as the application reports it.
    pub workbook: String,
}

/// A workbook the live application has open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenDocument {
    /// Full path as the application reports it.
    pub path: PathBuf,
    pub name: String,
    /// No unsaved changes.
    pub saved: bool,
    pub active_sheet: Option<String>,
    pub sheets: Vec<String>,
}

impl OpenDocument {
    /// Same full path or same file name, ignoring case, the way the
    /// application itself resolves workbook names.
    pub fn matches(&self, doc: &DocumentRef) -> bool {
        let path = self.path.to_string_lossy();
        let wanted = doc.path().to_string_lossy();
        path.eq_ignore_ascii_case(&wanted) || self.name.eq_ignore_ascii_case(&doc.file_name())
    }
}

/// How open workbooks are closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloseOptions {
    /// Save each workbook before closing it.
    pub save_changes: bool,
    /// Quit the application afterwards.
    pub quit_application: bool,
}

impl Default for CloseOptions {
    fn default() -> Self {
        Self {
            save_changes: true,
            quit_application: false,
        }
    }
}

/// What a backend said about one submitted operation.
///
/// Only [`BackendReply::Acknowledged`] counts as success; output that is
/// neither an explicit acknowledgment nor an explicit error is treated as a
/// failure too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reply", content = "message", rename_all = "snake_case")]
pub enum BackendReply {
    Acknowledged(String),
    Rejected(String),
    Unacknowledged(String),
}

impl BackendReply {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, BackendReply::Acknowledged(_))
    }

    pub fn message(&self) -> &str {
        match self {
            BackendReply::Acknowledged(m)
            | BackendReply::Rejected(m)
            | BackendReply::Unacknowledged(m) => m,
        }
    }
}

/// A structural workbook change.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetChange {
    Add { name: String, rows: Option<Dataset> },
    Rename { from: String, to: String },
    Delete { name: String },
}

impl SheetChange {
    pub fn describe(&self) -> String {
        match self {
            SheetChange::Add { name, .. } => format!("add sheet '{name}'"),
            SheetChange::Rename { from, to } => format!("rename sheet '{from}' to '{to}'"),
            SheetChange::Delete { name } => format!("delete sheet '{name}'"),
        }
    }
}

/// Automation surface of the application holding a locked document.
///
/// Implementations are shared across requests (`Arc<dyn LiveBackend>`) and
/// must not keep per-document state between calls.
pub trait LiveBackend: Send + Sync {
    fn backend_name(&self) -> &'static str {
        "live"
    }

    /// Cheap readiness check used by the availability wait.
    fn is_responsive(&self) -> bool;

    /// Find the workbook for `doc` in the running application, opening it
    /// there if needed.
    fn attach(&self, doc: &DocumentRef) -> Result<LiveDocument, IoError>;

    fn sheet_names(&self, doc: &LiveDocument) -> Result<Vec<String>, IoError>;

    /// Read the selected sheet. An unknown name falls back to the first
    /// sheet; no name means the active sheet.
    fn read_sheet(&self, doc: &LiveDocument, sheet: &SheetSelector)
    -> Result<SheetSnapshot, IoError>;

    /// Submit every operation of `patch` as one batch.
    fn set_cells_batch(
        &self,
        doc: &LiveDocument,
        sheet: &SheetTarget,
        patch: &Patch,
    ) -> Result<BackendReply, IoError>;

    fn change_sheets(&self, doc: &LiveDocument, change: &SheetChange)
    -> Result<BackendReply, IoError>;

    fn save(&self, doc: &LiveDocument) -> Result<BackendReply, IoError>;

    /// Every workbook the application has open. An application that is not
    /// running has none.
    fn list_open_documents(&self) -> Result<Vec<OpenDocument>, IoError>;

    /// Close the workbook for `doc`, or every open workbook when `doc` is
    /// `None`.
    fn close(&self, doc: Option<&DocumentRef>, options: CloseOptions)
    -> Result<BackendReply, IoError>;
}
