//! Caller-facing results. Failures are carried as data, never raised.

use std::path::PathBuf;

use cellsync_common::Dataset;
use cellsync_io::{CloseOptions, OpenDocument};
use serde::Serialize;

use crate::compile::CellFailure;
use crate::error::{ErrorKind, SyncError};
use crate::merge::MergeStrategy;
use crate::orchestrator::AttemptRecord;
use crate::request::MergeMode;
use crate::session::BackendKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SyncError> for ErrorReport {
    fn from(err: &SyncError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result of a successful update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOutcome {
    pub path: PathBuf,
    pub sheet: String,
    pub sheet_created: bool,
    pub mode: MergeMode,
    /// `None` for cell edits, which are not planned.
    pub strategy: Option<MergeStrategy>,
    pub backend: BackendKind,
    pub cells_written: usize,
    pub cells_cleared: usize,
    pub cells_failed: Vec<CellFailure>,
    pub attempts: Vec<AttemptRecord>,
    pub backup: Option<PathBuf>,
}

impl UpdateOutcome {
    pub fn summary(&self) -> String {
        let mut msg = format!(
            "{} mode: wrote {} cells to '{}'",
            self.mode.as_str(),
            self.cells_written,
            self.sheet
        );
        if self.sheet_created {
            msg.push_str(" (new sheet)");
        }
        if self.cells_cleared > 0 {
            msg.push_str(&format!(", cleared {}", self.cells_cleared));
        }
        if !self.cells_failed.is_empty() {
            msg.push_str(&format!(", {} cells failed", self.cells_failed.len()));
        }
        if let Some(strategy) = self.strategy {
            msg.push_str(&format!(" [{}]", strategy.as_str()));
        }
        msg.push_str(&format!(" via {}", self.backend.as_str()));
        if let Some(backup) = &self.backup {
            msg.push_str(&format!("; backup at {}", backup.display()));
        }
        msg
    }
}

/// Result of a successful read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadOutcome {
    pub path: PathBuf,
    pub sheet: String,
    pub sheets: Vec<String>,
    pub rows: Dataset,
    pub backend: BackendKind,
}

impl ReadOutcome {
    pub fn row_count(&self) -> usize {
        self.rows.height()
    }

    pub fn col_count(&self) -> usize {
        self.rows.width()
    }
}

/// Result of a successful structural change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetOutcome {
    pub path: PathBuf,
    pub operation: String,
    /// The sheet as named after the change.
    pub sheet: String,
    pub change: String,
    /// Sheet inventory before the change.
    pub sheets_before: Vec<String>,
    pub backend: BackendKind,
    pub attempts: Vec<AttemptRecord>,
}

/// Result of closing workbooks in the live application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseOutcome {
    /// `None` when every open workbook was targeted.
    pub path: Option<PathBuf>,
    /// Names of the workbooks that were open and got closed.
    pub closed: Vec<String>,
    pub options: CloseOptions,
    pub attempts: Vec<AttemptRecord>,
}

impl CloseOutcome {
    pub fn summary(&self) -> String {
        let mut msg = match self.closed.as_slice() {
            [] => "no open workbooks to close".to_string(),
            names => format!("closed {}", names.join(", ")),
        };
        if !self.closed.is_empty() {
            msg.push_str(if self.options.save_changes {
                " (saved)"
            } else {
                " (discarding changes)"
            });
        }
        if self.options.quit_application {
            msg.push_str("; application quit");
        }
        msg
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub closed: Vec<String>,
    pub attempts: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl CloseReport {
    pub fn failure(path: Option<PathBuf>, err: &SyncError) -> Self {
        Self {
            success: false,
            path,
            closed: Vec::new(),
            attempts: match err {
                SyncError::ExhaustedRetries { attempts, .. } => *attempts as usize,
                _ => 0,
            },
            message: format!("close failed: {err}"),
            error: Some(ErrorReport::from(err)),
        }
    }
}

impl From<CloseOutcome> for CloseReport {
    fn from(outcome: CloseOutcome) -> Self {
        Self {
            success: true,
            message: outcome.summary(),
            path: outcome.path,
            closed: outcome.closed,
            attempts: outcome.attempts.len(),
            error: None,
        }
    }
}

/// Workbooks open in the live application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenDocumentsReport {
    pub success: bool,
    pub count: usize,
    pub documents: Vec<OpenDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl OpenDocumentsReport {
    pub fn failure(err: &SyncError) -> Self {
        Self {
            success: false,
            count: 0,
            documents: Vec::new(),
            error: Some(ErrorReport::from(err)),
        }
    }
}

impl From<Vec<OpenDocument>> for OpenDocumentsReport {
    fn from(documents: Vec<OpenDocument>) -> Self {
        Self {
            success: true,
            count: documents.len(),
            documents,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationReport {
    pub success: bool,
    pub operation: String,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<MergeMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<MergeStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
    pub cells_written: usize,
    pub cells_cleared: usize,
    pub cells_failed: Vec<CellFailure>,
    pub attempts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl OperationReport {
    pub fn failure(operation: &str, path: PathBuf, err: &SyncError) -> Self {
        Self {
            success: false,
            operation: operation.to_string(),
            path,
            sheet: None,
            mode: None,
            strategy: None,
            backend: None,
            cells_written: 0,
            cells_cleared: 0,
            cells_failed: Vec::new(),
            attempts: match err {
                SyncError::ExhaustedRetries { attempts, .. } => *attempts as usize,
                _ => 0,
            },
            backup: None,
            message: format!("{operation} failed: {err}"),
            error: Some(ErrorReport::from(err)),
        }
    }

    /// Attach a backup that was taken before the operation failed.
    pub fn with_backup(mut self, backup: Option<PathBuf>) -> Self {
        if let Some(path) = &backup {
            self.message
                .push_str(&format!("; backup kept at {}", path.display()));
        }
        self.backup = backup;
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<UpdateOutcome> for OperationReport {
    fn from(outcome: UpdateOutcome) -> Self {
        let message = outcome.summary();
        Self {
            success: true,
            operation: "update".to_string(),
            sheet: Some(outcome.sheet),
            mode: Some(outcome.mode),
            strategy: outcome.strategy,
            backend: Some(outcome.backend),
            cells_written: outcome.cells_written,
            cells_cleared: outcome.cells_cleared,
            cells_failed: outcome.cells_failed,
            attempts: outcome.attempts.len(),
            backup: outcome.backup,
            path: outcome.path,
            message,
            error: None,
        }
    }
}

impl From<SheetOutcome> for OperationReport {
    fn from(outcome: SheetOutcome) -> Self {
        Self {
            success: true,
            operation: outcome.operation,
            path: outcome.path,
            sheet: Some(outcome.sheet),
            mode: None,
            strategy: None,
            backend: Some(outcome.backend),
            cells_written: 0,
            cells_cleared: 0,
            cells_failed: Vec::new(),
            attempts: outcome.attempts.len(),
            backup: None,
            message: format!("{} via {}", outcome.change, outcome.backend.as_str()),
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadReport {
    pub success: bool,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub sheets: Vec<String>,
    pub rows: Dataset,
    pub row_count: usize,
    pub col_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl ReadReport {
    pub fn failure(path: PathBuf, err: &SyncError) -> Self {
        Self {
            success: false,
            path,
            sheet: None,
            sheets: Vec::new(),
            rows: Dataset::new(),
            row_count: 0,
            col_count: 0,
            backend: None,
            error: Some(ErrorReport::from(err)),
        }
    }
}

impl From<ReadOutcome> for ReadReport {
    fn from(outcome: ReadOutcome) -> Self {
        Self {
            success: true,
            row_count: outcome.row_count(),
            col_count: outcome.col_count(),
            path: outcome.path,
            sheet: Some(outcome.sheet),
            sheets: outcome.sheets,
            rows: outcome.rows,
            backend: Some(outcome.backend),
            error: None,
        }
    }
}
