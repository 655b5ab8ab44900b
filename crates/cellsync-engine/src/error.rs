use std::path::PathBuf;

use cellsync_io::IoError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Only raised for operations that must target an existing sheet
    /// (rename, delete); reads and cell writes fall back instead.
    #[error("sheet '{0}' not found")]
    SheetNotFound(String),

    #[error("a sheet named '{0}' already exists")]
    DuplicateSheetName(String),

    #[error("cannot delete '{0}': it is the last remaining sheet")]
    LastSheetDeletionDenied(String),

    #[error("live backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("not open in the live application: {}", .0.display())]
    DocumentNotOpen(PathBuf),

    #[error("apply failed: {0}")]
    ApplyFailed(String),

    #[error("gave up after {attempts} attempts: {last}")]
    ExhaustedRetries { attempts: u32, last: String },

    #[error(transparent)]
    Io(IoError),
}

impl From<IoError> for SyncError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::NotFound { path } => SyncError::FileNotFound(path),
            IoError::Unavailable(msg) => SyncError::BackendUnavailable(msg),
            other => SyncError::Io(other),
        }
    }
}

/// Stable, serialisable classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FileNotFound,
    InvalidInput,
    SheetNotFound,
    DuplicateSheetName,
    LastSheetDeletionDenied,
    BackendUnavailable,
    DocumentNotOpen,
    ApplyFailed,
    ExhaustedRetries,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileNotFound => "file_not_found",
            Self::InvalidInput => "invalid_input",
            Self::SheetNotFound => "sheet_not_found",
            Self::DuplicateSheetName => "duplicate_sheet_name",
            Self::LastSheetDeletionDenied => "last_sheet_deletion_denied",
            Self::BackendUnavailable => "backend_unavailable",
            Self::DocumentNotOpen => "document_not_open",
            Self::ApplyFailed => "apply_failed",
            Self::ExhaustedRetries => "exhausted_retries",
            Self::Io => "io",
        }
    }
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::FileNotFound(_) => ErrorKind::FileNotFound,
            SyncError::InvalidInput(_) => ErrorKind::InvalidInput,
            SyncError::SheetNotFound(_) => ErrorKind::SheetNotFound,
            SyncError::DuplicateSheetName(_) => ErrorKind::DuplicateSheetName,
            SyncError::LastSheetDeletionDenied(_) => ErrorKind::LastSheetDeletionDenied,
            SyncError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            SyncError::DocumentNotOpen(_) => ErrorKind::DocumentNotOpen,
            SyncError::ApplyFailed(_) => ErrorKind::ApplyFailed,
            SyncError::ExhaustedRetries { .. } => ErrorKind::ExhaustedRetries,
            SyncError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether another attempt (after re-probing) could succeed.
    ///
    /// Structural errors are final. Backend failures, busy documents and codec
    /// errors are transient from the engine's point of view.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::BackendUnavailable(_) | SyncError::ApplyFailed(_) => true,
            SyncError::Io(err) => !matches!(err, IoError::PermissionDenied { .. }),
            _ => false,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        SyncError::InvalidInput(msg.into())
    }
}
