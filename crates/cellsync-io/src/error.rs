use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures raised by codecs, probes and live backends.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("document not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    /// The document is held by another process (sharing or lock violation).
    #[error("document is busy: {message}")]
    Busy { message: String },

    #[error("{backend} codec error: {message}")]
    Codec {
        backend: &'static str,
        message: String,
    },

    /// An automation script could not be run or produced unusable output.
    #[error("automation script failed: {0}")]
    Script(String),

    #[error("live application unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Io(#[from] io::Error),
}

impl IoError {
    pub fn from_backend<E: Display>(backend: &'static str, err: E) -> Self {
        IoError::Codec {
            backend,
            message: err.to_string(),
        }
    }

    /// Classify an OS error raised while touching `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        if is_sharing_violation(&err) {
            return IoError::Busy {
                message: format!("{}: {err}", path.display()),
            };
        }
        match err.kind() {
            io::ErrorKind::NotFound => IoError::NotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => IoError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => IoError::Io(err),
        }
    }

    /// True when the failure means "someone else holds the document right now".
    pub fn is_busy(&self) -> bool {
        match self {
            IoError::Busy { .. } => true,
            IoError::Io(e) => is_sharing_violation(e),
            _ => false,
        }
    }
}

const ERROR_SHARING_VIOLATION: i32 = 32;
const ERROR_LOCK_VIOLATION: i32 = 33;

/// Windows reports a file opened by another process with an incompatible
/// share mode as a sharing (32) or lock (33) violation.
pub fn is_sharing_violation(err: &io::Error) -> bool {
    cfg!(windows)
        && matches!(
            err.raw_os_error(),
            Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)
        )
}
