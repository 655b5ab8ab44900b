//! Request targets: which document, which sheet, and what to do when the
//! sheet is missing.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::IoError;

/// Absolute path to a spreadsheet document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DocumentRef {
    path: PathBuf,
}

impl DocumentRef {
    /// Relative paths are resolved against the current directory and `.` /
    /// `..` segments are folded, so two spellings of one file compare equal.
    /// The file is not required to exist yet; the probe reports that.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let abs = std::path::absolute(path).map_err(|e| IoError::from_io(path, e))?;
        Ok(Self {
            path: normalize_lexically(&abs),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Fold `.` and `..` without touching the filesystem. Symlinks are left
/// alone; `..` above the root stays at the root.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Optional sheet name. `None` means the default sheet: the active sheet on
/// the live surface, the first sheet offline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetSelector(Option<String>);

impl SheetSelector {
    pub fn default_sheet() -> Self {
        Self(None)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self(Some(name.into()))
    }

    pub fn name(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Pick the sheet a request targets from the document's sheet names.
    ///
    /// Returns `None` only when the document has no sheets and nothing may be
    /// created.
    pub fn resolve(&self, names: &[String], resolution: SheetResolution) -> Option<ResolvedSheet> {
        if let Some(name) = self.name() {
            if names.iter().any(|n| n == name) {
                return Some(ResolvedSheet::Existing(name.to_string()));
            }
            if resolution == SheetResolution::CreateMissing {
                return Some(ResolvedSheet::Create(name.to_string()));
            }
        }
        names.first().map(|n| ResolvedSheet::Existing(n.clone()))
    }
}

impl From<Option<String>> for SheetSelector {
    fn from(value: Option<String>) -> Self {
        Self(value)
    }
}

impl From<&str> for SheetSelector {
    fn from(value: &str) -> Self {
        Self::named(value)
    }
}

/// What to do when a named sheet does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetResolution {
    /// Use the default sheet instead.
    #[default]
    FallbackToDefault,
    /// Create the named sheet.
    CreateMissing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSheet {
    Existing(String),
    Create(String),
}

impl ResolvedSheet {
    pub fn name(&self) -> &str {
        match self {
            ResolvedSheet::Existing(n) | ResolvedSheet::Create(n) => n,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, ResolvedSheet::Create(_))
    }
}

/// A concrete sheet to write to, after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTarget {
    pub name: String,
    /// Create the sheet (appended after the last one) if it is absent.
    pub create: bool,
}

impl From<&ResolvedSheet> for SheetTarget {
    fn from(value: &ResolvedSheet) -> Self {
        Self {
            name: value.name().to_string(),
            create: value.is_new(),
        }
    }
}
