use std::path::{Path, PathBuf};

use cellsync_common::{CellValue, Dataset, Row};
use cellsync_io::{SheetResolution, SheetSelector};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Replace the sheet's content.
    Full,
    /// Add rows to what is already there.
    Append,
    /// Write individual A1-addressed cells.
    Cells,
}

impl MergeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Append => "append",
            Self::Cells => "cells",
        }
    }

    /// Row modes create a named sheet that does not exist yet; cell edits
    /// fall back to the default sheet.
    pub fn sheet_resolution(self) -> SheetResolution {
        match self {
            Self::Full | Self::Append => SheetResolution::CreateMissing,
            Self::Cells => SheetResolution::FallbackToDefault,
        }
    }
}

/// One caller-addressed cell for [`MergeMode::Cells`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellEdit {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub value: CellValue,
}

impl CellEdit {
    pub fn new(reference: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self {
            reference: reference.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    Rows {
        mode: MergeMode,
        rows: Dataset,
        smart_merge: bool,
    },
    Cells(Vec<CellEdit>),
}

impl UpdatePayload {
    pub fn mode(&self) -> MergeMode {
        match self {
            UpdatePayload::Rows { mode, .. } => *mode,
            UpdatePayload::Cells(_) => MergeMode::Cells,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub path: PathBuf,
    pub sheet: SheetSelector,
    pub payload: UpdatePayload,
    /// Copy the document aside before editing.
    pub backup: bool,
}

impl UpdateRequest {
    pub fn rows(path: impl AsRef<Path>, mode: MergeMode, rows: impl Into<Dataset>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sheet: SheetSelector::default_sheet(),
            payload: UpdatePayload::Rows {
                mode,
                rows: rows.into(),
                smart_merge: true,
            },
            backup: false,
        }
    }

    pub fn full(path: impl AsRef<Path>, rows: impl Into<Dataset>) -> Self {
        Self::rows(path, MergeMode::Full, rows)
    }

    pub fn append(path: impl AsRef<Path>, rows: impl Into<Dataset>) -> Self {
        Self::rows(path, MergeMode::Append, rows)
    }

    pub fn cells(path: impl AsRef<Path>, cells: Vec<CellEdit>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sheet: SheetSelector::default_sheet(),
            payload: UpdatePayload::Cells(cells),
            backup: false,
        }
    }

    pub fn on_sheet(mut self, name: impl Into<String>) -> Self {
        self.sheet = SheetSelector::named(name);
        self
    }

    pub fn smart_merge(mut self, enabled: bool) -> Self {
        if let UpdatePayload::Rows { smart_merge, .. } = &mut self.payload {
            *smart_merge = enabled;
        }
        self
    }

    pub fn with_backup(mut self) -> Self {
        self.backup = true;
        self
    }

    pub fn mode(&self) -> MergeMode {
        self.payload.mode()
    }

    /// Reject payloads that can never be applied.
    pub fn validate(&self) -> Result<(), SyncError> {
        match &self.payload {
            UpdatePayload::Rows { mode, rows, .. } => {
                if *mode == MergeMode::Cells {
                    return Err(SyncError::invalid("cells mode takes cell edits, not rows"));
                }
                if rows.height() == 0 {
                    return Err(SyncError::invalid(format!(
                        "rows are required for {} mode",
                        mode.as_str()
                    )));
                }
                if let Some(i) = rows.rows().iter().position(Vec::is_empty) {
                    return Err(SyncError::invalid(format!("row {} has no columns", i + 1)));
                }
                Ok(())
            }
            UpdatePayload::Cells(cells) if cells.is_empty() => {
                Err(SyncError::invalid("cells are required for cells mode"))
            }
            UpdatePayload::Cells(_) => Ok(()),
        }
    }
}

/// Wire shape of an update as the tool layer passes it in.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateArgs {
    pub path: PathBuf,
    #[serde(default)]
    pub sheet: Option<String>,
    pub mode: MergeMode,
    #[serde(default)]
    pub rows: Option<Vec<Row>>,
    #[serde(default)]
    pub cells: Option<Vec<CellEdit>>,
    #[serde(default = "default_smart_merge")]
    pub smart_merge: bool,
    #[serde(default)]
    pub backup: bool,
}

fn default_smart_merge() -> bool {
    true
}

impl TryFrom<UpdateArgs> for UpdateRequest {
    type Error = SyncError;

    fn try_from(args: UpdateArgs) -> Result<Self, Self::Error> {
        let payload = match args.mode {
            MergeMode::Cells => UpdatePayload::Cells(
                args.cells
                    .ok_or_else(|| SyncError::invalid("cells are required for cells mode"))?,
            ),
            mode => UpdatePayload::Rows {
                mode,
                rows: Dataset::from_rows(args.rows.ok_or_else(|| {
                    SyncError::invalid(format!("rows are required for {} mode", mode.as_str()))
                })?),
                smart_merge: args.smart_merge,
            },
        };
        let request = UpdateRequest {
            path: args.path,
            sheet: args.sheet.into(),
            payload,
            backup: args.backup,
        };
        request.validate()?;
        Ok(request)
    }
}
