//! One attempt's view of a document, on whichever backend the probe chose.
//!
//! Every engine operation is written once against [`DocumentSession`]; the
//! orchestrator decides per attempt whether that session is live or offline.

use cellsync_common::{Dataset, Patch};
use cellsync_io::{
    BackendReply, DocumentCodec, LiveBackend, LiveDocument, ResolvedSheet, SheetChange,
    SheetResolution, SheetSelector, SheetTarget,
};
use serde::Serialize;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Live,
    Offline,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Offline => "offline",
        }
    }
}

/// The sheet a request resolved to, its content, and the sheet inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSnapshot {
    pub sheet: ResolvedSheet,
    pub sheets: Vec<String>,
    /// Empty when the sheet is about to be created.
    pub dataset: Dataset,
}

pub trait DocumentSession {
    fn kind(&self) -> BackendKind;

    fn sheet_names(&mut self) -> Result<Vec<String>, SyncError>;

    /// Resolve `sheet` and read its current content.
    fn snapshot(
        &mut self,
        sheet: &SheetSelector,
        resolution: SheetResolution,
    ) -> Result<TargetSnapshot, SyncError>;

    fn apply_patch(&mut self, target: &SheetTarget, patch: &Patch) -> Result<String, SyncError>;

    fn change_sheets(&mut self, change: &SheetChange) -> Result<String, SyncError>;

    /// Persist everything applied in this session.
    fn commit(&mut self) -> Result<String, SyncError>;
}

/// Only an explicit acknowledgment is success.
pub(crate) fn require_ack(reply: BackendReply) -> Result<String, SyncError> {
    match reply {
        BackendReply::Acknowledged(msg) => Ok(msg),
        BackendReply::Rejected(msg) => Err(SyncError::ApplyFailed(msg)),
        BackendReply::Unacknowledged(out) if out.is_empty() => Err(SyncError::ApplyFailed(
            "backend returned no acknowledgment".to_string(),
        )),
        BackendReply::Unacknowledged(out) => Err(SyncError::ApplyFailed(format!(
            "backend returned no acknowledgment: {out}"
        ))),
    }
}

pub(crate) fn describe_patch(patch: &Patch) -> String {
    format!(
        "{} cells written, {} cleared",
        patch.write_count(),
        patch.clear_count()
    )
}

pub struct OfflineSession {
    codec: Box<dyn DocumentCodec>,
    dirty: bool,
}

impl OfflineSession {
    pub fn new(codec: Box<dyn DocumentCodec>) -> Self {
        Self {
            codec,
            dirty: false,
        }
    }
}

impl DocumentSession for OfflineSession {
    fn kind(&self) -> BackendKind {
        BackendKind::Offline
    }

    fn sheet_names(&mut self) -> Result<Vec<String>, SyncError> {
        Ok(self.codec.sheet_names()?)
    }

    fn snapshot(
        &mut self,
        sheet: &SheetSelector,
        resolution: SheetResolution,
    ) -> Result<TargetSnapshot, SyncError> {
        let sheets = self.codec.sheet_names()?;
        let resolved = sheet
            .resolve(&sheets, resolution)
            .ok_or_else(|| SyncError::invalid("document has no sheets"))?;
        let dataset = match &resolved {
            ResolvedSheet::Existing(name) => self.codec.read_sheet(name)?,
            ResolvedSheet::Create(_) => Dataset::new(),
        };
        Ok(TargetSnapshot {
            sheet: resolved,
            sheets,
            dataset,
        })
    }

    fn apply_patch(&mut self, target: &SheetTarget, patch: &Patch) -> Result<String, SyncError> {
        if target.create && !self.codec.sheet_names()?.contains(&target.name) {
            self.codec.create_sheet(&target.name)?;
        }
        self.codec.apply_patch(&target.name, patch)?;
        self.dirty = true;
        Ok(describe_patch(patch))
    }

    fn change_sheets(&mut self, change: &SheetChange) -> Result<String, SyncError> {
        match change {
            SheetChange::Add { name, rows } => {
                self.codec.create_sheet(name)?;
                if let Some(rows) = rows {
                    self.codec.apply_patch(name, &Patch::from_dataset(rows))?;
                }
            }
            SheetChange::Rename { from, to } => self.codec.rename_sheet(from, to)?,
            SheetChange::Delete { name } => self.codec.delete_sheet(name)?,
        }
        self.dirty = true;
        Ok(change.describe())
    }

    fn commit(&mut self) -> Result<String, SyncError> {
        if !self.dirty {
            return Ok("no changes".to_string());
        }
        self.codec.save()?;
        self.dirty = false;
        Ok(format!("saved via {}", self.codec.backend_name()))
    }
}

pub struct LiveSession<'a> {
    backend: &'a dyn LiveBackend,
    doc: LiveDocument,
}

impl<'a> LiveSession<'a> {
    pub fn new(backend: &'a dyn LiveBackend, doc: LiveDocument) -> Self {
        Self { backend, doc }
    }
}

impl DocumentSession for LiveSession<'_> {
    fn kind(&self) -> BackendKind {
        BackendKind::Live
    }

    fn sheet_names(&mut self) -> Result<Vec<String>, SyncError> {
        Ok(self.backend.sheet_names(&self.doc)?)
    }

    fn snapshot(
        &mut self,
        sheet: &SheetSelector,
        resolution: SheetResolution,
    ) -> Result<TargetSnapshot, SyncError> {
        let snap = self.backend.read_sheet(&self.doc, sheet)?;
        // The live surface already fell back to a default sheet for unknown
        // names; row modes create the requested sheet instead.
        if let Some(name) = sheet.name() {
            if resolution == SheetResolution::CreateMissing && !snap.sheets.iter().any(|s| s == name)
            {
                return Ok(TargetSnapshot {
                    sheet: ResolvedSheet::Create(name.to_string()),
                    sheets: snap.sheets,
                    dataset: Dataset::new(),
                });
            }
        }
        Ok(TargetSnapshot {
            sheet: ResolvedSheet::Existing(snap.sheet),
            sheets: snap.sheets,
            dataset: snap.dataset,
        })
    }

    fn apply_patch(&mut self, target: &SheetTarget, patch: &Patch) -> Result<String, SyncError> {
        require_ack(self.backend.set_cells_batch(&self.doc, target, patch)?)
    }

    fn change_sheets(&mut self, change: &SheetChange) -> Result<String, SyncError> {
        require_ack(self.backend.change_sheets(&self.doc, change)?)
    }

    fn commit(&mut self) -> Result<String, SyncError> {
        require_ack(self.backend.save(&self.doc)?)
    }
}
