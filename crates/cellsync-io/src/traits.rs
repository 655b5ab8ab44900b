use std::marker::PhantomData;
use std::path::Path;

use cellsync_common::{CellCoord, CellValue, Dataset, OpKind, Patch};
use serde::Serialize;

use crate::error::IoError;
use crate::target::DocumentRef;

/// The content of one sheet plus the workbook's sheet inventory, as seen by
/// whichever backend read it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SheetSnapshot {
    /// Name of the sheet that was actually read.
    pub sheet: String,
    pub sheets: Vec<String>,
    pub dataset: Dataset,
}

/// Direct file access to a spreadsheet document.
///
/// A codec owns one opened document in memory. Mutations are buffered until
/// [`DocumentCodec::save`] writes the whole document back to its path.
pub trait DocumentCodec: Send {
    fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, IoError>
    where
        Self: Sized;

    fn backend_name(&self) -> &'static str;

    /// Sheet names in workbook order.
    fn sheet_names(&mut self) -> Result<Vec<String>, IoError>;

    fn read_sheet(&mut self, sheet: &str) -> Result<Dataset, IoError>;

    fn write_cell(&mut self, sheet: &str, coord: CellCoord, value: &CellValue)
    -> Result<(), IoError>;

    fn clear_cell(&mut self, sheet: &str, coord: CellCoord) -> Result<(), IoError> {
        self.write_cell(sheet, coord, &CellValue::Empty)
    }

    /// Replay every operation of `patch` in order.
    fn apply_patch(&mut self, sheet: &str, patch: &Patch) -> Result<(), IoError> {
        for op in patch.ops() {
            match op.kind {
                OpKind::Clear => self.clear_cell(sheet, op.coord)?,
                OpKind::Write => self.write_cell(sheet, op.coord, &op.value)?,
            }
        }
        Ok(())
    }

    /// Append a sheet after the last one.
    fn create_sheet(&mut self, name: &str) -> Result<(), IoError>;
    fn delete_sheet(&mut self, name: &str) -> Result<(), IoError>;
    fn rename_sheet(&mut self, old: &str, new: &str) -> Result<(), IoError>;

    /// Write the document back to the path it was opened from.
    fn save(&mut self) -> Result<(), IoError>;
}

/// Opens documents for the offline path.
///
/// The engine only ever needs "give me a codec for this document"; keeping
/// that behind a trait lets tests substitute stores that fail on demand.
pub trait OfflineStore: Send + Sync {
    fn open(&self, doc: &DocumentRef) -> Result<Box<dyn DocumentCodec>, IoError>;
}

/// [`OfflineStore`] that opens every document with codec `C`.
pub struct CodecStore<C> {
    _codec: PhantomData<fn() -> C>,
}

impl<C> CodecStore<C> {
    pub fn new() -> Self {
        Self {
            _codec: PhantomData,
        }
    }
}

impl<C> Default for CodecStore<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: DocumentCodec + 'static> OfflineStore for CodecStore<C> {
    fn open(&self, doc: &DocumentRef) -> Result<Box<dyn DocumentCodec>, IoError> {
        Ok(Box::new(C::open_path(doc.path())?))
    }
}
