#![cfg(feature = "umya")]

use std::path::{Path, PathBuf};

use cellsync_common::{CellCoord, CellValue, Dataset};
use umya_spreadsheet::{CellRawValue, Spreadsheet, XlsxError, reader::xlsx};

use crate::error::IoError;
use crate::traits::DocumentCodec;

const BACKEND: &str = "umya";

/// xlsx codec backed by `umya-spreadsheet`.
///
/// Only scalar values are read and written; formulas, styles and layout of
/// untouched cells are carried through unchanged by the library.
pub struct UmyaCodec {
    book: Spreadsheet,
    path: PathBuf,
}

impl UmyaCodec {
    fn convert_raw(raw: &CellRawValue) -> CellValue {
        if raw.is_error() {
            return CellValue::Empty;
        }
        match raw {
            CellRawValue::Numeric(n) => CellValue::Number(*n),
            CellRawValue::Bool(b) => CellValue::Boolean(*b),
            CellRawValue::String(s) => CellValue::Text(s.to_string()),
            CellRawValue::RichText(rt) => CellValue::Text(rt.get_text().to_string()),
            CellRawValue::Lazy(s) => CellValue::coerce_from_text(s.as_ref()),
            _ => CellValue::Empty,
        }
    }

    fn map_err(&self, err: XlsxError) -> IoError {
        xlsx_error(&self.path, err)
    }

    /// Make sure every sheet is deserialized before the writer walks them.
    fn load_all_sheets(&mut self) {
        let count = self.book.get_sheet_count();
        for i in 0..count {
            self.book.read_sheet(i);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn xlsx_error(path: &Path, err: XlsxError) -> IoError {
    match err {
        XlsxError::Io(e) => IoError::from_io(path, e),
        other => IoError::from_backend(BACKEND, other),
    }
}

impl DocumentCodec for UmyaCodec {
    fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, IoError>
    where
        Self: Sized,
    {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IoError::NotFound {
                path: path.to_path_buf(),
            });
        }
        // Full read, so the sheets are writable without lazy deserialization.
        let book = xlsx::read(path).map_err(|e| xlsx_error(path, e))?;
        Ok(Self {
            book,
            path: path.to_path_buf(),
        })
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn sheet_names(&mut self) -> Result<Vec<String>, IoError> {
        let count = self.book.get_sheet_count();
        let mut names = Vec::with_capacity(count);
        for i in 0..count {
            self.book.read_sheet(i);
            if let Some(s) = self.book.get_sheet(&i) {
                names.push(s.get_name().to_string());
            }
        }
        Ok(names)
    }

    fn read_sheet(&mut self, sheet: &str) -> Result<Dataset, IoError> {
        self.book.read_sheet_by_name(sheet);
        let ws = self
            .book
            .get_sheet_by_name(sheet)
            .ok_or_else(|| IoError::from_backend(BACKEND, format!("sheet '{sheet}' not found")))?;
        let cells = ws.get_cell_collection().into_iter().filter_map(|cell| {
            let coord = cell.get_coordinate();
            let value = Self::convert_raw(cell.get_cell_value().get_raw_value());
            if value.is_empty() {
                return None;
            }
            let at = CellCoord::try_new(*coord.get_row_num(), *coord.get_col_num()).ok()?;
            Some((at, value))
        });
        Ok(Dataset::from_cells(cells))
    }

    fn write_cell(
        &mut self,
        sheet: &str,
        coord: CellCoord,
        value: &CellValue,
    ) -> Result<(), IoError> {
        let ws = self
            .book
            .get_sheet_by_name_mut(sheet)
            .ok_or_else(|| IoError::from_backend(BACKEND, format!("sheet '{sheet}' not found")))?;
        // umya addresses cells as (col, row)
        let at = (coord.col, coord.row);
        match value {
            CellValue::Number(n) => {
                ws.get_cell_mut(at).set_value_number(*n);
            }
            CellValue::Boolean(b) => {
                ws.get_cell_mut(at).set_value_bool(*b);
            }
            CellValue::Text(s) if !s.is_empty() => {
                ws.get_cell_mut(at).set_value_string(s.as_str());
            }
            _ => {
                // Avoid materialising empty cells just to blank them.
                if ws.get_cell(at).is_some() {
                    ws.get_cell_mut(at).set_blank();
                }
            }
        }
        Ok(())
    }

    fn create_sheet(&mut self, name: &str) -> Result<(), IoError> {
        self.book.read_sheet_collection();
        self.book
            .new_sheet(name)
            .map_err(|e| IoError::from_backend(BACKEND, e))?;
        Ok(())
    }

    fn delete_sheet(&mut self, name: &str) -> Result<(), IoError> {
        self.book.read_sheet_collection();
        self.book
            .remove_sheet_by_name(name)
            .map_err(|e| IoError::from_backend(BACKEND, e))
    }

    fn rename_sheet(&mut self, old: &str, new: &str) -> Result<(), IoError> {
        self.book.read_sheet_by_name(old);
        let ws = self
            .book
            .get_sheet_by_name_mut(old)
            .ok_or_else(|| IoError::from_backend(BACKEND, format!("sheet '{old}' not found")))?;
        ws.set_name(new);
        Ok(())
    }

    /// Write to a temporary file next to the document, then move it over the
    /// original. A failed write leaves the original untouched.
    fn save(&mut self) -> Result<(), IoError> {
        self.load_all_sheets();
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let tmp = tempfile::Builder::new()
            .prefix(".cellsync-")
            .suffix(".xlsx")
            .tempfile_in(&dir)
            .map_err(|e| IoError::from_io(&dir, e))?;
        umya_spreadsheet::writer::xlsx::write(&self.book, tmp.path()).map_err(|e| self.map_err(e))?;
        tmp.persist(&self.path)
            .map_err(|e| IoError::from_io(&self.path, e.error))?;
        tracing::debug!(path = %self.path.display(), "saved workbook");
        Ok(())
    }
}
