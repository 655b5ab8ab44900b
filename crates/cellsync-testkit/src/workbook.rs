use std::path::{Path, PathBuf};

use cellsync_common::{CellValue, Dataset, Row};
use cellsync_io::{DocumentCodec, UmyaCodec};
use tempfile::TempDir;
use umya_spreadsheet::Spreadsheet;

/// An xlsx file in its own temp dir, removed on drop.
pub struct TempWorkbook {
    dir: TempDir,
    path: PathBuf,
}

impl TempWorkbook {
    /// Start from a new workbook (one empty `Sheet1`) and let `f` shape it.
    pub fn build(f: impl FnOnce(&mut Spreadsheet)) -> Self {
        Self::build_named("book.xlsx", f)
    }

    pub fn build_named(file_name: &str, f: impl FnOnce(&mut Spreadsheet)) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(file_name);
        let mut book = umya_spreadsheet::new_file();
        f(&mut book);
        umya_spreadsheet::writer::xlsx::write(&book, &path).expect("write xlsx");
        Self { dir, path }
    }

    /// `Sheet1` holding `rows`.
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self::build(|book| write_rows(book, "Sheet1", &rows))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn bytes(&self) -> Vec<u8> {
        std::fs::read(&self.path).expect("read workbook bytes")
    }

    pub fn read(&self, sheet: &str) -> Dataset {
        read_sheet(&self.path, sheet)
    }

    pub fn sheet_names(&self) -> Vec<String> {
        sheet_names(&self.path)
    }
}

/// Write `rows` into `sheet` starting at A1, creating the sheet if needed.
pub fn write_rows(book: &mut Spreadsheet, sheet: &str, rows: &[Row]) {
    if book.get_sheet_by_name(sheet).is_none() {
        book.new_sheet(sheet).expect("new sheet");
    }
    let ws = book.get_sheet_by_name_mut(sheet).expect("sheet exists");
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            let cell = ws.get_cell_mut(((c + 1) as u32, (r + 1) as u32));
            match value {
                CellValue::Text(s) => {
                    cell.set_value_string(s.clone());
                }
                CellValue::Number(n) => {
                    cell.set_value_number(*n);
                }
                CellValue::Boolean(b) => {
                    cell.set_value_bool(*b);
                }
                CellValue::Empty => {}
            }
        }
    }
}

/// Read a sheet back through the production codec, trimmed.
pub fn read_sheet(path: &Path, sheet: &str) -> Dataset {
    let mut codec = UmyaCodec::open_path(path).expect("open workbook");
    codec.read_sheet(sheet).expect("read sheet").trimmed()
}

pub fn sheet_names(path: &Path) -> Vec<String> {
    let mut codec = UmyaCodec::open_path(path).expect("open workbook");
    codec.sheet_names().expect("sheet names")
}
