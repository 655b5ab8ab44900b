// Integration tests for the umya codec; run with `--features umya`.

mod codec;
mod sheets;

pub mod common {
    use std::path::PathBuf;

    /// Build an xlsx file in a fresh temp dir. The dir is leaked so the file
    /// outlives the helper.
    pub fn build_workbook(f: impl FnOnce(&mut umya_spreadsheet::Spreadsheet)) -> PathBuf {
        let dir = tempfile::tempdir().unwrap().keep();
        let path = dir.join("book.xlsx");
        let mut book = umya_spreadsheet::new_file();
        f(&mut book);
        umya_spreadsheet::writer::xlsx::write(&book, &path).unwrap();
        path
    }
}
