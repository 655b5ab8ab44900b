use cellsync_engine::{Dataset, ErrorKind, SyncError};
use cellsync_testkit::{TempWorkbook, write_rows};

use crate::common::{offline_engine, rows};

fn two_sheets() -> TempWorkbook {
    TempWorkbook::build(|book| {
        write_rows(book, "Sheet1", &rows(&[&["a"]]));
        write_rows(book, "Data", &rows(&[&["k", "v"]]));
    })
}

#[test]
fn add_sheet_seeded_with_rows() {
    let wb = TempWorkbook::build(|_| {});
    let engine = offline_engine();

    let outcome = engine
        .try_add_sheet(wb.path(), "  Report ", Some(Dataset::from_rows(rows(&[&["x", "y"]]))))
        .unwrap();

    assert_eq!(outcome.sheet, "Report");
    assert_eq!(outcome.sheets_before, vec!["Sheet1"]);
    assert_eq!(wb.sheet_names(), vec!["Sheet1", "Report"]);
    assert_eq!(wb.read("Report"), Dataset::from_rows(rows(&[&["x", "y"]])));
}

#[test]
fn add_sheet_rejects_duplicates_and_bad_names() {
    let wb = two_sheets();
    let engine = offline_engine();

    assert!(matches!(
        engine.try_add_sheet(wb.path(), "DATA", None),
        Err(SyncError::DuplicateSheetName(name)) if name == "Data"
    ));
    assert!(matches!(
        engine.try_add_sheet(wb.path(), "a/b", None),
        Err(SyncError::InvalidInput(_))
    ));
    assert_eq!(wb.sheet_names(), vec!["Sheet1", "Data"]);
}

#[test]
fn rename_sheet_keeps_content() {
    let wb = two_sheets();
    let report = offline_engine().rename_sheet(wb.path(), "Data", "Archive");

    assert!(report.success, "{}", report.message);
    assert_eq!(report.operation, "rename_sheet");
    assert_eq!(wb.sheet_names(), vec!["Sheet1", "Archive"]);
    assert_eq!(wb.read("Archive"), Dataset::from_rows(rows(&[&["k", "v"]])));
}

#[test]
fn rename_errors_are_strict() {
    let wb = two_sheets();
    let engine = offline_engine();

    assert!(matches!(
        engine.try_rename_sheet(wb.path(), "Missing", "X"),
        Err(SyncError::SheetNotFound(_))
    ));
    assert!(matches!(
        engine.try_rename_sheet(wb.path(), "Data", "sheet1"),
        Err(SyncError::DuplicateSheetName(_))
    ));
    // Changing only the case of a name is not a clash with itself.
    engine.try_rename_sheet(wb.path(), "Data", "DATA").unwrap();
    assert_eq!(wb.sheet_names(), vec!["Sheet1", "DATA"]);
}

#[test]
fn delete_sheet() {
    let wb = two_sheets();
    let outcome = offline_engine().try_delete_sheet(wb.path(), "Data").unwrap();
    assert_eq!(outcome.sheets_before, vec!["Sheet1", "Data"]);
    assert_eq!(wb.sheet_names(), vec!["Sheet1"]);
}

#[test]
fn last_sheet_cannot_be_deleted() {
    let wb = TempWorkbook::with_rows(rows(&[&["only"]]));
    let before = wb.bytes();

    let report = offline_engine().delete_sheet(wb.path(), "Sheet1");

    assert!(!report.success);
    assert_eq!(
        report.error.expect("error").kind,
        ErrorKind::LastSheetDeletionDenied
    );
    assert_eq!(wb.bytes(), before);
}

#[test]
fn delete_missing_sheet_is_not_found() {
    let wb = two_sheets();
    assert!(matches!(
        offline_engine().try_delete_sheet(wb.path(), "Nope"),
        Err(SyncError::SheetNotFound(name)) if name == "Nope"
    ));
}

#[test]
fn read_resolves_default_and_unknown_sheets() {
    let wb = two_sheets();
    let engine = offline_engine();

    let report = engine.read(wb.path(), Some("Data".to_string()));
    assert!(report.success);
    assert_eq!(report.sheet.as_deref(), Some("Data"));
    assert_eq!(report.sheets, vec!["Sheet1", "Data"]);
    assert_eq!((report.row_count, report.col_count), (1, 2));

    let fallback = engine.try_read(wb.path(), "Unknown").unwrap();
    assert_eq!(fallback.sheet, "Sheet1");
    assert_eq!(fallback.rows, Dataset::from_rows(rows(&[&["a"]])));

    let missing = engine.read(wb.dir().join("nope.xlsx"), None::<String>);
    assert_eq!(missing.error.expect("error").kind, ErrorKind::FileNotFound);
}
