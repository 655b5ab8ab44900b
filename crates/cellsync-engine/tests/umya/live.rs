use std::sync::Arc;

use cellsync_engine::{
    Accessibility, BackendKind, CellEdit, CellValue, CloseOptions, Dataset, EngineConfig,
    ErrorKind, RecordingSleeper, SyncEngine, SyncError, UpdateRequest,
};
use cellsync_engine::Patch;
use cellsync_io::{LiveBackend, LiveDocument, SheetTarget};
use cellsync_testkit::{FakeLive, ScriptedProbe, TempWorkbook};

use crate::common::rows;

/// Engine that always sees the document as locked and talks to `live`.
fn live_engine(live: Arc<FakeLive>) -> SyncEngine {
    SyncEngine::builder(EngineConfig::immediate())
        .probe(Arc::new(ScriptedProbe::always(Accessibility::Locked)))
        .live(live)
        .sleeper(Arc::new(RecordingSleeper::new()))
        .build()
        .unwrap()
}

fn fake_with(sheets: &[(&str, &[&[&str]])]) -> Arc<FakeLive> {
    Arc::new(FakeLive::with_sheets(
        sheets
            .iter()
            .map(|(name, data)| (name.to_string(), Dataset::from_rows(rows(data))))
            .collect(),
    ))
}

#[test]
fn locked_document_is_updated_through_the_live_backend() {
    let wb = TempWorkbook::build(|_| {});
    let before = wb.bytes();
    let live = fake_with(&[("Sheet1", &[&["k1", "a"], &["k2", "b"]])]);
    let engine = live_engine(live.clone());

    let outcome = engine
        .try_update(&UpdateRequest::append(
            wb.path(),
            rows(&[&["k2", "c"], &["k3", "d"]]),
        ))
        .unwrap();

    assert_eq!(outcome.backend, BackendKind::Live);
    assert_eq!(
        live.sheet("Sheet1").unwrap(),
        Dataset::from_rows(rows(&[&["k1", "a"], &["k2", "c"], &["k3", "d"]]))
    );
    assert_eq!(live.call_count("set_cells_batch"), 1);
    assert_eq!(live.saves(), 1);
    assert_eq!(wb.bytes(), before, "the file itself is left to the application");
}

#[test]
fn live_full_mode_clears_the_old_block() {
    let wb = TempWorkbook::build(|_| {});
    let live = fake_with(&[("Sheet1", &[&["o", "o", "o"], &["o", "o", "o"]])]);
    let engine = live_engine(live.clone());

    engine
        .try_update(&UpdateRequest::full(wb.path(), rows(&[&["a"]])))
        .unwrap();

    assert_eq!(
        live.sheet("Sheet1").unwrap(),
        Dataset::from_rows(rows(&[&["a"]]))
    );
}

#[test]
fn live_row_update_creates_missing_sheet() {
    let wb = TempWorkbook::build(|_| {});
    let live = fake_with(&[("Sheet1", &[&["x"]])]);
    let engine = live_engine(live.clone());

    let outcome = engine
        .try_update(&UpdateRequest::full(wb.path(), rows(&[&["new"]])).on_sheet("Fresh"))
        .unwrap();

    assert!(outcome.sheet_created);
    assert_eq!(live.names(), vec!["Sheet1", "Fresh"]);
    assert_eq!(live.sheet("Fresh").unwrap(), Dataset::from_rows(rows(&[&["new"]])));
    assert_eq!(live.sheet("Sheet1").unwrap(), Dataset::from_rows(rows(&[&["x"]])));
}

#[test]
fn live_cells_on_unknown_sheet_use_the_default() {
    let wb = TempWorkbook::build(|_| {});
    let live = fake_with(&[("Main", &[&["x"]]), ("Other", &[])]);
    let engine = live_engine(live.clone());

    let outcome = engine
        .try_update(
            &UpdateRequest::cells(wb.path(), vec![CellEdit::new("B1", true)]).on_sheet("Ghost"),
        )
        .unwrap();

    assert_eq!(outcome.sheet, "Main");
    assert_eq!(
        live.sheet("Main").unwrap(),
        Dataset::from_rows(vec![vec![CellValue::from("x"), CellValue::Boolean(true)]])
    );
}

#[test]
fn live_read_reports_inventory() {
    let wb = TempWorkbook::build(|_| {});
    let live = fake_with(&[("A", &[&["1", "2"]]), ("B", &[])]);
    let report = live_engine(live).read(wb.path(), "B");

    assert!(report.success);
    assert_eq!(report.backend, Some(BackendKind::Live));
    assert_eq!(report.sheet.as_deref(), Some("B"));
    assert_eq!(report.sheets, vec!["A", "B"]);
    assert_eq!(report.row_count, 0);
}

#[test]
fn live_sheet_operations() {
    let wb = TempWorkbook::build(|_| {});
    let live = fake_with(&[("Sheet1", &[])]);
    let engine = live_engine(live.clone());

    engine
        .try_add_sheet(wb.path(), "Extra", Some(Dataset::from_rows(rows(&[&["seed"]]))))
        .unwrap();
    engine.try_rename_sheet(wb.path(), "Extra", "Renamed").unwrap();
    assert_eq!(live.names(), vec!["Sheet1", "Renamed"]);
    assert_eq!(
        live.sheet("Renamed").unwrap(),
        Dataset::from_rows(rows(&[&["seed"]]))
    );

    engine.try_delete_sheet(wb.path(), "Sheet1").unwrap();
    let err = engine.try_delete_sheet(wb.path(), "Renamed").unwrap_err();
    assert!(matches!(err, SyncError::LastSheetDeletionDenied(_)));
    assert_eq!(live.names(), vec!["Renamed"]);
    assert_eq!(live.call_count("change_sheets"), 3);
    assert_eq!(live.saves(), 3);
}

#[test]
fn unresponsive_application_surfaces_exhausted_retries() {
    let wb = TempWorkbook::build(|_| {});
    let live = Arc::new(FakeLive::new().unresponsive());
    let report = live_engine(live.clone()).update(&UpdateRequest::full(wb.path(), rows(&[&["a"]])));

    assert!(!report.success);
    let error = report.error.expect("error");
    assert_eq!(error.kind, ErrorKind::ExhaustedRetries);
    assert!(error.message.contains("not responding"), "{}", error.message);
    assert_eq!(live.call_count("attach"), 0);
}

#[test]
fn lists_workbooks_open_in_the_application() {
    let wb = TempWorkbook::build(|_| {});
    let live = fake_with(&[("Data", &[]), ("Notes", &[])]);
    let engine = live_engine(live.clone());

    assert_eq!(engine.list_open_documents().count, 0);

    engine
        .try_update(&UpdateRequest::cells(wb.path(), vec![CellEdit::new("A1", "x")]))
        .unwrap();
    let report = engine.list_open_documents();

    assert!(report.success);
    assert_eq!(report.count, 1);
    let doc = &report.documents[0];
    assert_eq!(doc.path, wb.path());
    assert_eq!(doc.name, "book.xlsx");
    assert!(doc.saved, "the update saved its changes");
    assert_eq!(doc.sheets, vec!["Data", "Notes"]);
    assert_eq!(doc.active_sheet.as_deref(), Some("Data"));
}

#[test]
fn close_one_workbook_saving_changes() {
    let wb = TempWorkbook::build(|_| {});
    let other = wb.dir().join("other.xlsx");
    let live = Arc::new(FakeLive::new().with_open(wb.path()).with_open(&other));
    let engine = live_engine(live.clone());

    let outcome = engine
        .try_close_document(Some(wb.path()), CloseOptions::default())
        .unwrap();

    assert_eq!(outcome.closed, vec!["book.xlsx"]);
    assert_eq!(outcome.path.as_deref(), Some(wb.path()));
    assert_eq!(live.open_paths(), vec![other]);
    assert_eq!(live.call_count("close"), 1);
    assert!(!live.has_quit());
}

#[test]
fn closing_a_workbook_that_is_not_open_fails_once() {
    let wb = TempWorkbook::build(|_| {});
    let live = Arc::new(FakeLive::new());
    let report = live_engine(live.clone()).close_document(Some(wb.path()), CloseOptions::default());

    assert!(!report.success);
    assert_eq!(report.error.expect("error").kind, ErrorKind::DocumentNotOpen);
    assert_eq!(live.call_count("list_open_documents"), 1);
    assert_eq!(live.call_count("close"), 0);
}

#[test]
fn close_everything_and_quit() {
    let wb = TempWorkbook::build(|_| {});
    let live = Arc::new(
        FakeLive::new()
            .with_open(wb.path())
            .with_open(wb.dir().join("second.xlsx")),
    );
    let engine = live_engine(live.clone());

    let report = engine.close_document(
        None,
        CloseOptions {
            save_changes: false,
            quit_application: true,
        },
    );

    assert!(report.success, "{}", report.message);
    assert_eq!(report.closed, vec!["book.xlsx", "second.xlsx"]);
    assert_eq!(
        report.message,
        "closed book.xlsx, second.xlsx (discarding changes); application quit"
    );
    assert!(live.open_paths().is_empty());
    assert!(live.has_quit());
    assert_eq!(live.saves(), 0);

    let again = engine.try_close_document(None, CloseOptions::default()).unwrap();
    assert!(again.closed.is_empty());
    assert_eq!(live.call_count("close"), 1);
}

#[test]
fn unsaved_changes_are_saved_on_close() {
    let wb = TempWorkbook::build(|_| {});
    let live = Arc::new(FakeLive::new().with_open(wb.path()));
    // An edit made in the application itself, not yet saved.
    live.set_cells_batch(
        &LiveDocument {
            path: wb.path().to_path_buf(),
            workbook: "book.xlsx".into(),
        },
        &SheetTarget {
            name: "Sheet1".into(),
            create: false,
        },
        &Patch::from_dataset(&Dataset::from_rows(rows(&[&["v"]]))),
    )
    .unwrap();
    let engine = live_engine(live.clone());
    assert!(!engine.list_open_documents().documents[0].saved);

    engine
        .try_close_document(Some(wb.path()), CloseOptions::default())
        .unwrap();
    assert_eq!(live.saves(), 1);
}

#[test]
fn application_operations_need_a_live_backend() {
    let engine = crate::common::offline_engine();
    let report = engine.list_open_documents();
    assert!(!report.success);
    assert_eq!(report.error.expect("error").kind, ErrorKind::BackendUnavailable);
    assert!(matches!(
        engine.try_close_document(None, CloseOptions::default()),
        Err(SyncError::BackendUnavailable(_))
    ));
}
