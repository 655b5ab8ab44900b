use std::sync::Arc;
use std::time::Duration;

use cellsync_engine::{
    Accessibility, BackendKind, CellCoord, CellEdit, CellValue, Dataset, EngineConfig, ErrorKind,
    MergeStrategy, RecordingSleeper, SyncEngine, SyncError, UpdateArgs, UpdateRequest,
};
use cellsync_io::{BackendReply, CodecStore, OfflineStore, UmyaCodec};
use cellsync_testkit::{FakeLive, FlakyStore, ScriptedProbe, TempWorkbook, write_rows};

use crate::common::{offline_engine, rows};

#[test]
fn full_mode_leaves_no_stale_cells() {
    let wb = TempWorkbook::with_rows(vec![vec![CellValue::from("old"); 3]; 5]);
    let engine = offline_engine();

    let outcome = engine
        .try_update(&UpdateRequest::full(wb.path(), rows(&[&["a"]])))
        .unwrap();

    assert_eq!(outcome.strategy, Some(MergeStrategy::Simple));
    assert_eq!(outcome.backend, BackendKind::Offline);
    assert_eq!(outcome.cells_written, 1);
    // 100 x 20 clear box, minus the one cell that is written instead.
    assert_eq!(outcome.cells_cleared, 1999);
    let after = wb.read("Sheet1");
    assert_eq!(after.non_empty_count(), 1);
    assert_eq!(after, Dataset::from_rows(rows(&[&["a"]])));
}

#[test]
fn append_upserts_by_key_in_order() {
    let wb = TempWorkbook::with_rows(rows(&[&["k1", "a"], &["k2", "b"]]));
    let engine = offline_engine();

    let outcome = engine
        .try_update(&UpdateRequest::append(
            wb.path(),
            rows(&[&["k2", "c"], &["k3", "d"]]),
        ))
        .unwrap();

    assert_eq!(outcome.strategy, Some(MergeStrategy::KeyUpsert));
    assert_eq!(
        wb.read("Sheet1"),
        Dataset::from_rows(rows(&[&["k1", "a"], &["k2", "c"], &["k3", "d"]]))
    );
}

#[test]
fn narrow_upsert_keeps_unaddressed_columns() {
    let wb = TempWorkbook::with_rows(rows(&[&["k1", "a", "x"], &["k2", "b", "y"]]));
    let engine = offline_engine();

    let outcome = engine
        .try_update(&UpdateRequest::append(wb.path(), rows(&[&["k1", "c"]])))
        .unwrap();

    assert_eq!(outcome.strategy, Some(MergeStrategy::KeyUpsert));
    assert_eq!(outcome.cells_cleared, 0);
    assert_eq!(
        wb.read("Sheet1"),
        Dataset::from_rows(rows(&[&["k1", "c", "x"], &["k2", "b", "y"]]))
    );
}

#[test]
fn append_with_wider_rows_extends_columns() {
    let wb = TempWorkbook::with_rows(rows(&[&["x", "1"]]));
    let engine = offline_engine();
    let outcome = engine
        .try_update(&UpdateRequest::append(wb.path(), rows(&[&["x", "1", "extra"]])))
        .unwrap();
    assert_eq!(outcome.strategy, Some(MergeStrategy::ColumnExtend));
    assert_eq!(
        wb.read("Sheet1"),
        Dataset::from_rows(rows(&[&["x", "1", "extra"]]))
    );
}

#[test]
fn plain_append_concatenates() {
    let wb = TempWorkbook::with_rows(rows(&[&["k1", "a"]]));
    let engine = offline_engine();
    engine
        .try_update(&UpdateRequest::append(wb.path(), rows(&[&["k1", "z"]])).smart_merge(false))
        .unwrap();
    assert_eq!(
        wb.read("Sheet1"),
        Dataset::from_rows(rows(&[&["k1", "a"], &["k1", "z"]]))
    );
}

#[test]
fn append_to_missing_sheet_creates_it() {
    let wb = TempWorkbook::with_rows(rows(&[&["keep"]]));
    let engine = offline_engine();

    let outcome = engine
        .try_update(&UpdateRequest::append(wb.path(), rows(&[&["k", "v"]])).on_sheet("Imported"))
        .unwrap();

    assert!(outcome.sheet_created);
    assert_eq!(outcome.sheet, "Imported");
    assert_eq!(wb.sheet_names(), vec!["Sheet1", "Imported"]);
    assert_eq!(wb.read("Imported"), Dataset::from_rows(rows(&[&["k", "v"]])));
    assert_eq!(wb.read("Sheet1"), Dataset::from_rows(rows(&[&["keep"]])));
}

#[test]
fn cells_mode_reports_bad_references_and_writes_the_rest() {
    let wb = TempWorkbook::with_rows(rows(&[&["a"]]));
    let engine = offline_engine();

    let outcome = engine
        .try_update(&UpdateRequest::cells(
            wb.path(),
            vec![CellEdit::new("B2", "x"), CellEdit::new("7B", "bad"), CellEdit::new("C1", 3.5)],
        ))
        .unwrap();

    assert_eq!(outcome.strategy, None);
    assert_eq!(outcome.cells_written, 2);
    assert_eq!(outcome.cells_failed.len(), 1);
    assert_eq!(outcome.cells_failed[0].reference, "7B");
    let after = wb.read("Sheet1");
    assert_eq!(after.get(CellCoord::new(1, 1)), &CellValue::from("a"));
    assert_eq!(after.get(CellCoord::new(2, 2)), &CellValue::from("x"));
    assert_eq!(after.get(CellCoord::new(1, 3)), &CellValue::Number(3.5));
}

#[test]
fn cells_mode_on_unknown_sheet_falls_back_to_first() {
    let wb = TempWorkbook::build(|book| {
        write_rows(book, "Sheet1", &rows(&[&["first"]]));
        write_rows(book, "Other", &rows(&[&["second"]]));
    });
    let engine = offline_engine();

    let outcome = engine
        .try_update(&UpdateRequest::cells(wb.path(), vec![CellEdit::new("A2", "x")]).on_sheet("Nope"))
        .unwrap();

    assert_eq!(outcome.sheet, "Sheet1");
    assert!(!outcome.sheet_created);
    assert_eq!(wb.sheet_names(), vec!["Sheet1", "Other"]);
    assert_eq!(wb.read("Sheet1"), Dataset::from_rows(rows(&[&["first"], &["x"]])));
}

#[test]
fn every_cell_failing_is_invalid_input() {
    let wb = TempWorkbook::with_rows(rows(&[&["a"]]));
    let before = wb.bytes();
    let err = offline_engine()
        .try_update(&UpdateRequest::cells(wb.path(), vec![CellEdit::new("??", "x")]))
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidInput(_)));
    assert_eq!(wb.bytes(), before);
}

#[test]
fn same_update_twice_is_idempotent() {
    let wb = TempWorkbook::with_rows(rows(&[&["k1", "a"], &["k2", "b"], &["k3", "c"]]));
    let engine = offline_engine();
    let req = UpdateRequest::append(wb.path(), rows(&[&["k2", "B"], &["k9", "z"]]));

    engine.try_update(&req).unwrap();
    let once = wb.read("Sheet1");
    engine.try_update(&req).unwrap();
    assert_eq!(wb.read("Sheet1"), once);

    let full = UpdateRequest::full(wb.path(), rows(&[&["only"]]));
    engine.try_update(&full).unwrap();
    let once = wb.read("Sheet1");
    engine.try_update(&full).unwrap();
    assert_eq!(wb.read("Sheet1"), once);
}

#[test]
fn backup_holds_the_pre_edit_document() {
    let wb = TempWorkbook::with_rows(rows(&[&["before"]]));
    let before = wb.bytes();
    let engine = offline_engine();

    let outcome = engine
        .try_update(&UpdateRequest::full(wb.path(), rows(&[&["after"]])).with_backup())
        .unwrap();

    let backup = outcome.backup.expect("backup path");
    assert!(backup.starts_with(wb.dir().join("log_book")));
    assert_eq!(std::fs::read(&backup).unwrap(), before);
    assert_eq!(wb.read("Sheet1"), Dataset::from_rows(rows(&[&["after"]])));
}

#[test]
fn failed_update_still_reports_its_backup() {
    let wb = TempWorkbook::with_rows(rows(&[&["before"]]));
    let before = wb.bytes();
    let engine = offline_engine();

    let report = engine.update(
        &UpdateRequest::cells(wb.path(), vec![CellEdit::new("not-a-cell", "x")]).with_backup(),
    );

    assert!(!report.success);
    assert_eq!(report.error.as_ref().expect("error").kind, ErrorKind::InvalidInput);
    let backup = report.backup.clone().expect("backup path");
    assert_eq!(std::fs::read(&backup).unwrap(), before);
    assert!(report.message.contains("backup kept at"), "{}", report.message);
    assert_eq!(report.to_json()["backup"], backup.display().to_string());
    assert_eq!(wb.bytes(), before);
}

#[test]
fn missing_file_is_reported_not_retried() {
    let wb = TempWorkbook::with_rows(rows(&[&["a"]]));
    let missing = wb.dir().join("missing.xlsx");
    let report = offline_engine().update(&UpdateRequest::full(&missing, rows(&[&["a"]])));

    assert!(!report.success);
    let error = report.error.expect("error");
    assert_eq!(error.kind, ErrorKind::FileNotFound);
    assert_eq!(report.attempts, 0);
    assert!(!missing.exists());
}

#[test]
fn update_args_from_json() {
    let wb = TempWorkbook::with_rows(rows(&[&["k1", "a"]]));
    let json = format!(
        r#"{{"path": {:?}, "mode": "append", "rows": [["k2", "b"]]}}"#,
        wb.path().to_string_lossy()
    );
    let args: UpdateArgs = serde_json::from_str(&json).unwrap();
    let report = offline_engine().update_args(args);

    assert!(report.success, "{}", report.message);
    assert_eq!(report.cells_written, 4);
    assert!(report.message.starts_with("append mode: wrote 4 cells to 'Sheet1'"));
}

#[test]
fn busy_document_is_retried_with_backoff() {
    let wb = TempWorkbook::with_rows(rows(&[&["a"]]));
    let sleeper = Arc::new(RecordingSleeper::new());
    let inner: Arc<dyn OfflineStore> = Arc::new(CodecStore::<UmyaCodec>::new());
    let store = Arc::new(FlakyStore::failing(inner, 1));
    let engine = SyncEngine::builder(EngineConfig::default())
        .without_live()
        .offline(store.clone())
        .sleeper(sleeper.clone())
        .build()
        .unwrap();

    let outcome = engine
        .try_update(&UpdateRequest::full(wb.path(), rows(&[&["b"]])))
        .unwrap();

    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(store.opens(), 2);
    assert_eq!(sleeper.slept(), vec![Duration::from_millis(1000)]);
    assert_eq!(wb.read("Sheet1"), Dataset::from_rows(rows(&[&["b"]])));
}

#[test]
fn always_busy_document_exhausts_retries() {
    let wb = TempWorkbook::with_rows(rows(&[&["a"]]));
    let before = wb.bytes();
    let sleeper = Arc::new(RecordingSleeper::new());
    let inner: Arc<dyn OfflineStore> = Arc::new(CodecStore::<UmyaCodec>::new());
    let engine = SyncEngine::builder(EngineConfig::default())
        .without_live()
        .offline(Arc::new(FlakyStore::always_busy(inner)))
        .sleeper(sleeper.clone())
        .build()
        .unwrap();

    let report = engine.update(&UpdateRequest::full(wb.path(), rows(&[&["b"]])));

    assert!(!report.success);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.error.unwrap().kind, ErrorKind::ExhaustedRetries);
    let slept = sleeper.slept();
    assert_eq!(slept.len(), 2);
    assert!(slept[0] < slept[1]);
    assert_eq!(wb.bytes(), before);
}

#[test]
fn switches_backend_when_the_document_is_closed_between_attempts() {
    let wb = TempWorkbook::with_rows(rows(&[&["k1", "a"]]));
    let live = Arc::new(FakeLive::new().always_reply(BackendReply::Rejected("busy".into())));
    let engine = SyncEngine::builder(EngineConfig::immediate())
        .probe(Arc::new(ScriptedProbe::new([
            Accessibility::Locked,
            Accessibility::Free,
        ])))
        .live(live.clone())
        .sleeper(Arc::new(RecordingSleeper::new()))
        .build()
        .unwrap();

    let outcome = engine
        .try_update(&UpdateRequest::append(wb.path(), rows(&[&["k2", "b"]])))
        .unwrap();

    assert_eq!(outcome.backend, BackendKind::Offline);
    assert_eq!(
        outcome.attempts.iter().map(|a| a.backend).collect::<Vec<_>>(),
        vec![Some(BackendKind::Live), Some(BackendKind::Offline)]
    );
    assert_eq!(live.call_count("set_cells_batch"), 1);
    assert_eq!(
        wb.read("Sheet1"),
        Dataset::from_rows(rows(&[&["k1", "a"], &["k2", "b"]]))
    );
}

#[test]
fn concurrent_appends_to_one_document_are_serialised() {
    let wb = TempWorkbook::with_rows(rows(&[&["key", "value"]]));
    let engine = offline_engine();

    std::thread::scope(|scope| {
        for i in 0..6 {
            let engine = &engine;
            let path = wb.path();
            scope.spawn(move || {
                let key = format!("k{i}");
                engine
                    .try_update(&UpdateRequest::append(path, rows(&[&[key.as_str(), "v"]])))
                    .unwrap();
            });
        }
    });

    let after = wb.read("Sheet1");
    assert_eq!(after.height(), 7);
    for i in 0..6 {
        let key = CellValue::from(format!("k{i}"));
        assert!(after.rows().iter().any(|r| r[0] == key), "k{i} lost");
    }
}

#[test]
fn differently_spelled_paths_share_one_lock() {
    let wb = TempWorkbook::with_rows(rows(&[&["key", "value"]]));
    let dotted = wb.dir().join("nested").join("..").join(".").join("book.xlsx");
    let engine = offline_engine();

    std::thread::scope(|scope| {
        for i in 0..6 {
            let engine = &engine;
            let path = if i % 2 == 0 { wb.path().to_path_buf() } else { dotted.clone() };
            scope.spawn(move || {
                let key = format!("k{i}");
                engine
                    .try_update(&UpdateRequest::append(path, rows(&[&[key.as_str(), "v"]])))
                    .unwrap();
            });
        }
    });

    let after = wb.read("Sheet1");
    assert_eq!(after.height(), 7);
    for i in 0..6 {
        let key = CellValue::from(format!("k{i}"));
        assert!(after.rows().iter().any(|r| r[0] == key), "k{i} lost");
    }
}
