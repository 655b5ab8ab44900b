use crate::common::build_workbook;
use cellsync_io::common::{CellCoord, CellValue, Dataset, Extent, Patch};
use cellsync_io::{CodecStore, DocumentCodec, DocumentRef, IoError, OfflineStore, UmyaCodec};

#[test]
fn reads_scalar_values_by_type() {
    let path = build_workbook(|book| {
        let sh = book.get_sheet_by_name_mut("Sheet1").unwrap();
        sh.get_cell_mut((1, 1)).set_value("k1");
        sh.get_cell_mut((2, 1)).set_value_number(12);
        sh.get_cell_mut((3, 1)).set_value_bool(true);
        sh.get_cell_mut((1, 3)).set_value("k3");
    });
    let mut codec = UmyaCodec::open_path(&path).unwrap();
    let ds = codec.read_sheet("Sheet1").unwrap();
    assert_eq!(ds.height(), 3);
    assert_eq!(
        ds.rows()[0],
        vec![
            CellValue::from("k1"),
            CellValue::Number(12.0),
            CellValue::Boolean(true)
        ]
    );
    assert!(ds.rows()[1].iter().all(CellValue::is_empty));
    assert_eq!(ds.get(CellCoord::new(3, 1)), &CellValue::from("k3"));
    assert_eq!(ds.extent(), Extent::new(3, 3));
}

#[test]
fn patch_save_and_reopen() {
    let path = build_workbook(|book| {
        let sh = book.get_sheet_by_name_mut("Sheet1").unwrap();
        sh.get_cell_mut((1, 1)).set_value("old");
        sh.get_cell_mut((2, 2)).set_value("stale");
    });
    let mut codec = UmyaCodec::open_path(&path).unwrap();
    let mut b = Patch::builder();
    b.write(CellCoord::new(1, 1), "new")
        .clear(CellCoord::new(2, 2))
        .write(CellCoord::new(3, 1), 4.5)
        .clear(CellCoord::new(50, 50));
    codec.apply_patch("Sheet1", &b.build()).unwrap();
    codec.save().unwrap();

    let mut reopened = UmyaCodec::open_path(&path).unwrap();
    let ds = reopened.read_sheet("Sheet1").unwrap();
    assert_eq!(
        ds.trimmed(),
        Dataset::from_rows(vec![
            vec![CellValue::from("new")],
            vec![],
            vec![CellValue::Number(4.5)],
        ])
    );
}

#[test]
fn save_leaves_no_temp_files_behind() {
    let path = build_workbook(|_| {});
    let mut codec = UmyaCodec::open_path(&path).unwrap();
    codec
        .write_cell("Sheet1", CellCoord::new(1, 1), &CellValue::Boolean(false))
        .unwrap();
    codec.save().unwrap();
    let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["book.xlsx".to_string()]);
}

#[test]
fn missing_document_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = UmyaCodec::open_path(dir.path().join("absent.xlsx"))
        .err()
        .unwrap();
    assert!(matches!(err, IoError::NotFound { .. }));
}

#[test]
fn codec_store_opens_boxed_codec() {
    let path = build_workbook(|book| {
        book.new_sheet("Second").unwrap();
    });
    let store = CodecStore::<UmyaCodec>::new();
    let mut codec = store.open(&DocumentRef::new(&path).unwrap()).unwrap();
    assert_eq!(codec.backend_name(), "umya");
    assert_eq!(
        codec.sheet_names().unwrap(),
        vec!["Sheet1".to_string(), "Second".to_string()]
    );
}
