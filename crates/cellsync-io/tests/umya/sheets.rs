use crate::common::build_workbook;
use cellsync_io::common::{CellCoord, CellValue};
use cellsync_io::{DocumentCodec, UmyaCodec};

#[test]
fn create_rename_delete_round_trip() {
    let path = build_workbook(|_| {});
    let mut codec = UmyaCodec::open_path(&path).unwrap();
    codec.create_sheet("Data").unwrap();
    codec
        .write_cell("Data", CellCoord::new(1, 1), &CellValue::from("x"))
        .unwrap();
    codec.rename_sheet("Data", "Renamed").unwrap();
    codec.delete_sheet("Sheet1").unwrap();
    codec.save().unwrap();

    let mut reopened = UmyaCodec::open_path(&path).unwrap();
    assert_eq!(reopened.sheet_names().unwrap(), vec!["Renamed".to_string()]);
    let ds = reopened.read_sheet("Renamed").unwrap();
    assert_eq!(ds.get(CellCoord::new(1, 1)), &CellValue::from("x"));
}

#[test]
fn renaming_a_missing_sheet_fails() {
    let path = build_workbook(|_| {});
    let mut codec = UmyaCodec::open_path(&path).unwrap();
    assert!(codec.rename_sheet("Missing", "Other").is_err());
    assert!(codec.read_sheet("Missing").is_err());
}
