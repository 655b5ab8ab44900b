//! Test fixtures for cellsync: temp xlsx workbooks, an in-memory live
//! backend, and probes and stores that follow a script.

mod fake_live;
mod scripted;
mod workbook;

pub use fake_live::FakeLive;
pub use scripted::{FlakyStore, ScriptedProbe};
pub use workbook::{TempWorkbook, read_sheet, sheet_names, write_rows};
