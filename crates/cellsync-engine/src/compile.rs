//! Patch compilation: from a logical target dataset to per-cell operations.

use cellsync_common::{CellCoord, Dataset, Extent, Patch};
use serde::Serialize;

use crate::request::{CellEdit, MergeMode};

/// A cell the compiler could not address. The rest of the patch still
/// applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellFailure {
    pub reference: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledPatch {
    pub patch: Patch,
    pub failures: Vec<CellFailure>,
}

/// Compile a row-mode target against the extent the sheet currently uses.
///
/// * `Full` clears every cell of the existing extent grown to at least
///   `clear_floor`, then writes each non-empty target cell over its clear.
/// * `Append` writes each non-empty target cell and never clears, so cells
///   the caller did not address keep their value.
/// * `Cells` targets are compiled with [`compile_cells`]; a dataset is
///   treated like `Append`.
pub fn compile(
    target: &Dataset,
    mode: MergeMode,
    existing: Extent,
    clear_floor: Extent,
) -> CompiledPatch {
    let mut builder = Patch::builder();
    let mut failures = Vec::new();

    if mode == MergeMode::Full {
        let region = existing.at_least(clear_floor.rows, clear_floor.cols);
        builder.clear_region(region);
    }

    for (r, row) in target.rows().iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            match CellCoord::from_offsets(r, c) {
                Ok(coord) => {
                    builder.write(coord, value.clone());
                }
                Err(err) => failures.push(CellFailure {
                    reference: format!("R{}C{}", r + 1, c + 1),
                    message: err.to_string(),
                }),
            }
        }
    }

    let patch = builder.build();
    tracing::debug!(
        mode = mode.as_str(),
        writes = patch.write_count(),
        clears = patch.clear_count(),
        failures = failures.len(),
        "compiled patch"
    );
    CompiledPatch { patch, failures }
}

/// Compile caller-addressed cells. Unparseable references are reported
/// individually; for a repeated reference the last edit wins.
pub fn compile_cells(edits: &[CellEdit]) -> CompiledPatch {
    let mut builder = Patch::builder();
    let mut failures = Vec::new();
    for edit in edits {
        match CellCoord::parse_a1(&edit.reference) {
            Ok(coord) => {
                builder.write(coord, edit.value.clone());
            }
            Err(err) => failures.push(CellFailure {
                reference: edit.reference.clone(),
                message: err.to_string(),
            }),
        }
    }
    CompiledPatch {
        patch: builder.build(),
        failures,
    }
}
