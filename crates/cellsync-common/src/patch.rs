//! Backend-agnostic cell patches.
//!
//! A [`Patch`] is the only thing the apply layer hands to a backend: an
//! ordered list of per-cell clear/write operations with at most one operation
//! per coordinate. Both the file codec and the live automation surface replay
//! it verbatim.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::coord::{CellCoord, Extent};
use crate::dataset::Dataset;
use crate::value::CellValue;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Clear,
    Write,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOp {
    pub coord: CellCoord,
    pub kind: OpKind,
    /// `Empty` for clears.
    pub value: CellValue,
}

impl PatchOp {
    pub fn clear(coord: CellCoord) -> Self {
        Self {
            coord,
            kind: OpKind::Clear,
            value: CellValue::Empty,
        }
    }

    pub fn write(coord: CellCoord, value: CellValue) -> Self {
        let value = value.normalized();
        if value.is_empty() {
            return Self::clear(coord);
        }
        Self {
            coord,
            kind: OpKind::Write,
            value,
        }
    }

    pub fn is_clear(&self) -> bool {
        self.kind == OpKind::Clear
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Patch {
    ops: Vec<PatchOp>,
    /// Bounding box a full-sheet replacement cleared, if any.
    clear_region: Option<Extent>,
}

impl Patch {
    pub fn builder() -> PatchBuilder {
        PatchBuilder::default()
    }

    /// One write per non-empty cell of `rows`, anchored at A1.
    pub fn from_dataset(rows: &Dataset) -> Self {
        let mut builder = Self::builder();
        for (coord, value) in rows.cells() {
            if !value.is_empty() {
                builder.write(coord, value.clone());
            }
        }
        builder.build()
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn clear_region(&self) -> Option<Extent> {
        self.clear_region
    }

    pub fn writes(&self) -> impl Iterator<Item = &PatchOp> {
        self.ops.iter().filter(|op| op.kind == OpKind::Write)
    }

    pub fn clears(&self) -> impl Iterator<Item = &PatchOp> {
        self.ops.iter().filter(|op| op.kind == OpKind::Clear)
    }

    pub fn write_count(&self) -> usize {
        self.writes().count()
    }

    pub fn clear_count(&self) -> usize {
        self.clears().count()
    }

    pub fn op_at(&self, coord: CellCoord) -> Option<&PatchOp> {
        self.ops.iter().find(|op| op.coord == coord)
    }

    /// Smallest A1-anchored box covering every operation.
    pub fn extent(&self) -> Extent {
        self.ops.iter().fold(Extent::default(), |acc, op| {
            Extent::new(acc.rows.max(op.coord.row), acc.cols.max(op.coord.col))
        })
    }

    /// Replay the patch against an in-memory grid.
    pub fn apply_to(&self, base: &Dataset) -> Dataset {
        let mut cells: Vec<(CellCoord, CellValue)> = base
            .cells()
            .filter(|(_, v)| !v.is_empty())
            .map(|(c, v)| (c, v.clone()))
            .collect();
        let mut index: HashMap<CellCoord, usize> =
            cells.iter().enumerate().map(|(i, (c, _))| (*c, i)).collect();
        for op in &self.ops {
            match index.get(&op.coord) {
                Some(&i) => cells[i].1 = op.value.clone(),
                None => {
                    index.insert(op.coord, cells.len());
                    cells.push((op.coord, op.value.clone()));
                }
            }
        }
        Dataset::from_cells(cells).trimmed()
    }
}

/// Accumulates operations, keeping one operation per coordinate.
///
/// A later operation on an already-patched coordinate replaces the earlier one
/// in place, so the original position in the op order is kept and the latest
/// value wins.
#[derive(Debug, Default)]
pub struct PatchBuilder {
    ops: Vec<PatchOp>,
    index: HashMap<CellCoord, usize>,
    clear_region: Option<Extent>,
}

impl PatchBuilder {
    pub fn push(&mut self, op: PatchOp) -> &mut Self {
        match self.index.get(&op.coord) {
            Some(&i) => self.ops[i] = op,
            None => {
                self.index.insert(op.coord, self.ops.len());
                self.ops.push(op);
            }
        }
        self
    }

    pub fn write(&mut self, coord: CellCoord, value: impl Into<CellValue>) -> &mut Self {
        self.push(PatchOp::write(coord, value.into()))
    }

    pub fn clear(&mut self, coord: CellCoord) -> &mut Self {
        self.push(PatchOp::clear(coord))
    }

    /// Clear every coordinate of `region` and remember it as the cleared box.
    pub fn clear_region(&mut self, region: Extent) -> &mut Self {
        for coord in region.coords() {
            self.clear(coord);
        }
        self.clear_region = Some(region);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn build(self) -> Patch {
        Patch {
            ops: self.ops,
            clear_region: self.clear_region,
        }
    }
}
