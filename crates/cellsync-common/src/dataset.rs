use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::coord::{CellCoord, Extent};
use crate::value::CellValue;

/// One row of values; position `i` is column `i + 1`. Missing trailing cells
/// are empty.
pub type Row = Vec<CellValue>;

/// An ordered grid of rows anchored at A1.
///
/// Used both for what a sheet currently holds and for what a caller wants it
/// to hold. The first column of each row is its key column.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Build a dense dataset from sparse 1-based cells. Rows without any cell
    /// become empty rows so positions are preserved.
    pub fn from_cells<I>(cells: I) -> Self
    where
        I: IntoIterator<Item = (CellCoord, CellValue)>,
    {
        let sparse: BTreeMap<CellCoord, CellValue> = cells
            .into_iter()
            .filter(|(_, v)| !v.is_empty())
            .collect();
        let mut rows: Vec<Row> = Vec::new();
        for (coord, value) in sparse {
            let r = (coord.row - 1) as usize;
            let c = (coord.col - 1) as usize;
            if rows.len() <= r {
                rows.resize_with(r + 1, Vec::new);
            }
            let row = &mut rows[r];
            if row.len() <= c {
                row.resize(c + 1, CellValue::Empty);
            }
            row[c] = value;
        }
        Self { rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Width of the widest row.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.iter().all(CellValue::is_empty))
    }

    /// Bounding box of the non-empty cells.
    pub fn extent(&self) -> Extent {
        let mut rows = 0u32;
        let mut cols = 0u32;
        for (r, row) in self.rows.iter().enumerate() {
            if let Some(last) = row.iter().rposition(|v| !v.is_empty()) {
                rows = rows.max(r as u32 + 1);
                cols = cols.max(last as u32 + 1);
            }
        }
        Extent::new(rows, cols)
    }

    pub fn get(&self, coord: CellCoord) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.rows
            .get((coord.row - 1) as usize)
            .and_then(|r| r.get((coord.col - 1) as usize))
            .unwrap_or(&EMPTY)
    }

    /// Iterate every stored cell (including empty ones) with its coordinate.
    pub fn cells(&self) -> impl Iterator<Item = (CellCoord, &CellValue)> + '_ {
        self.rows.iter().enumerate().flat_map(|(r, row)| {
            row.iter().enumerate().map(move |(c, v)| {
                (
                    CellCoord {
                        row: r as u32 + 1,
                        col: c as u32 + 1,
                    },
                    v,
                )
            })
        })
    }

    /// Number of non-empty cells.
    pub fn non_empty_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.iter().filter(|v| !v.is_empty()).count())
            .sum()
    }

    /// Drop trailing empty cells from every row and trailing empty rows.
    pub fn trimmed(mut self) -> Self {
        for row in &mut self.rows {
            while row.last().is_some_and(CellValue::is_empty) {
                row.pop();
            }
        }
        while self.rows.last().is_some_and(Vec::is_empty) {
            self.rows.pop();
        }
        self
    }
}

impl From<Vec<Row>> for Dataset {
    fn from(rows: Vec<Row>) -> Self {
        Self::from_rows(rows)
    }
}

impl FromIterator<Row> for Dataset {
    fn from_iter<T: IntoIterator<Item = Row>>(iter: T) -> Self {
        Self::from_rows(iter.into_iter().collect())
    }
}
