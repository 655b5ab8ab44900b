//! 1-based cell coordinates and the A1 column-letter codec.
//!
//! Rows and columns are 1-based throughout the engine, matching what both the
//! file codec and the live automation surface expect. Limits mirror Excel:
//! 1,048,576 rows × 16,384 columns.

use core::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::CellRefError;

pub const MAX_ROWS: u32 = 1 << 20;
pub const MAX_COLS: u32 = 1 << 14;

/// Absolute 1-based cell position.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    pub row: u32,
    pub col: u32,
}

impl CellCoord {
    /// Construct a coordinate, panicking on a zero index.
    pub fn new(row: u32, col: u32) -> Self {
        assert!(row >= 1 && col >= 1, "coordinates are 1-based: ({row}, {col})");
        Self { row, col }
    }

    /// Fallible constructor that reports zero or out-of-range indices.
    pub fn try_new(row: u32, col: u32) -> Result<Self, CellRefError> {
        if row == 0 || col == 0 {
            return Err(CellRefError::ZeroIndex);
        }
        if row > MAX_ROWS {
            return Err(CellRefError::RowOutOfRange(row));
        }
        if col > MAX_COLS {
            return Err(CellRefError::ColumnOutOfRange(col));
        }
        Ok(Self { row, col })
    }

    /// Build from 0-based dataset positions.
    pub fn from_offsets(row_idx: usize, col_idx: usize) -> Result<Self, CellRefError> {
        let row = u32::try_from(row_idx + 1).map_err(|_| CellRefError::RowOutOfRange(u32::MAX))?;
        let col = u32::try_from(col_idx + 1).map_err(|_| CellRefError::ColumnOutOfRange(u32::MAX))?;
        Self::try_new(row, col)
    }

    /// Parse an A1-style reference (`B7`, `aa10`, `$C$3`).
    pub fn parse_a1(reference: &str) -> Result<Self, CellRefError> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(CellRefError::Empty);
        }
        let body: String = trimmed.chars().filter(|c| *c != '$').collect();
        let split = body
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| CellRefError::MissingRow(reference.to_string()))?;
        let (letters, digits) = body.split_at(split);
        if letters.is_empty() {
            return Err(CellRefError::MissingColumn(reference.to_string()));
        }
        let col = letters_to_column(&letters.to_ascii_uppercase())
            .ok_or_else(|| CellRefError::InvalidColumn(reference.to_string()))?;
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CellRefError::InvalidRow(reference.to_string()));
        }
        let row: u32 = digits
            .parse()
            .map_err(|_| CellRefError::InvalidRow(reference.to_string()))?;
        Self::try_new(row, col)
    }

    pub fn column_letters(self) -> String {
        column_to_letters(self.col)
    }

    /// Render in A1 notation.
    pub fn to_a1(self) -> String {
        format!("{}{}", column_to_letters(self.col), self.row)
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_to_letters(self.col), self.row)
    }
}

impl FromStr for CellCoord {
    type Err = CellRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_a1(s)
    }
}

impl From<CellCoord> for (u32, u32) {
    fn from(coord: CellCoord) -> Self {
        (coord.row, coord.col)
    }
}

impl TryFrom<(u32, u32)> for CellCoord {
    type Error = CellRefError;

    fn try_from(value: (u32, u32)) -> Result<Self, Self::Error> {
        Self::try_new(value.0, value.1)
    }
}

/// Row/column extent of a sheet's used area, anchored at A1.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Extent {
    pub rows: u32,
    pub cols: u32,
}

impl Extent {
    pub const fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    pub fn is_empty(self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn contains(self, coord: CellCoord) -> bool {
        coord.row <= self.rows && coord.col <= self.cols
    }

    /// Grow each axis to at least the given floor.
    pub fn at_least(self, min_rows: u32, min_cols: u32) -> Self {
        Self {
            rows: self.rows.max(min_rows),
            cols: self.cols.max(min_cols),
        }
    }

    /// Every coordinate in row-major order.
    pub fn coords(self) -> impl Iterator<Item = CellCoord> {
        (1..=self.rows).flat_map(move |row| (1..=self.cols).map(move |col| CellCoord { row, col }))
    }
}

/// Convert a 1-based column index to letters (1 → `A`, 26 → `Z`, 27 → `AA`).
pub fn column_to_letters(col: u32) -> String {
    debug_assert!(col >= 1, "column index is 1-based");
    let mut n = col;
    let mut buf = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        buf.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    buf.reverse();
    buf.into_iter().map(char::from).collect()
}

/// Convert uppercase column letters to a 1-based index. Returns `None` for
/// empty input, non `A-Z` bytes, or overflow.
pub fn letters_to_column(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for ch in s.bytes() {
        if !ch.is_ascii_uppercase() {
            return None;
        }
        let val = (ch - b'A') as u32 + 1;
        col = col.checked_mul(26)?.checked_add(val)?;
    }
    Some(col)
}
