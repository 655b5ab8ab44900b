//! Errors raised while turning caller-supplied references into coordinates.

use thiserror::Error;

/// Why a cell reference could not be resolved to a [`CellCoord`](crate::CellCoord).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellRefError {
    #[error("cell reference is empty")]
    Empty,
    #[error("cell reference '{0}' has no column letters")]
    MissingColumn(String),
    #[error("cell reference '{0}' has no row number")]
    MissingRow(String),
    #[error("cell reference '{0}' has invalid column letters")]
    InvalidColumn(String),
    #[error("cell reference '{0}' has an invalid row number")]
    InvalidRow(String),
    #[error("row and column indices must be 1-based (>= 1)")]
    ZeroIndex,
    #[error("row {0} exceeds the sheet limit")]
    RowOutOfRange(u32),
    #[error("column {0} exceeds the sheet limit")]
    ColumnOutOfRange(u32),
}
