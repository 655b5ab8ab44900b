//! Merge planning: the logical result of combining what a sheet holds with
//! what the caller sent.
//!
//! Rows are identified by their first column (the key column). Keys compare
//! by exact value equality after coercion: `"1"` and `1` differ, as do `"a"`
//! and `"A"`. Rows whose key cell is empty carry no identity and are never
//! matched; they keep their position (existing) or are appended (incoming).

use cellsync_common::{CellKey, CellValue, Dataset, Row};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::error::SyncError;
use crate::request::MergeMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Replace or concatenate without looking at keys.
    Simple,
    /// Overwrite rows by key, insert new keys at the end.
    KeyUpsert,
    /// Incoming is wider: add new columns to rows matched by key.
    ColumnExtend,
    /// Incoming is longer: add rows whose key is new.
    RowExtend,
}

impl MergeStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::KeyUpsert => "key_upsert",
            Self::ColumnExtend => "column_extend",
            Self::RowExtend => "row_extend",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub strategy: MergeStrategy,
    pub dataset: Dataset,
}

/// Compute the target dataset for a row-mode update.
pub fn plan(
    existing: &Dataset,
    incoming: &Dataset,
    mode: MergeMode,
    smart_merge: bool,
) -> Result<MergePlan, SyncError> {
    if let Some(i) = incoming.rows().iter().position(Vec::is_empty) {
        return Err(SyncError::invalid(format!("row {} has no columns", i + 1)));
    }

    let (strategy, dataset) = match mode {
        MergeMode::Cells => {
            return Err(SyncError::invalid(
                "cells mode writes addressed cells and is not planned",
            ));
        }
        MergeMode::Full => (MergeStrategy::Simple, incoming.clone()),
        MergeMode::Append if !smart_merge || existing.is_empty() => {
            (MergeStrategy::Simple, concat(existing, incoming))
        }
        MergeMode::Append => {
            let existing_width = existing.extent().cols as usize;
            let incoming_width = incoming.extent().cols as usize;
            let existing_height = existing.extent().rows as usize;
            if incoming_width > existing_width {
                (
                    MergeStrategy::ColumnExtend,
                    column_extend(existing, incoming, existing_width),
                )
            } else if incoming.height() > existing_height {
                (MergeStrategy::RowExtend, row_extend(existing, incoming))
            } else {
                (MergeStrategy::KeyUpsert, key_upsert(existing, incoming))
            }
        }
    };

    tracing::debug!(
        mode = mode.as_str(),
        strategy = strategy.as_str(),
        existing_rows = existing.height(),
        incoming_rows = incoming.height(),
        result_rows = dataset.height(),
        "planned merge"
    );
    Ok(MergePlan { strategy, dataset })
}

fn existing_rows(existing: &Dataset) -> Vec<Row> {
    existing.clone().trimmed().into_rows()
}

fn concat(existing: &Dataset, incoming: &Dataset) -> Dataset {
    let mut rows = existing_rows(existing);
    rows.extend(incoming.rows().iter().cloned());
    Dataset::from_rows(rows)
}

fn key_of(row: &Row) -> Option<CellKey> {
    row.first()
        .filter(|v| !v.is_empty())
        .map(CellValue::key)
}

fn column_extend(existing: &Dataset, incoming: &Dataset, width: usize) -> Dataset {
    let mut rows = existing_rows(existing);
    let mut first_by_key: FxHashMap<CellKey, usize> = FxHashMap::default();
    for (i, row) in rows.iter().enumerate() {
        if let Some(key) = key_of(row) {
            first_by_key.entry(key).or_insert(i);
        }
    }

    let mut unmatched = Vec::new();
    for row in incoming.rows() {
        match key_of(row).and_then(|k| first_by_key.get(&k).copied()) {
            Some(i) => {
                let target = &mut rows[i];
                target.resize(width, CellValue::Empty);
                if row.len() > width {
                    target.extend(row[width..].iter().cloned());
                }
            }
            None => unmatched.push(row.clone()),
        }
    }
    rows.extend(unmatched);
    Dataset::from_rows(rows)
}

fn row_extend(existing: &Dataset, incoming: &Dataset) -> Dataset {
    let mut rows = existing_rows(existing);
    let known: FxHashSet<CellKey> = rows.iter().filter_map(key_of).collect();
    rows.extend(
        incoming
            .rows()
            .iter()
            .filter(|row| key_of(row).is_none_or(|k| !known.contains(&k)))
            .cloned(),
    );
    Dataset::from_rows(rows)
}

fn key_upsert(existing: &Dataset, incoming: &Dataset) -> Dataset {
    let mut rows: Vec<Row> = Vec::new();
    let mut slot: FxHashMap<CellKey, usize> = FxHashMap::default();
    for row in existing_rows(existing).into_iter().chain(incoming.rows().iter().cloned()) {
        match key_of(&row) {
            Some(key) => match slot.get(&key) {
                Some(&i) => rows[i] = row,
                None => {
                    slot.insert(key, rows.len());
                    rows.push(row);
                }
            },
            None => rows.push(row),
        }
    }
    Dataset::from_rows(rows)
}
