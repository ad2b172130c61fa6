//! Surrogate identifier assignment.

use crate::error::{LoadError, LoadResult, StorageError};
use crate::table::TableTransaction;

use super::LoadStage;

/// Contiguous identifiers reserved for one batch: `[first, first + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    first: i64,
    len: usize,
}

impl IdRange {
    /// Range starting at `first` covering `len` identifiers.
    pub fn new(first: i64, len: usize) -> Self {
        Self { first, len }
    }

    /// First identifier of the batch.
    pub fn first(&self) -> i64 {
        self.first
    }

    /// Number of identifiers.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the range is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Highest identifier that existed before this batch (`first - 1`, so `-1` for an empty
    /// table). Prior rows are exactly the rows at or below the ceiling.
    pub fn ceiling(&self) -> i64 {
        self.first - 1
    }

    /// Identifier of the `offset`-th row of the batch.
    pub fn id_at(&self, offset: usize) -> i64 {
        self.first + offset as i64
    }

    /// Identifiers in row order.
    pub fn ids(&self) -> impl Iterator<Item = i64> + use<> {
        let first = self.first;
        (0..self.len).map(move |offset| first + offset as i64)
    }
}

/// Reserve identifiers for a batch of `batch_size` rows.
///
/// The first identifier is `max(id_col) + 1`, or `0` when the table holds no identifier yet.
/// Must run before any row of the batch is inserted. A range that would pass `i64::MAX`
/// is a configuration error.
pub fn next_range<T>(tx: &mut T, table: &str, id_col: &str, batch_size: usize) -> LoadResult<IdRange>
where
    T: TableTransaction + ?Sized,
{
    let max = tx.max_i64(id_col).map_err(|e| match e {
        StorageError::UnknownColumn { column, .. } => {
            LoadError::configuration(format!("table '{table}' has no identifier column '{column}'"))
        }
        other => LoadError::storage(LoadStage::Start, other),
    })?;
    let first = match max {
        None => 0,
        Some(m) => m.checked_add(1).ok_or_else(|| exhausted(table, id_col))?,
    };
    let last_offset = i64::try_from(batch_size.saturating_sub(1)).map_err(|_| exhausted(table, id_col))?;
    first
        .checked_add(last_offset)
        .ok_or_else(|| exhausted(table, id_col))?;
    Ok(IdRange::new(first, batch_size))
}

fn exhausted(table: &str, id_col: &str) -> LoadError {
    LoadError::configuration(format!(
        "identifier column '{id_col}' of table '{table}' has no room for the batch"
    ))
}
