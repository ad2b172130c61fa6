//! Overwrite resolution: find live prior rows that a batch supersedes.

use std::collections::HashSet;

use crate::error::{LoadError, LoadResult, StorageError};
use crate::table::{RowFilter, TableTransaction};
use crate::types::{DataSet, Value, ValueKey};

use super::policy::{KeyMatching, OverwritePolicy};
use super::LoadStage;

/// Largest key-value list sent to the table in one `IN (...)` predicate.
pub const KEY_CHUNK_SIZE: usize = 500;

/// Filter selecting superseded candidates under [`KeyMatching::PerColumn`].
///
/// Live (`flag_col == active`), older than the batch (`id_col <= ceiling`), and for every key
/// column, holding one of the values that column takes somewhere in the batch. The key lists
/// are unbounded; [`find_superseded`] splits them for the table.
pub fn superseded_filter(policy: &OverwritePolicy, batch: &DataSet, ceiling: i64) -> LoadResult<RowFilter> {
    let mut filter = candidate_filter(policy, ceiling);
    for (key, values) in key_values(policy, batch)? {
        filter = filter.any_of(key, values);
    }
    Ok(filter)
}

/// Identifiers of the prior rows superseded by `batch`.
///
/// `ceiling` is the highest identifier that existed before the batch was inserted, so the
/// batch's own rows are never candidates. The result is sorted ascending.
///
/// The key column with the most distinct values is queried in chunks of
/// [`KEY_CHUNK_SIZE`]; other key lists longer than that are checked after the scan.
pub fn find_superseded<T>(tx: &mut T, table: &str, policy: &OverwritePolicy, batch: &DataSet, ceiling: i64) -> LoadResult<Vec<i64>>
where
    T: TableTransaction + ?Sized,
{
    let keys = key_values(policy, batch)?;
    if keys.is_empty() {
        return Err(LoadError::configuration("overwrite policy has no key columns".to_string()));
    }
    if ceiling < 0 || keys.iter().any(|(_, values)| values.is_empty()) {
        return Ok(Vec::new());
    }

    let sets: Vec<HashSet<ValueKey>> = keys
        .iter()
        .map(|(_, values)| values.iter().filter_map(Value::key).collect())
        .collect();
    let tuples = match policy.matching {
        KeyMatching::PerColumn => None,
        KeyMatching::Composite => Some(batch_tuples(policy, batch)?),
    };

    let driver = (0..keys.len()).max_by_key(|&i| keys[i].1.len()).unwrap_or(0);
    let mut base = candidate_filter(policy, ceiling);
    for (i, (key, values)) in keys.iter().enumerate() {
        if i != driver && values.len() <= KEY_CHUNK_SIZE {
            base = base.any_of(*key, values.clone());
        }
    }

    let mut columns: Vec<&str> = vec![policy.id_col.as_str()];
    columns.extend(keys.iter().map(|(key, _)| *key));

    let mut ids = Vec::new();
    for chunk in keys[driver].1.chunks(KEY_CHUNK_SIZE) {
        let filter = base.clone().any_of(keys[driver].0, chunk.to_vec());
        let candidates = tx.scan(&columns, &filter).map_err(|e| scan_error(table, e))?;
        for row in &candidates.rows {
            let Some(row_keys) = row[1..].iter().map(Value::key).collect::<Option<Vec<_>>>() else {
                continue;
            };
            let matched = match &tuples {
                None => row_keys.iter().zip(&sets).all(|(k, set)| set.contains(k)),
                Some(tuples) => tuples.contains(&row_keys),
            };
            if matched {
                ids.extend(row[0].as_i64());
            }
        }
    }
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

fn candidate_filter(policy: &OverwritePolicy, ceiling: i64) -> RowFilter {
    RowFilter::all()
        .eq(policy.flag_col.as_str(), policy.active_flag())
        .at_most(policy.id_col.as_str(), ceiling)
}

/// Distinct non-null batch values per key column, in policy order.
fn key_values<'p>(policy: &'p OverwritePolicy, batch: &DataSet) -> LoadResult<Vec<(&'p str, Vec<Value>)>> {
    policy
        .keys
        .iter()
        .map(|key| {
            let values = batch.distinct_values(key).ok_or_else(|| {
                LoadError::configuration(format!("key column '{key}' is missing from the batch"))
            })?;
            Ok((key.as_str(), values))
        })
        .collect()
}

/// Whole key tuples of the batch. Tuples holding a null match nothing and are left out.
fn batch_tuples(policy: &OverwritePolicy, batch: &DataSet) -> LoadResult<HashSet<Vec<ValueKey>>> {
    let keys: Vec<&str> = policy.keys.iter().map(String::as_str).collect();
    let projected = batch.project(&keys).ok_or_else(|| {
        LoadError::configuration("batch is missing one of the key columns".to_string())
    })?;
    Ok(projected
        .rows
        .iter()
        .filter_map(|row| row.iter().map(Value::key).collect::<Option<Vec<_>>>())
        .collect())
}

fn scan_error(table: &str, e: StorageError) -> LoadError {
    match e {
        StorageError::UnknownColumn { column, .. } => {
            LoadError::configuration(format!("table '{table}' has no column '{column}'"))
        }
        other => LoadError::storage(LoadStage::ResolvingOverwrite, other),
    }
}
