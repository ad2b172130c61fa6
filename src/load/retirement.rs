//! Retirement of superseded rows.

use crate::error::{LoadError, LoadResult};
use crate::table::{RowFilter, TableTransaction};
use crate::types::Value;

use super::policy::{OverwritePolicy, RetirementMode};

/// Identifiers are retired in chunks of this size to keep `IN (...)` lists bounded.
pub const RETIRE_CHUNK_SIZE: usize = 500;

/// Retire the rows with the given identifiers according to `policy.mode`.
///
/// - [`RetirementMode::Soft`] sets `flag_col` to the retired value on rows that are still
///   live, so repeating the call changes nothing and returns `0`.
/// - [`RetirementMode::Hard`] deletes the rows.
///
/// An empty `ids` slice is a no-op. Returns the number of rows affected.
pub fn retire<T>(tx: &mut T, policy: &OverwritePolicy, ids: &[i64]) -> LoadResult<usize>
where
    T: TableTransaction + ?Sized,
{
    let mut affected = 0;
    for chunk in ids.chunks(RETIRE_CHUNK_SIZE) {
        let ids: Vec<Value> = chunk.iter().copied().map(Value::Int64).collect();
        let filter = RowFilter::all().any_of(policy.id_col.as_str(), ids);
        let n = match policy.mode {
            RetirementMode::Soft => {
                let live = filter.eq(policy.flag_col.as_str(), policy.active_flag());
                tx.update(&live, &policy.flag_col, &policy.retired_flag())
            }
            RetirementMode::Hard => tx.delete(&filter),
        }
        .map_err(|source| LoadError::Retirement { source })?;
        affected += n;
    }
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::{retire, RETIRE_CHUNK_SIZE};
    use crate::load::policy::OverwritePolicy;
    use crate::table::{MemoryTable, RowFilter, TargetTable};
    use crate::types::{DataSet, DataType, Field, Schema, Value};

    fn seeded(n: i64) -> MemoryTable {
        let schema = Schema::new(vec![
            Field::new("record_id", DataType::Int64),
            Field::new("is_deleted", DataType::Int64),
        ]);
        let mut t = MemoryTable::new("t", schema.clone());
        let rows = (0..n).map(|i| vec![Value::Int64(i), Value::Int64(0)]).collect();
        let mut tx = t.begin().unwrap();
        tx.insert_rows(&DataSet::new(schema, rows)).unwrap();
        tx.commit().unwrap();
        t
    }

    #[test]
    fn empty_id_set_is_a_no_op() {
        let mut t = seeded(3);
        let mut tx = t.begin().unwrap();
        assert_eq!(retire(tx.as_mut(), &OverwritePolicy::hard(["k"]), &[]).unwrap(), 0);
        assert_eq!(retire(tx.as_mut(), &OverwritePolicy::soft(["k"]), &[]).unwrap(), 0);
    }

    #[test]
    fn soft_retirement_is_idempotent() {
        let mut t = seeded(3);
        let policy = OverwritePolicy::soft(["k"]);
        let mut tx = t.begin().unwrap();
        assert_eq!(retire(tx.as_mut(), &policy, &[0, 2]).unwrap(), 2);
        let first = tx.scan(&["record_id", "is_deleted"], &RowFilter::all()).unwrap();
        assert_eq!(retire(tx.as_mut(), &policy, &[0, 2]).unwrap(), 0);
        let second = tx.scan(&["record_id", "is_deleted"], &RowFilter::all()).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.rows[1], vec![Value::Int64(1), Value::Int64(0)]);
        assert_eq!(second.rows[2], vec![Value::Int64(2), Value::Int64(1)]);
    }

    #[test]
    fn hard_retirement_spans_chunks() {
        let n = (RETIRE_CHUNK_SIZE * 2 + 7) as i64;
        let mut t = seeded(n + 1);
        let ids: Vec<i64> = (0..n).collect();
        let mut tx = t.begin().unwrap();
        assert_eq!(retire(tx.as_mut(), &OverwritePolicy::hard(["k"]), &ids).unwrap(), n as usize);
        assert_eq!(tx.select_i64("record_id", &RowFilter::all()).unwrap(), vec![n]);
    }
}
