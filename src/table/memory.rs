//! In-memory [`TargetTable`] backend.

use std::collections::HashSet;

use crate::error::{StorageError, StorageResult};
use crate::types::{DataSet, DataType, Schema, Value, ValueKey};

use super::{Predicate, RowFilter, TableTransaction, TargetTable};

/// A fixed-schema table held in memory.
///
/// Transactions operate on a staged copy of the rows; commit swaps the copy in, and
/// rollback (or simply dropping the transaction) throws it away.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    name: String,
    data: DataSet,
    unique: Vec<String>,
}

impl MemoryTable {
    /// Create an empty table.
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            data: DataSet::empty(schema),
            unique: Vec::new(),
        }
    }

    /// Declare a unique constraint on `column`. Nulls never conflict.
    pub fn with_unique(mut self, column: impl Into<String>) -> Self {
        self.unique.push(column.into());
        self
    }

    /// Current committed contents.
    pub fn data(&self) -> &DataSet {
        &self.data
    }

    /// Number of committed rows.
    pub fn row_count(&self) -> usize {
        self.data.row_count()
    }
}

impl TargetTable for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn column_names(&mut self) -> StorageResult<Vec<String>> {
        Ok(self.data.schema.field_names().map(str::to_string).collect())
    }

    fn begin(&mut self) -> StorageResult<Box<dyn TableTransaction + '_>> {
        let staged = self.data.clone();
        Ok(Box::new(MemoryTransaction {
            table: self,
            staged,
        }))
    }
}

struct MemoryTransaction<'a> {
    table: &'a mut MemoryTable,
    staged: DataSet,
}

impl MemoryTransaction<'_> {
    fn column_index(&self, column: &str) -> StorageResult<usize> {
        self.staged
            .schema
            .index_of(column)
            .ok_or_else(|| StorageError::UnknownColumn {
                table: self.table.name.clone(),
                column: column.to_string(),
            })
    }

    fn bind(&self, filter: &RowFilter) -> StorageResult<Vec<(usize, Bound)>> {
        filter
            .predicates()
            .iter()
            .map(|p| {
                let bound = match p {
                    Predicate::AnyOf { values, .. } => {
                        Bound::AnyOf(values.iter().filter_map(Value::key).collect())
                    }
                    other => Bound::Cell(other.clone()),
                };
                Ok((self.column_index(p.column())?, bound))
            })
            .collect()
    }

    fn check_unique(&self, incoming: &[Vec<Value>]) -> StorageResult<()> {
        for column in &self.table.unique {
            let idx = self.column_index(column)?;
            let mut seen = HashSet::new();
            for row in self.staged.rows.iter().chain(incoming.iter()) {
                let v = &row[idx];
                let Some(key) = v.key() else {
                    continue;
                };
                if !seen.insert(key) {
                    return Err(StorageError::Constraint {
                        message: format!(
                            "duplicate value {v:?} in unique column '{column}' of table '{}'",
                            self.table.name
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A predicate bound to a column index. `AnyOf` lists become hash sets.
enum Bound {
    Cell(Predicate),
    AnyOf(HashSet<ValueKey>),
}

fn matches_all(bound: &[(usize, Bound)], row: &[Value]) -> bool {
    bound.iter().all(|(idx, b)| match b {
        Bound::Cell(p) => p.matches(&row[*idx]),
        Bound::AnyOf(keys) => row[*idx].key().is_some_and(|k| keys.contains(&k)),
    })
}

impl TableTransaction for MemoryTransaction<'_> {
    fn column_names(&mut self) -> StorageResult<Vec<String>> {
        Ok(self.staged.schema.field_names().map(str::to_string).collect())
    }

    fn insert_rows(&mut self, rows: &DataSet) -> StorageResult<usize> {
        let width = self.staged.schema.len();
        let targets = rows
            .schema
            .field_names()
            .map(|name| self.column_index(name))
            .collect::<StorageResult<Vec<_>>>()?;

        let mut incoming: Vec<Vec<Value>> = Vec::with_capacity(rows.row_count());
        for row in &rows.rows {
            let mut out = vec![Value::Null; width];
            for (value, &idx) in row.iter().zip(targets.iter()) {
                let field = &self.staged.schema.fields[idx];
                out[idx] = coerce(&field.name, &field.data_type, value.clone())?;
            }
            incoming.push(out);
        }

        self.check_unique(&incoming)?;
        let n = incoming.len();
        self.staged.rows.extend(incoming);
        Ok(n)
    }

    fn max_i64(&mut self, column: &str) -> StorageResult<Option<i64>> {
        let idx = self.column_index(column)?;
        Ok(self.staged.reduce_rows(None, |acc: Option<i64>, row| {
            match (acc, row[idx].as_i64()) {
                (Some(a), Some(v)) => Some(a.max(v)),
                (None, v) => v,
                (a, None) => a,
            }
        }))
    }

    fn scan(&mut self, columns: &[&str], filter: &RowFilter) -> StorageResult<DataSet> {
        let bound = self.bind(filter)?;
        for c in columns {
            self.column_index(c)?;
        }
        let matched = self.staged.filter_rows(|row| matches_all(&bound, row));
        Ok(matched
            .project(columns)
            .unwrap_or_else(|| DataSet::empty(Schema::new(Vec::new()))))
    }

    fn update(&mut self, filter: &RowFilter, column: &str, value: &Value) -> StorageResult<usize> {
        let bound = self.bind(filter)?;
        let idx = self.column_index(column)?;
        let field = &self.staged.schema.fields[idx];
        let value = coerce(&field.name, &field.data_type, value.clone())?;

        let mut n = 0;
        for row in self.staged.rows.iter_mut() {
            if matches_all(&bound, row) {
                row[idx] = value.clone();
                n += 1;
            }
        }
        Ok(n)
    }

    fn delete(&mut self, filter: &RowFilter) -> StorageResult<usize> {
        let bound = self.bind(filter)?;
        let before = self.staged.row_count();
        self.staged.rows.retain(|row| !matches_all(&bound, row));
        Ok(before - self.staged.row_count())
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        let MemoryTransaction { table, staged } = *self;
        table.data = staged;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

/// Fit `value` into a column of type `data_type`.
///
/// Integers widen to floats, and the integers `0`/`1` are accepted for boolean columns.
fn coerce(column: &str, data_type: &DataType, value: Value) -> StorageResult<Value> {
    let out = match (data_type, value) {
        (_, Value::Null) => Value::Null,
        (DataType::Int64, Value::Int64(v)) => Value::Int64(v),
        (DataType::Float64, Value::Float64(v)) => Value::Float64(v),
        (DataType::Float64, Value::Int64(v)) => Value::Float64(v as f64),
        (DataType::Bool, Value::Bool(b)) => Value::Bool(b),
        (DataType::Bool, Value::Int64(v @ (0 | 1))) => Value::Bool(v == 1),
        (DataType::Utf8, Value::Utf8(s)) => Value::Utf8(s),
        (expected, other) => {
            return Err(StorageError::TypeMismatch {
                column: column.to_string(),
                expected: expected.clone(),
                found: format!("{other:?}"),
            });
        }
    };
    Ok(out)
}
