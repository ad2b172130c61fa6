//! Target-table abstraction.
//!
//! The load core talks to storage only through [`TargetTable`] and the scoped
//! [`TableTransaction`] it hands out. Backends:
//!
//! - [`MemoryTable`]: an in-memory table over a [`crate::types::DataSet`]
//! - [`SqliteTable`] (feature `sqlite`): an existing table in a SQLite database
//!
//! Every read and write a load performs happens inside one transaction. Dropping a
//! transaction without calling [`TableTransaction::commit`] discards its changes.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use crate::error::StorageResult;
use crate::types::{DataSet, Value};

pub use memory::MemoryTable;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTable;

/// One condition of a [`RowFilter`].
///
/// `Null` cells never satisfy a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = value`
    Equals { column: String, value: Value },
    /// `column <= bound` (integer comparison)
    AtMost { column: String, bound: i64 },
    /// `column IN (values...)`; an empty list matches nothing.
    AnyOf { column: String, values: Vec<Value> },
}

impl Predicate {
    /// Column the predicate reads.
    pub fn column(&self) -> &str {
        match self {
            Predicate::Equals { column, .. }
            | Predicate::AtMost { column, .. }
            | Predicate::AnyOf { column, .. } => column,
        }
    }

    /// Evaluate against a single cell.
    pub fn matches(&self, cell: &Value) -> bool {
        match self {
            Predicate::Equals { value, .. } => cell.sql_eq(value),
            Predicate::AtMost { bound, .. } => match cell {
                Value::Float64(f) => *f <= *bound as f64,
                other => other.as_i64().is_some_and(|v| v <= *bound),
            },
            Predicate::AnyOf { values, .. } => values.iter().any(|v| cell.sql_eq(v)),
        }
    }
}

/// Conjunction of [`Predicate`]s. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFilter {
    predicates: Vec<Predicate>,
}

impl RowFilter {
    /// A filter matching every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Add `column = value`.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Equals {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    /// Add `column <= bound`.
    pub fn at_most(mut self, column: impl Into<String>, bound: i64) -> Self {
        self.predicates.push(Predicate::AtMost {
            column: column.into(),
            bound,
        });
        self
    }

    /// Add `column IN (values...)`.
    pub fn any_of(mut self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.predicates.push(Predicate::AnyOf {
            column: column.into(),
            values,
        });
        self
    }

    /// Predicates in insertion order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Returns `true` if no predicate can ever match (an empty `AnyOf`).
    pub fn is_unsatisfiable(&self) -> bool {
        self.predicates
            .iter()
            .any(|p| matches!(p, Predicate::AnyOf { values, .. } if values.is_empty()))
    }
}

/// A relation the loader can write into.
///
/// The shape of the table is discovered at runtime; the loader never creates or alters it.
pub trait TargetTable {
    /// Table name, used in error messages and observer contexts.
    fn name(&self) -> &str;

    /// Column names in table order.
    fn column_names(&mut self) -> StorageResult<Vec<String>>;

    /// Open a transaction. All changes made through it become durable together on
    /// [`TableTransaction::commit`], or not at all.
    fn begin(&mut self) -> StorageResult<Box<dyn TableTransaction + '_>>;
}

/// Scoped unit of work against one [`TargetTable`].
pub trait TableTransaction {
    /// Column names in table order.
    fn column_names(&mut self) -> StorageResult<Vec<String>>;

    /// Insert every row of `rows`, mapping batch columns to table columns by name.
    ///
    /// Either all rows are written or the call fails.
    fn insert_rows(&mut self, rows: &DataSet) -> StorageResult<usize>;

    /// Maximum integer value of `column`, or `None` if the table holds no non-null value.
    fn max_i64(&mut self, column: &str) -> StorageResult<Option<i64>>;

    /// Rows matching `filter`, projected to `columns`.
    fn scan(&mut self, columns: &[&str], filter: &RowFilter) -> StorageResult<DataSet>;

    /// Set `column = value` on every row matching `filter`. Returns the affected row count.
    fn update(&mut self, filter: &RowFilter, column: &str, value: &Value) -> StorageResult<usize>;

    /// Delete every row matching `filter`. Returns the affected row count.
    fn delete(&mut self, filter: &RowFilter) -> StorageResult<usize>;

    /// Make all changes durable.
    fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Discard all changes.
    fn rollback(self: Box<Self>) -> StorageResult<()>;

    /// Integer values of `column` for rows matching `filter`. Nulls are skipped.
    fn select_i64(&mut self, column: &str, filter: &RowFilter) -> StorageResult<Vec<i64>> {
        let ds = self.scan(&[column], filter)?;
        Ok(ds
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(Value::as_i64))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{Predicate, RowFilter};
    use crate::types::Value;

    #[test]
    fn null_never_matches() {
        let p = Predicate::AnyOf {
            column: "c".into(),
            values: vec![Value::Null, Value::Int64(1)],
        };
        assert!(!p.matches(&Value::Null));
        assert!(p.matches(&Value::Int64(1)));

        let le = Predicate::AtMost {
            column: "c".into(),
            bound: 3,
        };
        assert!(!le.matches(&Value::Null));
        assert!(le.matches(&Value::Int64(3)));
        assert!(!le.matches(&Value::Int64(4)));
    }

    #[test]
    fn empty_any_of_is_unsatisfiable() {
        let f = RowFilter::all().eq("a", 1_i64).any_of("b", Vec::new());
        assert!(f.is_unsatisfiable());
        assert!(!RowFilter::all().eq("a", 1_i64).is_unsatisfiable());
    }
}
