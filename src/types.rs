//! Core data model types.
//!
//! Row sources produce an in-memory [`DataSet`] described by a [`Schema`] (a list of typed
//! [`Field`]s). The same types carry batches into a target table and scan results back out.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Logical data type for a schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// A list of fields describing the shape of a batch or table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Returns `true` if a field named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the schema has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A single typed value in a [`DataSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the value. Integral floats and booleans convert; everything else is `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::Float64(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Value equality as a relational store compares it.
    ///
    /// `Null` equals nothing (not even `Null`). Numbers compare by numeric value across
    /// `Int64`/`Float64`, and booleans compare equal to the integers `0`/`1`.
    pub fn sql_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => a == b,
            (Value::Int64(a), Value::Float64(b)) | (Value::Float64(b), Value::Int64(a)) => {
                (*a as f64) == *b
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Bool(a), Value::Int64(b)) | (Value::Int64(b), Value::Bool(a)) => {
                i64::from(*a) == *b
            }
            (Value::Utf8(a), Value::Utf8(b)) => a == b,
            _ => false,
        }
    }
}

/// Hashable form of a non-null [`Value`], for set lookups that agree with [`Value::sql_eq`].
///
/// Integral floats and booleans fold into `Int`, so `1`, `1.0` and `true` share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Int(i64),
    /// Bit pattern of a non-integral float.
    Float(u64),
    Str(String),
}

impl Value {
    /// Set key for the value, or `None` for `Null` and `NaN`, which equal nothing.
    pub fn key(&self) -> Option<ValueKey> {
        match self {
            Value::Null => None,
            Value::Int64(v) => Some(ValueKey::Int(*v)),
            Value::Bool(b) => Some(ValueKey::Int(i64::from(*b))),
            Value::Float64(f) if f.is_nan() => None,
            // The range check keeps `as` from saturating; -0.0 lands on Int(0).
            Value::Float64(f) if f.fract() == 0.0 && *f >= -(2f64.powi(63)) && *f < 2f64.powi(63) => {
                Some(ValueKey::Int(*f as i64))
            }
            Value::Float64(f) => Some(ValueKey::Float(f.to_bits())),
            Value::Utf8(s) => Some(ValueKey::Str(s.clone())),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Utf8(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Utf8(v)
    }
}

/// In-memory tabular dataset.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Create an empty dataset with the given schema.
    pub fn empty(schema: Schema) -> Self {
        Self::new(schema, Vec::new())
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the dataset holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate the values of one column, or `None` if the column does not exist.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let idx = self.schema.index_of(name)?;
        Some(self.rows.iter().filter_map(move |row| row.get(idx)))
    }

    /// Distinct non-null values of one column, in first-seen order. Values equal under
    /// [`Value::sql_eq`] count once.
    ///
    /// Returns `None` if the column does not exist.
    pub fn distinct_values(&self, name: &str) -> Option<Vec<Value>> {
        let mut seen = HashSet::new();
        let mut out: Vec<Value> = Vec::new();
        for v in self.column(name)? {
            if let Some(key) = v.key() {
                if seen.insert(key) {
                    out.push(v.clone());
                }
            }
        }
        Some(out)
    }

    /// Create a new dataset containing only rows that match `predicate`.
    ///
    /// The returned dataset preserves the original schema.
    pub fn filter_rows<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&[Value]) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .filter(|row| predicate(row.as_slice()))
            .cloned()
            .collect();
        Self {
            schema: self.schema.clone(),
            rows,
        }
    }

    /// Keep only the named columns, in the given order.
    ///
    /// Returns `None` if any column does not exist.
    pub fn project(&self, columns: &[&str]) -> Option<Self> {
        let idxs = columns
            .iter()
            .map(|c| self.schema.index_of(c))
            .collect::<Option<Vec<_>>>()?;
        let schema = Schema::new(idxs.iter().map(|&i| self.schema.fields[i].clone()).collect());
        let rows = self
            .rows
            .iter()
            .map(|row| idxs.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Some(Self { schema, rows })
    }

    /// Append columns to every row.
    ///
    /// `values` is called once per row with the row index and must return one value per new
    /// field.
    ///
    /// # Panics
    ///
    /// Panics if `values` returns a different number of values than `fields.len()`.
    pub fn append_columns<F>(mut self, fields: Vec<Field>, mut values: F) -> Self
    where
        F: FnMut(usize) -> Vec<Value>,
    {
        let added = fields.len();
        for (idx, row) in self.rows.iter_mut().enumerate() {
            let extra = values(idx);
            assert!(
                extra.len() == added,
                "appended value count {} does not match field count {}",
                extra.len(),
                added
            );
            row.extend(extra);
        }
        self.schema.fields.extend(fields);
        self
    }

    /// Reduce (fold) all rows into an accumulator value.
    ///
    /// This is similar to `Iterator::fold`, but provides each row as `&[Value]`.
    pub fn reduce_rows<A, F>(&self, init: A, mut reducer: F) -> A
    where
        F: FnMut(A, &[Value]) -> A,
    {
        self.rows
            .iter()
            .fold(init, |acc, row| reducer(acc, row.as_slice()))
    }
}
