#![cfg(feature = "sqlite")]

//! SQLite [`TargetTable`] backend.
//!
//! Works against an existing table; columns and their declared types are read with
//! `PRAGMA table_info`. Each load runs inside a `rusqlite::Transaction`, which rolls back
//! when dropped without a commit.

use std::path::Path;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, Transaction};

use crate::error::{StorageError, StorageResult};
use crate::types::{DataSet, DataType, Field, Schema, Value};

use super::{Predicate, RowFilter, TableTransaction, TargetTable};

/// A table inside a SQLite database.
pub struct SqliteTable {
    conn: Connection,
    name: String,
}

impl std::fmt::Debug for SqliteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTable")
            .field("name", &self.name)
            .field("path", &self.conn.path())
            .finish()
    }
}

impl SqliteTable {
    /// Open the database at `path` and bind to table `name`.
    ///
    /// Fails with [`StorageError::UnknownTable`] if the table does not exist.
    pub fn open(path: impl AsRef<Path>, name: impl Into<String>) -> StorageResult<Self> {
        Self::from_connection(Connection::open(path)?, name)
    }

    /// Bind to table `name` on an existing connection.
    pub fn from_connection(conn: Connection, name: impl Into<String>) -> StorageResult<Self> {
        let name = name.into();
        if table_schema(&conn, &name)?.is_empty() {
            return Err(StorageError::UnknownTable { table: name });
        }
        Ok(Self { conn, name })
    }

    /// Underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Release the connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

impl TargetTable for SqliteTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn column_names(&mut self) -> StorageResult<Vec<String>> {
        Ok(table_schema(&self.conn, &self.name)?
            .field_names()
            .map(str::to_string)
            .collect())
    }

    fn begin(&mut self) -> StorageResult<Box<dyn TableTransaction + '_>> {
        let tx = self.conn.transaction()?;
        let schema = table_schema(&tx, &self.name)?;
        Ok(Box::new(SqliteTransaction {
            tx,
            table: &self.name,
            schema,
        }))
    }
}

struct SqliteTransaction<'a> {
    tx: Transaction<'a>,
    table: &'a str,
    schema: Schema,
}

impl SqliteTransaction<'_> {
    fn field(&self, column: &str) -> StorageResult<&Field> {
        self.schema
            .index_of(column)
            .map(|i| &self.schema.fields[i])
            .ok_or_else(|| StorageError::UnknownColumn {
                table: self.table.to_string(),
                column: column.to_string(),
            })
    }

    /// Render `filter` as a `WHERE` clause with positional parameters.
    fn where_clause(&self, filter: &RowFilter) -> StorageResult<(String, Vec<SqlValue>)> {
        if filter.predicates().is_empty() {
            return Ok((String::new(), Vec::new()));
        }
        let mut parts = Vec::with_capacity(filter.predicates().len());
        let mut params = Vec::new();
        for p in filter.predicates() {
            let col = quote_ident(&self.field(p.column())?.name);
            match p {
                Predicate::Equals { value, .. } => {
                    parts.push(format!("{col} = ?"));
                    params.push(to_sql(value));
                }
                Predicate::AtMost { bound, .. } => {
                    parts.push(format!("{col} <= ?"));
                    params.push(SqlValue::Integer(*bound));
                }
                Predicate::AnyOf { values, .. } if values.is_empty() => parts.push("0".to_string()),
                Predicate::AnyOf { values, .. } => {
                    let marks = vec!["?"; values.len()].join(", ");
                    parts.push(format!("{col} IN ({marks})"));
                    params.extend(values.iter().map(to_sql));
                }
            }
        }
        Ok((format!(" WHERE {}", parts.join(" AND ")), params))
    }
}

impl TableTransaction for SqliteTransaction<'_> {
    fn column_names(&mut self) -> StorageResult<Vec<String>> {
        Ok(self.schema.field_names().map(str::to_string).collect())
    }

    fn insert_rows(&mut self, rows: &DataSet) -> StorageResult<usize> {
        let columns = rows
            .schema
            .field_names()
            .map(|c| self.field(c).map(|f| quote_ident(&f.name)))
            .collect::<StorageResult<Vec<_>>>()?;
        let marks = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({marks})",
            quote_ident(self.table),
            columns.join(", ")
        );

        let mut stmt = self.tx.prepare(&sql)?;
        for row in &rows.rows {
            stmt.execute(params_from_iter(row.iter().map(to_sql)))?;
        }
        Ok(rows.row_count())
    }

    fn max_i64(&mut self, column: &str) -> StorageResult<Option<i64>> {
        let col = quote_ident(&self.field(column)?.name);
        let sql = format!("SELECT MAX({col}) FROM {}", quote_ident(self.table));
        let max = self.tx.query_row(&sql, [], |row| match row.get_ref(0)? {
            ValueRef::Integer(i) => Ok(Some(i)),
            ValueRef::Real(f) => Ok(Some(f as i64)),
            _ => Ok(None),
        })?;
        Ok(max)
    }

    fn scan(&mut self, columns: &[&str], filter: &RowFilter) -> StorageResult<DataSet> {
        let fields = columns
            .iter()
            .map(|c| self.field(c).cloned())
            .collect::<StorageResult<Vec<_>>>()?;
        let (where_sql, params) = self.where_clause(filter)?;
        let select = fields
            .iter()
            .map(|f| quote_ident(&f.name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {select} FROM {}{where_sql}", quote_ident(self.table));

        let mut stmt = self.tx.prepare(&sql)?;
        let mut cursor = stmt.query(params_from_iter(params.iter()))?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.next()? {
            let mut out = Vec::with_capacity(fields.len());
            for (i, f) in fields.iter().enumerate() {
                out.push(from_sql(row.get_ref(i)?, &f.data_type));
            }
            rows.push(out);
        }
        Ok(DataSet::new(Schema::new(fields), rows))
    }

    fn update(&mut self, filter: &RowFilter, column: &str, value: &Value) -> StorageResult<usize> {
        let col = quote_ident(&self.field(column)?.name);
        let (where_sql, mut params) = self.where_clause(filter)?;
        params.insert(0, to_sql(value));
        let sql = format!(
            "UPDATE {} SET {col} = ?{where_sql}",
            quote_ident(self.table)
        );
        Ok(self.tx.execute(&sql, params_from_iter(params.iter()))?)
    }

    fn delete(&mut self, filter: &RowFilter) -> StorageResult<usize> {
        let (where_sql, params) = self.where_clause(filter)?;
        let sql = format!("DELETE FROM {}{where_sql}", quote_ident(self.table));
        Ok(self.tx.execute(&sql, params_from_iter(params.iter()))?)
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        let this = *self;
        this.tx.commit()?;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> StorageResult<()> {
        let this = *self;
        this.tx.rollback()?;
        Ok(())
    }
}

/// Columns of `table` with their declared types mapped onto [`DataType`].
///
/// Returns an empty schema when the table does not exist.
fn table_schema(conn: &Connection, table: &str) -> StorageResult<Schema> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let fields = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let decl: String = row.get::<_, Option<String>>(2)?.unwrap_or_default();
            Ok(Field::new(name, affinity(&decl)))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Schema::new(fields))
}

/// SQLite type affinity rules, with `BOOL*` and `BIT` split out as booleans.
fn affinity(decl: &str) -> DataType {
    let d = decl.to_ascii_uppercase();
    if d.starts_with("BOOL") || d == "BIT" {
        DataType::Bool
    } else if d.contains("INT") {
        DataType::Int64
    } else if d.contains("CHAR") || d.contains("CLOB") || d.contains("TEXT") {
        DataType::Utf8
    } else if d.contains("REAL") || d.contains("FLOA") || d.contains("DOUB") || d.contains("NUM") || d.contains("DEC") {
        DataType::Float64
    } else {
        DataType::Utf8
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Int64(i) => SqlValue::Integer(*i),
        Value::Float64(f) => SqlValue::Real(*f),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Utf8(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql(value: ValueRef<'_>, data_type: &DataType) -> Value {
    match (value, data_type) {
        (ValueRef::Null, _) => Value::Null,
        (ValueRef::Integer(i), DataType::Bool) => Value::Bool(i != 0),
        (ValueRef::Integer(i), DataType::Float64) => Value::Float64(i as f64),
        (ValueRef::Integer(i), _) => Value::Int64(i),
        (ValueRef::Real(f), DataType::Int64) if f.fract() == 0.0 => Value::Int64(f as i64),
        (ValueRef::Real(f), _) => Value::Float64(f),
        (ValueRef::Text(s), _) | (ValueRef::Blob(s), _) => {
            Value::Utf8(String::from_utf8_lossy(s).into_owned())
        }
    }
}
