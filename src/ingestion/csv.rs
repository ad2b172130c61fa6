//! CSV row source.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataSet, DataType, Schema, Value};

use super::source::RowSource;

/// Reader options for CSV input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    /// Field delimiter byte (default `,`).
    #[serde(with = "ascii_char")]
    pub delimiter: u8,
    /// Quote byte (default `"`).
    #[serde(with = "ascii_char")]
    pub quote: u8,
    /// Whether the first record is a header row (default `true`).
    pub has_headers: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            has_headers: true,
        }
    }
}

impl CsvOptions {
    fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut b = csv::ReaderBuilder::new();
        b.delimiter(self.delimiter)
            .quote(self.quote)
            .has_headers(self.has_headers);
        b
    }
}

// Single-byte options are written as one-character strings in configuration files.
mod ascii_char {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(b: &u8, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_char(char::from(*b))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
        let c = char::deserialize(d)?;
        u8::try_from(c)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| D::Error::custom(format!("expected a single ASCII character, got '{c}'")))
    }
}

/// Ingest a CSV file into an in-memory [`DataSet`].
///
/// Rules:
///
/// - With headers, the headers must contain all schema fields (order can differ).
/// - Without headers, record columns map onto schema fields by position.
/// - Each value is parsed according to the schema field type; empty cells are `Null`.
pub fn ingest_csv_from_path(
    path: impl AsRef<Path>,
    schema: &Schema,
    options: &CsvOptions,
) -> IngestionResult<DataSet> {
    let mut rdr = options.reader_builder().from_path(path)?;
    ingest_csv_from_reader(&mut rdr, schema, options.has_headers)
}

/// Ingest CSV data from an existing CSV reader.
///
/// `has_headers` must match how the reader was built.
pub fn ingest_csv_from_reader<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
    schema: &Schema,
    has_headers: bool,
) -> IngestionResult<DataSet> {
    let col_idxs = if has_headers {
        header_projection(&rdr.headers()?.clone(), schema)?
    } else {
        (0..schema.len()).collect()
    };
    // 1-based row number of the first data record.
    let first_row = if has_headers { 2 } else { 1 };

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (row_idx0, result) in rdr.records().enumerate() {
        let user_row = row_idx0 + first_row;
        let record = result?;
        if !has_headers && record.len() < schema.len() {
            return Err(IngestionError::SchemaMismatch {
                message: format!(
                    "row {user_row} has {} columns, schema has {} fields",
                    record.len(),
                    schema.len()
                ),
            });
        }

        let mut row: Vec<Value> = Vec::with_capacity(schema.len());
        for (field, &csv_idx) in schema.fields.iter().zip(col_idxs.iter()) {
            let raw = record.get(csv_idx).unwrap_or("");
            row.push(parse_typed_value(user_row, &field.name, &field.data_type, raw)?);
        }
        rows.push(row);
    }

    Ok(DataSet::new(schema.clone(), rows))
}

// Map schema fields -> CSV column indexes (allows re-ordered CSV columns).
fn header_projection(headers: &csv::StringRecord, schema: &Schema) -> IngestionResult<Vec<usize>> {
    schema
        .fields
        .iter()
        .map(|field| {
            headers
                .iter()
                .position(|h| h.trim() == field.name)
                .ok_or_else(|| IngestionError::SchemaMismatch {
                    message: format!(
                        "missing required column '{field}'. headers={:?}",
                        headers.iter().collect::<Vec<_>>(),
                        field = field.name
                    ),
                })
        })
        .collect()
}

pub(crate) fn parse_typed_value(
    row: usize,
    column: &str,
    data_type: &DataType,
    raw: &str,
) -> IngestionResult<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    let parse_error = |message: String| IngestionError::ParseError {
        row,
        column: column.to_owned(),
        raw: raw.to_owned(),
        message,
    };
    match data_type {
        DataType::Utf8 => Ok(Value::Utf8(trimmed.to_owned())),
        DataType::Int64 => trimmed
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Float64 => trimmed
            .parse::<f64>()
            .map(Value::Float64)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Bool => parse_bool(trimmed).map(Value::Bool).map_err(parse_error),
    }
}

pub(crate) fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err("expected bool (true/false/1/0/yes/no)".to_string()),
    }
}

/// A CSV file read with a fixed schema.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    schema: Schema,
    options: CsvOptions,
}

impl CsvSource {
    /// Source over `path` with default [`CsvOptions`].
    pub fn new(path: impl AsRef<Path>, schema: Schema) -> Self {
        Self::with_options(path, schema, CsvOptions::default())
    }

    /// Source over `path` with explicit reader options.
    pub fn with_options(path: impl AsRef<Path>, schema: Schema, options: CsvOptions) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            schema,
            options,
        }
    }

    /// Path the source reads.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RowSource for CsvSource {
    fn produce(&self) -> IngestionResult<DataSet> {
        ingest_csv_from_path(&self.path, &self.schema, &self.options)
    }
}
