//! The row-source seam between ingestion and loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataSet, Schema};

use super::csv::{ingest_csv_from_path, CsvOptions};
#[cfg(feature = "excel")]
use super::excel::ingest_excel_selection;
use super::sheet::ExcelSheetSelection;

/// Anything that can produce one batch of rows for a load.
pub trait RowSource {
    /// Produce the batch. Called once per load.
    fn produce(&self) -> IngestionResult<DataSet>;
}

impl RowSource for DataSet {
    fn produce(&self) -> IngestionResult<DataSet> {
        Ok(self.clone())
    }
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn produce(&self) -> IngestionResult<DataSet> {
        (**self).produce()
    }
}

/// Check that a batch is loadable: at least one row, one value per schema field in every row.
pub fn validate_batch(batch: &DataSet) -> IngestionResult<()> {
    if batch.is_empty() {
        return Err(IngestionError::EmptyBatch);
    }
    let expected = batch.schema.len();
    match batch.rows.iter().position(|r| r.len() != expected) {
        Some(row) => Err(IngestionError::NotRectangular {
            row,
            expected,
            found: batch.rows[row].len(),
        }),
        None => Ok(()),
    }
}

/// File formats a [`FileSource`] can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Comma-separated values.
    Csv,
    /// Spreadsheet/workbook formats (feature-gated behind `excel`).
    Excel,
}

impl SourceFormat {
    /// Parse a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(Self::Excel),
            _ => None,
        }
    }

    /// Infer the format of `path` from its extension.
    pub fn infer(path: &Path) -> IngestionResult<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| IngestionError::SchemaMismatch {
                message: format!(
                    "cannot infer source format from path '{}'; set the format explicitly",
                    path.display()
                ),
            })
    }
}

/// A file read with a fixed schema, format inferred from the extension unless forced.
///
/// CSV files use default [`CsvOptions`]; Excel files read the first sheet with a header row.
/// Use [`super::CsvSource`] or [`super::ExcelSource`] for finer control.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    schema: Schema,
    format: Option<SourceFormat>,
}

impl FileSource {
    /// Source over `path`, format inferred at read time.
    pub fn new(path: impl AsRef<Path>, schema: Schema) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            schema,
            format: None,
        }
    }

    /// Force a format regardless of the extension.
    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// The format that will be used.
    pub fn format(&self) -> IngestionResult<SourceFormat> {
        match self.format {
            Some(f) => Ok(f),
            None => SourceFormat::infer(&self.path),
        }
    }
}

impl RowSource for FileSource {
    fn produce(&self) -> IngestionResult<DataSet> {
        match self.format()? {
            SourceFormat::Csv => ingest_csv_from_path(&self.path, &self.schema, &CsvOptions::default()),
            SourceFormat::Excel => {
                #[cfg(feature = "excel")]
                {
                    ingest_excel_selection(&self.path, &ExcelSheetSelection::First, &self.schema)
                }
                #[cfg(not(feature = "excel"))]
                {
                    Err(IngestionError::SchemaMismatch {
                        message: "excel ingestion requires enabling the 'excel' Cargo feature".to_string(),
                    })
                }
            }
        }
    }
}
