use thiserror::Error;

use crate::load::LoadStage;
use crate::types::DataType;

/// Convenience result type for row-source ingestion.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Convenience result type for target-table operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Convenience result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Error type returned by row sources.
///
/// This is a single error enum shared across CSV and (optional) Excel sources.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "excel")]
    /// Excel ingestion error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// CSV ingestion error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The input does not conform to the provided schema (missing required fields/columns, etc.).
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A value could not be parsed into the required [`crate::types::DataType`].
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },

    /// The source produced no rows.
    #[error("source produced an empty batch")]
    EmptyBatch,

    /// A row does not have one value per schema field.
    #[error("row {row} has {found} values, expected {expected}")]
    NotRectangular {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// A spreadsheet layout is malformed (bad cell reference, zero stride, ...).
    #[error("invalid sheet layout: {message}")]
    Layout { message: String },
}

/// Error type returned by [`crate::table::TargetTable`] backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[cfg(feature = "sqlite")]
    /// SQLite backend error (feature-gated behind `sqlite`).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The target table does not exist.
    #[error("table '{table}' does not exist")]
    UnknownTable { table: String },

    /// A column referenced by an insert, filter or update does not exist on the table.
    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    /// A value does not fit the column type.
    #[error("column '{column}' expects {expected:?}, got {found}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        found: String,
    },

    /// A table constraint rejected the write.
    #[error("constraint violation: {message}")]
    Constraint { message: String },
}

/// Error type returned by [`crate::load::Loader`].
#[derive(Debug, Error)]
pub enum LoadError {
    /// The policy or batch is inconsistent with itself or with the table. Nothing was written.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The row source failed or produced an unusable batch. The table was not touched.
    #[error("source error: {0}")]
    Source(#[from] IngestionError),

    /// A row failed to insert. The whole load was rolled back.
    #[error("insertion failed: {source}")]
    Insertion {
        #[source]
        source: StorageError,
    },

    /// Superseded rows could not be retired. The whole load, inserted rows included, was
    /// rolled back.
    #[error("retirement failed: {source}")]
    Retirement {
        #[source]
        source: StorageError,
    },

    /// Any other storage failure, tagged with the stage it happened in.
    #[error("storage error during {stage}: {source}")]
    Storage {
        stage: LoadStage,
        #[source]
        source: StorageError,
    },
}

impl LoadError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        LoadError::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn storage(stage: LoadStage, source: StorageError) -> Self {
        LoadError::Storage { stage, source }
    }
}

/// Convenience result type for load configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Error type returned by [`crate::config::LoadConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON for a [`crate::config::LoadConfig`].
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration parsed but is inconsistent.
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}
