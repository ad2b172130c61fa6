//! `rust-table-loader` loads tabular batches into an existing table, optionally superseding
//! the prior rows that share business-key values with the new batch.
//!
//! A load runs in one transaction of the target table:
//!
//! 1. the batch is pulled from a [`ingestion::RowSource`] (CSV, Excel, or an in-memory
//!    [`types::DataSet`]) and validated
//! 2. with an [`load::OverwritePolicy`], every row is stamped with a fresh surrogate identifier
//!    and an active flag
//! 3. the rows are inserted
//! 4. live prior rows whose key values occur in the batch are found and retired, either by
//!    flipping the flag (soft) or by deleting them (hard)
//!
//! Any failure rolls the whole load back.
//!
//! ## Quick example
//!
//! ```rust
//! use rust_table_loader::load::{Loader, OverwritePolicy};
//! use rust_table_loader::table::MemoryTable;
//! use rust_table_loader::types::{DataSet, DataType, Field, Schema, Value};
//!
//! # fn main() -> Result<(), rust_table_loader::LoadError> {
//! let table = MemoryTable::new(
//!     "prices",
//!     Schema::new(vec![
//!         Field::new("record_id", DataType::Int64),
//!         Field::new("is_deleted", DataType::Int64),
//!         Field::new("fcode", DataType::Utf8),
//!         Field::new("fprice", DataType::Float64),
//!     ]),
//! );
//! let batch_schema = Schema::new(vec![
//!     Field::new("fcode", DataType::Utf8),
//!     Field::new("fprice", DataType::Float64),
//! ]);
//!
//! let policy = OverwritePolicy::soft(["fcode"]);
//! let mut loader = Loader::new(table);
//! loader.load(
//!     DataSet::new(batch_schema.clone(), vec![vec![Value::from("A"), Value::Float64(1.0)]]),
//!     Some(&policy),
//! )?;
//! let report = loader.load(
//!     DataSet::new(batch_schema, vec![vec![Value::from("A"), Value::Float64(1.5)]]),
//!     Some(&policy),
//! )?;
//! assert_eq!(report.superseded, vec![0]);
//! assert_eq!(report.retired, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`load`]: identity assignment, overwrite resolution, retirement and the [`load::Loader`]
//! - [`table`]: the target-table abstraction and its memory / SQLite backends
//! - [`ingestion`]: row sources
//! - [`config`]: JSON load templates
//! - [`types`]: schema + in-memory dataset types
//! - [`error`]: error types
//!
//! ## Features
//!
//! - `sqlite` (default): [`table::SqliteTable`] via `rusqlite`
//! - `excel`: workbook row sources via `calamine`

pub mod config;
pub mod error;
pub mod ingestion;
pub mod load;
pub mod table;
pub mod types;

pub use error::{
    ConfigError, ConfigResult, IngestionError, IngestionResult, LoadError, LoadResult, StorageError,
    StorageResult,
};
pub use load::{LoadReport, Loader, OverwritePolicy, RetirementMode};
