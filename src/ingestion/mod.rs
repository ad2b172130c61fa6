//! Row sources: where a load's batch comes from.
//!
//! Every source implements [`RowSource`] and produces one in-memory
//! [`crate::types::DataSet`] typed by a user-provided [`crate::types::Schema`]:
//!
//! - [`crate::types::DataSet`] itself (an in-memory batch)
//! - [`CsvSource`]: a CSV file, columns by header name or by position
//! - `ExcelSource` (feature `excel`): a workbook, by header row or by [`SheetLayout`]
//! - [`FileSource`]: picks one of the above from the file extension
//!
//! Across formats, empty cells map to [`crate::types::Value::Null`].

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod sheet;
pub mod source;

pub use self::csv::{ingest_csv_from_path, ingest_csv_from_reader, CsvOptions, CsvSource};
#[cfg(feature = "excel")]
pub use excel::{extract_layout, ingest_excel_layout, ingest_excel_selection, ExcelReadMode, ExcelSource};
pub use sheet::{CellRef, ExcelSheetSelection, LayoutColumn, SheetLayout};
pub use source::{validate_batch, FileSource, RowSource, SourceFormat};
