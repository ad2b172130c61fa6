//! JSON load templates.
//!
//! A [`LoadConfig`] names the target table, the row source, the batch schema and an optional
//! overwrite policy, so a recurring load can be described once and replayed:
//!
//! ```
//! use rust_table_loader::config::LoadConfig;
//!
//! # fn main() -> Result<(), rust_table_loader::ConfigError> {
//! let cfg = LoadConfig::from_json_str(r#"{
//!     "table": "prices",
//!     "source": {"reader_type": "csv", "path": "prices.csv", "options": {"delimiter": ";"}},
//!     "schema": [
//!         {"name": "fid", "data_type": "int64"},
//!         {"name": "fprice", "data_type": "float64"}
//!     ],
//!     "overwrite": {"mode": "logical", "keys": ["fid"]}
//! }"#)?;
//! assert_eq!(cfg.table, "prices");
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::ingestion::{CsvOptions, CsvSource, ExcelSheetSelection, RowSource, SheetLayout, SourceFormat};
use crate::load::{OverwritePolicy, RetirementMode};
use crate::types::{DataType, Field, Schema};

/// Where a load's rows come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reader_type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// A CSV file.
    Csv {
        path: PathBuf,
        #[serde(default)]
        options: CsvOptions,
    },
    /// A workbook. `layout` takes precedence over `sheets` when set.
    Excel {
        path: PathBuf,
        #[serde(default)]
        sheets: ExcelSheetSelection,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        layout: Option<SheetLayout>,
    },
}

impl SourceConfig {
    /// Path of the file the source reads.
    pub fn path(&self) -> &Path {
        match self {
            SourceConfig::Csv { path, .. } | SourceConfig::Excel { path, .. } => path,
        }
    }

    /// Format of the source.
    pub fn format(&self) -> SourceFormat {
        match self {
            SourceConfig::Csv { .. } => SourceFormat::Csv,
            SourceConfig::Excel { .. } => SourceFormat::Excel,
        }
    }
}

/// A replayable description of one recurring load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Name of the tool that wrote the file.
    #[serde(default)]
    pub app: String,
    /// Version of the tool that wrote the file.
    #[serde(default)]
    pub version: String,
    /// Target table name.
    pub table: String,
    /// Row source.
    pub source: SourceConfig,
    /// Batch schema.
    pub schema: Schema,
    /// Overwrite policy; plain append when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<OverwritePolicy>,
}

impl LoadConfig {
    /// A starter template for a source of the given format, meant to be edited and saved.
    pub fn template(format: SourceFormat) -> Self {
        let source = match format {
            SourceFormat::Csv => SourceConfig::Csv {
                path: PathBuf::from("input.csv"),
                options: CsvOptions::default(),
            },
            SourceFormat::Excel => SourceConfig::Excel {
                path: PathBuf::from("input.xlsx"),
                sheets: ExcelSheetSelection::First,
                layout: None,
            },
        };
        Self {
            app: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            table: "target_table".to_string(),
            source,
            schema: Schema::new(vec![
                Field::new("key", DataType::Utf8),
                Field::new("value", DataType::Float64),
            ]),
            overwrite: Some(OverwritePolicy::new(RetirementMode::Soft, ["key"])),
        }
    }

    /// Parse and validate a configuration.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Pretty JSON, stamped with this crate's name and version.
    pub fn to_json_pretty(&self) -> ConfigResult<String> {
        let mut stamped = self.clone();
        stamped.app = env!("CARGO_PKG_NAME").to_string();
        stamped.version = env!("CARGO_PKG_VERSION").to_string();
        Ok(serde_json::to_string_pretty(&stamped)?)
    }

    /// Write [`Self::to_json_pretty`] to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    /// Check the parts of the configuration that do not need the table.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.table.trim().is_empty() {
            return Err(invalid("table name is empty".to_string()));
        }
        if self.schema.is_empty() {
            return Err(invalid("schema has no fields".to_string()));
        }
        if let SourceConfig::Excel { layout: Some(layout), .. } = &self.source {
            layout.validate().map_err(|e| invalid(e.to_string()))?;
            if layout.width() != self.schema.len() {
                return Err(invalid(format!(
                    "layout produces {} columns but the schema has {} fields",
                    layout.width(),
                    self.schema.len()
                )));
            }
        }
        if let Some(policy) = &self.overwrite {
            policy
                .validate_for_batch(&self.schema)
                .map_err(|e| invalid(e.to_string()))?;
        }
        Ok(())
    }

    /// Construct the configured row source.
    pub fn build_source(&self) -> ConfigResult<Box<dyn RowSource>> {
        match &self.source {
            SourceConfig::Csv { path, options } => Ok(Box::new(CsvSource::with_options(
                path,
                self.schema.clone(),
                options.clone(),
            ))),
            #[cfg(feature = "excel")]
            SourceConfig::Excel { path, sheets, layout } => {
                use crate::ingestion::{ExcelReadMode, ExcelSource};

                let mode = match layout {
                    Some(layout) => ExcelReadMode::Layout(layout.clone()),
                    None => ExcelReadMode::Headers(sheets.clone()),
                };
                Ok(Box::new(ExcelSource::with_mode(path, self.schema.clone(), mode)))
            }
            #[cfg(not(feature = "excel"))]
            SourceConfig::Excel { .. } => Err(invalid(
                "excel sources require enabling the 'excel' Cargo feature".to_string(),
            )),
        }
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid { message }
}

#[cfg(test)]
mod tests {
    use super::{LoadConfig, SourceConfig};
    use crate::error::ConfigError;
    use crate::ingestion::SourceFormat;
    use crate::load::{KeyMatching, RetirementMode};

    #[test]
    fn template_round_trips() {
        let cfg = LoadConfig::template(SourceFormat::Csv);
        let json = cfg.to_json_pretty().unwrap();
        assert!(json.contains("\"reader_type\": \"csv\""));
        assert!(json.contains("\"delimiter\": \",\""));
        assert_eq!(LoadConfig::from_json_str(&json).unwrap(), cfg);
    }

    #[test]
    fn policy_defaults_and_aliases() {
        let cfg = LoadConfig::from_json_str(
            r#"{
                "table": "prices",
                "source": {"reader_type": "csv", "path": "p.csv"},
                "schema": [{"name": "fid", "data_type": "int64"}],
                "overwrite": {"mode": "physical", "keys": ["fid"], "delete_flag_col": "gone"}
            }"#,
        )
        .unwrap();
        let policy = cfg.overwrite.unwrap();
        assert_eq!(policy.mode, RetirementMode::Hard);
        assert_eq!(policy.id_col, "record_id");
        assert_eq!(policy.flag_col, "gone");
        assert_eq!(policy.matching, KeyMatching::PerColumn);
        assert!(matches!(cfg.source, SourceConfig::Csv { .. }));
        assert_eq!(cfg.app, "");
    }

    #[test]
    fn reserved_column_in_schema_is_invalid() {
        let err = LoadConfig::from_json_str(
            r#"{
                "table": "prices",
                "source": {"reader_type": "csv", "path": "p.csv"},
                "schema": [
                    {"name": "fid", "data_type": "int64"},
                    {"name": "record_id", "data_type": "int64"}
                ],
                "overwrite": {"mode": "soft", "keys": ["fid"]}
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        let err = LoadConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn excel_layout_width_is_checked() {
        let err = LoadConfig::from_json_str(
            r#"{
                "table": "t",
                "source": {
                    "reader_type": "excel",
                    "path": "b.xlsx",
                    "layout": {"seek_start": "A2", "columns": [{"type": "direction", "column": "A", "number": 2}]}
                },
                "schema": [{"name": "a", "data_type": "utf8"}]
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
