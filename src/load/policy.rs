//! Overwrite policy: which prior rows a new batch supersedes and how they are retired.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, LoadResult};
use crate::types::{Schema, Value};

/// Default name of the surrogate identifier column.
pub const DEFAULT_ID_COLUMN: &str = "record_id";
/// Default name of the retirement-flag column.
pub const DEFAULT_FLAG_COLUMN: &str = "is_deleted";

/// Flag value of a live row.
pub const FLAG_ACTIVE: i64 = 0;
/// Flag value of a soft-retired row.
pub const FLAG_RETIRED: i64 = 1;

/// How superseded rows are retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetirementMode {
    /// Flip the retirement flag; the row stays queryable.
    #[serde(alias = "logical")]
    Soft,
    /// Delete the row.
    #[serde(alias = "physical")]
    Hard,
}

impl fmt::Display for RetirementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetirementMode::Soft => f.write_str("soft"),
            RetirementMode::Hard => f.write_str("hard"),
        }
    }
}

impl FromStr for RetirementMode {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "soft" | "logical" => Ok(Self::Soft),
            "hard" | "physical" => Ok(Self::Hard),
            other => Err(LoadError::configuration(format!(
                "unknown retirement mode '{other}' (expected soft/hard)"
            ))),
        }
    }
}

/// How a prior row is matched against the batch's key columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMatching {
    /// Each key column is matched independently against the set of values that column takes
    /// anywhere in the batch, and the results are AND-ed. Key values from different batch rows
    /// can therefore combine: a batch holding `(1, "A")` and `(2, "B")` also supersedes a prior
    /// `(1, "B")`.
    #[default]
    PerColumn,
    /// A prior row matches only if its full key tuple equals the key tuple of some batch row.
    Composite,
}

/// Rules for superseding prior rows that share key values with a new batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverwritePolicy {
    /// Soft (flag) or hard (delete) retirement.
    pub mode: RetirementMode,
    /// Business key columns. Must be non-empty and present in both batch and table.
    pub keys: Vec<String>,
    /// Surrogate identifier column, assigned by the loader.
    #[serde(default = "default_id_col")]
    pub id_col: String,
    /// Retirement-flag column, `0` for live rows.
    #[serde(default = "default_flag_col", alias = "delete_flag_col")]
    pub flag_col: String,
    /// Key matching semantics.
    #[serde(default)]
    pub matching: KeyMatching,
}

fn default_id_col() -> String {
    DEFAULT_ID_COLUMN.to_string()
}

fn default_flag_col() -> String {
    DEFAULT_FLAG_COLUMN.to_string()
}

impl OverwritePolicy {
    /// Create a policy with the default identifier/flag column names.
    pub fn new<I, S>(mode: RetirementMode, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode,
            keys: keys.into_iter().map(Into::into).collect(),
            id_col: default_id_col(),
            flag_col: default_flag_col(),
            matching: KeyMatching::default(),
        }
    }

    /// Soft-retirement policy over `keys`.
    pub fn soft<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(RetirementMode::Soft, keys)
    }

    /// Hard-retirement policy over `keys`.
    pub fn hard<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(RetirementMode::Hard, keys)
    }

    /// Override the identifier column name.
    pub fn with_id_col(mut self, id_col: impl Into<String>) -> Self {
        self.id_col = id_col.into();
        self
    }

    /// Override the retirement-flag column name.
    pub fn with_flag_col(mut self, flag_col: impl Into<String>) -> Self {
        self.flag_col = flag_col.into();
        self
    }

    /// Override the key matching semantics.
    pub fn with_matching(mut self, matching: KeyMatching) -> Self {
        self.matching = matching;
        self
    }

    /// Flag value stamped onto new rows.
    pub fn active_flag(&self) -> Value {
        Value::Int64(FLAG_ACTIVE)
    }

    /// Flag value written by soft retirement.
    pub fn retired_flag(&self) -> Value {
        Value::Int64(FLAG_RETIRED)
    }

    /// Check the policy against itself and against the incoming batch.
    ///
    /// The batch must carry every key column and must not carry the reserved columns.
    pub fn validate_for_batch(&self, batch: &Schema) -> LoadResult<()> {
        if self.keys.is_empty() {
            return Err(LoadError::configuration("overwrite policy has no key columns"));
        }
        if self.id_col == self.flag_col {
            return Err(LoadError::configuration(format!(
                "identifier and flag column are both named '{}'",
                self.id_col
            )));
        }
        for reserved in [&self.id_col, &self.flag_col] {
            if batch.contains(reserved) {
                return Err(LoadError::configuration(format!(
                    "column name '{reserved}' already exists in the batch"
                )));
            }
            if self.keys.iter().any(|k| k == reserved) {
                return Err(LoadError::configuration(format!(
                    "reserved column '{reserved}' cannot be a key column"
                )));
            }
        }
        for key in &self.keys {
            if !batch.contains(key) {
                return Err(LoadError::configuration(format!(
                    "key column '{key}' is missing from the batch"
                )));
            }
        }
        Ok(())
    }

    /// Check that the table carries the identifier, flag and key columns.
    pub fn validate_for_table(&self, table: &str, columns: &[String]) -> LoadResult<()> {
        let required = [&self.id_col, &self.flag_col].into_iter().chain(self.keys.iter());
        for column in required {
            if !columns.iter().any(|c| c == column) {
                return Err(LoadError::configuration(format!(
                    "table '{table}' has no column '{column}'"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{KeyMatching, OverwritePolicy, RetirementMode};
    use crate::error::LoadError;
    use crate::types::{DataType, Field, Schema};

    fn batch_schema(names: &[&str]) -> Schema {
        Schema::new(names.iter().map(|n| Field::new(*n, DataType::Utf8)).collect())
    }

    #[test]
    fn deserializes_with_defaults_and_aliases() {
        let p: OverwritePolicy =
            serde_json::from_str(r#"{"mode":"physical","keys":["fid","fcode"]}"#).unwrap();
        assert_eq!(p.mode, RetirementMode::Hard);
        assert_eq!(p.id_col, "record_id");
        assert_eq!(p.flag_col, "is_deleted");
        assert_eq!(p.matching, KeyMatching::PerColumn);

        let p: OverwritePolicy = serde_json::from_str(
            r#"{"mode":"soft","keys":["k"],"delete_flag_col":"gone","matching":"composite"}"#,
        )
        .unwrap();
        assert_eq!(p.flag_col, "gone");
        assert_eq!(p.matching, KeyMatching::Composite);
    }

    #[test]
    fn mode_parses_from_str() {
        assert_eq!("Logical".parse::<RetirementMode>().unwrap(), RetirementMode::Soft);
        assert_eq!("hard".parse::<RetirementMode>().unwrap(), RetirementMode::Hard);
        assert!("archive".parse::<RetirementMode>().is_err());
    }

    #[test]
    fn batch_validation_rejects_reserved_and_missing_columns() {
        let p = OverwritePolicy::soft(["fid"]);
        assert!(p.validate_for_batch(&batch_schema(&["fid", "fcode"])).is_ok());

        let err = p
            .validate_for_batch(&batch_schema(&["fid", "record_id"]))
            .unwrap_err();
        assert!(matches!(err, LoadError::Configuration { .. }));
        assert!(err.to_string().contains("'record_id' already exists"));

        assert!(p.validate_for_batch(&batch_schema(&["fcode"])).is_err());
        assert!(
            OverwritePolicy::soft(Vec::<String>::new())
                .validate_for_batch(&batch_schema(&["fid"]))
                .is_err()
        );
        assert!(
            OverwritePolicy::soft(["fid"])
                .with_flag_col("record_id")
                .validate_for_batch(&batch_schema(&["fid"]))
                .is_err()
        );
    }

    #[test]
    fn table_validation_requires_all_policy_columns() {
        let p = OverwritePolicy::hard(["fid"]);
        let cols = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(p
            .validate_for_table("t", &cols(&["record_id", "is_deleted", "fid"]))
            .is_ok());
        let err = p
            .validate_for_table("t", &cols(&["is_deleted", "fid"]))
            .unwrap_err();
        assert!(err.to_string().contains("has no column 'record_id'"));
    }
}
