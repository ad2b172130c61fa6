//! Spreadsheet reading descriptors.
//!
//! These types are plain data so they can live in a load configuration regardless of whether
//! the `excel` feature is enabled. Reading them requires the feature (see [`super::excel`]).

use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, IngestionResult};

/// How to choose sheet(s) when ingesting a workbook with a header row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcelSheetSelection {
    /// Ingest the first sheet (default).
    #[default]
    First,
    /// Ingest a single named sheet.
    Sheet(String),
    /// Ingest all sheets and concatenate rows.
    AllSheets,
    /// Ingest only the listed sheets (in order) and concatenate rows.
    Sheets(Vec<String>),
}

/// A zero-based cell position parsed from an A1-style reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    /// Zero-based row.
    pub row: u32,
    /// Zero-based column.
    pub col: u32,
}

impl CellRef {
    /// Parse an A1 reference such as `B3` or `AA10` (case-insensitive).
    pub fn parse(reference: &str) -> IngestionResult<Self> {
        let reference = reference.trim();
        let split = reference
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(reference.len());
        let (letters, digits) = reference.split_at(split);
        let col = column_index(letters)?;
        let row: u32 = digits
            .parse()
            .ok()
            .filter(|r| *r >= 1)
            .ok_or_else(|| layout_error(format!("invalid cell reference '{reference}'")))?;
        Ok(Self { row: row - 1, col })
    }
}

/// Zero-based index of a column given by letters (`A` is 0, `AA` is 26).
pub fn column_index(letters: &str) -> IngestionResult<u32> {
    let letters = letters.trim();
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(layout_error(format!("invalid column '{letters}'")));
    }
    letters
        .chars()
        .try_fold(0u32, |acc, c| {
            let digit = (c.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
            acc.checked_mul(26)?.checked_add(digit)
        })
        .map(|n| n - 1)
        .ok_or_else(|| layout_error(format!("column '{letters}' is out of range")))
}

/// One entry of a [`SheetLayout`]. Each produces one or more output columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayoutColumn {
    /// A constant. `#now` and `#today` resolve to the local clock at read time.
    Fixed { value: String },
    /// The value of one cell, repeated on every record.
    Cell { cell: String },
    /// `number` adjacent columns starting at `column`, read downward from the seek row.
    Direction { column: String, number: usize },
    /// Like [`LayoutColumn::Direction`], with empty cells filled from the value above.
    Repeat { column: String, number: usize },
}

impl LayoutColumn {
    /// Number of output columns this entry produces.
    pub fn width(&self) -> usize {
        match self {
            LayoutColumn::Fixed { .. } | LayoutColumn::Cell { .. } => 1,
            LayoutColumn::Direction { number, .. } | LayoutColumn::Repeat { number, .. } => *number,
        }
    }

    fn validate(&self) -> IngestionResult<()> {
        match self {
            LayoutColumn::Fixed { .. } => Ok(()),
            LayoutColumn::Cell { cell } => CellRef::parse(cell).map(|_| ()),
            LayoutColumn::Direction { column, number } | LayoutColumn::Repeat { column, number } => {
                if *number < 1 {
                    return Err(layout_error(format!(
                        "column '{column}' must span at least one column, got {number}"
                    )));
                }
                column_index(column).map(|_| ())
            }
        }
    }
}

const fn default_unit_row() -> usize {
    1
}

/// Fixed-position extraction from one worksheet.
///
/// Records start at `seek_start`. Their count is found by stepping down from it `unit_row`
/// rows at a time while the cell is non-empty, adding `unit_row` per step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetLayout {
    /// Sheet name; the first sheet when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// A1 reference of the first record's anchor cell.
    pub seek_start: String,
    /// Rows per record step (at least 1).
    #[serde(default = "default_unit_row")]
    pub unit_row: usize,
    /// Output columns, in order.
    pub columns: Vec<LayoutColumn>,
}

impl SheetLayout {
    /// Layout anchored at `seek_start` with `unit_row = 1` on the first sheet.
    pub fn new(seek_start: impl Into<String>) -> Self {
        Self {
            sheet: None,
            seek_start: seek_start.into(),
            unit_row: default_unit_row(),
            columns: Vec::new(),
        }
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn with_unit_row(mut self, unit_row: usize) -> Self {
        self.unit_row = unit_row;
        self
    }

    pub fn column(mut self, column: LayoutColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Total number of output columns.
    pub fn width(&self) -> usize {
        self.columns.iter().map(LayoutColumn::width).sum()
    }

    /// Check strides, spans and cell references. Returns the parsed anchor.
    pub fn validate(&self) -> IngestionResult<CellRef> {
        if self.unit_row < 1 {
            return Err(layout_error(format!(
                "unit_row must be at least 1, got {}",
                self.unit_row
            )));
        }
        for c in &self.columns {
            c.validate()?;
        }
        CellRef::parse(&self.seek_start)
    }
}

/// Resolve the reserved tokens of a [`LayoutColumn::Fixed`] value.
pub fn resolve_fixed(value: &str) -> String {
    match value {
        "#now" => chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        "#today" => chrono::Local::now().format("%Y-%m-%d").to_string(),
        other => other.to_string(),
    }
}

fn layout_error(message: String) -> IngestionError {
    IngestionError::Layout { message }
}
