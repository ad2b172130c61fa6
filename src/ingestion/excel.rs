#![cfg(feature = "excel")]

use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader};

use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataSet, DataType, Schema, Value};

use super::csv::{parse_bool, parse_typed_value};
use super::sheet::{column_index, resolve_fixed, CellRef, ExcelSheetSelection, LayoutColumn, SheetLayout};
use super::source::RowSource;

/// How an [`ExcelSource`] reads its workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExcelReadMode {
    /// The first non-empty row of each selected sheet is a header row.
    Headers(ExcelSheetSelection),
    /// Fixed-position extraction from one sheet.
    Layout(SheetLayout),
}

/// A workbook (`.xlsx`, `.xls`, `.ods`, ...) read with a fixed schema.
#[derive(Debug, Clone)]
pub struct ExcelSource {
    path: PathBuf,
    schema: Schema,
    mode: ExcelReadMode,
}

impl ExcelSource {
    /// Read the first sheet using its header row.
    pub fn new(path: impl AsRef<Path>, schema: Schema) -> Self {
        Self::with_mode(path, schema, ExcelReadMode::Headers(ExcelSheetSelection::First))
    }

    /// Read with an explicit mode.
    pub fn with_mode(path: impl AsRef<Path>, schema: Schema, mode: ExcelReadMode) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            schema,
            mode,
        }
    }
}

impl RowSource for ExcelSource {
    fn produce(&self) -> IngestionResult<DataSet> {
        match &self.mode {
            ExcelReadMode::Headers(selection) => ingest_excel_selection(&self.path, selection, &self.schema),
            ExcelReadMode::Layout(layout) => ingest_excel_layout(&self.path, layout, &self.schema),
        }
    }
}

/// Ingest the selected sheets of a workbook and concatenate their rows.
///
/// - Detects the first non-empty row of each sheet as its header row
/// - Validates that all schema fields exist as headers
/// - Reads remaining rows and converts cells into typed `Value`s
///
/// All selected sheets must share the header schema.
pub fn ingest_excel_selection(
    path: impl AsRef<Path>,
    selection: &ExcelSheetSelection,
    schema: &Schema,
) -> IngestionResult<DataSet> {
    let mut workbook = open_workbook_auto(path)?;

    let names = workbook.sheet_names();
    let sheets: Vec<String> = match selection {
        ExcelSheetSelection::First => names.into_iter().take(1).collect(),
        ExcelSheetSelection::Sheet(name) => vec![name.clone()],
        ExcelSheetSelection::AllSheets => names,
        ExcelSheetSelection::Sheets(list) => list.clone(),
    };
    if sheets.is_empty() {
        return Err(IngestionError::SchemaMismatch {
            message: "workbook has no sheets".to_string(),
        });
    }

    let mut all_rows: Vec<Vec<Value>> = Vec::new();
    for sheet in sheets {
        let range = workbook.worksheet_range(&sheet)?;
        let mut sheet_rows = ingest_sheet_range(&sheet, &range, schema)?;
        all_rows.append(&mut sheet_rows);
    }

    Ok(DataSet::new(schema.clone(), all_rows))
}

/// Ingest one sheet of a workbook through a [`SheetLayout`].
pub fn ingest_excel_layout(
    path: impl AsRef<Path>,
    layout: &SheetLayout,
    schema: &Schema,
) -> IngestionResult<DataSet> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet = match &layout.sheet {
        Some(name) => name.clone(),
        None => workbook
            .sheet_names()
            .into_iter()
            .next()
            .ok_or_else(|| IngestionError::SchemaMismatch {
                message: "workbook has no sheets".to_string(),
            })?,
    };
    let range = workbook.worksheet_range(&sheet)?;
    extract_layout(&sheet, &range, layout, schema)
}

/// Apply a [`SheetLayout`] to an already-loaded sheet range.
///
/// Cell positions are absolute (as in the workbook), not relative to the range start.
pub fn extract_layout(
    sheet: &str,
    range: &Range<Data>,
    layout: &SheetLayout,
    schema: &Schema,
) -> IngestionResult<DataSet> {
    let anchor = layout.validate()?;
    if layout.width() != schema.len() {
        return Err(IngestionError::Layout {
            message: format!(
                "layout produces {} columns but the schema has {} fields",
                layout.width(),
                schema.len()
            ),
        });
    }

    let count = record_count(range, anchor, layout.unit_row);

    let mut columns: Vec<Vec<Data>> = Vec::with_capacity(schema.len());
    for entry in &layout.columns {
        match entry {
            LayoutColumn::Fixed { value } => {
                columns.push(vec![Data::String(resolve_fixed(value)); count]);
            }
            LayoutColumn::Cell { cell } => {
                let at = CellRef::parse(cell)?;
                columns.push(vec![cell_at(range, at.row, at.col).clone(); count]);
            }
            LayoutColumn::Direction { column, number } | LayoutColumn::Repeat { column, number } => {
                let first_col = column_index(column)?;
                let fill = matches!(entry, LayoutColumn::Repeat { .. });
                for j in 0..*number as u32 {
                    let mut values: Vec<Data> = (0..count as u32)
                        .map(|i| cell_at(range, anchor.row + i, first_col + j).clone())
                        .collect();
                    if fill {
                        forward_fill(&mut values);
                    }
                    columns.push(values);
                }
            }
        }
    }

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(count);
    for i in 0..count {
        let user_row = anchor.row as usize + i + 1;
        let mut row = Vec::with_capacity(schema.len());
        for (field, column) in schema.fields.iter().zip(&columns) {
            let col_label = format!("{sheet}:{name}", name = field.name);
            row.push(convert_cell(user_row, &col_label, &field.data_type, &column[i])?);
        }
        rows.push(row);
    }
    Ok(DataSet::new(schema.clone(), rows))
}

fn record_count(range: &Range<Data>, anchor: CellRef, unit_row: usize) -> usize {
    let mut count = 0usize;
    while !is_blank(cell_at(range, anchor.row + count as u32, anchor.col)) {
        count += unit_row;
    }
    count
}

fn cell_at(range: &Range<Data>, row: u32, col: u32) -> &Data {
    range.get_value((row, col)).unwrap_or(&Data::Empty)
}

fn is_blank(c: &Data) -> bool {
    match c {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn forward_fill(values: &mut [Data]) {
    let mut last: Option<Data> = None;
    for v in values.iter_mut() {
        if is_blank(v) {
            if let Some(prev) = &last {
                *v = prev.clone();
            }
        } else {
            last = Some(v.clone());
        }
    }
}

fn ingest_sheet_range(
    sheet: &str,
    range: &Range<Data>,
    schema: &Schema,
) -> IngestionResult<Vec<Vec<Value>>> {
    let (header_row_idx, col_idxs) =
        build_header_projection(range, schema).map_err(|e| wrap_schema_err_with_sheet(sheet, e))?;

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (idx0, row) in range.rows().enumerate().skip(header_row_idx + 1) {
        // Report 1-based row number (Excel-like).
        let user_row = idx0 + 1;

        let mut out_row: Vec<Value> = Vec::with_capacity(schema.len());
        for (field, &col_idx) in schema.fields.iter().zip(col_idxs.iter()) {
            let cell = row.get(col_idx).unwrap_or(&Data::Empty);
            let col_label = format!("{sheet}:{name}", name = field.name);
            out_row.push(convert_cell(user_row, &col_label, &field.data_type, cell)?);
        }
        rows.push(out_row);
    }
    Ok(rows)
}

fn wrap_schema_err_with_sheet(sheet: &str, err: IngestionError) -> IngestionError {
    match err {
        IngestionError::SchemaMismatch { message } => IngestionError::SchemaMismatch {
            message: format!("sheet '{sheet}': {message}"),
        },
        other => other,
    }
}

fn build_header_projection(range: &Range<Data>, schema: &Schema) -> IngestionResult<(usize, Vec<usize>)> {
    let (header_row_idx, header_cells) = range
        .rows()
        .enumerate()
        .find(|(_, row)| row.iter().any(|c| !matches!(c, Data::Empty)))
        .map(|(idx0, row)| (idx0, row.iter().map(cell_to_header_string).collect::<Vec<_>>()))
        .ok_or_else(|| IngestionError::SchemaMismatch {
            message: "sheet has no non-empty rows (no header row found)".to_string(),
        })?;

    let col_idxs = schema
        .fields
        .iter()
        .map(|f| {
            header_cells
                .iter()
                .position(|h| h.trim() == f.name)
                .ok_or_else(|| IngestionError::SchemaMismatch {
                    message: format!("missing required column '{}'. headers={:?}", f.name, header_cells),
                })
        })
        .collect::<IngestionResult<Vec<_>>>()?;

    Ok((header_row_idx, col_idxs))
}

fn cell_to_header_string(c: &Data) -> String {
    match c {
        Data::Float(f) if f.fract() == 0.0 => (*f as i64).to_string(),
        Data::Empty => String::new(),
        other => cell_to_string(other),
    }
}

fn convert_cell(row: usize, column: &str, data_type: &DataType, c: &Data) -> IngestionResult<Value> {
    match c {
        Data::Empty => Ok(Value::Null),
        // Text cells (and resolved fixed values) follow the CSV parsing rules.
        Data::String(s) => parse_typed_value(row, column, data_type, s),
        _ => match data_type {
            DataType::Utf8 => Ok(Value::Utf8(cell_to_string(c))),
            DataType::Bool => parse_bool_cell(row, column, c).map(Value::Bool),
            DataType::Int64 => parse_i64_cell(row, column, c).map(Value::Int64),
            DataType::Float64 => parse_f64_cell(row, column, c).map(Value::Float64),
        },
    }
}

fn cell_to_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => (*f as i64).to_string(),
        _ => c.to_string(),
    }
}

fn cell_error(row: usize, column: &str, c: &Data, message: &str) -> IngestionError {
    IngestionError::ParseError {
        row,
        column: column.to_string(),
        raw: c.to_string(),
        message: message.to_string(),
    }
}

fn parse_bool_cell(row: usize, column: &str, c: &Data) -> IngestionResult<bool> {
    match c {
        Data::Bool(b) => Ok(*b),
        Data::Int(i) => Ok(*i != 0),
        Data::Float(f) => Ok(*f != 0.0),
        Data::String(s) => parse_bool(s).map_err(|message| cell_error(row, column, c, &message)),
        _ => Err(cell_error(row, column, c, "expected bool")),
    }
}

fn parse_i64_cell(row: usize, column: &str, c: &Data) -> IngestionResult<i64> {
    match c {
        Data::Int(i) => Ok(*i),
        Data::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
        Data::Float(_) => Err(cell_error(row, column, c, "expected integer (got non-integer float)")),
        Data::Bool(b) => Ok(i64::from(*b)),
        _ => Err(cell_error(row, column, c, "expected integer")),
    }
}

fn parse_f64_cell(row: usize, column: &str, c: &Data) -> IngestionResult<f64> {
    match c {
        Data::Float(f) => Ok(*f),
        Data::Int(i) => Ok(*i as f64),
        _ => Err(cell_error(row, column, c, "expected number")),
    }
}

#[cfg(test)]
mod tests {
    use calamine::{Data, Range};

    use super::extract_layout;
    use crate::error::IngestionError;
    use crate::ingestion::sheet::{LayoutColumn, SheetLayout};
    use crate::types::{DataType, Field, Schema, Value};

    /// Rows 2..=5 (1-based) of columns A..C; row 6 is empty.
    ///
    /// ```text
    ///      A      B    C
    /// 1  title
    /// 2  east    10   1.5
    /// 3          11   2.5
    /// 4  west    12   3.5
    /// 5          13   4.5
    /// ```
    fn sheet() -> Range<Data> {
        let mut r = Range::new((0, 0), (5, 2));
        r.set_value((0, 0), Data::String("title".to_string()));
        r.set_value((1, 0), Data::String("east".to_string()));
        r.set_value((3, 0), Data::String("west".to_string()));
        for i in 0..4u32 {
            r.set_value((1 + i, 1), Data::Int(10 + i as i64));
            r.set_value((1 + i, 2), Data::Float(1.5 + i as f64));
        }
        r
    }

    fn layout() -> SheetLayout {
        SheetLayout::new("B2")
            .column(LayoutColumn::Fixed { value: "batch-1".to_string() })
            .column(LayoutColumn::Cell { cell: "A1".to_string() })
            .column(LayoutColumn::Repeat { column: "A".to_string(), number: 1 })
            .column(LayoutColumn::Direction { column: "B".to_string(), number: 2 })
    }

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("batch", DataType::Utf8),
            Field::new("title", DataType::Utf8),
            Field::new("region", DataType::Utf8),
            Field::new("qty", DataType::Int64),
            Field::new("price", DataType::Float64),
        ])
    }

    #[test]
    fn extracts_fixed_cell_repeat_and_direction_columns() {
        let ds = extract_layout("S", &sheet(), &layout(), &schema()).unwrap();
        assert_eq!(ds.row_count(), 4);
        assert_eq!(
            ds.rows[1],
            vec![
                Value::Utf8("batch-1".to_string()),
                Value::Utf8("title".to_string()),
                Value::Utf8("east".to_string()),
                Value::Int64(11),
                Value::Float64(2.5),
            ]
        );
        assert_eq!(ds.rows[3][2], Value::Utf8("west".to_string()));
    }

    #[test]
    fn unit_row_steps_the_record_count() {
        let mut r = sheet();
        // B2 and B4 are filled, so two steps of 2 rows.
        let ds = extract_layout("S", &r, &layout().with_unit_row(2), &schema()).unwrap();
        assert_eq!(ds.row_count(), 4);

        r.set_value((3, 1), Data::Empty);
        let ds = extract_layout("S", &r, &layout(), &schema()).unwrap();
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.rows[1][3], Value::Int64(11));
    }

    #[test]
    fn schema_width_must_match_layout() {
        let narrow = Schema::new(vec![Field::new("batch", DataType::Utf8)]);
        let err = extract_layout("S", &sheet(), &layout(), &narrow).unwrap_err();
        assert!(matches!(err, IngestionError::Layout { .. }));
    }
}
