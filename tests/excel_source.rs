#![cfg(feature = "excel_test_writer")]

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use rust_table_loader::ingestion::{
    ExcelReadMode, ExcelSheetSelection, ExcelSource, FileSource, LayoutColumn, RowSource, SheetLayout,
};
use rust_table_loader::load::{Loader, OverwritePolicy};
use rust_table_loader::table::MemoryTable;
use rust_table_loader::types::{DataType, Field, Schema, Value};

fn tmp_file(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("rust-table-loader-{name}-{nanos}.xlsx"))
}

fn price_schema() -> Schema {
    Schema::new(vec![
        Field::new("fid", DataType::Int64),
        Field::new("fcode", DataType::Utf8),
        Field::new("fprice", DataType::Float64),
    ])
}

fn write_prices_xlsx(path: &PathBuf) {
    use rust_xlsxwriter::Workbook;

    let mut wb = Workbook::new();

    let ws1 = wb.add_worksheet();
    ws1.set_name("Monday").unwrap();
    ws1.write_string(0, 0, "fid").unwrap();
    ws1.write_string(0, 1, "fcode").unwrap();
    ws1.write_string(0, 2, "fprice").unwrap();
    ws1.write_number(1, 0, 1).unwrap();
    ws1.write_string(1, 1, "A").unwrap();
    ws1.write_number(1, 2, 10.5).unwrap();
    ws1.write_number(2, 0, 2).unwrap();
    ws1.write_string(2, 1, "B").unwrap();
    ws1.write_number(2, 2, 20).unwrap();

    let ws2 = wb.add_worksheet();
    ws2.set_name("Tuesday").unwrap();
    ws2.write_string(0, 0, "fid").unwrap();
    ws2.write_string(0, 1, "fcode").unwrap();
    ws2.write_string(0, 2, "fprice").unwrap();
    ws2.write_string(1, 0, "1").unwrap();
    ws2.write_string(1, 1, "A").unwrap();
    ws2.write_number(1, 2, 11).unwrap();

    wb.save(path).unwrap();
}

/// A form-style sheet: a title cell, then one record per two rows starting at B4,
/// with the region in column A only filled on the first record of each group.
fn write_report_xlsx(path: &PathBuf) {
    use rust_xlsxwriter::Workbook;

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("Report").unwrap();
    ws.write_string(0, 0, "Weekly prices").unwrap();
    ws.write_string(3, 0, "north").unwrap();
    ws.write_string(7, 0, "south").unwrap();
    for (i, (fid, price)) in [(1, 1.5), (2, 2.5), (3, 3.5)].into_iter().enumerate() {
        let row = 3 + 2 * i as u32;
        ws.write_number(row, 1, fid).unwrap();
        ws.write_number(row, 2, price).unwrap();
        // Notes row under each record.
        ws.write_string(row + 1, 2, "note").unwrap();
    }
    wb.save(path).unwrap();
}

#[test]
fn header_mode_reads_first_sheet_by_default() {
    let path = tmp_file("prices");
    write_prices_xlsx(&path);

    let ds = ExcelSource::new(&path, price_schema()).produce().unwrap();
    assert_eq!(ds.row_count(), 2);
    assert_eq!(ds.rows[0], vec![Value::Int64(1), Value::Utf8("A".to_string()), Value::Float64(10.5)]);
    assert_eq!(ds.rows[1][2], Value::Float64(20.0));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn header_mode_concatenates_selected_sheets() {
    let path = tmp_file("prices-all");
    write_prices_xlsx(&path);

    let all = ExcelSource::with_mode(&path, price_schema(), ExcelReadMode::Headers(ExcelSheetSelection::AllSheets));
    assert_eq!(all.produce().unwrap().row_count(), 3);

    let tuesday = ExcelSource::with_mode(
        &path,
        price_schema(),
        ExcelReadMode::Headers(ExcelSheetSelection::Sheet("Tuesday".to_string())),
    );
    let ds = tuesday.produce().unwrap();
    assert_eq!(ds.row_count(), 1);
    // String cells holding numbers are parsed.
    assert_eq!(ds.rows[0][0], Value::Int64(1));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn layout_mode_steps_records_and_fills_groups() {
    let path = tmp_file("report");
    write_report_xlsx(&path);

    let layout = SheetLayout::new("B4")
        .with_sheet("Report")
        .with_unit_row(2)
        .column(LayoutColumn::Cell { cell: "A1".to_string() })
        .column(LayoutColumn::Repeat { column: "A".to_string(), number: 1 })
        .column(LayoutColumn::Direction { column: "B".to_string(), number: 1 });
    let schema = Schema::new(vec![
        Field::new("title", DataType::Utf8),
        Field::new("region", DataType::Utf8),
        Field::new("fid", DataType::Int64),
    ]);

    let ds = ExcelSource::with_mode(&path, schema, ExcelReadMode::Layout(layout))
        .produce()
        .unwrap();
    // Three records of two rows each; direction columns read every row in the span.
    assert_eq!(ds.row_count(), 6);
    assert_eq!(ds.rows[0][0], Value::Utf8("Weekly prices".to_string()));
    assert_eq!(ds.rows[0][2], Value::Int64(1));
    assert_eq!(ds.rows[1][1], Value::Utf8("north".to_string()));
    assert_eq!(ds.rows[1][2], Value::Null);
    assert_eq!(ds.rows[4][1], Value::Utf8("south".to_string()));
    assert_eq!(ds.rows[4][2], Value::Int64(3));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn workbook_loads_through_file_source() {
    let path = tmp_file("prices-load");
    write_prices_xlsx(&path);

    let mut fields = vec![
        Field::new("record_id", DataType::Int64),
        Field::new("is_deleted", DataType::Int64),
    ];
    fields.extend(price_schema().fields);
    let mut loader = Loader::new(MemoryTable::new("prices", Schema::new(fields)));
    let policy = OverwritePolicy::soft(["fcode"]);

    let source = FileSource::new(&path, price_schema());
    loader.load_from(&source, Some(&policy)).unwrap();
    let report = loader.load_from(&source, Some(&policy)).unwrap();
    assert_eq!(report.superseded, vec![0, 1]);

    let _ = std::fs::remove_file(&path);
}
