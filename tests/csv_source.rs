use rust_table_loader::ingestion::{
    ingest_csv_from_path, CsvOptions, CsvSource, FileSource, RowSource, SourceFormat,
};
use rust_table_loader::load::{Loader, OverwritePolicy};
use rust_table_loader::table::MemoryTable;
use rust_table_loader::types::{DataType, Field, Schema, Value};
use rust_table_loader::{IngestionError, LoadError};

fn price_schema() -> Schema {
    Schema::new(vec![
        Field::new("fid", DataType::Int64),
        Field::new("fcode", DataType::Utf8),
        Field::new("fprice", DataType::Float64),
    ])
}

fn price_table() -> MemoryTable {
    let mut fields = vec![
        Field::new("record_id", DataType::Int64),
        Field::new("is_deleted", DataType::Int64),
    ];
    fields.extend(price_schema().fields);
    MemoryTable::new("prices", Schema::new(fields))
}

#[test]
fn csv_source_reads_fixture() {
    let ds = CsvSource::new("tests/fixtures/prices_day1.csv", price_schema())
        .produce()
        .unwrap();
    assert_eq!(ds.row_count(), 3);
    assert_eq!(
        ds.rows[1],
        vec![
            Value::Int64(2),
            Value::Utf8("B".to_string()),
            Value::Float64(20.0),
        ]
    );
}

#[test]
fn csv_source_maps_reordered_headers_by_name() {
    let ds = ingest_csv_from_path("tests/fixtures/prices_day2.csv", &price_schema(), &CsvOptions::default())
        .unwrap();
    assert_eq!(ds.rows[0][0], Value::Int64(1));
    assert_eq!(ds.rows[0][2], Value::Float64(11.5));
}

#[test]
fn headerless_semicolon_file_maps_by_position() {
    let opts = CsvOptions {
        delimiter: b';',
        has_headers: false,
        ..CsvOptions::default()
    };
    let ds = CsvSource::with_options("tests/fixtures/prices_headerless.txt", price_schema(), opts)
        .produce()
        .unwrap();
    assert_eq!(ds.row_count(), 2);
    assert_eq!(ds.rows[0][2], Value::Float64(21.25));
    assert_eq!(ds.rows[1][2], Value::Null);
}

#[test]
fn file_source_infers_csv_and_rejects_unknown_extensions() {
    let ds = FileSource::new("tests/fixtures/prices_day1.csv", price_schema())
        .produce()
        .unwrap();
    assert_eq!(ds.row_count(), 3);

    let err = FileSource::new("tests/fixtures/prices_headerless.txt", price_schema())
        .produce()
        .unwrap_err();
    assert!(err.to_string().contains("cannot infer source format"));

    let forced = FileSource::new("tests/fixtures/prices_day2.csv", price_schema()).with_format(SourceFormat::Csv);
    assert_eq!(forced.produce().unwrap().row_count(), 2);
}

#[test]
fn daily_csv_loads_supersede_by_key() {
    let policy = OverwritePolicy::soft(["fid"]);
    let mut loader = Loader::new(price_table());

    let day1 = CsvSource::new("tests/fixtures/prices_day1.csv", price_schema());
    let report = loader.load_from(&day1, Some(&policy)).unwrap();
    assert_eq!(report.inserted, 3);

    let day2 = CsvSource::new("tests/fixtures/prices_day2.csv", price_schema());
    let report = loader.load_from(&day2, Some(&policy)).unwrap();
    assert_eq!(report.ids.map(|r| r.first()), Some(3));
    // fid 1 was reloaded; fid 4 is new.
    assert_eq!(report.superseded, vec![0]);
    assert_eq!(loader.table().row_count(), 5);
}

#[test]
fn parse_failure_is_a_source_error_and_leaves_table_untouched() {
    let mut loader = Loader::new(price_table());
    let bad = CsvSource::new("tests/fixtures/prices_bad_number.csv", price_schema());
    let err = loader.load_from(&bad, Some(&OverwritePolicy::soft(["fid"]))).unwrap_err();
    match err {
        LoadError::Source(IngestionError::ParseError { row, column, .. }) => {
            assert_eq!(row, 2);
            assert_eq!(column, "fprice");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(loader.table().row_count(), 0);
}

#[test]
fn missing_file_is_a_source_error() {
    let mut loader = Loader::new(price_table());
    let missing = CsvSource::new("tests/fixtures/does_not_exist.csv", price_schema());
    let err = loader.load_from(&missing, None).unwrap_err();
    assert!(matches!(err, LoadError::Source(IngestionError::Csv(_))));
}
