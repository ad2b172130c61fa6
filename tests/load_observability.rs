use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rust_table_loader::ingestion::CsvSource;
use rust_table_loader::load::{
    CompositeObserver, FileObserver, LoadContext, LoadObserver, LoadOptions, LoadReport, LoadSeverity,
    LoadStage, Loader, OverwritePolicy,
};
use rust_table_loader::table::MemoryTable;
use rust_table_loader::types::{DataSet, DataType, Field, Schema, Value};
use rust_table_loader::LoadError;

#[derive(Default)]
struct RecordingObserver {
    committed: Mutex<Vec<usize>>,
    failures: Mutex<Vec<LoadSeverity>>,
    alerts: Mutex<Vec<LoadSeverity>>,
    last_stage: Mutex<Option<LoadStage>>,
}

impl LoadObserver for RecordingObserver {
    fn on_stage(&self, _ctx: &LoadContext, stage: LoadStage) {
        *self.last_stage.lock().unwrap() = Some(stage);
    }

    fn on_committed(&self, _ctx: &LoadContext, report: &LoadReport) {
        self.committed.lock().unwrap().push(report.inserted);
    }

    fn on_aborted(&self, _ctx: &LoadContext, severity: LoadSeverity, _error: &LoadError) {
        self.failures.lock().unwrap().push(severity);
    }

    fn on_alert(&self, _ctx: &LoadContext, severity: LoadSeverity, _error: &LoadError) {
        self.alerts.lock().unwrap().push(severity);
    }
}

fn tmp_file(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("rust-table-loader-{name}-{nanos}.log"))
}

fn schema() -> Schema {
    Schema::new(vec![Field::new("fid", DataType::Int64)])
}

fn table() -> MemoryTable {
    MemoryTable::new(
        "t",
        Schema::new(vec![
            Field::new("record_id", DataType::Int64),
            Field::new("is_deleted", DataType::Int64),
            Field::new("fid", DataType::Int64),
        ]),
    )
}

fn options(obs: Arc<RecordingObserver>, threshold: LoadSeverity) -> LoadOptions {
    LoadOptions {
        observer: Some(obs),
        alert_at_or_above: threshold,
    }
}

#[test]
fn observer_sees_commit() {
    let obs = Arc::new(RecordingObserver::default());
    let mut loader = Loader::with_options(table(), options(obs.clone(), LoadSeverity::Critical));
    let batch = DataSet::new(schema(), vec![vec![Value::Int64(1)], vec![Value::Int64(2)]]);
    loader.load(batch, Some(&OverwritePolicy::soft(["fid"]))).unwrap();

    assert_eq!(*obs.committed.lock().unwrap(), vec![2]);
    assert_eq!(*obs.last_stage.lock().unwrap(), Some(LoadStage::Committed));
    assert!(obs.failures.lock().unwrap().is_empty());
}

#[test]
fn observer_receives_failure_and_alert_on_critical_io_error() {
    let obs = Arc::new(RecordingObserver::default());
    let mut loader = Loader::with_options(table(), options(obs.clone(), LoadSeverity::Critical));

    // Missing file -> Io error -> Critical
    let source = CsvSource::new("tests/fixtures/does_not_exist.csv", schema());
    let _ = loader.load_from(&source, None).unwrap_err();

    assert_eq!(*obs.failures.lock().unwrap(), vec![LoadSeverity::Critical]);
    assert_eq!(*obs.alerts.lock().unwrap(), vec![LoadSeverity::Critical]);
    assert_eq!(*obs.last_stage.lock().unwrap(), Some(LoadStage::Aborted));
}

#[test]
fn configuration_error_does_not_alert_at_default_threshold() {
    let obs = Arc::new(RecordingObserver::default());
    let mut loader = Loader::with_options(table(), options(obs.clone(), LoadSeverity::Critical));

    let batch = DataSet::new(schema(), vec![vec![Value::Int64(1)]]);
    let _ = loader.load(batch, Some(&OverwritePolicy::soft(["missing"]))).unwrap_err();

    assert_eq!(*obs.failures.lock().unwrap(), vec![LoadSeverity::Error]);
    assert!(obs.alerts.lock().unwrap().is_empty());
}

#[test]
fn lower_threshold_alerts_on_errors() {
    let obs = Arc::new(RecordingObserver::default());
    let mut loader = Loader::with_options(table(), options(obs.clone(), LoadSeverity::Error));

    let _ = loader.load(DataSet::empty(schema()), None).unwrap_err();
    assert_eq!(*obs.alerts.lock().unwrap(), vec![LoadSeverity::Error]);
}

#[test]
fn file_observer_appends_through_composite() {
    let path = tmp_file("observer");
    let recorder = Arc::new(RecordingObserver::default());
    let observers: Vec<Arc<dyn LoadObserver>> = vec![
        Arc::new(FileObserver::new(&path)),
        recorder.clone() as Arc<dyn LoadObserver>,
    ];
    let composite = CompositeObserver::new(observers);
    let mut loader = Loader::new(table()).with_observer(Arc::new(composite));

    let batch = DataSet::new(schema(), vec![vec![Value::Int64(1)]]);
    loader.load(batch.clone(), Some(&OverwritePolicy::hard(["fid"]))).unwrap();
    let _ = loader.load(batch, Some(&OverwritePolicy::hard(["nope"]))).unwrap_err();

    let log = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains(" ok table=t mode=hard inserted=1 ids=0..1"));
    assert!(lines[1].contains(" fail severity=Error table=t"));
    assert_eq!(*recorder.committed.lock().unwrap(), vec![1]);

    let _ = std::fs::remove_file(&path);
}
