use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::LoadError;

use super::orchestrator::{LoadReport, LoadStage};
use super::policy::RetirementMode;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Load failed; the table is unchanged.
    Error,
    /// Load failed on infrastructure (I/O, storage after the batch was written, commit).
    Critical,
}

/// What a load is about to do.
#[derive(Debug, Clone)]
pub struct LoadContext {
    /// Target table name.
    pub table: String,
    /// Rows in the batch (0 when the source failed before producing one).
    pub batch_rows: usize,
    /// Retirement mode of the overwrite policy, if one was given.
    pub mode: Option<RetirementMode>,
}

/// Observer interface for load progress and outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts. All methods default to no-ops.
pub trait LoadObserver: Send + Sync {
    /// Called on every state-machine transition.
    fn on_stage(&self, _ctx: &LoadContext, _stage: LoadStage) {}

    /// Called once the load is committed.
    fn on_committed(&self, _ctx: &LoadContext, _report: &LoadReport) {}

    /// Called when the load is aborted and rolled back.
    fn on_aborted(&self, _ctx: &LoadContext, _severity: LoadSeverity, _error: &LoadError) {}

    /// Called when an aborted load meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_aborted`].
    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        self.on_aborted(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn LoadObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn LoadObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl LoadObserver for CompositeObserver {
    fn on_stage(&self, ctx: &LoadContext, stage: LoadStage) {
        for o in &self.observers {
            o.on_stage(ctx, stage);
        }
    }

    fn on_committed(&self, ctx: &LoadContext, report: &LoadReport) {
        for o in &self.observers {
            o.on_committed(ctx, report);
        }
    }

    fn on_aborted(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        for o in &self.observers {
            o.on_aborted(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Logs load outcomes to stderr. Stage transitions are only printed when `verbose` is set.
#[derive(Debug, Default)]
pub struct StdErrObserver {
    /// Also print every stage transition.
    pub verbose: bool,
}

impl LoadObserver for StdErrObserver {
    fn on_stage(&self, ctx: &LoadContext, stage: LoadStage) {
        if self.verbose {
            eprintln!("[load][stage] table={} stage={stage}", ctx.table);
        }
    }

    fn on_committed(&self, ctx: &LoadContext, report: &LoadReport) {
        eprintln!(
            "[load][ok] table={} mode={} inserted={} superseded={} retired={}",
            ctx.table,
            mode_label(ctx.mode),
            report.inserted,
            report.superseded.len(),
            report.retired
        );
    }

    fn on_aborted(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        eprintln!(
            "[load][{:?}] table={} mode={} rows={} err={}",
            severity,
            ctx.table,
            mode_label(ctx.mode),
            ctx.batch_rows,
            error
        );
    }

    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        eprintln!(
            "[ALERT][load][{:?}] table={} mode={} rows={} err={}",
            severity,
            ctx.table,
            mode_label(ctx.mode),
            ctx.batch_rows,
            error
        );
    }
}

/// Appends load events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl LoadObserver for FileObserver {
    fn on_committed(&self, ctx: &LoadContext, report: &LoadReport) {
        let ids = report
            .ids
            .map(|r| format!("{}..{}", r.first(), r.first() + r.len() as i64))
            .unwrap_or_else(|| "-".to_string());
        self.append_line(&format!(
            "{} ok table={} mode={} inserted={} ids={ids} retired={}",
            timestamp(),
            ctx.table,
            mode_label(ctx.mode),
            report.inserted,
            report.retired
        ));
    }

    fn on_aborted(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        self.append_line(&format!(
            "{} fail severity={:?} table={} mode={} rows={} err={}",
            timestamp(),
            severity,
            ctx.table,
            mode_label(ctx.mode),
            ctx.batch_rows,
            error
        ));
    }

    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LoadError) {
        self.append_line(&format!(
            "{} ALERT severity={:?} table={} mode={} rows={} err={}",
            timestamp(),
            severity,
            ctx.table,
            mode_label(ctx.mode),
            ctx.batch_rows,
            error
        ));
    }
}

fn mode_label(mode: Option<RetirementMode>) -> String {
    mode.map_or_else(|| "append".to_string(), |m| m.to_string())
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}
