//! The load state machine.

use std::fmt;
use std::sync::Arc;

use crate::error::{IngestionError, LoadError, LoadResult, StorageError};
use crate::ingestion::{validate_batch, RowSource};
use crate::table::{RowFilter, TableTransaction, TargetTable};
use crate::types::{DataSet, DataType, Field};

use super::identity::{next_range, IdRange};
use super::observability::{LoadContext, LoadObserver, LoadSeverity};
use super::policy::{OverwritePolicy, RetirementMode};
use super::resolver::find_superseded;
use super::retirement::retire;

/// Stages a load moves through.
///
/// `Start -> IdentityAssigned -> Inserting -> AllRowsInserted -> ResolvingOverwrite ->
/// Retiring -> Committing -> Committed`. Loads without a policy skip identity assignment,
/// resolution and retirement. Any error moves to `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Start,
    IdentityAssigned,
    Inserting,
    AllRowsInserted,
    ResolvingOverwrite,
    Retiring,
    Committing,
    Committed,
    Aborted,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadStage::Start => "start",
            LoadStage::IdentityAssigned => "identity-assigned",
            LoadStage::Inserting => "inserting",
            LoadStage::AllRowsInserted => "all-rows-inserted",
            LoadStage::ResolvingOverwrite => "resolving-overwrite",
            LoadStage::Retiring => "retiring",
            LoadStage::Committing => "committing",
            LoadStage::Committed => "committed",
            LoadStage::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Outcome of a committed load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Rows inserted.
    pub inserted: usize,
    /// Identifiers assigned to the batch (only with a policy).
    pub ids: Option<IdRange>,
    /// Identifiers of the prior rows the batch superseded, ascending.
    pub superseded: Vec<i64>,
    /// Rows flagged or deleted.
    pub retired: usize,
    /// Retirement mode applied (only with a policy).
    pub mode: Option<RetirementMode>,
}

/// Options controlling loader behavior.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct LoadOptions {
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn LoadObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: LoadSeverity,
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            observer: None,
            alert_at_or_above: LoadSeverity::Critical,
        }
    }
}

impl LoadOptions {
    fn stage(&self, ctx: &LoadContext, stage: LoadStage) {
        if let Some(obs) = &self.observer {
            obs.on_stage(ctx, stage);
        }
    }

    fn abort(&self, ctx: &LoadContext, error: LoadError) -> LoadError {
        self.stage(ctx, LoadStage::Aborted);
        if let Some(obs) = &self.observer {
            let sev = severity_for_error(&error);
            obs.on_aborted(ctx, sev, &error);
            if sev >= self.alert_at_or_above {
                obs.on_alert(ctx, sev, &error);
            }
        }
        error
    }
}

/// Loads batches into one target table.
///
/// `load` takes `&mut self`, so one loader runs one load at a time. Loads against the same
/// table through different handles are not coordinated; callers must serialize them.
///
/// ```
/// use rust_table_loader::load::{Loader, OverwritePolicy};
/// use rust_table_loader::table::MemoryTable;
/// use rust_table_loader::types::{DataSet, DataType, Field, Schema, Value};
///
/// # fn main() -> Result<(), rust_table_loader::LoadError> {
/// let table = MemoryTable::new(
///     "prices",
///     Schema::new(vec![
///         Field::new("record_id", DataType::Int64),
///         Field::new("is_deleted", DataType::Int64),
///         Field::new("fid", DataType::Int64),
///         Field::new("fprice", DataType::Float64),
///     ]),
/// );
/// let batch = |price: f64| {
///     DataSet::new(
///         Schema::new(vec![
///             Field::new("fid", DataType::Int64),
///             Field::new("fprice", DataType::Float64),
///         ]),
///         vec![vec![Value::Int64(1), Value::Float64(price)]],
///     )
/// };
///
/// let policy = OverwritePolicy::soft(["fid"]);
/// let mut loader = Loader::new(table);
/// loader.load(batch(9.5), Some(&policy))?;
/// let report = loader.load(batch(10.0), Some(&policy))?;
/// assert_eq!(report.superseded, vec![0]);
/// # Ok(())
/// # }
/// ```
pub struct Loader<T: TargetTable> {
    table: T,
    options: LoadOptions,
}

impl<T: TargetTable + fmt::Debug> fmt::Debug for Loader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("table", &self.table)
            .field("options", &self.options)
            .finish()
    }
}

impl<T: TargetTable> Loader<T> {
    /// Create a loader with default options.
    pub fn new(table: T) -> Self {
        Self::with_options(table, LoadOptions::default())
    }

    /// Create a loader with explicit options.
    pub fn with_options(table: T, options: LoadOptions) -> Self {
        Self { table, options }
    }

    /// Attach an observer.
    pub fn with_observer(mut self, observer: Arc<dyn LoadObserver>) -> Self {
        self.options.observer = Some(observer);
        self
    }

    /// The target table.
    pub fn table(&self) -> &T {
        &self.table
    }

    /// Release the target table.
    pub fn into_inner(self) -> T {
        self.table
    }

    /// Pull a batch from `source` and load it.
    ///
    /// Source failures are reported as [`LoadError::Source`] before the table is touched.
    pub fn load_from(
        &mut self,
        source: &dyn RowSource,
        policy: Option<&OverwritePolicy>,
    ) -> LoadResult<LoadReport> {
        match source.produce() {
            Ok(batch) => self.load(batch, policy),
            Err(e) => {
                let ctx = self.context(0, policy);
                Err(self.options.abort(&ctx, LoadError::Source(e)))
            }
        }
    }

    /// Load one batch, optionally superseding prior rows under `policy`.
    ///
    /// Everything happens in one transaction: either the batch is inserted and every
    /// superseded row retired, or the table is left exactly as it was.
    pub fn load(&mut self, batch: DataSet, policy: Option<&OverwritePolicy>) -> LoadResult<LoadReport> {
        let ctx = self.context(batch.row_count(), policy);
        let options = &self.options;
        options.stage(&ctx, LoadStage::Start);

        if let Err(e) = validate_batch(&batch) {
            return Err(options.abort(&ctx, LoadError::Source(e)));
        }
        if let Some(p) = policy {
            if let Err(e) = p.validate_for_batch(&batch.schema) {
                return Err(options.abort(&ctx, e));
            }
        }

        let mut tx = match self.table.begin() {
            Ok(tx) => tx,
            Err(e) => return Err(options.abort(&ctx, LoadError::storage(LoadStage::Start, e))),
        };

        let steps = Steps { ctx: &ctx, options };
        match steps.run(tx.as_mut(), batch, policy) {
            Ok(report) => {
                options.stage(&ctx, LoadStage::Committing);
                if let Err(e) = tx.commit() {
                    return Err(options.abort(&ctx, LoadError::storage(LoadStage::Committing, e)));
                }
                options.stage(&ctx, LoadStage::Committed);
                if let Some(obs) = &options.observer {
                    obs.on_committed(&ctx, &report);
                }
                Ok(report)
            }
            Err(e) => {
                // A failed rollback still drops the transaction, discarding its changes.
                let _ = tx.rollback();
                Err(options.abort(&ctx, e))
            }
        }
    }

    /// Column names of the target table.
    pub fn columns(&mut self) -> LoadResult<Vec<String>> {
        self.table
            .column_names()
            .map_err(|e| LoadError::storage(LoadStage::Start, e))
    }

    /// Current maximum of `id_col`, or `None` for an empty table.
    pub fn max_record_id(&mut self, id_col: &str) -> LoadResult<Option<i64>> {
        let table = self.table.name().to_string();
        let mut tx = self.begin()?;
        tx.max_i64(id_col).map_err(|e| match e {
            StorageError::UnknownColumn { column, .. } => {
                LoadError::configuration(format!("table '{table}' has no column '{column}'"))
            }
            other => LoadError::storage(LoadStage::Start, other),
        })
    }

    /// Every row of the target table.
    pub fn read_table(&mut self) -> LoadResult<DataSet> {
        let columns = self.columns()?;
        let refs: Vec<&str> = columns.iter().map(String::as_str).collect();
        let mut tx = self.begin()?;
        tx.scan(&refs, &RowFilter::all())
            .map_err(|e| LoadError::storage(LoadStage::Start, e))
    }

    /// Delete every row of the target table in one transaction. Returns the number deleted.
    pub fn clear(&mut self) -> LoadResult<usize> {
        let mut tx = self.begin()?;
        let n = tx
            .delete(&RowFilter::all())
            .map_err(|e| LoadError::storage(LoadStage::Start, e))?;
        tx.commit()
            .map_err(|e| LoadError::storage(LoadStage::Committing, e))?;
        Ok(n)
    }

    fn begin(&mut self) -> LoadResult<Box<dyn TableTransaction + '_>> {
        self.table
            .begin()
            .map_err(|e| LoadError::storage(LoadStage::Start, e))
    }

    fn context(&self, batch_rows: usize, policy: Option<&OverwritePolicy>) -> LoadContext {
        LoadContext {
            table: self.table.name().to_string(),
            batch_rows,
            mode: policy.map(|p| p.mode),
        }
    }
}

/// The in-transaction part of a load.
struct Steps<'a> {
    ctx: &'a LoadContext,
    options: &'a LoadOptions,
}

impl Steps<'_> {
    fn stage(&self, stage: LoadStage) {
        self.options.stage(self.ctx, stage);
    }

    fn run<X>(&self, tx: &mut X, batch: DataSet, policy: Option<&OverwritePolicy>) -> LoadResult<LoadReport>
    where
        X: TableTransaction + ?Sized,
    {
        let Some(policy) = policy else {
            self.stage(LoadStage::Inserting);
            let inserted = insert(tx, &batch)?;
            self.stage(LoadStage::AllRowsInserted);
            return Ok(LoadReport {
                inserted,
                ids: None,
                superseded: Vec::new(),
                retired: 0,
                mode: None,
            });
        };

        let columns = tx
            .column_names()
            .map_err(|e| LoadError::storage(LoadStage::Start, e))?;
        policy.validate_for_table(&self.ctx.table, &columns)?;

        let range = next_range(tx, &self.ctx.table, &policy.id_col, batch.row_count())?;
        self.stage(LoadStage::IdentityAssigned);
        let stamped = stamp(batch, policy, range);

        self.stage(LoadStage::Inserting);
        let inserted = insert(tx, &stamped)?;
        self.stage(LoadStage::AllRowsInserted);

        self.stage(LoadStage::ResolvingOverwrite);
        let superseded = find_superseded(tx, &self.ctx.table, policy, &stamped, range.ceiling())?;

        self.stage(LoadStage::Retiring);
        let retired = retire(tx, policy, &superseded)?;

        Ok(LoadReport {
            inserted,
            ids: Some(range),
            superseded,
            retired,
            mode: Some(policy.mode),
        })
    }
}

fn insert<X: TableTransaction + ?Sized>(tx: &mut X, batch: &DataSet) -> LoadResult<usize> {
    tx.insert_rows(batch)
        .map_err(|source| LoadError::Insertion { source })
}

/// Append the identifier and active-flag columns to every row.
fn stamp(batch: DataSet, policy: &OverwritePolicy, range: IdRange) -> DataSet {
    let active = policy.active_flag();
    batch.append_columns(
        vec![
            Field::new(policy.id_col.as_str(), DataType::Int64),
            Field::new(policy.flag_col.as_str(), DataType::Int64),
        ],
        |offset| vec![range.id_at(offset).into(), active.clone()],
    )
}

fn severity_for_error(e: &LoadError) -> LoadSeverity {
    match e {
        LoadError::Configuration { .. } => LoadSeverity::Error,
        LoadError::Source(IngestionError::Io(_)) => LoadSeverity::Critical,
        LoadError::Source(IngestionError::Csv(err)) => match err.kind() {
            ::csv::ErrorKind::Io(_) => LoadSeverity::Critical,
            _ => LoadSeverity::Error,
        },
        LoadError::Source(_) => LoadSeverity::Error,
        LoadError::Insertion { source } if is_infrastructure(source) => LoadSeverity::Critical,
        LoadError::Insertion { .. } => LoadSeverity::Error,
        LoadError::Retirement { .. } | LoadError::Storage { .. } => LoadSeverity::Critical,
    }
}

/// Storage failures that are not about the data being written.
fn is_infrastructure(e: &StorageError) -> bool {
    match e {
        #[cfg(feature = "sqlite")]
        StorageError::Sqlite(err) => !matches!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::ConstraintViolation) | Some(rusqlite::ErrorCode::TypeMismatch)
        ),
        StorageError::UnknownTable { .. } => true,
        _ => false,
    }
}
