//! Overwrite-aware loading.
//!
//! A load appends a batch to a target table. With an [`OverwritePolicy`] it also:
//!
//! - stamps every row with a fresh surrogate identifier ([`next_range`]) and an active flag
//! - finds the live prior rows whose key values occur in the batch ([`find_superseded`])
//! - retires them, either by flagging or by deleting ([`retire`])
//!
//! [`Loader`] runs all of it inside one transaction of the target table.

pub mod identity;
pub mod observability;
pub mod orchestrator;
pub mod policy;
pub mod resolver;
pub mod retirement;

pub use identity::{next_range, IdRange};
pub use observability::{
    CompositeObserver, FileObserver, LoadContext, LoadObserver, LoadSeverity, StdErrObserver,
};
pub use orchestrator::{LoadOptions, LoadReport, LoadStage, Loader};
pub use policy::{
    KeyMatching, OverwritePolicy, RetirementMode, DEFAULT_FLAG_COLUMN, DEFAULT_ID_COLUMN,
    FLAG_ACTIVE, FLAG_RETIRED,
};
pub use resolver::{find_superseded, superseded_filter, KEY_CHUNK_SIZE};
pub use retirement::{retire, RETIRE_CHUNK_SIZE};
