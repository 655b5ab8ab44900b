//! Reconcile tabular edits against spreadsheet documents.
//!
//! A request is planned ([`merge`]), compiled into a cell [`Patch`]
//! ([`compile`]) and applied by the [`Orchestrator`], which probes the
//! document, picks the live or offline backend, and retries with linear
//! backoff. [`SyncEngine`] is the facade most callers want.

pub mod backup;
pub mod compile;
pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod merge;
pub mod orchestrator;
pub mod report;
pub mod request;
pub mod retry;
pub mod session;
pub mod sheet_name;

pub use compile::{CellFailure, CompiledPatch};
pub use config::EngineConfig;
pub use engine::{SyncEngine, SyncEngineBuilder};
pub use error::{ErrorKind, SyncError};
pub use locks::PathLocks;
pub use merge::{MergePlan, MergeStrategy};
pub use orchestrator::{Applied, ApplyPhase, AttemptRecord, AttemptResult, Orchestrator};
pub use report::{
    CloseOutcome, CloseReport, ErrorReport, OpenDocumentsReport, OperationReport, ReadOutcome,
    ReadReport, SheetOutcome, UpdateOutcome,
};
pub use request::{CellEdit, MergeMode, UpdateArgs, UpdatePayload, UpdateRequest};
pub use retry::{AvailabilityWait, RecordingSleeper, RetryPolicy, Sleeper, ThreadSleeper};
pub use session::{BackendKind, DocumentSession, TargetSnapshot};

pub use cellsync_common::{CellCoord, CellValue, Dataset, Extent, Patch, Row};
pub use cellsync_io::{Accessibility, CloseOptions, DocumentRef, OpenDocument, SheetSelector};
