//! `SyncEngine`: the public facade tying request validation, planning,
//! compilation and the orchestrated apply together.
//!
//! Each operation is written once as a closure over a
//! [`DocumentSession`](crate::session::DocumentSession);
//! the orchestrator picks the backend and retries. `try_*` methods return
//! `Result`; the plain methods fold failures into a report.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cellsync_common::Dataset;
use cellsync_io::{
    AccessProbe, CloseOptions, DocumentRef, FsProbe, LiveBackend, OfflineStore, OpenDocument,
    PowerShellLive, SheetChange, SheetResolution, SheetSelector, SheetTarget,
};
use chrono::Local;

use crate::backup::create_backup;
use crate::compile::{CompiledPatch, compile, compile_cells};
use crate::config::EngineConfig;
use crate::error::SyncError;
use crate::locks::PathLocks;
use crate::merge::{self, MergeStrategy};
use crate::orchestrator::Orchestrator;
use crate::report::{
    CloseOutcome, CloseReport, OpenDocumentsReport, OperationReport, ReadOutcome, ReadReport,
    SheetOutcome, UpdateOutcome,
};
use crate::request::{UpdateArgs, UpdatePayload, UpdateRequest};
use crate::retry::{Sleeper, ThreadSleeper};
use crate::session::require_ack;
use crate::sheet_name::{same_sheet_name, validate_sheet_name};

pub struct SyncEngine {
    config: EngineConfig,
    orchestrator: Orchestrator,
    locks: PathLocks,
}

enum LiveChoice {
    Default,
    Custom(Arc<dyn LiveBackend>),
    Disabled,
}

/// Assembles a [`SyncEngine`] from injected collaborators. Anything left
/// unset gets the production default.
pub struct SyncEngineBuilder {
    config: EngineConfig,
    probe: Option<Arc<dyn AccessProbe>>,
    live: LiveChoice,
    offline: Option<Arc<dyn OfflineStore>>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl SyncEngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            probe: None,
            live: LiveChoice::Default,
            offline: None,
            sleeper: None,
        }
    }

    pub fn probe(mut self, probe: Arc<dyn AccessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn live(mut self, live: Arc<dyn LiveBackend>) -> Self {
        self.live = LiveChoice::Custom(live);
        self
    }

    /// Locked documents fail with `BackendUnavailable` instead.
    pub fn without_live(mut self) -> Self {
        self.live = LiveChoice::Disabled;
        self
    }

    pub fn offline(mut self, store: Arc<dyn OfflineStore>) -> Self {
        self.offline = Some(store);
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    pub fn build(self) -> Result<SyncEngine, SyncError> {
        let offline = match self.offline {
            Some(store) => store,
            None => default_offline_store()?,
        };
        let live: Option<Arc<dyn LiveBackend>> = match self.live {
            LiveChoice::Default => Some(Arc::new(PowerShellLive::new(
                self.config.powershell.clone(),
            ))),
            LiveChoice::Custom(live) => Some(live),
            LiveChoice::Disabled => None,
        };
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(FsProbe::new()) as Arc<dyn AccessProbe>);
        let sleeper = self
            .sleeper
            .unwrap_or_else(|| Arc::new(ThreadSleeper) as Arc<dyn Sleeper>);

        let orchestrator = Orchestrator::new(probe, live, offline, sleeper)
            .with_retry(self.config.retry_policy())
            .with_availability(self.config.availability());
        Ok(SyncEngine {
            config: self.config,
            orchestrator,
            locks: PathLocks::new(),
        })
    }
}

#[cfg(feature = "umya")]
fn default_offline_store() -> Result<Arc<dyn OfflineStore>, SyncError> {
    Ok(Arc::new(cellsync_io::CodecStore::<cellsync_io::UmyaCodec>::new()))
}

#[cfg(not(feature = "umya"))]
fn default_offline_store() -> Result<Arc<dyn OfflineStore>, SyncError> {
    Err(SyncError::invalid(
        "no offline store configured and the `umya` feature is disabled",
    ))
}

impl SyncEngine {
    /// Engine with the filesystem probe, the PowerShell live backend and the
    /// xlsx codec.
    #[cfg(feature = "umya")]
    pub fn new(config: EngineConfig) -> Result<Self, SyncError> {
        SyncEngineBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> SyncEngineBuilder {
        SyncEngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    fn exclusive<T>(&self, doc: &DocumentRef, f: impl FnOnce() -> T) -> T {
        if self.config.serialize_per_path {
            self.locks.with(doc.path(), f)
        } else {
            f()
        }
    }

    pub fn try_update(&self, req: &UpdateRequest) -> Result<UpdateOutcome, SyncError> {
        self.update_recording_backup(req, &mut None)
    }

    /// `backup_made` is filled as soon as the backup copy exists, so a run
    /// that fails afterwards can still report where it is.
    fn update_recording_backup(
        &self,
        req: &UpdateRequest,
        backup_made: &mut Option<PathBuf>,
    ) -> Result<UpdateOutcome, SyncError> {
        req.validate()?;
        let doc = DocumentRef::new(&req.path)?;
        let mode = req.mode();
        let floor = self.config.clear_floor();

        self.exclusive(&doc, || -> Result<UpdateOutcome, SyncError> {
            let backup = if req.backup {
                let copy = create_backup(doc.path(), &self.config.backup_dir_prefix, Local::now())?;
                *backup_made = Some(copy.clone());
                Some(copy)
            } else {
                None
            };

            let applied = self.orchestrator.run(&doc, "update", |session| {
                let snap = session.snapshot(&req.sheet, mode.sheet_resolution())?;
                let (strategy, compiled) = match &req.payload {
                    UpdatePayload::Rows {
                        mode,
                        rows,
                        smart_merge,
                    } => {
                        let plan = merge::plan(&snap.dataset, rows, *mode, *smart_merge)?;
                        let compiled = compile(&plan.dataset, *mode, snap.dataset.extent(), floor);
                        (Some(plan.strategy), compiled)
                    }
                    UpdatePayload::Cells(edits) => (None, compile_cells(edits)),
                };
                reject_if_nothing_valid(&compiled)?;

                let target = SheetTarget::from(&snap.sheet);
                if !compiled.patch.is_empty() || target.create {
                    session.apply_patch(&target, &compiled.patch)?;
                    session.commit()?;
                }
                Ok(Compiled {
                    target,
                    strategy,
                    compiled,
                })
            })?;

            let Compiled {
                target,
                strategy,
                compiled,
            } = applied.value;
            let outcome = UpdateOutcome {
                path: doc.path().to_path_buf(),
                sheet: target.name,
                sheet_created: target.create,
                mode,
                strategy,
                backend: applied.backend,
                cells_written: compiled.patch.write_count(),
                cells_cleared: compiled.patch.clear_count(),
                cells_failed: compiled.failures,
                attempts: applied.attempts,
                backup,
            };
            tracing::info!(path = %doc, summary = %outcome.summary(), "update applied");
            Ok(outcome)
        })
    }

    pub fn try_update_args(&self, args: UpdateArgs) -> Result<UpdateOutcome, SyncError> {
        let req = UpdateRequest::try_from(args)?;
        self.try_update(&req)
    }

    pub fn try_read(
        &self,
        path: impl AsRef<Path>,
        sheet: impl Into<SheetSelector>,
    ) -> Result<ReadOutcome, SyncError> {
        let doc = DocumentRef::new(path)?;
        let sheet = sheet.into();
        self.exclusive(&doc, || -> Result<ReadOutcome, SyncError> {
            let applied = self.orchestrator.run(&doc, "read", |session| {
                session.snapshot(&sheet, SheetResolution::FallbackToDefault)
            })?;
            let snap = applied.value;
            Ok(ReadOutcome {
                path: doc.path().to_path_buf(),
                sheet: snap.sheet.name().to_string(),
                sheets: snap.sheets,
                rows: snap.dataset,
                backend: applied.backend,
            })
        })
    }

    pub fn try_add_sheet(
        &self,
        path: impl AsRef<Path>,
        name: &str,
        rows: Option<Dataset>,
    ) -> Result<SheetOutcome, SyncError> {
        let name = validate_sheet_name(name)?;
        let rows = rows.filter(|r| !r.is_empty());
        self.structural(path, "add_sheet", |sheets| {
            if let Some(existing) = sheets.iter().find(|s| same_sheet_name(s, &name)) {
                return Err(SyncError::DuplicateSheetName(existing.clone()));
            }
            Ok((
                name.clone(),
                SheetChange::Add {
                    name: name.clone(),
                    rows: rows.clone(),
                },
            ))
        })
    }

    pub fn try_rename_sheet(
        &self,
        path: impl AsRef<Path>,
        from: &str,
        to: &str,
    ) -> Result<SheetOutcome, SyncError> {
        let to = validate_sheet_name(to)?;
        self.structural(path, "rename_sheet", |sheets| {
            let source = find_sheet(sheets, from)?;
            if let Some(clash) = sheets
                .iter()
                .find(|s| *s != source && same_sheet_name(s, &to))
            {
                return Err(SyncError::DuplicateSheetName(clash.clone()));
            }
            Ok((
                to.clone(),
                SheetChange::Rename {
                    from: source.clone(),
                    to: to.clone(),
                },
            ))
        })
    }

    pub fn try_delete_sheet(
        &self,
        path: impl AsRef<Path>,
        name: &str,
    ) -> Result<SheetOutcome, SyncError> {
        self.structural(path, "delete_sheet", |sheets| {
            let target = find_sheet(sheets, name)?;
            if sheets.len() <= 1 {
                return Err(SyncError::LastSheetDeletionDenied(target.clone()));
            }
            Ok((
                target.clone(),
                SheetChange::Delete {
                    name: target.clone(),
                },
            ))
        })
    }

    /// Run a sheet-level change. `decide` sees the current sheet inventory on
    /// every attempt and either rejects the change or names it.
    fn structural(
        &self,
        path: impl AsRef<Path>,
        operation: &'static str,
        decide: impl Fn(&[String]) -> Result<(String, SheetChange), SyncError>,
    ) -> Result<SheetOutcome, SyncError> {
        let doc = DocumentRef::new(path)?;
        self.exclusive(&doc, || -> Result<SheetOutcome, SyncError> {
            let applied = self.orchestrator.run(&doc, operation, |session| {
                let sheets = session.sheet_names()?;
                let (sheet, change) = decide(&sheets)?;
                session.change_sheets(&change)?;
                session.commit()?;
                Ok((sheets, sheet, change.describe()))
            })?;
            let (sheets_before, sheet, change) = applied.value;
            tracing::info!(path = %doc, %change, "sheet change applied");
            Ok(SheetOutcome {
                path: doc.path().to_path_buf(),
                operation: operation.to_string(),
                sheet,
                change,
                sheets_before,
                backend: applied.backend,
                attempts: applied.attempts,
            })
        })
    }

    /// Workbooks the live application has open. Needs a live backend; a
    /// stopped application has none.
    pub fn try_list_open_documents(&self) -> Result<Vec<OpenDocument>, SyncError> {
        let applied = self
            .orchestrator
            .run_live("list_open_documents", |live| Ok(live.list_open_documents()?))?;
        Ok(applied.value)
    }

    /// Close the workbook at `path` in the live application, or every open
    /// workbook when `path` is `None`.
    ///
    /// A named workbook that is not open fails with `DocumentNotOpen`.
    /// Closing everything when nothing is open succeeds with an empty list.
    pub fn try_close_document(
        &self,
        path: Option<&Path>,
        options: CloseOptions,
    ) -> Result<CloseOutcome, SyncError> {
        let doc = path.map(DocumentRef::new).transpose()?;
        let close = || -> Result<CloseOutcome, SyncError> {
            let applied = self.orchestrator.run_live("close", |live| {
                let open = live.list_open_documents()?;
                let closing: Vec<String> = match &doc {
                    Some(doc) => {
                        let found = open
                            .iter()
                            .find(|o| o.matches(doc))
                            .ok_or_else(|| SyncError::DocumentNotOpen(doc.path().to_path_buf()))?;
                        vec![found.name.clone()]
                    }
                    None => open.iter().map(|o| o.name.clone()).collect(),
                };
                if closing.is_empty() && !options.quit_application {
                    return Ok(closing);
                }
                require_ack(live.close(doc.as_ref(), options)?)?;
                Ok(closing)
            })?;
            let outcome = CloseOutcome {
                path: doc.as_ref().map(|d| d.path().to_path_buf()),
                closed: applied.value,
                options,
                attempts: applied.attempts,
            };
            tracing::info!(summary = %outcome.summary(), "close applied");
            Ok(outcome)
        };
        match &doc {
            Some(doc) => self.exclusive(doc, close),
            None => close(),
        }
    }

    pub fn list_open_documents(&self) -> OpenDocumentsReport {
        match self.try_list_open_documents() {
            Ok(documents) => documents.into(),
            Err(err) => OpenDocumentsReport::failure(&err),
        }
    }

    pub fn close_document(&self, path: Option<&Path>, options: CloseOptions) -> CloseReport {
        match self.try_close_document(path, options) {
            Ok(outcome) => outcome.into(),
            Err(err) => CloseReport::failure(path.map(Path::to_path_buf), &err),
        }
    }

    pub fn update(&self, req: &UpdateRequest) -> OperationReport {
        let mut backup = None;
        match self.update_recording_backup(req, &mut backup) {
            Ok(outcome) => outcome.into(),
            Err(err) => {
                OperationReport::failure("update", req.path.clone(), &err).with_backup(backup)
            }
        }
    }

    pub fn update_args(&self, args: UpdateArgs) -> OperationReport {
        let path = args.path.clone();
        match UpdateRequest::try_from(args) {
            Ok(req) => self.update(&req),
            Err(err) => OperationReport::failure("update", path, &err),
        }
    }

    pub fn read(&self, path: impl AsRef<Path>, sheet: impl Into<SheetSelector>) -> ReadReport {
        let path = path.as_ref();
        match self.try_read(path, sheet) {
            Ok(outcome) => outcome.into(),
            Err(err) => ReadReport::failure(path.to_path_buf(), &err),
        }
    }

    pub fn add_sheet(
        &self,
        path: impl AsRef<Path>,
        name: &str,
        rows: Option<Dataset>,
    ) -> OperationReport {
        let path = path.as_ref();
        sheet_report("add_sheet", path, self.try_add_sheet(path, name, rows))
    }

    pub fn rename_sheet(&self, path: impl AsRef<Path>, from: &str, to: &str) -> OperationReport {
        let path = path.as_ref();
        sheet_report("rename_sheet", path, self.try_rename_sheet(path, from, to))
    }

    pub fn delete_sheet(&self, path: impl AsRef<Path>, name: &str) -> OperationReport {
        let path = path.as_ref();
        sheet_report("delete_sheet", path, self.try_delete_sheet(path, name))
    }
}

struct Compiled {
    target: SheetTarget,
    strategy: Option<MergeStrategy>,
    compiled: CompiledPatch,
}

fn sheet_report(
    operation: &str,
    path: &Path,
    result: Result<SheetOutcome, SyncError>,
) -> OperationReport {
    match result {
        Ok(outcome) => outcome.into(),
        Err(err) => OperationReport::failure(operation, path.to_path_buf(), &err),
    }
}

/// Strict lookup for rename and delete. Exact names win over
/// case-insensitive matches.
fn find_sheet<'a>(sheets: &'a [String], name: &str) -> Result<&'a String, SyncError> {
    sheets
        .iter()
        .find(|s| *s == name)
        .or_else(|| sheets.iter().find(|s| same_sheet_name(s, name)))
        .ok_or_else(|| SyncError::SheetNotFound(name.to_string()))
}

/// A patch where every requested cell failed to compile has nothing to send.
fn reject_if_nothing_valid(compiled: &CompiledPatch) -> Result<(), SyncError> {
    if compiled.patch.is_empty() && !compiled.failures.is_empty() {
        let refs: Vec<&str> = compiled
            .failures
            .iter()
            .map(|f| f.reference.as_str())
            .collect();
        return Err(SyncError::invalid(format!(
            "no valid cell references: {}",
            refs.join(", ")
        )));
    }
    Ok(())
}
