//! Backend selection and the bounded retry loop.
//!
//! ```text
//! Idle -> Probing -> LiveApply | OfflineApply -> Success
//!                                 \-> Backoff -> Probing ... -> ExhaustedFailure
//! ```
//!
//! Each attempt re-probes, so a document that is closed (or opened) between
//! attempts switches backend on the next one.

use std::sync::Arc;

use cellsync_common::Patch;
use cellsync_io::{AccessProbe, Accessibility, DocumentRef, LiveBackend, OfflineStore, SheetTarget};
use serde::Serialize;

use crate::error::SyncError;
use crate::retry::{AvailabilityWait, RetryPolicy, Sleeper};
use crate::session::{BackendKind, DocumentSession, LiveSession, OfflineSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPhase {
    Idle,
    Probing,
    LiveApply,
    OfflineApply,
    Backoff,
    Success,
    ExhaustedFailure,
}

/// Outcome of one backend invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "message", rename_all = "snake_case")]
pub enum AttemptResult {
    Success(String),
    Failure(String),
}

impl AttemptResult {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptResult::Success(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    /// 1-based.
    pub attempt: u32,
    /// `None` when the probe itself failed.
    pub backend: Option<BackendKind>,
    pub result: AttemptResult,
}

/// A successful orchestrated run.
#[derive(Debug, Clone)]
pub struct Applied<T> {
    pub value: T,
    pub backend: BackendKind,
    pub attempts: Vec<AttemptRecord>,
    pub phases: Vec<ApplyPhase>,
}

pub struct Orchestrator {
    probe: Arc<dyn AccessProbe>,
    live: Option<Arc<dyn LiveBackend>>,
    offline: Arc<dyn OfflineStore>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    availability: AvailabilityWait,
}

impl Orchestrator {
    pub fn new(
        probe: Arc<dyn AccessProbe>,
        live: Option<Arc<dyn LiveBackend>>,
        offline: Arc<dyn OfflineStore>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            probe,
            live,
            offline,
            sleeper,
            retry: RetryPolicy::default(),
            availability: AvailabilityWait::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_availability(mut self, availability: AvailabilityWait) -> Self {
        self.availability = availability;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Run `work` against a fresh session until it succeeds, fails with a
    /// non-retryable error, or the attempt budget is spent.
    ///
    /// `work` is re-run from scratch on every attempt and must therefore
    /// re-read whatever it depends on.
    pub fn run<T, F>(&self, doc: &DocumentRef, operation: &str, mut work: F) -> Result<Applied<T>, SyncError>
    where
        F: FnMut(&mut dyn DocumentSession) -> Result<T, SyncError>,
    {
        let span = tracing::info_span!("apply", path = %doc, operation, max_attempts = self.retry.max_attempts);
        let _enter = span.enter();

        self.retrying(operation, |attempt, phases| {
            phases.push(ApplyPhase::Probing);
            self.probe
                .probe(doc)
                .map_err(|err| (None, SyncError::from(err)))
                .and_then(|verdict| {
                    let backend = match verdict {
                        Accessibility::Locked => BackendKind::Live,
                        Accessibility::Free => BackendKind::Offline,
                    };
                    tracing::debug!(attempt, backend = backend.as_str(), "selected backend");
                    phases.push(match backend {
                        BackendKind::Live => ApplyPhase::LiveApply,
                        BackendKind::Offline => ApplyPhase::OfflineApply,
                    });
                    self.attempt_on(backend, doc, &mut work)
                        .map(|value| (backend, value))
                        .map_err(|err| (Some(backend), err))
                })
        })
    }

    /// Run `work` against the live application itself rather than one
    /// document, with the same retry budget. Nothing is probed and the
    /// readiness wait is skipped; `work` decides what a stopped application
    /// means.
    pub fn run_live<T, F>(&self, operation: &str, mut work: F) -> Result<Applied<T>, SyncError>
    where
        F: FnMut(&dyn LiveBackend) -> Result<T, SyncError>,
    {
        let span = tracing::info_span!("live", operation, max_attempts = self.retry.max_attempts);
        let _enter = span.enter();

        let live = self.live.as_deref().ok_or_else(|| {
            SyncError::BackendUnavailable("no live backend is configured".to_string())
        })?;
        self.retrying(operation, |_, phases| {
            phases.push(ApplyPhase::LiveApply);
            work(live)
                .map(|value| (BackendKind::Live, value))
                .map_err(|err| (Some(BackendKind::Live), err))
        })
    }

    fn retrying<T, F>(&self, operation: &str, mut attempt_once: F) -> Result<Applied<T>, SyncError>
    where
        F: FnMut(u32, &mut Vec<ApplyPhase>) -> Result<(BackendKind, T), (Option<BackendKind>, SyncError)>,
    {
        let max_attempts = self.retry.max_attempts;
        let mut phases = vec![ApplyPhase::Idle];
        let mut attempts = Vec::new();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match attempt_once(attempt, &mut phases) {
                Ok((backend, value)) => {
                    tracing::info!(attempt, backend = backend.as_str(), "apply succeeded");
                    attempts.push(AttemptRecord {
                        attempt,
                        backend: Some(backend),
                        result: AttemptResult::Success(operation.to_string()),
                    });
                    phases.push(ApplyPhase::Success);
                    return Ok(Applied {
                        value,
                        backend,
                        attempts,
                        phases,
                    });
                }
                Err((_, err)) if !err.is_retryable() => {
                    tracing::debug!(attempt, error = %err, "not retrying");
                    return Err(err);
                }
                Err((backend, err)) => {
                    last_error = err.to_string();
                    tracing::warn!(attempt, max_attempts, error = %err, "attempt failed");
                    attempts.push(AttemptRecord {
                        attempt,
                        backend,
                        result: AttemptResult::Failure(last_error.clone()),
                    });
                    if attempt < max_attempts {
                        phases.push(ApplyPhase::Backoff);
                        let delay = self.retry.backoff(attempt);
                        tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                        self.sleeper.sleep(delay);
                    }
                }
            }
        }

        phases.push(ApplyPhase::ExhaustedFailure);
        tracing::warn!(attempts = attempts.len(), "retries exhausted");
        Err(SyncError::ExhaustedRetries {
            attempts: max_attempts,
            last: last_error,
        })
    }

    fn attempt_on<T, F>(&self, backend: BackendKind, doc: &DocumentRef, work: &mut F) -> Result<T, SyncError>
    where
        F: FnMut(&mut dyn DocumentSession) -> Result<T, SyncError>,
    {
        match backend {
            BackendKind::Offline => {
                let codec = self.offline.open(doc)?;
                let mut session = OfflineSession::new(codec);
                work(&mut session)
            }
            BackendKind::Live => {
                let live = self.live.as_deref().ok_or_else(|| {
                    SyncError::BackendUnavailable(
                        "document is locked and no live backend is configured".to_string(),
                    )
                })?;
                if !self.availability.wait(self.sleeper.as_ref(), || live.is_responsive()) {
                    return Err(SyncError::BackendUnavailable(format!(
                        "{} is not responding",
                        live.backend_name()
                    )));
                }
                let handle = live.attach(doc)?;
                let mut session = LiveSession::new(live, handle);
                work(&mut session)
            }
        }
    }

    /// Submit `patch` once on the given backend, without probing or retrying.
    pub fn apply(
        &self,
        doc: &DocumentRef,
        target: &SheetTarget,
        patch: &Patch,
        backend: BackendKind,
    ) -> AttemptResult {
        match self.attempt_on(backend, doc, &mut |session: &mut dyn DocumentSession| {
            let msg = session.apply_patch(target, patch)?;
            session.commit()?;
            Ok(msg)
        }) {
            Ok(msg) => AttemptResult::Success(msg),
            Err(err) => AttemptResult::Failure(err.to_string()),
        }
    }

    /// Probe, submit `patch` and save, retrying with backoff.
    pub fn apply_with_retry(
        &self,
        doc: &DocumentRef,
        target: &SheetTarget,
        patch: &Patch,
    ) -> Result<Applied<String>, SyncError> {
        self.run(doc, "apply_patch", |session| {
            let msg = session.apply_patch(target, patch)?;
            session.commit()?;
            Ok(msg)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use cellsync_common::{CellCoord, CellValue};
    use cellsync_io::{BackendReply, DocumentCodec, IoError};
    use cellsync_testkit::{FakeLive, ScriptedProbe};

    use crate::retry::RecordingSleeper;

    struct NoOffline;

    impl OfflineStore for NoOffline {
        fn open(&self, _doc: &DocumentRef) -> Result<Box<dyn DocumentCodec>, IoError> {
            Err(IoError::Script("offline store not expected".into()))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        doc: DocumentRef,
        live: Arc<FakeLive>,
        sleeper: Arc<RecordingSleeper>,
        probe: Arc<ScriptedProbe>,
        orchestrator: Orchestrator,
    }

    fn fixture(live: FakeLive, verdicts: Vec<Accessibility>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        std::fs::write(&path, b"placeholder").unwrap();
        let live = Arc::new(live);
        let sleeper = Arc::new(RecordingSleeper::new());
        let probe = Arc::new(ScriptedProbe::new(verdicts));
        let orchestrator = Orchestrator::new(
            probe.clone(),
            Some(live.clone()),
            Arc::new(NoOffline),
            sleeper.clone(),
        );
        Fixture {
            doc: DocumentRef::new(&path).unwrap(),
            _dir: dir,
            live,
            sleeper,
            probe,
            orchestrator,
        }
    }

    fn one_write() -> (SheetTarget, Patch) {
        let mut b = Patch::builder();
        b.write(CellCoord::new(1, 1), "a");
        (
            SheetTarget {
                name: "Sheet1".into(),
                create: false,
            },
            b.build(),
        )
    }

    #[test]
    fn exhausts_after_max_attempts_with_linear_backoff() {
        let f = fixture(
            FakeLive::new().always_reply(BackendReply::Rejected("locked cell".into())),
            vec![Accessibility::Locked],
        );
        let (target, patch) = one_write();
        let err = f
            .orchestrator
            .apply_with_retry(&f.doc, &target, &patch)
            .unwrap_err();

        assert!(matches!(
            &err,
            SyncError::ExhaustedRetries { attempts: 3, last } if last.contains("locked cell")
        ));
        assert_eq!(f.live.call_count("set_cells_batch"), 3);
        assert_eq!(f.probe.probes(), 3);
        assert_eq!(
            f.sleeper.slept(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[test]
    fn missing_acknowledgment_is_a_failure() {
        let f = fixture(
            FakeLive::new().always_reply(BackendReply::Unacknowledged(String::new())),
            vec![Accessibility::Locked],
        );
        let (target, patch) = one_write();
        assert!(
            !f.orchestrator
                .apply(&f.doc, &target, &patch, BackendKind::Live)
                .is_success()
        );
        let err = f
            .orchestrator
            .apply_with_retry(&f.doc, &target, &patch)
            .unwrap_err();
        assert!(matches!(err, SyncError::ExhaustedRetries { .. }));
    }

    #[test]
    fn recovers_after_a_rejected_batch() {
        let f = fixture(FakeLive::new().reject_batches(1), vec![Accessibility::Locked]);
        let (target, patch) = one_write();
        let applied = f
            .orchestrator
            .apply_with_retry(&f.doc, &target, &patch)
            .unwrap();

        assert_eq!(applied.backend, BackendKind::Live);
        assert_eq!(applied.attempts.len(), 2);
        assert!(!applied.attempts[0].result.is_success());
        assert!(applied.attempts[1].result.is_success());
        assert_eq!(
            applied.phases,
            vec![
                ApplyPhase::Idle,
                ApplyPhase::Probing,
                ApplyPhase::LiveApply,
                ApplyPhase::Backoff,
                ApplyPhase::Probing,
                ApplyPhase::LiveApply,
                ApplyPhase::Success,
            ]
        );
        assert_eq!(f.sleeper.slept(), vec![Duration::from_millis(1000)]);
        assert_eq!(
            f.live.sheet("Sheet1").unwrap().get(CellCoord::new(1, 1)),
            &CellValue::from("a")
        );
        assert_eq!(f.live.saves(), 1);
    }

    #[test]
    fn unresponsive_application_waits_then_fails() {
        let f = fixture(FakeLive::new().unresponsive(), vec![Accessibility::Locked]);
        let orchestrator = f.orchestrator.with_retry(RetryPolicy::new(1, Duration::ZERO));
        let (target, patch) = one_write();
        let err = orchestrator
            .apply_with_retry(&f.doc, &target, &patch)
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::ExhaustedRetries { attempts: 1, ref last } if last.contains("not responding")
        ));
        assert_eq!(f.live.call_count("is_responsive"), 3);
        assert_eq!(f.live.call_count("attach"), 0);
        assert_eq!(f.sleeper.slept(), vec![Duration::from_millis(500); 2]);
    }

    #[test]
    fn locked_without_live_backend_is_unavailable() {
        let f = fixture(FakeLive::new(), vec![Accessibility::Locked]);
        let orchestrator = Orchestrator::new(
            f.probe.clone(),
            None,
            Arc::new(NoOffline),
            f.sleeper.clone(),
        )
        .with_retry(RetryPolicy::new(2, Duration::from_millis(10)));
        let (target, patch) = one_write();
        let err = orchestrator
            .apply_with_retry(&f.doc, &target, &patch)
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::ExhaustedRetries { attempts: 2, ref last } if last.contains("no live backend")
        ));
    }

    #[test]
    fn missing_document_is_not_retried() {
        let f = fixture(FakeLive::new(), vec![Accessibility::Free]);
        let gone = DocumentRef::new(f.doc.path().with_file_name("gone.xlsx")).unwrap();
        let (target, patch) = one_write();
        let err = f
            .orchestrator
            .apply_with_retry(&gone, &target, &patch)
            .unwrap_err();
        assert!(matches!(err, SyncError::FileNotFound(_)));
        assert_eq!(f.probe.probes(), 1);
        assert!(f.sleeper.slept().is_empty());
    }

    #[test]
    fn non_retryable_error_from_work_stops_immediately() {
        let f = fixture(FakeLive::new(), vec![Accessibility::Locked]);
        let mut runs = 0;
        let err = f
            .orchestrator
            .run(&f.doc, "noop", |_session| -> Result<(), SyncError> {
                runs += 1;
                Err(SyncError::DuplicateSheetName("S".into()))
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::DuplicateSheetName(_)));
        assert_eq!(runs, 1);
    }

    #[test]
    fn application_level_work_retries_without_probing() {
        let f = fixture(FakeLive::new(), vec![Accessibility::Free]);
        let mut runs = 0;
        let applied = f
            .orchestrator
            .run_live("list", |live| {
                runs += 1;
                if runs < 2 {
                    return Err(SyncError::ApplyFailed("busy".into()));
                }
                Ok(live.list_open_documents()?)
            })
            .unwrap();

        assert_eq!(applied.backend, BackendKind::Live);
        assert!(applied.value.is_empty());
        assert_eq!(applied.attempts.len(), 2);
        assert_eq!(
            applied.phases,
            vec![
                ApplyPhase::Idle,
                ApplyPhase::LiveApply,
                ApplyPhase::Backoff,
                ApplyPhase::LiveApply,
                ApplyPhase::Success,
            ]
        );
        assert_eq!(f.probe.probes(), 0);
        assert_eq!(f.live.call_count("is_responsive"), 0);
        assert_eq!(f.sleeper.slept(), vec![Duration::from_millis(1000)]);
    }

    #[test]
    fn application_level_work_needs_a_live_backend() {
        let f = fixture(FakeLive::new(), vec![Accessibility::Locked]);
        let orchestrator = Orchestrator::new(
            f.probe.clone(),
            None,
            Arc::new(NoOffline),
            f.sleeper.clone(),
        );
        let err = orchestrator
            .run_live("list", |live| Ok(live.list_open_documents()?))
            .unwrap_err();
        assert!(matches!(err, SyncError::BackendUnavailable(m) if m.contains("no live backend")));
        assert!(f.sleeper.slept().is_empty());
    }
}
