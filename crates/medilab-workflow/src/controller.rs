//! Workflow controller
//!
//! Owns the single [`WorkflowState`] of the active run and sequences
//! Upload -> Diagnosis (-> History). The diagnosis request and the scanning
//! indicator timer run as two spawned tasks that post [`ScanTicket`]-tagged
//! events into one queue; the controller applies them in order and drops
//! any event whose ticket no longer matches the live run.
//!
//! # Workflow
//! 1. `select_image` starts a run
//! 2. `upload` stores the image and keeps its locator
//! 3. `begin_scan` spawns the request and the indicator timer
//! 4. `process_next` / `wait_for_report` apply their completions
//! 5. `download_report` hands the report to the host
//!
//! `reset` (or selecting another image) cancels both tasks, releases every
//! outstanding object URL and invalidates in-flight results.

use crate::backend::DiagnosticBackend;
use crate::config::WorkflowConfig;
use crate::error::WorkflowError;
use crate::history::{DownloadOutcome, HistoryRecord, HistoryStage, HistoryView};
use crate::stages::{DiagnosisStage, UploadStage};
use crate::state_machine::{validate_transition, WorkflowState};
use crate::types::{ImageFile, ImageLocator, RunId};
use medilab_artifact::{
    wrap_for_download, ContentHash, DownloadHandle, ObjectUrlRegistry, ReportArtifact,
    SaveTarget, SavedFile,
};
use medilab_session::{Credential, SessionGate};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Identifies one scan attempt within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScanTicket {
    run: RunId,
    attempt: u32,
}

#[derive(Debug)]
enum WorkflowEvent {
    IndicatorElapsed(ScanTicket),
    DiagnosisFinished(ScanTicket, Result<ReportArtifact, WorkflowError>),
}

/// What applying one queued event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Scanning indicator timer fired; the request may still be in flight
    IndicatorCleared,
    /// Report arrived; state is `ReportReady`
    ReportCaptured,
    /// Request failed; state is `Failed`
    ScanFailed,
    /// Event belonged to a superseded run or attempt and was ignored
    Discarded,
}

#[derive(Debug, Default)]
struct PendingTasks {
    indicator: Option<JoinHandle<()>>,
    diagnosis: Option<JoinHandle<()>>,
}

impl PendingTasks {
    fn cancel_indicator(&mut self) {
        if let Some(handle) = self.indicator.take() {
            handle.abort();
        }
    }

    fn cancel_all(&mut self) {
        self.cancel_indicator();
        if let Some(handle) = self.diagnosis.take() {
            handle.abort();
        }
    }

    fn count(&self) -> usize {
        usize::from(self.indicator.is_some()) + usize::from(self.diagnosis.is_some())
    }
}

impl Drop for PendingTasks {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Puts `fallback` back unless committed; keeps a dropped upload future
/// from leaving the run stuck in `Uploading`
struct StateGuard<'a> {
    state: &'a mut WorkflowState,
    fallback: WorkflowState,
    armed: bool,
}

impl<'a> StateGuard<'a> {
    fn enter(state: &'a mut WorkflowState, during: WorkflowState, fallback: WorkflowState) -> Self {
        *state = during;
        Self {
            state,
            fallback,
            armed: true,
        }
    }

    fn commit(mut self, to: WorkflowState) {
        *self.state = to;
        self.armed = false;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.state = self.fallback;
        }
    }
}

/// Presentation-facing view of the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowSnapshot {
    /// Live run
    pub run: RunId,
    /// Current state
    pub state: WorkflowState,
    /// Scanning indicator flag
    pub scanning: bool,
    /// Whether the image picker is enabled
    pub upload_enabled: bool,
    /// Selected file name
    pub image_name: Option<String>,
    /// Locator of the uploaded image
    pub image_url: Option<String>,
    /// A report can be downloaded
    pub report_available: bool,
    /// Content hash of the report, serialized as hex
    pub report_hash: Option<ContentHash>,
    /// Message for display
    pub message: Option<String>,
}

/// The single owner of workflow state for a session
pub struct WorkflowController<B: DiagnosticBackend> {
    config: WorkflowConfig,
    gate: SessionGate,
    upload: UploadStage<B>,
    diagnosis: Arc<DiagnosisStage<B>>,
    history: HistoryStage<B>,
    registry: ObjectUrlRegistry,

    state: WorkflowState,
    run: RunId,
    attempt: u32,
    image: Option<ImageFile>,
    locator: Option<ImageLocator>,
    report: Option<ReportArtifact>,
    failure: Option<WorkflowError>,
    scanning: bool,
    message: Option<String>,

    tasks: PendingTasks,
    events_tx: mpsc::UnboundedSender<WorkflowEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkflowEvent>,
}

impl<B: DiagnosticBackend> WorkflowController<B> {
    /// Create a controller owning `backend`
    #[must_use]
    pub fn new(backend: B, config: WorkflowConfig) -> Self {
        Self::from_shared(Arc::new(backend), config, SessionGate::new())
    }

    /// Create a controller over a shared backend with an explicit gate
    #[must_use]
    pub fn from_shared(backend: Arc<B>, config: WorkflowConfig, gate: SessionGate) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            upload: UploadStage::new(Arc::clone(&backend), gate),
            diagnosis: Arc::new(DiagnosisStage::new(
                Arc::clone(&backend),
                gate,
                config.report_mime.clone(),
            )),
            history: HistoryStage::new(backend, gate, config.report_mime.clone()),
            config,
            gate,
            registry: ObjectUrlRegistry::new(),
            state: WorkflowState::Idle,
            run: RunId::default(),
            attempt: 0,
            image: None,
            locator: None,
            report: None,
            failure: None,
            scanning: false,
            message: None,
            tasks: PendingTasks::default(),
            events_tx,
            events_rx,
        }
    }

    /// With a host object-URL registry shared with the presentation layer
    #[inline]
    #[must_use]
    pub fn with_registry(mut self, registry: ObjectUrlRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Start a new run with `image`
    ///
    /// Discards any prior run: pending tasks are cancelled, object URLs
    /// released and the previous report dropped.
    ///
    /// # Errors
    /// `WorkflowError::IllegalTransition` while uploading or scanning
    pub fn select_image(&mut self, image: ImageFile) -> Result<RunId, WorkflowError> {
        if !self.state.accepts_new_image() {
            return Err(WorkflowError::IllegalTransition {
                from: self.state,
                to: WorkflowState::ImageSelected,
            });
        }

        self.discard_run();
        tracing::info!(run = %self.run, file = image.name(), len = image.len(), "image selected");
        self.image = Some(image);
        self.state = WorkflowState::ImageSelected;
        Ok(self.run)
    }

    /// Upload the selected image
    ///
    /// On failure the run returns to `ImageSelected` with the image kept,
    /// so the same file can be retried.
    ///
    /// # Errors
    /// - `WorkflowError::IllegalTransition` unless in `ImageSelected`
    /// - `WorkflowError::AuthNotUsable` (state unchanged, nothing sent)
    /// - `WorkflowError::UploadFailed`
    pub async fn upload(&mut self, credential: &Credential) -> Result<ImageLocator, WorkflowError> {
        validate_transition(self.state, WorkflowState::Uploading)?;
        let Some(image) = self.image.as_ref() else {
            return Err(WorkflowError::IllegalTransition {
                from: self.state,
                to: WorkflowState::Uploading,
            });
        };
        if !self.gate.is_usable(credential) {
            return Err(WorkflowError::AuthNotUsable);
        }

        tracing::debug!(run = %self.run, "upload started");
        let guard = StateGuard::enter(
            &mut self.state,
            WorkflowState::Uploading,
            WorkflowState::ImageSelected,
        );

        match self.upload.upload(image, credential).await {
            Ok(locator) => {
                guard.commit(WorkflowState::Uploaded);
                self.locator = Some(locator.clone());
                self.message = None;
                Ok(locator)
            }
            Err(e) => {
                drop(guard);
                self.message = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Start (or retry) the diagnosis of the uploaded image
    ///
    /// Spawns the request and the scanning indicator timer and returns
    /// immediately; drive completion with [`process_next`](Self::process_next).
    ///
    /// # Errors
    /// - `WorkflowError::IllegalTransition` unless in `Uploaded` or `Failed`
    /// - `WorkflowError::MissingLocator` if no upload succeeded
    /// - `WorkflowError::AuthNotUsable` (state unchanged, nothing sent)
    ///
    /// # Panics
    /// Outside a Tokio runtime
    pub fn begin_scan(&mut self, credential: &Credential) -> Result<RunId, WorkflowError> {
        validate_transition(self.state, WorkflowState::Scanning)?;
        let Some(locator) = self.locator.clone() else {
            return Err(WorkflowError::MissingLocator);
        };
        if !self.gate.is_usable(credential) {
            return Err(WorkflowError::AuthNotUsable);
        }

        self.tasks.cancel_all();
        self.attempt += 1;
        let ticket = ScanTicket {
            run: self.run,
            attempt: self.attempt,
        };

        self.state = WorkflowState::Scanning;
        self.scanning = true;
        self.failure = None;
        self.message = None;
        tracing::info!(run = %self.run, attempt = self.attempt, image = %locator, "scan started");

        let indicator = self.config.scan_indicator();
        let tx = self.events_tx.clone();
        self.tasks.indicator = Some(tokio::spawn(async move {
            tokio::time::sleep(indicator).await;
            let _ = tx.send(WorkflowEvent::IndicatorElapsed(ticket));
        }));

        let stage = Arc::clone(&self.diagnosis);
        let credential = credential.clone();
        let tx = self.events_tx.clone();
        self.tasks.diagnosis = Some(tokio::spawn(async move {
            let result = stage.diagnose(&locator, &credential).await;
            let _ = tx.send(WorkflowEvent::DiagnosisFinished(ticket, result));
        }));

        Ok(self.run)
    }

    /// Wait for and apply the next queued event
    ///
    /// Returns `None` once nothing is queued and no task is pending.
    /// A diagnosis task that panics is applied as
    /// `WorkflowError::DiagnosisInterrupted`.
    pub async fn process_next(&mut self) -> Option<EventOutcome> {
        if let Ok(event) = self.events_rx.try_recv() {
            return Some(self.apply(event));
        }
        if self.tasks.count() == 0 {
            return None;
        }

        let woken = match self.tasks.diagnosis.as_mut() {
            Some(handle) => tokio::select! {
                biased;
                event = self.events_rx.recv() => Ok(event),
                joined = handle => Err(joined),
            },
            None => Ok(self.events_rx.recv().await),
        };
        let event = match woken {
            Ok(event) => event?,
            Err(joined) => {
                self.tasks.diagnosis = None;
                match joined {
                    Err(e) if e.is_panic() => {
                        tracing::error!(
                            run = %self.run,
                            attempt = self.attempt,
                            "diagnosis task panicked"
                        );
                        WorkflowEvent::DiagnosisFinished(
                            self.current_ticket(),
                            Err(WorkflowError::DiagnosisInterrupted),
                        )
                    }
                    // the task queued its result before exiting
                    _ => self.events_rx.recv().await?,
                }
            }
        };
        Some(self.apply(event))
    }

    /// Apply every already-queued event without waiting
    pub fn process_pending(&mut self) -> Vec<EventOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            outcomes.push(self.apply(event));
        }
        outcomes
    }

    /// Drive the current scan to completion
    ///
    /// # Errors
    /// The scan's failure, or `WorkflowError::NoReport` if no scan produced one
    pub async fn wait_for_report(&mut self) -> Result<&ReportArtifact, WorkflowError> {
        while self.state == WorkflowState::Scanning {
            if self.process_next().await.is_none() {
                break;
            }
        }

        match self.state {
            WorkflowState::ReportReady => self.report.as_ref().ok_or(WorkflowError::NoReport),
            WorkflowState::Failed => Err(self.failure.take().unwrap_or(WorkflowError::NoReport)),
            _ => Err(WorkflowError::NoReport),
        }
    }

    /// Object URL handle for the current report
    ///
    /// The handle is released when triggered or dropped, and revoked by
    /// `reset` / `select_image` if still outstanding.
    #[must_use]
    pub fn prepare_download(&self) -> Option<DownloadHandle> {
        if self.state != WorkflowState::ReportReady {
            return None;
        }
        let report = self.report.as_ref()?;
        Some(
            wrap_for_download(&self.registry, report.bytes().to_vec(), report.mime())
                .with_filename(&self.config.download_filename),
        )
    }

    /// Save the current report through `target`
    ///
    /// # Errors
    /// - `WorkflowError::NoReport` unless in `ReportReady`
    /// - `WorkflowError::Download` if the host fails; the URL is still released
    pub fn download_report(&mut self, target: &dyn SaveTarget) -> Result<SavedFile, WorkflowError> {
        let handle = self.prepare_download().ok_or(WorkflowError::NoReport)?;
        handle.trigger(target).map_err(|e| {
            self.message = Some(format!("Failed to process report download: {e}"));
            WorkflowError::Download(e)
        })
    }

    /// Fetch report history; never fails (see [`HistoryStage::fetch`])
    pub async fn fetch_history(&self, credential: &Credential) -> HistoryView {
        self.history.fetch(credential).await
    }

    /// Save one history record's report through `target`
    pub fn download_history_record(
        &self,
        record: &HistoryRecord,
        target: &dyn SaveTarget,
    ) -> DownloadOutcome {
        record.download(&self.registry, target, &self.config.download_filename)
    }

    /// Return to `Idle` from any state
    ///
    /// Cancels the indicator timer and the in-flight request, releases all
    /// outstanding object URLs and invalidates queued results.
    pub fn reset(&mut self) {
        let from = self.state;
        self.discard_run();
        self.state = WorkflowState::Idle;
        tracing::info!(run = %self.run, from = ?from, "workflow reset");
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Scanning indicator flag
    #[inline]
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Live run
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run
    }

    /// Selected image
    #[inline]
    #[must_use]
    pub fn image(&self) -> Option<&ImageFile> {
        self.image.as_ref()
    }

    /// Locator of the uploaded image
    #[inline]
    #[must_use]
    pub fn locator(&self) -> Option<&ImageLocator> {
        self.locator.as_ref()
    }

    /// Report of the current run
    #[inline]
    #[must_use]
    pub fn report(&self) -> Option<&ReportArtifact> {
        self.report.as_ref()
    }

    /// Message for display
    #[inline]
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Live object URLs in the registry
    #[inline]
    #[must_use]
    pub fn outstanding_object_urls(&self) -> usize {
        self.registry.outstanding()
    }

    /// Spawned tasks not yet applied or cancelled
    #[inline]
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.tasks.count()
    }

    /// Registry handles are created in
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ObjectUrlRegistry {
        &self.registry
    }

    /// Presentation snapshot
    #[must_use]
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            run: self.run,
            state: self.state,
            scanning: self.scanning,
            upload_enabled: self.state.accepts_new_image(),
            image_name: self.image.as_ref().map(|i| i.name().to_string()),
            image_url: self.locator.as_ref().map(|l| l.as_str().to_string()),
            report_available: self.report.is_some(),
            report_hash: self.report.as_ref().map(|r| *r.hash()),
            message: self.message.clone(),
        }
    }

    fn discard_run(&mut self) {
        self.tasks.cancel_all();
        let released = self.registry.revoke_all();
        if released > 0 {
            tracing::debug!(run = %self.run, released, "released object URLs of discarded run");
        }
        self.run = self.run.next();
        self.attempt = 0;
        self.image = None;
        self.locator = None;
        self.report = None;
        self.failure = None;
        self.scanning = false;
        self.message = None;
    }

    fn current_ticket(&self) -> ScanTicket {
        ScanTicket {
            run: self.run,
            attempt: self.attempt,
        }
    }

    fn apply(&mut self, event: WorkflowEvent) -> EventOutcome {
        let live = self.state == WorkflowState::Scanning;
        match event {
            WorkflowEvent::IndicatorElapsed(ticket) => {
                if ticket != self.current_ticket() || !live {
                    tracing::trace!(run = %ticket.run, "stale indicator timer ignored");
                    return EventOutcome::Discarded;
                }
                self.tasks.indicator = None;
                self.scanning = false;
                tracing::debug!(run = %self.run, "scanning indicator elapsed");
                EventOutcome::IndicatorCleared
            }
            WorkflowEvent::DiagnosisFinished(ticket, result) => {
                if ticket != self.current_ticket() || !live {
                    tracing::debug!(
                        run = %ticket.run,
                        attempt = ticket.attempt,
                        "discarding diagnosis result from superseded run"
                    );
                    return EventOutcome::Discarded;
                }
                self.tasks.diagnosis = None;
                self.tasks.cancel_indicator();
                self.scanning = false;

                match result {
                    Ok(report) => {
                        self.state = WorkflowState::ReportReady;
                        tracing::info!(run = %self.run, hash = %report.hash().short(), "report ready");
                        self.report = Some(report);
                        EventOutcome::ReportCaptured
                    }
                    Err(e) => {
                        self.state = WorkflowState::Failed;
                        tracing::warn!(run = %self.run, error = %e, "scan failed");
                        self.message = Some(e.to_string());
                        self.failure = Some(e);
                        EventOutcome::ScanFailed
                    }
                }
            }
        }
    }
}

impl<B: DiagnosticBackend> fmt::Debug for WorkflowController<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowController")
            .field("state", &self.state)
            .field("run", &self.run)
            .field("attempt", &self.attempt)
            .field("scanning", &self.scanning)
            .field("pending_tasks", &self.tasks.count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn state_guard_restores_unless_committed() {
        let mut state = WorkflowState::ImageSelected;
        {
            let _guard = StateGuard::enter(
                &mut state,
                WorkflowState::Uploading,
                WorkflowState::ImageSelected,
            );
        }
        assert_eq!(state, WorkflowState::ImageSelected);

        let guard = StateGuard::enter(
            &mut state,
            WorkflowState::Uploading,
            WorkflowState::ImageSelected,
        );
        guard.commit(WorkflowState::Uploaded);
        assert_eq!(state, WorkflowState::Uploaded);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_tasks_never_report() {
        let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
        let mut tasks = PendingTasks::default();
        tasks.indicator = Some(tokio::spawn({
            let tx = tx.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(4)).await;
                let _ = tx.send(1);
            }
        }));
        tasks.diagnosis = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(6)).await;
            let _ = tx.send(2);
        }));
        assert_eq!(tasks.count(), 2);

        tasks.cancel_all();
        assert_eq!(tasks.count(), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}
