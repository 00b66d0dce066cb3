//! Import job polling
//!
//! One poll task per outstanding job. The task moves through
//! `Started -> Polling -> Finished` and stops after the first terminal
//! state, or when its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::models::{ImportJob, ImportState, JobId};
use crate::api::ImportService;

use super::error::{ImportError, ImportResult};
use super::record::{RepositoryCollection, RepositoryKey};

/// Lifecycle of one poll task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Started,
    Polling,
    Finished(ImportState),
    Stopped,
}

/// Owner's handle to a running poll task
#[derive(Debug)]
pub struct PollHandle {
    job_id: JobId,
    cancel: CancellationToken,
    phase: watch::Receiver<PollPhase>,
    task: JoinHandle<ImportResult<ImportState>>,
}

impl PollHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn phase(&self) -> PollPhase {
        *self.phase.borrow()
    }

    /// Stop polling; the record keeps whatever state was last applied
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the terminal state reported by the backend
    pub async fn wait(self) -> ImportResult<ImportState> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ImportError::Cancelled),
            Err(e) => Err(ImportError::Backend(anyhow::anyhow!(
                "Poll task for job {} panicked: {}",
                self.job_id,
                e
            ))),
        }
    }

    /// Like [`wait`](Self::wait), but a `FAILED` job is an error
    pub async fn wait_for_success(self) -> ImportResult<()> {
        let job_id = self.job_id;
        match self.wait().await? {
            ImportState::Failed => Err(ImportError::JobFailed { job_id }),
            _ => Ok(()),
        }
    }
}

/// Starts poll tasks that feed job status back into the repository records
#[derive(Clone)]
pub struct JobPoller {
    imports: Arc<dyn ImportService>,
    records: RepositoryCollection,
    interval: Duration,
    max_errors: u32,
}

impl JobPoller {
    pub fn new(
        imports: Arc<dyn ImportService>,
        records: RepositoryCollection,
        interval: Duration,
        max_errors: u32,
    ) -> Self {
        Self {
            imports,
            records,
            interval,
            max_errors: max_errors.max(1),
        }
    }

    /// Start polling `job`. Its initial status is applied right away.
    pub fn spawn(&self, job: ImportJob, cancel: CancellationToken) -> PollHandle {
        let job_id = job.id;
        let (phase_tx, phase_rx) = watch::channel(PollPhase::Started);
        let poller = self.clone();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let result = poller.run(job, &task_cancel, &phase_tx).await;
            // Marks the poll as done for the owner's registry
            task_cancel.cancel();
            let final_phase = match &result {
                Ok(state) => PollPhase::Finished(*state),
                Err(_) => PollPhase::Stopped,
            };
            let _ = phase_tx.send(final_phase);
            result
        });

        PollHandle {
            job_id,
            cancel,
            phase: phase_rx,
            task,
        }
    }

    async fn run(
        &self,
        job: ImportJob,
        cancel: &CancellationToken,
        phase: &watch::Sender<PollPhase>,
    ) -> ImportResult<ImportState> {
        let job_id = job.id;
        let target = job
            .latest()
            .map(|r| RepositoryKey::new(&r.owner, &r.repo_name));

        if let Some(state) = self.apply(&job, cancel) {
            if state.is_terminal() {
                return Ok(state);
            }
        }

        let _ = phase.send(PollPhase::Polling);
        debug!(job_id, interval = ?self.interval, "Polling import job");

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(job_id, "Import job polling cancelled");
                    return Err(ImportError::Cancelled);
                }
                _ = ticker.tick() => {}
            }

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(job_id, "Import job polling cancelled");
                    return Err(ImportError::Cancelled);
                }
                response = self.imports.query_import(job_id) => response,
            };

            match response {
                Ok(job) => {
                    failures = 0;
                    let applied = self.apply(&job, cancel);
                    if cancel.is_cancelled() {
                        debug!(job_id, "Import job polling cancelled");
                        return Err(ImportError::Cancelled);
                    }
                    if let Some(state) = applied {
                        if state.is_terminal() {
                            info!(job_id, state = %state, "Import job finished");
                            return Ok(state);
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(job_id, failures, error = %e, "Failed to query import job");
                    if failures >= self.max_errors {
                        if let Some(key) = &target {
                            let message = format!("{:#}", e);
                            self.records
                                .update(key, |r| r.last_error = Some(message.clone()));
                        }
                        return Err(ImportError::PollAborted {
                            job_id,
                            attempts: failures,
                        });
                    }
                }
            }
        }
    }

    /// Write the reported status into the matching record unless the poll
    /// was cancelled; returns the reported state
    fn apply(&self, job: &ImportJob, cancel: &CancellationToken) -> Option<ImportState> {
        let result = job.latest()?;
        if !self
            .records
            .apply_job_result_if(result, || !cancel.is_cancelled())
        {
            debug!(
                job_id = job.id,
                owner = %result.owner,
                repo = %result.repo_name,
                "No live repository for import job, dropping update"
            );
        }
        Some(result.state)
    }
}
