use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::api::jobs::PipelineRunRequest;
use crate::pipeline::Pipeline;
use crate::status::{JobStatus, JobStatusStore};

/// A run accepted by the API, waiting for the worker
#[derive(Debug)]
pub struct RunTicket {
    pub run_id: String,
    pub request: PipelineRunRequest,
}

/// Sending half of the run queue
#[derive(Clone)]
pub struct RunQueue {
    tx: mpsc::Sender<RunTicket>,
}

impl RunQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RunTicket>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Hand a run to the worker without waiting.
    pub fn submit(&self, ticket: RunTicket) -> Result<(), String> {
        self.tx.try_send(ticket).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => "run queue is full".to_string(),
            mpsc::error::TrySendError::Closed(_) => "run worker is not running".to_string(),
        })
    }
}

/// Background worker executing queued pipeline runs.
///
/// Every outcome of a run, including a panic, ends up in the status store
/// as a terminal status which is then scheduled for expiry.
pub struct RunWorker {
    pipeline: Arc<Pipeline>,
    statuses: JobStatusStore,
    retention: Duration,
}

impl RunWorker {
    pub fn new(pipeline: Arc<Pipeline>, statuses: JobStatusStore, retention: Duration) -> Self {
        Self {
            pipeline,
            statuses,
            retention,
        }
    }

    /// Consume tickets until the queue closes or shutdown is signaled.
    ///
    /// A run in progress is finished before the shutdown signal is observed.
    pub async fn run(
        &self,
        mut tickets: mpsc::Receiver<RunTicket>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!("Run worker started");

        loop {
            tokio::select! {
                ticket = tickets.recv() => match ticket {
                    Some(ticket) => self.execute(ticket).await,
                    None => {
                        info!("Run queue closed, worker exiting");
                        break;
                    }
                },
                _ = shutdown_rx.changed() => {
                    info!("Run worker received shutdown signal");
                    break;
                }
            }
        }

        // Anything still queued was accepted but will never run
        tickets.close();
        while let Ok(ticket) = tickets.try_recv() {
            warn!("Dropping queued run {} on shutdown", ticket.run_id);
            self.finish(&ticket.run_id, |last| {
                last.fail("service shut down before the run started")
            });
        }
    }

    /// Run one pipeline to a terminal status.
    pub async fn execute(&self, ticket: RunTicket) {
        let RunTicket { run_id, request } = ticket;
        info!(
            "Starting run {}: max_jobs={}, skip_duplicates={}",
            run_id, request.max_jobs, request.skip_duplicates
        );

        let pipeline = self.pipeline.clone();
        let statuses = self.statuses.clone();
        let task_run_id = run_id.clone();

        // Own task so a panic inside a stage is caught here
        let handle = tokio::spawn(async move {
            pipeline
                .run(&task_run_id, &request, |status| {
                    statuses.update(&task_run_id, status.clone());
                })
                .await
        });

        match handle.await {
            Ok(Ok(saved)) => {
                info!("Run {} completed: {} jobs saved", run_id, saved.len());
                self.finish(&run_id, |last| {
                    let message = format!(
                        "Pipeline completed: {} new jobs saved ({} found, {} matched)",
                        saved.len(),
                        last.jobs_found,
                        last.jobs_matched
                    );
                    last.complete(message)
                });
            }
            Ok(Err(e)) => {
                error!("Run {} failed: {}", run_id, e);
                self.finish(&run_id, |last| last.fail(e.to_string()));
            }
            Err(e) => {
                error!("Run {} task aborted: {:?}", run_id, e);
                self.finish(&run_id, |last| {
                    last.fail(format!("pipeline task aborted: {}", e))
                });
            }
        }
    }

    fn finish(&self, run_id: &str, terminal: impl FnOnce(JobStatus) -> JobStatus) {
        let Some(last) = self.statuses.get(run_id) else {
            debug!("Run {} is no longer tracked, dropping its final status", run_id);
            return;
        };
        if self.statuses.update(run_id, terminal(last)) {
            self.statuses.expire(run_id, self.retention);
        }
    }
}
