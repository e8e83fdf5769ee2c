use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Phase of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scraping,
    Matching,
    Persisting,
    Completed,
    Error,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Scraping => "scraping",
            Stage::Matching => "matching",
            Stage::Persisting => "persisting",
            Stage::Completed => "completed",
            Stage::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live state of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub is_running: bool,
    pub progress: u8,
    pub stage: Stage,
    pub message: String,
    pub jobs_found: usize,
    pub jobs_matched: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    /// Status reported when nothing is tracked.
    pub fn idle() -> Self {
        Self {
            run_id: None,
            is_running: false,
            progress: 0,
            stage: Stage::Completed,
            message: "No jobs running".to_string(),
            jobs_found: 0,
            jobs_matched: 0,
            error: None,
            started_at: None,
            updated_at: None,
        }
    }

    /// Initial status of a freshly started run.
    pub fn started(run_id: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: Some(run_id.to_string()),
            is_running: true,
            progress: 0,
            stage: Stage::Scraping,
            message: "Starting job pipeline".to_string(),
            jobs_found: 0,
            jobs_matched: 0,
            error: None,
            started_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Move to a non-terminal stage at the given progress.
    pub fn advance(&mut self, stage: Stage, progress: u8, message: impl Into<String>) {
        debug_assert!(!stage.is_terminal());
        self.stage = stage;
        self.progress = progress.min(100);
        self.message = message.into();
        self.is_running = true;
        self.updated_at = Some(Utc::now());
    }

    pub fn complete(mut self, message: impl Into<String>) -> Self {
        self.is_running = false;
        self.stage = Stage::Completed;
        self.progress = 100;
        self.message = message.into();
        self.error = None;
        self.updated_at = Some(Utc::now());
        self
    }

    /// Terminal failure. Progress and counters keep their last values.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        let error = error.into();
        self.is_running = false;
        self.stage = Stage::Error;
        self.message = format!("Pipeline failed: {}", error);
        self.error = Some(error);
        self.updated_at = Some(Utc::now());
        self
    }
}

/// Returned by [`JobStatusStore::try_begin`] when a run is already live
#[derive(Debug, Clone)]
pub struct RunInProgress {
    pub run_id: String,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, JobStatus>,
    /// Run ids in insertion order; the last one is the current run
    order: Vec<String>,
}

/// Process-wide tracking of in-flight and recently finished runs.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone, Default)]
pub struct JobStatusStore {
    inner: Arc<Mutex<Inner>>,
}

impl JobStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or overwrite the status of a run.
    #[cfg(test)]
    pub fn set(&self, run_id: &str, status: JobStatus) {
        let mut inner = self.lock();
        if inner.entries.insert(run_id.to_string(), status).is_none() {
            inner.order.push(run_id.to_string());
        }
    }

    /// Overwrite the status of a tracked run, keeping its seeded start time.
    ///
    /// Returns `false` and changes nothing if the run is no longer tracked,
    /// so a cleared or expired run cannot come back.
    pub fn update(&self, run_id: &str, mut status: JobStatus) -> bool {
        let mut inner = self.lock();
        match inner.entries.get_mut(run_id) {
            Some(entry) => {
                if entry.started_at.is_some() {
                    status.started_at = entry.started_at;
                }
                *entry = status;
                true
            }
            None => false,
        }
    }

    /// Atomically check the single-run slot and seed a new entry.
    pub fn try_begin(&self, run_id: &str, status: JobStatus) -> Result<(), RunInProgress> {
        let mut inner = self.lock();
        if let Some((id, _)) = inner.entries.iter().find(|(_, s)| s.is_running) {
            return Err(RunInProgress { run_id: id.clone() });
        }
        inner.entries.insert(run_id.to_string(), status);
        inner.order.retain(|id| id != run_id);
        inner.order.push(run_id.to_string());
        Ok(())
    }

    pub fn get(&self, run_id: &str) -> Option<JobStatus> {
        self.lock().entries.get(run_id).cloned()
    }

    /// Status of the most recently started run still tracked, or idle.
    pub fn latest(&self) -> JobStatus {
        let inner = self.lock();
        inner
            .order
            .last()
            .and_then(|id| inner.entries.get(id))
            .cloned()
            .unwrap_or_else(JobStatus::idle)
    }

    pub fn any_running(&self) -> bool {
        self.lock().entries.values().any(|s| s.is_running)
    }

    pub fn remove(&self, run_id: &str) -> Option<JobStatus> {
        let mut inner = self.lock();
        inner.order.retain(|id| id != run_id);
        inner.entries.remove(run_id)
    }

    /// Schedule removal of a run's entry once `after` has elapsed.
    ///
    /// Must be called from within a tokio runtime. Pending removals are
    /// dropped with the runtime.
    pub fn expire(&self, run_id: &str, after: Duration) {
        let store = self.clone();
        let run_id = run_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if store.remove(&run_id).is_some() {
                debug!("Expired status for run {}", run_id);
            }
        });
    }

    /// Drop every finished entry. A live run keeps its entry and the slot.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, s| s.is_running);
        let Inner { entries, order } = &mut *inner;
        order.retain(|id| entries.contains_key(id));
        before - entries.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }
}
