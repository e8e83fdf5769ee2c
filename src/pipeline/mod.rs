pub mod matcher;
pub mod scraper;

pub use matcher::{JobMatcher, KeywordMatcher};
pub use scraper::{FeedScraper, JobScraper, JobSource};

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::api::jobs::PipelineRunRequest;
use crate::sheet::{JobRecord, SheetError, SheetStore};
use crate::status::{JobStatus, Stage};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A scrape target could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Scraping failed: {0}")]
    Scrape(String),

    #[error(transparent)]
    Sheet(#[from] SheetError),

    #[error("{stage} stage timed out after {secs}s")]
    Timeout { stage: Stage, secs: u64 },
}

/// Runs one scrape, match and persist cycle.
///
/// Holds no lock of its own: callers must make sure only one run is active.
pub struct Pipeline {
    scraper: Arc<dyn JobScraper>,
    matcher: Arc<dyn JobMatcher>,
    sheet: Arc<dyn SheetStore>,
    stage_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        scraper: Arc<dyn JobScraper>,
        matcher: Arc<dyn JobMatcher>,
        sheet: Arc<dyn SheetStore>,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            scraper,
            matcher,
            sheet,
            stage_timeout,
        }
    }

    /// Bound an external call by the stage timeout
    async fn bounded<T, F>(&self, stage: Stage, call: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        tokio::time::timeout(self.stage_timeout, call)
            .await
            .map_err(|_| PipelineError::Timeout {
                stage,
                secs: self.stage_timeout.as_secs(),
            })?
    }

    /// Execute the pipeline, reporting progress through `on_progress`.
    ///
    /// Progress values are strictly increasing and reach 100 on success.
    /// Returns the records appended to the sheet. Rows already appended are
    /// kept if a later step fails.
    pub async fn run<F>(
        &self,
        run_id: &str,
        request: &PipelineRunRequest,
        mut on_progress: F,
    ) -> Result<Vec<JobRecord>, PipelineError>
    where
        F: FnMut(&JobStatus) + Send,
    {
        let max_jobs = request.max_jobs as usize;
        let mut status = JobStatus::started(run_id);

        // scraping: 0 -> 40
        status.advance(Stage::Scraping, 5, format!("Scraping up to {} jobs", max_jobs));
        on_progress(&status);

        let mut found = self
            .bounded(Stage::Scraping, self.scraper.scrape(max_jobs))
            .await?;
        found.truncate(max_jobs);
        status.jobs_found = found.len();
        status.advance(Stage::Scraping, 40, format!("Found {} jobs", found.len()));
        on_progress(&status);
        info!("Run {}: scraped {} jobs", run_id, found.len());

        // matching: 40 -> 80
        status.advance(Stage::Matching, 45, format!("Matching {} jobs", found.len()));
        on_progress(&status);

        let mut matched = self
            .bounded(Stage::Matching, self.matcher.filter(found))
            .await?;
        matched.truncate(max_jobs);
        status.jobs_matched = matched.len();
        status.advance(Stage::Matching, 80, format!("Matched {} jobs", matched.len()));
        on_progress(&status);
        info!("Run {}: {} jobs matched", run_id, matched.len());

        // persisting: 80 -> 100
        status.advance(Stage::Persisting, 85, "Preparing jobs for the sheet");
        on_progress(&status);

        let to_save = if request.skip_duplicates {
            let existing = self
                .bounded(Stage::Persisting, async {
                    self.sheet.read_all().await.map_err(PipelineError::from)
                })
                .await?;
            let before = matched.len();
            let fresh = skip_known(existing, matched);
            debug!(
                "Run {}: dropped {} duplicate jobs",
                run_id,
                before - fresh.len()
            );
            fresh
        } else {
            matched
        };

        status.advance(Stage::Persisting, 90, format!("Saving {} jobs", to_save.len()));
        on_progress(&status);

        let written = self
            .bounded(Stage::Persisting, async {
                self.sheet
                    .append_records(&to_save)
                    .await
                    .map_err(PipelineError::from)
            })
            .await?;

        status.advance(Stage::Persisting, 100, format!("Saved {} jobs", written));
        on_progress(&status);
        info!("Run {}: appended {} rows", run_id, written);

        Ok(to_save)
    }
}

/// Drop candidates whose key is already stored or repeated within the batch.
fn skip_known(existing: Vec<JobRecord>, candidates: Vec<JobRecord>) -> Vec<JobRecord> {
    let mut seen: HashSet<String> = existing.iter().map(JobRecord::key).collect();
    candidates
        .into_iter()
        .filter(|r| seen.insert(r.key()))
        .collect()
}
