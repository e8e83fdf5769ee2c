use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::PipelineError;
use crate::sheet::JobRecord;

/// Produces candidate job postings, at most `max_jobs` of them
#[async_trait]
pub trait JobScraper: Send + Sync {
    async fn scrape(&self, max_jobs: usize) -> Result<Vec<JobRecord>, PipelineError>;
}

/// Named job feed endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct JobSource {
    pub name: String,
    pub url: String,
}

#[derive(Deserialize)]
struct FeedEntry {
    url: String,
    title: String,
    #[serde(default)]
    company: String,
    #[serde(default)]
    location: String,
    #[serde(default, alias = "snippet")]
    description: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeedBody {
    List(Vec<FeedEntry>),
    Wrapped { jobs: Vec<FeedEntry> },
}

impl FeedBody {
    fn into_entries(self) -> Vec<FeedEntry> {
        match self {
            FeedBody::List(entries) | FeedBody::Wrapped { jobs: entries } => entries,
        }
    }
}

/// Scraper over JSON job feeds.
///
/// Feeds are fetched concurrently; results keep source order. A failing
/// source is skipped unless every source fails.
pub struct FeedScraper {
    client: reqwest::Client,
    sources: Vec<JobSource>,
}

impl FeedScraper {
    pub fn new(sources: Vec<JobSource>) -> Self {
        Self {
            client: reqwest::Client::new(),
            sources,
        }
    }

    async fn fetch(&self, source: &JobSource) -> Result<Vec<JobRecord>, PipelineError> {
        debug!("Fetching job feed {} ({})", source.name, source.url);

        let resp = self
            .client
            .get(&source.url)
            .send()
            .await
            .map_err(|e| PipelineError::Connection(format!("{}: {}", source.name, e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::Scrape(format!(
                "{} returned HTTP {}",
                source.name,
                status.as_u16()
            )));
        }

        let body: FeedBody = resp
            .json()
            .await
            .map_err(|e| PipelineError::Scrape(format!("{}: invalid feed: {}", source.name, e)))?;

        let now = Utc::now();
        Ok(body
            .into_entries()
            .into_iter()
            .filter(|e| !e.url.trim().is_empty())
            .map(|e| JobRecord {
                url: e.url.trim().to_string(),
                title: e.title,
                company: e.company,
                location: e.location,
                description: e.description,
                source: source.name.clone(),
                discovered_at: now,
                matched: false,
            })
            .collect())
    }
}

#[async_trait]
impl JobScraper for FeedScraper {
    async fn scrape(&self, max_jobs: usize) -> Result<Vec<JobRecord>, PipelineError> {
        if self.sources.is_empty() {
            warn!("No job sources configured, nothing to scrape");
            return Ok(Vec::new());
        }

        let results = join_all(self.sources.iter().map(|s| self.fetch(s))).await;

        let mut records = Vec::new();
        let mut last_error = None;
        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(found) => {
                    info!("Source {} returned {} postings", source.name, found.len());
                    records.extend(found);
                }
                Err(e) => {
                    warn!("Source {} failed: {}", source.name, e);
                    last_error = Some(e);
                }
            }
        }

        if records.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        records.truncate(max_jobs);
        Ok(records)
    }
}
