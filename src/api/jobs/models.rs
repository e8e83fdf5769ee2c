use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::{DEFAULT_MAX_JOBS, MAX_JOBS_LIMIT};

fn default_max_jobs() -> u32 {
    DEFAULT_MAX_JOBS
}

fn default_skip_duplicates() -> bool {
    true
}

/// Caller-supplied configuration of a pipeline run
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunRequest {
    #[serde(default = "default_max_jobs")]
    #[validate(range(
        min = 1,
        max = MAX_JOBS_LIMIT,
        message = "maxJobs must be between 1 and 200"
    ))]
    pub max_jobs: u32,

    #[serde(default = "default_skip_duplicates")]
    pub skip_duplicates: bool,
}

impl Default for PipelineRunRequest {
    fn default() -> Self {
        Self {
            max_jobs: default_max_jobs(),
            skip_duplicates: default_skip_duplicates(),
        }
    }
}

/// Static search configuration exposed to the admin UI
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsConfig {
    pub keywords: Vec<String>,
    pub location: String,
    pub default_max_jobs: u32,
    pub max_jobs_limit: u32,
    pub skip_duplicates_by_default: bool,
    pub sources: Vec<String>,
}

impl JobsConfig {
    pub fn new(keywords: Vec<String>, location: String, sources: Vec<String>) -> Self {
        Self {
            keywords,
            location,
            default_max_jobs: DEFAULT_MAX_JOBS,
            max_jobs_limit: MAX_JOBS_LIMIT,
            skip_duplicates_by_default: default_skip_duplicates(),
            sources,
        }
    }
}
