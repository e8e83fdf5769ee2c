use serde::Serialize;

use crate::sheet::JobRecord;

/// Response for listing stored jobs
#[derive(Serialize)]
pub struct JobsListResponse {
    pub jobs: Vec<JobRecord>,
    pub count: usize,
}

/// Response for a started run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    pub run_id: String,
    pub message: String,
}

/// Outcome of one diagnostic step
#[derive(Debug, Serialize, PartialEq)]
pub struct StepResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn passed() -> Self {
        Self { ok: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Response for the connection check
#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub success: bool,
    pub connection: StepResult,
    pub headers: StepResult,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}
