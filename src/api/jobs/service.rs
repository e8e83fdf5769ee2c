use std::sync::Arc;
use std::time::Duration;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::dto::{JobsListResponse, StartRunResponse, StepResult, ValidationReport};
use super::models::{JobsConfig, PipelineRunRequest};
use crate::api::auth::{AdminDirectory, Caller};
use crate::api::validation::ErrorResponse;
use crate::sheet::SheetStore;
use crate::status::{JobStatus, JobStatusStore};
use crate::worker::{RunQueue, RunTicket};

/// Service-level errors
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No caller identity on the request
    #[error("Missing caller identity")]
    Unauthorized,

    /// Caller is not an admin
    #[error("Admin access required")]
    Forbidden,

    /// A run is already in flight
    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error, message) = match self {
            ServiceError::Unauthorized => ("Unauthorized", self.to_string()),
            ServiceError::Forbidden => ("Forbidden", self.to_string()),
            ServiceError::Conflict(msg) => ("Conflict", msg.clone()),
            ServiceError::InternalError(msg) => {
                error!("Internal error: {}", msg);
                ("Failed to process request", msg.clone())
            }
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: error.to_string(),
            fields: serde_json::json!({ "message": message }),
        })
    }
}

/// Admin operations over the job pipeline
pub struct JobsService {
    sheet: Arc<dyn SheetStore>,
    statuses: JobStatusStore,
    queue: RunQueue,
    admins: Arc<dyn AdminDirectory>,
    config: JobsConfig,
    retention: Duration,
}

impl JobsService {
    pub fn new(
        sheet: Arc<dyn SheetStore>,
        statuses: JobStatusStore,
        queue: RunQueue,
        admins: Arc<dyn AdminDirectory>,
        config: JobsConfig,
        retention: Duration,
    ) -> Self {
        Self {
            sheet,
            statuses,
            queue,
            admins,
            config,
            retention,
        }
    }

    async fn authorize(&self, caller: &Caller) -> Result<(), ServiceError> {
        if self.admins.is_admin(&caller.user_id).await {
            Ok(())
        } else {
            warn!("Service: Rejected non-admin caller {}", caller.user_id);
            Err(ServiceError::Forbidden)
        }
    }

    /// List every job stored in the sheet
    pub async fn list_jobs(&self, caller: &Caller) -> Result<JobsListResponse, ServiceError> {
        self.authorize(caller).await?;

        let jobs = self
            .sheet
            .read_all()
            .await
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;

        info!("Service: Listed {} jobs", jobs.len());
        Ok(JobsListResponse {
            count: jobs.len(),
            jobs,
        })
    }

    /// Start a pipeline run in the background
    ///
    /// # Business Logic
    /// - Rejects the call if any run is still in flight
    /// - Seeds the status entry for the new run
    /// - Queues the run for the worker and returns without waiting
    ///
    /// # Returns
    /// - `Ok(StartRunResponse)` - Run accepted
    /// - `Err(ServiceError::Conflict)` - Another run is in progress
    pub async fn start_run(
        &self,
        caller: &Caller,
        request: PipelineRunRequest,
    ) -> Result<StartRunResponse, ServiceError> {
        self.authorize(caller).await?;

        let run_id = format!("{}-{}", caller.user_id, Utc::now().timestamp_millis());

        if let Err(busy) = self.statuses.try_begin(&run_id, JobStatus::started(&run_id)) {
            warn!("Service: Run requested while {} is in progress", busy.run_id);
            return Err(ServiceError::Conflict(
                "Job pipeline is already in progress".to_string(),
            ));
        }

        let ticket = RunTicket {
            run_id: run_id.clone(),
            request,
        };
        if let Err(reason) = self.queue.submit(ticket) {
            let failed = JobStatus::started(&run_id).fail(reason.clone());
            if self.statuses.update(&run_id, failed) {
                self.statuses.expire(&run_id, self.retention);
            }
            return Err(ServiceError::InternalError(format!(
                "Failed to start job pipeline: {}",
                reason
            )));
        }

        info!("Service: Queued run {}", run_id);
        Ok(StartRunResponse {
            run_id,
            message: "Job pipeline started".to_string(),
        })
    }

    pub async fn status(&self, caller: &Caller) -> Result<JobStatus, ServiceError> {
        self.authorize(caller).await?;
        Ok(self.statuses.latest())
    }

    /// Check the sheet connection and header row.
    ///
    /// Failures are reported in the body; only authorization errors fail the call.
    pub async fn validate_connections(
        &self,
        caller: &Caller,
    ) -> Result<ValidationReport, ServiceError> {
        self.authorize(caller).await?;

        let connection = match self.sheet.validate_connection().await {
            Ok(()) => StepResult::passed(),
            Err(e) => {
                warn!("Service: Sheet connection check failed: {}", e);
                StepResult::failed(e.to_string())
            }
        };

        let headers = if !connection.ok {
            StepResult::failed("skipped: sheet connection failed")
        } else {
            match self.sheet.initialize_headers().await {
                Ok(wrote) => {
                    if wrote {
                        info!("Service: Initialized sheet headers");
                    }
                    StepResult::passed()
                }
                Err(e) => {
                    warn!("Service: Header initialization failed: {}", e);
                    StepResult::failed(e.to_string())
                }
            }
        };

        Ok(ValidationReport {
            success: connection.ok && headers.ok,
            connection,
            headers,
        })
    }

    pub async fn config(&self, caller: &Caller) -> Result<JobsConfig, ServiceError> {
        self.authorize(caller).await?;
        Ok(self.config.clone())
    }

    /// Drop every finished status. Meant for testing and recovery.
    ///
    /// A run still in flight keeps its status, so it stays the only run.
    pub async fn clear_status(&self, caller: &Caller) -> Result<(), ServiceError> {
        self.authorize(caller).await?;
        let removed = self.statuses.clear();
        warn!("Service: {} job statuses cleared by {}", removed, caller.user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::StaticAdminDirectory;
    use crate::pipeline::testing::posting;
    use crate::sheet::MemorySheetStore;
    use crate::status::Stage;
    use tokio::sync::mpsc;

    fn admin() -> Caller {
        Caller {
            user_id: "admin".to_string(),
        }
    }

    fn visitor() -> Caller {
        Caller {
            user_id: "visitor".to_string(),
        }
    }

    struct Fixture {
        service: JobsService,
        sheet: Arc<MemorySheetStore>,
        statuses: JobStatusStore,
        tickets: mpsc::Receiver<RunTicket>,
    }

    fn fixture(sheet: MemorySheetStore) -> Fixture {
        let sheet = Arc::new(sheet);
        let statuses = JobStatusStore::new();
        let (queue, tickets) = RunQueue::channel(4);
        let service = JobsService::new(
            sheet.clone(),
            statuses.clone(),
            queue,
            Arc::new(StaticAdminDirectory::new(vec!["admin".to_string()])),
            JobsConfig::new(
                vec!["tailor".to_string()],
                "Remote".to_string(),
                vec!["board".to_string()],
            ),
            Duration::from_secs(3600),
        );
        Fixture {
            service,
            sheet,
            statuses,
            tickets,
        }
    }

    #[tokio::test]
    async fn non_admin_cannot_list_jobs_and_sheet_is_untouched() {
        let f = fixture(MemorySheetStore::new());
        // an unreachable sheet would turn any read into an internal error
        f.sheet.set_unreachable(true);

        assert!(matches!(
            f.service.list_jobs(&visitor()).await,
            Err(ServiceError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn every_operation_requires_admin() {
        let f = fixture(MemorySheetStore::new());
        let v = visitor();

        assert!(matches!(
            f.service.start_run(&v, PipelineRunRequest::default()).await,
            Err(ServiceError::Forbidden)
        ));
        assert!(matches!(
            f.service.status(&v).await,
            Err(ServiceError::Forbidden)
        ));
        assert!(matches!(
            f.service.validate_connections(&v).await,
            Err(ServiceError::Forbidden)
        ));
        assert!(matches!(
            f.service.config(&v).await,
            Err(ServiceError::Forbidden)
        ));
        assert!(matches!(
            f.service.clear_status(&v).await,
            Err(ServiceError::Forbidden)
        ));
        assert!(!f.statuses.any_running());
    }

    #[tokio::test]
    async fn list_jobs_returns_records_and_count() {
        let f = fixture(MemorySheetStore::with_records(&[posting(1), posting(2)]));
        let listed = f.service.list_jobs(&admin()).await.unwrap();
        assert_eq!(listed.count, 2);
        assert_eq!(listed.jobs[0].url, "https://jobs.example.com/1");
    }

    #[tokio::test]
    async fn list_jobs_wraps_sheet_errors() {
        let f = fixture(MemorySheetStore::new());
        f.sheet.set_unreachable(true);
        assert!(matches!(
            f.service.list_jobs(&admin()).await,
            Err(ServiceError::InternalError(_))
        ));
    }

    #[tokio::test]
    async fn start_run_seeds_status_and_queues_ticket() {
        let mut f = fixture(MemorySheetStore::new());
        let started = f
            .service
            .start_run(
                &admin(),
                PipelineRunRequest {
                    max_jobs: 10,
                    skip_duplicates: false,
                },
            )
            .await
            .unwrap();

        assert!(started.run_id.starts_with("admin-"));
        let status = f.statuses.latest();
        assert!(status.is_running);
        assert_eq!(status.stage, Stage::Scraping);
        assert_eq!(status.progress, 0);

        let ticket = f.tickets.try_recv().unwrap();
        assert_eq!(ticket.run_id, started.run_id);
        assert_eq!(ticket.request.max_jobs, 10);
    }

    #[tokio::test]
    async fn second_start_conflicts_without_side_effects() {
        let mut f = fixture(MemorySheetStore::new());
        let first = f
            .service
            .start_run(&admin(), PipelineRunRequest::default())
            .await
            .unwrap();
        let before = f.statuses.latest();

        let second = f.service.start_run(&admin(), PipelineRunRequest::default()).await;

        assert!(matches!(second, Err(ServiceError::Conflict(_))));
        assert_eq!(f.statuses.latest(), before);
        assert_eq!(f.statuses.len(), 1);
        assert_eq!(f.tickets.try_recv().unwrap().run_id, first.run_id);
        assert!(f.tickets.try_recv().is_err());
    }

    #[tokio::test]
    async fn start_run_fails_when_worker_is_gone() {
        let f = fixture(MemorySheetStore::new());
        drop(f.tickets);

        let err = f
            .service
            .start_run(&admin(), PipelineRunRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InternalError(_)));
        let status = f.statuses.latest();
        assert_eq!(status.stage, Stage::Error);
        assert!(!f.statuses.any_running());
    }

    #[tokio::test]
    async fn validate_connections_reports_steps_as_data() {
        let f = fixture(MemorySheetStore::new());

        let report = f.service.validate_connections(&admin()).await.unwrap();
        assert!(report.success);
        assert_eq!(report.headers, StepResult::passed());
        assert_eq!(f.sheet.header_writes(), 1);

        f.service.validate_connections(&admin()).await.unwrap();
        assert_eq!(f.sheet.header_writes(), 1);

        f.sheet.set_unreachable(true);
        let report = f.service.validate_connections(&admin()).await.unwrap();
        assert!(!report.success);
        assert!(!report.connection.ok);
        assert!(report.connection.error.unwrap().contains("unreachable"));
        assert!(!report.headers.ok);
    }

    #[tokio::test]
    async fn clear_status_returns_to_idle() {
        let f = fixture(MemorySheetStore::new());
        f.statuses.set("done", JobStatus::started("done").complete("finished"));

        f.service.clear_status(&admin()).await.unwrap();

        assert_eq!(f.service.status(&admin()).await.unwrap(), JobStatus::idle());
    }

    #[tokio::test]
    async fn clear_status_during_a_run_keeps_it_exclusive() {
        let mut f = fixture(MemorySheetStore::new());
        let first = f
            .service
            .start_run(&admin(), PipelineRunRequest::default())
            .await
            .unwrap();

        f.service.clear_status(&admin()).await.unwrap();
        let second = f
            .service
            .start_run(&admin(), PipelineRunRequest::default())
            .await;

        assert!(matches!(second, Err(ServiceError::Conflict(_))));
        let status = f.service.status(&admin()).await.unwrap();
        assert_eq!(status.run_id.as_deref(), Some(first.run_id.as_str()));
        assert!(status.is_running);
        assert_eq!(f.tickets.try_recv().unwrap().run_id, first.run_id);
        assert!(f.tickets.try_recv().is_err());
    }

    #[tokio::test]
    async fn config_is_static() {
        let f = fixture(MemorySheetStore::new());
        let config = f.service.config(&admin()).await.unwrap();
        assert_eq!(config.max_jobs_limit, 200);
        assert_eq!(config.default_max_jobs, 50);
        assert_eq!(config.sources, ["board"]);
    }
}
