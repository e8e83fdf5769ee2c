use std::sync::Arc;

use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;
use tracing::error;

use crate::sheet::SheetStore;

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    sheet: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn check_sheet(
    sheet: &dyn SheetStore,
    ok: &'static str,
    failed: &'static str,
) -> HttpResponse {
    match sheet.validate_connection().await {
        Ok(()) => HttpResponse::Ok().json(HealthResponse {
            status: ok,
            sheet: "connected",
            error: None,
        }),
        Err(e) => {
            error!("Sheet check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(HealthResponse {
                status: failed,
                sheet: "disconnected",
                error: Some(e.to_string()),
            })
        }
    }
}

/// Health check endpoint
///
/// General health check including sheet connectivity.
/// Use for load balancers and uptime monitors.
#[get("/health")]
async fn health_check(sheet: web::Data<Arc<dyn SheetStore>>) -> impl Responder {
    check_sheet(sheet.get_ref().as_ref(), "healthy", "unhealthy").await
}

/// Readiness check endpoint
///
/// Returns 503 while the sheet service is unavailable; recovers on its own.
#[get("/ready")]
async fn readiness_check(sheet: web::Data<Arc<dyn SheetStore>>) -> impl Responder {
    check_sheet(sheet.get_ref().as_ref(), "ready", "not_ready").await
}

/// Liveness check endpoint
///
/// Simple check that the process is alive. Does not check dependencies.
#[get("/live")]
async fn liveness_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "alive",
        sheet: "not_checked",
        error: None,
    })
}

pub fn health_config(config: &mut web::ServiceConfig) {
    config
        .service(health_check)
        .service(readiness_check)
        .service(liveness_check);
}
