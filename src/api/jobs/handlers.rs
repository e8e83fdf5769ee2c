use actix_web::{
    delete, get, post,
    web::{scope, Data, ServiceConfig},
    HttpResponse,
};
use actix_web_validator::Json;

use super::dto::MessageResponse;
use super::models::PipelineRunRequest;
use super::service::{JobsService, ServiceError};
use crate::api::auth::Caller;

#[get("")]
async fn list_jobs(
    service: Data<JobsService>,
    caller: Caller,
) -> Result<HttpResponse, ServiceError> {
    let jobs = service.list_jobs(&caller).await?;
    Ok(HttpResponse::Ok().json(jobs))
}

#[post("/runs")]
async fn start_run(
    service: Data<JobsService>,
    caller: Caller,
    request: Json<PipelineRunRequest>,
) -> Result<HttpResponse, ServiceError> {
    let started = service.start_run(&caller, request.into_inner()).await?;
    Ok(HttpResponse::Accepted().json(started))
}

#[get("/status")]
async fn get_status(
    service: Data<JobsService>,
    caller: Caller,
) -> Result<HttpResponse, ServiceError> {
    Ok(HttpResponse::Ok().json(service.status(&caller).await?))
}

#[delete("/status")]
async fn clear_status(
    service: Data<JobsService>,
    caller: Caller,
) -> Result<HttpResponse, ServiceError> {
    service.clear_status(&caller).await?;
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Job status cleared".to_string(),
    }))
}

#[post("/validate")]
async fn validate_connections(
    service: Data<JobsService>,
    caller: Caller,
) -> Result<HttpResponse, ServiceError> {
    Ok(HttpResponse::Ok().json(service.validate_connections(&caller).await?))
}

#[get("/config")]
async fn get_config(
    service: Data<JobsService>,
    caller: Caller,
) -> Result<HttpResponse, ServiceError> {
    Ok(HttpResponse::Ok().json(service.config(&caller).await?))
}

pub fn jobs_config(config: &mut ServiceConfig) {
    config.service(
        scope("/api/jobs")
            .service(list_jobs)
            .service(start_run)
            .service(get_status)
            .service(clear_status)
            .service(validate_connections)
            .service(get_config),
    );
}
