use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

mod api;
mod config;
mod pipeline;
mod sheet;
mod shutdown;
mod status;
mod worker;

use crate::api::{
    auth::StaticAdminDirectory,
    health::health_config,
    jobs::{handlers::jobs_config, JobsConfig, JobsService, PipelineRunRequest},
    validation,
};
use crate::config::{Config, SheetBackend, DEFAULT_MAX_JOBS, MAX_JOBS_LIMIT};
use crate::pipeline::{FeedScraper, KeywordMatcher, Pipeline};
use crate::sheet::{GoogleSheetStore, MemorySheetStore, SheetStore};
use crate::shutdown::ShutdownCoordinator;
use crate::status::JobStatusStore;
use crate::worker::{RunQueue, RunWorker};

#[derive(Parser)]
#[command(name = "job-sync", about = "Scrapes job postings and syncs them into a sheet")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Check the sheet connection and header row, then exit
    Validate,
    /// Run the pipeline once in the foreground
    Run {
        #[arg(
            long,
            default_value_t = DEFAULT_MAX_JOBS,
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_JOBS_LIMIT))
        )]
        max_jobs: u32,
        /// Append postings even if their URL is already in the sheet
        #[arg(long)]
        allow_duplicates: bool,
    },
}

fn file_layer<S>(log_dir: &str, name: &str, level: LevelFilter) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_writer(tracing_appender::rolling::daily(log_dir, name))
        .with_ansi(false)
        .with_filter(level)
}

/// Console output plus daily rotating files per level:
/// logs/info.log.2026-01-01, logs/error.log.2026-01-01, ...
fn init_tracing(log_dir: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer(log_dir, "info.log", LevelFilter::INFO))
        .with(file_layer(log_dir, "warn.log", LevelFilter::WARN))
        .with(file_layer(log_dir, "error.log", LevelFilter::ERROR))
        .with(file_layer(log_dir, "debug.log", LevelFilter::DEBUG))
        .init();

    Ok(())
}

fn build_sheet(config: &Config) -> Arc<dyn SheetStore> {
    match &config.sheet {
        SheetBackend::Google {
            api_base,
            spreadsheet_id,
            sheet_name,
            access_token,
        } => Arc::new(GoogleSheetStore::new(
            api_base.as_str(),
            spreadsheet_id.as_str(),
            sheet_name.as_str(),
            access_token.as_str(),
        )),
        SheetBackend::Memory => {
            warn!("Using in-memory sheet, stored jobs are lost on restart");
            Arc::new(MemorySheetStore::new())
        }
    }
}

fn build_pipeline(config: &Config, sheet: Arc<dyn SheetStore>) -> Pipeline {
    Pipeline::new(
        Arc::new(FeedScraper::new(config.job_sources.clone())),
        Arc::new(KeywordMatcher::new(&config.search_keywords)),
        sheet,
        config.stage_timeout,
    )
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(e)
    })?;

    init_tracing(&config.log_dir)?;

    let sheet = build_sheet(&config);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, sheet).await,
        Command::Validate => validate(sheet).await,
        Command::Run {
            max_jobs,
            allow_duplicates,
        } => run_once(&config, sheet, max_jobs, !allow_duplicates).await,
    }
}

async fn validate(sheet: Arc<dyn SheetStore>) -> std::io::Result<()> {
    sheet.validate_connection().await.map_err(|e| {
        error!("Sheet connection failed: {}", e);
        std::io::Error::other(e)
    })?;
    info!("Sheet connection OK");

    let wrote = sheet.initialize_headers().await.map_err(|e| {
        error!("Header initialization failed: {}", e);
        std::io::Error::other(e)
    })?;
    info!(
        "Sheet headers {}",
        if wrote { "written" } else { "already up to date" }
    );
    Ok(())
}

async fn run_once(
    config: &Config,
    sheet: Arc<dyn SheetStore>,
    max_jobs: u32,
    skip_duplicates: bool,
) -> std::io::Result<()> {
    let pipeline = build_pipeline(config, sheet);
    let request = PipelineRunRequest {
        max_jobs,
        skip_duplicates,
    };
    let run_id = format!("cli-{}", Utc::now().timestamp_millis());

    let saved = pipeline
        .run(&run_id, &request, |status| {
            info!("[{:>3}%] {}: {}", status.progress, status.stage, status.message)
        })
        .await
        .map_err(|e| {
            error!("Run {} failed: {}", run_id, e);
            std::io::Error::other(e)
        })?;

    info!("Run {} finished, {} new jobs saved", run_id, saved.len());
    Ok(())
}

async fn serve(config: Config, sheet: Arc<dyn SheetStore>) -> std::io::Result<()> {
    info!("Starting job-sync server");
    info!("Configuration loaded successfully:");
    info!("  - Job sources: {}", config.job_sources.len());
    info!("  - Admin users: {}", config.admin_user_ids.len());
    info!("  - Stage timeout: {:?}", config.stage_timeout);
    info!("  - Status retention: {:?}", config.status_retention);

    // Safe on every start; a failure is reported by /health instead of aborting
    match sheet.initialize_headers().await {
        Ok(true) => info!("Sheet header row written"),
        Ok(false) => info!("Sheet header row already present"),
        Err(e) => warn!("Could not initialize sheet headers: {}", e),
    }

    let statuses = JobStatusStore::new();
    let (queue, tickets) = RunQueue::channel(8);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let run_worker = RunWorker::new(
        Arc::new(build_pipeline(&config, sheet.clone())),
        statuses.clone(),
        config.status_retention,
    );
    let worker_handle = tokio::spawn(async move {
        run_worker.run(tickets, shutdown_rx).await;
    });

    let jobs_service = web::Data::new(JobsService::new(
        sheet.clone(),
        statuses.clone(),
        queue,
        Arc::new(StaticAdminDirectory::new(config.admin_user_ids.clone())),
        JobsConfig::new(
            config.search_keywords.clone(),
            config.default_location.clone(),
            config.job_sources.iter().map(|s| s.name.clone()).collect(),
        ),
        config.status_retention,
    ));
    let sheet_data = web::Data::new(sheet);
    let max_payload_size = config.max_payload_size;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(jobs_service.clone())
            .app_data(sheet_data.clone())
            .app_data(web::PayloadConfig::default().limit(max_payload_size))
            .app_data(validation::json_config().limit(max_payload_size))
            .configure(health_config)
            .configure(jobs_config)
    });

    info!("Server starting on http://{}", config.bind_address);

    let server = server.bind(config.bind_address.as_str())?.run();
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    ShutdownCoordinator::new(
        server_handle,
        server_task,
        worker_handle,
        shutdown_tx,
        statuses,
        config.shutdown_grace,
    )
    .wait_for_shutdown()
    .await
}
