use std::env;
use std::time::Duration;

use crate::pipeline::JobSource;
use crate::sheet::google::DEFAULT_API_BASE;

/// Upper bound for `maxJobs` on a single run
pub const MAX_JOBS_LIMIT: u32 = 200;

/// `maxJobs` used when a request leaves it out
pub const DEFAULT_MAX_JOBS: u32 = 50;

/// Where job records are persisted
#[derive(Clone, Debug, PartialEq)]
pub enum SheetBackend {
    Google {
        api_base: String,
        spreadsheet_id: String,
        sheet_name: String,
        access_token: String,
    },
    /// Process-local sheet, lost on restart
    Memory,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub sheet: SheetBackend,

    /// User ids treated as admins by the static directory
    pub admin_user_ids: Vec<String>,

    pub job_sources: Vec<JobSource>,
    pub search_keywords: Vec<String>,
    pub default_location: String,

    /// Bound on every external call made by a pipeline stage
    pub stage_timeout: Duration,

    /// How long a finished run's status stays visible
    pub status_retention: Duration,

    /// How long shutdown waits for an in-flight run
    pub shutdown_grace: Duration,

    /// Maximum payload size for all requests (in bytes)
    /// Default: 1MB
    pub max_payload_size: usize,

    pub bind_address: String,
    pub log_dir: String,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Required unless `SHEET_BACKEND=memory`:
    /// - SHEET_SPREADSHEET_ID
    /// - SHEET_ACCESS_TOKEN
    ///
    /// Everything else falls back to a default.
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let sheet = match get("SHEET_BACKEND").as_deref().map(str::trim) {
            Some("memory") => SheetBackend::Memory,
            Some("google") | Some("") | None => SheetBackend::Google {
                api_base: get("SHEETS_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                spreadsheet_id: get("SHEET_SPREADSHEET_ID")
                    .ok_or("SHEET_SPREADSHEET_ID must be set in .env file or environment")?,
                sheet_name: get("SHEET_NAME").unwrap_or_else(|| "Jobs".to_string()),
                access_token: get("SHEET_ACCESS_TOKEN")
                    .ok_or("SHEET_ACCESS_TOKEN must be set in .env file or environment")?,
            },
            Some(other) => return Err(format!("Unknown SHEET_BACKEND: {}", other)),
        };

        let secs = |key: &str, default: u64| {
            Duration::from_secs(get(key).and_then(|s| s.parse().ok()).unwrap_or(default))
        };

        Ok(Config {
            sheet,
            admin_user_ids: get("ADMIN_USER_IDS").map(|s| split_list(&s)).unwrap_or_default(),
            job_sources: get("JOB_SOURCES")
                .map(|s| parse_sources(&s))
                .transpose()?
                .unwrap_or_default(),
            search_keywords: get("SEARCH_KEYWORDS").map(|s| split_list(&s)).unwrap_or_default(),
            default_location: get("DEFAULT_LOCATION").unwrap_or_else(|| "Remote".to_string()),
            stage_timeout: secs("STAGE_TIMEOUT_SECS", 300),
            status_retention: secs("STATUS_RETENTION_SECS", 3600),
            shutdown_grace: secs("SHUTDOWN_GRACE_SECS", 30),
            max_payload_size: get("MAX_PAYLOAD_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024),
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            log_dir: get("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
        })
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Parse `name=url,name=url`
fn parse_sources(s: &str) -> Result<Vec<JobSource>, String> {
    split_list(s)
        .into_iter()
        .map(|entry| match entry.split_once('=') {
            Some((name, url)) if !name.trim().is_empty() && !url.trim().is_empty() => Ok(JobSource {
                name: name.trim().to_string(),
                url: url.trim().to_string(),
            }),
            _ => Err(format!("Invalid JOB_SOURCES entry '{}', expected name=url", entry)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn google_backend_requires_credentials() {
        let err = load(&[("SHEET_SPREADSHEET_ID", "abc")]).unwrap_err();
        assert!(err.contains("SHEET_ACCESS_TOKEN"));
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("SHEET_SPREADSHEET_ID", "abc"), ("SHEET_ACCESS_TOKEN", "t")]).unwrap();

        assert_eq!(
            config.sheet,
            SheetBackend::Google {
                api_base: DEFAULT_API_BASE.to_string(),
                spreadsheet_id: "abc".to_string(),
                sheet_name: "Jobs".to_string(),
                access_token: "t".to_string(),
            }
        );
        assert_eq!(config.status_retention, Duration::from_secs(3600));
        assert_eq!(config.stage_timeout, Duration::from_secs(300));
        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert!(config.job_sources.is_empty());
    }

    #[test]
    fn lists_and_sources_are_parsed() {
        let config = load(&[
            ("SHEET_BACKEND", "memory"),
            ("ADMIN_USER_IDS", "alice, bob,,"),
            ("SEARCH_KEYWORDS", "tailor,sewing"),
            ("JOB_SOURCES", "board=https://board.example/jobs.json, feed=https://f.example"),
        ])
        .unwrap();

        assert_eq!(config.sheet, SheetBackend::Memory);
        assert_eq!(config.admin_user_ids, ["alice", "bob"]);
        assert_eq!(config.search_keywords, ["tailor", "sewing"]);
        assert_eq!(config.job_sources.len(), 2);
        assert_eq!(config.job_sources[1].name, "feed");
        assert_eq!(config.job_sources[1].url, "https://f.example");
    }

    #[test]
    fn malformed_source_is_rejected() {
        let err = load(&[("SHEET_BACKEND", "memory"), ("JOB_SOURCES", "nourl")]).unwrap_err();
        assert!(err.contains("nourl"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(load(&[("SHEET_BACKEND", "csv")]).is_err());
    }
}
