use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column order of the jobs sheet. Row 1 must match this exactly.
pub const HEADERS: [&str; 8] = [
    "url",
    "title",
    "company",
    "location",
    "description",
    "source",
    "discovered_at",
    "matched",
];

/// One external job posting as stored in the sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub url: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub source: String,
    pub discovered_at: DateTime<Utc>,
    pub matched: bool,
}

impl JobRecord {
    /// Stable external key used for deduplication.
    pub fn key(&self) -> String {
        canonical_url(&self.url)
    }

    /// Serialize into a sheet row following [`HEADERS`].
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.url.clone(),
            self.title.clone(),
            self.company.clone(),
            self.location.clone(),
            self.description.clone(),
            self.source.clone(),
            self.discovered_at.to_rfc3339(),
            if self.matched { "TRUE" } else { "FALSE" }.to_string(),
        ]
    }

    /// Parse a sheet row. The sheets API omits trailing empty cells, so short
    /// rows are padded. Returns `None` for rows without a URL.
    pub fn from_row(row: &[String]) -> Option<Self> {
        let cell = |i: usize| row.get(i).map(|s| s.trim().to_string()).unwrap_or_default();

        let url = cell(0);
        if url.is_empty() {
            return None;
        }

        let discovered_at = DateTime::parse_from_rfc3339(&cell(6))
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        Some(JobRecord {
            url,
            title: cell(1),
            company: cell(2),
            location: cell(3),
            description: cell(4),
            source: cell(5),
            discovered_at,
            matched: cell(7).eq_ignore_ascii_case("true"),
        })
    }
}

/// Normalize a posting URL for comparison.
///
/// Drops the fragment and trailing slashes and lowercases the scheme and
/// host. Path and query keep their case since posting ids may depend on it.
pub fn canonical_url(url: &str) -> String {
    let url = url.trim();
    let url = url.split('#').next().unwrap_or(url).trim_end_matches('/');

    match url.split_once("://") {
        Some((scheme, rest)) => {
            let host_end = rest.find(|c: char| c == '/' || c == '?').unwrap_or(rest.len());
            let (host, tail) = rest.split_at(host_end);
            format!(
                "{}://{}{}",
                scheme.to_ascii_lowercase(),
                host.to_ascii_lowercase(),
                tail
            )
        }
        None => url.to_string(),
    }
}
