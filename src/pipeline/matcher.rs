use async_trait::async_trait;

use super::PipelineError;
use crate::sheet::JobRecord;

/// Relevance filter applied to scraped candidates.
///
/// Returns the relevant subset with `matched` set.
#[async_trait]
pub trait JobMatcher: Send + Sync {
    async fn filter(&self, candidates: Vec<JobRecord>) -> Result<Vec<JobRecord>, PipelineError>;
}

/// Keeps postings whose title or description mentions any keyword
pub struct KeywordMatcher {
    keywords: Vec<String>,
}

impl KeywordMatcher {
    /// An empty keyword list matches everything.
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    fn is_relevant(&self, record: &JobRecord) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let haystack = format!("{} {}", record.title, record.description).to_lowercase();
        self.keywords.iter().any(|k| haystack.contains(k))
    }
}

#[async_trait]
impl JobMatcher for KeywordMatcher {
    async fn filter(&self, candidates: Vec<JobRecord>) -> Result<Vec<JobRecord>, PipelineError> {
        Ok(candidates
            .into_iter()
            .filter(|r| self.is_relevant(r))
            .map(|mut r| {
                r.matched = true;
                r
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn posting(title: &str, description: &str) -> JobRecord {
        JobRecord {
            url: format!("https://a.example/{}", title),
            title: title.to_string(),
            company: String::new(),
            location: String::new(),
            description: description.to_string(),
            source: "test".to_string(),
            discovered_at: Utc::now(),
            matched: false,
        }
    }

    #[tokio::test]
    async fn keywords_match_title_or_description_ignoring_case() {
        let matcher = KeywordMatcher::new(&["Sewing".to_string(), " tailor ".to_string()]);
        let kept = matcher
            .filter(vec![
                posting("Tailor", ""),
                posting("Clerk", "industrial SEWING machines"),
                posting("Driver", "deliveries"),
            ])
            .await
            .unwrap();

        let titles: Vec<_> = kept.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["Tailor", "Clerk"]);
        assert!(kept.iter().all(|r| r.matched));
    }

    #[tokio::test]
    async fn no_keywords_matches_everything() {
        let matcher = KeywordMatcher::new(&[String::new()]);
        let kept = matcher
            .filter(vec![posting("a", ""), posting("b", "")])
            .await
            .unwrap();
        assert_eq!(kept.len(), 2);
    }
}
