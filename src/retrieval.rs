//! Source-material retrieval.
//!
//! The pipeline only needs two operations from a knowledge base: search a
//! topic for candidate articles, and split an article into sections within a
//! word-count band. A MediaWiki implementation is provided; anything else can
//! implement [`SectionSource`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Sections shorter than this are too thin to assess against.
pub const MIN_SECTION_WORDS: usize = 250;

/// Sections longer than this are too much reading for one FRQ.
pub const MAX_SECTION_WORDS: usize = 1000;

/// Search results considered per topic.
pub const MAX_SEARCH_RESULTS: usize = 5;

/// One candidate reference text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub text: String,
}

impl Section {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Word-band eligibility for candidate sections (exclusive on both ends).
pub fn within_word_band(section: &Section) -> bool {
    let words = section.word_count();
    words > MIN_SECTION_WORDS && words < MAX_SECTION_WORDS
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected API response: {0}")]
    Api(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// A knowledge base the pipeline can pull candidate texts from.
#[async_trait]
pub trait SectionSource: Send + Sync {
    /// Search the topic and return candidate article identifiers in rank order.
    async fn search(&self, topic: &str) -> Result<Vec<String>, RetrievalError>;

    /// Extract an article's sections, filtered to the word band.
    async fn extract_sections(&self, article: &str) -> Result<Vec<Section>, RetrievalError>;
}

// =============================================================================
// MEDIAWIKI IMPLEMENTATION
// =============================================================================

/// Retrieves articles from a MediaWiki API (Wikipedia by default).
#[derive(Debug, Clone)]
pub struct WikipediaSource {
    client: reqwest::Client,
    api_url: String,
}

impl WikipediaSource {
    pub fn new() -> Result<Self, RetrievalError> {
        Self::with_config("https://en.wikipedia.org/w/api.php", Duration::from_secs(30))
    }

    pub fn with_config(
        api_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("frq-mentor/0.1")
            .gzip(true)
            .build()
            .map_err(|e| RetrievalError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Deserialize)]
struct SearchQuery {
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Deserialize)]
struct ExtractResponse {
    query: Option<ExtractQuery>,
}

#[derive(Deserialize)]
struct ExtractQuery {
    pages: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
impl SectionSource for WikipediaSource {
    async fn search(&self, topic: &str) -> Result<Vec<String>, RetrievalError> {
        let limit = MAX_SEARCH_RESULTS.to_string();
        let response: SearchResponse = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", topic),
                ("srlimit", limit.as_str()),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let query = response
            .query
            .ok_or_else(|| RetrievalError::Api("missing query block in search response".into()))?;

        Ok(query.search.into_iter().map(|hit| hit.title).collect())
    }

    async fn extract_sections(&self, article: &str) -> Result<Vec<Section>, RetrievalError> {
        let response: ExtractResponse = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("explaintext", "1"),
                ("titles", article),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let pages = response
            .query
            .ok_or_else(|| RetrievalError::Api("missing query block in extract response".into()))?
            .pages;

        // The extract lives under an opaque page-id key; missing pages carry
        // a "missing" marker instead of an extract.
        let extract = pages
            .values()
            .find_map(|page| page.get("extract").and_then(|e| e.as_str()))
            .unwrap_or_default();

        if extract.is_empty() {
            return Ok(Vec::new());
        }

        Ok(split_sections(article, extract)
            .into_iter()
            .filter(within_word_band)
            .collect())
    }
}

/// Split a plain-text MediaWiki extract into sections at its heading markers
/// (`== Heading ==`). Text before the first heading becomes the lead section
/// titled after the article itself.
pub fn split_sections(article: &str, extract: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut title = article.to_string();
    let mut body = String::new();

    for line in extract.lines() {
        let trimmed = line.trim();
        if let Some(heading) = parse_heading(trimmed) {
            if !body.trim().is_empty() {
                sections.push(Section::new(title.clone(), body.trim().to_string()));
            }
            title = heading;
            body = String::new();
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }
    if !body.trim().is_empty() {
        sections.push(Section::new(title, body.trim().to_string()));
    }

    sections
}

fn parse_heading(line: &str) -> Option<String> {
    if line.len() < 5 || !line.starts_with("==") || !line.ends_with("==") {
        return None;
    }
    let inner = line.trim_matches('=').trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn test_word_band_is_exclusive() {
        assert!(!within_word_band(&Section::new("t", words(MIN_SECTION_WORDS))));
        assert!(within_word_band(&Section::new("t", words(MIN_SECTION_WORDS + 1))));
        assert!(within_word_band(&Section::new("t", words(MAX_SECTION_WORDS - 1))));
        assert!(!within_word_band(&Section::new("t", words(MAX_SECTION_WORDS))));
    }

    #[test]
    fn test_split_sections_basic() {
        let extract = "Lead paragraph here.\n\n== History ==\nOld stuff.\n\n=== Early days ===\nVery old stuff.\n\n== Design ==\nNew stuff.\n";
        let sections = split_sections("Widget", extract);
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[0].title, "Widget");
        assert_eq!(sections[0].text, "Lead paragraph here.");
        assert_eq!(sections[1].title, "History");
        assert_eq!(sections[2].title, "Early days");
        assert_eq!(sections[3].title, "Design");
        assert_eq!(sections[3].text, "New stuff.");
    }

    #[test]
    fn test_split_sections_skips_empty_bodies() {
        let extract = "== See also ==\n== References ==\nSome refs.\n";
        let sections = split_sections("Widget", extract);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "References");
    }

    #[test]
    fn test_parse_heading() {
        assert_eq!(parse_heading("== History =="), Some("History".to_string()));
        assert_eq!(parse_heading("=== Early ==="), Some("Early".to_string()));
        assert_eq!(parse_heading("not a heading"), None);
        assert_eq!(parse_heading("== =="), None);
    }
}
