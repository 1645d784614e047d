//! Wikimedia Commons file search

use super::{CandidateStream, ImageCandidate, PageWalker, SourceStrategy, walk_pages};
use crate::error::SourceError;
use crate::sources::BrowserSession;
use crate::types::ImageKind;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

/// File namespace on Commons
const FILE_NAMESPACE: &str = "6";

/// Searches the Commons file namespace and yields `Special:FilePath` URLs
#[derive(Clone, Debug)]
pub struct WikimediaSource {
    base_url: String,
}

impl WikimediaSource {
    /// Source rooted at `base_url` (normally `https://commons.wikimedia.org`)
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl SourceStrategy for WikimediaSource {
    fn name(&self) -> &str {
        "wikimedia"
    }

    fn search(&self, browser: &BrowserSession, term: &str, want: usize) -> CandidateStream {
        walk_pages(
            browser,
            want,
            CommonsWalker {
                base_url: self.base_url.clone(),
                term: term.to_string(),
                limit: want.saturating_mul(3).clamp(10, 100),
                done: false,
            },
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

struct CommonsWalker {
    base_url: String,
    term: String,
    limit: usize,
    done: bool,
}

impl CommonsWalker {
    fn search_url(&self) -> Result<String, SourceError> {
        let mut url = Url::parse(&format!("{}/w/api.php", self.base_url)).map_err(|e| {
            SourceError::Parse {
                url: self.base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("format", "json")
            .append_pair("list", "search")
            .append_pair("srsearch", &self.term)
            .append_pair("srnamespace", FILE_NAMESPACE)
            .append_pair("srlimit", &self.limit.to_string());
        Ok(url.to_string())
    }

    fn candidate(&self, title: &str) -> Option<ImageCandidate> {
        let file_name = title.strip_prefix("File:").unwrap_or(title).trim();
        let (stem, ext) = file_name.rsplit_once('.')?;
        let kind = ImageKind::from_extension(ext)?;
        if kind == ImageKind::Gif {
            return None;
        }

        let url = format!(
            "{}/wiki/Special:FilePath/{}",
            self.base_url,
            urlencoding::encode(&file_name.replace(' ', "_"))
        );
        Some(
            ImageCandidate::new("wikimedia", url)
                .with_alt(stem)
                .with_content_type(kind),
        )
    }
}

#[async_trait]
impl PageWalker for CommonsWalker {
    async fn next_page(
        &mut self,
        browser: &BrowserSession,
    ) -> Result<Option<Vec<ImageCandidate>>, SourceError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let url = self.search_url()?;
        let response: SearchResponse = browser.get_json(&url).await?;
        let hits = response.query.map(|q| q.search).unwrap_or_default();
        tracing::debug!(term = %self.term, hits = hits.len(), "Wikimedia search results");

        Ok(Some(
            hits.iter().filter_map(|h| self.candidate(&h.title)).collect(),
        ))
    }

    fn is_exhausted(&self) -> bool {
        self.done
    }
}
