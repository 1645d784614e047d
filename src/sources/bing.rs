//! Bing Images result pages

use super::browser::check_not_blocked;
use super::html;
use super::{CandidateStream, ImageCandidate, PageWalker, SourceStrategy, walk_pages};
use crate::error::SourceError;
use crate::sources::BrowserSession;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

/// Results Bing renders per page
const RESULTS_PER_PAGE: usize = 35;

/// Upper bound on result pages per query
const MAX_PAGES: usize = 3;

/// Reads the `murl` (media URL) metadata Bing attaches to every result tile
#[derive(Clone, Debug)]
pub struct BingSource {
    base_url: String,
}

impl BingSource {
    /// Source rooted at `base_url` (normally `https://www.bing.com`)
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl SourceStrategy for BingSource {
    fn name(&self) -> &str {
        "bing"
    }

    fn search(&self, browser: &BrowserSession, term: &str, want: usize) -> CandidateStream {
        walk_pages(
            browser,
            want,
            ResultPages {
                base_url: self.base_url.clone(),
                term: term.to_string(),
                page: 0,
                pages: (want / RESULTS_PER_PAGE).saturating_add(1).min(MAX_PAGES),
            },
        )
    }
}

/// Per-tile metadata carried in the `m` attribute
#[derive(Debug, Deserialize)]
struct TileMeta {
    #[serde(default)]
    murl: Option<String>,
    #[serde(default)]
    t: Option<String>,
}

struct ResultPages {
    base_url: String,
    term: String,
    page: usize,
    pages: usize,
}

impl ResultPages {
    fn page_url(&self) -> Result<String, SourceError> {
        let mut url = Url::parse(&format!("{}/images/search", self.base_url)).map_err(|e| {
            SourceError::Parse {
                url: self.base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("q", &self.term)
            .append_pair("form", "HDRSC2")
            .append_pair("first", &(self.page * RESULTS_PER_PAGE).to_string())
            .append_pair("tsc", "ImageBasicHover");
        Ok(url.to_string())
    }
}

#[async_trait]
impl PageWalker for ResultPages {
    async fn next_page(
        &mut self,
        browser: &BrowserSession,
    ) -> Result<Option<Vec<ImageCandidate>>, SourceError> {
        if self.page >= self.pages {
            return Ok(None);
        }
        let url = self.page_url()?;
        self.page += 1;

        let body = browser.get_text(&url).await?;
        check_not_blocked(&url, &body)?;
        let found = extract_results(&body, &url)?;
        tracing::debug!(term = %self.term, page = self.page, results = found.len(), "Bing results");
        if found.is_empty() {
            // Past the last page of results
            self.page = self.pages;
        }
        Ok(Some(found))
    }

    fn is_exhausted(&self) -> bool {
        self.page >= self.pages
    }
}

fn extract_results(body: &str, page_url: &str) -> Result<Vec<ImageCandidate>, SourceError> {
    let tile_re = html::compile(r#"\bm="(\{[^"]*\})""#, page_url)?;
    let mut found: Vec<ImageCandidate> = tile_re
        .captures_iter(body)
        .filter_map(|caps| {
            let meta: TileMeta = serde_json::from_str(&html::decode_entities(&caps[1])).ok()?;
            let url = clean_media_url(&meta.murl?)?;
            Some(ImageCandidate::new("bing", url).with_alt(meta.t.unwrap_or_default()))
        })
        .collect();

    // Older layouts embed the metadata in scripts instead of attributes
    if found.is_empty() {
        let murl_re = html::compile(r#""murl":"([^"]+)""#, page_url)?;
        let decoded = html::decode_entities(body);
        found = murl_re
            .captures_iter(&decoded)
            .filter_map(|caps| clean_media_url(&caps[1]))
            .map(|url| ImageCandidate::new("bing", url))
            .collect();
    }
    Ok(found)
}

fn clean_media_url(raw: &str) -> Option<String> {
    let url = raw.replace('\\', "");
    (url.starts_with("http://") || url.starts_with("https://")).then_some(url)
}
