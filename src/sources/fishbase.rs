//! FishBase species pages

use super::html;
use super::{CandidateStream, ImageCandidate, PageWalker, SourceStrategy, walk_pages};
use crate::error::SourceError;
use crate::sources::BrowserSession;
use async_trait::async_trait;
use std::collections::VecDeque;
use url::Url;

/// Species summary pages visited per search
const MAX_SPECIES_PAGES: usize = 3;

/// Runs a FishBase name search and collects photos from the matching
/// species summary pages
#[derive(Clone, Debug)]
pub struct FishBaseSource {
    base_url: String,
}

impl FishBaseSource {
    /// Source rooted at `base_url` (normally `https://www.fishbase.se`)
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl SourceStrategy for FishBaseSource {
    fn name(&self) -> &str {
        "fishbase"
    }

    fn search(&self, browser: &BrowserSession, term: &str, want: usize) -> CandidateStream {
        walk_pages(
            browser,
            want,
            SpeciesPageWalker {
                base_url: self.base_url.clone(),
                term: term.to_string(),
                species_pages: None,
            },
        )
    }
}

struct SpeciesPageWalker {
    base_url: String,
    term: String,
    /// `None` until the search page has been read
    species_pages: Option<VecDeque<String>>,
}

impl SpeciesPageWalker {
    fn search_url(&self) -> Result<String, SourceError> {
        let mut url = Url::parse(&format!("{}/search.php", self.base_url)).map_err(|e| {
            SourceError::Parse {
                url: self.base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("lang", "English")
            .append_pair("SearchRequest_Name", &self.term);
        Ok(url.to_string())
    }
}

#[async_trait]
impl PageWalker for SpeciesPageWalker {
    async fn next_page(
        &mut self,
        browser: &BrowserSession,
    ) -> Result<Option<Vec<ImageCandidate>>, SourceError> {
        if self.species_pages.is_none() {
            let search_url = self.search_url()?;
            let body = browser.get_text(&search_url).await?;

            let mut pages = VecDeque::new();
            for href in html::links(&body, &search_url)? {
                let lower = href.to_ascii_lowercase();
                if !(lower.contains("summary") && lower.contains("speccode")) {
                    continue;
                }
                if let Some(url) = html::resolve(&search_url, &href)
                    && !pages.contains(&url)
                {
                    pages.push_back(url);
                }
                if pages.len() == MAX_SPECIES_PAGES {
                    break;
                }
            }
            tracing::debug!(term = %self.term, pages = pages.len(), "FishBase species pages found");
            self.species_pages = Some(pages);
            // The search page itself carries no species photos
            return Ok(Some(Vec::new()));
        }

        let Some(page_url) = self.species_pages.as_mut().and_then(|p| p.pop_front()) else {
            return Ok(None);
        };
        let body = browser.get_text(&page_url).await?;
        let found = html::img_tags(&body, &page_url)?
            .into_iter()
            .filter_map(|tag| {
                let url = html::resolve(&page_url, &tag.src)?;
                let mut candidate =
                    ImageCandidate::new("fishbase", url).with_alt(tag.alt.unwrap_or_default());
                if let (Some(w), Some(h)) = (tag.width, tag.height) {
                    candidate = candidate.with_dimensions(w, h);
                }
                Some(candidate)
            })
            .collect();
        Ok(Some(found))
    }

    fn is_exhausted(&self) -> bool {
        self.species_pages.as_ref().is_some_and(VecDeque::is_empty)
    }
}
