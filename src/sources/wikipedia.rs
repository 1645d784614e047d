//! Wikipedia article images
//!
//! The REST page summary gives the article's lead image at full resolution;
//! the article page itself is then scanned for further `<img>` tags.

use super::html;
use super::{CandidateStream, ImageCandidate, PageWalker, SourceStrategy, walk_pages};
use crate::error::SourceError;
use crate::sources::BrowserSession;
use async_trait::async_trait;
use serde::Deserialize;

/// Looks up an article by title and yields its images
#[derive(Clone, Debug)]
pub struct WikipediaSource {
    base_url: String,
}

impl WikipediaSource {
    /// Source rooted at `base_url` (normally `https://en.wikipedia.org`)
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl SourceStrategy for WikipediaSource {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn search(&self, browser: &BrowserSession, term: &str, want: usize) -> CandidateStream {
        let title = term.trim().replace(' ', "_");
        walk_pages(
            browser,
            want,
            ArticleWalker {
                summary_url: format!(
                    "{}/api/rest_v1/page/summary/{}",
                    self.base_url,
                    urlencoding::encode(&title)
                ),
                page_url: None,
                step: Step::Summary,
            },
        )
    }
}

#[derive(Debug, Deserialize)]
struct Summary {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    originalimage: Option<SummaryImage>,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct SummaryImage {
    source: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<DesktopUrls>,
}

#[derive(Debug, Deserialize)]
struct DesktopUrls {
    page: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Summary,
    Article,
    Done,
}

struct ArticleWalker {
    summary_url: String,
    page_url: Option<String>,
    step: Step,
}

impl ArticleWalker {
    async fn summary(
        &mut self,
        browser: &BrowserSession,
    ) -> Result<Option<Vec<ImageCandidate>>, SourceError> {
        let summary: Summary = match browser.get_json(&self.summary_url).await {
            Ok(summary) => summary,
            // No article under this title
            Err(SourceError::HttpStatus { status: 404, .. }) => {
                self.step = Step::Done;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.page_url = summary
            .content_urls
            .and_then(|c| c.desktop)
            .and_then(|d| d.page);
        self.step = if self.page_url.is_some() {
            Step::Article
        } else {
            Step::Done
        };

        let mut found = Vec::new();
        if let Some(image) = summary.originalimage {
            let mut candidate = ImageCandidate::new("wikipedia", image.source)
                .with_alt(summary.title.unwrap_or_default());
            if let (Some(w), Some(h)) = (image.width, image.height) {
                candidate = candidate.with_dimensions(w, h);
            }
            found.push(candidate);
        }
        Ok(Some(found))
    }

    async fn article(
        &mut self,
        browser: &BrowserSession,
    ) -> Result<Option<Vec<ImageCandidate>>, SourceError> {
        self.step = Step::Done;
        let Some(page_url) = self.page_url.take() else {
            return Ok(None);
        };

        let body = browser.get_text(&page_url).await?;
        let found = html::img_tags(&body, &page_url)?
            .into_iter()
            .filter_map(|tag| {
                let url = html::resolve(&page_url, &tag.src)?;
                if is_small_thumbnail(&url) {
                    return None;
                }
                let mut candidate =
                    ImageCandidate::new("wikipedia", url).with_alt(tag.alt.unwrap_or_default());
                if let (Some(w), Some(h)) = (tag.width, tag.height) {
                    candidate = candidate.with_dimensions(w, h);
                }
                Some(candidate)
            })
            .collect();
        Ok(Some(found))
    }
}

/// Article thumbnails rendered at icon-like widths
fn is_small_thumbnail(url: &str) -> bool {
    url.contains("/thumb/") && (url.contains("/150px-") || url.contains("/200px-"))
}

#[async_trait]
impl PageWalker for ArticleWalker {
    async fn next_page(
        &mut self,
        browser: &BrowserSession,
    ) -> Result<Option<Vec<ImageCandidate>>, SourceError> {
        match self.step {
            Step::Summary => self.summary(browser).await,
            Step::Article => self.article(browser).await,
            Step::Done => Ok(None),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.step == Step::Done
    }
}
