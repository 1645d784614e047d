//! Flickr photo search

use super::html;
use super::{CandidateStream, ImageCandidate, PageWalker, SourceStrategy, walk_pages};
use crate::error::SourceError;
use crate::sources::BrowserSession;
use async_trait::async_trait;
use url::Url;

/// Static photo URLs, both in `<img>` tags and in the page's embedded JSON
const PHOTO_PATTERN: &str =
    r#"(?i)(?:https?:)?//(?:live|farm\d+)\.staticflickr\.com/[^"'\s<>\\]+?\.(?:jpe?g|png)"#;

/// Size suffixes of Flickr thumbnails, upgraded to the 1024px `_b` rendition
const THUMBNAIL_SUFFIXES: &[&str] = &["_s", "_q", "_t", "_m", "_n"];

/// Scrapes the Flickr search results page for static photo URLs
#[derive(Clone, Debug)]
pub struct FlickrSource {
    base_url: String,
}

impl FlickrSource {
    /// Source rooted at `base_url` (normally `https://www.flickr.com`)
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl SourceStrategy for FlickrSource {
    fn name(&self) -> &str {
        "flickr"
    }

    fn search(&self, browser: &BrowserSession, term: &str, want: usize) -> CandidateStream {
        walk_pages(
            browser,
            want,
            ResultsWalker {
                base_url: self.base_url.clone(),
                term: term.to_string(),
                done: false,
            },
        )
    }
}

struct ResultsWalker {
    base_url: String,
    term: String,
    done: bool,
}

#[async_trait]
impl PageWalker for ResultsWalker {
    async fn next_page(
        &mut self,
        browser: &BrowserSession,
    ) -> Result<Option<Vec<ImageCandidate>>, SourceError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let mut url = Url::parse(&format!("{}/search/", self.base_url)).map_err(|e| {
            SourceError::Parse {
                url: self.base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        url.query_pairs_mut().append_pair("text", &self.term);
        let url = url.to_string();

        let body = browser.get_text(&url).await?;
        Ok(Some(extract_photos(&body, &url)?))
    }

    fn is_exhausted(&self) -> bool {
        self.done
    }
}

fn extract_photos(body: &str, page_url: &str) -> Result<Vec<ImageCandidate>, SourceError> {
    let re = html::compile(PHOTO_PATTERN, page_url)?;
    let body = body.replace("\\/", "/");
    Ok(re
        .find_iter(&body)
        .filter_map(|m| html::resolve(page_url, m.as_str()))
        .map(|url| ImageCandidate::new("flickr", upgrade_size(&url)))
        .collect())
}

/// `…/123_abc_m.jpg` becomes `…/123_abc_b.jpg`
fn upgrade_size(url: &str) -> String {
    let Some((stem, ext)) = url.rsplit_once('.') else {
        return url.to_string();
    };
    for suffix in THUMBNAIL_SUFFIXES {
        if let Some(base) = stem.strip_suffix(suffix) {
            return format!("{}_b.{}", base, ext);
        }
    }
    url.to_string()
}
