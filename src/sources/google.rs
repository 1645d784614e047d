//! Google Images result page
//!
//! Full-size URLs are only present in the page's inline data. Entries of
//! the form `["<url>",<height>,<width>]` carry declared dimensions; other
//! quoted image URLs and `imgurl=` parameters are taken without them.

use super::browser::check_not_blocked;
use super::html;
use super::{CandidateStream, ImageCandidate, PageWalker, SourceStrategy, walk_pages};
use crate::error::SourceError;
use crate::sources::BrowserSession;
use async_trait::async_trait;
use url::Url;

/// Large, colour photographs, JPEG preferred
const IMAGE_FILTERS: &str = "isz:l,ic:color,ift:jpg,itp:photo";

/// Google-hosted thumbnails and assets, never the original image
const GOOGLE_HOSTED: &[&str] = &[
    "encrypted-tbn",
    "gstatic.com",
    "googleusercontent.com",
    "google.com",
    "ggpht.com",
];

/// Scrapes the inline data of a Google Images search
#[derive(Clone, Debug)]
pub struct GoogleSource {
    base_url: String,
}

impl GoogleSource {
    /// Source rooted at `base_url` (normally `https://www.google.com`)
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl SourceStrategy for GoogleSource {
    fn name(&self) -> &str {
        "google"
    }

    fn search(&self, browser: &BrowserSession, term: &str, want: usize) -> CandidateStream {
        walk_pages(
            browser,
            want,
            ResultPage {
                base_url: self.base_url.clone(),
                term: term.to_string(),
                done: false,
            },
        )
    }
}

struct ResultPage {
    base_url: String,
    term: String,
    done: bool,
}

#[async_trait]
impl PageWalker for ResultPage {
    async fn next_page(
        &mut self,
        browser: &BrowserSession,
    ) -> Result<Option<Vec<ImageCandidate>>, SourceError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let mut url = Url::parse(&format!("{}/search", self.base_url)).map_err(|e| {
            SourceError::Parse {
                url: self.base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("q", &self.term)
            .append_pair("tbm", "isch")
            .append_pair("tbs", IMAGE_FILTERS);
        let url = url.to_string();

        let body = browser.get_text(&url).await?;
        check_not_blocked(&url, &body)?;
        let found = extract_images(&body, &url)?;
        tracing::debug!(term = %self.term, results = found.len(), "Google results");
        Ok(Some(found))
    }

    fn is_exhausted(&self) -> bool {
        self.done
    }
}

fn extract_images(body: &str, page_url: &str) -> Result<Vec<ImageCandidate>, SourceError> {
    let body = unescape_inline(body);
    let sized_re = html::compile(r#"\["(https?://[^"]+)",(\d+),(\d+)\]"#, page_url)?;
    let quoted_re = html::compile(r#"(?i)"(https?://[^"]+?\.(?:jpe?g|png|webp))""#, page_url)?;
    let imgurl_re = html::compile(r#"imgurl=([^&"]+)"#, page_url)?;

    let mut found = Vec::new();
    for caps in sized_re.captures_iter(&body) {
        let url = &caps[1];
        if is_google_hosted(url) {
            continue;
        }
        let (Ok(height), Ok(width)) = (caps[2].parse::<u32>(), caps[3].parse::<u32>()) else {
            continue;
        };
        found.push(ImageCandidate::new("google", url).with_dimensions(width, height));
    }

    let unsized_urls = quoted_re
        .captures_iter(&body)
        .map(|caps| caps[1].to_string())
        .chain(imgurl_re.captures_iter(&body).filter_map(|caps| {
            urlencoding::decode(&caps[1]).ok().map(|u| u.into_owned())
        }));
    for url in unsized_urls {
        if !url.starts_with("http") || is_google_hosted(&url) {
            continue;
        }
        if found.iter().any(|c| c.url == url) {
            continue;
        }
        found.push(ImageCandidate::new("google", url));
    }
    Ok(found)
}

fn is_google_hosted(url: &str) -> bool {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_default();
    GOOGLE_HOSTED
        .iter()
        .any(|h| host.contains(h) || (h.starts_with("encrypted") && url.contains(h)))
}

/// Undo the JavaScript string escaping used in Google's inline data
fn unescape_inline(body: &str) -> String {
    body.replace("\\u003d", "=")
        .replace("\\u0026", "&")
        .replace("\\u003c", "<")
        .replace("\\u003e", ">")
        .replace("\\/", "/")
}
