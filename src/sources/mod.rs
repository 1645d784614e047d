//! Image sources and the fallback chain
//!
//! Each source implements [`SourceStrategy`]: given a search term and the
//! number of images still wanted, it returns a lazy [`CandidateStream`].
//! Pages are only requested while the caller keeps polling, and no further
//! page is requested once `want` candidates have been yielded. The first
//! error ends the stream.
//!
//! [`SourceRegistry::standard`] builds the fixed priority order:
//! Wikimedia Commons, Wikipedia, FishBase, Flickr, Bing, Google.

pub mod bing;
pub mod browser;
pub mod fishbase;
pub mod flickr;
pub mod google;
pub(crate) mod html;
pub mod wikimedia;
pub mod wikipedia;

pub use bing::BingSource;
pub use browser::BrowserSession;
pub use fishbase::FishBaseSource;
pub use flickr::FlickrSource;
pub use google::GoogleSource;
pub use wikimedia::WikimediaSource;
pub use wikipedia::WikipediaSource;

use crate::config::SourcesConfig;
use crate::error::SourceError;
use crate::types::ImageKind;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// A discovered, not yet validated image reference
#[derive(Clone, Debug, PartialEq)]
pub struct ImageCandidate {
    /// Name of the source that produced it
    pub source: String,
    /// Absolute image URL
    pub url: String,
    /// Alt or title text, if the source exposed one
    pub alt: Option<String>,
    /// Declared or sniffed format
    pub content_type: Option<ImageKind>,
    /// Pixel dimensions (width, height), declared or probed
    pub dimensions: Option<(u32, u32)>,
    /// Body size in bytes, known after download
    pub byte_size: Option<u64>,
    /// Lowercase hex SHA-256 of the body, known after download
    pub content_hash: Option<String>,
}

impl ImageCandidate {
    /// Candidate with only a source and URL known
    pub fn new(source: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            url: url.into(),
            alt: None,
            content_type: None,
            dimensions: None,
            byte_size: None,
            content_hash: None,
        }
    }

    /// Attach alt/title text (blank text is ignored)
    pub fn with_alt(mut self, alt: impl Into<String>) -> Self {
        let alt = alt.into();
        if !alt.trim().is_empty() {
            self.alt = Some(alt);
        }
        self
    }

    /// Attach declared pixel dimensions
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some((width, height));
        self
    }

    /// Attach a declared format
    pub fn with_content_type(mut self, kind: ImageKind) -> Self {
        self.content_type = Some(kind);
        self
    }
}

/// Lazy, finite sequence of candidates from one source query
pub type CandidateStream = BoxStream<'static, Result<ImageCandidate, SourceError>>;

/// A pluggable client for one image-providing source
///
/// # Examples
///
/// ```no_run
/// use futures::StreamExt;
/// use species_dl::config::{BrowserConfig, SourcesConfig};
/// use species_dl::sources::{BrowserSession, SourceRegistry};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let browser = BrowserSession::launch(&BrowserConfig::default())?;
/// let registry = SourceRegistry::standard(&SourcesConfig::default());
///
/// for source in registry.iter() {
///     let mut candidates = source.search(&browser, "Lutjanus malabaricus", 5);
///     while let Some(candidate) = candidates.next().await {
///         println!("{}: {:?}", source.name(), candidate.map(|c| c.url));
///     }
/// }
/// browser.close();
/// # Ok(())
/// # }
/// ```
pub trait SourceStrategy: Send + Sync {
    /// Stable lowercase source name (e.g. `"wikimedia"`)
    fn name(&self) -> &str;

    /// Start a query for `term`, sized for `want` candidates
    ///
    /// Nothing is fetched until the returned stream is polled.
    fn search(&self, browser: &BrowserSession, term: &str, want: usize) -> CandidateStream;
}

/// Sources in fallback order
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn SourceStrategy>>,
}

impl SourceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard chain, minus sources disabled in `config`
    pub fn standard(config: &SourcesConfig) -> Self {
        let all: Vec<Arc<dyn SourceStrategy>> = vec![
            Arc::new(WikimediaSource::new(&config.wikimedia_url)),
            Arc::new(WikipediaSource::new(&config.wikipedia_url)),
            Arc::new(FishBaseSource::new(&config.fishbase_url)),
            Arc::new(FlickrSource::new(&config.flickr_url)),
            Arc::new(BingSource::new(&config.bing_url)),
            Arc::new(GoogleSource::new(&config.google_url)),
        ];

        let mut registry = Self::new();
        for source in all {
            if config.is_enabled(source.name()) {
                registry.push(source);
            } else {
                tracing::debug!(source = source.name(), "Source disabled by configuration");
            }
        }
        registry
    }

    /// Append a source at the lowest priority
    pub fn push(&mut self, source: Arc<dyn SourceStrategy>) {
        self.sources.push(source);
    }

    /// Builder form of [`push`](Self::push)
    pub fn with_source(mut self, source: Arc<dyn SourceStrategy>) -> Self {
        self.push(source);
        self
    }

    /// Sources in priority order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SourceStrategy>> {
        self.sources.iter()
    }

    /// Source names in priority order
    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Number of sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether there is no source at all
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}

/// Page-by-page query state for one source
///
/// Implementations hold whatever they learned from earlier pages (follow-up
/// links, the next offset) and return `Ok(None)` once there is nothing left.
#[async_trait]
pub(crate) trait PageWalker: Send + 'static {
    async fn next_page(
        &mut self,
        browser: &BrowserSession,
    ) -> Result<Option<Vec<ImageCandidate>>, SourceError>;

    /// True once `next_page` has nothing more to request
    fn is_exhausted(&self) -> bool;
}

struct WalkState<W> {
    browser: BrowserSession,
    walker: W,
    want: usize,
    yielded: usize,
    pages: usize,
    buffer: VecDeque<ImageCandidate>,
    seen: HashSet<String>,
    done: bool,
}

/// Turn a [`PageWalker`] into a [`CandidateStream`]
///
/// Pauses before every page request after the first and skips URLs already
/// yielded by this stream. No new page is requested once `want` candidates
/// have been yielded, but candidates from pages already fetched are still
/// yielded, since the consumer may reject some of them. Ends after the first
/// error.
pub(crate) fn walk_pages<W: PageWalker>(
    browser: &BrowserSession,
    want: usize,
    walker: W,
) -> CandidateStream {
    let state = WalkState {
        browser: browser.clone(),
        walker,
        want,
        yielded: 0,
        pages: 0,
        buffer: VecDeque::new(),
        seen: HashSet::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.done {
                return None;
            }
            if let Some(candidate) = st.buffer.pop_front() {
                if !st.seen.insert(candidate.url.clone()) {
                    continue;
                }
                st.yielded += 1;
                return Some((Ok(candidate), st));
            }

            if st.yielded >= st.want || st.walker.is_exhausted() {
                return None;
            }
            if st.pages > 0 {
                st.browser.pause().await;
            }
            st.pages += 1;

            match st.walker.next_page(&st.browser).await {
                Ok(Some(page)) => st.buffer.extend(page),
                Ok(None) => return None,
                Err(e) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
            }
        }
    })
    .boxed()
}
