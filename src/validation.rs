//! Candidate acceptance rules
//!
//! [`Validator::accept`] is a pure function of the candidate, the configured
//! rules and the session's [`DedupSet`]. The species session calls it twice
//! per candidate: once on what the source declared (so obviously unusable
//! URLs are never downloaded), and once more after the download has filled
//! in the sniffed format, dimensions, size and content hash. Properties that
//! are still unknown are never a reason to reject.

use crate::config::ValidationConfig;
use crate::sources::ImageCandidate;
use crate::utils::{url_has_foreign_extension, url_image_kind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Why a candidate was turned down
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Not an http(s) URL (including `data:` URIs)
    UnsupportedScheme,
    /// URL path or alt text contains a blocklisted word
    Blocklisted,
    /// URL names a non-image file (`.svg`, `.php`, ...)
    ForeignExtension,
    /// Format is not in the allowed set
    FormatNotAllowed,
    /// Width or height below the minimum
    TooSmall,
    /// Longer side too many times the shorter side
    AspectRatio,
    /// Body larger than the configured maximum
    TooLarge,
    /// URL already seen in this session
    DuplicateUrl,
    /// Identical content already accepted in this session
    DuplicateContent,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::UnsupportedScheme => "unsupported scheme",
            RejectReason::Blocklisted => "blocklisted",
            RejectReason::ForeignExtension => "non-image extension",
            RejectReason::FormatNotAllowed => "format not allowed",
            RejectReason::TooSmall => "too small",
            RejectReason::AspectRatio => "extreme aspect ratio",
            RejectReason::TooLarge => "too large",
            RejectReason::DuplicateUrl => "duplicate URL",
            RejectReason::DuplicateContent => "duplicate content",
        };
        f.write_str(s)
    }
}

/// Outcome of [`Validator::accept`]
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the candidate may be kept
    pub accepted: bool,
    /// Set when `accepted` is false
    pub reason: Option<RejectReason>,
}

impl Verdict {
    fn accept() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    fn reject(reason: RejectReason) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
        }
    }
}

/// URLs and content hashes already seen by one species session
#[derive(Clone, Debug, Default)]
pub struct DedupSet {
    urls: HashSet<String>,
    hashes: HashSet<String>,
}

impl DedupSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a URL
    pub fn insert_url(&mut self, url: &str) {
        self.urls.insert(url.to_string());
    }

    /// Remember a content hash
    pub fn insert_hash(&mut self, hash: &str) {
        self.hashes.insert(hash.to_string());
    }

    /// Whether the URL has been seen
    pub fn contains_url(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    /// Whether the content hash has been seen
    pub fn contains_hash(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    /// Number of distinct content hashes
    pub fn hash_count(&self) -> usize {
        self.hashes.len()
    }
}

/// Applies [`ValidationConfig`] to candidates
#[derive(Clone, Debug)]
pub struct Validator {
    config: ValidationConfig,
    blocklist: Vec<String>,
}

impl Validator {
    /// Validator for the given rules
    pub fn new(config: ValidationConfig) -> Self {
        let blocklist = config
            .blocklist
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { config, blocklist }
    }

    /// Decide whether `candidate` may be kept
    pub fn accept(&self, candidate: &ImageCandidate, seen: &DedupSet) -> Verdict {
        let Ok(url) = url::Url::parse(&candidate.url) else {
            return Verdict::reject(RejectReason::UnsupportedScheme);
        };
        if !matches!(url.scheme(), "http" | "https") {
            return Verdict::reject(RejectReason::UnsupportedScheme);
        }
        if seen.contains_url(&candidate.url) {
            return Verdict::reject(RejectReason::DuplicateUrl);
        }

        let path = urlencoding::decode(url.path())
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| url.path().to_string());
        if self.is_blocklisted(&path)
            || candidate
                .alt
                .as_deref()
                .is_some_and(|alt| self.is_blocklisted(alt))
        {
            return Verdict::reject(RejectReason::Blocklisted);
        }

        if url_has_foreign_extension(&candidate.url) {
            return Verdict::reject(RejectReason::ForeignExtension);
        }
        if let Some(kind) = candidate.content_type.or_else(|| url_image_kind(&candidate.url))
            && !self.config.allowed_formats.contains(&kind)
        {
            return Verdict::reject(RejectReason::FormatNotAllowed);
        }

        if let Some(bytes) = candidate.byte_size
            && bytes > self.config.max_image_bytes
        {
            return Verdict::reject(RejectReason::TooLarge);
        }

        if let Some((width, height)) = candidate.dimensions {
            if width < self.config.min_width || height < self.config.min_height {
                return Verdict::reject(RejectReason::TooSmall);
            }
            let (long, short) = (width.max(height), width.min(height));
            if short == 0 || f64::from(long) / f64::from(short) > self.config.max_aspect_ratio {
                return Verdict::reject(RejectReason::AspectRatio);
            }
        }

        if let Some(hash) = &candidate.content_hash
            && seen.contains_hash(hash)
        {
            return Verdict::reject(RejectReason::DuplicateContent);
        }

        Verdict::accept()
    }

    /// Word-level match so that e.g. "Acanthurus" does not trip on "ad"
    fn is_blocklisted(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .any(|token| {
                self.blocklist.iter().any(|word| {
                    token == word
                        || token
                            .strip_prefix(word.as_str())
                            .is_some_and(|rest| matches!(rest, "s" | "es" | "nail" | "nails"))
                })
            })
    }
}
