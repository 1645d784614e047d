//! Configuration types for species-dl

use crate::error::{Error, Result};
use crate::types::ImageKind;
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Main configuration for the acquisition pipeline
///
/// Every field has a default, so an empty JSON object is a valid configuration.
/// Sub-configs group settings by the component that consumes them:
/// - [`retry`](RetryConfig): download retry/backoff policy
/// - [`browser`](BrowserConfig): the shared page-fetching session
/// - [`validation`](ValidationConfig): candidate acceptance rules
/// - [`download`](DownloadConfig): image transfer settings
/// - [`search`](SearchConfig): search term derivation
/// - [`sources`](SourcesConfig): which sources run and where they point
/// - [`batch`](BatchConfig): quota, output layout and pacing of a run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Shared browser session settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Candidate validation rules
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Image transfer settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Search term derivation
    #[serde(default)]
    pub search: SearchConfig,

    /// Source selection and endpoints
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Batch run settings
    #[serde(default)]
    pub batch: BatchConfig,
}

impl Config {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their defaults. The loaded configuration is validated.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read config file {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.browser.delay_min_ms > self.browser.delay_max_ms {
            return Err(config_error(
                "delay_min_ms must not exceed delay_max_ms",
                "browser.delay_min_ms",
            ));
        }
        if self.batch.species_delay_min_ms > self.batch.species_delay_max_ms {
            return Err(config_error(
                "species_delay_min_ms must not exceed species_delay_max_ms",
                "batch.species_delay_min_ms",
            ));
        }
        if self.validation.allowed_formats.is_empty() {
            return Err(config_error(
                "at least one image format must be allowed",
                "validation.allowed_formats",
            ));
        }
        if self.validation.max_aspect_ratio < 1.0 {
            return Err(config_error(
                "max_aspect_ratio must be at least 1.0",
                "validation.max_aspect_ratio",
            ));
        }
        if self.batch.images_per_species == 0 {
            return Err(config_error(
                "images_per_species must be positive",
                "batch.images_per_species",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(config_error(
                "backoff_multiplier must be at least 1.0",
                "retry.backoff_multiplier",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

/// Retry configuration for image downloads
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 3)
    ///
    /// A value of `N` allows at most `N + 1` attempts per candidate.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Settings for the shared page-fetching session used by source strategies
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// User agent sent with every page request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (default: 15 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Lower bound of the randomized pause between page requests, in milliseconds
    #[serde(default = "default_delay_min_ms")]
    pub delay_min_ms: u64,

    /// Upper bound of the randomized pause between page requests, in milliseconds
    #[serde(default = "default_delay_max_ms")]
    pub delay_max_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            delay_min_ms: default_delay_min_ms(),
            delay_max_ms: default_delay_max_ms(),
        }
    }
}

/// Candidate acceptance rules
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Minimum pixel width (default: 150)
    #[serde(default = "default_min_dimension")]
    pub min_width: u32,

    /// Minimum pixel height (default: 150)
    #[serde(default = "default_min_dimension")]
    pub min_height: u32,

    /// Maximum ratio of the longer to the shorter side (default: 5.0)
    #[serde(default = "default_max_aspect_ratio")]
    pub max_aspect_ratio: f64,

    /// Raster formats that may be saved (default: jpeg, png, webp)
    #[serde(default = "default_allowed_formats")]
    pub allowed_formats: Vec<ImageKind>,

    /// Words that mark a URL or alt text as not showing the subject
    #[serde(default = "default_blocklist")]
    pub blocklist: Vec<String>,

    /// Largest accepted image body in bytes (default: 20 MiB)
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_width: default_min_dimension(),
            min_height: default_min_dimension(),
            max_aspect_ratio: default_max_aspect_ratio(),
            allowed_formats: default_allowed_formats(),
            blocklist: default_blocklist(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

/// Image transfer settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Per-attempt transfer timeout (default: 10 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout: default_download_timeout(),
        }
    }
}

/// Search term derivation settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Generic qualifier appended to names for the broader search terms (default: "fish")
    #[serde(default = "default_qualifier")]
    pub qualifier: String,

    /// Append the catalog's free-text keywords as last-resort terms (default: true)
    #[serde(default = "default_true")]
    pub use_keywords: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            qualifier: default_qualifier(),
            use_keywords: true,
        }
    }
}

/// Source selection and endpoint overrides
///
/// Base URLs exist so that tests and mirrors can redirect a source; the
/// defaults point at the public sites.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Source names to leave out of the fallback chain (e.g. `["google"]`)
    #[serde(default)]
    pub disabled: Vec<String>,

    /// Wikimedia Commons base URL
    #[serde(default = "default_wikimedia_url")]
    pub wikimedia_url: String,

    /// Wikipedia base URL
    #[serde(default = "default_wikipedia_url")]
    pub wikipedia_url: String,

    /// FishBase base URL
    #[serde(default = "default_fishbase_url")]
    pub fishbase_url: String,

    /// Flickr base URL
    #[serde(default = "default_flickr_url")]
    pub flickr_url: String,

    /// Bing base URL
    #[serde(default = "default_bing_url")]
    pub bing_url: String,

    /// Google base URL
    #[serde(default = "default_google_url")]
    pub google_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            wikimedia_url: default_wikimedia_url(),
            wikipedia_url: default_wikipedia_url(),
            fishbase_url: default_fishbase_url(),
            flickr_url: default_flickr_url(),
            bing_url: default_bing_url(),
            google_url: default_google_url(),
        }
    }
}

impl SourcesConfig {
    /// Whether the named source takes part in the fallback chain
    pub fn is_enabled(&self, name: &str) -> bool {
        !self.disabled.iter().any(|d| d.eq_ignore_ascii_case(name))
    }
}

/// Batch run settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Target number of images per species (default: 10)
    #[serde(default = "default_images_per_species")]
    pub images_per_species: usize,

    /// Root directory for species folders (default: "fish_images")
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Lower bound of the pause between species, in milliseconds
    #[serde(default = "default_species_delay_min_ms")]
    pub species_delay_min_ms: u64,

    /// Upper bound of the pause between species, in milliseconds
    #[serde(default = "default_species_delay_max_ms")]
    pub species_delay_max_ms: u64,

    /// Write a progress snapshot after this many species (0 = never)
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,

    /// Count images already in a species folder toward its quota (default: true)
    #[serde(default = "default_true")]
    pub resume_existing: bool,

    /// Write JSON run reports under `<output_root>/reports` (default: true)
    #[serde(default = "default_true")]
    pub write_reports: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            images_per_species: default_images_per_species(),
            output_root: default_output_root(),
            species_delay_min_ms: default_species_delay_min_ms(),
            species_delay_max_ms: default_species_delay_max_ms(),
            progress_every: default_progress_every(),
            resume_existing: true,
            write_reports: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
        .to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_delay_min_ms() -> u64 {
    1000
}

fn default_delay_max_ms() -> u64 {
    2000
}

fn default_min_dimension() -> u32 {
    150
}

fn default_max_aspect_ratio() -> f64 {
    5.0
}

fn default_allowed_formats() -> Vec<ImageKind> {
    vec![ImageKind::Jpeg, ImageKind::Png, ImageKind::Webp]
}

fn default_blocklist() -> Vec<String> {
    [
        "profile", "avatar", "logo", "icon", "button", "banner", "favicon", "thumb", "sprite",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_image_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_qualifier() -> String {
    "fish".to_string()
}

fn default_wikimedia_url() -> String {
    "https://commons.wikimedia.org".to_string()
}

fn default_wikipedia_url() -> String {
    "https://en.wikipedia.org".to_string()
}

fn default_fishbase_url() -> String {
    "https://www.fishbase.se".to_string()
}

fn default_flickr_url() -> String {
    "https://www.flickr.com".to_string()
}

fn default_bing_url() -> String {
    "https://www.bing.com".to_string()
}

fn default_google_url() -> String {
    "https://www.google.com".to_string()
}

fn default_images_per_species() -> usize {
    10
}

fn default_output_root() -> PathBuf {
    PathBuf::from("fish_images")
}

fn default_species_delay_min_ms() -> u64 {
    3000
}

fn default_species_delay_max_ms() -> u64 {
    7000
}

fn default_progress_every() -> usize {
    5
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
