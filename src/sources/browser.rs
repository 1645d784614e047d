//! Shared page-fetching session
//!
//! One [`BrowserSession`] exists per batch run. It is launched by the batch
//! controller, handed to every source strategy by reference, and closed when
//! the run ends. Clones share the same client and the same closed flag, so a
//! candidate stream that outlives its `search` call still observes `close()`.

use crate::config::BrowserConfig;
use crate::error::{Error, Result, SourceError};
use crate::retry::random_delay;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Markers of anti-bot interstitials served with a 200 status
const BLOCK_MARKERS: &[&str] = &[
    "unusual traffic from your computer",
    "/sorry/index",
    "g-recaptcha",
    "captcha-form",
];

/// Handle to the shared page-fetching session
#[derive(Clone, Debug)]
pub struct BrowserSession {
    client: reqwest::Client,
    delay_min_ms: u64,
    delay_max_ms: u64,
    closed: Arc<AtomicBool>,
}

impl BrowserSession {
    /// Start a session with the configured user agent and timeout
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Browser(format!("failed to build HTTP client: {}", e)))?;

        info!(
            timeout_secs = config.request_timeout.as_secs(),
            "Browser session launched"
        );

        Ok(Self {
            client,
            delay_min_ms: config.delay_min_ms,
            delay_max_ms: config.delay_max_ms,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Release the session; every later request fails with [`SourceError::SessionClosed`]
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Browser session closed");
        }
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sleep for a politeness delay drawn from the configured range
    pub async fn pause(&self) {
        let delay = random_delay(self.delay_min_ms, self.delay_max_ms);
        debug!(delay_ms = delay.as_millis() as u64, "Politeness delay");
        tokio::time::sleep(delay).await;
    }

    /// Fetch a page body as text
    ///
    /// HTTP 403 and 429 are reported as [`SourceError::Blocked`], any other
    /// non-success status as [`SourceError::HttpStatus`].
    pub async fn get_text(&self, url: &str) -> std::result::Result<String, SourceError> {
        if self.is_closed() {
            return Err(SourceError::SessionClosed);
        }
        debug!(url = %url, "Fetching page");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::Blocked {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| transport_error(url, e))
    }

    /// Fetch a page and decode it as JSON
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> std::result::Result<T, SourceError> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| SourceError::Parse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Fail with [`SourceError::Blocked`] if the page is an anti-bot interstitial
pub(crate) fn check_not_blocked(url: &str, body: &str) -> std::result::Result<(), SourceError> {
    let lower = body.to_ascii_lowercase();
    match BLOCK_MARKERS.iter().find(|m| lower.contains(*m)) {
        Some(marker) => Err(SourceError::Blocked {
            url: url.to_string(),
            reason: format!("page contains '{}'", marker),
        }),
        None => Ok(()),
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout {
            url: url.to_string(),
        }
    } else {
        SourceError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}
