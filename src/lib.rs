//! # species-dl
//!
//! Collects reference photographs for a list of fish species from public
//! image sources.
//!
//! ## Design Philosophy
//!
//! species-dl is designed to be:
//! - **Polite** - one species, one source and one request at a time, with randomized pauses
//! - **Resumable** - images already on disk count toward each species' quota
//! - **Configurable** - every threshold, delay and source URL can be overridden
//! - **Event-driven** - consumers subscribe to events, no polling required
//!
//! A [`SpeciesQueue`] is loaded from a CSV catalog. For every species the
//! [`BatchController`] runs a [`SpeciesSession`], which queries the sources
//! of a [`SourceRegistry`] in fallback order (Wikimedia Commons, Wikipedia,
//! FishBase, Flickr, Bing, Google), validates and downloads candidates, and
//! stops once the target number of images is stored.
//!
//! ## Quick Start
//!
//! ```no_run
//! use species_dl::{BatchController, Config, SpeciesQueue, cancel_on_signal};
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let queue = SpeciesQueue::load(Path::new("fish_scraping_list_updated.csv"))?;
//!     let controller = BatchController::with_standard_sources(Config::default());
//!
//!     // Subscribe to events
//!     let mut events = controller.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(cancel_on_signal(cancel.clone()));
//!
//!     let report = controller
//!         .run(queue, 10, Path::new("fish_images"), &cancel)
//!         .await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Batch runs and run reports
pub mod batch;
/// Species catalog and search terms
pub mod catalog;
/// Configuration types
pub mod config;
/// Image downloads with retry
pub mod download;
/// Error types
pub mod error;
/// Retry logic with exponential backoff
pub mod retry;
/// Per-species acquisition state machine
pub mod session;
/// Image sources and the shared browser session
pub mod sources;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// Candidate acceptance rules
pub mod validation;

// Re-export commonly used types
pub use batch::{BatchController, RunReport};
pub use catalog::{PriorityFilter, SpeciesQueue, SpeciesRecord};
pub use config::Config;
pub use download::DownloadEngine;
pub use error::{CatalogError, DownloadError, Error, Result, SourceError};
pub use session::{SessionSummary, SpeciesSession};
pub use sources::{BrowserSession, ImageCandidate, SourceRegistry, SourceStrategy};
pub use types::{Event, ImageKind, Priority, SessionStatus, SpeciesId};
pub use validation::{RejectReason, Validator};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when a termination signal arrives.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Returns early without cancelling if the token is cancelled elsewhere first.
///
/// # Example
///
/// ```no_run
/// use species_dl::cancel_on_signal;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let cancel = CancellationToken::new();
///     tokio::spawn(cancel_on_signal(cancel.clone()));
///     // hand `cancel` to BatchController::run
/// }
/// ```
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => {}
        _ = wait_for_signal() => {
            tracing::info!("Cancelling run, finishing current candidate");
            token.cancel();
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
