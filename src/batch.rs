//! Batch controller
//!
//! Runs one [`SpeciesSession`] at a time over a [`SpeciesQueue`], owning the
//! browser session for the whole run. Individual species never fail the
//! batch; only an unusable output root or a browser that cannot be launched
//! does.

use crate::catalog::{SpeciesQueue, SpeciesRecord};
use crate::config::Config;
use crate::download::DownloadEngine;
use crate::error::{Error, Result};
use crate::retry::random_delay;
use crate::session::{SessionContext, SessionSummary, SpeciesSession};
use crate::sources::{BrowserSession, SourceRegistry};
use crate::types::{Event, SessionStatus};
use crate::validation::Validator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Directory under the output root that receives run reports
pub const REPORTS_DIR: &str = "reports";

/// Aggregate outcome of a batch run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run ended
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in seconds
    pub elapsed_secs: f64,
    /// Whether the run was cancelled before the queue was exhausted
    pub cancelled: bool,
    /// Species in the queue
    pub queued: usize,
    /// Species whose session ran
    pub attempted: usize,
    /// Sessions that reached their target
    pub satisfied: usize,
    /// Sessions with some but not enough images
    pub partial: usize,
    /// Sessions with no images
    pub failed: usize,
    /// Images saved during this run
    pub images_saved: usize,
    /// Images requested per species
    pub target_per_species: usize,
    /// Images requested over all attempted species
    pub total_target: usize,
    /// Satisfied sessions as a percentage of attempted ones
    pub success_rate: f64,
    /// Images held (capped at each target) as a percentage of `total_target`
    pub completion_rate: f64,
    /// Per-species breakdown in queue order
    pub species: Vec<SessionSummary>,
}

impl RunReport {
    fn begin(queued: usize, target_per_species: usize) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            elapsed_secs: 0.0,
            cancelled: false,
            queued,
            attempted: 0,
            satisfied: 0,
            partial: 0,
            failed: 0,
            images_saved: 0,
            target_per_species,
            total_target: 0,
            success_rate: 0.0,
            completion_rate: 0.0,
            species: Vec::new(),
        }
    }

    fn record(&mut self, summary: SessionSummary) {
        self.attempted += 1;
        match summary.status {
            SessionStatus::Satisfied => self.satisfied += 1,
            SessionStatus::Partial => self.partial += 1,
            _ => self.failed += 1,
        }
        self.images_saved += summary.accepted;
        self.total_target += summary.target;
        self.species.push(summary);
        self.refresh_rates();
    }

    fn refresh_rates(&mut self) {
        self.success_rate = percentage(self.satisfied, self.attempted);
        let held: usize = self
            .species
            .iter()
            .map(|s| s.total().min(s.target))
            .sum();
        self.completion_rate = percentage(held, self.total_target);
    }

    fn finish(&mut self, cancelled: bool) {
        let now = Utc::now();
        self.cancelled = cancelled;
        self.elapsed_secs = (now - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.finished_at = Some(now);
    }

    /// Summaries with the given status
    pub fn with_status(&self, status: SessionStatus) -> impl Iterator<Item = &SessionSummary> {
        self.species.iter().filter(move |s| s.status == status)
    }

    /// Write the report as pretty JSON to `path`
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Species attempted: {}/{}", self.attempted, self.queued)?;
        writeln!(f, "  satisfied: {}", self.satisfied)?;
        writeln!(f, "  partial:   {}", self.partial)?;
        writeln!(f, "  failed:    {}", self.failed)?;
        writeln!(
            f,
            "Images saved: {} (completion {:.1}%, success rate {:.1}%)",
            self.images_saved, self.completion_rate, self.success_rate
        )?;
        write!(f, "Elapsed: {:.1}s", self.elapsed_secs)?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

/// Drives species sessions over a queue
pub struct BatchController {
    config: Config,
    registry: SourceRegistry,
    event_tx: broadcast::Sender<Event>,
}

impl BatchController {
    /// Controller trying `registry`'s sources in order
    pub fn new(config: Config, registry: SourceRegistry) -> Self {
        let (event_tx, _rx) = broadcast::channel(1000);
        Self {
            config,
            registry,
            event_tx,
        }
    }

    /// Controller with the standard source chain from `config.sources`
    pub fn with_standard_sources(config: Config) -> Self {
        let registry = SourceRegistry::standard(&config.sources);
        Self::new(config, registry)
    }

    /// Receive progress events; lagging receivers lose the oldest events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every species in `queue`, aiming for `target` images each
    ///
    /// Returns `Err` only when `output_root` cannot be created or the browser
    /// session cannot be started. Cancelling `cancel` stops the run after
    /// the current candidate and still yields a report.
    pub async fn run(
        &self,
        queue: SpeciesQueue,
        target: usize,
        output_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        tokio::fs::create_dir_all(output_root)
            .await
            .map_err(|e| Error::OutputRoot {
                path: output_root.to_path_buf(),
                source: e,
            })?;

        let downloader = DownloadEngine::new(&self.config)?;
        let validator = Validator::new(self.config.validation.clone());
        let browser = BrowserSession::launch(&self.config.browser)?;

        info!(
            species = queue.len(),
            target,
            sources = ?self.registry.names(),
            output_root = %output_root.display(),
            "Batch started"
        );

        let ctx = SessionContext {
            config: &self.config,
            browser: &browser,
            registry: &self.registry,
            validator: &validator,
            downloader: &downloader,
            cancel,
            events: Some(&self.event_tx),
        };
        let report = self.run_sessions(queue, target, output_root, &ctx).await;
        browser.close();

        let _ = self.event_tx.send(Event::BatchFinished {
            attempted: report.attempted,
            cancelled: report.cancelled,
        });
        info!(
            attempted = report.attempted,
            satisfied = report.satisfied,
            partial = report.partial,
            failed = report.failed,
            images = report.images_saved,
            cancelled = report.cancelled,
            "Batch finished"
        );

        if self.config.batch.write_reports {
            let path = report_path(output_root, "run", report.started_at);
            match report.save(&path).await {
                Ok(()) => info!(path = %path.display(), "Run report written"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to write run report"),
            }
        }
        Ok(report)
    }

    /// Run a single species given by name, with an optional scientific name
    pub async fn run_single(
        &self,
        name: &str,
        scientific_name: Option<&str>,
        target: usize,
        output_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let queue = SpeciesQueue::from_records(vec![SpeciesRecord::single(name, scientific_name)]);
        if queue.is_empty() {
            return Err(Error::Config {
                message: "species name must not be empty".to_string(),
                key: Some("species".to_string()),
            });
        }
        self.run(queue, target, output_root, cancel).await
    }

    async fn run_sessions(
        &self,
        queue: SpeciesQueue,
        target: usize,
        output_root: &Path,
        ctx: &SessionContext<'_>,
    ) -> RunReport {
        let batch = &self.config.batch;
        let mut report = RunReport::begin(queue.len(), target);
        let mut cancelled = false;
        let total = queue.len();

        for (index, record) in queue.into_iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if index > 0 {
                let pause = random_delay(batch.species_delay_min_ms, batch.species_delay_max_ms);
                tokio::select! {
                    _ = ctx.cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(pause) => {}
                }
            }

            info!(
                position = index + 1,
                total,
                species = %record.display_name(),
                "Processing species"
            );
            let session = SpeciesSession::new(record, target, output_root, batch.resume_existing);
            let summary = session.run(ctx).await;
            let interrupted = summary.interrupted;
            report.record(summary);

            if batch.write_reports
                && batch.progress_every > 0
                && report.attempted % batch.progress_every == 0
            {
                let path = report_path(output_root, "progress", report.started_at);
                if let Err(e) = report.save(&path).await {
                    warn!(path = %path.display(), error = %e, "Failed to write progress snapshot");
                }
            }

            if interrupted {
                cancelled = true;
                break;
            }
        }

        if cancelled {
            info!(attempted = report.attempted, "Batch cancelled");
        }
        report.finish(cancelled);
        report
    }
}

fn report_path(output_root: &Path, kind: &str, started_at: DateTime<Utc>) -> PathBuf {
    output_root.join(REPORTS_DIR).join(format!(
        "{}_{}.json",
        kind,
        started_at.format("%Y%m%d_%H%M%S")
    ))
}
