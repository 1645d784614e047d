//! Per-species acquisition state machine
//!
//! A [`SpeciesSession`] moves PENDING → RUNNING → SATISFIED | PARTIAL | FAILED.
//!
//! Sources are tried in registry order. On each source every search term is
//! tried, most specific first, before the next source is consulted. Each
//! query asks only for the images still needed, and the session stops as
//! soon as the quota is met. A failing source is abandoned for this species
//! only; losing the browser session or the species directory fails the
//! species outright.

use crate::catalog::SpeciesRecord;
use crate::config::Config;
use crate::download::{DownloadEngine, remove_staging};
use crate::sources::{BrowserSession, ImageCandidate, SourceRegistry};
use crate::types::{Event, Priority, SessionStatus, SpeciesId};
use crate::utils::{existing_images, image_file_name, sha256_hex};
use crate::validation::{DedupSet, RejectReason, Validator};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared collaborators a session borrows for the duration of its run
pub struct SessionContext<'a> {
    /// Pipeline configuration
    pub config: &'a Config,
    /// Page-fetching session shared by all sources
    pub browser: &'a BrowserSession,
    /// Sources in fallback order
    pub registry: &'a SourceRegistry,
    /// Candidate rules
    pub validator: &'a Validator,
    /// Image downloader
    pub downloader: &'a DownloadEngine,
    /// Run-wide cancellation
    pub cancel: &'a CancellationToken,
    /// Event channel, if anyone is listening
    pub events: Option<&'a broadcast::Sender<Event>>,
}

impl SessionContext<'_> {
    fn emit(&self, event: Event) {
        if let Some(tx) = self.events {
            // No subscribers is fine
            let _ = tx.send(event);
        }
    }
}

/// Final account of one species session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Species ID
    pub id: SpeciesId,
    /// Display name (regional name unless absent)
    pub name: String,
    /// Most authoritative scientific name
    pub scientific_name: Option<String>,
    /// Catalog priority
    pub priority: Priority,
    /// Species output directory
    pub directory: PathBuf,
    /// Terminal status
    pub status: SessionStatus,
    /// Requested image count
    pub target: usize,
    /// Images already present before the session started
    pub existing: usize,
    /// Images saved by this session
    pub accepted: usize,
    /// Accepted images per source
    pub sources_used: BTreeMap<String, usize>,
    /// Abandoned queries per source
    pub source_failures: BTreeMap<String, u32>,
    /// Rejected candidates per reason
    pub rejections: BTreeMap<RejectReason, u32>,
    /// Candidates lost to download errors
    pub download_failures: u32,
    /// Search term that produced the first accepted image
    pub first_accepted_term: Option<String>,
    /// Files written by this session
    pub saved: Vec<PathBuf>,
    /// Whether the run was cancelled while this species was in progress
    pub interrupted: bool,
    /// Infrastructure failure, if that is why the session ended
    pub error: Option<String>,
    /// Wall-clock duration in seconds
    pub elapsed_secs: f64,
}

impl SessionSummary {
    /// Existing plus newly accepted images
    pub fn total(&self) -> usize {
        self.existing + self.accepted
    }
}

/// Outcome of processing one candidate
enum CandidateOutcome {
    Saved,
    Skipped,
}

/// One species' acquisition run
#[derive(Debug)]
pub struct SpeciesSession {
    record: SpeciesRecord,
    target: usize,
    directory: PathBuf,
    stem: String,
    resume: bool,
    status: SessionStatus,
    existing: usize,
    accepted: usize,
    next_sequence: u32,
    seen: DedupSet,
    sources_used: BTreeMap<String, usize>,
    source_failures: BTreeMap<String, u32>,
    rejections: BTreeMap<RejectReason, u32>,
    download_failures: u32,
    first_accepted_term: Option<String>,
    saved: Vec<PathBuf>,
    interrupted: bool,
    error: Option<String>,
}

impl SpeciesSession {
    /// New PENDING session writing into `<output_root>/<folder name>`
    ///
    /// With `resume`, images already in that directory count toward `target`.
    pub fn new(record: SpeciesRecord, target: usize, output_root: &Path, resume: bool) -> Self {
        let stem = record.folder_name();
        Self {
            directory: output_root.join(&stem),
            stem,
            record,
            target,
            resume,
            status: SessionStatus::Pending,
            existing: 0,
            accepted: 0,
            next_sequence: 1,
            seen: DedupSet::new(),
            sources_used: BTreeMap::new(),
            source_failures: BTreeMap::new(),
            rejections: BTreeMap::new(),
            download_failures: 0,
            first_accepted_term: None,
            saved: Vec::new(),
            interrupted: false,
            error: None,
        }
    }

    /// Current status
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Species output directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn total(&self) -> usize {
        self.existing + self.accepted
    }

    fn remaining(&self) -> usize {
        self.target.saturating_sub(self.total())
    }

    /// Drive the session to a terminal status
    pub async fn run(mut self, ctx: &SessionContext<'_>) -> SessionSummary {
        let started = Instant::now();
        self.status = SessionStatus::Running;
        info!(
            species_id = self.record.id.0,
            species = %self.record.display_name(),
            target = self.target,
            "Species session started"
        );
        ctx.emit(Event::SessionStarted {
            id: self.record.id,
            name: self.record.display_name().to_string(),
            target: self.target,
        });

        if let Err(message) = self.prepare_directory().await {
            self.fail(message);
        } else if self.remaining() == 0 {
            info!(
                species = %self.record.display_name(),
                existing = self.existing,
                "Quota already met by existing images"
            );
        } else {
            self.search(ctx).await;
        }

        self.status = if self.error.is_some() {
            SessionStatus::Failed
        } else if self.interrupted && self.total() < self.target {
            SessionStatus::Partial
        } else {
            SessionStatus::from_counts(self.total(), self.target)
        };

        info!(
            species = %self.record.display_name(),
            status = ?self.status,
            accepted = self.accepted,
            total = self.total(),
            target = self.target,
            "Species session finished"
        );
        ctx.emit(Event::SessionFinished {
            id: self.record.id,
            status: self.status,
            accepted: self.accepted,
        });

        self.into_summary(started.elapsed().as_secs_f64())
    }

    /// Create the species directory and account for what it already holds
    async fn prepare_directory(&mut self) -> Result<(), String> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| format!("cannot create {}: {}", self.directory.display(), e))?;

        let found = existing_images(&self.directory, &self.stem)
            .map_err(|e| format!("cannot list {}: {}", self.directory.display(), e))?;
        if let Some((last, _)) = found.last() {
            self.next_sequence = self.sequence_after(*last)?;
        }
        if !self.resume {
            return Ok(());
        }

        for (_, path) in &found {
            match tokio::fs::read(path).await {
                Ok(bytes) => self.seen.insert_hash(&sha256_hex(&bytes)),
                Err(e) => warn!(path = %path.display(), error = %e, "Cannot hash existing image"),
            }
        }
        self.existing = found.len();
        if self.existing > 0 {
            info!(
                species = %self.record.display_name(),
                existing = self.existing,
                next_sequence = self.next_sequence,
                "Resuming with existing images"
            );
        }
        Ok(())
    }

    async fn search(&mut self, ctx: &SessionContext<'_>) {
        let terms = self.record.search_terms(&ctx.config.search);

        'sources: for source in ctx.registry.iter() {
            for term in terms.terms() {
                if ctx.cancel.is_cancelled() {
                    self.interrupted = true;
                    break 'sources;
                }
                let want = self.remaining();
                if want == 0 {
                    break 'sources;
                }

                debug!(source = source.name(), term = %term, want, "Querying source");
                ctx.emit(Event::SourceQueried {
                    id: self.record.id,
                    source: source.name().to_string(),
                    term: term.clone(),
                });

                let mut candidates = source.search(ctx.browser, term, want);
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = ctx.cancel.cancelled() => {
                            self.interrupted = true;
                            break 'sources;
                        }
                        next = candidates.next() => next,
                    };

                    match next {
                        None => break,
                        Some(Err(e)) if e.is_infrastructure() => {
                            self.fail(e.to_string());
                            break 'sources;
                        }
                        Some(Err(e)) => {
                            warn!(
                                species = %self.record.display_name(),
                                source = source.name(),
                                term = %term,
                                error = %e,
                                "Source failed, moving to next source"
                            );
                            *self
                                .source_failures
                                .entry(source.name().to_string())
                                .or_default() += 1;
                            ctx.emit(Event::SourceAbandoned {
                                id: self.record.id,
                                source: source.name().to_string(),
                                error: e.to_string(),
                            });
                            continue 'sources;
                        }
                        Some(Ok(candidate)) => match self.consider(candidate, term, ctx).await {
                            Ok(CandidateOutcome::Saved) if self.remaining() == 0 => {
                                break 'sources;
                            }
                            Ok(_) => {}
                            Err(message) => {
                                self.fail(message);
                                break 'sources;
                            }
                        },
                    }

                    if ctx.cancel.is_cancelled() {
                        self.interrupted = true;
                        break 'sources;
                    }
                }
            }
        }
    }

    /// Pre-check, download, full check, then save or discard one candidate
    ///
    /// `Err` carries an infrastructure failure that ends the session.
    async fn consider(
        &mut self,
        mut candidate: ImageCandidate,
        term: &str,
        ctx: &SessionContext<'_>,
    ) -> Result<CandidateOutcome, String> {
        let verdict = ctx.validator.accept(&candidate, &self.seen);
        if let Some(reason) = verdict.reason {
            self.reject(&candidate, reason);
            return Ok(CandidateOutcome::Skipped);
        }

        let staging = self
            .directory
            .join(format!("{}_{:04}.part", self.stem, self.next_sequence));
        let fetched = match ctx.downloader.fetch(&candidate, &staging).await {
            Ok(fetched) => fetched,
            Err(e) if e.is_infrastructure() => {
                remove_staging(&staging).await;
                return Err(e.to_string());
            }
            Err(e) => {
                debug!(url = %candidate.url, error = %e, "Download failed");
                self.seen.insert_url(&candidate.url);
                self.download_failures += 1;
                remove_staging(&staging).await;
                return Ok(CandidateOutcome::Skipped);
            }
        };

        if ctx.cancel.is_cancelled() {
            ctx.downloader.discard(fetched).await;
            return Ok(CandidateOutcome::Skipped);
        }

        let Some(kind) = fetched.kind else {
            self.reject(&candidate, RejectReason::FormatNotAllowed);
            ctx.downloader.discard(fetched).await;
            return Ok(CandidateOutcome::Skipped);
        };

        fetched.annotate(&mut candidate);
        let verdict = ctx.validator.accept(&candidate, &self.seen);
        if let Some(reason) = verdict.reason {
            self.reject(&candidate, reason);
            ctx.downloader.discard(fetched).await;
            return Ok(CandidateOutcome::Skipped);
        }

        let hash = fetched.content_hash.clone();
        let final_path = self
            .directory
            .join(image_file_name(&self.stem, self.next_sequence, kind));
        let path = ctx
            .downloader
            .commit(fetched, &final_path)
            .await
            .map_err(|e| e.to_string())?;

        self.seen.insert_url(&candidate.url);
        self.seen.insert_hash(&hash);
        self.accepted += 1;
        *self.sources_used.entry(candidate.source.clone()).or_default() += 1;
        if self.first_accepted_term.is_none() {
            self.first_accepted_term = Some(term.to_string());
        }

        info!(
            species = %self.record.display_name(),
            source = %candidate.source,
            path = %path.display(),
            total = self.total(),
            target = self.target,
            "Image saved"
        );
        ctx.emit(Event::ImageSaved {
            id: self.record.id,
            path: path.clone(),
            total: self.total(),
        });
        self.saved.push(path);
        self.next_sequence = self.sequence_after(self.next_sequence)?;
        Ok(CandidateOutcome::Saved)
    }

    fn sequence_after(&self, sequence: u32) -> Result<u32, String> {
        sequence.checked_add(1).ok_or_else(|| {
            format!(
                "no sequence number left after {} in {}",
                sequence,
                self.directory.display()
            )
        })
    }

    fn reject(&mut self, candidate: &ImageCandidate, reason: RejectReason) {
        debug!(url = %candidate.url, reason = %reason, "Candidate rejected");
        if reason != RejectReason::DuplicateUrl {
            self.seen.insert_url(&candidate.url);
        }
        *self.rejections.entry(reason).or_default() += 1;
    }

    fn fail(&mut self, message: String) {
        warn!(
            species = %self.record.display_name(),
            error = %message,
            "Species session failed"
        );
        self.error = Some(message);
    }

    fn into_summary(self, elapsed_secs: f64) -> SessionSummary {
        SessionSummary {
            id: self.record.id,
            name: self.record.display_name().to_string(),
            scientific_name: self.record.scientific_names.first().cloned(),
            priority: self.record.priority,
            directory: self.directory,
            status: self.status,
            target: self.target,
            existing: self.existing,
            accepted: self.accepted,
            sources_used: self.sources_used,
            source_failures: self.source_failures,
            rejections: self.rejections,
            download_failures: self.download_failures,
            first_accepted_term: self.first_accepted_term,
            saved: self.saved,
            interrupted: self.interrupted,
            error: self.error,
            elapsed_secs,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::tests::png_bytes;
    use crate::error::SourceError;
    use crate::sources::tests::fast_browser;
    use crate::sources::{CandidateStream, SourceStrategy};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Source returning a fixed list (optionally ending in an error) and
    /// recording the `want` and term of every query
    struct ScriptedSource {
        name: &'static str,
        urls: Vec<String>,
        fail_with: Option<SourceError>,
        queries: Arc<Mutex<Vec<(String, usize)>>>,
    }

    impl ScriptedSource {
        fn new(name: &'static str, urls: Vec<String>) -> Self {
            Self {
                name,
                urls,
                fail_with: None,
                queries: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl SourceStrategy for ScriptedSource {
        fn name(&self) -> &str {
            self.name
        }

        fn search(&self, _browser: &BrowserSession, term: &str, want: usize) -> CandidateStream {
            self.queries.lock().unwrap().push((term.to_string(), want));
            let mut items: Vec<Result<ImageCandidate, SourceError>> = self
                .urls
                .iter()
                .map(|u| Ok(ImageCandidate::new(self.name, u.clone())))
                .collect();
            if let Some(e) = &self.fail_with {
                items.push(Err(e.clone()));
            }
            futures::stream::iter(items).boxed()
        }
    }

    struct Harness {
        config: Config,
        browser: BrowserSession,
        validator: Validator,
        downloader: DownloadEngine,
        cancel: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            let mut config = Config::default();
            config.retry.max_attempts = 0;
            config.download.timeout = Duration::from_secs(2);
            Self {
                validator: Validator::new(config.validation.clone()),
                downloader: DownloadEngine::new(&config).unwrap(),
                config,
                browser: fast_browser(),
                cancel: CancellationToken::new(),
            }
        }

        async fn run(&self, registry: &SourceRegistry, session: SpeciesSession) -> SessionSummary {
            let ctx = SessionContext {
                config: &self.config,
                browser: &self.browser,
                registry,
                validator: &self.validator,
                downloader: &self.downloader,
                cancel: &self.cancel,
                events: None,
            };
            session.run(&ctx).await
        }
    }

    async fn image_host(count: u8) -> MockServer {
        let server = MockServer::start().await;
        for i in 0..count {
            Mock::given(method("GET"))
                .and(path(format!("/img/{}.png", i)))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "image/png")
                        .set_body_bytes(png_bytes(200, 200, i)),
                )
                .mount(&server)
                .await;
        }
        server
    }

    fn urls(server: &MockServer, range: std::ops::Range<u8>) -> Vec<String> {
        range
            .map(|i| format!("{}/img/{}.png", server.uri(), i))
            .collect()
    }

    fn record() -> SpeciesRecord {
        SpeciesRecord::single("Kakap Merah", Some("Lutjanus malabaricus"))
    }

    #[tokio::test]
    async fn test_satisfied_from_first_source_without_touching_the_next() {
        let server = image_host(6).await;
        let first = ScriptedSource::new("first", urls(&server, 0..6));
        let second = ScriptedSource::new("second", urls(&server, 0..6));
        let second_queries = second.queries.clone();
        let registry = SourceRegistry::new()
            .with_source(Arc::new(first))
            .with_source(Arc::new(second));

        let dir = tempdir().unwrap();
        let h = Harness::new();
        let summary = h
            .run(&registry, SpeciesSession::new(record(), 4, dir.path(), true))
            .await;

        assert_eq!(summary.status, SessionStatus::Satisfied);
        assert_eq!(summary.accepted, 4);
        assert_eq!(summary.sources_used.get("first"), Some(&4));
        assert!(second_queries.lock().unwrap().is_empty());
        assert_eq!(
            summary.first_accepted_term.as_deref(),
            Some("Lutjanus malabaricus")
        );

        let names: Vec<String> = summary
            .saved
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "kakap_merah_0001.png",
                "kakap_merah_0002.png",
                "kakap_merah_0003.png",
                "kakap_merah_0004.png"
            ]
        );
        assert!(dir.path().join("kakap_merah").is_dir());
    }

    #[tokio::test]
    async fn test_all_terms_on_a_source_before_the_next_with_shrinking_want() {
        let server = image_host(3).await;
        let first = ScriptedSource::new("first", urls(&server, 0..1));
        let first_queries = first.queries.clone();
        let second = ScriptedSource::new("second", urls(&server, 1..3));
        let second_queries = second.queries.clone();
        let registry = SourceRegistry::new()
            .with_source(Arc::new(first))
            .with_source(Arc::new(second));

        let dir = tempdir().unwrap();
        let h = Harness::new();
        let summary = h
            .run(&registry, SpeciesSession::new(record(), 3, dir.path(), true))
            .await;

        let first_queries = first_queries.lock().unwrap().clone();
        assert_eq!(
            first_queries,
            vec![
                ("Lutjanus malabaricus".to_string(), 3),
                ("Lutjanus malabaricus fish".to_string(), 2),
                ("Kakap Merah".to_string(), 2),
            ]
        );
        assert_eq!(
            second_queries.lock().unwrap()[0],
            ("Lutjanus malabaricus".to_string(), 2)
        );
        assert_eq!(summary.status, SessionStatus::Satisfied);
        // The first source's single URL was offered again under every term
        assert_eq!(summary.rejections.get(&RejectReason::DuplicateUrl), Some(&2));
    }

    #[tokio::test]
    async fn test_partial_and_failed_outcomes() {
        let server = image_host(2).await;
        let registry =
            SourceRegistry::new().with_source(Arc::new(ScriptedSource::new("only", urls(&server, 0..2))));
        let dir = tempdir().unwrap();
        let h = Harness::new();

        let partial = h
            .run(&registry, SpeciesSession::new(record(), 5, dir.path(), true))
            .await;
        assert_eq!(partial.status, SessionStatus::Partial);
        assert_eq!(partial.accepted, 2);

        let empty = SourceRegistry::new().with_source(Arc::new(ScriptedSource::new("none", vec![])));
        let failed = h
            .run(
                &empty,
                SpeciesSession::new(SpeciesRecord::single("Bandeng", None), 5, dir.path(), true),
            )
            .await;
        assert_eq!(failed.status, SessionStatus::Failed);
        assert_eq!(failed.accepted, 0);
        assert!(failed.error.is_none());
    }

    #[tokio::test]
    async fn test_source_error_abandons_only_that_source() {
        let server = image_host(2).await;
        let mut flaky = ScriptedSource::new("flaky", urls(&server, 0..1));
        flaky.fail_with = Some(SourceError::Blocked {
            url: "https://flaky.example".to_string(),
            reason: "HTTP 429".to_string(),
        });
        let flaky_queries = flaky.queries.clone();
        let registry = SourceRegistry::new()
            .with_source(Arc::new(flaky))
            .with_source(Arc::new(ScriptedSource::new("backup", urls(&server, 1..2))));

        let dir = tempdir().unwrap();
        let h = Harness::new();
        let summary = h
            .run(&registry, SpeciesSession::new(record(), 2, dir.path(), true))
            .await;

        assert_eq!(flaky_queries.lock().unwrap().len(), 1);
        assert_eq!(summary.source_failures.get("flaky"), Some(&1));
        assert_eq!(summary.status, SessionStatus::Satisfied);
        assert_eq!(summary.sources_used.get("backup"), Some(&1));
    }

    #[tokio::test]
    async fn test_closed_browser_fails_the_species() {
        let mut broken = ScriptedSource::new("broken", vec![]);
        broken.fail_with = Some(SourceError::SessionClosed);
        let registry = SourceRegistry::new().with_source(Arc::new(broken));

        let dir = tempdir().unwrap();
        let h = Harness::new();
        let summary = h
            .run(&registry, SpeciesSession::new(record(), 2, dir.path(), true))
            .await;
        assert_eq!(summary.status, SessionStatus::Failed);
        assert!(summary.error.unwrap().contains("closed"));
    }

    #[tokio::test]
    async fn test_duplicate_content_under_different_urls_is_saved_once() {
        let server = MockServer::start().await;
        let body = png_bytes(300, 300, 42);
        for p in ["/a.png", "/mirror/a.png"] {
            Mock::given(method("GET"))
                .and(path(p))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
                .mount(&server)
                .await;
        }
        let registry = SourceRegistry::new().with_source(Arc::new(ScriptedSource::new(
            "s",
            vec![
                format!("{}/a.png", server.uri()),
                format!("{}/mirror/a.png", server.uri()),
            ],
        )));

        let dir = tempdir().unwrap();
        let h = Harness::new();
        let summary = h
            .run(&registry, SpeciesSession::new(record(), 5, dir.path(), true))
            .await;
        assert_eq!(summary.accepted, 1);
        assert!(summary.rejections.get(&RejectReason::DuplicateContent).is_some());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("kakap_merah"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1, "staging files must be cleaned up");
    }

    #[tokio::test]
    async fn test_resume_counts_existing_images_and_continues_numbering() {
        let server = image_host(3).await;
        let dir = tempdir().unwrap();
        let species_dir = dir.path().join("kakap_merah");
        std::fs::create_dir_all(&species_dir).unwrap();
        // Same bytes as /img/0.png, so that URL must be rejected as duplicate content
        std::fs::write(species_dir.join("kakap_merah_0004.png"), png_bytes(200, 200, 0)).unwrap();

        let registry = SourceRegistry::new()
            .with_source(Arc::new(ScriptedSource::new("s", urls(&server, 0..3))));
        let h = Harness::new();
        let summary = h
            .run(&registry, SpeciesSession::new(record(), 3, dir.path(), true))
            .await;

        assert_eq!(summary.existing, 1);
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.status, SessionStatus::Satisfied);
        assert_eq!(
            summary.rejections.get(&RejectReason::DuplicateContent),
            Some(&1)
        );
        assert!(species_dir.join("kakap_merah_0005.png").exists());
        assert!(species_dir.join("kakap_merah_0006.png").exists());
    }

    #[tokio::test]
    async fn test_maximal_existing_sequence_fails_instead_of_wrapping() {
        let server = image_host(1).await;
        let dir = tempdir().unwrap();
        let species_dir = dir.path().join("kakap_merah");
        std::fs::create_dir_all(&species_dir).unwrap();
        std::fs::write(species_dir.join("kakap_merah_4294967295.png"), b"stray").unwrap();

        let source = ScriptedSource::new("s", urls(&server, 0..1));
        let queries = source.queries.clone();
        let registry = SourceRegistry::new().with_source(Arc::new(source));
        let h = Harness::new();
        let summary = h
            .run(&registry, SpeciesSession::new(record(), 3, dir.path(), true))
            .await;

        assert_eq!(summary.status, SessionStatus::Failed);
        assert!(summary.error.unwrap().contains("4294967295"));
        assert_eq!(summary.accepted, 0);
        assert!(queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_result_does_not_shrink_what_a_source_can_supply() {
        let server = image_host(6).await;
        let page = std::iter::once(format!("\"{}/static/logo.png\"", server.uri()))
            .chain(urls(&server, 0..6).into_iter().map(|u| format!("\"{}\"", u)))
            .collect::<Vec<_>>()
            .join(",");
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("<script>var results = [{}];</script>", page)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let registry = SourceRegistry::new()
            .with_source(Arc::new(crate::sources::GoogleSource::new(&server.uri())));
        let dir = tempdir().unwrap();
        let h = Harness::new();
        let summary = h
            .run(&registry, SpeciesSession::new(record(), 5, dir.path(), true))
            .await;

        assert_eq!(summary.status, SessionStatus::Satisfied);
        assert_eq!(summary.accepted, 5);
        assert_eq!(summary.rejections.get(&RejectReason::Blocklisted), Some(&1));
    }

    #[tokio::test]
    async fn test_quota_already_met_makes_no_queries() {
        let dir = tempdir().unwrap();
        let species_dir = dir.path().join("kakap_merah");
        std::fs::create_dir_all(&species_dir).unwrap();
        for i in 1..=2u8 {
            std::fs::write(
                species_dir.join(format!("kakap_merah_000{}.png", i)),
                png_bytes(200, 200, i),
            )
            .unwrap();
        }

        let source = ScriptedSource::new("s", vec![]);
        let queries = source.queries.clone();
        let registry = SourceRegistry::new().with_source(Arc::new(source));
        let h = Harness::new();
        let summary = h
            .run(&registry, SpeciesSession::new(record(), 2, dir.path(), true))
            .await;

        assert_eq!(summary.status, SessionStatus::Satisfied);
        assert_eq!(summary.accepted, 0);
        assert!(queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_is_interrupted_partial() {
        let registry =
            SourceRegistry::new().with_source(Arc::new(ScriptedSource::new("s", vec![])));
        let dir = tempdir().unwrap();
        let h = Harness::new();
        h.cancel.cancel();

        let summary = h
            .run(&registry, SpeciesSession::new(record(), 2, dir.path(), true))
            .await;
        assert!(summary.interrupted);
        assert_eq!(summary.status, SessionStatus::Partial);
    }

    #[tokio::test]
    async fn test_uncreatable_directory_fails() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let registry =
            SourceRegistry::new().with_source(Arc::new(ScriptedSource::new("s", vec![])));
        let h = Harness::new();
        let summary = h
            .run(&registry, SpeciesSession::new(record(), 2, &blocker, true))
            .await;
        assert_eq!(summary.status, SessionStatus::Failed);
        assert!(summary.error.is_some());
    }
}
