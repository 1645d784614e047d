//! In-memory image source

use futures::StreamExt;
use species_dl::error::SourceError;
use species_dl::sources::{BrowserSession, CandidateStream, ImageCandidate, SourceStrategy};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::task::Poll;
use tokio_util::sync::CancellationToken;

/// Source answering each search term from a fixed table
///
/// Terms missing from the table yield nothing. Every query is recorded.
pub struct StaticSource {
    name: String,
    results: HashMap<String, Vec<String>>,
    cancel_after: Option<(String, CancellationToken)>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl StaticSource {
    /// Empty source called `name`
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            results: HashMap::new(),
            cancel_after: None,
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer `term` with `urls`
    pub fn with_results(mut self, term: &str, urls: Vec<String>) -> Self {
        self.results.insert(term.to_string(), urls);
        self
    }

    /// After yielding the results for `term`, cancel `token` and stall
    pub fn cancelling_after(mut self, term: &str, token: CancellationToken) -> Self {
        self.cancel_after = Some((term.to_string(), token));
        self
    }

    /// Shared handle on the recorded query terms
    pub fn queries(&self) -> Arc<Mutex<Vec<String>>> {
        self.queries.clone()
    }
}

impl SourceStrategy for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn search(&self, _browser: &BrowserSession, term: &str, want: usize) -> CandidateStream {
        self.queries
            .lock()
            .expect("queries lock")
            .push(term.to_string());

        let source = self.name.clone();
        let items: Vec<Result<ImageCandidate, SourceError>> = self
            .results
            .get(term)
            .into_iter()
            .flatten()
            .take(want)
            .map(|url| Ok(ImageCandidate::new(source.clone(), url.clone())))
            .collect();
        let head = futures::stream::iter(items);

        match &self.cancel_after {
            Some((cancel_term, token)) if cancel_term == term => {
                let token = token.clone();
                head.chain(futures::stream::poll_fn(move |_| {
                    token.cancel();
                    Poll::Pending
                }))
                .boxed()
            }
            _ => head.boxed(),
        }
    }
}
