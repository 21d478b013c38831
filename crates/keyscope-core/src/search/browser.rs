use std::sync::Arc;

use keyscope_client::ClientError;
use keyscope_types::{KeyDetails, KeysSelected, ScanPage, Toast, events};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace, warn};

use super::session::{Query, SearchSession};
use crate::backend::KeyBackend;
use crate::bus::EventBus;
use crate::history::SearchHistory;
use crate::{Error, Result};

/// Source name stamped on events the browser emits
pub const SEARCH_SOURCE: &str = "key-search";

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Result of applying one request resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserUpdate {
    /// A scan page arrived
    Results {
        added: usize,
        loaded: usize,
        has_more: bool,
    },
    /// Exact lookup hit
    Found { key: String, details: KeyDetails },
    /// Exact lookup miss (any lookup failure counts as a miss)
    NotFound { key: String },
    /// Scan failed; the result list is unchanged
    Failed { message: String },
    /// Resolution of a superseded request; nothing changed
    Discarded,
}

enum Outcome {
    Page(keyscope_client::Result<ScanPage>),
    Details(keyscope_client::Result<KeyDetails>),
    /// The request task ended without a result (panicked or aborted)
    Abandoned,
}

struct Completion {
    id: u64,
    outcome: Outcome,
}

/// Sends a request's completion exactly once. Dropped unsent, e.g. while a
/// panicking task unwinds, it reports the request as abandoned so the
/// browser never waits on a dead task.
struct Reply {
    id: u64,
    tx: Option<mpsc::UnboundedSender<Completion>>,
}

impl Reply {
    fn new(id: u64, tx: mpsc::UnboundedSender<Completion>) -> Self {
        Self { id, tx: Some(tx) }
    }

    fn send(mut self, outcome: Outcome) {
        if let Some(tx) = self.tx.take() {
            // receiver lives as long as the browser
            let _ = tx.send(Completion {
                id: self.id,
                outcome,
            });
        }
    }

    /// Cancelled requests report nothing.
    fn disarm(mut self) {
        self.tx = None;
    }
}

impl Drop for Reply {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Completion {
                id: self.id,
                outcome: Outcome::Abandoned,
            });
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RequestKind {
    Scan { append: bool },
    Lookup { key: String },
}

struct InFlight {
    id: u64,
    kind: RequestKind,
    // cancels the request task when replaced or dropped
    _guard: DropGuard,
}

/// Key search and pagination engine bound to one environment.
///
/// Requests run on spawned tasks and report back over a channel; state only
/// changes when the owner calls [`next_update`](Self::next_update) or
/// [`settle`](Self::settle). At most one request is live: issuing a new one
/// cancels its predecessor, and a resolution whose id is not the current one
/// is discarded.
///
/// Methods that issue requests must be called from within a Tokio runtime.
pub struct KeyBrowser<B: KeyBackend> {
    backend: Arc<B>,
    env: String,
    page_size: usize,
    input: String,
    session: SearchSession,
    history: SearchHistory,
    bus: EventBus,
    next_request_id: u64,
    in_flight: Option<InFlight>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl<B: KeyBackend> std::fmt::Debug for KeyBrowser<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBrowser")
            .field("env", &self.env)
            .field("input", &self.input)
            .field("session", &self.session)
            .field("loading", &self.is_loading())
            .finish_non_exhaustive()
    }
}

impl<B: KeyBackend> KeyBrowser<B> {
    pub fn new(
        backend: Arc<B>,
        env: impl Into<String>,
        bus: EventBus,
        history: SearchHistory,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            env: env.into(),
            page_size: DEFAULT_PAGE_SIZE,
            input: String::new(),
            session: SearchSession::default(),
            history,
            bus,
            next_request_id: 0,
            in_flight: None,
            completions_tx,
            completions_rx,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Rebuild the browser for another environment. Results and any
    /// in-flight request are dropped; history and input carry over.
    #[must_use]
    pub fn switch_environment(self, env: impl Into<String>) -> Self {
        let env = env.into();
        debug!("Switching key browser from {} to {env}", self.env);
        let mut next = Self::new(self.backend, env, self.bus, self.history)
            .with_page_size(self.page_size);
        next.input = self.input;
        next
    }

    /// Update the pending input. Results are untouched until the next
    /// [`trigger_search`](Self::trigger_search).
    pub fn set_pattern(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Commit the pending input and start a new search, cancelling any
    /// request still in flight.
    pub fn trigger_search(&mut self) {
        let pattern = self.input.clone();
        self.history.record(&pattern);
        self.cancel_in_flight();

        let query = Query::classify(&pattern);
        debug!("Search {pattern:?} in {} as {query:?}", self.env);
        self.session.begin(pattern, query.clone());

        match query {
            Query::Scan { .. } => self.issue_scan(false),
            Query::Exact { key } => self.issue_lookup(key),
        }
    }

    /// Fetch the next page of the current scan and append it.
    ///
    /// # Errors
    ///
    /// Returns `Error::SearchInFlight` while a request is pending,
    /// `Error::ExactLookupActive` after an exact lookup and
    /// `Error::NoMoreResults` when the scan is exhausted.
    pub fn load_more(&mut self) -> Result<()> {
        if self.in_flight.is_some() {
            return Err(Error::SearchInFlight);
        }
        if self.session.is_exact_lookup() {
            return Err(Error::ExactLookupActive);
        }
        if self.session.query().is_none() || !self.session.has_more() {
            return Err(Error::NoMoreResults);
        }
        self.issue_scan(true);
        Ok(())
    }

    /// Scan every key from scratch.
    pub fn show_all(&mut self) {
        self.set_pattern(keyscope_types::MATCH_ALL);
        self.trigger_search();
    }

    /// Re-run a pattern picked from history. It moves to the top of the list.
    pub fn handle_history_select(&mut self, pattern: &str) {
        self.set_pattern(pattern);
        self.trigger_search();
    }

    /// Drop keys from the result list, e.g. after they were deleted.
    pub fn forget_keys(&mut self, keys: &[String]) -> usize {
        self.session.forget(keys)
    }

    /// Wait for the next request resolution and apply it. Returns `None`
    /// when nothing is in flight.
    pub async fn next_update(&mut self) -> Option<BrowserUpdate> {
        if self.in_flight.is_none() {
            return self
                .completions_rx
                .try_recv()
                .ok()
                .map(|completion| self.apply(completion));
        }
        let completion = self.completions_rx.recv().await?;
        Some(self.apply(completion))
    }

    /// Apply resolutions until nothing is in flight. Returns the last update
    /// that changed state.
    pub async fn settle(&mut self) -> Option<BrowserUpdate> {
        let mut last = None;
        while self.in_flight.is_some() {
            match self.next_update().await {
                Some(BrowserUpdate::Discarded) => {}
                Some(update) => last = Some(update),
                None => break,
            }
        }
        last
    }

    fn cancel_in_flight(&mut self) {
        if let Some(previous) = self.in_flight.take() {
            trace!("Cancelling request {}", previous.id);
        }
    }

    fn begin_request(&mut self, kind: RequestKind) -> (u64, CancellationToken) {
        self.cancel_in_flight();
        self.next_request_id += 1;
        let id = self.next_request_id;
        let token = CancellationToken::new();
        self.in_flight = Some(InFlight {
            id,
            kind,
            _guard: token.clone().drop_guard(),
        });
        (id, token)
    }

    fn issue_scan(&mut self, append: bool) {
        let Some(Query::Scan { pattern }) = self.session.query().cloned() else {
            return;
        };
        let cursors = self.session.cursors().to_vec();
        let (id, token) = self.begin_request(RequestKind::Scan { append });

        let backend = Arc::clone(&self.backend);
        let env = self.env.clone();
        let count = self.page_size;
        let reply = Reply::new(id, self.completions_tx.clone());
        trace!("Request {id}: scan {pattern:?} from {cursors:?}");

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => {
                    trace!("Request {id} cancelled");
                    reply.disarm();
                    return;
                }
                result = backend.scan_keys(&env, &pattern, &cursors, count) => Outcome::Page(result),
            };
            reply.send(outcome);
        });
    }

    fn issue_lookup(&mut self, key: String) {
        let (id, token) = self.begin_request(RequestKind::Lookup { key: key.clone() });

        let backend = Arc::clone(&self.backend);
        let env = self.env.clone();
        let reply = Reply::new(id, self.completions_tx.clone());
        trace!("Request {id}: lookup {key:?}");

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => {
                    trace!("Request {id} cancelled");
                    reply.disarm();
                    return;
                }
                result = backend.key_details(&env, &key) => Outcome::Details(result),
            };
            reply.send(outcome);
        });
    }

    fn apply(&mut self, completion: Completion) -> BrowserUpdate {
        let Some(in_flight) = self.in_flight.take_if(|f| f.id == completion.id) else {
            trace!("Discarding stale response {}", completion.id);
            return BrowserUpdate::Discarded;
        };

        match (in_flight.kind, completion.outcome) {
            (RequestKind::Scan { append }, Outcome::Page(Ok(page))) => {
                let added = self.session.apply_page(page, append);
                debug!(
                    "Loaded {added} key(s), {} total, more: {}",
                    self.session.keys().len(),
                    self.session.has_more()
                );
                BrowserUpdate::Results {
                    added,
                    loaded: self.session.keys().len(),
                    has_more: self.session.has_more(),
                }
            }
            (RequestKind::Scan { .. }, Outcome::Page(Err(e))) => {
                warn!("Key scan failed: {e}");
                self.scan_failed(e.to_string())
            }
            (RequestKind::Scan { .. }, Outcome::Abandoned) => {
                warn!("Key scan task {} ended without a result", completion.id);
                self.scan_failed("request ended without a result".to_string())
            }
            (RequestKind::Lookup { key }, Outcome::Details(Ok(details))) => {
                self.session.found(key.clone(), details.clone());
                self.select(vec![key.clone()]);
                BrowserUpdate::Found { key, details }
            }
            (RequestKind::Lookup { key }, Outcome::Details(Err(e))) => {
                log_lookup_failure(&key, &e);
                self.lookup_missed(key)
            }
            (RequestKind::Lookup { key }, Outcome::Abandoned) => {
                warn!("Lookup task for {key:?} ended without a result");
                self.lookup_missed(key)
            }
            // request kind and outcome are paired at spawn time
            _ => BrowserUpdate::Discarded,
        }
    }

    fn scan_failed(&self, message: String) -> BrowserUpdate {
        self.bus.toast(SEARCH_SOURCE, &Toast::error("Error loading keys"));
        BrowserUpdate::Failed { message }
    }

    fn lookup_missed(&mut self, key: String) -> BrowserUpdate {
        self.session.not_found();
        self.select(Vec::new());
        self.bus.toast(SEARCH_SOURCE, &Toast::warning("Key not found"));
        BrowserUpdate::NotFound { key }
    }

    fn select(&self, keys: Vec<String>) {
        self.bus
            .publish(events::KEYS_SELECTED, &KeysSelected { keys }, SEARCH_SOURCE);
    }

    #[must_use]
    pub fn env(&self) -> &str {
        &self.env
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Pending (uncommitted) input
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    #[must_use]
    pub fn session(&self) -> &SearchSession {
        &self.session
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        self.session.keys()
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.session.has_more()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether [`load_more`](Self::load_more) would issue a request
    #[must_use]
    pub fn can_load_more(&self) -> bool {
        !self.is_loading() && !self.session.is_exact_lookup() && self.session.has_more()
    }

    #[must_use]
    pub fn history(&self) -> &SearchHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut SearchHistory {
        &mut self.history
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Tear the browser down and keep its history.
    #[must_use]
    pub fn into_history(self) -> SearchHistory {
        self.history
    }
}

fn log_lookup_failure(key: &str, error: &ClientError) {
    if error.is_not_found() {
        debug!("Key {key:?} not found");
    } else {
        warn!("Lookup of {key:?} failed: {error}");
    }
}
