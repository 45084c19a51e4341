//! Latest-wins query execution and the loading status it drives.
//!
//! Every dispatched fetch carries its snapshot's sequence number. When a fetch
//! completes, its result is applied only if that number is still the newest
//! dispatched one; otherwise it is discarded. Ordering therefore follows
//! dispatch order, never completion order. Superseded fetch tasks are also
//! aborted when the executor is configured to do so.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{SearchBackend, SearchRequest};
use crate::error::FetchError;
use crate::postprocess::PostProcessor;
use crate::pubsub::Topic;
use crate::types::{FilterState, QuerySnapshot, ResultPage};

// ---------------------------------------------------------------------------
// Loading status
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Relay {
    published: bool,
    publishing: bool,
    dirty: bool,
}

/// Publishes a busy/idle flag on transitions only.
///
/// The flag is owned by the caller (the executor keeps it under its state
/// lock, next to the latest sequence number); [`LoadingStatus::sync`] brings
/// the topic up to date with it. Only one caller publishes at a time. A caller
/// that arrives while another is publishing, including re-entrantly from a
/// subscriber, just marks the relay dirty, and the active publisher re-reads
/// the flag until the topic agrees with it.
pub struct LoadingStatus {
    relay: Mutex<Relay>,
    topic: Topic<bool>,
}

impl Default for LoadingStatus {
    fn default() -> Self {
        Self { relay: Mutex::new(Relay::default()), topic: Topic::with_value(false) }
    }
}

impl LoadingStatus {
    pub fn topic(&self) -> Topic<bool> {
        self.topic.clone()
    }

    fn lock_relay(&self) -> MutexGuard<'_, Relay> {
        self.relay.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `current()` if it differs from the last published value.
    pub fn sync(&self, current: impl Fn() -> bool) {
        {
            let mut relay = self.lock_relay();
            if relay.publishing {
                relay.dirty = true;
                return;
            }
            relay.publishing = true;
        }
        loop {
            let busy = current();
            {
                let mut relay = self.lock_relay();
                if relay.published == busy {
                    if !relay.dirty {
                        relay.publishing = false;
                        return;
                    }
                    relay.dirty = false;
                    continue;
                }
                relay.published = busy;
                relay.dirty = false;
            }
            self.topic.publish(busy);
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A failed fetch for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub seq: u64,
    pub error: FetchError,
}

/// What happened to a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Latest fetch succeeded; its post-processed page was published.
    Applied,
    /// Latest fetch failed; a [`FetchFailure`] was published and the previous page kept.
    Failed,
    /// A newer fetch was dispatched in the meantime; the outcome was dropped.
    StaleResultDiscarded,
}

/// Counters for one executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub dispatched: u64,
    pub applied: u64,
    pub failed: u64,
    pub discarded: u64,
    pub aborted: u64,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
    aborted: AtomicU64,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    pub post: PostProcessor,
    pub fetch_timeout: Option<Duration>,
    pub abort_superseded: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self { post: PostProcessor::default(), fetch_timeout: None, abort_superseded: true }
    }
}

struct ExecState {
    latest_seq: u64,
    /// True from dispatch of `latest_seq` until its completion.
    busy: bool,
    inflight: Option<(u64, JoinHandle<()>)>,
    disposed: bool,
}

struct Shared {
    backend: Arc<dyn SearchBackend>,
    options: ExecutorOptions,
    state: Mutex<ExecState>,
    loading: LoadingStatus,
    results: Topic<ResultPage>,
    failures: Topic<FetchFailure>,
    counters: Counters,
}

pub struct QueryExecutor {
    shared: Arc<Shared>,
}

impl Clone for QueryExecutor {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl QueryExecutor {
    pub fn new(backend: Arc<dyn SearchBackend>, options: ExecutorOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                options,
                state: Mutex::new(ExecState { latest_seq: 0, busy: false, inflight: None, disposed: false }),
                loading: LoadingStatus::default(),
                results: Topic::new(),
                failures: Topic::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Post-processed pages of the latest fetches.
    pub fn results(&self) -> Topic<ResultPage> {
        self.shared.results.clone()
    }

    pub fn failures(&self) -> Topic<FetchFailure> {
        self.shared.failures.clone()
    }

    pub fn loading(&self) -> Topic<bool> {
        self.shared.loading.topic()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.lock_state().busy
    }

    /// Sequence number of the newest dispatched fetch (0 before the first).
    pub fn latest_seq(&self) -> u64 {
        self.shared.lock_state().latest_seq
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.shared.counters;
        EngineStats {
            dispatched: c.dispatched.load(Ordering::Relaxed),
            applied: c.applied.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            aborted: c.aborted.load(Ordering::Relaxed),
        }
    }

    /// Dispatch one fetch for `snapshot`, superseding whatever is in flight.
    /// Must be called from inside a Tokio runtime.
    pub fn execute(&self, snapshot: &QuerySnapshot) {
        let shared = &self.shared;
        let seq = snapshot.seq;
        {
            let mut state = shared.lock_state();
            if state.disposed {
                return;
            }
            if seq <= state.latest_seq {
                debug!(seq, latest = state.latest_seq, "Snapshot older than latest dispatch, ignored");
                return;
            }
            state.latest_seq = seq;
            state.busy = true;
        }

        shared.sync_loading();
        shared.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        let request = SearchRequest::from(snapshot);
        debug!(
            seq,
            term = request.term.as_str(),
            page = request.page_index,
            size = request.page_size,
            "Dispatching fetch"
        );

        let filter = snapshot.filter.clone();
        let backend = Arc::clone(&shared.backend);
        let timeout = shared.options.fetch_timeout;
        let weak: Weak<Shared> = Arc::downgrade(shared);

        let handle = tokio::spawn(async move {
            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, backend.search(&request)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(FetchError::Timeout(limit.as_millis() as u64)),
                },
                None => backend.search(&request).await,
            };
            if let Some(shared) = weak.upgrade() {
                shared.complete(seq, &filter, outcome);
            }
        });

        let superseded = shared.lock_state().inflight.replace((seq, handle));
        if let Some((old_seq, old)) = superseded {
            if shared.options.abort_superseded && !old.is_finished() {
                old.abort();
                shared.counters.aborted.fetch_add(1, Ordering::Relaxed);
                debug!(seq = old_seq, superseded_by = seq, "Superseded fetch aborted");
            }
        }
    }

    /// Abort any outstanding fetch, publish idle, and release every subscriber.
    pub fn dispose(&self) {
        let inflight = {
            let mut state = self.shared.lock_state();
            state.disposed = true;
            state.busy = false;
            state.inflight.take()
        };
        if let Some((seq, handle)) = inflight {
            handle.abort();
            debug!(seq, "Outstanding fetch aborted on teardown");
        }
        self.shared.sync_loading();
        self.shared.loading.topic.dispose();
        self.shared.results.dispose();
        self.shared.failures.dispose();
    }

    #[cfg(test)]
    fn complete(&self, seq: u64, filter: &FilterState, outcome: Result<ResultPage, FetchError>) -> Completion {
        self.shared.complete(seq, filter, outcome)
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ExecState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sync_loading(&self) {
        self.loading.sync(|| self.lock_state().busy);
    }

    fn complete(&self, seq: u64, filter: &FilterState, outcome: Result<ResultPage, FetchError>) -> Completion {
        {
            let mut state = self.lock_state();
            if state.disposed || seq != state.latest_seq {
                let latest = state.latest_seq;
                drop(state);
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                debug!(seq, latest, "Stale result discarded");
                return Completion::StaleResultDiscarded;
            }
            if state.inflight.as_ref().is_some_and(|(s, _)| *s == seq) {
                state.inflight = None;
            }
            state.busy = false;
        }

        self.sync_loading();

        match outcome {
            Ok(page) => {
                self.counters.applied.fetch_add(1, Ordering::Relaxed);
                let page = self.options.post.apply(page, filter);
                debug!(seq, items = page.items.len(), total = page.total, "Result applied");
                self.results.publish(page);
                Completion::Applied
            }
            Err(error) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(seq, error = %error, "Fetch failed, keeping previous page");
                self.failures.publish(FetchFailure { seq, error });
                Completion::Failed
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
