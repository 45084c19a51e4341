//! One product-listing session: state store, combiner, executor and live
//! search wired together behind the setter/subscribe surface the listing view
//! talks to.
//!
//! Construction seeds every field (empty term, no category, configured sort,
//! first page at the first allowed size) and dispatches the initial fetch
//! through the dispatch debounce, so it must happen inside a Tokio runtime
//! ([`EngineError::NoRuntime`] otherwise). Dropping the engine tears it down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::SearchBackend;
use crate::config::EngineConfig;
use crate::debounce::Debouncer;
use crate::error::{EngineError, EngineResult};
use crate::executor::{EngineStats, ExecutorOptions, FetchFailure, QueryExecutor};
use crate::pubsub::{Subscription, Topic};
use crate::store::{StateStore, StoreUpdate};
use crate::types::{FilterState, PaginationState, QuerySnapshot, ResultPage, SortSpec};

pub struct ListingEngine {
    session_id: Uuid,
    config: EngineConfig,
    store: Arc<StateStore>,
    executor: QueryExecutor,
    live_search: Debouncer<String>,
    dispatch_gate: Option<Debouncer<QuerySnapshot>>,
    wiring: Mutex<Vec<Subscription>>,
    disposed: AtomicBool,
}

impl ListingEngine {
    pub fn new(config: EngineConfig, backend: Arc<dyn SearchBackend>) -> EngineResult<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(EngineError::NoRuntime);
        }
        let session_id = Uuid::new_v4();
        let page_size = config.default_page_size();
        let store = Arc::new(StateStore::seeded(
            config.page_sizes.clone(),
            FilterState { search_term: String::new(), category_id: None, sort: config.default_sort.clone() },
            PaginationState { page_index: 0, page_size },
        )?);
        let executor = QueryExecutor::new(
            backend,
            ExecutorOptions {
                post: config.post_processor(),
                fetch_timeout: config.fetch_timeout(),
                abort_superseded: config.abort_superseded,
            },
        );

        let mut wiring = Vec::new();

        // store -> [dispatch debounce] -> executor
        let dispatch_gate = config.dispatch_debounce().map(Debouncer::new);
        match &dispatch_gate {
            Some(gate) => {
                let gate_in = gate.clone();
                wiring.push(store.snapshots().subscribe(move |s: &QuerySnapshot| gate_in.push(s.clone())));
                let exec = executor.clone();
                wiring.push(gate.output().subscribe(move |s: &QuerySnapshot| exec.execute(s)));
            }
            None => {
                let exec = executor.clone();
                wiring.push(store.snapshots().subscribe(move |s: &QuerySnapshot| exec.execute(s)));
            }
        }

        // live search -> search term
        let live_search = Debouncer::new(config.debounce());
        let term_sink = Arc::clone(&store);
        wiring.push(live_search.output().subscribe(move |term: &String| {
            if let Err(e) = term_sink.set_search_term(term.clone()) {
                warn!(error = %e, "Live search term rejected");
            }
        }));

        info!(
            session = %session_id,
            page_size,
            sort = %config.default_sort,
            dispatch_debounce_ms = config.dispatch_debounce_ms,
            "Listing session started"
        );

        let engine = Self {
            session_id,
            config,
            store,
            executor,
            live_search,
            dispatch_gate,
            wiring: Mutex::new(wiring),
            disposed: AtomicBool::new(false),
        };
        engine.store.refresh();
        Ok(engine)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn page_sizes(&self) -> &[usize] {
        self.store.page_sizes()
    }

    fn ensure_live(&self) -> EngineResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(EngineError::Disposed);
        }
        Ok(())
    }

    // -- subscribe-able outputs ---------------------------------------------

    /// Post-processed result pages. Replays the current page to new subscribers.
    pub fn results(&self) -> Topic<ResultPage> {
        self.executor.results()
    }

    pub fn loading(&self) -> Topic<bool> {
        self.executor.loading()
    }

    pub fn failures(&self) -> Topic<FetchFailure> {
        self.executor.failures()
    }

    pub fn snapshots(&self) -> Topic<QuerySnapshot> {
        self.store.snapshots()
    }

    pub fn current_page(&self) -> Option<ResultPage> {
        self.executor.results().latest()
    }

    pub fn current_snapshot(&self) -> Option<QuerySnapshot> {
        self.store.current()
    }

    pub fn is_loading(&self) -> bool {
        self.executor.is_loading()
    }

    pub fn stats(&self) -> EngineStats {
        self.executor.stats()
    }

    // -- setters -------------------------------------------------------------

    /// Submit a search term. Resets to the first page and supersedes any
    /// pending live-search input. Live search then starts afresh, so typing a
    /// term it settled on before is applied again.
    pub fn set_search_term(&self, term: impl Into<String>) -> EngineResult<Option<QuerySnapshot>> {
        self.ensure_live()?;
        self.live_search.cancel();
        self.live_search.reset();
        self.store.set_search_term(term)
    }

    pub fn set_category(&self, category_id: Option<i64>) -> EngineResult<Option<QuerySnapshot>> {
        self.ensure_live()?;
        self.store.set_category(category_id)
    }

    pub fn set_sort(&self, sort: SortSpec) -> EngineResult<Option<QuerySnapshot>> {
        self.ensure_live()?;
        self.store.set_sort(sort)
    }

    /// Set the sort from its textual `"field,dir"` form.
    pub fn set_sort_text(&self, sort: &str) -> EngineResult<Option<QuerySnapshot>> {
        self.ensure_live()?;
        self.store.set_sort(sort.parse()?)
    }

    pub fn set_page(&self, page_index: usize, page_size: usize) -> EngineResult<Option<QuerySnapshot>> {
        self.ensure_live()?;
        self.store.set_page(page_index, page_size)
    }

    /// Change several fields at once; one snapshot, one fetch. The closure
    /// runs without any engine lock held and may read the engine.
    pub fn update<F>(&self, apply: F) -> EngineResult<Option<QuerySnapshot>>
    where
        F: FnOnce(&mut StoreUpdate<'_>) -> EngineResult<()>,
    {
        self.ensure_live()?;
        self.store.update(apply)
    }

    /// Re-run the current query.
    pub fn refresh(&self) -> EngineResult<Option<QuerySnapshot>> {
        self.ensure_live()?;
        Ok(self.store.refresh())
    }

    /// Live-as-you-type search: the trimmed term is applied once input has
    /// been quiet for the configured debounce interval.
    pub fn type_search(&self, raw: &str) -> EngineResult<()> {
        self.ensure_live()?;
        self.live_search.push(raw.trim().to_string());
        Ok(())
    }

    // -- teardown ------------------------------------------------------------

    /// Abort outstanding work, publish idle, and release every subscription.
    /// Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.live_search.dispose();
        if let Some(gate) = &self.dispatch_gate {
            gate.dispose();
        }
        let wiring = std::mem::take(&mut *self.wiring.lock().unwrap_or_else(PoisonError::into_inner));
        for sub in wiring {
            sub.unsubscribe();
        }
        self.executor.dispose();
        self.store.snapshots().dispose();

        let stats = self.executor.stats();
        info!(
            session = %self.session_id,
            dispatched = stats.dispatched,
            applied = stats.applied,
            failed = stats.failed,
            discarded = stats.discarded,
            aborted = stats.aborted,
            "Listing session closed"
        );
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for ListingEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}
