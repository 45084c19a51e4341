//! End-to-end behavior of a listing session against a hand-driven backend.

mod helpers;

use std::time::Duration;

use helpers::{engine_with, names, page, recorder, settle};
use shopfront_core::{
    EngineConfig, EngineError, FetchError, FetchFailure, ListingEngine, Product, ResultPage, SearchBox,
    SortDirection, SortSpec,
};
use tokio::time::sleep;

/// Every snapshot dispatched as soon as it is combined.
fn immediate() -> EngineConfig {
    EngineConfig { dispatch_debounce_ms: 0, ..EngineConfig::default() }
}

fn no_abort() -> EngineConfig {
    EngineConfig { abort_superseded: false, ..immediate() }
}

// ---------------------------------------------------------------------------
// Startup and composition
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn construction_dispatches_initial_fetch() {
    let (engine, backend) = engine_with(immediate()).await;

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].term, "");
    assert_eq!((requests[0].page_index, requests[0].page_size), (0, 6));
    assert_eq!(requests[0].category_id, None);
    assert_eq!(requests[0].sort, SortSpec::new("name", SortDirection::Asc));
    assert!(engine.is_loading());

    assert!(backend.resolve(0, Ok(page(&["Desk", "Chair"], 2))));
    settle().await;
    assert!(!engine.is_loading());
    assert_eq!(names(&engine.current_page().unwrap()), vec!["Chair", "Desk"]);
}

#[tokio::test(start_paused = true)]
async fn default_engine_collapses_rapid_snapshots_into_one_fetch() {
    let (engine, backend) = engine_with(EngineConfig::default()).await;
    assert_eq!(backend.call_count(), 0, "initial snapshot waits out the quiet interval");
    assert!(!engine.is_loading());

    sleep(Duration::from_millis(49)).await;
    engine.set_search_term("phone").unwrap();
    sleep(Duration::from_millis(400)).await;

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].term, "phone");
    assert_eq!((requests[0].page_index, requests[0].page_size), (0, 6));
}

#[tokio::test(start_paused = true)]
async fn default_engine_fetches_initial_page_after_quiet_interval() {
    let (engine, backend) = engine_with(EngineConfig::default()).await;
    sleep(Duration::from_millis(300)).await;

    assert_eq!(backend.call_count(), 1);
    assert!(engine.is_loading());
    backend.resolve(0, Ok(page(&["Lamp"], 1)));
    settle().await;
    assert_eq!(names(&engine.current_page().unwrap()), vec!["Lamp"]);
    assert!(!engine.is_loading());
}

#[tokio::test(start_paused = true)]
async fn search_term_resets_page_but_keeps_size() {
    let (engine, backend) = engine_with(immediate()).await;
    engine.set_page(3, 12).unwrap();
    let snapshot = engine.set_search_term("lamp").unwrap().unwrap();
    assert_eq!(snapshot.pagination.page_index, 0);
    assert_eq!(snapshot.pagination.page_size, 12);
    settle().await;

    let last = backend.requests().pop().unwrap();
    assert_eq!((last.term.as_str(), last.page_index, last.page_size), ("lamp", 0, 12));
}

#[tokio::test(start_paused = true)]
async fn category_change_keeps_page_index() {
    let (engine, backend) = engine_with(immediate()).await;
    engine.set_page(2, 6).unwrap();
    let snapshot = engine.set_category(Some(3)).unwrap().unwrap();
    assert_eq!(snapshot.pagination.page_index, 2);
    assert_eq!(snapshot.filter.category_id, Some(3));
    settle().await;

    let last = backend.requests().pop().unwrap();
    assert_eq!((last.page_index, last.category_id), (2, Some(3)));
}

#[tokio::test(start_paused = true)]
async fn batched_update_dispatches_once() {
    let (engine, backend) = engine_with(immediate()).await;
    engine
        .update(|u| {
            u.set_category(Some(2));
            u.set_sort("price,desc".parse()?)?;
            u.set_page(1, 24)
        })
        .unwrap();
    settle().await;

    assert_eq!(backend.call_count(), 2);
    let last = backend.requests().pop().unwrap();
    assert_eq!(last.sort, SortSpec::new("price", SortDirection::Desc));
    assert_eq!((last.category_id, last.page_index, last.page_size), (Some(2), 1, 24));
}

#[tokio::test(start_paused = true)]
async fn invalid_values_are_rejected_without_dispatch() {
    let (engine, backend) = engine_with(immediate()).await;
    let before = engine.current_snapshot().unwrap();

    assert!(matches!(engine.set_page(0, 7), Err(EngineError::InvalidStateValue { field: "page_size", .. })));
    assert!(matches!(engine.set_sort_text("name,sideways"), Err(EngineError::InvalidStateValue { .. })));
    settle().await;

    assert_eq!(backend.call_count(), 1);
    assert_eq!(engine.current_snapshot().unwrap(), before);
}

#[tokio::test(start_paused = true)]
async fn refresh_refetches_current_query() {
    let (engine, backend) = engine_with(no_abort()).await;
    engine.set_search_term("mug").unwrap();
    engine.refresh().unwrap();
    settle().await;

    let requests = backend.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1], requests[2]);
}

// ---------------------------------------------------------------------------
// Latest-wins and loading
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn late_result_for_superseded_snapshot_is_discarded() {
    let (engine, backend) = engine_with(no_abort()).await;
    backend.resolve(0, Ok(page(&["Initial"], 1)));
    settle().await;

    engine.set_search_term("phone").unwrap();
    engine.set_search_term("phones").unwrap();
    settle().await;
    assert_eq!(backend.call_count(), 3);

    backend.resolve(2, Ok(page(&["Phone X"], 1)));
    settle().await;
    assert!(!engine.is_loading());

    backend.resolve(1, Ok(page(&["Old phone"], 1)));
    settle().await;
    assert_eq!(names(&engine.current_page().unwrap()), vec!["Phone X"]);
    assert_eq!(engine.stats().discarded, 1);
    assert!(!engine.is_loading());
}

#[tokio::test(start_paused = true)]
async fn stale_completion_does_not_clear_loading() {
    let (engine, backend) = engine_with(no_abort()).await;
    engine.set_search_term("a").unwrap();
    settle().await;

    backend.resolve(0, Ok(page(&["Initial"], 1)));
    settle().await;
    assert!(engine.is_loading(), "the newest fetch is still outstanding");
    assert!(engine.current_page().is_none());

    backend.resolve(1, Ok(page(&["Apple"], 1)));
    settle().await;
    assert!(!engine.is_loading());
}

#[tokio::test(start_paused = true)]
async fn loading_publishes_one_transition_per_burst() {
    let (engine, backend) = engine_with(immediate()).await;
    let (seen, on_loading) = recorder::<bool>();
    let _sub = engine.loading().subscribe(on_loading);

    backend.resolve(0, Ok(page(&["Initial"], 1)));
    settle().await;
    engine.set_search_term("a").unwrap();
    engine.set_search_term("b").unwrap();
    settle().await;
    // "a" was aborted before its task ever reached the backend.
    assert_eq!(backend.call_count(), 2);
    assert_eq!(backend.requests()[1].term, "b");
    backend.resolve(1, Ok(page(&["Banana"], 1)));
    settle().await;

    assert_eq!(*seen.lock().unwrap(), vec![true, false, true, false]);
    let stats = engine.stats();
    assert_eq!(stats.dispatched, 3);
    assert_eq!(stats.aborted, 1);
    assert_eq!(stats.applied, 2);
}

#[tokio::test(start_paused = true)]
async fn failure_keeps_previous_page_and_session_alive() {
    let (engine, backend) = engine_with(immediate()).await;
    let (failures, on_failure) = recorder::<FetchFailure>();
    let _sub = engine.failures().subscribe(on_failure);

    backend.resolve(0, Ok(page(&["Desk"], 1)));
    settle().await;
    let snapshot = engine.set_search_term("x").unwrap().unwrap();
    settle().await;
    backend.resolve(1, Err(FetchError::Server { status: 500, message: "boom".to_string() }));
    settle().await;

    assert!(!engine.is_loading());
    assert_eq!(names(&engine.current_page().unwrap()), vec!["Desk"]);
    let failures = failures.lock().unwrap().clone();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].seq, snapshot.seq);

    engine.set_search_term("y").unwrap();
    settle().await;
    assert_eq!(backend.call_count(), 3);
    backend.resolve(2, Ok(page(&["Yoyo"], 1)));
    settle().await;
    assert_eq!(names(&engine.current_page().unwrap()), vec!["Yoyo"]);
}

#[tokio::test(start_paused = true)]
async fn fetch_timeout_is_reported_as_failure() {
    let config = EngineConfig { fetch_timeout_ms: Some(500), ..immediate() };
    let (engine, _backend) = engine_with(config).await;
    sleep(Duration::from_millis(600)).await;

    assert!(!engine.is_loading());
    let failure = engine.failures().latest().unwrap();
    assert_eq!(failure.error, FetchError::Timeout(500));
}

// ---------------------------------------------------------------------------
// Local post-processing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn local_category_filter_keeps_backend_total() {
    let (engine, backend) = engine_with(immediate()).await;
    engine.set_category(Some(1)).unwrap();
    settle().await;

    let fetched = ResultPage {
        items: vec![Product::new(1, "A", 5.0, 1), Product::new(2, "B", 5.0, 2), Product::new(3, "C", 5.0, 1)],
        total: 20,
    };
    backend.resolve(1, Ok(fetched));
    settle().await;

    let shown = engine.current_page().unwrap();
    assert_eq!(names(&shown), vec!["A", "C"]);
    assert_eq!(shown.total, 20);
}

#[tokio::test(start_paused = true)]
async fn local_sort_follows_snapshot_sort() {
    let (engine, backend) = engine_with(immediate()).await;
    engine.set_sort(SortSpec::new("price", SortDirection::Desc)).unwrap();
    settle().await;

    let fetched = ResultPage {
        items: vec![Product::new(1, "Cheap", 1.0, 1), Product::new(2, "Dear", 90.0, 1), Product::new(3, "Mid", 40.0, 1)],
        total: 3,
    };
    backend.resolve(1, Ok(fetched));
    settle().await;
    assert_eq!(names(&engine.current_page().unwrap()), vec!["Dear", "Mid", "Cheap"]);
}

// ---------------------------------------------------------------------------
// Live search
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn live_typing_settles_into_one_search() {
    let (engine, backend) = engine_with(immediate()).await;
    for raw in ["l", "la", "lam", " lamp "] {
        engine.type_search(raw).unwrap();
        sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(backend.call_count(), 1);
    sleep(Duration::from_millis(300)).await;

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].term, "lamp");
}

#[tokio::test(start_paused = true)]
async fn explicit_search_supersedes_pending_typing() {
    let (engine, backend) = engine_with(immediate()).await;
    engine.type_search("sofa").unwrap();
    engine.set_search_term("table").unwrap();
    sleep(Duration::from_millis(400)).await;

    let terms: Vec<String> = backend.requests().into_iter().map(|r| r.term).collect();
    assert_eq!(terms, vec!["", "table"]);
}

#[tokio::test(start_paused = true)]
async fn live_typing_reapplies_term_replaced_by_explicit_search() {
    let (engine, backend) = engine_with(immediate()).await;
    engine.type_search("phone").unwrap();
    sleep(Duration::from_millis(400)).await;
    engine.set_search_term("laptop").unwrap();
    engine.type_search("phone").unwrap();
    sleep(Duration::from_millis(400)).await;

    let terms: Vec<String> = backend.requests().into_iter().map(|r| r.term).collect();
    assert_eq!(terms, vec!["", "phone", "laptop", "phone"]);
    assert_eq!(engine.current_snapshot().unwrap().filter.search_term, "phone");
}

#[tokio::test(start_paused = true)]
async fn search_box_drives_engine() {
    let (engine, backend) = engine_with(immediate()).await;
    let search = SearchBox::new(Duration::from_millis(300));
    let _link = search.connect(&engine);

    search.input("desk ");
    sleep(Duration::from_millis(301)).await;
    search.input("chair");
    assert!(search.submit());
    settle().await;

    let terms: Vec<String> = backend.requests().into_iter().map(|r| r.term).collect();
    assert_eq!(terms, vec!["", "desk", "chair"]);
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[test]
fn construction_outside_a_runtime_is_an_error() {
    let backend = helpers::ManualBackend::new();
    let result = ListingEngine::new(EngineConfig::default(), backend);
    assert!(matches!(result, Err(EngineError::NoRuntime)));
}

#[tokio::test(start_paused = true)]
async fn update_closure_can_read_engine_state() {
    let (engine, backend) = engine_with(immediate()).await;
    engine
        .update(|u| {
            let current = engine.current_snapshot().expect("initial snapshot");
            u.set_page(current.pagination.page_index + 2, current.pagination.page_size)
        })
        .unwrap();
    settle().await;
    assert_eq!(backend.requests().pop().unwrap().page_index, 2);
}

#[tokio::test(start_paused = true)]
async fn dispose_stops_everything() {
    let (engine, backend) = engine_with(immediate()).await;
    let (seen, on_loading) = recorder::<bool>();
    let _sub = engine.loading().subscribe(on_loading);
    engine.type_search("pending").unwrap();

    engine.dispose();
    engine.dispose();
    assert!(engine.is_disposed());
    assert!(!engine.is_loading());
    assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    assert_eq!(engine.set_search_term("late"), Err(EngineError::Disposed));
    assert_eq!(engine.type_search("late"), Err(EngineError::Disposed));

    backend.resolve(0, Ok(page(&["Ghost"], 1)));
    sleep(Duration::from_millis(400)).await;
    assert_eq!(backend.call_count(), 1);
    assert_eq!(engine.stats().applied, 0);
    assert!(engine.current_page().is_none());
}
