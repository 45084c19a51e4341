//! Test harness for listing-session integration tests.
//!
//! `ManualBackend` records every search request and holds it open until the
//! test resolves it by index, so completion order is fully under test control.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shopfront_core::{EngineConfig, FetchError, ListingEngine, Product, ResultPage, SearchBackend, SearchRequest};
use tokio::sync::oneshot;

type Reply = Result<ResultPage, FetchError>;

struct PendingCall {
    request: SearchRequest,
    reply: Option<oneshot::Sender<Reply>>,
}

#[derive(Default)]
pub struct ManualBackend {
    calls: Mutex<Vec<PendingCall>>,
}

impl ManualBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<SearchRequest> {
        self.calls.lock().unwrap().iter().map(|c| c.request.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Complete request `index`. Returns false if it was already resolved or
    /// its task has gone away.
    pub fn resolve(&self, index: usize, reply: Reply) -> bool {
        let sender = self.calls.lock().unwrap()[index].reply.take();
        match sender {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl SearchBackend for ManualBackend {
    async fn search(&self, request: &SearchRequest) -> Result<ResultPage, FetchError> {
        let (tx, rx) = oneshot::channel();
        self.calls.lock().unwrap().push(PendingCall { request: request.clone(), reply: Some(tx) });
        rx.await.unwrap_or_else(|_| Err(FetchError::Network("reply dropped".to_string())))
    }
}

/// Let spawned tasks and due timers run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn page(names: &[&str], total: u64) -> ResultPage {
    ResultPage {
        items: names.iter().enumerate().map(|(i, n)| Product::new(i as i64 + 1, *n, 10.0, 1)).collect(),
        total,
    }
}

pub fn names(page: &ResultPage) -> Vec<String> {
    page.items.iter().map(|p| p.name.clone()).collect()
}

/// Engine over a fresh `ManualBackend`, with the initial fetch already received.
pub async fn engine_with(config: EngineConfig) -> (Arc<ListingEngine>, Arc<ManualBackend>) {
    let backend = ManualBackend::new();
    let engine = ListingEngine::new(config, backend.clone()).expect("engine should start");
    settle().await;
    (Arc::new(engine), backend)
}

pub fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |v: &T| sink.lock().unwrap().push(v.clone()))
}
