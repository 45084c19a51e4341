//! The search capability consumed by the engine, plus an in-memory catalog
//! implementation with the storefront product service's semantics.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::{ConfigError, FetchError};
use crate::types::{Product, QuerySnapshot, ResultPage, SortSpec};

/// Everything a backend may use to answer one snapshot. Category and sort are
/// forwarded even though a backend is free to ignore them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    pub term: String,
    pub page_index: usize,
    pub page_size: usize,
    pub category_id: Option<i64>,
    pub sort: SortSpec,
}

impl From<&QuerySnapshot> for SearchRequest {
    fn from(s: &QuerySnapshot) -> Self {
        Self {
            term: s.filter.search_term.clone(),
            page_index: s.pagination.page_index,
            page_size: s.pagination.page_size,
            category_id: s.filter.category_id,
            sort: s.filter.sort.clone(),
        }
    }
}

/// Asynchronous product search. Implementations own their transport and
/// timeout policy; the engine treats every `Err` as a transient failure.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<ResultPage, FetchError>;
}

// ---------------------------------------------------------------------------
// In-memory catalog
// ---------------------------------------------------------------------------

/// Product list searched by case-insensitive name substring, paged from 0.
/// Category and sort are ignored, as they are by the storefront's own service.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: Vec<Product>,
    latency: Duration,
}

impl InMemoryCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products, latency: Duration::ZERO }
    }

    /// Delay every answer, to make in-flight behaviour observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Load a JSON array of products.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        let products: Vec<Product> = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::new(products))
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Synchronous query, shared by the async trait impl.
    pub fn query(&self, request: &SearchRequest) -> ResultPage {
        let needle = request.term.trim().to_lowercase();
        let matches: Vec<&Product> = self
            .products
            .iter()
            .filter(|p| needle.is_empty() || p.name.to_lowercase().contains(&needle))
            .collect();

        let total = matches.len() as u64;
        let items = matches
            .into_iter()
            .skip(request.page_index.saturating_mul(request.page_size))
            .take(request.page_size)
            .cloned()
            .collect();

        ResultPage { items, total }
    }
}

#[async_trait]
impl SearchBackend for InMemoryCatalog {
    async fn search(&self, request: &SearchRequest) -> Result<ResultPage, FetchError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let page = self.query(request);
        debug!(
            term = request.term.as_str(),
            page = request.page_index,
            size = request.page_size,
            returned = page.items.len(),
            total = page.total,
            "In-memory catalog answered"
        );
        Ok(page)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
