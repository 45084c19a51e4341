//! Shopfront — reactive query composition for catalog listings.
//!
//! Merges independently-mutable listing state (search term, category, sort,
//! page cursor) into single, debounced, latest-wins backend searches, with a
//! loading flag and local post-processing of the fetched pages.
//!
//! # Modules
//!
//! - [`pubsub`] — Topic/Subscription publish-subscribe primitive
//! - [`debounce`] — Quiet-interval normalizer for raw input
//! - [`store`] — Per-field state store and snapshot combiner, with page reset on new terms
//! - [`executor`] — Latest-wins fetch execution and loading status
//! - [`postprocess`] — Local category filter and sort for fetched pages
//! - [`backend`] — The `SearchBackend` capability and an in-memory catalog
//! - [`engine`] — A listing session wiring all of the above
//! - [`search_box`] — Header search box submissions
//! - [`config`] — `.shopfront.toml` loading
//! - [`types`] — Products, pages, filter/pagination state and snapshots
//! - [`error`] — Error types

pub mod backend;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod executor;
pub mod postprocess;
pub mod pubsub;
pub mod search_box;
pub mod store;
pub mod types;

pub use backend::{InMemoryCatalog, SearchBackend, SearchRequest};
pub use config::{load_config, load_config_file, EngineConfig};
pub use engine::ListingEngine;
pub use error::{ConfigError, EngineError, EngineResult, FetchError};
pub use executor::{Completion, EngineStats, FetchFailure};
pub use search_box::SearchBox;
pub use types::{FilterState, PaginationState, Product, QuerySnapshot, ResultPage, SortDirection, SortSpec};
