//! `.shopfront.toml` configuration loading.
//!
//! Unknown keys and out-of-range values are reported with `warn!` and fall
//! back to defaults; only unreadable files and TOML syntax errors fail.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::debounce::DEFAULT_QUIET_MS;
use crate::error::ConfigError;
use crate::postprocess::PostProcessor;
use crate::store::DEFAULT_PAGE_SIZES;
use crate::types::SortSpec;

/// Config file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".shopfront.toml";

/// Known top-level keys in `.shopfront.toml`.
const KNOWN_CONFIG_KEYS: &[&str] = &[
    "debounce_ms",
    "dispatch_debounce_ms",
    "page_sizes",
    "default_sort",
    "fetch_timeout_ms",
    "abort_superseded",
    "local",
];

/// Known keys of the `[local]` table.
const KNOWN_LOCAL_KEYS: &[&str] = &["category_filter", "sort"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    /// Quiet interval for live search input.
    pub debounce_ms: u64,
    /// Quiet interval applied to snapshots before dispatch, so a burst of
    /// changes costs one fetch. 0 dispatches every snapshot immediately.
    pub dispatch_debounce_ms: u64,
    /// Allowed page sizes; the first is the initial size.
    pub page_sizes: Vec<usize>,
    pub default_sort: SortSpec,
    /// Engine-side limit on one fetch. `None` leaves timeouts to the backend.
    pub fetch_timeout_ms: Option<u64>,
    /// Abort the task of a superseded fetch instead of only ignoring its result.
    pub abort_superseded: bool,
    pub local_category_filter: bool,
    pub local_sort: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_QUIET_MS,
            dispatch_debounce_ms: DEFAULT_QUIET_MS,
            page_sizes: DEFAULT_PAGE_SIZES.to_vec(),
            default_sort: SortSpec::default(),
            fetch_timeout_ms: None,
            abort_superseded: true,
            local_category_filter: true,
            local_sort: true,
        }
    }
}

impl EngineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn dispatch_debounce(&self) -> Option<Duration> {
        (self.dispatch_debounce_ms > 0).then(|| Duration::from_millis(self.dispatch_debounce_ms))
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    pub fn default_page_size(&self) -> usize {
        self.page_sizes.first().copied().unwrap_or(DEFAULT_PAGE_SIZES[0])
    }

    pub fn post_processor(&self) -> PostProcessor {
        PostProcessor { category_filter: self.local_category_filter, sort: self.local_sort }
    }

    /// Parse a config document, merging it over the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = content
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::Parse { path: CONFIG_FILE_NAME.to_string(), message: e.to_string() })?;

        let mut config = Self::default();
        warn_unknown_keys(table.keys().map(String::as_str), KNOWN_CONFIG_KEYS, CONFIG_FILE_NAME);

        if let Some(ms) = read_millis(&table, "debounce_ms") {
            config.debounce_ms = ms;
        }
        if let Some(ms) = read_millis(&table, "dispatch_debounce_ms") {
            config.dispatch_debounce_ms = ms;
        }
        if let Some(ms) = read_millis(&table, "fetch_timeout_ms") {
            config.fetch_timeout_ms = (ms > 0).then_some(ms);
        }

        if let Some(value) = table.get("page_sizes") {
            let sizes: Option<Vec<usize>> = value.as_array().and_then(|arr| {
                arr.iter()
                    .map(|v| v.as_integer().filter(|n| *n > 0).map(|n| n as usize))
                    .collect()
            });
            match sizes {
                Some(sizes) if !sizes.is_empty() => config.page_sizes = sizes,
                _ => warn!(key = "page_sizes", "Expected a non-empty array of positive integers, using defaults"),
            }
        }

        if let Some(value) = table.get("default_sort") {
            match value.as_str().map(str::parse::<SortSpec>) {
                Some(Ok(sort)) => config.default_sort = sort,
                Some(Err(e)) => warn!(key = "default_sort", error = %e, "Invalid sort, using default"),
                None => warn!(key = "default_sort", "Expected a string like \"name,asc\""),
            }
        }

        if let Some(flag) = read_bool(&table, "abort_superseded") {
            config.abort_superseded = flag;
        }

        if let Some(value) = table.get("local") {
            match value.as_table() {
                Some(local) => {
                    warn_unknown_keys(local.keys().map(String::as_str), KNOWN_LOCAL_KEYS, "[local]");
                    if let Some(flag) = read_bool(local, "category_filter") {
                        config.local_category_filter = flag;
                    }
                    if let Some(flag) = read_bool(local, "sort") {
                        config.local_sort = flag;
                    }
                }
                None => warn!(key = "local", "Expected a table"),
            }
        }

        Ok(config)
    }
}

/// Load `.shopfront.toml` from `project_root`, or defaults if it is missing
/// or unreadable.
pub fn load_config(project_root: &Path) -> EngineConfig {
    let config_path = project_root.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return EngineConfig::default();
    }
    debug!(path = %config_path.display(), "Loading config");
    match load_config_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            EngineConfig::default()
        }
    }
}

/// Load an explicit config file. Missing files are an error here.
pub fn load_config_file(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
    EngineConfig::from_toml_str(&content).map_err(|e| match e {
        ConfigError::Parse { message, .. } => ConfigError::Parse { path: path.display().to_string(), message },
        other => other,
    })
}

fn read_millis(table: &toml::Table, key: &str) -> Option<u64> {
    let value = table.get(key)?;
    match value.as_integer() {
        Some(n) if n >= 0 => Some(n as u64),
        _ => {
            warn!(key, "Expected a non-negative integer number of milliseconds");
            None
        }
    }
}

fn read_bool(table: &toml::Table, key: &str) -> Option<bool> {
    let value = table.get(key)?;
    if value.as_bool().is_none() {
        warn!(key, "Expected true or false");
    }
    value.as_bool()
}

fn warn_unknown_keys<'a>(keys: impl Iterator<Item = &'a str>, known: &[&str], section: &str) {
    for key in keys {
        if known.contains(&key) {
            continue;
        }
        match known.iter().min_by_key(|k| edit_distance(key, k)) {
            Some(suggestion) if edit_distance(key, suggestion) <= 3 => warn!(
                key,
                suggestion = *suggestion,
                "Unknown key in {section} — did you mean '{suggestion}'?"
            ),
            _ => warn!(key, "Unknown key in {section} (known keys: {})", known.join(", ")),
        }
    }
}

/// Levenshtein edit distance for typo suggestions.
fn edit_distance(a: &str, b: &str) -> usize {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
