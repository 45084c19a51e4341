//! Core types shared across the listing engine: products and result pages,
//! filter/sort/pagination state, and the immutable query snapshot.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Catalog entities (read-only to the engine)
// ---------------------------------------------------------------------------

/// A catalog product as returned by the backend.
///
/// Fields the engine does not know about are kept in `extra` so they stay
/// addressable by name for local sorting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub category_id: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub image: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A comparable value extracted from a product field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortKey<'a> {
    Number(f64),
    Text(&'a str),
}

impl Product {
    /// Minimal constructor, mostly for tests and fixtures.
    pub fn new(id: i64, name: impl Into<String>, price: f64, category_id: i64) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            category_id,
            description: String::new(),
            short_description: String::new(),
            quantity: 0,
            image: String::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Look up the sortable value of `field`. Both the camelCase wire names and
    /// the snake_case Rust names are accepted for built-in fields.
    pub fn sort_key(&self, field: &str) -> Option<SortKey<'_>> {
        match field {
            "id" => Some(SortKey::Number(self.id as f64)),
            "name" => Some(SortKey::Text(&self.name)),
            "price" => Some(SortKey::Number(self.price)),
            "categoryId" | "category_id" => Some(SortKey::Number(self.category_id as f64)),
            "quantity" => Some(SortKey::Number(self.quantity as f64)),
            "description" => Some(SortKey::Text(&self.description)),
            "shortDescription" | "short_description" => Some(SortKey::Text(&self.short_description)),
            "image" => Some(SortKey::Text(&self.image)),
            other => match self.extra.get(other)? {
                serde_json::Value::Number(n) => n.as_f64().map(SortKey::Number),
                serde_json::Value::String(s) => Some(SortKey::Text(s)),
                serde_json::Value::Bool(b) => Some(SortKey::Number(if *b { 1.0 } else { 0.0 })),
                _ => None,
            },
        }
    }
}

/// Order two optional keys. Missing or mismatched keys compare equal.
pub fn compare_keys(a: Option<SortKey<'_>>, b: Option<SortKey<'_>>) -> Ordering {
    match (a, b) {
        (Some(SortKey::Number(x)), Some(SortKey::Number(y))) => x.total_cmp(&y),
        (Some(SortKey::Text(x)), Some(SortKey::Text(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// One page of search results. `total` is the backend's match count and is
/// never altered by local post-processing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultPage {
    #[serde(alias = "list")]
    pub items: Vec<Product>,
    pub total: u64,
}

// ---------------------------------------------------------------------------
// Sort specification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(EngineError::invalid(
                "sort_direction",
                format!("expected 'asc' or 'desc', got '{other}'"),
            )),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field plus direction. The textual form is `"<field>,<asc|desc>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self { field: field.into(), direction }
    }

    /// Compare two products under this specification.
    pub fn compare(&self, a: &Product, b: &Product) -> Ordering {
        let ord = compare_keys(a.sort_key(&self.field), b.sort_key(&self.field));
        match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::new("name", SortDirection::Asc)
    }
}

impl FromStr for SortSpec {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, direction) = match s.split_once(',') {
            Some((field, dir)) => (field.trim(), dir.parse()?),
            None => (s.trim(), SortDirection::Asc),
        };
        if field.is_empty() {
            return Err(EngineError::invalid("sort_field", "field name is empty"));
        }
        Ok(Self::new(field, direction))
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.field, self.direction)
    }
}

// ---------------------------------------------------------------------------
// Query state
// ---------------------------------------------------------------------------

/// Filter and sort fields of a listing session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FilterState {
    pub search_term: String,
    pub category_id: Option<i64>,
    pub sort: SortSpec,
}

/// Page cursor of a listing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationState {
    pub page_index: usize,
    pub page_size: usize,
}

/// Immutable composite of every query-affecting field, ordered by `seq`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuerySnapshot {
    pub seq: u64,
    pub filter: FilterState,
    pub pagination: PaginationState,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
