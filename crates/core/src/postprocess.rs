//! Local post-processing of fetched pages.
//!
//! The storefront backend only understands the search term and the page cursor,
//! so category filtering and sorting are applied client-side to each page.
//! Either step can be switched off once the backend honours that dimension;
//! the page's `total` is never touched.

use tracing::trace;

use crate::types::{FilterState, ResultPage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostProcessor {
    pub category_filter: bool,
    pub sort: bool,
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self { category_filter: true, sort: true }
    }
}

impl PostProcessor {
    /// Both steps disabled: pages pass through verbatim.
    pub fn passthrough() -> Self {
        Self { category_filter: false, sort: false }
    }

    /// Narrow `page` to the filter's category, then order it by the filter's sort.
    pub fn apply(&self, mut page: ResultPage, filter: &FilterState) -> ResultPage {
        let fetched = page.items.len();

        if self.category_filter {
            if let Some(category_id) = filter.category_id {
                page.items.retain(|p| p.category_id == category_id);
            }
        }
        if self.sort {
            page.items.sort_by(|a, b| filter.sort.compare(a, b));
        }

        trace!(fetched, kept = page.items.len(), total = page.total, sort = %filter.sort, "Page post-processed");
        page
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
