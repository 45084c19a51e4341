//! Multi-source state store and the combiner that turns it into snapshots.
//!
//! Each filter, sort and pagination field lives in its own slot. Every accepted
//! update, whether a single setter or a batched [`StateStore::update`], builds
//! exactly one [`QuerySnapshot`] from all slots and publishes it. Nothing is
//! published until every slot has a value.
//!
//! Changing the search term resets the page index to 0 inside the same update,
//! so the new term and the reset land in one snapshot. Category and sort
//! changes keep the current page.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::pubsub::Topic;
use crate::types::{FilterState, PaginationState, QuerySnapshot, SortSpec};

/// Page sizes offered by the listing paginator.
pub const DEFAULT_PAGE_SIZES: [usize; 3] = [6, 12, 24];

#[derive(Debug, Clone, Default)]
struct Slots {
    search_term: Option<String>,
    category_id: Option<Option<i64>>,
    sort: Option<SortSpec>,
    pagination: Option<PaginationState>,
}

impl Slots {
    fn combine(&self, seq: u64) -> Option<QuerySnapshot> {
        Some(QuerySnapshot {
            seq,
            filter: FilterState {
                search_term: self.search_term.clone()?,
                category_id: self.category_id?,
                sort: self.sort.clone()?,
            },
            pagination: self.pagination?,
        })
    }
}

struct StoreInner {
    slots: Slots,
    seq: u64,
    current: Option<QuerySnapshot>,
}

pub struct StateStore {
    inner: Mutex<StoreInner>,
    page_sizes: Vec<usize>,
    snapshots: Topic<QuerySnapshot>,
}

/// One accepted field change, recorded so it can be replayed onto the live
/// slots once the caller's closure has returned.
#[derive(Debug, Clone)]
enum Edit {
    SearchTerm(String),
    Category(Option<i64>),
    Sort(SortSpec),
    Page(PaginationState),
}

impl Edit {
    fn apply(self, slots: &mut Slots) {
        match self {
            Edit::SearchTerm(term) => {
                slots.search_term = Some(term);
                if let Some(pagination) = slots.pagination.as_mut() {
                    pagination.page_index = 0;
                }
            }
            Edit::Category(category_id) => slots.category_id = Some(category_id),
            Edit::Sort(sort) => slots.sort = Some(sort),
            Edit::Page(pagination) => slots.pagination = Some(pagination),
        }
    }
}

/// Mutable view handed to [`StateStore::update`]. Setters validate eagerly;
/// accepted changes are committed only if the closure returns `Ok`.
///
/// The closure runs without the store lock held, so it may read the store
/// (or the engine owning it) freely.
pub struct StoreUpdate<'a> {
    page_sizes: &'a [usize],
    edits: Vec<Edit>,
}

impl StoreUpdate<'_> {
    /// Set the search term and reset the page index to 0.
    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.edits.push(Edit::SearchTerm(term.into()));
    }

    pub fn set_category(&mut self, category_id: Option<i64>) {
        self.edits.push(Edit::Category(category_id));
    }

    pub fn set_sort(&mut self, sort: SortSpec) -> EngineResult<()> {
        if sort.field.trim().is_empty() {
            return Err(EngineError::invalid("sort_field", "field name is empty"));
        }
        self.edits.push(Edit::Sort(sort));
        Ok(())
    }

    pub fn set_page(&mut self, page_index: usize, page_size: usize) -> EngineResult<()> {
        if !self.page_sizes.contains(&page_size) {
            return Err(EngineError::invalid(
                "page_size",
                format!("{page_size} is not one of {:?}", self.page_sizes),
            ));
        }
        self.edits.push(Edit::Page(PaginationState { page_index, page_size }));
        Ok(())
    }
}

impl StateStore {
    /// Store with every slot empty. Snapshots start once all slots are set.
    pub fn empty(page_sizes: Vec<usize>) -> Self {
        Self {
            inner: Mutex::new(StoreInner { slots: Slots::default(), seq: 0, current: None }),
            page_sizes,
            snapshots: Topic::new(),
        }
    }

    /// Store seeded with initial values. No snapshot is published until the
    /// first update or [`StateStore::refresh`].
    pub fn seeded(page_sizes: Vec<usize>, filter: FilterState, pagination: PaginationState) -> EngineResult<Self> {
        let store = Self::empty(page_sizes);
        let mut update = StoreUpdate { page_sizes: &store.page_sizes, edits: Vec::new() };
        update.set_search_term(filter.search_term);
        update.set_category(filter.category_id);
        update.set_sort(filter.sort)?;
        update.set_page(pagination.page_index, pagination.page_size)?;
        let edits = update.edits;
        {
            let mut inner = store.lock();
            for edit in edits {
                edit.apply(&mut inner.slots);
            }
        }
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Topic of combined snapshots.
    pub fn snapshots(&self) -> Topic<QuerySnapshot> {
        self.snapshots.clone()
    }

    pub fn page_sizes(&self) -> &[usize] {
        &self.page_sizes
    }

    /// The most recently published snapshot.
    pub fn current(&self) -> Option<QuerySnapshot> {
        self.lock().current.clone()
    }

    /// Apply several field changes atomically; at most one snapshot results.
    /// On error the store is left unchanged.
    ///
    /// `apply` runs unlocked and only records changes; they are replayed onto
    /// the slots in order under the lock afterwards.
    pub fn update<F>(&self, apply: F) -> EngineResult<Option<QuerySnapshot>>
    where
        F: FnOnce(&mut StoreUpdate<'_>) -> EngineResult<()>,
    {
        let mut update = StoreUpdate { page_sizes: &self.page_sizes, edits: Vec::new() };
        apply(&mut update)?;
        if update.edits.is_empty() {
            return Ok(None);
        }
        let edits = update.edits;

        let snapshot = {
            let mut inner = self.lock();
            for edit in edits {
                edit.apply(&mut inner.slots);
            }
            Self::combine_locked(&mut inner)
        };
        if let Some(snapshot) = &snapshot {
            self.snapshots.publish(snapshot.clone());
        }
        Ok(snapshot)
    }

    /// Re-publish the current state under a fresh sequence number.
    pub fn refresh(&self) -> Option<QuerySnapshot> {
        let snapshot = Self::combine_locked(&mut self.lock());
        if let Some(snapshot) = &snapshot {
            self.snapshots.publish(snapshot.clone());
        }
        snapshot
    }

    fn combine_locked(inner: &mut StoreInner) -> Option<QuerySnapshot> {
        let snapshot = inner.slots.combine(inner.seq + 1);
        match &snapshot {
            Some(s) => {
                inner.seq = s.seq;
                inner.current = Some(s.clone());
                debug!(
                    seq = s.seq,
                    term = s.filter.search_term.as_str(),
                    category = ?s.filter.category_id,
                    sort = %s.filter.sort,
                    page = s.pagination.page_index,
                    size = s.pagination.page_size,
                    "Snapshot combined"
                );
            }
            None => debug!("Snapshot withheld until every field has a value"),
        }
        snapshot
    }

    pub fn set_search_term(&self, term: impl Into<String>) -> EngineResult<Option<QuerySnapshot>> {
        let term = term.into();
        self.update(move |u| {
            u.set_search_term(term);
            Ok(())
        })
    }

    pub fn set_category(&self, category_id: Option<i64>) -> EngineResult<Option<QuerySnapshot>> {
        self.update(move |u| {
            u.set_category(category_id);
            Ok(())
        })
    }

    pub fn set_sort(&self, sort: SortSpec) -> EngineResult<Option<QuerySnapshot>> {
        self.update(move |u| u.set_sort(sort))
    }

    pub fn set_page(&self, page_index: usize, page_size: usize) -> EngineResult<Option<QuerySnapshot>> {
        self.update(move |u| u.set_page(page_index, page_size))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
