//! Header search box: debounced, trimmed, de-duplicated, non-empty
//! submissions, plus an explicit submit for the Enter key.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::debounce::Debouncer;
use crate::engine::ListingEngine;
use crate::pubsub::{Subscription, Topic};

pub struct SearchBox {
    text: Mutex<String>,
    debouncer: Debouncer<String>,
    submissions: Topic<String>,
    _forward: Subscription,
}

impl SearchBox {
    pub fn new(quiet: Duration) -> Self {
        let debouncer = Debouncer::new(quiet);
        let submissions = Topic::new();
        let sink = submissions.clone();
        let forward = debouncer.output().subscribe(move |query: &String| {
            if !query.is_empty() {
                sink.publish(query.clone());
            }
        });
        Self { text: Mutex::new(String::new()), debouncer, submissions, _forward: forward }
    }

    /// Settled, non-empty search terms. Replays the last one to new subscribers.
    pub fn submissions(&self) -> Topic<String> {
        self.submissions.clone()
    }

    /// Current raw text of the box.
    pub fn text(&self) -> String {
        self.text.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// A keystroke: replace the text and restart the quiet interval.
    pub fn input(&self, raw: &str) {
        *self.text.lock().unwrap_or_else(PoisonError::into_inner) = raw.to_string();
        self.debouncer.push(raw.trim().to_string());
    }

    /// Enter pressed: submit the current text immediately if it is not blank.
    /// Returns whether anything was submitted.
    pub fn submit(&self) -> bool {
        let query = self.text().trim().to_string();
        if query.is_empty() {
            return false;
        }
        self.debouncer.cancel();
        debug!(query = query.as_str(), "Search submitted");
        self.submissions.publish(query);
        true
    }

    /// Empty the box without submitting anything.
    pub fn clear(&self) {
        self.text.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.debouncer.cancel();
    }

    /// Forward submissions to `engine` as search-term changes.
    pub fn connect(&self, engine: &Arc<ListingEngine>) -> Subscription {
        let engine = Arc::downgrade(engine);
        self.submissions.subscribe(move |query: &String| {
            let Some(engine) = engine.upgrade() else { return };
            if let Err(e) = engine.set_search_term(query.clone()) {
                warn!(error = %e, "Search submission not applied");
            }
        })
    }

    pub fn dispose(&self) {
        self.debouncer.dispose();
        self.submissions.dispose();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
