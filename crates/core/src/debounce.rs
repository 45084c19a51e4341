//! Debounced normalizer: collapses bursts of raw values into settled ones.
//!
//! Every [`Debouncer::push`] bumps a generation counter and arms a fresh timer
//! task, aborting the previous one. When a timer fires it only emits if its
//! generation is still the newest, and only if the value differs from the last
//! emitted one. Must be driven from inside a Tokio runtime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

use crate::pubsub::Topic;

/// Default quiet interval for search inputs.
pub const DEFAULT_QUIET_MS: u64 = 300;

struct Shared<T> {
    quiet: Duration,
    generation: AtomicU64,
    pending: Mutex<Option<JoinHandle<()>>>,
    last_emitted: Mutex<Option<T>>,
    output: Topic<T>,
}

pub struct Debouncer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Debouncer<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T: Clone + PartialEq + Send + 'static> Debouncer<T> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                quiet,
                generation: AtomicU64::new(0),
                pending: Mutex::new(None),
                last_emitted: Mutex::new(None),
                output: Topic::new(),
            }),
        }
    }

    pub fn quiet(&self) -> Duration {
        self.shared.quiet
    }

    /// Topic of settled values.
    pub fn output(&self) -> Topic<T> {
        self.shared.output.clone()
    }

    /// Feed one raw value, superseding any pending one.
    pub fn push(&self, value: T) {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        let quiet = self.shared.quiet;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            if let Some(shared) = weak.upgrade() {
                if shared.generation.load(Ordering::SeqCst) == generation {
                    shared.emit(value);
                }
            }
        });

        let previous = self.shared.lock_pending().replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drop the pending value, if any, without emitting it.
    pub fn cancel(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(pending) = self.shared.lock_pending().take() {
            pending.abort();
        }
    }

    /// Forget the last emitted value so the next settled value is emitted even
    /// if it equals the previous one.
    pub fn reset(&self) {
        *self.shared.last_emitted.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Cancel pending work and release all subscribers of the output topic.
    pub fn dispose(&self) {
        self.cancel();
        self.shared.output.dispose();
    }
}

impl<T: Clone + PartialEq + Send + 'static> Shared<T> {
    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, value: T) {
        {
            let mut last = self.last_emitted.lock().unwrap_or_else(PoisonError::into_inner);
            if last.as_ref() == Some(&value) {
                trace!("Settled value unchanged, suppressed");
                return;
            }
            *last = Some(value.clone());
        }
        self.output.publish(value);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
