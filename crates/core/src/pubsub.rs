//! Minimal publish-subscribe primitive.
//!
//! A [`Topic`] remembers its latest value and replays it to new subscribers,
//! so it doubles as an observable "current value" cell. Lifecycle is explicit:
//! [`Topic::subscribe`] returns a [`Subscription`] that is released by
//! [`Subscription::unsubscribe`] (or on drop), and [`Topic::dispose`] drops
//! every subscriber at once. Callbacks always run outside the topic's lock,
//! so a subscriber may publish or subscribe re-entrantly.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct TopicState<T> {
    subscribers: BTreeMap<u64, Callback<T>>,
    next_id: u64,
    latest: Option<T>,
    disposed: bool,
}

/// Shared handle to a topic. Cloning yields another handle to the same topic.
pub struct Topic<T> {
    inner: Arc<Mutex<TopicState<T>>>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Clone + Send + 'static> Default for Topic<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Topic<T> {
    /// Topic with no initial value.
    pub fn new() -> Self {
        Self::from_latest(None)
    }

    /// Topic that replays `value` until something else is published.
    pub fn with_value(value: T) -> Self {
        Self::from_latest(Some(value))
    }

    fn from_latest(latest: Option<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TopicState {
                subscribers: BTreeMap::new(),
                next_id: 0,
                latest,
                disposed: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, TopicState<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` as the latest and deliver it to every subscriber in
    /// subscription order. Returns the number of callbacks invoked; a disposed
    /// topic ignores the value and returns 0.
    pub fn publish(&self, value: T) -> usize {
        let callbacks: Vec<Callback<T>> = {
            let mut state = self.state();
            if state.disposed {
                return 0;
            }
            state.latest = Some(value.clone());
            state.subscribers.values().cloned().collect()
        };
        for cb in &callbacks {
            cb(&value);
        }
        callbacks.len()
    }

    /// Register `callback`. If the topic already holds a value it is replayed
    /// to the new subscriber immediately.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let callback: Callback<T> = Arc::new(callback);
        let (id, replay) = {
            let mut state = self.state();
            if state.disposed {
                return Subscription { id: 0, topic: None };
            }
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.insert(id, Arc::clone(&callback));
            (id, state.latest.clone())
        };
        if let Some(value) = replay {
            callback(&value);
        }
        let weak: Weak<Mutex<TopicState<T>>> = Arc::downgrade(&self.inner);
        let topic: Weak<dyn Detach> = weak;
        Subscription { id, topic: Some(topic) }
    }

    /// Latest published value, if any.
    pub fn latest(&self) -> Option<T> {
        self.state().latest.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.state().disposed
    }

    /// Drop all subscribers and refuse further publications.
    pub fn dispose(&self) {
        let dropped = {
            let mut state = self.state();
            state.disposed = true;
            state.latest = None;
            std::mem::take(&mut state.subscribers)
        };
        // Callbacks may own subscriptions to this topic; drop them unlocked.
        drop(dropped);
    }
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T: Send> Detach for Mutex<TopicState<T>> {
    fn detach(&self, id: u64) {
        let removed = self.lock().unwrap_or_else(PoisonError::into_inner).subscribers.remove(&id);
        drop(removed);
    }
}

/// Handle for one registered callback. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    topic: Option<Weak<dyn Detach>>,
}

impl Subscription {
    /// Remove the callback from its topic.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Keep the callback registered for the lifetime of the topic.
    pub fn detach(mut self) {
        self.topic = None;
    }

    pub fn is_active(&self) -> bool {
        self.topic.as_ref().is_some_and(|t| t.strong_count() > 0)
    }

    fn release(&mut self) {
        if let Some(topic) = self.topic.take().and_then(|t| t.upgrade()) {
            topic.detach(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).field("active", &self.is_active()).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
