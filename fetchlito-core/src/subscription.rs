//! # Change Notification
//!
//! Process-wide registry of listeners that are told which keys changed.
//!
//! Listeners are not attached to entries. Each one receives every [`ChangeBatch`] and
//! decides for itself whether the change is relevant, which keeps registration O(1).
//! A batch groups all keys written by one logical update, so a listener re-evaluates
//! once per update rather than once per key.

use dashmap::DashMap;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Callback invoked with each batch of changed keys.
pub type Listener = Arc<dyn Fn(&ChangeBatch) + Send + Sync>;

/// Keys changed by one logical update, de-duplicated, in write order.
///
/// # Examples
///
/// ```
/// use fetchlito_core::ChangeBatch;
///
/// let batch = ChangeBatch::new(vec!["/users/5".into(), "/users".into(), "/users/5".into()]);
/// assert_eq!(batch.len(), 2);
/// assert!(batch.contains("/users"));
/// assert!(batch.touches_any(["/posts", "/users/5"]));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    keys: Vec<String>,
}

impl ChangeBatch {
    pub fn new(keys: Vec<String>) -> Self {
        let mut seen = HashSet::with_capacity(keys.len());
        let keys = keys
            .into_iter()
            .filter(|key| seen.insert(key.clone()))
            .collect();
        Self { keys }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Returns `true` if any of `keys` is part of this batch.
    pub fn touches_any<I, S>(&self, keys: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys.into_iter().any(|key| self.contains(key.as_ref()))
    }

    /// Returns `true` if the batch intersects a reader's interest set.
    pub fn intersects(&self, interest: &BTreeSet<String>) -> bool {
        self.keys.iter().any(|key| interest.contains(key))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Registry of change listeners.
///
/// # Examples
///
/// ```
/// use fetchlito_core::{ChangeBatch, SubscriptionRegistry};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let registry = SubscriptionRegistry::new();
/// let calls = Arc::new(AtomicUsize::new(0));
/// let seen = calls.clone();
/// let id = registry.subscribe(move |_batch: &ChangeBatch| {
///     seen.fetch_add(1, Ordering::SeqCst);
/// });
///
/// registry.notify(&ChangeBatch::new(vec!["/a".into(), "/b".into()]));
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
///
/// assert!(registry.unsubscribe(id));
/// registry.notify(&ChangeBatch::new(vec!["/a".into()]));
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// ```
pub struct SubscriptionRegistry {
    listeners: DashMap<ListenerId, Listener>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a listener and returns its id.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeBatch) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(id, Arc::new(listener));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Calls every listener once with `batch`. Empty batches are not delivered.
    ///
    /// Listeners are collected before being called so a listener may subscribe or
    /// unsubscribe from inside its callback.
    pub fn notify(&self, batch: &ChangeBatch) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let listeners: Vec<Listener> = self
            .listeners
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for listener in &listeners {
            listener(batch);
        }
        listeners.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
