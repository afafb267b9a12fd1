//! # Entry Store
//!
//! The single source of truth for cached state.
//!
//! Every operation takes the store lock once, performs a complete state transition and
//! returns the [`Effects`] the transition requires: deletion timers to arm or cancel and
//! the keys that changed. The store never sleeps, spawns or calls listeners itself; the
//! engine executes the effects after the lock is released. This keeps every transition
//! atomic and lets the state machine be exercised without an async runtime.
//!
//! # Examples
//!
//! ```
//! use fetchlito_core::{EngineConfig, EntryStore, NoExtractor, Outcome};
//! use fetchlito_core::interest::ReaderId;
//! use serde_json::json;
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//!
//! let store = EntryStore::new(&EngineConfig::default(), Arc::new(NoExtractor));
//!
//! let effects = store.write("/users/5", json!({"id": 5}).into());
//! assert_eq!(effects.changed, vec!["/users/5".to_string()]);
//!
//! // Nobody reads it yet, so a speculative expiry timer was armed.
//! assert_eq!(effects.timers.len(), 1);
//!
//! // A reader commits interest; the timer is cancelled.
//! let effects = store.commit_interest(ReaderId(1), BTreeSet::from(["/users/5".to_string()]));
//! assert_eq!(store.subscriber_count("/users/5"), 1);
//! assert_eq!(effects.timers.len(), 1);
//! ```

use crate::cache_entry::{CacheEntry, EntryState, EntryView, FetchId, Outcome, TimerToken};
use crate::config::EngineConfig;
use crate::dependency::{dedup_derived, Extractor};
use crate::error::CacheError;
use crate::interest::{InterestDiff, InterestTable, ReaderId};
use crate::pending::Pending;
use crate::subscription::ChangeBatch;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Exported cache contents: every key with a materialized, non-error value.
pub type Snapshot = BTreeMap<String, Value>;

/// A deletion timer operation requested by a store transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerOp {
    /// Schedule `expire(key, token)` after `delay`.
    Arm {
        key: String,
        token: TimerToken,
        delay: Duration,
    },
    /// The timer holding `token` is no longer wanted.
    Cancel(TimerToken),
}

/// Side effects of a store transition, to be executed by the engine.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[must_use = "timers and notifications are only executed by the engine"]
pub struct Effects {
    pub timers: Vec<TimerOp>,
    /// Keys whose settled state changed, in write order.
    pub changed: Vec<String>,
    /// Keys whose entry was removed.
    pub removed: Vec<String>,
}

impl Effects {
    pub fn merge(&mut self, other: Effects) {
        self.timers.extend(other.timers);
        self.changed.extend(other.changed);
        self.removed.extend(other.removed);
    }

    /// The notification batch for this transition.
    pub fn change_batch(&self) -> ChangeBatch {
        ChangeBatch::new(self.changed.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Result of a read against the store.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// The entry holds a value.
    Hit(Arc<Value>),
    /// The entry holds a cached error.
    Failed(CacheError),
    /// A fetch was already in flight; the reader joined it.
    Joined(Pending),
    /// This read started the fetch.
    Started(Pending),
}

/// Partition of the entries matched by a touch.
#[derive(Debug, Default)]
pub struct TouchPlan {
    /// Matched keys with readers or held by a running pass; each must be refetched.
    pub refetch: Vec<String>,
    /// Matched keys without readers; already deleted.
    pub evicted: Vec<String>,
    pub effects: Effects,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<String, CacheEntry>,
    interest: InterestTable,
    next_fetch: u64,
    next_timer: u64,
    /// Keys read by passes that have not completed yet, with the number of such passes.
    held: HashMap<String, usize>,
    /// Held keys whose deletion timer fired; they are re-armed once released.
    deferred: HashSet<String>,
}

impl StoreState {
    /// Returns the entry for `key`, creating an empty one that inherits the current
    /// interest count.
    fn entry_mut(&mut self, key: &str) -> &mut CacheEntry {
        let count = self.interest.count(key);
        self.entries.entry(key.to_string()).or_insert_with(|| {
            let mut entry = CacheEntry::new(key);
            entry.subscriber_count = count;
            entry
        })
    }

    fn arm(&mut self, key: &str, delay: Duration, fx: &mut Effects) {
        self.next_timer += 1;
        let token = TimerToken(self.next_timer);
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        if let Some(old) = entry.deletion_timer.replace(token) {
            fx.timers.push(TimerOp::Cancel(old));
        }
        fx.timers.push(TimerOp::Arm {
            key: key.to_string(),
            token,
            delay,
        });
    }

    /// Arms the independent expiry of an entry nobody reads, unless a running pass holds it.
    fn arm_speculative(&mut self, key: &str, expiry: Option<Duration>, fx: &mut Effects) {
        let Some(expiry) = expiry else {
            return;
        };
        let unobserved = self
            .entries
            .get(key)
            .map(CacheEntry::is_unobserved)
            .unwrap_or(false);
        if unobserved && !self.held.contains_key(key) {
            self.arm(key, expiry, fx);
        }
    }

    /// An entry may be collected when nobody reads it and no running pass holds it.
    fn collectable(&self, key: &str) -> bool {
        let unobserved = self
            .entries
            .get(key)
            .map(CacheEntry::is_unobserved)
            .unwrap_or(false);
        unobserved && !self.held.contains_key(key)
    }

    fn disarm(&mut self, key: &str, fx: &mut Effects) {
        if let Some(token) = self
            .entries
            .get_mut(key)
            .and_then(|entry| entry.deletion_timer.take())
        {
            fx.timers.push(TimerOp::Cancel(token));
        }
    }

    fn remove(&mut self, key: &str, fx: &mut Effects) -> Option<CacheEntry> {
        let mut entry = self.entries.remove(key)?;
        if let Some(token) = entry.deletion_timer.take() {
            fx.timers.push(TimerOp::Cancel(token));
        }
        fx.removed.push(key.to_string());
        Some(entry)
    }

    fn apply_diff(&mut self, diff: InterestDiff, grace: Duration, fx: &mut Effects) {
        for (key, count) in &diff.changed {
            if let Some(entry) = self.entries.get_mut(key) {
                entry.subscriber_count = *count;
            } else if *count > 0 {
                self.entry_mut(key);
            }
        }
        for key in &diff.now_observed {
            self.disarm(key, fx);
        }
        for key in &diff.now_unobserved {
            if self.entries.contains_key(key) {
                debug!(key = %key, grace_ms = grace.as_millis() as u64, "Last reader left, arming deletion");
                self.arm(key, grace, fx);
            }
        }
    }
}

/// Mapping from resource key to [`CacheEntry`], plus the interest table that drives
/// subscriber counts.
pub struct EntryStore {
    state: Mutex<StoreState>,
    extractor: Arc<dyn Extractor>,
    grace_period: Duration,
    speculative_expiry: Option<Duration>,
}

impl EntryStore {
    pub fn new(config: &EngineConfig, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            extractor,
            grace_period: config.grace_period(),
            speculative_expiry: config.speculative_expiry(),
        }
    }

    /// Returns a copy of the entry for `key`.
    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        self.state.lock().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// All keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of readers whose last committed pass read `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.state.lock().interest.count(key)
    }

    /// Keys the reader read in its last committed pass.
    pub fn interest_of(&self, reader: ReaderId) -> BTreeSet<String> {
        self.state
            .lock()
            .interest
            .keys_of(reader)
            .cloned()
            .unwrap_or_default()
    }

    /// Answers a read, joining or starting the key's fetch on a miss.
    ///
    /// `start` is called under the store lock, at most once, and only when the entry is
    /// absent or empty; it must hand back the shared handle of a fetch that will later
    /// report through [`EntryStore::complete_fetch`] with the given id. Starting a fetch
    /// neither notifies nor changes the subscriber count, but it does cancel a pending
    /// deletion.
    pub fn read_or_fetch<F>(&self, key: &str, start: F) -> Result<(Lookup, Effects), CacheError>
    where
        F: FnOnce(FetchId) -> Result<Pending, CacheError>,
    {
        let mut state = self.state.lock();
        let mut fx = Effects::default();

        let lookup = match state.entries.get(key).map(|entry| &entry.state) {
            Some(EntryState::Value(value)) => Lookup::Hit(value.clone()),
            Some(EntryState::Failed(err)) => Lookup::Failed(err.clone()),
            Some(EntryState::Pending { handle, .. }) => Lookup::Joined(handle.clone()),
            None | Some(EntryState::Empty) => {
                state.next_fetch += 1;
                let fetch = FetchId(state.next_fetch);
                let handle = start(fetch)?;
                state.entry_mut(key).state = EntryState::Pending {
                    fetch,
                    handle: handle.clone(),
                };
                state.disarm(key, &mut fx);
                Lookup::Started(handle)
            }
        };
        Ok((lookup, fx))
    }

    /// Writes a settled value or error and notifies its key.
    ///
    /// Preserves the subscriber count, recomputes `dependent_keys` from the new value,
    /// seeds derived entries that are not yet present and cancels any live deletion
    /// timer. Entries left without readers get the speculative expiry, if configured.
    pub fn write(&self, key: &str, outcome: Outcome) -> Effects {
        let mut state = self.state.lock();
        let mut fx = Effects::default();
        self.apply_outcome(&mut state, key, outcome, &mut fx);
        fx
    }

    /// Commits the result of fetch `fetch` for `key`.
    ///
    /// The result is discarded if the entry was rewritten while the fetch was in flight
    /// (a value, an error, or a newer fetch). An absent or empty entry is re-seeded.
    pub fn complete_fetch(&self, key: &str, fetch: FetchId, outcome: Outcome) -> Effects {
        let mut state = self.state.lock();
        let mut fx = Effects::default();

        let current = match state.entries.get(key).map(|entry| &entry.state) {
            None | Some(EntryState::Empty) => true,
            Some(EntryState::Pending { fetch: running, .. }) => *running == fetch,
            Some(EntryState::Value(_)) | Some(EntryState::Failed(_)) => false,
        };
        if !current {
            debug!(key = %key, fetch = fetch.0, "Discarding stale fetch result");
            return fx;
        }

        self.apply_outcome(&mut state, key, outcome, &mut fx);
        fx
    }

    /// Replaces the reader's interest set with the keys read by its last pass.
    pub fn commit_interest(&self, reader: ReaderId, keys: BTreeSet<String>) -> Effects {
        let mut state = self.state.lock();
        let mut fx = Effects::default();
        let diff = state.interest.commit(reader, keys);
        state.apply_diff(diff, self.grace_period, &mut fx);
        fx
    }

    /// Drops all interest of a reader that is being torn down.
    pub fn release_reader(&self, reader: ReaderId) -> Effects {
        let mut state = self.state.lock();
        let mut fx = Effects::default();
        let diff = state.interest.release(reader);
        state.apply_diff(diff, self.grace_period, &mut fx);
        fx
    }

    /// Fires the deletion timer `token` of `key`.
    ///
    /// Does nothing if the timer was replaced or the key regained a reader. Otherwise
    /// removes the entry and, transitively, every dependent entry that has no readers.
    pub fn expire(&self, key: &str, token: TimerToken) -> Effects {
        let mut state = self.state.lock();
        let mut fx = Effects::default();

        let Some(entry) = state.entries.get_mut(key) else {
            return fx;
        };
        if entry.deletion_timer != Some(token) {
            return fx;
        }
        entry.deletion_timer = None;
        if entry.subscriber_count > 0 {
            return fx;
        }
        if state.held.contains_key(key) {
            debug!(key = %key, "Deletion deferred, key is held by a running pass");
            state.deferred.insert(key.to_string());
            return fx;
        }

        let Some(removed) = state.remove(key, &mut fx) else {
            return fx;
        };
        debug!(key = %key, dependents = removed.dependent_keys.len(), "Collected entry");

        let mut visited = HashSet::from([key.to_string()]);
        let mut stack = removed.dependent_keys;
        while let Some(dependent) = stack.pop() {
            if !visited.insert(dependent.clone()) {
                continue;
            }
            if !state.collectable(&dependent) {
                continue;
            }
            if let Some(entry) = state.remove(&dependent, &mut fx) {
                debug!(key = %dependent, parent = %key, "Cascade-collected dependent entry");
                stack.extend(entry.dependent_keys);
            }
        }
        fx
    }

    /// Matches entries for a touch and deletes the matched ones nobody reads.
    ///
    /// The predicate is evaluated against a snapshot taken without holding the lock, so
    /// it may call back into the cache. Subscriber counts are re-checked afterwards under
    /// the lock: an entry that gained a reader in between is refetched, not deleted.
    pub fn touch_scan<P>(&self, predicate: P) -> TouchPlan
    where
        P: Fn(&str, EntryView<'_>) -> bool,
    {
        let snapshot: Vec<(String, EntryState)> = {
            let state = self.state.lock();
            state
                .entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.state.clone()))
                .collect()
        };
        let mut matched: Vec<String> = snapshot
            .into_iter()
            .filter(|(key, entry_state)| predicate(key, entry_state.view()))
            .map(|(key, _)| key)
            .collect();
        matched.sort();

        let mut state = self.state.lock();
        let mut plan = TouchPlan::default();
        for key in matched {
            if !state.entries.contains_key(&key) {
                continue;
            }
            if state.collectable(&key) {
                state.remove(&key, &mut plan.effects);
                plan.evicted.push(key);
            } else {
                plan.refetch.push(key);
            }
        }
        plan
    }

    /// Writes all touch results as one batch.
    ///
    /// Every result is written, even for keys that disappeared while the refetches were
    /// in flight; the returned effects carry a single change list for all of them.
    pub fn touch_commit(&self, results: Vec<(String, Outcome)>) -> Effects {
        let mut state = self.state.lock();
        let mut fx = Effects::default();
        for (key, outcome) in results {
            self.apply_outcome(&mut state, &key, outcome, &mut fx);
        }
        fx
    }

    /// Exports every entry holding a value. Pending, empty and failed entries are skipped.
    pub fn save(&self) -> Snapshot {
        let state = self.state.lock();
        state
            .entries
            .iter()
            .filter_map(|(key, entry)| {
                entry
                    .state
                    .value()
                    .map(|value| (key.clone(), value.as_ref().clone()))
            })
            .collect()
    }

    /// Seeds entries from a snapshot for keys that hold no value or error yet.
    ///
    /// Restored entries have no dependents and, having no readers, get the speculative
    /// expiry if configured.
    pub fn restore(&self, snapshot: Snapshot) -> Effects {
        let mut state = self.state.lock();
        let mut fx = Effects::default();
        for (key, value) in snapshot {
            let occupied = state
                .entries
                .get(&key)
                .map(|entry| !matches!(entry.state, EntryState::Empty))
                .unwrap_or(false);
            if occupied {
                continue;
            }
            let entry = state.entry_mut(&key);
            entry.state = EntryState::Value(Arc::new(value));
            entry.dependent_keys.clear();
            fx.changed.push(key.clone());
            state.arm_speculative(&key, self.speculative_expiry, &mut fx);
        }
        fx
    }

    /// Removes every entry and all interest, cancelling every deletion timer.
    pub fn clear(&self) -> Effects {
        let mut state = self.state.lock();
        let mut fx = Effects::default();
        let keys: Vec<String> = state.entries.keys().cloned().collect();
        for key in keys {
            state.remove(&key, &mut fx);
        }
        state.interest.clear();
        state.deferred.clear();
        fx
    }

    /// Marks keys as read by a pass that is still suspended.
    ///
    /// Held keys keep no subscriber count, but they are neither collected nor given a
    /// speculative expiry until every pass holding them has released them.
    pub fn hold<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.lock();
        for key in keys {
            *state.held.entry(key.into()).or_insert(0) += 1;
        }
    }

    /// Releases keys held by [`EntryStore::hold`].
    ///
    /// A released entry that nobody reads and that has no deletion timer gets its
    /// speculative expiry. If its deletion was deferred while held it is re-armed even
    /// without one, with the grace period.
    pub fn release_hold<I, S>(&self, keys: I) -> Effects
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();
        let mut fx = Effects::default();
        for key in keys {
            let key = key.as_ref();
            let Some(holders) = state.held.get_mut(key) else {
                continue;
            };
            *holders -= 1;
            if *holders > 0 {
                continue;
            }
            state.held.remove(key);
            let deferred = state.deferred.remove(key);

            let idle = state
                .entries
                .get(key)
                .map(|entry| entry.is_unobserved() && entry.deletion_timer.is_none())
                .unwrap_or(false);
            if !idle {
                continue;
            }
            if deferred {
                let delay = self.speculative_expiry.unwrap_or(self.grace_period);
                state.arm(key, delay, &mut fx);
            } else {
                state.arm_speculative(key, self.speculative_expiry, &mut fx);
            }
        }
        fx
    }

    /// Number of running passes holding `key`.
    pub fn holders(&self, key: &str) -> usize {
        self.state.lock().held.get(key).copied().unwrap_or(0)
    }

    fn apply_outcome(&self, state: &mut StoreState, key: &str, outcome: Outcome, fx: &mut Effects) {
        let derived = match &outcome {
            Outcome::Value(value) => dedup_derived(self.extractor.extract(key, value)),
            Outcome::Error(_) => Vec::new(),
        };

        let entry = state.entry_mut(key);
        entry.state = outcome.into();
        entry.dependent_keys = derived.iter().map(|(k, _)| k.clone()).collect();

        state.disarm(key, fx);
        fx.changed.push(key.to_string());
        state.arm_speculative(key, self.speculative_expiry, fx);

        for (derived_key, derived_value) in derived {
            if derived_key == key || state.entries.contains_key(&derived_key) {
                continue;
            }
            state.entry_mut(&derived_key).state = EntryState::Value(Arc::new(derived_value));
            fx.changed.push(derived_key.clone());
            state.arm_speculative(&derived_key, self.speculative_expiry, fx);
        }
    }
}
