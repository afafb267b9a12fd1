//! # Touch
//!
//! Batched invalidation. Matching entries nobody reads are dropped; matching entries with
//! readers are refetched concurrently, and all results are written and announced together
//! once the slowest refetch has settled. Touch never joins an in-flight fetch: the caller
//! asked for fresh data.

use crate::engine::CacheEngine;
use crate::transport::fetch_outcome;
use fetchlito_core::{matcher, EntryView, Outcome};
use futures::future::join_all;
use tracing::debug;

/// What a touch did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TouchReport {
    /// Keys refetched for their readers, sorted.
    pub refetched: Vec<String>,
    /// Matched keys without readers that were deleted.
    pub evicted: Vec<String>,
    /// Refetched keys whose new outcome is an error.
    pub failed: Vec<String>,
}

impl TouchReport {
    /// Returns `true` if the touch matched nothing.
    pub fn is_empty(&self) -> bool {
        self.refetched.is_empty() && self.evicted.is_empty()
    }
}

impl CacheEngine {
    /// Touches every key containing any of `fragments`.
    ///
    /// Touching `"users"` matches `/users`, `/users/5` and `/users?active=true`.
    pub async fn touch<I, S>(&self, fragments: I) -> TouchReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.touch_with_matcher(matcher::fragments(fragments)).await
    }

    /// Touches every entry for which `predicate(key, last_value_or_error)` holds.
    ///
    /// A failed refetch stores an error for its own key only. The subscriber count of
    /// each match is re-checked after the predicate ran, so an entry that gained a reader
    /// meanwhile is refetched rather than deleted.
    pub async fn touch_with_matcher<P>(&self, predicate: P) -> TouchReport
    where
        P: Fn(&str, EntryView<'_>) -> bool,
    {
        let inner = &self.inner;
        let plan = inner.store.touch_scan(predicate);
        debug!(
            refetch = plan.refetch.len(),
            evicted = plan.evicted.len(),
            "Touch scan"
        );
        inner.apply(plan.effects);

        let transport = inner.transport.as_ref();
        let results: Vec<(String, Outcome)> = join_all(plan.refetch.iter().map(|key| async move {
            (key.clone(), fetch_outcome(transport, key).await)
        }))
        .await;

        let failed: Vec<String> = results
            .iter()
            .filter(|(_, outcome)| matches!(outcome, Outcome::Error(_)))
            .map(|(key, _)| key.clone())
            .collect();

        #[cfg(feature = "stats")]
        {
            for _ in &plan.refetch {
                inner.stats.record_fetch();
            }
            for _ in &failed {
                inner.stats.record_failure();
            }
            inner.stats.record_touch();
        }

        if !results.is_empty() {
            let effects = inner.store.touch_commit(results);
            debug!(keys = effects.changed.len(), "Touch commit");
            inner.apply(effects);
        }

        TouchReport {
            refetched: plan.refetch,
            evicted: plan.evicted,
            failed,
        }
    }
}
