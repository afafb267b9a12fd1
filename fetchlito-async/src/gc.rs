//! Deferred deletion.
//!
//! The store decides when an entry should be deleted and hands out a [`TimerToken`] for
//! it; this module turns those decisions into tokio sleep tasks. Cancelling aborts the
//! sleeping task, but correctness never depends on it: a timer whose token was replaced
//! in the store fires as a no-op.

use crate::engine::Inner;
use fetchlito_core::TimerToken;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Sleep tasks of all armed deletion timers.
#[derive(Default)]
pub(crate) struct TimerSet {
    handles: Mutex<HashMap<TimerToken, AbortHandle>>,
}

impl TimerSet {
    /// Schedules `expire(key, token)` after `delay`.
    ///
    /// Without a tokio runtime the timer cannot be armed; the entry then stays until it
    /// is touched, reset or re-armed from within a runtime.
    pub(crate) fn arm(&self, inner: &Arc<Inner>, key: String, token: TimerToken, delay: Duration) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(key = %key, "No tokio runtime, deletion timer not armed");
            return;
        };
        let weak = Arc::downgrade(inner);

        // Held across the spawn so the task cannot finish before its handle is recorded.
        let mut handles = self.handles.lock();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.timers.finished(token);
            debug!(key = %key, token = token.0, "Deletion timer fired");
            let effects = inner.store.expire(&key, token);
            inner.apply(effects);
        });
        handles.insert(token, task.abort_handle());
    }

    pub(crate) fn cancel(&self, token: TimerToken) {
        if let Some(handle) = self.handles.lock().remove(&token) {
            handle.abort();
        }
    }

    fn finished(&self, token: TimerToken) {
        self.handles.lock().remove(&token);
    }

    /// Number of timers currently sleeping.
    pub(crate) fn len(&self) -> usize {
        self.handles.lock().len()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        for (_, handle) in self.handles.get_mut().drain() {
            handle.abort();
        }
    }
}
