//! # Suspending Reads
//!
//! An evaluation pass is a synchronous closure that reads keys through a [`Pass`]. A
//! read that cannot be answered yet returns [`ReadError::Pending`]; the closure
//! propagates it with `?`, the driver awaits the fetch and runs the closure again from
//! the start. Because of that re-run, passes must not have side effects beyond reading.
//!
//! When a pass finishes, with a value or with a cached error, the set of keys it read
//! becomes the reader's interest. Keys read in an earlier pass but not in the latest one
//! lose this reader's subscription. While a pass is suspended, the keys it has read so
//! far are held: they are not collected, but they do not count as subscribed either.
//!
//! ```
//! use fetchlito_async::{CacheEngine, FnTransport, Method, TransportError};
//! use serde_json::{json, Value};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let engine = CacheEngine::new(FnTransport::new(|_: Method, url: String, _: Option<Value>| async move {
//!     Ok::<_, TransportError>(json!({ "url": url }))
//! }));
//!
//! let reader = engine.reader();
//! let url = reader
//!     .render(|pass| {
//!         let user = pass.read("/users/5")?;
//!         Ok(user["url"].as_str().unwrap_or_default().to_string())
//!     })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(url, "/users/5");
//! assert_eq!(engine.subscriber_count("/users/5"), 1);
//!
//! drop(reader);
//! assert_eq!(engine.subscriber_count("/users/5"), 0);
//! # });
//! ```

use crate::engine::{CacheEngine, Inner};
use fetchlito_core::{CacheError, ReadError, ReaderId};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Reads performed during one run of an evaluation pass.
pub struct Pass<'a> {
    inner: &'a Arc<Inner>,
    keys: BTreeSet<String>,
}

impl<'a> Pass<'a> {
    fn new(inner: &'a Arc<Inner>) -> Self {
        Self {
            inner,
            keys: BTreeSet::new(),
        }
    }

    /// Reads `key`, starting or joining its fetch on a miss.
    ///
    /// A cached error is returned as [`ReadError::Failed`] and is never turned into a
    /// pending signal.
    pub fn read(&mut self, key: &str) -> Result<Arc<Value>, ReadError> {
        self.keys.insert(key.to_string());
        self.inner.read(key)
    }

    /// Keys read so far in this run.
    pub fn keys(&self) -> &BTreeSet<String> {
        &self.keys
    }
}

/// Keys held on behalf of a suspended pass, released when the driver finishes or is
/// dropped mid-flight.
struct Hold<'a> {
    inner: &'a Arc<Inner>,
    keys: BTreeSet<String>,
}

impl<'a> Hold<'a> {
    fn new(inner: &'a Arc<Inner>) -> Self {
        Self {
            inner,
            keys: BTreeSet::new(),
        }
    }

    fn extend(&mut self, keys: &BTreeSet<String>) {
        let fresh: Vec<String> = keys.difference(&self.keys).cloned().collect();
        if fresh.is_empty() {
            return;
        }
        self.inner.store.hold(fresh.iter().cloned());
        self.keys.extend(fresh);
    }
}

impl Drop for Hold<'_> {
    fn drop(&mut self) {
        if self.keys.is_empty() {
            return;
        }
        let effects = self.inner.store.release_hold(std::mem::take(&mut self.keys));
        self.inner.apply(effects);
    }
}

/// A render participant with its own interest set.
///
/// Dropping the reader (or calling [`Reader::release`]) is teardown: its interest is
/// removed and keys left without readers start their grace period.
pub struct Reader {
    id: ReaderId,
    inner: Arc<Inner>,
}

impl Reader {
    pub(crate) fn new(inner: Arc<Inner>) -> Self {
        let id = inner.next_reader_id();
        Self { id, inner }
    }

    pub fn id(&self) -> ReaderId {
        self.id
    }

    /// Runs `pass` until it completes without a pending read.
    ///
    /// Every pending read is awaited before the pass is run again from the start. On
    /// completion the keys read by the final run are committed as this reader's interest,
    /// whether the pass produced a value or an error.
    pub async fn render<T, F>(&self, mut pass: F) -> Result<T, CacheError>
    where
        F: FnMut(&mut Pass<'_>) -> Result<T, ReadError>,
    {
        let mut hold = Hold::new(&self.inner);
        let mut runs = 0u32;
        loop {
            runs += 1;
            let mut run = Pass::new(&self.inner);
            let result = pass(&mut run);

            let result = match result {
                Err(ReadError::Pending(pending)) => {
                    debug!(reader = self.id.0, key = %pending.key(), run = runs, "Pass suspended");
                    hold.extend(&run.keys);
                    pending.await;
                    continue;
                }
                Ok(value) => Ok(value),
                Err(ReadError::Failed(err)) => Err(err),
            };

            let effects = self.inner.store.commit_interest(self.id, run.keys);
            self.inner.apply(effects);
            drop(hold);
            return result;
        }
    }

    /// Keys this reader read in its last completed pass.
    pub fn interest(&self) -> BTreeSet<String> {
        self.inner.store.interest_of(self.id)
    }

    /// Tears the reader down now instead of at drop.
    pub fn release(self) {}
}

impl Drop for Reader {
    fn drop(&mut self) {
        let effects = self.inner.store.release_reader(self.id);
        self.inner.apply(effects);
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader").field("id", &self.id).finish()
    }
}

impl CacheEngine {
    /// Runs `pass` until all its reads are cached, without subscribing anyone.
    ///
    /// Misses still start fetches, and every pending read is awaited before the pass is
    /// retried, so the pass may run several times. A cached error aborts the loop and is
    /// returned immediately. Fetched entries nobody reads get their speculative expiry
    /// once the loop ends.
    pub async fn preload<T, F>(&self, mut pass: F) -> Result<T, CacheError>
    where
        F: FnMut(&mut Pass<'_>) -> Result<T, ReadError>,
    {
        let mut hold = Hold::new(&self.inner);
        loop {
            let mut run = Pass::new(&self.inner);
            match pass(&mut run) {
                Ok(value) => return Ok(value),
                Err(ReadError::Failed(err)) => return Err(err),
                Err(ReadError::Pending(pending)) => {
                    debug!(key = %pending.key(), "Preload waiting");
                    hold.extend(&run.keys);
                    pending.await;
                }
            }
        }
    }
}
