use crate::gc::TimerSet;
use crate::render::Reader;
use crate::transport::{fetch_outcome, resolve, Method, Transport};
use fetchlito_core::{
    CacheError, ChangeBatch, Effects, EngineConfig, EntryState, EntryStore, Extractor, FetchId,
    IdFieldExtractor, ListenerId, Lookup, Outcome, Pending, ReadError, ReaderId, Snapshot,
    SubscriptionRegistry, TimerOp,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[cfg(feature = "stats")]
use fetchlito_core::{stats_registry, CacheStats};

/// Shared state of one engine. Background tasks only hold it weakly.
pub(crate) struct Inner {
    pub(crate) store: EntryStore,
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) timers: TimerSet,
    /// Changed keys waiting for the next delivery.
    queued: Mutex<Vec<String>>,
    flush_scheduled: AtomicBool,
    next_reader: AtomicU64,
    name: Option<String>,
    #[cfg(feature = "stats")]
    pub(crate) stats: Arc<CacheStats>,
}

impl Inner {
    /// Executes the effects of a store transition and delivers every queued change,
    /// including changes deferred earlier in this tick, as one batch.
    pub(crate) fn apply(self: &Arc<Self>, effects: Effects) {
        self.enqueue(effects);
        self.flush();
    }

    /// Executes the effects of a store transition but leaves delivery to the end of the
    /// current tick, so fetches settling together reach listeners as a single batch.
    pub(crate) fn apply_deferred(self: &Arc<Self>, effects: Effects) {
        self.enqueue(effects);
        if self.flush_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            self.flush();
            return;
        };
        let weak = Arc::downgrade(self);
        runtime.spawn(async move {
            tokio::task::yield_now().await;
            if let Some(inner) = weak.upgrade() {
                inner.flush();
            }
        });
    }

    fn enqueue(self: &Arc<Self>, effects: Effects) {
        if effects.is_empty() {
            return;
        }
        for op in effects.timers {
            match op {
                TimerOp::Arm { key, token, delay } => self.timers.arm(self, key, token, delay),
                TimerOp::Cancel(token) => self.timers.cancel(token),
            }
        }

        #[cfg(feature = "stats")]
        if !effects.removed.is_empty() {
            self.stats.record_evictions(effects.removed.len());
        }

        if !effects.changed.is_empty() {
            self.queued.lock().extend(effects.changed);
        }
    }

    fn flush(&self) {
        self.flush_scheduled.store(false, Ordering::Release);
        let keys = std::mem::take(&mut *self.queued.lock());
        let batch = ChangeBatch::new(keys);
        if !batch.is_empty() {
            let delivered = self.registry.notify(&batch);
            debug!(keys = batch.len(), listeners = delivered, "Notified change batch");
        }
    }

    /// A suspending read: a value, a cached error, or the fetch to wait for.
    pub(crate) fn read(self: &Arc<Self>, key: &str) -> Result<Arc<Value>, ReadError> {
        let (lookup, effects) = self
            .store
            .read_or_fetch(key, |fetch| self.start_fetch(key, fetch))?;
        self.enqueue(effects);

        match lookup {
            Lookup::Hit(value) => {
                #[cfg(feature = "stats")]
                self.stats.record_hit();
                Ok(value)
            }
            Lookup::Failed(err) => {
                #[cfg(feature = "stats")]
                self.stats.record_hit();
                Err(err.into())
            }
            Lookup::Joined(pending) => {
                #[cfg(feature = "stats")]
                self.stats.record_coalesced();
                debug!(key = %key, "Joined in-flight fetch");
                Err(ReadError::Pending(pending))
            }
            Lookup::Started(pending) => {
                #[cfg(feature = "stats")]
                self.stats.record_miss();
                Err(ReadError::Pending(pending))
            }
        }
    }

    /// Spawns the fetch for `key` and returns its shared handle.
    ///
    /// Called under the store lock; the spawned task reports through `complete_fetch`,
    /// which waits for the lock, so the entry is always `Pending` by then.
    fn start_fetch(self: &Arc<Self>, key: &str, fetch: FetchId) -> Result<Pending, CacheError> {
        let runtime = Handle::try_current()
            .map_err(|_| CacheError::misuse(format!("no tokio runtime to fetch `{key}`")))?;

        let weak = Arc::downgrade(self);
        let transport = Arc::clone(&self.transport);
        let owned_key = key.to_string();
        let handle = Pending::new(key, async move {
            let outcome = fetch_outcome(transport.as_ref(), &owned_key).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            #[cfg(feature = "stats")]
            if matches!(outcome, Outcome::Error(_)) {
                inner.stats.record_failure();
            }
            let effects = inner.store.complete_fetch(&owned_key, fetch, outcome);
            inner.apply_deferred(effects);
        });

        debug!(key = %key, fetch = fetch.0, "Starting fetch");
        #[cfg(feature = "stats")]
        self.stats.record_fetch();
        runtime.spawn(handle.clone());
        Ok(handle)
    }

    pub(crate) fn next_reader_id(&self) -> ReaderId {
        ReaderId(self.next_reader.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Builder for [`CacheEngine`].
///
/// # Examples
///
/// ```
/// use fetchlito_async::{CacheEngine, FnTransport, Method, NoExtractor, TransportError};
/// use serde_json::{json, Value};
/// use std::time::Duration;
///
/// let transport = FnTransport::new(|_: Method, _: String, _: Option<Value>| async {
///     Ok::<_, TransportError>(json!(null))
/// });
/// let engine = CacheEngine::builder(transport)
///     .grace_period(Duration::from_secs(30))
///     .speculative_expiry(None)
///     .extractor(NoExtractor)
///     .build();
/// assert!(engine.is_empty());
/// ```
pub struct EngineBuilder {
    transport: Arc<dyn Transport>,
    config: EngineConfig,
    extractor: Arc<dyn Extractor>,
}

impl EngineBuilder {
    /// Replaces the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers the engine's statistics under `name`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.with_name(name);
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.config = self.config.with_grace_period(grace);
        self
    }

    pub fn speculative_expiry(mut self, expiry: Option<Duration>) -> Self {
        self.config = self.config.with_speculative_expiry(expiry);
        self
    }

    /// Sets how derived entries are extracted from fetched values.
    pub fn extractor<E: Extractor + 'static>(mut self, extractor: E) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn build(self) -> CacheEngine {
        #[cfg(feature = "stats")]
        let stats = Arc::new(CacheStats::new());
        #[cfg(feature = "stats")]
        if let Some(name) = &self.config.name {
            stats_registry::register(name, Arc::clone(&stats));
        }

        let inner = Inner {
            store: EntryStore::new(&self.config, self.extractor),
            registry: SubscriptionRegistry::new(),
            transport: self.transport,
            timers: TimerSet::default(),
            queued: Mutex::new(Vec::new()),
            flush_scheduled: AtomicBool::new(false),
            next_reader: AtomicU64::new(0),
            name: self.config.name,
            #[cfg(feature = "stats")]
            stats,
        };
        CacheEngine {
            inner: Arc::new(inner),
        }
    }
}

/// A request cache instance.
///
/// Cloning is cheap and every clone shares the same store, listeners and timers. Tests
/// and applications create one engine per logical cache; nothing is process-wide except
/// the optional statistics registry.
#[derive(Clone)]
pub struct CacheEngine {
    pub(crate) inner: Arc<Inner>,
}

impl CacheEngine {
    /// Creates an engine with the default configuration, extracting derived entries from
    /// items carrying an `id` field.
    pub fn new<T: Transport>(transport: T) -> Self {
        Self::builder(transport).build()
    }

    pub fn builder<T: Transport>(transport: T) -> EngineBuilder {
        EngineBuilder {
            transport: Arc::new(transport),
            config: EngineConfig::default(),
            extractor: Arc::new(IdFieldExtractor::default()),
        }
    }

    /// Name the engine's statistics are registered under, if any.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Creates a render participant. Dropping it releases its interest.
    pub fn reader(&self) -> Reader {
        Reader::new(Arc::clone(&self.inner))
    }

    /// Direct-mode read.
    ///
    /// Returns the cached value or error if the key has settled. Otherwise the transport
    /// is called directly: the response is neither cached nor subscribed to, and an
    /// in-flight fetch for the key is not joined.
    pub async fn get(&self, key: &str) -> Result<Arc<Value>, CacheError> {
        match self.peek(key) {
            Some(settled) => settled,
            None => self.request(Method::Get, key, None).await.map(Arc::new),
        }
    }

    /// Sends a request straight to the transport. A 404 response resolves to `null`.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, CacheError> {
        debug!(method = %method, url = %url, "Direct request");
        resolve(self.inner.transport.request(method, url, body).await)
    }

    /// Sends a request and, if it succeeds, touches every key containing one of
    /// `fragments`.
    ///
    /// The touch runs after the response arrives, so readers of the touched keys see the
    /// server state produced by the request.
    pub async fn mutate<I, S>(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        fragments: I,
    ) -> Result<(Value, crate::TouchReport), CacheError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let response = self.request(method, url, body).await?;
        let report = self.touch(fragments).await;
        Ok((response, report))
    }

    /// Writes a settled outcome and notifies listeners.
    pub fn write(&self, key: &str, outcome: impl Into<Outcome>) {
        let effects = self.inner.store.write(key, outcome.into());
        self.inner.apply(effects);
    }

    /// The settled outcome of `key`, without reading, fetching or subscribing.
    pub fn peek(&self, key: &str) -> Option<Result<Arc<Value>, CacheError>> {
        let entry = self.inner.store.lookup(key)?;
        match entry.state {
            EntryState::Value(value) => Some(Ok(value)),
            EntryState::Failed(err) => Some(Err(err)),
            EntryState::Empty | EntryState::Pending { .. } => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.store.contains(key)
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner.store.subscriber_count(key)
    }

    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.store.keys()
    }

    /// Number of deletion timers currently armed.
    pub fn armed_timers(&self) -> usize {
        self.inner.timers.len()
    }

    /// Registers a listener called with every batch of changed keys.
    ///
    /// Listeners are process-wide for this engine; each decides whether a batch is
    /// relevant to it, e.g. with [`ChangeBatch::intersects`] against a reader's interest.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeBatch) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(listener)
    }

    /// Registers a listener that forwards every batch into a channel.
    ///
    /// The listener stays registered until [`CacheEngine::unsubscribe`] is called, even
    /// if the receiver is dropped.
    pub fn subscribe_channel(&self) -> (ListenerId, mpsc::UnboundedReceiver<ChangeBatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.registry.subscribe(move |batch: &ChangeBatch| {
            let _ = tx.send(batch.clone());
        });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.registry.unsubscribe(id)
    }

    /// Exports every cached value. Pending, empty and failed entries are skipped.
    pub fn save(&self) -> Snapshot {
        self.inner.store.save()
    }

    /// Seeds entries for keys not already holding a value or an error.
    pub fn restore(&self, snapshot: Snapshot) {
        let offered = snapshot.len();
        let effects = self.inner.store.restore(snapshot);
        info!(offered, restored = effects.changed.len(), "Restored snapshot");
        self.inner.apply(effects);
    }

    /// Clears every entry and all reader interest and cancels all deletion timers.
    ///
    /// Fetches already in flight are not cancelled; their results seed the empty store.
    pub fn reset(&self) {
        let effects = self.inner.store.clear();
        info!(removed = effects.removed.len(), "Reset cache");
        self.inner.apply(effects);
    }

    /// Live statistics of this engine.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.inner.stats)
    }
}

impl fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEngine")
            .field("name", &self.inner.name)
            .field("entries", &self.inner.store.len())
            .field("listeners", &self.inner.registry.len())
            .finish()
    }
}
