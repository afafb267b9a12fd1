use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Handle to the one in-flight fetch of a key.
///
/// Every reader that misses on the same key while the fetch is running receives a clone
/// of the same handle. Awaiting it only signals that the fetch settled; the result itself
/// is read back from the store when the evaluation pass is re-run.
///
/// # Examples
///
/// ```
/// use fetchlito_core::Pending;
///
/// # futures::executor::block_on(async {
/// let pending = Pending::new("/users/5", async {});
/// let joined = pending.clone();
/// assert!(pending.same_fetch(&joined));
///
/// joined.await;
/// assert!(pending.is_settled());
/// # });
/// ```
#[derive(Clone)]
pub struct Pending {
    key: Arc<str>,
    inner: Shared<BoxFuture<'static, ()>>,
}

impl Pending {
    /// Wraps a fetch future so that it can be shared by any number of readers.
    pub fn new<F>(key: &str, fetch: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            key: Arc::from(key),
            inner: fetch.boxed().shared(),
        }
    }

    /// The key this fetch is loading.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns `true` once the underlying fetch has completed.
    pub fn is_settled(&self) -> bool {
        self.inner.peek().is_some()
    }

    /// Returns `true` if both handles point at the same fetch.
    pub fn same_fetch(&self, other: &Pending) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl Future for Pending {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("key", &self.key)
            .field("settled", &self.is_settled())
            .finish()
    }
}
