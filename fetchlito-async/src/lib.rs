//! # Fetchlito Async
//!
//! A client-side request cache for async Rust, running on tokio.
//!
//! Code that renders from remote data is written as a synchronous *pass* that reads keys.
//! The engine answers reads from its store, shares one in-flight request per key between
//! all readers, re-runs the pass once a fetch lands and keeps every entry alive for as long
//! as some reader's latest pass used it (plus a grace period).
//!
//! ## Features
//!
//! - **Request coalescing**: concurrent reads of a key issue exactly one request
//! - **Suspending reads**: `Result<_, ReadError::Pending>` plus a re-run-from-start driver
//! - **Derived entries**: list items with their own key become cache hits (`IdFieldExtractor`)
//! - **Touch**: refetch everything matching a predicate and announce it as one batch
//! - **Deferred collection**: unread entries are deleted after a grace period, with cascade
//! - **Snapshots**: `save` and `restore` the cached values
//! - **Statistics**: hit, fetch and eviction counters via `stats_registry`
//!
//! ## Quick Start
//!
//! ```
//! use fetchlito_async::prelude::*;
//! use serde_json::{json, Value};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let engine = CacheEngine::new(FnTransport::new(|_: Method, _url: String, _: Option<Value>| async {
//!     Ok::<_, TransportError>(json!({ "id": 5, "name": "A" }))
//! }));
//!
//! let reader = engine.reader();
//! let name = reader
//!     .render(|pass| Ok(pass.read("/users/5")?["name"].clone()))
//!     .await
//!     .unwrap();
//! assert_eq!(name, "A");
//!
//! // Refetch every key containing "users"; readers are notified once.
//! let report = engine.touch(["users"]).await;
//! assert_eq!(report.refetched, vec!["/users/5".to_string()]);
//! # });
//! ```
//!
//! ## Thread Safety
//!
//! The engine is `Send + Sync` and cheap to clone. Every state transition happens under one
//! short-lived lock; timers, fetches and listener calls run outside of it.
//!
mod engine;
mod gc;
mod render;
mod touch;
mod transport;

pub use engine::{CacheEngine, EngineBuilder};
pub use render::{Pass, Reader};
pub use touch::TouchReport;
pub use transport::{FnTransport, Method, Transport};

// Re-export the core types users interact with
pub use fetchlito_core::{
    matcher, CacheError, ChangeBatch, EngineConfig, EntryView, Extractor, IdFieldExtractor,
    ListenerId, NoExtractor, Outcome, Pending, ReadError, ReaderId, Snapshot, TransportError,
};

#[cfg(feature = "stats")]
pub use fetchlito_core::{stats_registry, CacheStats};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CacheEngine, CacheError, ChangeBatch, FnTransport, Method, Outcome, Pass, ReadError,
        Reader, Transport, TransportError,
    };

    #[cfg(feature = "stats")]
    pub use crate::{stats_registry, CacheStats};
}
