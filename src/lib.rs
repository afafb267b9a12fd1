//! # Fetchlito
//!
//! A client-side request cache that lets synchronous-looking code read remote resources.
//!
//! Reads happen inside an evaluation *pass*: a plain closure that returns
//! `Result<T, ReadError>`. A read of a key that is not cached yet starts (or joins) the
//! single in-flight request for it and returns `ReadError::Pending`; the driver waits for
//! the request and runs the pass again from the start. Once a pass completes, the keys it
//! read are what keeps the entries alive.
//!
//! ## Features
//!
//! - **Request coalescing**: one network call per key, shared by every concurrent reader
//! - **Suspend and retry**: explicit pending results instead of hidden control flow
//! - **Touch**: batched refetch of matching keys, announced as a single change
//! - **Deferred garbage collection**: unread entries are dropped after a grace period
//! - **Dependency cascade**: items derived from a list response go away with it
//! - **Snapshots**: export and re-seed cached values
//!
//! ## Quick Start
//!
//! ```rust
//! use fetchlito::prelude::*;
//! use serde_json::{json, Value};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let engine = CacheEngine::new(FnTransport::new(|_: Method, url: String, _: Option<Value>| async move {
//!     match url.as_str() {
//!         "/users" => Ok(json!([{"id": 1, "name": "Ada"}, {"id": 2, "name": "Grace"}])),
//!         _ => Err(TransportError::status(404)),
//!     }
//! }));
//!
//! let reader = engine.reader();
//! let count = reader
//!     .render(|pass| Ok(pass.read("/users")?.as_array().map_or(0, |users| users.len())))
//!     .await
//!     .unwrap();
//! assert_eq!(count, 2);
//!
//! // Items of the list were cached under their own keys.
//! let ada = engine.get("/users/1").await.unwrap();
//! assert_eq!(ada["name"], "Ada");
//! # });
//! ```
//!
//! ## Crates
//!
//! - [`fetchlito_core`] - the runtime-agnostic store, interest tracking and touch planning
//! - [`fetchlito_async`] - the tokio engine, transport trait and render driver
//!
pub use fetchlito_async::*;
pub use fetchlito_core::{
    self, interest, store, CacheEntry, EntryState, EntryStore, InterestTable, Lookup,
    SubscriptionRegistry,
};

pub use fetchlito_async;
