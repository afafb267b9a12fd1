//! # Fetchlito Core
//!
//! Runtime-agnostic building blocks of the fetchlito request cache.
//!
//! This crate holds the state machine behind the cache: which keys are stored, who reads
//! them, which entries were derived from which, and what must happen when a key is
//! written, released or touched. It never spawns, sleeps or performs I/O; transitions
//! return [`Effects`] that an engine (see `fetchlito-async`) executes.
//!
//! ## Features
//!
//! - **Entry Store**: One mutex-protected map of entries; every transition is atomic
//! - **Request Coalescing**: A miss stores a shared [`Pending`] handle that later readers join
//! - **Interest Tracking**: Reader counts derived from the keys each reader last read
//! - **Dependency Cascade**: Entries derived from a list value are deleted with it
//! - **Touch Planning**: Match, evict the unread and refetch the read, then write as one batch
//! - **Statistics**: Optional hit, fetch and eviction counters (`stats` feature)
//!
//! ## Module Organization
//!
//! - [`cache_entry`] - Entry states, outcomes and the entry record
//! - [`store`] - The entry store and its effects
//! - [`interest`] - Per-reader interest sets and derived counts
//! - [`subscription`] - Change listeners and change batches
//! - [`dependency`] - Extraction of derived entries from values
//! - [`matcher`] - Predicates for touch
//! - [`config`] - Engine configuration
//!
pub mod cache_entry;
pub mod config;
pub mod dependency;
mod error;
pub mod interest;
pub mod matcher;
mod pending;
pub mod store;
pub mod subscription;

#[cfg(feature = "stats")]
mod stats;

#[cfg(feature = "stats")]
pub mod stats_registry;

pub use cache_entry::{CacheEntry, EntryState, EntryView, FetchId, Outcome, TimerToken};
pub use config::EngineConfig;
pub use dependency::{Extractor, IdFieldExtractor, NoExtractor};
pub use error::{CacheError, ReadError, TransportError, STATUS_NOT_FOUND, STATUS_UNREACHABLE};
pub use interest::{InterestDiff, InterestTable, ReaderId};
pub use pending::Pending;
pub use store::{Effects, EntryStore, Lookup, Snapshot, TimerOp, TouchPlan};
pub use subscription::{ChangeBatch, Listener, ListenerId, SubscriptionRegistry};

#[cfg(feature = "stats")]
pub use stats::CacheStats;
