use crate::error::CacheError;
use crate::pending::Pending;
use serde_json::Value;
use std::sync::Arc;

/// Identifies one fetch started for a key.
///
/// Completions carry the id of the fetch they belong to so the store can tell a fresh
/// result from one that was overtaken by a later write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchId(pub u64);

/// Identifies one armed deletion timer.
///
/// A timer only deletes its entry if the entry still carries the same token when the
/// timer fires; cancelling a timer is therefore just dropping the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub u64);

/// State of a cached resource.
#[derive(Debug, Clone)]
pub enum EntryState {
    /// Someone registered interest but nothing was fetched yet.
    Empty,
    /// A fetch is in flight; readers join it through the shared handle.
    Pending { fetch: FetchId, handle: Pending },
    /// The resolved value. HTTP 404 resolves to `Value::Null`.
    Value(Arc<Value>),
    /// The fetch failed; reads re-raise this error.
    Failed(CacheError),
}

impl EntryState {
    /// Returns `true` for `Value` and `Failed`.
    pub fn is_present(&self) -> bool {
        matches!(self, EntryState::Value(_) | EntryState::Failed(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, EntryState::Pending { .. })
    }

    pub fn value(&self) -> Option<&Arc<Value>> {
        match self {
            EntryState::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&CacheError> {
        match self {
            EntryState::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Borrowed view used by touch predicates.
    pub fn view(&self) -> EntryView<'_> {
        match self {
            EntryState::Empty => EntryView::Empty,
            EntryState::Pending { .. } => EntryView::Pending,
            EntryState::Value(value) => EntryView::Value(value),
            EntryState::Failed(err) => EntryView::Error(err),
        }
    }
}

/// Last known value or error of an entry, as seen by a touch predicate.
#[derive(Debug, Clone, Copy)]
pub enum EntryView<'a> {
    Empty,
    Pending,
    Value(&'a Value),
    Error(&'a CacheError),
}

/// A settled outcome that can be written into the store.
///
/// # Examples
///
/// ```
/// use fetchlito_core::{CacheError, Outcome, TransportError};
/// use serde_json::json;
///
/// let ok: Outcome = json!({"id": 5}).into();
/// assert!(matches!(ok, Outcome::Value(_)));
///
/// let failed: Outcome = CacheError::from(TransportError::status(500)).into();
/// assert!(matches!(failed, Outcome::Error(_)));
/// ```
#[derive(Debug, Clone)]
pub enum Outcome {
    Value(Arc<Value>),
    Error(CacheError),
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Value(Arc::new(value))
    }
}

impl From<Arc<Value>> for Outcome {
    fn from(value: Arc<Value>) -> Self {
        Outcome::Value(value)
    }
}

impl From<CacheError> for Outcome {
    fn from(err: CacheError) -> Self {
        Outcome::Error(err)
    }
}

impl From<Result<Arc<Value>, CacheError>> for Outcome {
    fn from(result: Result<Arc<Value>, CacheError>) -> Self {
        match result {
            Ok(value) => Outcome::Value(value),
            Err(err) => Outcome::Error(err),
        }
    }
}

impl From<Outcome> for EntryState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Value(value) => EntryState::Value(value),
            Outcome::Error(err) => EntryState::Failed(err),
        }
    }
}

/// One cached resource.
///
/// # Fields
///
/// * `key` - Canonical resource key, fixed at creation
/// * `state` - Empty, pending, value or error
/// * `subscriber_count` - Number of readers whose last committed pass read this key
/// * `dependent_keys` - Keys derived from this entry's value, used for cascade deletion only
/// * `deletion_timer` - Token of the armed deletion timer, if any
///
/// # Examples
///
/// ```
/// use fetchlito_core::{CacheEntry, EntryState};
///
/// let entry = CacheEntry::new("/users");
/// assert_eq!(entry.key(), "/users");
/// assert!(matches!(entry.state, EntryState::Empty));
/// assert_eq!(entry.subscriber_count, 0);
/// assert!(entry.deletion_timer.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: String,
    pub state: EntryState,
    pub subscriber_count: usize,
    pub dependent_keys: Vec<String>,
    pub deletion_timer: Option<TimerToken>,
}

impl CacheEntry {
    /// Creates an empty entry with no subscribers.
    pub fn new(key: impl Into<String>) -> Self {
        Self::with_state(key, EntryState::Empty)
    }

    pub fn with_state(key: impl Into<String>, state: EntryState) -> Self {
        Self {
            key: key.into(),
            state,
            subscriber_count: 0,
            dependent_keys: Vec::new(),
            deletion_timer: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// An entry is collectable when nobody reads it.
    pub fn is_unobserved(&self) -> bool {
        self.subscriber_count == 0
    }
}
