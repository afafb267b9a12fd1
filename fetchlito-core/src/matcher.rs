//! # Touch Matchers
//!
//! Predicates that select which cached entries a touch refreshes.
//!
//! A matcher receives the key and the entry's last known value or error. Keys are opaque
//! strings; the only built-in interpretation is substring containment.
//!
//! ```
//! use fetchlito_core::matcher;
//! use fetchlito_core::EntryView;
//! use serde_json::json;
//!
//! let users = matcher::fragments(["users"]);
//! let value = json!({"id": 5});
//! assert!(users("/users/5", EntryView::Value(&value)));
//! assert!(users("/users?active=true", EntryView::Pending));
//! assert!(!users("/posts/1", EntryView::Empty));
//! ```

use crate::cache_entry::EntryView;

/// Matches keys containing any of `fragments`. No fragments matches nothing.
pub fn fragments<I, S>(fragments: I) -> impl Fn(&str, EntryView<'_>) -> bool + Send + Sync
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let fragments: Vec<String> = fragments.into_iter().map(Into::into).collect();
    move |key: &str, _view: EntryView<'_>| fragments.iter().any(|f| key.contains(f.as_str()))
}

/// Matches keys that start with `prefix`.
pub fn prefix(prefix: impl Into<String>) -> impl Fn(&str, EntryView<'_>) -> bool + Send + Sync {
    let prefix = prefix.into();
    move |key: &str, _view: EntryView<'_>| key.starts_with(prefix.as_str())
}

/// Matches exactly one key.
pub fn exact(key: impl Into<String>) -> impl Fn(&str, EntryView<'_>) -> bool + Send + Sync {
    let wanted = key.into();
    move |key: &str, _view: EntryView<'_>| key == wanted
}

/// Matches every entry whose last outcome is an error.
pub fn failed() -> impl Fn(&str, EntryView<'_>) -> bool + Send + Sync {
    |_key: &str, view: EntryView<'_>| matches!(view, EntryView::Error(_))
}

/// Matches everything.
pub fn all() -> impl Fn(&str, EntryView<'_>) -> bool + Send + Sync {
    |_key: &str, _view: EntryView<'_>| true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CacheError, TransportError};

    #[test]
    fn test_fragments_match_any() {
        let m = fragments(["users", "teams"]);
        assert!(m("/users", EntryView::Empty));
        assert!(m("/teams/3/members", EntryView::Empty));
        assert!(!m("/posts", EntryView::Empty));
    }

    #[test]
    fn test_no_fragments_match_nothing() {
        let m = fragments(Vec::<String>::new());
        assert!(!m("/users", EntryView::Empty));
    }

    #[test]
    fn test_prefix_and_exact() {
        assert!(prefix("/users")("/users/5", EntryView::Empty));
        assert!(!prefix("/users")("/api/users", EntryView::Empty));
        assert!(exact("/users")("/users", EntryView::Empty));
        assert!(!exact("/users")("/users/5", EntryView::Empty));
    }

    #[test]
    fn test_failed_only_matches_errors() {
        let err = CacheError::from(TransportError::status(500));
        assert!(failed()("/a", EntryView::Error(&err)));
        assert!(!failed()("/a", EntryView::Pending));
        assert!(all()("/a", EntryView::Pending));
    }
}
