//! # Derived Resources
//!
//! Extraction of nested entities that are addressable by their own key.
//!
//! When a list response such as `/users` contains items that can also be fetched on
//! their own (`/users/5`), the store seeds those items as separate entries so a later
//! direct read is a cache hit. The parent remembers the derived keys as its
//! `dependent_keys`, which only drive cascade deletion.
//!
//! ```
//! use fetchlito_core::{Extractor, IdFieldExtractor};
//! use serde_json::json;
//!
//! let extractor = IdFieldExtractor::default();
//! let derived = extractor.extract("/users?active=true", &json!([
//!     {"id": 1, "name": "Ada"},
//!     {"id": "2", "name": "Grace"},
//!     {"name": "no id"},
//! ]));
//!
//! let keys: Vec<_> = derived.iter().map(|(key, _)| key.as_str()).collect();
//! assert_eq!(keys, vec!["/users/1", "/users/2"]);
//! ```

use serde_json::Value;

/// Produces `{derived key -> derived value}` pairs from a freshly written value.
pub trait Extractor: Send + Sync {
    /// Returns the derived entries of `value`, which was just written under `key`.
    fn extract(&self, key: &str, value: &Value) -> Vec<(String, Value)>;
}

impl<F> Extractor for F
where
    F: Fn(&str, &Value) -> Vec<(String, Value)> + Send + Sync,
{
    fn extract(&self, key: &str, value: &Value) -> Vec<(String, Value)> {
        self(key, value)
    }
}

/// Extractor that never derives anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExtractor;

impl Extractor for NoExtractor {
    fn extract(&self, _key: &str, _value: &Value) -> Vec<(String, Value)> {
        Vec::new()
    }
}

/// Derives `<path>/<id>` entries from the items of an array response.
///
/// The path is the parent key without its query string. Items without the id field, or
/// whose id is neither a string nor a number, are skipped.
#[derive(Debug, Clone)]
pub struct IdFieldExtractor {
    field: String,
}

impl IdFieldExtractor {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    fn item_id(&self, item: &Value) -> Option<String> {
        match item.get(&self.field)? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

impl Default for IdFieldExtractor {
    fn default() -> Self {
        Self::new("id")
    }
}

impl Extractor for IdFieldExtractor {
    fn extract(&self, key: &str, value: &Value) -> Vec<(String, Value)> {
        let Value::Array(items) = value else {
            return Vec::new();
        };
        let path = key.split('?').next().unwrap_or(key).trim_end_matches('/');

        items
            .iter()
            .filter_map(|item| {
                let id = self.item_id(item)?;
                Some((format!("{path}/{id}"), item.clone()))
            })
            .collect()
    }
}

/// Removes repeated keys, keeping the first occurrence.
pub(crate) fn dedup_derived(derived: Vec<(String, Value)>) -> Vec<(String, Value)> {
    let mut seen = std::collections::HashSet::new();
    derived
        .into_iter()
        .filter(|(key, _)| seen.insert(key.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_extractor() {
        assert!(NoExtractor.extract("/users", &json!([{"id": 1}])).is_empty());
    }

    #[test]
    fn test_id_extractor_ignores_objects() {
        let extractor = IdFieldExtractor::default();
        assert!(extractor.extract("/users/1", &json!({"id": 1})).is_empty());
    }

    #[test]
    fn test_id_extractor_custom_field() {
        let extractor = IdFieldExtractor::new("slug");
        let derived = extractor.extract("/posts/", &json!([{"slug": "hello"}, {"slug": ""}]));
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].0, "/posts/hello");
        assert_eq!(derived[0].1, json!({"slug": "hello"}));
    }

    #[test]
    fn test_closure_extractor() {
        let extractor = |key: &str, value: &Value| vec![(format!("{key}#self"), value.clone())];
        let derived = extractor.extract("/me", &json!({"id": 9}));
        assert_eq!(derived[0].0, "/me#self");
    }

    #[test]
    fn test_dedup_keeps_first() {
        let derived = dedup_derived(vec![
            ("/a".into(), json!(1)),
            ("/a".into(), json!(2)),
            ("/b".into(), json!(3)),
        ]);
        assert_eq!(derived, vec![("/a".into(), json!(1)), ("/b".into(), json!(3))]);
    }
}
