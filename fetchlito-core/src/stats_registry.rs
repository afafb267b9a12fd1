use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::CacheStats;

/// Global registry for engine statistics.
///
/// Engines created with a name (`EngineConfig::name`) register their statistics here so
/// they can be inspected without holding a handle to the engine itself.
///
/// # Examples
///
/// ```
/// use fetchlito_core::stats_registry;
///
/// if let Some(stats) = stats_registry::get("users-api") {
///     println!("Hits: {}", stats.hits());
///     println!("Fetches: {}", stats.fetches());
/// }
///
/// for name in stats_registry::list() {
///     println!("Engine: {}", name);
/// }
/// ```
static STATS_REGISTRY: Lazy<RwLock<HashMap<String, Arc<CacheStats>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register an engine's statistics under a given name.
///
/// Registering a name twice replaces the previous entry.
pub fn register(name: &str, stats: Arc<CacheStats>) {
    let mut registry = STATS_REGISTRY.write();
    registry.insert(name.to_string(), stats);
}

/// Remove an engine's statistics from the registry.
///
/// Returns `true` if the name was registered.
pub fn unregister(name: &str) -> bool {
    STATS_REGISTRY.write().remove(name).is_some()
}

/// Get a snapshot of the statistics registered under `name`.
///
/// Returns a clone taken at the time of the call.
pub fn get(name: &str) -> Option<CacheStats> {
    let registry = STATS_REGISTRY.read();
    registry.get(name).map(|stats| (**stats).clone())
}

/// Get a live handle to the statistics registered under `name`.
pub fn get_ref(name: &str) -> Option<Arc<CacheStats>> {
    let registry = STATS_REGISTRY.read();
    registry.get(name).cloned()
}

/// List all registered engine names.
pub fn list() -> Vec<String> {
    let registry = STATS_REGISTRY.read();
    registry.keys().cloned().collect()
}

/// Clear all registered statistics.
///
/// This removes all entries from the registry but does not reset the statistics themselves.
pub fn clear() {
    let mut registry = STATS_REGISTRY.write();
    registry.clear();
}

/// Reset the counters registered under `name`.
///
/// Returns `false` if no engine with that name is registered.
pub fn reset(name: &str) -> bool {
    let registry = STATS_REGISTRY.read();
    if let Some(stats) = registry.get(name) {
        stats.reset();
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_register_and_get() {
        register("test_engine", Arc::new(CacheStats::new()));

        let stats = get("test_engine").unwrap();
        assert_eq!(stats.hits(), 0);
        assert_eq!(stats.fetches(), 0);
    }

    #[test]
    #[serial]
    fn test_get_ref_is_live() {
        let stats = Arc::new(CacheStats::new());
        register("test_engine_live", stats.clone());

        stats.record_hit();
        stats.record_fetch();

        let live = get_ref("test_engine_live").unwrap();
        assert_eq!(live.hits(), 1);
        assert_eq!(live.fetches(), 1);
    }

    #[test]
    #[serial]
    fn test_list_and_unregister() {
        clear();
        register("engine_a", Arc::new(CacheStats::new()));
        register("engine_b", Arc::new(CacheStats::new()));

        let names = list();
        assert!(names.contains(&"engine_a".to_string()));
        assert!(names.contains(&"engine_b".to_string()));

        assert!(unregister("engine_a"));
        assert!(!unregister("engine_a"));
        assert!(!list().contains(&"engine_a".to_string()));
    }

    #[test]
    #[serial]
    fn test_reset() {
        let stats = Arc::new(CacheStats::new());
        register("test_engine_reset", stats.clone());
        stats.record_hit();
        stats.record_hit();

        assert!(reset("test_engine_reset"));
        assert_eq!(stats.hits(), 0);
        assert!(!reset("nonexistent"));
    }

    #[test]
    #[serial]
    fn test_clear() {
        register("test_engine_clear", Arc::new(CacheStats::new()));
        assert!(!list().is_empty());

        clear();
        assert!(list().is_empty());
    }
}
