//! Engine configuration.
//!
//! Can be built in code with the `with_*` methods or deserialized from any serde format:
//!
//! ```
//! use fetchlito_core::EngineConfig;
//! use std::time::Duration;
//!
//! let config: EngineConfig = serde_json::from_str(r#"{
//!     "name": "api",
//!     "grace_period_ms": 1000
//! }"#).unwrap();
//!
//! assert_eq!(config.name.as_deref(), Some("api"));
//! assert_eq!(config.grace_period(), Duration::from_secs(1));
//! assert_eq!(config.speculative_expiry(), Some(Duration::from_secs(180)));
//! ```

use serde::Deserialize;
use std::time::Duration;

// Default values for engine configuration
const DEFAULT_GRACE_PERIOD_MS: u64 = 3 * 60 * 1000;
const DEFAULT_SPECULATIVE_EXPIRY_MS: u64 = DEFAULT_GRACE_PERIOD_MS;

/// Configuration of a cache engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name under which the engine's statistics are registered.
    pub name: Option<String>,
    /// Delay between a key losing its last reader and its deletion.
    pub grace_period_ms: u64,
    /// Lifetime of entries materialized while nobody reads them (derived items,
    /// restored snapshots, preloaded keys). `None` keeps them until something reads
    /// and then releases them.
    pub speculative_expiry_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: None,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            speculative_expiry_ms: Some(DEFAULT_SPECULATIVE_EXPIRY_MS),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period_ms = duration_ms(grace);
        self
    }

    pub fn with_speculative_expiry(mut self, expiry: Option<Duration>) -> Self {
        self.speculative_expiry_ms = expiry.map(duration_ms);
        self
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn speculative_expiry(&self) -> Option<Duration> {
        self.speculative_expiry_ms.map(Duration::from_millis)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
