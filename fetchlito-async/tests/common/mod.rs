//! Shared helpers for engine integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use fetchlito_async::{Method, Transport, TransportError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct Script {
    queued: VecDeque<Result<Value, TransportError>>,
    standing: Option<Result<Value, TransportError>>,
    delay: Duration,
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<String, Script>,
    calls: HashMap<String, usize>,
    log: Vec<(Method, String)>,
}

/// A scripted transport keyed by url.
///
/// Unknown urls answer 404. Queued responses are served first, then the standing one.
/// Clones share the same script and counters.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `url` with `value` from now on.
    pub fn respond(&self, url: &str, value: Value) -> &Self {
        self.script(url, |script| script.standing = Some(Ok(value)));
        self
    }

    /// Answers `url` with a failure of `status` from now on.
    pub fn fail(&self, url: &str, status: u16) -> &Self {
        self.script(url, |script| {
            script.standing = Some(Err(TransportError::status(status)))
        });
        self
    }

    /// Serves `responses` in order before falling back to the standing response.
    pub fn queue(&self, url: &str, responses: Vec<Result<Value, TransportError>>) -> &Self {
        self.script(url, |script| script.queued.extend(responses));
        self
    }

    /// Delays every answer for `url`.
    pub fn delay(&self, url: &str, delay: Duration) -> &Self {
        self.script(url, |script| script.delay = delay);
        self
    }

    /// Number of requests made for `url`, any method.
    pub fn calls(&self, url: &str) -> usize {
        self.state.lock().calls.get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().log.len()
    }

    pub fn log(&self) -> Vec<(Method, String)> {
        self.state.lock().log.clone()
    }

    fn script(&self, url: &str, edit: impl FnOnce(&mut Script)) {
        let mut state = self.state.lock();
        edit(state.scripts.entry(url.to_string()).or_default());
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &self,
        method: Method,
        url: &str,
        _body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let (delay, response) = {
            let mut state = self.state.lock();
            *state.calls.entry(url.to_string()).or_insert(0) += 1;
            state.log.push((method, url.to_string()));
            match state.scripts.get_mut(url) {
                Some(script) => {
                    let response = script
                        .queued
                        .pop_front()
                        .or_else(|| script.standing.clone())
                        .unwrap_or_else(|| Err(TransportError::status(404)));
                    (script.delay, response)
                }
                None => (Duration::ZERO, Err(TransportError::status(404))),
            }
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        response
    }
}
