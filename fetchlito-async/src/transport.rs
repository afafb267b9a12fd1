//! The network collaborator.
//!
//! The engine only needs `method, url, body -> value | {status, body}` from the outside
//! world. Any HTTP client can be plugged in by implementing [`Transport`], or by wrapping
//! an async closure in [`FnTransport`].

use async_trait::async_trait;
use fetchlito_core::{CacheError, Outcome, TransportError};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Request method passed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Performs one request. Cache keys are passed verbatim as the url of `GET` requests.
///
/// Implementations report failures as [`TransportError`] with the response status and
/// body; status 404 is treated by the engine as a `null` value, not as a failure.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        (**self).request(method, url, body).await
    }
}

/// Adapts an async closure into a [`Transport`].
///
/// # Examples
///
/// ```
/// use fetchlito_async::{FnTransport, Method, Transport, TransportError};
/// use serde_json::{json, Value};
///
/// # tokio_test_block_on(async {
/// let transport = FnTransport::new(|method: Method, url: String, _body: Option<Value>| async move {
///     Ok::<_, TransportError>(json!({ "method": method.as_str(), "url": url }))
/// });
/// let value = transport.request(Method::Get, "/users", None).await.unwrap();
/// assert_eq!(value["url"], "/users");
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub struct FnTransport<F> {
    handler: F,
}

impl<F, Fut> FnTransport<F>
where
    F: Fn(Method, String, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TransportError>> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(Method, String, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TransportError>> + Send + 'static,
{
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        (self.handler)(method, url.to_string(), body).await
    }
}

/// Maps 404 to `null` and every other failure to a [`CacheError`].
pub(crate) fn resolve(result: Result<Value, TransportError>) -> Result<Value, CacheError> {
    match result {
        Ok(value) => Ok(value),
        Err(err) if err.is_not_found() => Ok(Value::Null),
        Err(err) => Err(err.into()),
    }
}

/// Fetches a cache key and turns the response into the outcome to store.
pub(crate) async fn fetch_outcome(transport: &dyn Transport, key: &str) -> Outcome {
    match resolve(transport.request(Method::Get, key, None).await) {
        Ok(value) => Outcome::Value(Arc::new(value)),
        Err(err) => {
            warn!(key = %key, status = ?err.status(), "Fetch failed, caching error");
            Outcome::Error(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_not_found_resolves_to_null() {
        let resolved = resolve(Err(TransportError::new(404, json!({"error": "gone"}))));
        assert_eq!(resolved, Ok(Value::Null));
    }

    #[test]
    fn test_other_failures_are_errors() {
        let resolved = resolve(Err(TransportError::status(500)));
        assert_eq!(resolved.unwrap_err().status(), Some(500));

        let resolved = resolve(Err(TransportError::unreachable("dns")));
        assert_eq!(resolved.unwrap_err().status(), Some(0));
    }

    #[tokio::test]
    async fn test_fn_transport_passes_arguments() {
        let transport = FnTransport::new(|method: Method, url: String, body: Option<Value>| async move {
            Ok::<_, TransportError>(json!({ "method": method.to_string(), "url": url, "body": body }))
        });

        let value = transport
            .request(Method::Post, "/users", Some(json!({"name": "A"})))
            .await
            .unwrap();
        assert_eq!(value["method"], "POST");
        assert_eq!(value["body"]["name"], "A");
    }

    #[tokio::test]
    async fn test_fetch_outcome_caches_errors() {
        let transport = FnTransport::new(|_: Method, _: String, _: Option<Value>| async {
            Err::<Value, _>(TransportError::status(503))
        });
        let outcome = fetch_outcome(&transport, "/down").await;
        assert!(matches!(outcome, Outcome::Error(err) if err.status() == Some(503)));
    }
}
