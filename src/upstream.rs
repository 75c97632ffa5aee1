//! HTTP fetch capability for a remote metadata provider
//!
//! Issues `GET <endpoint>?<param>=<key>` and returns the JSON body. The cache
//! itself knows nothing about this client; it is one possible `fetch` closure
//! to hand to [`crate::cache::CacheFacade::get_or_fetch`].

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::error::FetchError;

/// Errors that can occur when building an [`HttpFetcher`]
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The endpoint is not an absolute http(s) URL
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Client for a JSON lookup endpoint keyed by one query parameter
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    endpoint: Url,
    param: String,
}

impl HttpFetcher {
    /// Creates a fetcher for `endpoint`, passing keys as the `param` query parameter
    ///
    /// Every request is bounded by `timeout`; the cache imposes none of its own.
    pub fn new(endpoint: &str, param: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(client, endpoint, param)
    }

    /// Creates a fetcher with a custom HTTP client
    ///
    /// The client is used as-is, so it should carry its own timeout.
    pub fn with_client(
        client: Client,
        endpoint: &str,
        param: impl Into<String>,
    ) -> Result<Self, UpstreamError> {
        let invalid = |reason: String| UpstreamError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason,
        };
        let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }

        Ok(Self {
            client,
            endpoint: url,
            param: param.into(),
        })
    }

    /// Builds the request URL for `key`, percent-encoding it
    pub fn request_url(&self, key: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair(&self.param, key);
        url
    }

    /// Looks `key` up upstream
    ///
    /// # Returns
    /// * `Ok(Value)` - The JSON body of a successful response
    /// * `Err(FetchError::NotFoundUpstream)` - 404, or a `null` / empty array body
    /// * `Err(FetchError::Transient)` - Any other failure, including timeouts and 429
    pub async fn fetch(&self, key: &str) -> Result<Value, FetchError> {
        let url = self.request_url(key);
        tracing::debug!(key = %key, url = %url, "Querying upstream");

        let response = self.client.get(url).send().await?;
        if let Some(err) = classify_status(response.status(), key) {
            return Err(err);
        }

        let body: Value = response.json().await?;
        if is_empty_result(&body) {
            return Err(FetchError::NotFoundUpstream(key.to_string()));
        }
        Ok(body)
    }

    /// Returns a `'static` fetch closure for `key`, ready for the cache
    pub fn fetch_fn(
        &self,
        key: &str,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<Value, FetchError>> + Send + 'static {
        let fetcher = self.clone();
        let key = key.to_string();
        move || async move { fetcher.fetch(&key).await }.boxed()
    }
}

/// Maps a response status to a fetch error, or `None` for success
pub fn classify_status(status: StatusCode, key: &str) -> Option<FetchError> {
    if status.is_success() {
        None
    } else if status == StatusCode::NOT_FOUND {
        Some(FetchError::NotFoundUpstream(key.to_string()))
    } else {
        Some(FetchError::Transient(format!("upstream returned {}", status)))
    }
}

/// Returns true for bodies that mean "nothing found"
fn is_empty_result(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
