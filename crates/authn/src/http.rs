//! Narrow network and decoding capabilities used by the key resolvers.
//!
//! Resolvers never talk to `reqwest` or `serde_json` directly. They depend on
//! [`HttpGetter`] (fetch the body at a URL) and [`ResponseDecoder`] (turn that
//! body into a typed value), so tests can substitute in-memory fakes.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::config::HttpFetchConfig;
use crate::error::{BoxError, Result};

/// Fetches the body served at a URL.
#[async_trait]
pub trait HttpGetter: Send + Sync {
    /// Performs a GET request and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns the transport-level cause. Callers wrap it in the
    /// [`AuthError`](crate::AuthError) variant matching what was fetched.
    async fn get(&self, url: &str) -> std::result::Result<Vec<u8>, BoxError>;
}

/// Errors produced by [`ReqwestGetter`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("endpoint returned status {0}")]
    Status(StatusCode),

    /// The body exceeded the configured size limit.
    #[error("response payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge {
        /// Observed or announced size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The request could not be completed.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// [`HttpGetter`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestGetter {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl ReqwestGetter {
    /// Builds a getter from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`](crate::AuthError::InvalidConfig)
    /// if the configuration is invalid.
    pub fn new(config: &HttpFetchConfig) -> Result<Self> {
        Ok(Self { client: config.build_client()?, max_response_bytes: config.max_response_bytes() })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, max_response_bytes: usize) -> Self {
        Self { client, max_response_bytes }
    }

    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let limit = self.max_response_bytes;
        if let Some(announced) = response.content_length() {
            let announced = usize::try_from(announced).unwrap_or(usize::MAX);
            if announced > limit {
                return Err(FetchError::PayloadTooLarge { size: announced, limit });
            }
        }

        // Chunked bodies carry no length; the limit is enforced while reading.
        let mut payload = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let size = payload.len().saturating_add(chunk.len());
            if size > limit {
                return Err(FetchError::PayloadTooLarge { size, limit });
            }
            payload.extend_from_slice(&chunk);
        }
        Ok(payload)
    }
}

#[async_trait]
impl HttpGetter for ReqwestGetter {
    #[tracing::instrument(skip(self))]
    async fn get(&self, url: &str) -> std::result::Result<Vec<u8>, BoxError> {
        self.fetch(url).await.map_err(|e| Arc::new(e) as BoxError)
    }
}

/// Decodes a fetched body into `T`.
pub trait ResponseDecoder<T>: Send + Sync {
    /// Decodes `body`.
    ///
    /// # Errors
    ///
    /// Returns the decoding cause.
    fn decode(&self, body: &[u8]) -> std::result::Result<T, BoxError>;
}

/// JSON [`ResponseDecoder`] for any deserializable type.
pub struct JsonDecoder<T>(PhantomData<fn() -> T>);

impl<T> JsonDecoder<T> {
    /// Creates a new JSON decoder.
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonDecoder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonDecoder")
    }
}

impl<T: DeserializeOwned> ResponseDecoder<T> for JsonDecoder<T> {
    fn decode(&self, body: &[u8]) -> std::result::Result<T, BoxError> {
        serde_json::from_slice(body).map_err(|e| Arc::new(e) as BoxError)
    }
}
