//! HTTP client configuration for discovery and key set fetches.
//!
//! [`HttpFetchConfig`] bounds every outbound request made while resolving
//! signing keys and builds the [`reqwest::Client`] used by
//! [`ReqwestGetter`](crate::http::ReqwestGetter).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Default request timeout (10 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum response body size (1 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("openid-authn/", env!("CARGO_PKG_VERSION"));

/// Configuration for outbound discovery and key set requests.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use openid_authn::config::HttpFetchConfig;
///
/// let config = HttpFetchConfig::builder()
///     .timeout(Duration::from_secs(3))
///     .max_response_bytes(256 * 1024)
///     .build()?;
/// # Ok::<(), openid_authn::AuthError>(())
/// ```
///
/// Deserialized configurations are checked by [`HttpFetchConfig::validate`]
/// before a client is built from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpFetchConfig {
    /// Whole-request timeout.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    timeout: Duration,

    /// TCP connect timeout.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    connect_timeout: Duration,

    /// Responses larger than this are rejected.
    #[serde(default = "default_max_response_bytes")]
    max_response_bytes: usize,

    #[serde(default = "default_user_agent")]
    user_agent: String,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_max_response_bytes() -> usize {
    DEFAULT_MAX_RESPONSE_BYTES
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_owned()
}

impl Default for HttpFetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            user_agent: default_user_agent(),
        }
    }
}

#[bon::bon]
impl HttpFetchConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Optional Fields
    ///
    /// * `timeout` - Whole-request timeout (default: 10 seconds).
    /// * `connect_timeout` - Connection timeout (default: 5 seconds).
    /// * `max_response_bytes` - Maximum accepted body size (default: 1 MiB).
    /// * `user_agent` - `User-Agent` header value.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] if:
    /// - Either timeout is zero
    /// - `connect_timeout` exceeds `timeout`
    /// - `max_response_bytes` is zero
    /// - `user_agent` is empty
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_TIMEOUT)] timeout: Duration,
        #[builder(default = DEFAULT_CONNECT_TIMEOUT)] connect_timeout: Duration,
        #[builder(default = DEFAULT_MAX_RESPONSE_BYTES)] max_response_bytes: usize,
        #[builder(into, default = DEFAULT_USER_AGENT.to_owned())] user_agent: String,
    ) -> Result<Self> {
        let config = Self { timeout, connect_timeout, max_response_bytes, user_agent };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants enforced by the builder.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(AuthError::invalid_config("timeout must be greater than zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(AuthError::invalid_config("connect_timeout must be greater than zero"));
        }
        if self.connect_timeout > self.timeout {
            return Err(AuthError::invalid_config(format!(
                "connect_timeout ({:?}) must not exceed timeout ({:?})",
                self.connect_timeout, self.timeout
            )));
        }
        if self.max_response_bytes == 0 {
            return Err(AuthError::invalid_config("max_response_bytes must be greater than zero"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(AuthError::invalid_config("user_agent cannot be empty"));
        }
        Ok(())
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the maximum accepted response size in bytes.
    #[must_use]
    pub fn max_response_bytes(&self) -> usize {
        self.max_response_bytes
    }

    /// Returns the `User-Agent` header value.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Builds the HTTP client described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] if the configuration is invalid or
    /// the TLS backend cannot be initialised.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        self.validate()?;
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| AuthError::invalid_config(format!("failed to build HTTP client: {e}")))
    }
}
