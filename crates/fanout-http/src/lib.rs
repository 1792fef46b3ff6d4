//! HTTP work executor
//!
//! Treats each [`WorkItem`] id as a URL and performs a GET with a per-call
//! timeout. Transport errors, timeouts and (by default) non-success statuses
//! become failure outcomes; nothing is retried.
//!
//! The underlying `reqwest::Client` is owned by the executor and shared by
//! every concurrently dispatched request. It is released once the last `Arc`
//! to the executor is dropped, including when a stream is abandoned.

use std::time::Duration;

use fanout_core::{async_trait, Executor, Outcome, Stopwatch, WorkItem};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum HttpExecutorError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unsuccessful status {status}")]
    Status { status: u16 },
}

/// Configuration for [`HttpExecutor`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpExecutorConfig {
    /// Per-request timeout
    #[serde(with = "duration_secs_f64")]
    pub timeout: Duration,

    /// User agent sent with every request
    pub user_agent: String,

    /// Report 4xx/5xx responses as failures instead of successes
    pub fail_on_error_status: bool,
}

impl Default for HttpExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("fanout/{}", env!("CARGO_PKG_VERSION")),
            fail_on_error_status: true,
        }
    }
}

impl HttpExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// - `FANOUT_HTTP_TIMEOUT_SECS`: per-request timeout (fractional seconds allowed)
    /// - `FANOUT_HTTP_USER_AGENT`: user agent override
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let timeout = std::env::var("FANOUT_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(defaults.timeout);

        let user_agent = std::env::var("FANOUT_HTTP_USER_AGENT").unwrap_or(defaults.user_agent);

        Self {
            timeout,
            user_agent,
            ..defaults
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_fail_on_error_status(mut self, fail: bool) -> Self {
        self.fail_on_error_status = fail;
        self
    }
}

/// Summary of one HTTP response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    /// Body length in bytes
    pub length: usize,
}

/// Executor performing a GET per work item
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    http: reqwest::Client,
    config: HttpExecutorConfig,
}

impl HttpExecutor {
    /// Build an executor with its own client
    pub fn new(config: HttpExecutorConfig) -> Result<Self, HttpExecutorError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { http, config })
    }

    /// Use an existing client
    pub fn with_client(http: reqwest::Client, config: HttpExecutorConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &HttpExecutorConfig {
        &self.config
    }

    /// GET `url` once, honouring the configured timeout
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<HttpResponse, HttpExecutorError> {
        let timeout = self.config.timeout;
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                HttpExecutorError::Timeout(timeout)
            } else {
                HttpExecutorError::Http(e)
            }
        };

        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_err)?;

        let status = response.status();
        if self.config.fail_on_error_status && !status.is_success() {
            return Err(HttpExecutorError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(map_err)?;
        debug!(status = status.as_u16(), length = body.len(), "Fetched");

        Ok(HttpResponse {
            url: url.to_string(),
            status: status.as_u16(),
            length: body.len(),
        })
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    type Payload = HttpResponse;

    async fn execute(&self, item: WorkItem) -> Outcome<HttpResponse> {
        let watch = Stopwatch::start();
        item.apply_delay().await;

        match self.fetch(item.id()).await {
            Ok(response) => Outcome::success(&item, response, watch.finish()),
            Err(e) => Outcome::failure(&item, e.to_string(), watch.finish()),
        }
    }
}

/// Serde support for Duration as fractional seconds
mod duration_secs_f64 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HttpExecutorConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.fail_on_error_status);
        assert!(config.user_agent.starts_with("fanout/"));
    }

    #[test]
    fn test_config_builder() {
        let config = HttpExecutorConfig::new()
            .with_timeout(Duration::from_millis(1500))
            .with_user_agent("probe")
            .with_fail_on_error_status(false);

        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.user_agent, "probe");
        assert!(!config.fail_on_error_status);
    }

    #[test]
    fn test_config_timeout_serialized_as_seconds() {
        let config = HttpExecutorConfig::new().with_timeout(Duration::from_millis(2500));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["timeout"], 2.5);
    }

    #[test]
    fn test_error_messages() {
        let err = HttpExecutorError::Status { status: 503 };
        assert_eq!(err.to_string(), "unsuccessful status 503");

        let err = HttpExecutorError::Timeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "request timed out after 10s");
    }
}
