use std::thread::sleep;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::{FetchError, FetchResult};

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts
    pub retry_attempts: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds (for exponential backoff cap)
    pub max_retry_delay_ms: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 30000,
            user_agent: format!("strict-xml/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Blocking HTTP client for downloading remote schemas
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self { client, config })
    }

    /// Download schema bytes, retrying connection failures, timeouts,
    /// interrupted bodies and 5xx
    pub fn download_schema(&self, url: &str) -> FetchResult<Vec<u8>> {
        let mut current_attempt = 0;

        loop {
            match self.fetch_once(url) {
                Ok(bytes) => return Ok(bytes),
                Err(error)
                    if current_attempt < self.config.retry_attempts
                        && Self::is_retryable(&error) =>
                {
                    tracing::debug!(url, attempt = current_attempt + 1, %error, "retrying schema download");
                    self.wait_before_retry(current_attempt);
                    current_attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// One request, including reading the whole body
    fn fetch_once(&self, url: &str) -> FetchResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|error| self.classify(url, error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .map_err(|error| self.classify(url, error))?;
        Ok(bytes.to_vec())
    }

    /// Exponential backoff: `retry_delay_ms * 2^attempt`, capped
    pub(crate) fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .config
            .retry_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.config.max_retry_delay_ms))
    }

    fn wait_before_retry(&self, attempt: u32) {
        sleep(self.backoff_delay(attempt));
    }

    /// 4xx is final; server errors and broken transfers are not
    fn is_retryable(error: &FetchError) -> bool {
        error.is_transient()
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}
