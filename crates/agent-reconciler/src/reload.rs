//! Hot reload of the running agent over HTTP with bounded retries.

use std::time::Duration;

use crate::config::settings::ReloadSettings;
use crate::error::ReloadError;

/// Retry budget for a single reload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of tries, including the first one.
    pub max_attempts: u32,
    pub backoff_factor: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_factor: Duration) -> Self {
        Self {
            max_attempts,
            backoff_factor,
            ..Self::default()
        }
    }

    /// Delay before the `retry`-th retry (1-based): `factor * 2^(retry - 1)`,
    /// capped at `max_backoff`.
    pub fn delay_before(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.backoff_factor
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_backoff)
    }

    /// Client errors 400–451 and server errors 500–512 are retried.
    pub fn is_retryable_status(status: u16) -> bool {
        matches!(status, 400..=451 | 500..=512)
    }
}

impl Default for RetryPolicy {
    /// 10 attempts, 100ms factor, 120s cap.
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_factor: Duration::from_millis(100),
            max_backoff: Duration::from_secs(120),
        }
    }
}

impl From<&ReloadSettings> for RetryPolicy {
    fn from(settings: &ReloadSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            backoff_factor: settings.backoff_factor(),
            max_backoff: settings.max_backoff(),
        }
    }
}

/// Posts to the agent's reload endpoint.
#[derive(Debug, Clone)]
pub struct ReloadClient {
    http: reqwest::Client,
    url: String,
    policy: RetryPolicy,
}

impl ReloadClient {
    pub fn new(url: impl Into<String>, policy: RetryPolicy) -> Result<Self, ReloadError> {
        Self::with_timeout(url, policy, Duration::from_secs(5))
    }

    pub fn with_timeout(
        url: impl Into<String>,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, ReloadError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReloadError::new(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: url.into(),
            policy,
        })
    }

    pub fn from_settings(settings: &ReloadSettings) -> Result<Self, ReloadError> {
        Self::with_timeout(
            settings.url.clone(),
            RetryPolicy::from(settings),
            settings.request_timeout(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Asks the agent to re-read its configuration.
    ///
    /// Sleeps between attempts. On exhaustion the error carries the last
    /// failure; the agent may still be running the previous config.
    pub async fn reload(&self) -> Result<(), ReloadError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_failure = String::from("no attempt made");

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.policy.delay_before(attempt - 1);
                log::debug!(
                    "Retrying reload (attempt {}/{}) after {:?}",
                    attempt,
                    max_attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.http.post(&self.url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if !RetryPolicy::is_retryable_status(status.as_u16()) {
                        log::info!("Agent configuration reloaded ({})", status);
                        return Ok(());
                    }
                    last_failure = format!("{} responded with {}", self.url, status);
                }
                Err(e) => {
                    last_failure = e.to_string();
                }
            }
            log::warn!("Reload attempt {} failed: {}", attempt, last_failure);
        }

        Err(ReloadError::new(format!(
            "{} (gave up after {} attempts)",
            last_failure, max_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_retryable_status_ranges() {
        assert!(RetryPolicy::is_retryable_status(400));
        assert!(RetryPolicy::is_retryable_status(451));
        assert!(!RetryPolicy::is_retryable_status(452));
        assert!(!RetryPolicy::is_retryable_status(499));
        assert!(RetryPolicy::is_retryable_status(500));
        assert!(RetryPolicy::is_retryable_status(512));
        assert!(!RetryPolicy::is_retryable_status(513));
        assert!(!RetryPolicy::is_retryable_status(200));
        assert!(!RetryPolicy::is_retryable_status(302));
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff_factor: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_before(1), Duration::from_millis(100));
        assert_eq!(policy.delay_before(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before(3), Duration::from_millis(400));
        assert_eq!(policy.delay_before(4), Duration::from_millis(500));
        assert_eq!(policy.delay_before(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_reload_success_first_try() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/-/reload"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client =
            ReloadClient::new(format!("{}/-/reload", mock_server.uri()), fast_policy(3)).unwrap();
        assert!(client.reload().await.is_ok());
    }

    #[tokio::test]
    async fn test_reload_exhausts_budget_on_503() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/-/reload"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client =
            ReloadClient::new(format!("{}/-/reload", mock_server.uri()), fast_policy(3)).unwrap();
        let err = client.reload().await.unwrap_err();
        assert!(err.message.contains("503"), "unexpected message: {}", err);
        assert!(err.to_string().starts_with("could not reload configuration"));
    }

    #[tokio::test]
    async fn test_reload_succeeds_after_transient_503s() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/-/reload"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/-/reload"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client =
            ReloadClient::new(format!("{}/-/reload", mock_server.uri()), fast_policy(3)).unwrap();
        assert!(client.reload().await.is_ok());
    }

    #[tokio::test]
    async fn test_status_outside_retry_set_returns_immediately() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(499))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client =
            ReloadClient::new(format!("{}/-/reload", mock_server.uri()), fast_policy(3)).unwrap();
        assert!(client.reload().await.is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused_is_retried_then_fails() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            ReloadClient::new(format!("http://{}/-/reload", addr), fast_policy(2)).unwrap();
        let err = client.reload().await.unwrap_err();
        assert!(err.message.contains("gave up after 2 attempts"));
    }
}
