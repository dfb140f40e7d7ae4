//! HTTP client with connection pooling and retry logic

use kiln_config::Config;
use kiln_errors::{Error, NetworkError};
use kiln_events::{EventEmitter, EventSender};
use reqwest::{header, Client, Response, StatusCode};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Network client configuration
#[derive(Debug, Clone)]
pub struct NetConfig {
    pub retry: RetryPolicy,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: format!("kiln/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl NetConfig {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: RetryPolicy::from_config(config),
            ..Self::default()
        }
    }
}

/// Body of a conditional request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    Modified { body: T, etag: Option<String> },
    NotModified,
}

/// Map a transport failure onto the network error taxonomy
pub(crate) fn classify(error: &reqwest::Error, url: &str) -> NetworkError {
    if error.is_timeout() {
        NetworkError::Timeout {
            url: url.to_string(),
        }
    } else if let Some(status) = error.status() {
        NetworkError::from_status(status.as_u16(), url)
    } else if error.is_decode() {
        NetworkError::MalformedResponse {
            url: url.to_string(),
            message: error.to_string(),
        }
    } else {
        NetworkError::ConnectionFailed {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

/// HTTP client wrapper with retry logic
#[derive(Debug, Clone)]
pub struct NetClient {
    client: Client,
    config: NetConfig,
    event_sender: Option<EventSender>,
}

impl NetClient {
    /// Create a new network client
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to initialize.
    pub fn new(config: NetConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.retry.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| NetworkError::InvalidRemote {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            config,
            event_sender: None,
        })
    }

    #[must_use]
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    #[must_use]
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry
    }

    /// One GET without retries; statuses other than 2xx and 304 become errors
    pub(crate) async fn send(
        &self,
        url: &str,
        etag: Option<&str>,
    ) -> Result<Response, NetworkError> {
        let mut request = self.client.get(url);
        if let Some(etag) = etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }
        let response = request.send().await.map_err(|e| classify(&e, url))?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            Ok(response)
        } else {
            Err(NetworkError::from_status(status.as_u16(), url))
        }
    }

    /// GET with retries
    ///
    /// # Errors
    ///
    /// Returns the classified error once the retry policy gives up.
    pub async fn get(&self, url: &str) -> Result<Response, NetworkError> {
        self.config
            .retry
            .run(url, self, || self.send(url, None))
            .await
    }

    /// Fetch a text body, sending `etag` as `If-None-Match`
    ///
    /// # Errors
    ///
    /// Returns the classified error once the retry policy gives up.
    pub async fn get_text_if_modified(
        &self,
        url: &str,
        etag: Option<&str>,
    ) -> Result<Fetched<String>, NetworkError> {
        self.config
            .retry
            .run(url, self, || async {
                let response = self.send(url, etag).await?;
                if response.status() == StatusCode::NOT_MODIFIED {
                    return Ok(Fetched::NotModified);
                }
                let etag = response
                    .headers()
                    .get(header::ETAG)
                    .and_then(|value| value.to_str().ok())
                    .map(String::from);
                let body = response.text().await.map_err(|e| classify(&e, url))?;
                Ok(Fetched::Modified { body, etag })
            })
            .await
    }
}

impl EventEmitter for NetClient {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let mut config = Config::default();
        config.network.timeout = 12;
        let net = NetConfig::from_config(&config);
        assert_eq!(net.retry.timeout, Duration::from_secs(12));
        assert!(net.user_agent.starts_with("kiln/"));
        assert!(NetClient::new(net).is_ok());
    }
}
