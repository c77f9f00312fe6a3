//! HTTP liveness probe against the server's companion agent

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::config::SupervisorConfig;
use crate::error::{ProbeError, SupervisorError, SupervisorResult};
use crate::traits::HealthCheck;

/// Pings `GET <agent>/ping` and expects a 2xx answer
pub struct HttpHealthProber {
    client: reqwest::Client,
    url: Url,
}

impl HttpHealthProber {
    /// The agent runs next to the server, so system proxy settings are ignored
    pub fn new(url: Url) -> SupervisorResult<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| SupervisorError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, url })
    }

    pub fn from_config(config: &SupervisorConfig) -> SupervisorResult<Self> {
        Self::new(config.probe_url()?)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn classify(error: reqwest::Error, timeout: Duration) -> ProbeError {
        if error.is_timeout() {
            ProbeError::Timeout { timeout }
        } else if error.is_connect() || error.is_request() {
            ProbeError::Unreachable {
                message: error.to_string(),
            }
        } else {
            ProbeError::UnexpectedResponse {
                message: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl HealthCheck for HttpHealthProber {
    async fn ping(&self, timeout: Duration) -> Result<(), ProbeError> {
        let request = self.client.get(self.url.clone()).timeout(timeout).send();

        let response = match tokio::time::timeout(timeout, request).await {
            Err(_) => return Err(ProbeError::Timeout { timeout }),
            Ok(Err(e)) => return Err(Self::classify(e, timeout)),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::UnexpectedResponse {
                message: format!("HTTP {status}"),
            });
        }
        Ok(())
    }
}
