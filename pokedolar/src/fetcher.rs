use crate::config::FetchConfig;
use crate::types::{PipelineError, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Thin JSON-over-HTTP client with retry for the read-only upstream APIs.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self { client, config })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// GET `url` and decode the body as JSON, retrying transport errors, 429 and 5xx.
    pub async fn get_json(&self, url: &str, bearer: Option<&str>) -> Result<Value> {
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            debug!("GET {} (attempt {})", url, attempt + 1);

            let mut request = self.client.get(url);
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }

            match send(request).await {
                Ok((status, body)) if status.is_success() => {
                    return Ok(serde_json::from_str(&body)?);
                }
                Ok((status, _)) => {
                    if !is_retryable(status) {
                        return Err(http_status_error(url, status));
                    }
                    last_error = Some(http_status_error(url, status));
                }
                Err(e) => {
                    last_error = Some(e);
                }
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        error!("Failed to GET {} after {} attempts", url, self.config.max_retries + 1);
        Err(last_error.unwrap_or_else(|| PipelineError::Upstream(format!("GET {} failed", url))))
    }
}

pub(crate) fn build_client(config: &FetchConfig) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_seconds))
        .gzip(true)
        .deflate(true)
        .brotli(true)
        .build()?)
}

async fn send(request: RequestBuilder) -> Result<(StatusCode, String)> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    Ok((status, body))
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn http_status_error(url: &str, status: StatusCode) -> PipelineError {
    PipelineError::Upstream(format!(
        "GET {} returned HTTP {}: {}",
        url,
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    ))
}
