use crate::fetcher::Fetcher;
use crate::sources::format_rate;
use crate::traits::{RateSource, SecretStore};
use crate::types::{PipelineError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const WISE_API_TOKEN_SECRET: &str = "wise_api_token";

/// Wise rates API; authenticated, and reports the rate as a float.
pub struct WiseRateSource {
    url: String,
    fetcher: Fetcher,
    secrets: Arc<dyn SecretStore>,
}

impl WiseRateSource {
    pub fn new(url: String, fetcher: Fetcher, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            url,
            fetcher,
            secrets,
        }
    }
}

#[async_trait]
impl RateSource for WiseRateSource {
    fn source_name(&self) -> String {
        "Wise".to_string()
    }

    async fn fetch_rate(&self, request_id: Uuid) -> Result<String> {
        info!("Fetching dollar exchange rate from Wise");

        let token = self
            .secrets
            .get_secret(WISE_API_TOKEN_SECRET)
            .await
            .map_err(|e| PipelineError::RateFetch(e.to_string()))?;

        let body = self
            .fetcher
            .get_json(&self.url, Some(&token))
            .await
            .map_err(|e| {
                warn!(%request_id, "Wise request failed: {}", e);
                PipelineError::RateFetch(e.to_string())
            })?;

        // Usually a JSON number, occasionally a string.
        let raw = match body.pointer("/0/rate") {
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::String(s)) => s.clone(),
            _ => {
                return Err(PipelineError::RateFetch(
                    "Wise response has no rate".to_string(),
                ))
            }
        };

        let rate = format_rate(&raw)
            .ok_or_else(|| PipelineError::RateFetch("Wise returned an unreadable rate".to_string()))?;

        info!("Wise dollar exchange rate: BRL {}", rate);
        Ok(rate)
    }
}
