use crate::fetcher::Fetcher;
use crate::sources::format_rate;
use crate::traits::RateSource;
use crate::types::{PipelineError, Result};
use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

/// AwesomeAPI `last/USD-BRL` quote; the bid is published with two decimals.
pub struct AwesomeApiRateSource {
    url: String,
    fetcher: Fetcher,
}

impl AwesomeApiRateSource {
    pub fn new(url: String, fetcher: Fetcher) -> Self {
        Self { url, fetcher }
    }
}

#[async_trait]
impl RateSource for AwesomeApiRateSource {
    fn source_name(&self) -> String {
        "AwesomeAPI".to_string()
    }

    async fn fetch_rate(&self, request_id: Uuid) -> Result<String> {
        info!("Fetching dollar exchange rate from AwesomeAPI");

        let body = self.fetcher.get_json(&self.url, None).await.map_err(|e| {
            warn!(%request_id, "AwesomeAPI request failed: {}", e);
            PipelineError::RateFetch(e.to_string())
        })?;

        let bid = body
            .pointer("/USDBRL/bid")
            .or_else(|| body.pointer("/USD/bid"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::RateFetch("AwesomeAPI response has no USD bid".to_string()))?;

        let rate = format_rate(bid)
            .ok_or_else(|| PipelineError::RateFetch("AwesomeAPI returned an unreadable bid".to_string()))?;

        info!("AwesomeAPI dollar exchange rate: BRL {}", rate);
        Ok(rate)
    }
}
