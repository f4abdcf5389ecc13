pub mod awesome_api;
pub mod wise_api;

pub use awesome_api::AwesomeApiRateSource;
pub use wise_api::WiseRateSource;

use crate::config::{PipelineConfig, RateSourceKind};
use crate::fetcher::Fetcher;
use crate::rate::INDEX_DECIMALS;
use crate::traits::{RateSource, SecretStore};
use std::sync::Arc;

/// Pick the configured rate provider once at process start.
pub fn rate_source_from_config(
    config: &PipelineConfig,
    fetcher: Fetcher,
    secrets: Arc<dyn SecretStore>,
) -> Arc<dyn RateSource> {
    match config.rate_source {
        RateSourceKind::Awesome => {
            Arc::new(AwesomeApiRateSource::new(config.awesome_api_url.clone(), fetcher))
        }
        RateSourceKind::Wise => {
            Arc::new(WiseRateSource::new(config.wise_api_url.clone(), fetcher, secrets))
        }
    }
}

/// Normalize an upstream decimal (`.` separator) to the published form with
/// exactly two decimals, truncating: `"5.4321"` is `"5,43"`, `"5.2"` is `"5,20"`.
pub(crate) fn format_rate(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let (int_part, frac_part) = raw.split_once('.').unwrap_or((raw, ""));
    if int_part.is_empty() || !int_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let cents: String = frac_part
        .chars()
        .chain(std::iter::repeat('0'))
        .take(INDEX_DECIMALS)
        .collect();
    Some(format!("{},{}", int_part, cents))
}
