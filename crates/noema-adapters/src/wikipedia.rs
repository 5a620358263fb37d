//! `SummaryFetcher` backed by Wikipedia's REST summary endpoint (§6 wire contract).

use async_trait::async_trait;
use noema_core::error::{NoemaError, NoemaResult};
use noema_core::traits::SummaryFetcher;
use noema_core::SummaryFetcherConfig;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    extract: String,
}

/// Fetches a short plain-text summary for a keyword from Wikipedia's REST API.
pub struct WikipediaSummaryFetcher {
    client: reqwest::Client,
    config: SummaryFetcherConfig,
}

impl WikipediaSummaryFetcher {
    pub fn new(config: SummaryFetcherConfig) -> NoemaResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NoemaError::external_unavailable(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl SummaryFetcher for WikipediaSummaryFetcher {
    async fn fetch(&self, keyword: &str) -> NoemaResult<String> {
        let mut url = url::Url::parse(self.config.base_url.trim_end_matches('/'))
            .map_err(|e| NoemaError::Configuration(format!("invalid summary fetcher base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| NoemaError::Configuration("summary fetcher base url cannot be a base".to_string()))?
            .push(keyword);

        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.config.user_agent)
            .send()
            .await
            .map_err(|e| NoemaError::external_unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(String::new());
        }
        if !response.status().is_success() {
            warn!(status = %response.status(), keyword = %keyword, "wikipedia summary request failed");
            return Ok(String::new());
        }

        let body: SummaryResponse = response
            .json()
            .await
            .map_err(|e| NoemaError::malformed_adapter_response(e.to_string()))?;

        Ok(body.extract)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_default_config() {
        let fetcher = WikipediaSummaryFetcher::new(SummaryFetcherConfig::default());
        assert!(fetcher.is_ok());
    }
}
